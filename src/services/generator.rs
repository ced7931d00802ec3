//! Slideshow video rendering.
//!
//! Every photo becomes one short clip (two when only a single photo was
//! sent) with a random motion and colour grade, clips are cross-faded, and
//! a looped background track is mixed underneath. Rendering itself is done by
//! ffmpeg.

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use uuid::Uuid;

use crate::models::music::{MusicCategory, MusicChoice};
use crate::services::music::{MusicLibrary, MusicSelector};

pub const FPS: u32 = 24;
/// Clips cut from the photo when only one was submitted.
pub const CLIPS_PER_SINGLE_IMAGE: usize = 2;
pub const BASE_CLIP_SECS: f64 = 2.5;
pub const CLIP_VARIANCE_SECS: f64 = 1.0;
pub const MIN_CLIP_SECS: f64 = 1.5;
pub const TRANSITION_SECS: f64 = 0.5;
pub const MUSIC_VOLUME: f64 = 0.7;
/// Longest output side in pixels.
pub const MAX_SIDE: u32 = 1280;

/// Inputs of one render.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub job_id: Uuid,
    pub images: &'a [PathBuf],
    pub output_dir: &'a Path,
    pub music: MusicChoice,
}

/// A rendered video on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedVideo {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub clips_count: usize,
    pub music_category: Option<MusicCategory>,
}

/// Media-generation collaborator: photos in, local video out.
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<GeneratedVideo, GenerationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    ZoomInSlow,
    ZoomOutSlow,
    ZoomInMedium,
    PanLeft,
    PanRight,
    Still,
    RotateSubtle,
}

const MOTIONS: [Motion; 7] = [
    Motion::ZoomInSlow,
    Motion::ZoomOutSlow,
    Motion::ZoomInMedium,
    Motion::PanLeft,
    Motion::PanRight,
    Motion::Still,
    Motion::RotateSubtle,
];

impl Motion {
    /// Filter applied after the photo is letterboxed to `width`x`height`.
    fn filter(&self, width: u32, height: u32, duration: f64) -> Option<String> {
        let zoom = |factor: f64| {
            format!(
                "scale=trunc(iw*{f}/2)*2:trunc(ih*{f}/2)*2,crop={w}:{h}",
                f = factor,
                w = width,
                h = height
            )
        };
        match self {
            Motion::ZoomInSlow => Some(zoom(1.08)),
            Motion::ZoomInMedium => Some(zoom(1.12)),
            Motion::ZoomOutSlow => Some(format!(
                "scale=trunc(iw*0.95/2)*2:trunc(ih*0.95/2)*2,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black",
                w = width,
                h = height
            )),
            Motion::PanLeft => Some(format!(
                "scale=trunc(iw*1.1/2)*2:trunc(ih*1.1/2)*2,crop={w}:{h}:x='(iw-ow)*(1-t/{d:.3})':y='(ih-oh)/2'",
                w = width,
                h = height,
                d = duration
            )),
            Motion::PanRight => Some(format!(
                "scale=trunc(iw*1.1/2)*2:trunc(ih*1.1/2)*2,crop={w}:{h}:x='(iw-ow)*t/{d:.3}':y='(ih-oh)/2'",
                w = width,
                h = height,
                d = duration
            )),
            Motion::RotateSubtle => Some("rotate=2*PI/180:fillcolor=black".to_string()),
            Motion::Still => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorGrade {
    Warm,
    Cool,
    SoftContrast,
    Brighter,
    Darker,
    Saturated,
    Neutral,
}

const GRADES: [ColorGrade; 7] = [
    ColorGrade::Warm,
    ColorGrade::Cool,
    ColorGrade::SoftContrast,
    ColorGrade::Brighter,
    ColorGrade::Darker,
    ColorGrade::Saturated,
    ColorGrade::Neutral,
];

impl ColorGrade {
    fn filter(&self) -> Option<&'static str> {
        match self {
            ColorGrade::Warm => Some("colorbalance=rs=0.05:bs=-0.05"),
            ColorGrade::Cool => Some("colorbalance=rs=-0.05:bs=0.05"),
            ColorGrade::SoftContrast => Some("eq=contrast=1.08"),
            ColorGrade::Brighter => Some("eq=brightness=0.04"),
            ColorGrade::Darker => Some("eq=brightness=-0.04"),
            ColorGrade::Saturated => Some("eq=saturation=1.15"),
            ColorGrade::Neutral => None,
        }
    }
}

/// One clip of the slideshow.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPlan {
    pub image: PathBuf,
    pub duration: f64,
    pub motion: Motion,
    pub grade: ColorGrade,
    pub fade: f64,
}

/// Lay out clips for `images` in order.
pub fn plan_clips<R: Rng + ?Sized>(images: &[PathBuf], rng: &mut R) -> Vec<ClipPlan> {
    let clips_per_image = if images.len() == 1 {
        CLIPS_PER_SINGLE_IMAGE
    } else {
        1
    };

    let mut clips = Vec::with_capacity(images.len() * clips_per_image);
    for image in images {
        for _ in 0..clips_per_image {
            let jitter = rng.random_range(-CLIP_VARIANCE_SECS..=CLIP_VARIANCE_SECS);
            let duration = (BASE_CLIP_SECS + jitter).max(MIN_CLIP_SECS);
            clips.push(ClipPlan {
                image: image.clone(),
                duration,
                motion: *MOTIONS.choose(rng).unwrap_or(&Motion::Still),
                grade: *GRADES.choose(rng).unwrap_or(&ColorGrade::Neutral),
                fade: rng.random_range(0.2..=0.5),
            });
        }
    }
    clips
}

/// Length of the cross-faded slideshow.
pub fn total_duration(clips: &[ClipPlan]) -> f64 {
    if clips.is_empty() {
        return 0.0;
    }
    let sum: f64 = clips.iter().map(|c| c.duration).sum();
    sum - TRANSITION_SECS * (clips.len() - 1) as f64
}

/// Output frame size derived from the first photo: at most [`MAX_SIDE`]
/// on the long edge, both sides even (required by yuv420p).
pub fn output_size(width: u32, height: u32) -> (u32, u32) {
    let (width, height) = (width.max(2), height.max(2));
    let long = width.max(height);
    let scale = if long > MAX_SIDE {
        MAX_SIDE as f64 / long as f64
    } else {
        1.0
    };
    let even = |v: f64| ((v.round() as u32) / 2 * 2).max(2);
    (even(width as f64 * scale), even(height as f64 * scale))
}

/// Build the ffmpeg command line for a planned slideshow.
pub fn ffmpeg_args(
    clips: &[ClipPlan],
    size: (u32, u32),
    music: Option<&Path>,
    output: &Path,
) -> Vec<String> {
    let (width, height) = size;
    let total = total_duration(clips);
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into(), "-y".into()];

    for clip in clips {
        args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-framerate".to_string(),
            FPS.to_string(),
            "-t".to_string(),
            format!("{:.3}", clip.duration),
            "-i".to_string(),
            clip.image.display().to_string(),
        ]);
    }
    if let Some(track) = music {
        args.extend([
            "-stream_loop".to_string(),
            "-1".to_string(),
            "-i".to_string(),
            track.display().to_string(),
        ]);
    }

    let mut graph = Vec::new();
    for (i, clip) in clips.iter().enumerate() {
        let mut chain = vec![format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black",
            w = width,
            h = height
        )];
        if let Some(motion) = clip.motion.filter(width, height, clip.duration) {
            chain.push(motion);
        }
        if let Some(grade) = clip.grade.filter() {
            chain.push(grade.to_string());
        }
        chain.push(format!(
            "fade=t=in:st=0:d={f:.3},fade=t=out:st={s:.3}:d={f:.3}",
            f = clip.fade,
            s = (clip.duration - clip.fade).max(0.0)
        ));
        // motions rescale and skew the sample aspect ratio; xfade needs them equal
        chain.push(format!("fps={},format=yuv420p,setsar=1", FPS));
        graph.push(format!("[{}:v]{}[v{}]", i, chain.join(","), i));
    }

    let mut last = "v0".to_string();
    let mut elapsed = clips.first().map(|c| c.duration).unwrap_or(0.0);
    for (i, clip) in clips.iter().enumerate().skip(1) {
        let offset = elapsed - TRANSITION_SECS;
        let label = format!("x{}", i);
        graph.push(format!(
            "[{}][v{}]xfade=transition=fade:duration={:.3}:offset={:.3}[{}]",
            last, i, TRANSITION_SECS, offset, label
        ));
        elapsed = offset + clip.duration;
        last = label;
    }

    if music.is_some() {
        graph.push(format!(
            "[{}:a]volume={},atrim=0:{:.3},asetpts=PTS-STARTPTS[aout]",
            clips.len(),
            MUSIC_VOLUME,
            total
        ));
    }

    args.push("-filter_complex".into());
    args.push(graph.join(";"));
    args.extend(["-map".to_string(), format!("[{}]", last)]);
    if music.is_some() {
        args.extend([
            "-map".to_string(),
            "[aout]".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
        ]);
    }
    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        FPS.to_string(),
        "-t".to_string(),
        format!("{:.3}", total),
        "-movflags".to_string(),
        "+faststart".to_string(),
        output.display().to_string(),
    ]);
    args
}

/// Renders slideshows with an external ffmpeg binary.
pub struct FfmpegSlideshow {
    ffmpeg_path: PathBuf,
    timeout: Duration,
    selector: MusicSelector,
    library: MusicLibrary,
}

impl FfmpegSlideshow {
    pub fn new(
        ffmpeg_path: PathBuf,
        timeout: Duration,
        selector: MusicSelector,
        library: MusicLibrary,
    ) -> Self {
        Self {
            ffmpeg_path,
            timeout,
            selector,
            library,
        }
    }

    async fn run_ffmpeg(&self, job_id: Uuid, args: &[String]) -> Result<(), GenerationError> {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(GenerationError::Spawn(e)),
            Err(_) => return Err(GenerationError::Timeout(self.timeout.as_secs())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                job_id = %job_id,
                exit_code = ?output.status.code(),
                stderr = %stderr.chars().take(500).collect::<String>(),
                "ffmpeg failed"
            );
            return Err(GenerationError::Render {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.chars().take(2000).collect(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VideoGenerator for FfmpegSlideshow {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<GeneratedVideo, GenerationError> {
        let first = request.images.first().ok_or(GenerationError::NoImages)?;

        let category = match request.music {
            MusicChoice::Fixed(category) => {
                tracing::info!(job_id = %request.job_id, category = %category, "Using requested music");
                category
            }
            MusicChoice::Auto => self.selector.select(request.images).await,
        };

        let clips = {
            let mut rng = rand::rng();
            plan_clips(request.images, &mut rng)
        };

        let (src_w, src_h) =
            image::image_dimensions(first).map_err(|e| GenerationError::Dimensions(e.to_string()))?;
        let size = output_size(src_w, src_h);

        let track = self
            .library
            .fetch(category, &request.output_dir.join("background_music.mp3"))
            .await;

        let output = request.output_dir.join("auto_vlog.mp4");
        let args = ffmpeg_args(&clips, size, track.as_deref(), &output);

        tracing::info!(
            job_id = %request.job_id,
            clips = clips.len(),
            width = size.0,
            height = size.1,
            music = %category,
            has_audio = track.is_some(),
            "Rendering slideshow"
        );

        let start = Instant::now();
        self.run_ffmpeg(request.job_id, &args).await?;
        metrics::histogram!("booth_render_seconds").record(start.elapsed().as_secs_f64());

        if tokio::fs::metadata(&output).await.is_err() {
            return Err(GenerationError::MissingOutput(output));
        }

        Ok(GeneratedVideo {
            path: output,
            duration_secs: total_duration(&clips),
            width: size.0,
            height: size.1,
            clips_count: clips.len(),
            music_category: Some(category),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("No images to render")]
    NoImages,

    #[error("Could not read image dimensions: {0}")]
    Dimensions(String),

    #[error("Failed to start ffmpeg: {0}")]
    Spawn(std::io::Error),

    #[error("ffmpeg exited with code {code}: {stderr}")]
    Render { code: i32, stderr: String },

    #[error("Render timed out after {0}s")]
    Timeout(u64),

    #[error("ffmpeg reported success but {0} was not written")]
    MissingOutput(PathBuf),

    #[error("{0}")]
    Other(String),
}
