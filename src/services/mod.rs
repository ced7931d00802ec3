pub mod advisor;
pub mod dispatch;
pub mod generator;
pub mod jobs;
pub mod music;
pub mod queue;
pub mod runner;
pub mod staging;
pub mod uploader;
