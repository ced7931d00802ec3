pub mod job;
pub mod music;
pub mod submission;
