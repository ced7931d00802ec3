//! Smart Memento Booth auto-vlog backend
//!
//! Photo-booth clients submit a batch of photos; the API records a job,
//! hands it to an isolated worker and returns at once. The worker renders a
//! slideshow video, uploads it to the CDN and writes the outcome back to the
//! shared job store, which clients poll.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
