//! The summarization pipeline.
//!
//! - [`Orchestrator`] - per-story tier cascade
//! - [`Orchestrator::pull_batch`] - bounded-concurrency batch runner
//! - [`spawn_expiry_sweep`] - periodic cache eviction

pub mod batch;
pub mod orchestrator;
pub mod sweep;

pub use orchestrator::{contains_cjk, normalize_content, Orchestrator, Stage};
pub use sweep::{run_expiry, spawn_expiry_sweep};
