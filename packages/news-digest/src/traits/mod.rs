//! Core trait abstractions for the digest pipeline.
//!
//! These are the seams the orchestrator is assembled from: where records
//! are cached and which backends turn text into summaries.

pub mod store;
pub mod summarizer;
