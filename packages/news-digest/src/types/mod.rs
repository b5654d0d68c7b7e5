//! Data types for the digest pipeline.

pub mod config;
pub mod record;
pub mod story;
pub mod tier;
