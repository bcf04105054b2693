//! Data layer for the bulk job engine.

pub mod job;

// Re-export core models for easy access
pub use job::{Job, JobKind, JobSnapshot, NewJob, Page};
