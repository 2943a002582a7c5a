//! tm-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for the other trackmix crates,
//! providing the job identifier, the error taxonomy for probing, submission
//! and mixing, the media-domain model produced by probing, the configuration
//! sections, and a broadcast event bus for job status changes.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, ExitInfo, MixExecutionError, ProbeError, Result, SubmissionError};
pub use ids::*;
pub use media::*;
