//! trackmix - probe media tracks and remux a selection into Matroska
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod probe;
pub mod queue;
pub mod selection;
pub mod state;

pub use queue::{MixQueue, MixRequest, QueueError};
pub use selection::{SelectionError, TrackSelection};
pub use state::{JobStatus, JobStore, MixInput, MixJob, MixJobRecord};
