//! # tm-av
//!
//! External media capabilities for trackmix.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffprobe
//!   and mkvmerge.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout and
//!   cancellation support for running external processes.
//! - **Probe backends** ([`probe`]) -- enumerate the tracks of a media file by
//!   shelling out to `mkvmerge -J` or `ffprobe`.
//! - **Muxing** ([`mux`]) -- the [`Muxer`] capability and its mkvmerge
//!   implementation.
//! - **Output staging** ([`Workspace`]) -- write next to the destination, then
//!   move into place only on success.

pub mod command;
pub mod mux;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use mux::{MkvmergeMuxer, MuxFlags, MuxReport, MuxRequest, MuxTrack, Muxer};
pub use probe::{CachedProber, CompositeProber, FfprobeProber, MkvmergeProber, Prober};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::Workspace;

pub use tokio_util::sync::CancellationToken;
