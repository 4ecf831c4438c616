//! External tool invocation and file plumbing for the mocap pipeline.
//!
//! This crate provides:
//! - Bounded external command execution with force-kill on timeout
//! - Best-effort diagnostic classification for resource exhaustion
//! - Job-scoped file deletion and disk accounting
//! - FFprobe-based input video validation

pub mod command;
pub mod error;
pub mod files;
pub mod fs_utils;
pub mod probe;

pub use command::{classify_diagnostics, ToolCommand, ToolOutput, ToolRunner};
pub use error::{MediaError, MediaResult};
pub use files::{sweep_stale_entries, DiskUsage, FileStore};
pub use fs_utils::move_file;
pub use probe::{validate_video, VideoLimits};
