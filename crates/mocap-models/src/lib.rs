//! Shared data models for the mocap pipeline service.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job status, and pipeline stages
//! - Tuning parameters submitted with a job
//! - Stable error codes surfaced to clients
//! - Queue and statistics snapshots

pub mod error_code;
pub mod job;
pub mod params;
pub mod snapshot;
pub mod stage;
pub mod video;

// Re-export common types
pub use error_code::ErrorCode;
pub use job::{Job, JobArtifacts, JobError, JobId, JobStatus};
pub use params::JobParams;
pub use snapshot::{CurrentJobSnapshot, QueueInfo, QueuedJobSnapshot, RegistryStats};
pub use stage::Stage;
pub use video::VideoInfo;
