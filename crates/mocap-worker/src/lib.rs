//! Pipeline executor and scheduler loop for the mocap service.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod scheduler;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use pipeline::{MocapPipeline, PipelineFailure, PipelineOutput};
pub use scheduler::Scheduler;
