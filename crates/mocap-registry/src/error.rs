//! Registry error types.

use thiserror::Error;

use mocap_models::JobId;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Queue is full (max {max})")]
    QueueFull { max: usize },

    #[error("Invalid job parameters: {0}")]
    InvalidParams(String),

    #[error("Job {0} is currently processing and cannot be deleted")]
    JobProcessing(JobId),
}
