//! Error types for tool invocation and file operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while driving external tools or touching the disk.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool failed: {message}")]
    ToolFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Tool timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    #[error("Disk full: {0}")]
    DiskFull(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Path outside the authorized directory tree: {0}")]
    SecurityViolation(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a tool failure error.
    pub fn tool_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ToolFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify a low-level IO failure raised outside the tool itself.
    ///
    /// ENOSPC becomes `DiskFull`, executable/argument problems become
    /// `InvalidInvocation`, everything else stays a generic `Io`.
    pub fn from_invocation_io(program: &str, e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        if e.raw_os_error() == Some(28) || e.to_string().to_lowercase().contains("no space left") {
            return Self::DiskFull(e.to_string());
        }
        match e.kind() {
            ErrorKind::NotFound => Self::ToolNotFound(program.to_string()),
            ErrorKind::InvalidInput | ErrorKind::InvalidData => {
                Self::InvalidInvocation(format!("{}: {}", program, e))
            }
            _ => Self::Io(e),
        }
    }
}
