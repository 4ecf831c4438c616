//! Bounded external command execution.
//!
//! Every pipeline stage runs one external tool through [`ToolRunner`]: the
//! invocation inherits the service environment, both output streams are
//! captured, and a hard wall-clock timeout force-kills the process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

use mocap_models::ErrorCode;

use crate::error::{MediaError, MediaResult};

/// Builder for one external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// Program to execute
    program: PathBuf,
    /// Arguments, in order
    args: Vec<String>,
    /// Working directory (inherited when unset)
    cwd: Option<PathBuf>,
}

impl ToolCommand {
    /// Create a new command for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a path argument.
    pub fn path_arg(self, path: impl AsRef<Path>) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// The program being invoked.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Render the full command line for logging.
    pub fn display(&self) -> String {
        let mut line = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a successful invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runner enforcing a hard timeout on one external command.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    timeout: Duration,
    kill_grace: Duration,
}

impl ToolRunner {
    /// Create a runner with the given wall-clock timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            kill_grace: Duration::from_secs(5),
        }
    }

    /// Override the grace period granted to a killed process to exit.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Run the command to completion.
    ///
    /// Exit code 0 yields the captured output; a non-zero exit yields
    /// [`MediaError::ToolFailed`] carrying the diagnostic stream. On timeout
    /// the process is force-killed and waited on for the grace period; an
    /// unconfirmed kill is logged but still reported as a timeout.
    pub async fn run(&self, cmd: &ToolCommand) -> MediaResult<ToolOutput> {
        debug!("Running tool: {}", cmd.display());
        let start = Instant::now();

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &cmd.cwd {
            command.current_dir(cwd);
        }

        let mut child = command
            .spawn()
            .map_err(|e| MediaError::from_invocation_io(&cmd.program.to_string_lossy(), e))?;

        // Drain both streams concurrently so the child never blocks on a
        // full pipe while we wait on it.
        let mut stdout_pipe = child.stdout.take().expect("stdout not captured");
        let mut stderr_pipe = child.stderr.take().expect("stderr not captured");
        let stdout_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stdout_pipe.read_to_string(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr_pipe.read_to_string(&mut buf).await;
            buf
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(result) => result
                .map_err(|e| MediaError::from_invocation_io(&cmd.program.to_string_lossy(), e))?,
            Err(_) => {
                warn!(
                    "Tool timed out after {}s, killing process: {}",
                    self.timeout.as_secs(),
                    cmd.display()
                );
                if let Err(e) = child.start_kill() {
                    error!("Failed to signal timed-out process: {}", e);
                }
                match tokio::time::timeout(self.kill_grace, child.wait()).await {
                    Ok(_) => {}
                    Err(_) => {
                        // Report the timeout regardless; kill_on_drop keeps
                        // the kernel-side kill request alive.
                        error!(
                            "Timed-out process did not exit within the {}s grace period: {}",
                            self.kill_grace.as_secs(),
                            cmd.display()
                        );
                    }
                }
                return Err(MediaError::Timeout(self.timeout.as_secs()));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let elapsed = start.elapsed();

        if status.success() {
            Ok(ToolOutput {
                stdout,
                stderr,
                elapsed,
            })
        } else {
            Err(MediaError::tool_failed(
                format!(
                    "{} exited with status {}",
                    cmd.program.to_string_lossy(),
                    status.code().map_or_else(|| "signal".into(), |c| c.to_string()),
                ),
                Some(stderr),
                status.code(),
            ))
        }
    }
}

/// Best-effort classification of tool diagnostics into a stable error code.
///
/// Substring matching against known failure signatures is brittle but it is
/// all the external tools give us today; callers fall back to a stage
/// default when nothing matches.
pub fn classify_diagnostics(stderr: &str) -> Option<ErrorCode> {
    let lower = stderr.to_lowercase();

    if lower.contains("cuda out of memory") || lower.contains("out of memory") {
        return Some(ErrorCode::GpuOutOfMemory);
    }
    if lower.contains("no space left") || lower.contains("disk full") {
        return Some(ErrorCode::DiskFull);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("/bin/sh").arg("-c").arg(script)
    }

    #[test]
    fn command_display_joins_program_and_args() {
        let cmd = ToolCommand::new("/usr/bin/blender")
            .arg("-b")
            .arg("-P")
            .path_arg("/opt/scripts/export.py");
        assert_eq!(cmd.display(), "/usr/bin/blender -b -P /opt/scripts/export.py");
    }

    #[test]
    fn diagnostics_classification() {
        assert_eq!(
            classify_diagnostics("RuntimeError: CUDA out of memory. Tried to allocate"),
            Some(ErrorCode::GpuOutOfMemory)
        );
        assert_eq!(
            classify_diagnostics("OSError: [Errno 28] No space left on device"),
            Some(ErrorCode::DiskFull)
        );
        assert_eq!(classify_diagnostics("Traceback (most recent call last)"), None);
    }

    #[tokio::test]
    async fn captures_output_on_success() {
        let runner = ToolRunner::new(Duration::from_secs(10));
        let out = runner
            .run(&sh("echo hello; echo oops >&2"))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr_and_code() {
        let runner = ToolRunner::new(Duration::from_secs(10));
        let err = runner
            .run(&sh("echo broken >&2; exit 3"))
            .await
            .unwrap_err();
        match err {
            MediaError::ToolFailed {
                stderr, exit_code, ..
            } => {
                assert_eq!(stderr.as_deref().map(str::trim), Some("broken"));
                assert_eq!(exit_code, Some(3));
            }
            other => panic!("expected ToolFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_kills_within_grace_period() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("survived");

        // The shell only reaches the touch if it outlives the kill.
        let script = format!("sleep 2; touch {}", marker.display());
        let runner = ToolRunner::new(Duration::from_millis(200))
            .with_kill_grace(Duration::from_secs(5));
        let start = Instant::now();
        let err = runner.run(&sh(&script)).await.unwrap_err();
        assert!(matches!(err, MediaError::Timeout(_)));
        // Timeout plus grace, with headroom for a loaded machine.
        assert!(start.elapsed() < Duration::from_secs(10));

        // Confirm the process is gone: wait past its sleep and check the
        // marker never appeared.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn missing_executable_is_classified() {
        let runner = ToolRunner::new(Duration::from_secs(5));
        let err = runner
            .run(&ToolCommand::new("/nonexistent/tool-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound(_)));
    }
}
