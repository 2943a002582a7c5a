//! Builder for executing external tool commands with timeout and
//! cancellation support.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tm_core::Error;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output, exactly as the tool wrote it.
    pub stdout: Vec<u8>,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

impl ToolOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Standard output for display and log scraping. Structured output should
    /// be parsed from the raw bytes instead.
    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }
}

/// A builder for constructing and executing external tool invocations.
///
/// The child is spawned with `kill_on_drop`, so a timeout, a cancellation or
/// simply dropping the `execute` future terminates the process.
///
/// # Example
///
/// ```no_run
/// use tm_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> tm_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("mkvmerge"))
///     .arg("-J")
///     .arg("/path/to/video.mkv")
///     .execute()
///     .await?;
/// println!("{}", output.stdout_text());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Option<Duration>,
    success_codes: Vec<i32>,
    cancel: Option<CancellationToken>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: Some(DEFAULT_TIMEOUT),
            success_codes: vec![0],
            cancel: None,
        }
    }

    /// Append a single argument. Paths are passed through byte for byte.
    pub fn arg(&mut self, s: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(s.as_ref().to_os_string());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl AsRef<OsStr>>) -> &mut Self {
        self.args
            .extend(iter.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Set the maximum execution time. `None` lets the process run until it
    /// exits or is cancelled.
    pub fn timeout(&mut self, d: Option<Duration>) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Exit codes treated as success (default: only 0).
    pub fn success_codes(&mut self, codes: &[i32]) -> &mut Self {
        self.success_codes = codes.to_vec();
        self
    }

    /// Kill the process when `token` is cancelled.
    pub fn cancel_on(&mut self, token: CancellationToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    /// The arguments collected so far.
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`Error::Tool`] if spawning the process or waiting on it fails.
    /// - [`Error::ToolExit`] if the process exits with a code outside the
    ///   success set (message is the trimmed stderr, or stdout when stderr is
    ///   empty).
    /// - [`Error::Timeout`] if the time budget is exceeded.
    /// - [`Error::Cancelled`] if the cancellation token fires first.
    pub async fn execute(&self) -> tm_core::Result<ToolOutput> {
        let program_name = self.program_name();

        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(Error::Cancelled { tool: program_name });
        }

        tracing::debug!(tool = %program_name, args = ?self.args, "running tool");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        let timeout = self.timeout;
        let name = program_name.clone();
        let wait = async move {
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                    .await
                    .map_err(|_| Error::Timeout {
                        tool: name.clone(),
                        after: limit,
                    })?,
                None => child.wait_with_output().await,
            };
            result.map_err(|e| Error::tool(&name, format!("I/O error waiting for process: {e}")))
        };

        let output = match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(tool = %program_name, "tool cancelled");
                    return Err(Error::Cancelled { tool: program_name });
                }
                res = wait => res?,
            },
            None => wait.await?,
        };

        let tool_output = ToolOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        let accepted = tool_output
            .code()
            .is_some_and(|c| self.success_codes.contains(&c));
        if !accepted {
            let stderr = tool_output.stderr.trim();
            let message = if stderr.is_empty() {
                tool_output.stdout_text().trim().to_string()
            } else {
                stderr.to_string()
            };
            return Err(Error::ToolExit {
                tool: program_name,
                code: tool_output.code(),
                message,
            });
        }

        Ok(tool_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sh(script: &str) -> ToolCommand {
        let mut cmd = ToolCommand::new(PathBuf::from("sh"));
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn args_accumulate_in_order() {
        let cmd = sh("exit 0");
        assert_eq!(cmd.get_args(), ["-c", "exit 0"]);
    }

    #[tokio::test]
    async fn execute_echo() {
        let output = ToolCommand::new(PathBuf::from("echo"))
            .arg("hello")
            .execute()
            .await;

        match output {
            Ok(out) => {
                assert!(out.status.success());
                assert!(out.stdout_text().trim().contains("hello"));
            }
            Err(_) => {
                // On some minimal environments echo may not exist; skip.
            }
        }
    }

    #[tokio::test]
    async fn execute_nonexistent_tool() {
        let result = ToolCommand::new(PathBuf::from("nonexistent_tool_xyz_12345"))
            .execute()
            .await;
        assert_matches!(result, Err(Error::Tool { .. }));
    }

    #[tokio::test]
    async fn non_zero_exit_reports_code_and_stderr() {
        let result = sh("echo broken >&2; exit 2").execute().await;
        assert_matches!(
            result,
            Err(Error::ToolExit { code: Some(2), ref message, .. }) if message == "broken"
        );
    }

    #[tokio::test]
    async fn extra_success_codes_accepted() {
        let output = sh("echo warning; exit 1")
            .success_codes(&[0, 1])
            .execute()
            .await
            .unwrap();
        assert_eq!(output.code(), Some(1));
        assert_eq!(output.stdout_text().trim(), "warning");
    }

    #[tokio::test]
    async fn stdout_bytes_are_kept_verbatim() {
        let output = sh("printf 'bad\\377name'").execute().await.unwrap();
        assert_eq!(output.stdout, b"bad\xffname");
        assert_eq!(output.stdout_text(), "bad\u{fffd}name");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_arguments_are_not_mangled() {
        use std::os::unix::ffi::OsStrExt;

        let path = PathBuf::from(OsStr::from_bytes(b"/media/ep\xff01.mkv"));
        let mut cmd = ToolCommand::new(PathBuf::from("mkvmerge"));
        cmd.arg("-J").arg(&path);
        assert_eq!(cmd.get_args()[1].as_os_str(), path.as_os_str());
    }

    #[tokio::test]
    async fn timeout_fires() {
        let result = ToolCommand::new(PathBuf::from("sleep"))
            .arg("10")
            .timeout(Some(Duration::from_millis(100)))
            .execute()
            .await;
        let err = result.unwrap_err();
        assert_matches!(err, Error::Timeout { .. });
        assert!(err.to_string().contains("timed out"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn cancellation_kills_process() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = ToolCommand::new(PathBuf::from("sleep"))
            .arg("10")
            .timeout(None)
            .cancel_on(token)
            .execute()
            .await;
        assert_matches!(result, Err(Error::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn already_cancelled_does_not_spawn() {
        let token = CancellationToken::new();
        token.cancel();
        let result = ToolCommand::new(PathBuf::from("nonexistent_tool_xyz_12345"))
            .cancel_on(token)
            .execute()
            .await;
        assert_matches!(result, Err(Error::Cancelled { .. }));
    }
}
