use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::process_group::ProcessGroupGuard;
use crate::stream::read_bounded;

/// Output kept per stream by [`run_with_timeout`].
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Describes the exit status of a command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    success: bool,
    code: Option<i32>,
}

impl CommandStatus {
    pub fn new(success: bool, code: Option<i32>) -> Self {
        Self { success, code }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Exit code; signal deaths are reported as the negated signal number.
    pub fn code(&self) -> Option<i32> {
        self.code
    }
}

impl From<std::process::ExitStatus> for CommandStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let code = {
            use std::os::unix::process::ExitStatusExt;
            status.code().or_else(|| status.signal().map(|signal| -signal))
        };
        #[cfg(not(unix))]
        let code = status.code();

        Self {
            success: status.success(),
            code,
        }
    }
}

/// Output produced by a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.clone();
        combined.push_str(&self.stderr);
        combined
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("i/o error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run `program args...` to completion with stdin closed, killing its whole
/// process group if it outlives `timeout`.
pub async fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<CommandOutput, RunError> {
    run_with_timeout_in(program, args, None, timeout).await
}

/// [`run_with_timeout`] with an explicit working directory.
pub async fn run_with_timeout_in(
    program: &str,
    args: &[String],
    current_dir: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput, RunError> {
    let mut command = Command::new(program);
    if let Some(dir) = current_dir {
        command.current_dir(dir);
    }
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    #[allow(unsafe_code)]
    unsafe {
        command.pre_exec(crate::process_group::detach_from_tty);
    }

    let mut child = command.spawn().map_err(|source| RunError::Spawn {
        program: program.to_string(),
        source,
    })?;
    let mut guard = ProcessGroupGuard::new(child.id());

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let run = async {
        let stdout_task = async {
            match stdout.as_mut() {
                Some(pipe) => read_bounded(pipe, MAX_CAPTURE_BYTES, None).await,
                None => Ok(Default::default()),
            }
        };
        let stderr_task = async {
            match stderr.as_mut() {
                Some(pipe) => read_bounded(pipe, MAX_CAPTURE_BYTES, None).await,
                None => Ok(Default::default()),
            }
        };
        let (out, err, status) = tokio::join!(stdout_task, stderr_task, child.wait());
        Ok::<_, std::io::Error>((out?, err?, status?))
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok((out, err, status))) => {
            guard.disarm();
            Ok(CommandOutput {
                status: status.into(),
                stdout: out.to_string_lossy(),
                stderr: err.to_string_lossy(),
            })
        }
        Ok(Err(source)) => Err(RunError::Io {
            program: program.to_string(),
            source,
        }),
        Err(_) => {
            guard.kill();
            tracing::debug!(program, ?timeout, "command timed out; process group killed");
            Err(RunError::TimedOut {
                program: program.to_string(),
                timeout,
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_status() {
        let output = run_with_timeout(
            "sh",
            &["-c".to_string(), "printf out; printf err >&2; exit 3".to_string()],
            Duration::from_secs(10),
        )
        .await
        .expect("run");

        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert!(!output.status.success());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.combined(), "outerr");
    }

    #[tokio::test]
    async fn times_out() {
        let started = std::time::Instant::now();
        let result = run_with_timeout(
            "sh",
            &["-c".to_string(), "sleep 30".to_string()],
            Duration::from_millis(300),
        )
        .await;

        assert!(matches!(result, Err(RunError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn runs_in_requested_directory() {
        let dir = std::env::temp_dir();
        let output = run_with_timeout_in("pwd", &[], Some(&dir), Duration::from_secs(10))
            .await
            .expect("run");
        let reported = std::path::PathBuf::from(output.stdout.trim());
        assert_eq!(
            reported.canonicalize().ok(),
            dir.canonicalize().ok()
        );
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let result = run_with_timeout(
            "definitely-not-a-real-binary-toolcage",
            &[],
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(RunError::Spawn { .. })));
    }
}
