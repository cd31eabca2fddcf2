//! Spawning one worker process and turning whatever happens to it into a
//! [`ToolResponse`].

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use toolcage_config::OutputLimitsConfig;
use toolcage_process::{CapturedStream, CommandStatus, ProcessGroupGuard, read_bounded};

use crate::worker::protocol::ToolResponse;

/// How long stderr may keep draining after the worker was killed.
const STDERR_GRACE: Duration = Duration::from_secs(1);

/// Everything needed to run one sandboxed worker.
#[derive(Debug)]
pub(crate) struct WorkerInvocation<'a> {
    /// Backend prefix followed by the worker program and its arguments.
    pub argv: Vec<String>,
    pub env: HashMap<String, String>,
    pub current_dir: &'a Path,
    pub request: Vec<u8>,
    pub timeout: Duration,
    pub limits: OutputLimitsConfig,
    pub backend: &'static str,
}

/// First `max_chars` characters of `text`, marked when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}... [truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

enum Outcome {
    Exited(ExitStatus),
    OutputExceeded(usize),
    TimedOut,
    WaitFailed(io::Error),
}

type DrainHandle = JoinHandle<io::Result<CapturedStream>>;

async fn collect(handle: DrainHandle, grace: Option<Duration>) -> CapturedStream {
    let abort = handle.abort_handle();
    let joined = match grace {
        Some(grace) => match tokio::time::timeout(grace, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                return CapturedStream::default();
            }
        },
        None => handle.await,
    };
    match joined {
        Ok(Ok(captured)) => captured,
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "failed to drain worker pipe");
            CapturedStream::default()
        }
        Err(err) => {
            tracing::debug!(error = %err, "worker pipe drain task ended early");
            CapturedStream::default()
        }
    }
}

/// Run the worker to completion, enforcing the timeout and output caps.
///
/// The worker leads its own process group. The group is killed on every exit
/// path, and dropping the returned future kills it too.
pub(crate) async fn run_worker(invocation: WorkerInvocation<'_>) -> ToolResponse {
    let WorkerInvocation {
        argv,
        env,
        current_dir,
        request,
        timeout,
        limits,
        backend,
    } = invocation;

    let Some((program, args)) = argv.split_first() else {
        return ToolResponse::failure(format!("{backend} produced an empty command"));
    };
    tracing::debug!(backend, %program, ?args, "spawning sandbox worker");

    let mut command = Command::new(program);
    command
        .args(args)
        .env_clear()
        .envs(&env)
        .current_dir(current_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    #[allow(unsafe_code)]
    {
        // SAFETY: getpid has no preconditions.
        let parent_pid = unsafe { libc::getpid() };
        // SAFETY: the hook only makes async-signal-safe syscalls.
        unsafe {
            command.pre_exec(move || {
                toolcage_process::process_group::detach_from_tty()?;
                toolcage_process::process_group::set_parent_death_signal(parent_pid)
            });
        }
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!(backend, %program, error = %err, "failed to start sandbox");
            return ToolResponse::failure(format!("Failed to start {backend}: {err}"));
        }
    };
    // A timeout too large to represent as an instant means no deadline.
    let deadline = Instant::now().checked_add(timeout);
    let mut group = ProcessGroupGuard::new(child.id());

    let stdin = child.stdin.take();
    let writer = tokio::spawn(async move {
        let Some(mut stdin) = stdin else { return };
        match stdin.write_all(&request).await {
            Ok(()) => {}
            // The worker may exit before reading everything.
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
            Err(err) => tracing::debug!(error = %err, "failed to write worker request"),
        }
        let _ = stdin.shutdown().await;
    });

    let (overflow_tx, mut overflow_rx) = oneshot::channel();
    let stdout_pipe = child.stdout.take();
    let stdout_task: DrainHandle = tokio::spawn(async move {
        match stdout_pipe {
            Some(mut pipe) => read_bounded(&mut pipe, limits.stdout_max_bytes, Some(overflow_tx)).await,
            None => Ok(CapturedStream::default()),
        }
    });
    let stderr_pipe = child.stderr.take();
    let stderr_task: DrainHandle = tokio::spawn(async move {
        match stderr_pipe {
            Some(mut pipe) => read_bounded(&mut pipe, limits.stderr_max_bytes, None).await,
            None => Ok(CapturedStream::default()),
        }
    });

    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => Outcome::Exited(status),
            Err(err) => Outcome::WaitFailed(err),
        },
        Ok(limit) = &mut overflow_rx => Outcome::OutputExceeded(limit),
        () = expire(deadline) => Outcome::TimedOut,
    };

    // Nothing in the group may outlive the call, including background
    // processes the tool left behind.
    group.kill();
    writer.abort();

    match outcome {
        Outcome::TimedOut => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            stdout_task.abort();
            let stderr = collect(stderr_task, Some(STDERR_GRACE)).await;
            tracing::warn!(backend, ?timeout, "sandbox execution timed out");
            ToolResponse::failure(format!(
                "Sandbox execution timed out after {} seconds",
                timeout.as_secs_f64()
            ))
            .with_stderr(stderr.to_string_lossy())
        }
        Outcome::OutputExceeded(limit) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            let stdout = collect(stdout_task, Some(STDERR_GRACE)).await;
            stderr_task.abort();
            output_exceeded(limit, &stdout, limits.preview_chars)
        }
        Outcome::WaitFailed(err) => {
            stdout_task.abort();
            stderr_task.abort();
            ToolResponse::failure(format!("Failed to wait for {backend}: {err}"))
        }
        Outcome::Exited(status) => {
            let remaining = deadline
                .map_or(STDERR_GRACE, |deadline| deadline.saturating_duration_since(Instant::now()));
            let stdout = collect(stdout_task, Some(remaining.max(STDERR_GRACE))).await;
            let stderr = collect(stderr_task, Some(STDERR_GRACE)).await;
            finish(backend, status.into(), &stdout, &stderr, limits)
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn output_exceeded(limit: usize, stdout: &CapturedStream, preview_chars: usize) -> ToolResponse {
    tracing::warn!(limit, produced = stdout.total_bytes, "sandbox output limit exceeded");
    ToolResponse::failure(format!("Sandbox output exceeded {limit} byte limit"))
        .with_stdout(preview(&stdout.to_string_lossy(), preview_chars))
}

fn finish(
    backend: &str,
    status: CommandStatus,
    stdout: &CapturedStream,
    stderr: &CapturedStream,
    limits: OutputLimitsConfig,
) -> ToolResponse {
    if stdout.exceeded() {
        return output_exceeded(limits.stdout_max_bytes, stdout, limits.preview_chars);
    }

    if !status.success() {
        let code = status
            .code()
            .map_or_else(|| "unknown".to_string(), |code| code.to_string());
        tracing::debug!(backend, %code, "sandbox worker failed");
        return ToolResponse::failure(format!("{backend} failed with code {code}"))
            .with_stderr(stderr.to_string_lossy());
    }

    match serde_json::from_slice::<ToolResponse>(&stdout.bytes) {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(backend, error = %err, "worker output is not a response");
            ToolResponse::failure("Failed to parse worker output")
                .with_stdout(preview(&stdout.to_string_lossy(), limits.preview_chars))
                .with_stderr(stderr.to_string_lossy())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_cuts_on_char_boundary() {
        assert_eq!(preview("héllo", 10), "héllo");
        assert_eq!(preview("héllo", 2), "hé... [truncated]");
    }

    #[test]
    fn nonzero_exit_reports_backend_and_stderr() {
        let stderr = CapturedStream {
            bytes: b"boom".to_vec(),
            total_bytes: 4,
        };
        let response = finish(
            "bubblewrap",
            CommandStatus::new(false, Some(-9)),
            &CapturedStream::default(),
            &stderr,
            OutputLimitsConfig::default(),
        );
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("bubblewrap failed with code -9"));
        assert_eq!(response.stderr.as_deref(), Some("boom"));
    }

    #[test]
    fn overflowing_stdout_is_never_a_success() {
        let stdout = CapturedStream {
            bytes: br#"{"success":true}"#.to_vec(),
            total_bytes: 1 << 30,
        };
        let response = finish(
            "seatbelt",
            CommandStatus::new(true, Some(0)),
            &stdout,
            &CapturedStream::default(),
            OutputLimitsConfig::default(),
        );
        assert!(!response.success);
        assert!(response.error_message().contains("byte limit"));
    }

    #[test]
    fn garbage_output_is_a_parse_failure() {
        let stdout = CapturedStream {
            bytes: b"not json".to_vec(),
            total_bytes: 8,
        };
        let response = finish(
            "bubblewrap",
            CommandStatus::new(true, Some(0)),
            &stdout,
            &CapturedStream::default(),
            OutputLimitsConfig::default(),
        );
        assert_eq!(response.error.as_deref(), Some("Failed to parse worker output"));
        assert_eq!(response.stdout.as_deref(), Some("not json"));
    }
}
