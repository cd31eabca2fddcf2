use std::time::Duration;

use anyhow::{Context, Result, ensure};
use toolcage_config::SandboxPermission;
use toolcage_config::constants::sandbox::{MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};

use super::parse_tool_args;
use crate::startup::StartupContext;

/// Options of `toolcage exec`.
#[derive(Debug, Clone)]
pub struct ExecCommandOptions {
    pub module: String,
    pub tool: String,
    pub args: Option<String>,
    /// Empty runs with the sandbox's full grant.
    pub permissions: Vec<SandboxPermission>,
    pub timeout: Option<f64>,
}

/// `--timeout` in seconds, held to the range a sandbox file accepts.
fn timeout_from_secs(seconds: f64) -> Result<Duration> {
    ensure!(
        seconds.is_finite() && (MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&seconds),
        "--timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds (got {seconds})"
    );
    Duration::try_from_secs_f64(seconds).context("invalid --timeout")
}

pub async fn handle_exec_command(startup: &StartupContext, options: ExecCommandOptions) -> Result<bool> {
    let args = parse_tool_args(options.args.as_deref())?;
    let sandbox = startup.require_sandbox()?;

    let timeout = match options.timeout {
        Some(seconds) => timeout_from_secs(seconds)?,
        None => sandbox.config().timeout_duration()?,
    };
    let permissions = (!options.permissions.is_empty()).then_some(options.permissions.as_slice());

    let response = sandbox
        .execute(&options.module, &options.tool, args, timeout, permissions, None)
        .await;
    let rendered =
        serde_json::to_string_pretty(&response).context("Failed to render worker response")?;
    println!("{rendered}");
    Ok(response.success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_flag_is_bounded() {
        assert_eq!(timeout_from_secs(2.5).expect("in range"), Duration::from_millis(2500));
        assert!(timeout_from_secs(MAX_TIMEOUT_SECS).is_ok());
        for seconds in [0.0, 0.5, -3.0, 1e20, f64::INFINITY, f64::NAN] {
            assert!(timeout_from_secs(seconds).is_err(), "{seconds} accepted");
        }
    }
}
