//! Small pure tools: path manipulation, process info, sleeping, text.

use std::time::Duration;

use anyhow::{Context, ensure};
use serde_json::{Value, json};
use toolcage_config::SandboxPermission;

use crate::sandboxing::ToolSandboxPolicy;
use crate::worker::protocol::{ToolArgs, ToolOutput};
use crate::worker::registry::{ToolRegistration, ToolResult, optional_f64, required_str};

/// Largest string `text.repeat` will build.
const MAX_REPEAT_BYTES: usize = 64 * 1024 * 1024;

pub fn basename(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, tail)| tail)
}

pub fn dirname(path: &str) -> &str {
    let Some((head, _)) = path.rsplit_once('/') else {
        return "";
    };
    let trimmed = head.trim_end_matches('/');
    if trimmed.is_empty() {
        // Keep the root ("/" or "//").
        if head.is_empty() { "/" } else { head }
    } else {
        trimmed
    }
}

fn path_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"p": {"type": "string"}},
        "required": ["p"]
    })
}

/// The path argument, named `p`; `path` is accepted as an alias.
fn path_arg(args: &ToolArgs) -> anyhow::Result<&str> {
    if args.contains_key("p") || !args.contains_key("path") {
        required_str(args, "p")
    } else {
        required_str(args, "path")
    }
}

fn getcwd(_: ToolArgs) -> ToolResult {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(ToolOutput::Value(Value::String(cwd.to_string_lossy().into_owned())))
}

async fn sleep(args: ToolArgs) -> ToolResult {
    let seconds = optional_f64(&args, "seconds")?.unwrap_or(0.0);
    ensure!(
        seconds.is_finite() && seconds >= 0.0,
        "seconds must be a non-negative number"
    );
    let duration = Duration::try_from_secs_f64(seconds).context("seconds is out of range")?;
    tokio::time::sleep(duration).await;
    Ok(ToolOutput::Text(format!("slept {seconds} seconds")))
}

fn repeat(args: ToolArgs) -> ToolResult {
    let text = required_str(&args, "text")?;
    let count = args
        .get("count")
        .and_then(Value::as_u64)
        .context("argument 'count' must be a non-negative integer")?;
    let count = usize::try_from(count).context("count too large")?;
    ensure!(
        text.len().saturating_mul(count) <= MAX_REPEAT_BYTES,
        "repeated text would exceed {MAX_REPEAT_BYTES} bytes"
    );
    Ok(ToolOutput::Text(text.repeat(count)))
}

pub(crate) fn registrations() -> Vec<ToolRegistration> {
    vec![
        ToolRegistration::sync_fn("os.path", "basename", |args| {
            let path = path_arg(&args)?;
            Ok(ToolOutput::Value(Value::String(basename(path).to_string())))
        })
        .with_description("Final component of a path")
        .with_parameters(path_schema())
        .with_policy(ToolSandboxPolicy::bypass()),
        ToolRegistration::sync_fn("os.path", "dirname", |args| {
            let path = path_arg(&args)?;
            Ok(ToolOutput::Value(Value::String(dirname(path).to_string())))
        })
        .with_description("Directory component of a path")
        .with_parameters(path_schema())
        .with_policy(ToolSandboxPolicy::bypass()),
        ToolRegistration::sync_fn("os", "getpid", |_| {
            Ok(ToolOutput::Value(json!(std::process::id())))
        })
        .with_description("Process id of the worker")
        .with_policy(ToolSandboxPolicy::requires([])),
        ToolRegistration::sync_fn("os", "getcwd", getcwd)
            .with_description("Current directory of the worker")
            .with_policy(ToolSandboxPolicy::requires([SandboxPermission::Filesystem])),
        ToolRegistration::async_fn("time", "sleep", sleep)
            .with_description("Sleep for a number of seconds")
            .with_parameters(json!({
                "type": "object",
                "properties": {"seconds": {"type": "number"}}
            }))
            .with_policy(ToolSandboxPolicy::bypass()),
        ToolRegistration::sync_fn("text", "repeat", repeat)
            .with_description("Repeat a string")
            .with_parameters(json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "count": {"type": "integer", "minimum": 0}
                },
                "required": ["text", "count"]
            }))
            .with_policy(ToolSandboxPolicy::bypass()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_and_dirname() {
        assert_eq!(basename("/a/b/c.txt"), "c.txt");
        assert_eq!(basename("c.txt"), "c.txt");
        assert_eq!(basename("/a/b/"), "");
        assert_eq!(dirname("/a/b/c.txt"), "/a/b");
        assert_eq!(dirname("/a"), "/");
        assert_eq!(dirname("a"), "");
        assert_eq!(dirname("/a/b//c"), "/a/b");
    }

    fn args(value: Value) -> ToolArgs {
        match value {
            Value::Object(map) => map,
            _ => ToolArgs::new(),
        }
    }

    #[test]
    fn repeat_builds_text_and_caps_size() {
        assert_eq!(
            repeat(args(json!({"text": "ab", "count": 3}))).ok(),
            Some(ToolOutput::Text("ababab".to_string()))
        );
        assert!(repeat(args(json!({"text": "x", "count": MAX_REPEAT_BYTES + 1}))).is_err());
        assert!(repeat(args(json!({"text": "x"}))).is_err());
    }

    #[tokio::test]
    async fn sleep_rejects_negative_and_huge_durations() {
        assert!(sleep(args(json!({"seconds": -1}))).await.is_err());
        let err = sleep(args(json!({"seconds": 1e20}))).await.expect_err("out of range");
        assert!(err.to_string().contains("out of range"), "{err}");
        assert!(sleep(args(json!({"seconds": 0.01}))).await.is_ok());
    }

    #[test]
    fn path_tools_take_p_or_path() {
        assert_eq!(path_arg(&args(json!({"p": "/a/b/c.txt"}))).ok(), Some("/a/b/c.txt"));
        assert_eq!(path_arg(&args(json!({"path": "/x/y"}))).ok(), Some("/x/y"));
        let err = path_arg(&args(json!({}))).expect_err("missing");
        assert!(err.to_string().contains("'p'"), "{err}");
    }
}
