use std::time::Duration;

use anyhow::{Context, ensure};
use async_trait::async_trait;
use serde_json::json;
use toolcage_process::run_with_timeout_in;

use super::WorkspaceRoot;
use crate::worker::protocol::{ToolArgs, ToolMessage, ToolStatus};
use crate::worker::registry::{AsyncTool, ToolResult, ToolSchema, optional_f64, required_str};
use crate::worker::runtime::ToolRuntime;

pub const MODULE: &str = "tools.terminal";

const DEFAULT_COMMAND_TIMEOUT_SECS: f64 = 30.0;

/// Runs a shell command in the working directory.
#[derive(Debug, Clone)]
pub struct RunCommandTool {
    root: WorkspaceRoot,
}

impl RunCommandTool {
    pub fn new(root: WorkspaceRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl AsyncTool for RunCommandTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            description: "Run a shell command in the working directory".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "timeout_secs": {"type": "number"}
                },
                "required": ["command"]
            }),
            runtime: false,
        }
    }

    async fn invoke(&self, args: ToolArgs, _runtime: Option<ToolRuntime>) -> ToolResult {
        let command = required_str(&args, "command")?;
        let timeout = optional_f64(&args, "timeout_secs")?.unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);
        ensure!(
            timeout.is_finite() && timeout > 0.0,
            "timeout_secs must be a positive number"
        );
        let root = self.root.get()?;

        let output = run_with_timeout_in(
            "sh",
            &["-c".to_string(), command.to_string()],
            Some(&root),
            Duration::try_from_secs_f64(timeout).context("timeout_secs is out of range")?,
        )
        .await
        .with_context(|| format!("failed to run `{command}`"))?;

        let exit_code = output.status.code();
        let mut message = ToolMessage::text(output.combined()).with_name("run_command");
        if !output.status.success() {
            message.status = ToolStatus::Error;
            message.short_content = Some(format!(
                "exit code {}",
                exit_code.map_or_else(|| "unknown".to_string(), |code| code.to_string())
            ));
        }
        message.artifact = Some(json!({"exit_code": exit_code}));
        Ok(message.into())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::worker::protocol::ToolOutput;

    fn args(value: Value) -> ToolArgs {
        match value {
            Value::Object(map) => map,
            _ => ToolArgs::new(),
        }
    }

    #[tokio::test]
    async fn runs_in_working_dir_and_reports_failures() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("marker"), "x")?;
        let tool = RunCommandTool::new(WorkspaceRoot::fixed(dir.path()));

        let output = tool.invoke(args(json!({"command": "ls"})), None).await?;
        let ToolOutput::Message(message) = output else {
            panic!("expected a message");
        };
        assert_eq!(message.content.trim(), "marker");
        assert!(!message.is_error());

        let output = tool.invoke(args(json!({"command": "exit 4"})), None).await?;
        let ToolOutput::Message(message) = output else {
            panic!("expected a message");
        };
        assert!(message.is_error());
        assert_eq!(message.artifact, Some(json!({"exit_code": 4})));
        Ok(())
    }

    #[tokio::test]
    async fn timeout_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let tool = RunCommandTool::new(WorkspaceRoot::fixed(dir.path()));
        let result = tool
            .invoke(args(json!({"command": "sleep 30", "timeout_secs": 0.2})), None)
            .await;
        assert!(result.is_err());
        Ok(())
    }
}
