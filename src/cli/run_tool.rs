use std::sync::Arc;

use anyhow::{Context, Result};
use toolcage_core::tools::WorkspaceRoot;
use toolcage_core::{AgentRuntime, ToolCallResult, ToolCatalog, ToolRegistry};

use super::parse_tool_args;
use crate::startup::StartupContext;

fn render(result: &ToolCallResult) -> Result<String> {
    let rendered = match result {
        ToolCallResult::Message(message) => serde_json::to_string_pretty(message),
        ToolCallResult::Command(command) => serde_json::to_string_pretty(command),
    };
    rendered.context("Failed to render tool result")
}

pub async fn handle_run_tool_command(
    startup: &StartupContext,
    name: &str,
    raw_args: Option<&str>,
) -> Result<bool> {
    let args = parse_tool_args(raw_args)?;

    // Tools that bypass the sandbox run here and need a fixed root
    let registry = ToolRegistry::builtin_in(&WorkspaceRoot::fixed(&startup.workspace));
    let catalog = ToolCatalog::new(Arc::new(registry));

    let mut runtime = AgentRuntime::default();
    runtime.context.working_dir = startup.workspace.clone();
    runtime.context.sandbox = startup.create_sandbox()?.map(Arc::new);
    if runtime.context.sandbox.is_none() {
        tracing::debug!(tool = name, "no active sandbox; running in process");
    }

    let result = catalog.run_tool(name, args, &runtime).await;
    println!("{}", render(&result)?);
    Ok(!result.is_error())
}
