use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use toolcage_core::McpServerLauncher;

use crate::startup::StartupContext;

pub async fn handle_wrap_mcp_command(startup: &StartupContext, name: &str) -> Result<bool> {
    let server = startup
        .config()
        .mcp
        .server(name)
        .with_context(|| format!("No MCP server named '{name}' in [[mcp.servers]]"))?;

    let launcher = McpServerLauncher::new(startup.create_sandbox()?.map(Arc::new));
    match launcher.prepare(server).await {
        Ok(Some(launch)) => {
            let rendered = serde_json::to_string_pretty(&json!({
                "command": launch.command,
                "args": launch.args,
            }))
            .context("Failed to render launch command")?;
            println!("{rendered}");
            Ok(true)
        }
        Ok(None) => {
            eprintln!("MCP server '{name}' will not be started (disabled or sandbox preparation failed)");
            Ok(false)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(false)
        }
    }
}
