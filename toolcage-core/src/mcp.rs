//! Preparing MCP server launches under the active sandbox.

use std::sync::Arc;

use toolcage_config::McpServerConfig;

use crate::sandboxing::{
    GateDecision, GateSubject, McpLaunch, PermissionError, PermissionGate, Sandbox,
    ToolSandboxPolicy,
};

#[derive(Debug, Clone, Default)]
pub struct McpServerLauncher {
    sandbox: Option<Arc<Sandbox>>,
}

impl McpServerLauncher {
    pub fn new(sandbox: Option<Arc<Sandbox>>) -> Self {
        Self { sandbox }
    }

    /// The launch command for `server`.
    ///
    /// `Ok(None)` means the server should be skipped (disabled, or command
    /// injection refused it). A permission denial is an error.
    pub async fn prepare(&self, server: &McpServerConfig) -> Result<Option<McpLaunch>, PermissionError> {
        if !server.enabled {
            tracing::debug!(server = %server.name, "MCP server disabled");
            return Ok(None);
        }

        let Some(sandbox) = self.sandbox.as_deref() else {
            return Ok(Some(McpLaunch::unwrapped(&server.command, server.args.clone())));
        };

        let policy = ToolSandboxPolicy::from(server);
        let declared = match PermissionGate::evaluate(
            GateSubject::McpServer,
            &server.name,
            &policy,
            sandbox.config(),
        )? {
            GateDecision::Bypassed => {
                return Ok(Some(McpLaunch::unwrapped(&server.command, server.args.clone())));
            }
            GateDecision::Allowed(_) => policy.permissions.unwrap_or_default(),
        };

        let launch = sandbox
            .sandbox_mcp_command(&server.name, &server.command, &server.args, &declared)
            .await;
        if launch.ok {
            tracing::info!(server = %server.name, command = %launch.command, "MCP server sandboxed");
            Ok(Some(launch))
        } else {
            tracing::warn!(server = %server.name, "MCP server not started: sandbox preparation failed");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_sandbox_launches_unchanged() {
        let mut server = McpServerConfig::new("git", "uvx");
        server.args = vec!["mcp-server-git".to_string()];
        let launch = McpServerLauncher::default()
            .prepare(&server)
            .await
            .expect("no gate without sandbox")
            .expect("launch");
        assert_eq!(launch, McpLaunch::unwrapped("uvx", vec!["mcp-server-git".to_string()]));
    }

    #[tokio::test]
    async fn disabled_servers_are_skipped() {
        let mut server = McpServerConfig::new("git", "uvx");
        server.enabled = false;
        assert_eq!(McpServerLauncher::default().prepare(&server).await, Ok(None));
    }
}
