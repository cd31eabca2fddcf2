//! MCP server launch definitions.

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::sandbox::SandboxPermission;

/// How an MCP server subprocess is launched and what it may do once sandboxed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct McpServerConfig {
    pub name: String,

    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Permissions the server needs. `None` or empty denies the server while a
    /// sandbox is active, unless `sandbox_bypass` is set.
    #[serde(default)]
    pub sandbox_permissions: Option<Vec<SandboxPermission>>,

    /// Launch without any sandbox wrapping.
    #[serde(default)]
    pub sandbox_bypass: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl McpServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            sandbox_permissions: None,
            sandbox_bypass: false,
            enabled: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.name.trim().is_empty(), "mcp server name must not be empty");
        ensure!(
            !self.command.trim().is_empty(),
            "mcp server '{}' has no command",
            self.name
        );
        Ok(())
    }
}

/// `[mcp]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

impl McpConfig {
    pub fn server(&self, name: &str) -> Option<&McpServerConfig> {
        self.servers.iter().find(|server| server.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        for server in &self.servers {
            server.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_permissions_stay_none() {
        let server: McpServerConfig = toml::from_str(
            r#"
            name = "fetch"
            command = "uvx"
            args = ["mcp-server-fetch"]
            "#,
        )
        .expect("parse");

        assert_eq!(server.sandbox_permissions, None);
        assert!(!server.sandbox_bypass);
        assert!(server.enabled);
    }

    #[test]
    fn empty_command_is_invalid() {
        let server = McpServerConfig::new("broken", " ");
        assert!(server.validate().is_err());
    }
}
