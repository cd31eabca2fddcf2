use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::debug::DebugConfig;
use crate::limits::OutputLimitsConfig;
use crate::mcp::McpConfig;

/// `[sandbox]` section: which sandbox definition is active and how the worker is found.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SandboxSettings {
    /// Route tool calls and MCP launches through the active sandbox.
    #[serde(default)]
    pub enabled: bool,

    /// Name of the sandbox definition (from `.toolcage/sandboxes/`) to use.
    #[serde(default)]
    pub active: Option<String>,

    /// Explicit worker binary; otherwise resolved next to the CLI or on `PATH`.
    #[serde(default)]
    pub worker_path: Option<String>,

    /// Strip credential-bearing variables from the worker environment.
    #[serde(default)]
    pub filter_sensitive_env: bool,
}

/// Root configuration (`toolcage.toml`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolcageConfig {
    #[serde(default)]
    pub sandbox: SandboxSettings,

    #[serde(default)]
    pub limits: OutputLimitsConfig,

    #[serde(default)]
    pub debug: DebugConfig,

    #[serde(default)]
    pub mcp: McpConfig,
}

impl ToolcageConfig {
    pub fn validate(&self) -> Result<()> {
        self.limits
            .validate()
            .context("Invalid limits configuration")?;
        self.mcp.validate().context("Invalid mcp configuration")?;
        Ok(())
    }
}
