use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use toolcage_config::{ConfigManager, SandboxConfig, ToolcageConfig, expand_path};
use toolcage_core::sandboxing::resolve_worker;
use toolcage_core::{Sandbox, SandboxFactory, SandboxOptions};

use crate::cli::Cli;

/// Configuration and workspace resolved once from the command line.
#[derive(Debug)]
pub struct StartupContext {
    pub workspace: PathBuf,
    manager: ConfigManager,
    sandbox_override: Option<String>,
}

impl StartupContext {
    pub fn from_cli_args(args: &Cli) -> Result<Self> {
        let workspace = match &args.workspace {
            Some(path) => path.clone(),
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };
        let workspace = workspace
            .canonicalize()
            .with_context(|| format!("Workspace '{}' does not exist", workspace.display()))?;

        let manager = ConfigManager::load_from_workspace(&workspace)
            .with_context(|| format!("Failed to load configuration for {}", workspace.display()))?;

        Ok(Self {
            workspace,
            manager,
            sandbox_override: args.sandbox.clone(),
        })
    }

    pub fn config(&self) -> &ToolcageConfig {
        self.manager.config()
    }

    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }

    /// The sandbox definition in effect, honoring `--sandbox`.
    pub fn active_sandbox_config(&self) -> Result<Option<&SandboxConfig>> {
        self.manager.active_sandbox(self.sandbox_override.as_deref())
    }

    /// Build the active sandbox, or `None` when sandboxing is off.
    pub fn create_sandbox(&self) -> Result<Option<Sandbox>> {
        let Some(config) = self.active_sandbox_config()? else {
            return Ok(None);
        };

        let settings = &self.config().sandbox;
        let worker = settings
            .worker_path
            .as_deref()
            .map(|raw| resolve_worker(Some(Path::new(&expand_path(raw)))))
            .transpose()?;
        let options = SandboxOptions {
            worker,
            limits: self.config().limits,
            filter_sensitive_env: settings.filter_sensitive_env,
            injectors: None,
        };

        let sandbox = SandboxFactory::create(Arc::new(config.clone()), &self.workspace, options)
            .with_context(|| format!("Failed to create sandbox '{}'", config.name))?;
        Ok(Some(sandbox))
    }

    /// Like [`Self::create_sandbox`] but an active sandbox is mandatory.
    pub fn require_sandbox(&self) -> Result<Sandbox> {
        self.create_sandbox()?.context(
            "No active sandbox. Set [sandbox] enabled/active in toolcage.toml or pass --sandbox NAME",
        )
    }
}
