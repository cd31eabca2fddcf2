use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::constants::paths::{CONFIG_DIR, CONFIG_FILE_NAME, SANDBOXES_DIR};
use crate::root::ToolcageConfig;
use crate::sandbox::{BatchSandboxConfig, SandboxConfig};

/// Recursively merge two TOML values.
///
/// If both values are tables, they are merged recursively.
/// Otherwise, the `overlay` value replaces the `base` value.
pub fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(key) {
                    merge_toml_values(base_value, value);
                } else {
                    base_table.insert(key.clone(), value.clone());
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Loads `toolcage.toml` (user layer, then workspace layer) and the sandbox
/// definitions of a workspace.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: ToolcageConfig,
    sandboxes: BatchSandboxConfig,
    workspace_root: PathBuf,
    config_paths: Vec<PathBuf>,
}

impl ConfigManager {
    /// Load configuration for a specific workspace.
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        let workspace = workspace.as_ref();
        let home_config = dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE_NAME));
        Self::load_layers(workspace, home_config.as_deref())
    }

    fn load_layers(workspace: &Path, home_config: Option<&Path>) -> Result<Self> {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut config_paths = Vec::new();

        let workspace_config = workspace.join(CONFIG_FILE_NAME);
        for path in home_config.into_iter().chain(std::iter::once(workspace_config.as_path())) {
            if !path.is_file() {
                continue;
            }
            let layer = Self::load_toml_from_file(path)?;
            merge_toml_values(&mut merged, &layer);
            config_paths.push(path.to_path_buf());
        }

        let config: ToolcageConfig = merged
            .try_into()
            .context("Failed to deserialize merged configuration")?;
        config.validate()?;

        let sandboxes =
            BatchSandboxConfig::load_from_dir(&workspace.join(CONFIG_DIR).join(SANDBOXES_DIR))?;

        tracing::debug!(
            workspace = %workspace.display(),
            layers = config_paths.len(),
            sandboxes = sandboxes.sandboxes().len(),
            "configuration loaded"
        );

        Ok(Self {
            config,
            sandboxes,
            workspace_root: workspace.to_path_buf(),
            config_paths,
        })
    }

    fn load_toml_from_file(path: &Path) -> Result<toml::Value> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn config(&self) -> &ToolcageConfig {
        &self.config
    }

    pub fn sandboxes(&self) -> &BatchSandboxConfig {
        &self.sandboxes
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Files that contributed to the merged configuration, lowest precedence first.
    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    /// The sandbox definition to use, if sandboxing is enabled.
    ///
    /// `override_name` takes precedence over `[sandbox].active`. An enabled
    /// sandbox section that names an unknown definition is an error.
    pub fn active_sandbox(&self, override_name: Option<&str>) -> Result<Option<&SandboxConfig>> {
        let name = match override_name {
            Some(name) => name,
            None if !self.config.sandbox.enabled => return Ok(None),
            None => match self.config.sandbox.active.as_deref() {
                Some(name) => name,
                None => anyhow::bail!("[sandbox] is enabled but no active sandbox is named"),
            },
        };

        self.sandboxes.get(name).map(Some).with_context(|| {
            format!(
                "Unknown sandbox '{}' (available: {})",
                name,
                self.sandboxes.names().join(", ")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    #[test]
    fn workspace_layer_overrides_home_layer() {
        let home = TempDir::new().expect("home");
        let workspace = TempDir::new().expect("workspace");

        home.child("toolcage.toml")
            .write_str("[limits]\nstdout_max_bytes = 10\npreview_chars = 5\n")
            .expect("write home");
        workspace
            .child("toolcage.toml")
            .write_str("[limits]\nstdout_max_bytes = 20\n")
            .expect("write workspace");

        let manager = ConfigManager::load_layers(
            workspace.path(),
            Some(home.child("toolcage.toml").path()),
        )
        .expect("load");

        assert_eq!(manager.config().limits.stdout_max_bytes, 20);
        assert_eq!(manager.config().limits.preview_chars, 5);
        assert_eq!(manager.config_paths().len(), 2);
    }

    #[test]
    fn enabled_sandbox_without_definition_is_an_error() {
        let workspace = TempDir::new().expect("workspace");
        workspace
            .child("toolcage.toml")
            .write_str("[sandbox]\nenabled = true\nactive = \"missing\"\n")
            .expect("write");

        let manager = ConfigManager::load_layers(workspace.path(), None).expect("load");
        assert!(manager.active_sandbox(None).is_err());
    }

    #[test]
    fn disabled_sandbox_yields_none() {
        let workspace = TempDir::new().expect("workspace");
        let manager = ConfigManager::load_layers(workspace.path(), None).expect("load");
        assert!(manager.active_sandbox(None).expect("lookup").is_none());
    }
}
