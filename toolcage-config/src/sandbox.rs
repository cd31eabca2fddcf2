//! Sandbox definitions.
//!
//! A sandbox file declares the hard ceiling of capabilities granted to tools
//! (`permissions`), the paths that are always visible to the sandboxed
//! process, and the wall-clock limit for a single tool call:
//!
//! ```toml
//! name = "default"
//! type = "bubblewrap"
//! permissions = ["filesystem"]
//! filesystem_paths = ["~/projects/shared"]
//! socket_paths = ["/var/run/docker.sock"]
//! timeout = 120.0
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::constants::sandbox::{
    DEFAULT_EXECUTION_RO_PATHS, DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS,
};

/// A coarse capability a sandbox can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxPermission {
    /// Outbound and inbound network access beyond Unix domain sockets.
    Network,
    /// Read-write access to the working directory and `filesystem_paths`.
    Filesystem,
}

impl SandboxPermission {
    pub const ALL: [Self; 2] = [Self::Network, Self::Filesystem];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for SandboxPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sandbox permission '{0}' (expected 'network' or 'filesystem')")]
pub struct UnknownPermission(pub String);

impl FromStr for SandboxPermission {
    type Err = UnknownPermission;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "network" => Ok(Self::Network),
            "filesystem" => Ok(Self::Filesystem),
            other => Err(UnknownPermission(other.to_string())),
        }
    }
}

/// An ordered set of [`SandboxPermission`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<SandboxPermission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        SandboxPermission::ALL.into_iter().collect()
    }

    pub fn contains(&self, permission: SandboxPermission) -> bool {
        self.0.contains(&permission)
    }

    pub fn insert(&mut self, permission: SandboxPermission) -> bool {
        self.0.insert(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = SandboxPermission> + '_ {
        self.0.iter().copied()
    }

    pub fn intersection(&self, other: &Self) -> Self {
        self.0.intersection(&other.0).copied().collect()
    }

    /// Permissions in `self` that `other` does not contain.
    pub fn difference(&self, other: &Self) -> Self {
        self.0.difference(&other.0).copied().collect()
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(SandboxPermission::as_str).collect()
    }
}

impl FromIterator<SandboxPermission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = SandboxPermission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<&[SandboxPermission]> for PermissionSet {
    fn from(value: &[SandboxPermission]) -> Self {
        value.iter().copied().collect()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(", "))
    }
}

/// OS isolation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxType {
    /// Linux user namespaces through `bwrap`.
    Bubblewrap,
    /// macOS Seatbelt profiles through `sandbox-exec`.
    Seatbelt,
}

impl SandboxType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bubblewrap => "bubblewrap",
            Self::Seatbelt => "seatbelt",
        }
    }

    /// Backend matching the host OS.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Seatbelt
        } else {
            Self::Bubblewrap
        }
    }
}

impl fmt::Display for SandboxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sandbox definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SandboxConfig {
    #[serde(default = "default_version")]
    pub version: String,

    pub name: String,

    #[serde(rename = "type")]
    pub sandbox_type: SandboxType,

    /// Hard ceiling of capabilities any tool may receive.
    #[serde(default)]
    pub permissions: PermissionSet,

    /// Mounted read-only regardless of permissions (interpreters, libraries).
    #[serde(default = "default_execution_ro_paths")]
    pub execution_ro_paths: Vec<String>,

    /// Mounted read-write regardless of permissions (caches).
    #[serde(default)]
    pub execution_rw_paths: Vec<String>,

    /// Mounted read-write only when `filesystem` is granted.
    #[serde(default)]
    pub filesystem_paths: Vec<String>,

    /// Unix domain sockets reachable even without `network`.
    #[serde(default)]
    pub socket_paths: Vec<String>,

    /// Seconds allowed for one tool call.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_execution_ro_paths() -> Vec<String> {
    DEFAULT_EXECUTION_RO_PATHS
        .iter()
        .map(|path| (*path).to_string())
        .collect()
}

const fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

impl SandboxConfig {
    /// A sandbox with no permissions and default paths.
    pub fn new(name: impl Into<String>, sandbox_type: SandboxType) -> Self {
        Self {
            version: default_version(),
            name: name.into(),
            sandbox_type,
            permissions: PermissionSet::new(),
            execution_ro_paths: default_execution_ro_paths(),
            execution_rw_paths: Vec::new(),
            filesystem_paths: Vec::new(),
            socket_paths: Vec::new(),
            timeout: default_timeout(),
        }
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = SandboxPermission>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }

    pub fn has_permission(&self, permission: SandboxPermission) -> bool {
        self.permissions.contains(permission)
    }

    /// The per-call timeout. Fails for negative, NaN or unrepresentable values.
    pub fn timeout_duration(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.timeout).with_context(|| {
            format!("sandbox '{}': invalid timeout {}", self.name, self.timeout)
        })
    }

    pub fn expanded_execution_ro_paths(&self) -> Vec<PathBuf> {
        self.execution_ro_paths.iter().map(|p| expand_path(p)).collect()
    }

    pub fn expanded_execution_rw_paths(&self) -> Vec<PathBuf> {
        self.execution_rw_paths.iter().map(|p| expand_path(p)).collect()
    }

    pub fn expanded_filesystem_paths(&self) -> Vec<PathBuf> {
        self.filesystem_paths.iter().map(|p| expand_path(p)).collect()
    }

    pub fn expanded_socket_paths(&self) -> Vec<PathBuf> {
        self.socket_paths.iter().map(|p| expand_path(p)).collect()
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.name.trim().is_empty(), "sandbox name must not be empty");
        ensure!(
            self.timeout.is_finite() && (MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout),
            "sandbox '{}': timeout must be between {} and {} seconds (got {})",
            self.name,
            MIN_TIMEOUT_SECS,
            MAX_TIMEOUT_SECS,
            self.timeout
        );
        Ok(())
    }

    /// Parse and validate a single sandbox file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read sandbox config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse sandbox config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid sandbox config {}", path.display()))?;
        Ok(config)
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_path(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// All sandbox definitions found in a sandboxes directory.
#[derive(Debug, Clone, Default)]
pub struct BatchSandboxConfig {
    sandboxes: Vec<SandboxConfig>,
}

impl BatchSandboxConfig {
    /// Load every `*.toml` file in `dir`, in file-name order.
    ///
    /// A missing directory yields an empty batch.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "no sandbox directory");
            return Ok(Self::default());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("failed to list sandbox directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                files.push(path);
            }
        }
        files.sort();

        let mut batch = Self::default();
        for path in files {
            batch.push(SandboxConfig::load(&path)?)?;
        }
        Ok(batch)
    }

    pub fn push(&mut self, sandbox: SandboxConfig) -> Result<()> {
        if self.get(&sandbox.name).is_some() {
            bail!("duplicate sandbox name '{}'", sandbox.name);
        }
        self.sandboxes.push(sandbox);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SandboxConfig> {
        self.sandboxes.iter().find(|sandbox| sandbox.name == name)
    }

    pub fn sandboxes(&self) -> &[SandboxConfig] {
        &self.sandboxes
    }

    pub fn names(&self) -> Vec<&str> {
        self.sandboxes.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sandboxes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_minimal_sandbox() {
        let config: SandboxConfig = toml::from_str(
            r#"
            name = "minimal"
            type = "bubblewrap"
            "#,
        )
        .expect("parse");

        assert_eq!(config.sandbox_type, SandboxType::Bubblewrap);
        assert!(config.permissions.is_empty());
        assert_eq!(config.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.execution_ro_paths.len(), DEFAULT_EXECUTION_RO_PATHS.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unrepresentable_timeout_is_an_error() {
        let mut config = SandboxConfig::new("wild", SandboxType::Bubblewrap);
        assert_eq!(
            config.timeout_duration().expect("default timeout").as_secs_f64(),
            DEFAULT_TIMEOUT_SECS
        );

        for timeout in [1e20, -1.0, f64::NAN] {
            config.timeout = timeout;
            let err = config.timeout_duration().expect_err("timeout should be rejected");
            assert!(err.to_string().contains("invalid timeout"), "{err}");
        }
    }

    #[test]
    fn duplicate_permissions_collapse() {
        let config: SandboxConfig = toml::from_str(
            r#"
            name = "dup"
            type = "seatbelt"
            permissions = ["network", "filesystem", "network"]
            "#,
        )
        .expect("parse");

        assert_eq!(config.permissions.names(), vec!["network", "filesystem"]);
    }

    #[test]
    fn rejects_unknown_permission() {
        let result: Result<SandboxConfig, _> = toml::from_str(
            r#"
            name = "bad"
            type = "bubblewrap"
            permissions = ["gpu"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn timeout_bounds_are_enforced() {
        let mut config = SandboxConfig::new("t", SandboxType::Bubblewrap);
        config.timeout = 0.5;
        assert!(config.validate().is_err());
        config.timeout = 3600.5;
        assert!(config.validate().is_err());
        config.timeout = 1.0;
        assert!(config.validate().is_ok());
        config.timeout = 3600.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn set_algebra() {
        let all = PermissionSet::all();
        let fs: PermissionSet = [SandboxPermission::Filesystem].into_iter().collect();

        assert_eq!(all.intersection(&fs), fs);
        assert_eq!(
            all.difference(&fs).names(),
            vec![SandboxPermission::Network.as_str()]
        );
        assert!(fs.is_subset(&all));
        assert!(!all.is_subset(&fs));
    }

    #[test]
    fn permission_from_str() {
        assert_eq!(
            "Network".parse::<SandboxPermission>(),
            Ok(SandboxPermission::Network)
        );
        assert!("disk".parse::<SandboxPermission>().is_err());
    }

    #[test]
    fn tilde_expansion() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_path("~/cache"), home.join("cache"));
        assert_eq!(expand_path("/opt/tool"), PathBuf::from("/opt/tool"));
    }
}
