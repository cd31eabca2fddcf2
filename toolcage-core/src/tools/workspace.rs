use std::path::{Component, Path, PathBuf};

use anyhow::{Result, anyhow, ensure};
use toolcage_config::constants::env;

/// Directory file tools operate in, taken from `TOOLCAGE_WORKING_DIR`.
///
/// The variable is only exported to workers granted `filesystem`, so its
/// absence means path operations must be refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    fixed: Option<PathBuf>,
}

impl WorkspaceRoot {
    /// Read the environment at call time.
    pub fn from_env() -> Self {
        Self { fixed: None }
    }

    pub fn fixed(path: impl Into<PathBuf>) -> Self {
        Self {
            fixed: Some(path.into()),
        }
    }

    pub fn get(&self) -> Result<PathBuf> {
        let root = match &self.fixed {
            Some(path) => Some(path.clone()),
            None => std::env::var_os(env::WORKING_DIR)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
        };
        root.map(|path| normalize(&path))
            .ok_or_else(|| anyhow!("working directory unavailable: filesystem permission not granted"))
    }

    /// Resolve `requested` inside the root, rejecting anything outside it.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let root = self.get()?;
        let candidate = normalize(&root.join(requested));
        ensure!(
            candidate.starts_with(&root),
            "path '{requested}' escapes the working directory"
        );

        // Symlinks can still point outside; check the real location when it exists.
        if let (Ok(real_root), Ok(real)) = (root.canonicalize(), candidate.canonicalize()) {
            ensure!(
                real.starts_with(&real_root),
                "path '{requested}' escapes the working directory"
            );
        }
        Ok(candidate)
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
