//! `[debug]` section: opt-in tracing for the CLI.
//!
//! ```toml
//! [debug]
//! enable_tracing = true
//! trace_level = "debug"
//! trace_targets = ["toolcage_core::sandboxing"]
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_TRACE_TARGETS;

/// Verbosity applied to every configured trace target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum TraceLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl TraceLevel {
    const NAMES: [(Self, &'static str); 5] = [
        (Self::Error, "error"),
        (Self::Warn, "warn"),
        (Self::Info, "info"),
        (Self::Debug, "debug"),
        (Self::Trace, "trace"),
    ];

    pub fn as_str(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(level, _)| *level == self)
            .map_or("info", |(_, name)| name)
    }
}

impl FromStr for TraceLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::NAMES
            .iter()
            .find(|(_, name)| *name == wanted)
            .map(|(level, _)| *level)
            .ok_or_else(|| format!("unknown trace level '{value}'"))
    }
}

/// Unknown levels fall back to the default rather than rejecting the file.
impl From<String> for TraceLevel {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DebugConfig {
    /// Install a subscriber even when `RUST_LOG` is unset.
    #[serde(default)]
    pub enable_tracing: bool,

    #[serde(default)]
    pub trace_level: TraceLevel,

    /// Module paths to trace, e.g. `toolcage_core::sandboxing`.
    /// Empty means the toolcage crates.
    #[serde(default)]
    pub trace_targets: Vec<String>,
}

impl DebugConfig {
    /// `EnvFilter` directives: `target=level` for each target.
    pub fn filter_directives(&self) -> String {
        let level = self.trace_level.as_str();
        let configured: Vec<&str> = if self.trace_targets.is_empty() {
            DEFAULT_TRACE_TARGETS.split(',').collect()
        } else {
            self.trace_targets.iter().map(String::as_str).collect()
        };

        configured
            .into_iter()
            .map(str::trim)
            .filter(|target| !target.is_empty())
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}
