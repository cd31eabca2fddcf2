use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::constants::limits::{
    DEFAULT_PREVIEW_CHARS, DEFAULT_STDERR_MAX_BYTES, DEFAULT_STDOUT_MAX_BYTES,
};

/// Caps applied to the worker's output pipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputLimitsConfig {
    /// Bytes of stdout accepted before the worker is killed.
    #[serde(default = "OutputLimitsConfig::default_stdout_max_bytes")]
    pub stdout_max_bytes: usize,
    /// Bytes of stderr retained; the remainder is drained and dropped.
    #[serde(default = "OutputLimitsConfig::default_stderr_max_bytes")]
    pub stderr_max_bytes: usize,
    /// Characters of raw output included in error reports.
    #[serde(default = "OutputLimitsConfig::default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for OutputLimitsConfig {
    fn default() -> Self {
        Self {
            stdout_max_bytes: Self::default_stdout_max_bytes(),
            stderr_max_bytes: Self::default_stderr_max_bytes(),
            preview_chars: Self::default_preview_chars(),
        }
    }
}

impl OutputLimitsConfig {
    const fn default_stdout_max_bytes() -> usize {
        DEFAULT_STDOUT_MAX_BYTES
    }

    const fn default_stderr_max_bytes() -> usize {
        DEFAULT_STDERR_MAX_BYTES
    }

    const fn default_preview_chars() -> usize {
        DEFAULT_PREVIEW_CHARS
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.stdout_max_bytes > 0,
            "limits.stdout_max_bytes must be greater than zero"
        );
        ensure!(
            self.stderr_max_bytes > 0,
            "limits.stderr_max_bytes must be greater than zero"
        );
        ensure!(
            self.preview_chars > 0,
            "limits.preview_chars must be greater than zero"
        );
        Ok(())
    }
}
