//! The capability interface every isolation backend implements.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use toolcage_config::{PermissionSet, SandboxConfig};

use super::error::SandboxError;

/// What a backend needs to know about the session it isolates.
#[derive(Debug, Clone)]
pub struct BackendContext {
    pub config: Arc<SandboxConfig>,
    /// The agent's working directory; writable only with `filesystem`.
    pub working_dir: PathBuf,
    /// Directory holding the worker binary; always readable.
    pub worker_dir: Option<PathBuf>,
}

/// Turns an already-narrowed permission set into a concrete sandbox invocation.
///
/// Backends never see declared or requested permissions, only the effective
/// set computed by the caller.
pub trait SandboxBackend: Send + Sync + fmt::Debug {
    /// Short name used in logs, env markers and error messages.
    fn name(&self) -> &'static str;

    /// argv prefix that the worker invocation is appended to.
    fn build_sandbox_command(&self, permissions: &PermissionSet)
    -> Result<Vec<String>, SandboxError>;

    /// `(program, args)` launching `command args...` inside the sandbox.
    fn build_mcp_wrapper(
        &self,
        command: &str,
        args: &[String],
        permissions: &PermissionSet,
    ) -> Result<(String, Vec<String>), SandboxError>;

    /// Adjust the worker environment before spawn.
    fn prepare_env(&self, _env: &mut HashMap<String, String>, _permissions: &PermissionSet) {}

    /// Release backend resources (temp files). Safe to call repeatedly.
    fn cleanup(&self) {}
}
