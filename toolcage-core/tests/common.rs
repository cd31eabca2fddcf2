#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use toolcage_config::{OutputLimitsConfig, PermissionSet, SandboxConfig, SandboxPermission, SandboxType};
use toolcage_core::sandboxing::SandboxError;
use toolcage_core::{Sandbox, SandboxBackend, WorkerCommand};

/// Runs the worker directly and records every permission set it was handed.
#[derive(Debug, Clone, Default)]
pub struct PassthroughBackend {
    pub seen: Arc<Mutex<Vec<PermissionSet>>>,
}

impl SandboxBackend for PassthroughBackend {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn build_sandbox_command(&self, permissions: &PermissionSet) -> Result<Vec<String>, SandboxError> {
        self.seen.lock().push(permissions.clone());
        Ok(Vec::new())
    }

    fn build_mcp_wrapper(
        &self,
        command: &str,
        args: &[String],
        permissions: &PermissionSet,
    ) -> Result<(String, Vec<String>), SandboxError> {
        self.seen.lock().push(permissions.clone());
        let mut wrapped = vec![command.to_string()];
        wrapped.extend(args.iter().cloned());
        Ok(("wrap".to_string(), wrapped))
    }

    fn prepare_env(&self, env: &mut HashMap<String, String>, _permissions: &PermissionSet) {
        env.insert("PASSTHROUGH".to_string(), "1".to_string());
    }
}

pub fn config(granted: &[SandboxPermission]) -> SandboxConfig {
    SandboxConfig::new("test", SandboxType::Bubblewrap).with_permissions(granted.iter().copied())
}

/// A sandbox whose worker is `sh -c <script>`.
pub fn script_sandbox(
    granted: &[SandboxPermission],
    working_dir: &Path,
    script: &str,
) -> (Sandbox, PassthroughBackend) {
    let backend = PassthroughBackend::default();
    let sandbox = Sandbox::new(
        Arc::new(config(granted)),
        working_dir.to_path_buf(),
        Box::new(backend.clone()),
        WorkerCommand::new("/bin/sh").with_args(["-c", script]),
    );
    (sandbox, backend)
}

pub fn limits(stdout_max_bytes: usize) -> OutputLimitsConfig {
    OutputLimitsConfig {
        stdout_max_bytes,
        ..OutputLimitsConfig::default()
    }
}
