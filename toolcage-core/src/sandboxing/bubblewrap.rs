//! Linux isolation through `bwrap` namespaces.

use std::path::Path;

use toolcage_config::constants::env;
use toolcage_config::{PermissionSet, SandboxPermission};

use super::backend::{BackendContext, SandboxBackend};
use super::error::SandboxError;

pub const BWRAP_BINARY: &str = "bwrap";

#[derive(Debug, Clone)]
pub struct BubblewrapBackend {
    ctx: BackendContext,
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn push_mount(args: &mut Vec<String>, flag: &str, path: &Path) {
    let path = path_arg(path);
    args.push(flag.to_string());
    args.push(path.clone());
    args.push(path);
}

impl BubblewrapBackend {
    pub fn new(ctx: BackendContext) -> Self {
        Self { ctx }
    }

    /// `bwrap` is on `PATH` and we are on Linux.
    pub fn is_available() -> bool {
        cfg!(target_os = "linux") && which::which(BWRAP_BINARY).is_ok()
    }

    /// Mounts and namespace flags shared by tool calls and MCP servers.
    fn base_args(&self, permissions: &PermissionSet) -> Vec<String> {
        let config = &self.ctx.config;
        let mut args: Vec<String> = ["--proc", "/proc", "--dev", "/dev", "--tmpfs", "/tmp"]
            .into_iter()
            .map(String::from)
            .collect();

        for path in config.expanded_execution_ro_paths() {
            push_mount(&mut args, "--ro-bind-try", &path);
        }
        if let Some(worker_dir) = &self.ctx.worker_dir {
            push_mount(&mut args, "--ro-bind-try", worker_dir);
        }
        for path in config.expanded_execution_rw_paths() {
            push_mount(&mut args, "--bind-try", &path);
        }
        for path in config.expanded_socket_paths() {
            push_mount(&mut args, "--bind-try", &path);
        }

        if permissions.contains(SandboxPermission::Filesystem) {
            for path in config.expanded_filesystem_paths() {
                push_mount(&mut args, "--bind-try", &path);
            }
            push_mount(&mut args, "--bind", &self.ctx.working_dir);
        }

        if !permissions.contains(SandboxPermission::Network) {
            args.push("--unshare-net".to_string());
        }
        args.push("--unshare-pid".to_string());
        args.push("--die-with-parent".to_string());
        args
    }
}

impl SandboxBackend for BubblewrapBackend {
    fn name(&self) -> &'static str {
        "bubblewrap"
    }

    fn build_sandbox_command(
        &self,
        permissions: &PermissionSet,
    ) -> Result<Vec<String>, SandboxError> {
        let mut command = vec![BWRAP_BINARY.to_string()];
        command.extend(self.base_args(permissions));

        if permissions.contains(SandboxPermission::Filesystem) {
            let working_dir = path_arg(&self.ctx.working_dir);
            command.extend([
                "--setenv".to_string(),
                env::WORKING_DIR.to_string(),
                working_dir.clone(),
                "--chdir".to_string(),
                working_dir,
            ]);
        } else {
            command.extend(["--chdir".to_string(), "/".to_string()]);
        }
        command.push("--".to_string());

        tracing::debug!(backend = "bubblewrap", ?command, "sandbox command");
        Ok(command)
    }

    fn build_mcp_wrapper(
        &self,
        command: &str,
        args: &[String],
        permissions: &PermissionSet,
    ) -> Result<(String, Vec<String>), SandboxError> {
        let resolved = which::which(command)
            .map(|path| path_arg(&path))
            .unwrap_or_else(|_| command.to_string());

        let mut wrapped = self.base_args(permissions);
        wrapped.push("--".to_string());
        wrapped.push(resolved);
        wrapped.extend(args.iter().cloned());

        tracing::debug!(backend = "bubblewrap", command, args = ?wrapped, "wrapped MCP server");
        Ok((BWRAP_BINARY.to_string(), wrapped))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use toolcage_config::{SandboxConfig, SandboxType};

    use super::*;

    fn backend(config: SandboxConfig) -> BubblewrapBackend {
        BubblewrapBackend::new(BackendContext {
            config: Arc::new(config),
            working_dir: PathBuf::from("/work/project"),
            worker_dir: Some(PathBuf::from("/opt/toolcage/bin")),
        })
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    fn subsets() -> Vec<PermissionSet> {
        vec![
            PermissionSet::new(),
            [SandboxPermission::Network].into_iter().collect(),
            [SandboxPermission::Filesystem].into_iter().collect(),
            PermissionSet::all(),
        ]
    }

    #[test]
    fn unshare_net_iff_network_absent() {
        let backend = backend(SandboxConfig::new("t", SandboxType::Bubblewrap));
        for permissions in subsets() {
            let command = backend.build_sandbox_command(&permissions).expect("command");
            let isolated = command.iter().any(|arg| arg == "--unshare-net");
            assert_eq!(
                isolated,
                !permissions.contains(SandboxPermission::Network),
                "permissions: {permissions}"
            );
            assert!(command.iter().any(|arg| arg == "--unshare-pid"));
            assert!(command.iter().any(|arg| arg == "--die-with-parent"));
        }
    }

    #[test]
    fn working_dir_bound_only_with_filesystem() {
        let backend = backend(SandboxConfig::new("t", SandboxType::Bubblewrap));

        let closed = backend.build_sandbox_command(&PermissionSet::new()).expect("command");
        assert!(has_pair(&closed, "--chdir", "/"));
        assert!(!closed.iter().any(|arg| arg == "--bind"));
        assert!(!closed.iter().any(|arg| arg == env::WORKING_DIR));

        let open: PermissionSet = [SandboxPermission::Filesystem].into_iter().collect();
        let command = backend.build_sandbox_command(&open).expect("command");
        assert!(has_pair(&command, "--bind", "/work/project"));
        assert!(has_pair(&command, "--chdir", "/work/project"));
        assert!(has_pair(&command, env::WORKING_DIR, "/work/project"));
    }

    #[test]
    fn mounts_follow_config() {
        let mut config = SandboxConfig::new("t", SandboxType::Bubblewrap);
        config.execution_ro_paths = vec!["/usr".to_string()];
        config.execution_rw_paths = vec!["/var/cache/build".to_string()];
        config.filesystem_paths = vec!["/data".to_string()];
        config.socket_paths = vec!["/var/run/docker.sock".to_string()];
        let backend = backend(config);

        let command = backend.build_sandbox_command(&PermissionSet::new()).expect("command");
        assert_eq!(command.first().map(String::as_str), Some("bwrap"));
        assert_eq!(command.last().map(String::as_str), Some("--"));
        assert!(has_pair(&command, "--ro-bind-try", "/usr"));
        assert!(has_pair(&command, "--ro-bind-try", "/opt/toolcage/bin"));
        assert!(has_pair(&command, "--bind-try", "/var/cache/build"));
        assert!(has_pair(&command, "--bind-try", "/var/run/docker.sock"));
        assert!(!has_pair(&command, "--bind-try", "/data"));

        let open: PermissionSet = [SandboxPermission::Filesystem].into_iter().collect();
        let command = backend.build_sandbox_command(&open).expect("command");
        assert!(has_pair(&command, "--bind-try", "/data"));
    }

    #[test]
    fn mcp_wrapper_appends_command_after_separator() {
        let backend = backend(SandboxConfig::new("t", SandboxType::Bubblewrap));
        let (program, args) = backend
            .build_mcp_wrapper(
                "definitely-not-installed-server",
                &["--stdio".to_string()],
                &PermissionSet::new(),
            )
            .expect("wrapper");

        assert_eq!(program, "bwrap");
        let tail: Vec<&str> = args.iter().rev().take(3).rev().map(String::as_str).collect();
        assert_eq!(tail, ["--", "definitely-not-installed-server", "--stdio"]);
        assert!(args.iter().any(|arg| arg == "--unshare-net"));
    }
}
