//! The per-session sandbox: backend-independent execution and MCP wrapping.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use toolcage_config::{OutputLimitsConfig, SandboxConfig, SandboxPermission};

use super::backend::SandboxBackend;
use super::env::{build_worker_env, current_env};
use super::error::SandboxError;
use super::execution::{WorkerInvocation, run_worker};
use super::injectors::InjectorChain;
use super::permissions::{compute_effective_permissions, missing_permissions};
use crate::worker::protocol::{ToolArgs, ToolResponse, WorkerRequest};
use crate::worker::runtime::RuntimeContext;

/// Program (plus fixed arguments) that speaks the worker protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Directory the sandbox must expose read-only for the worker to start.
    pub fn install_dir(&self) -> Option<PathBuf> {
        if !self.program.is_absolute() {
            return None;
        }
        let resolved = self
            .program
            .canonicalize()
            .unwrap_or_else(|_| self.program.clone());
        resolved.parent().map(Path::to_path_buf)
    }

    fn argv(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.program.to_string_lossy().into_owned()).chain(self.args.iter().cloned())
    }
}

/// Launch command for an MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpLaunch {
    pub command: String,
    pub args: Vec<String>,
    /// `false` means the server must not be started.
    pub ok: bool,
}

impl McpLaunch {
    pub fn unwrapped(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            ok: true,
        }
    }

    fn refused(command: &str, args: &[String]) -> Self {
        Self {
            command: command.to_string(),
            args: args.to_vec(),
            ok: false,
        }
    }
}

#[derive(Debug)]
pub struct Sandbox {
    config: Arc<SandboxConfig>,
    working_dir: PathBuf,
    backend: Box<dyn SandboxBackend>,
    worker: WorkerCommand,
    injectors: InjectorChain,
    limits: OutputLimitsConfig,
    filter_sensitive_env: bool,
}

impl Sandbox {
    pub fn new(
        config: Arc<SandboxConfig>,
        working_dir: PathBuf,
        backend: Box<dyn SandboxBackend>,
        worker: WorkerCommand,
    ) -> Self {
        Self {
            config,
            working_dir,
            backend,
            worker,
            injectors: InjectorChain::default(),
            limits: OutputLimitsConfig::default(),
            filter_sensitive_env: false,
        }
    }

    #[must_use]
    pub fn with_injectors(mut self, injectors: InjectorChain) -> Self {
        self.injectors = injectors;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: OutputLimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_env_filtering(mut self, filter_sensitive_env: bool) -> Self {
        self.filter_sensitive_env = filter_sensitive_env;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run one tool call in a fresh worker process.
    ///
    /// `tool_permissions` narrows the sandbox grant; `None` runs with the full
    /// grant. Failures of any kind come back as an unsuccessful response.
    pub async fn execute(
        &self,
        module_path: &str,
        tool_name: &str,
        args: ToolArgs,
        timeout: Duration,
        tool_permissions: Option<&[SandboxPermission]>,
        runtime_context: Option<&RuntimeContext>,
    ) -> ToolResponse {
        let request = WorkerRequest {
            module: module_path.to_string(),
            tool_name: tool_name.to_string(),
            args,
            runtime_context: runtime_context.cloned(),
        };
        let payload = match serde_json::to_vec(&request) {
            Ok(payload) => payload,
            Err(err) => {
                return ToolResponse::failure(format!(
                    "Cannot serialize tool args for sandbox: {err}"
                ));
            }
        };

        let permissions = compute_effective_permissions(&self.config, tool_permissions);
        let mut argv = match self.backend.build_sandbox_command(&permissions) {
            Ok(argv) => argv,
            Err(err) => return ToolResponse::failure(err.to_string()),
        };
        argv.extend(self.worker.argv());

        let exported_dir = permissions
            .contains(SandboxPermission::Filesystem)
            .then_some(self.working_dir.as_path());
        let mut env = build_worker_env(
            current_env(),
            self.filter_sensitive_env,
            self.backend.name(),
            exported_dir,
        );
        self.backend.prepare_env(&mut env, &permissions);

        tracing::debug!(
            backend = self.backend.name(),
            module = module_path,
            tool = tool_name,
            %permissions,
            ?timeout,
            "executing tool in sandbox"
        );
        run_worker(WorkerInvocation {
            argv,
            env,
            current_dir: &self.working_dir,
            request: payload,
            timeout,
            limits: self.limits,
            backend: self.backend.name(),
        })
        .await
    }

    /// Prepare an MCP server launch: permission check, command injection,
    /// then backend wrapping.
    pub async fn sandbox_mcp_command(
        &self,
        name: &str,
        command: &str,
        args: &[String],
        mcp_permissions: &[SandboxPermission],
    ) -> McpLaunch {
        let missing = missing_permissions(&self.config, mcp_permissions);
        if !missing.is_empty() {
            tracing::warn!(
                server = name,
                %missing,
                "MCP server requires permissions not granted by sandbox"
            );
            return McpLaunch::refused(command, args);
        }

        let injected = self
            .injectors
            .apply(name, command.to_string(), args.to_vec(), &self.config)
            .await;
        if !injected.success {
            tracing::warn!(server = name, "command injection failed; refusing to start");
            return McpLaunch::refused(&injected.command, &injected.args);
        }

        match self.wrap_mcp_command(&injected.command, &injected.args, Some(mcp_permissions)) {
            Ok((command, args)) => McpLaunch {
                command,
                args,
                ok: true,
            },
            Err(err) => {
                tracing::warn!(server = name, error = %err, "failed to wrap MCP server");
                McpLaunch::refused(&injected.command, &injected.args)
            }
        }
    }

    /// Wrap `command args...` for the backend. `None` uses the full grant.
    pub fn wrap_mcp_command(
        &self,
        command: &str,
        args: &[String],
        permissions: Option<&[SandboxPermission]>,
    ) -> Result<(String, Vec<String>), SandboxError> {
        let effective = compute_effective_permissions(&self.config, permissions);
        self.backend.build_mcp_wrapper(command, args, &effective)
    }

    /// Remove backend temp files. Also runs on drop.
    pub fn cleanup(&self) {
        self.backend.cleanup();
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        self.cleanup();
    }
}
