//! Selecting and constructing the sandbox backend for a config.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use toolcage_config::constants::{WORKER_BINARY_NAME, env as env_keys};
use toolcage_config::{OutputLimitsConfig, SandboxConfig, SandboxType};

use super::backend::{BackendContext, SandboxBackend};
use super::bubblewrap::BubblewrapBackend;
use super::error::SandboxError;
use super::injectors::InjectorChain;
use super::sandbox::{Sandbox, WorkerCommand};
use super::seatbelt::SeatbeltBackend;

/// Knobs that do not belong to the sandbox definition itself.
#[derive(Debug, Default)]
pub struct SandboxOptions {
    /// Explicit worker; otherwise resolved with [`resolve_worker`].
    pub worker: Option<WorkerCommand>,
    pub limits: OutputLimitsConfig,
    pub filter_sensitive_env: bool,
    pub injectors: Option<InjectorChain>,
}

/// Locate the worker binary: explicit path, `TOOLCAGE_WORKER`, next to the
/// running executable, then `PATH`.
pub fn resolve_worker(explicit: Option<&Path>) -> Result<WorkerCommand, SandboxError> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(WorkerCommand::new(path))
        } else {
            Err(SandboxError::WorkerNotFound(path.display().to_string()))
        };
    }

    if let Some(path) = env::var_os(env_keys::WORKER_PATH).map(PathBuf::from) {
        if path.is_file() {
            return Ok(WorkerCommand::new(path));
        }
        tracing::warn!(path = %path.display(), "{} does not point to a file", env_keys::WORKER_PATH);
    }

    let sibling = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(WORKER_BINARY_NAME)))
        .filter(|candidate| candidate.is_file());
    if let Some(path) = sibling {
        return Ok(WorkerCommand::new(path));
    }

    which::which(WORKER_BINARY_NAME)
        .map(WorkerCommand::new)
        .map_err(|_| SandboxError::WorkerNotFound(WORKER_BINARY_NAME.to_string()))
}

pub struct SandboxFactory;

impl SandboxFactory {
    /// Build a sandbox for `config`, failing fast when the backend cannot run
    /// on this host.
    pub fn create(
        config: Arc<SandboxConfig>,
        working_dir: impl Into<PathBuf>,
        options: SandboxOptions,
    ) -> Result<Sandbox, SandboxError> {
        config
            .validate()
            .map_err(|err| SandboxError::InvalidConfig(format!("{err:#}")))?;

        let worker = match options.worker {
            Some(worker) => worker,
            None => resolve_worker(None)?,
        };
        let ctx = BackendContext {
            config: Arc::clone(&config),
            working_dir: working_dir.into(),
            worker_dir: worker.install_dir(),
        };
        let working_dir = ctx.working_dir.clone();

        let backend: Box<dyn SandboxBackend> = match config.sandbox_type {
            SandboxType::Bubblewrap => {
                if !BubblewrapBackend::is_available() {
                    return Err(SandboxError::Unavailable {
                        label: "Bubblewrap",
                        hint: "Install with: sudo apt install bubblewrap",
                    });
                }
                Box::new(BubblewrapBackend::new(ctx))
            }
            SandboxType::Seatbelt => {
                if !SeatbeltBackend::is_available() {
                    return Err(SandboxError::Unavailable {
                        label: "Seatbelt",
                        hint: "Requires macOS with sandbox-exec.",
                    });
                }
                Box::new(SeatbeltBackend::new(ctx))
            }
        };

        tracing::info!(
            sandbox = %config.name,
            backend = backend.name(),
            permissions = %config.permissions,
            worker = %worker.program.display(),
            "sandbox ready"
        );

        Ok(Sandbox::new(config, working_dir, backend, worker)
            .with_injectors(options.injectors.unwrap_or_default())
            .with_limits(options.limits)
            .with_env_filtering(options.filter_sensitive_env))
    }
}
