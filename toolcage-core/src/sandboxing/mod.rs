//! Permission-gated process isolation for tool calls and MCP servers.

pub mod backend;
pub mod bubblewrap;
pub mod env;
pub mod error;
pub(crate) mod execution;
pub mod factory;
pub mod injectors;
pub mod package_cache;
pub mod permissions;
pub mod sandbox;
pub mod seatbelt;

pub use backend::{BackendContext, SandboxBackend};
pub use bubblewrap::BubblewrapBackend;
pub use error::SandboxError;
pub use execution::preview;
pub use factory::{SandboxFactory, SandboxOptions, resolve_worker};
pub use injectors::{
    CommandInjector, DockerNetworkInjector, InjectionOutcome, InjectorChain,
    PackageOfflineInjector, inject_offline_flag,
};
pub use package_cache::{PackageCache, PackageManager, PackageRef, SystemPackageCache, detect_package};
pub use permissions::{
    GateDecision, GateSubject, PermissionError, PermissionGate, ToolSandboxPolicy,
    compute_effective_permissions, has_permission, missing_permissions,
};
pub use sandbox::{McpLaunch, Sandbox, WorkerCommand};
pub use seatbelt::{SeatbeltBackend, escape_seatbelt_path, generate_seatbelt_profile};
