//! Permission-gated, sandboxed execution of agent tools and MCP servers.
//!
//! A [`Sandbox`] wraps every tool call in a fresh worker process isolated by
//! bubblewrap (Linux) or Seatbelt (macOS). Tools and MCP servers declare the
//! permissions they need; the [`PermissionGate`] refuses anything undeclared
//! or not granted, and the process only ever receives the intersection of
//! what was declared and what the sandbox grants.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use toolcage_config::{SandboxConfig, SandboxPermission, SandboxType};
//! use toolcage_core::{SandboxFactory, SandboxOptions, ToolArgs};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = SandboxConfig::new("dev", SandboxType::platform_default())
//!     .with_permissions([SandboxPermission::Filesystem]);
//! let sandbox = SandboxFactory::create(Arc::new(config), "/work", SandboxOptions::default())?;
//!
//! let mut args = ToolArgs::new();
//! args.insert("path".into(), "/a/b/c.txt".into());
//! let response = sandbox
//!     .execute("os.path", "basename", args, Duration::from_secs(10), Some(&[][..]), None)
//!     .await;
//! assert_eq!(response.content.as_deref(), Some("c.txt"));
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod mcp;
pub mod middleware;
pub mod sandboxing;
pub mod tools;
pub mod worker;

pub use catalog::{ToolCatalog, ToolSummary};
pub use mcp::McpServerLauncher;
pub use middleware::{SandboxMiddleware, ToolCall, ToolCallResult};
pub use sandboxing::{
    GateDecision, GateSubject, McpLaunch, PermissionError, PermissionGate, Sandbox,
    SandboxBackend, SandboxError, SandboxFactory, SandboxOptions, ToolSandboxPolicy,
    WorkerCommand,
};
pub use worker::{
    AgentRuntime, RuntimeContext, ToolArgs, ToolMessage, ToolOutput, ToolRegistry, ToolResponse,
    ToolRuntime,
};
