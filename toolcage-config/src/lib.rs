//! Configuration for toolcage: sandbox definitions, output limits, tracing and
//! MCP server launch settings.

pub mod constants;
pub mod debug;
pub mod limits;
pub mod loader;
pub mod mcp;
pub mod root;
pub mod sandbox;

pub use debug::{DebugConfig, TraceLevel};
pub use limits::OutputLimitsConfig;
pub use loader::{ConfigManager, merge_toml_values};
pub use mcp::{McpConfig, McpServerConfig};
pub use root::{SandboxSettings, ToolcageConfig};
pub use sandbox::{
    BatchSandboxConfig, PermissionSet, SandboxConfig, SandboxPermission, SandboxType,
    UnknownPermission, expand_path,
};
