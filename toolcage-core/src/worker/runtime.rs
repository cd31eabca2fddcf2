//! Agent runtime state and its serializable projection.
//!
//! The parent holds an [`AgentRuntime`] with members that cannot cross a
//! process boundary (message history, tool catalogs, the sandbox handle,
//! callbacks). [`RuntimeContext::capture`] copies only what a tool may read;
//! [`ToolRuntime::from_context`] rebuilds a usable runtime inside the worker.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::sandboxing::{Sandbox, ToolSandboxPolicy};

const DEFAULT_WORKING_DIR: &str = "/tmp";
const DEFAULT_RECURSION_LIMIT: u32 = 25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    #[default]
    SemiActive,
    Active,
    Aggressive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    #[serde(default)]
    pub status: TodoStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct AgentState {
    /// Conversation history. Never sent to a worker.
    pub messages: Vec<AgentMessage>,
    pub todos: Vec<TodoItem>,
    pub files: BTreeMap<String, Value>,
    pub current_input_tokens: u64,
    pub current_output_tokens: u64,
    pub total_cost: f64,
}

#[derive(Clone)]
pub struct AgentContext {
    pub approval_mode: ApprovalMode,
    pub working_dir: PathBuf,
    pub platform: String,
    pub os_version: String,
    pub current_date_time_zoned: String,
    pub user_memory: String,
    pub input_cost_per_mtok: f64,
    pub output_cost_per_mtok: f64,
    pub tool_output_max_tokens: Option<u32>,
    /// Tools served by MCP servers, keyed by name, with the policy of the
    /// server that serves them. These are gated but never run in the worker.
    pub mcp_tools: BTreeMap<String, ToolSandboxPolicy>,
    pub sandbox: Option<Arc<Sandbox>>,
}

impl Default for AgentContext {
    fn default() -> Self {
        Self {
            approval_mode: ApprovalMode::default(),
            working_dir: PathBuf::from(DEFAULT_WORKING_DIR),
            platform: std::env::consts::OS.to_string(),
            os_version: String::new(),
            current_date_time_zoned: chrono::Local::now().to_rfc3339(),
            user_memory: String::new(),
            input_cost_per_mtok: 0.0,
            output_cost_per_mtok: 0.0,
            tool_output_max_tokens: None,
            mcp_tools: BTreeMap::new(),
            sandbox: None,
        }
    }
}

impl fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentContext")
            .field("approval_mode", &self.approval_mode)
            .field("working_dir", &self.working_dir)
            .field("platform", &self.platform)
            .field("mcp_tools", &self.mcp_tools)
            .field("sandbox", &self.sandbox.as_ref().map(|s| s.backend_name()))
            .finish_non_exhaustive()
    }
}

/// Receives run lifecycle events in the parent process.
pub trait RunCallback: Send + Sync {
    fn on_tool_end(&self, tool_name: &str, success: bool);
}

#[derive(Clone)]
pub struct RunConfig {
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub run_name: Option<String>,
    pub run_id: Option<Uuid>,
    pub recursion_limit: u32,
    pub configurable: Map<String, Value>,
    pub callbacks: Vec<Arc<dyn RunCallback>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            metadata: Map::new(),
            run_name: None,
            run_id: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            configurable: Map::new(),
            callbacks: Vec::new(),
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("tags", &self.tags)
            .field("run_name", &self.run_name)
            .field("run_id", &self.run_id)
            .field("recursion_limit", &self.recursion_limit)
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl RunConfig {
    pub fn notify_tool_end(&self, tool_name: &str, success: bool) {
        for callback in &self.callbacks {
            callback.on_tool_end(tool_name, success);
        }
    }
}

/// Parent-side runtime handed to middleware and catalog calls.
#[derive(Debug, Clone, Default)]
pub struct AgentRuntime {
    pub tool_call_id: Option<String>,
    pub state: AgentState,
    pub context: AgentContext,
    pub config: RunConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSnapshot {
    pub todos: Vec<TodoItem>,
    pub files: BTreeMap<String, Value>,
    pub current_input_tokens: u64,
    pub current_output_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSnapshot {
    pub approval_mode: ApprovalMode,
    pub working_dir: PathBuf,
    pub platform: String,
    pub os_version: String,
    pub current_date_time_zoned: String,
    pub user_memory: String,
    pub input_cost_per_mtok: f64,
    pub output_cost_per_mtok: f64,
    pub tool_output_max_tokens: Option<u32>,
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self {
            approval_mode: ApprovalMode::SemiActive,
            working_dir: PathBuf::from(DEFAULT_WORKING_DIR),
            platform: String::new(),
            os_version: String::new(),
            current_date_time_zoned: String::new(),
            user_memory: String::new(),
            input_cost_per_mtok: 0.0,
            output_cost_per_mtok: 0.0,
            tool_output_max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub run_name: Option<String>,
    pub run_id: Option<String>,
    pub recursion_limit: u32,
    pub configurable: Map<String, Value>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            metadata: Map::new(),
            run_name: None,
            run_id: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            configurable: Map::new(),
        }
    }
}

/// The part of an [`AgentRuntime`] that crosses into the worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeContext {
    pub tool_call_id: Option<String>,
    pub state: StateSnapshot,
    pub context: ContextSnapshot,
    pub config: ConfigSnapshot,
}

impl RuntimeContext {
    /// Copy the transferable fields of `runtime`, field by field.
    pub fn capture(runtime: &AgentRuntime) -> Self {
        let state = &runtime.state;
        let context = &runtime.context;
        let config = &runtime.config;
        Self {
            tool_call_id: runtime.tool_call_id.clone(),
            state: StateSnapshot {
                todos: state.todos.clone(),
                files: state.files.clone(),
                current_input_tokens: state.current_input_tokens,
                current_output_tokens: state.current_output_tokens,
                total_cost: state.total_cost,
            },
            context: ContextSnapshot {
                approval_mode: context.approval_mode,
                working_dir: context.working_dir.clone(),
                platform: context.platform.clone(),
                os_version: context.os_version.clone(),
                current_date_time_zoned: context.current_date_time_zoned.clone(),
                user_memory: context.user_memory.clone(),
                input_cost_per_mtok: context.input_cost_per_mtok,
                output_cost_per_mtok: context.output_cost_per_mtok,
                tool_output_max_tokens: context.tool_output_max_tokens,
            },
            config: ConfigSnapshot {
                tags: config.tags.clone(),
                metadata: config.metadata.clone(),
                run_name: config.run_name.clone(),
                run_id: config.run_id.map(|id| id.to_string()),
                recursion_limit: config.recursion_limit,
                configurable: config.configurable.clone(),
            },
        }
    }

    #[must_use]
    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }
}

/// Streaming sink available to tools. Inside the worker nothing listens.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamWriter;

impl StreamWriter {
    pub fn write(&self, chunk: &Value) {
        tracing::trace!(%chunk, "stream chunk discarded");
    }
}

/// Runtime injected into tools that declare they need one.
#[derive(Debug, Clone, Default)]
pub struct ToolRuntime {
    pub tool_call_id: Option<String>,
    pub state: AgentState,
    pub context: AgentContext,
    pub config: RunConfig,
    pub stream_writer: StreamWriter,
}

impl ToolRuntime {
    /// Rebuild a runtime from its projection: empty history and catalogs, no
    /// sandbox handle, no callbacks.
    pub fn from_context(ctx: RuntimeContext) -> Self {
        let run_id = ctx.config.run_id.as_deref().and_then(|raw| {
            Uuid::parse_str(raw)
                .inspect_err(|err| tracing::debug!(raw, error = %err, "ignoring invalid run_id"))
                .ok()
        });

        Self {
            tool_call_id: ctx.tool_call_id,
            state: AgentState {
                messages: Vec::new(),
                todos: ctx.state.todos,
                files: ctx.state.files,
                current_input_tokens: ctx.state.current_input_tokens,
                current_output_tokens: ctx.state.current_output_tokens,
                total_cost: ctx.state.total_cost,
            },
            context: AgentContext {
                approval_mode: ctx.context.approval_mode,
                working_dir: ctx.context.working_dir,
                platform: ctx.context.platform,
                os_version: ctx.context.os_version,
                current_date_time_zoned: ctx.context.current_date_time_zoned,
                user_memory: ctx.context.user_memory,
                input_cost_per_mtok: ctx.context.input_cost_per_mtok,
                output_cost_per_mtok: ctx.context.output_cost_per_mtok,
                tool_output_max_tokens: ctx.context.tool_output_max_tokens,
                mcp_tools: BTreeMap::new(),
                sandbox: None,
            },
            config: RunConfig {
                tags: ctx.config.tags,
                metadata: ctx.config.metadata,
                run_name: ctx.config.run_name,
                run_id,
                recursion_limit: ctx.config.recursion_limit,
                configurable: ctx.config.configurable,
                callbacks: Vec::new(),
            },
            stream_writer: StreamWriter,
        }
    }
}
