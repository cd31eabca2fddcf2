//! Dispatch table mapping `(module, tool)` to a callable.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use super::protocol::{ToolArgs, ToolOutput};
use super::runtime::{RuntimeContext, ToolRuntime};
use crate::sandboxing::ToolSandboxPolicy;
use crate::tools::WorkspaceRoot;

pub type ToolResult = anyhow::Result<ToolOutput>;
pub type AsyncToolFn = Arc<dyn Fn(ToolArgs) -> BoxFuture<'static, ToolResult> + Send + Sync>;
pub type SyncToolFn = Arc<dyn Fn(ToolArgs) -> ToolResult + Send + Sync>;

/// Metadata a framework tool publishes about itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolSchema {
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
    /// The tool takes a `runtime` argument that the worker supplies.
    pub runtime: bool,
}

#[async_trait]
pub trait AsyncTool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    async fn invoke(&self, args: ToolArgs, runtime: Option<ToolRuntime>) -> ToolResult;
}

pub trait SyncTool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    fn invoke(&self, args: ToolArgs, runtime: Option<ToolRuntime>) -> ToolResult;
}

/// The four shapes a registered callable can take.
#[derive(Clone)]
pub enum ToolHandler {
    AsyncTool(Arc<dyn AsyncTool>),
    SyncTool(Arc<dyn SyncTool>),
    AsyncFn(AsyncToolFn),
    SyncFn(SyncToolFn),
}

impl fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsyncTool(_) => write!(f, "ToolHandler::AsyncTool"),
            Self::SyncTool(_) => write!(f, "ToolHandler::SyncTool"),
            Self::AsyncFn(_) => write!(f, "ToolHandler::AsyncFn"),
            Self::SyncFn(_) => write!(f, "ToolHandler::SyncFn"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolRegistration {
    module: String,
    name: String,
    description: String,
    parameters: Value,
    needs_runtime: bool,
    policy: ToolSandboxPolicy,
    handler: ToolHandler,
}

impl ToolRegistration {
    fn with_handler(module: impl Into<String>, name: impl Into<String>, handler: ToolHandler) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            description: String::new(),
            parameters: Value::Object(ToolArgs::new()),
            needs_runtime: false,
            policy: ToolSandboxPolicy::undeclared(),
            handler,
        }
    }

    fn with_schema(mut self, schema: ToolSchema) -> Self {
        self.description = schema.description;
        self.parameters = schema.parameters;
        self.needs_runtime = schema.runtime;
        self
    }

    pub fn sync_fn<F>(module: impl Into<String>, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ToolArgs) -> ToolResult + Send + Sync + 'static,
    {
        Self::with_handler(module, name, ToolHandler::SyncFn(Arc::new(f)))
    }

    pub fn async_fn<F, Fut>(module: impl Into<String>, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        let handler: AsyncToolFn = Arc::new(move |args| f(args).boxed());
        Self::with_handler(module, name, ToolHandler::AsyncFn(handler))
    }

    pub fn from_async_tool(
        module: impl Into<String>,
        name: impl Into<String>,
        tool: Arc<dyn AsyncTool>,
    ) -> Self {
        let schema = tool.schema();
        Self::with_handler(module, name, ToolHandler::AsyncTool(tool)).with_schema(schema)
    }

    pub fn from_sync_tool(
        module: impl Into<String>,
        name: impl Into<String>,
        tool: Arc<dyn SyncTool>,
    ) -> Self {
        let schema = tool.schema();
        Self::with_handler(module, name, ToolHandler::SyncTool(tool)).with_schema(schema)
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ToolSandboxPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn needs_runtime(&self) -> bool {
        self.needs_runtime
    }

    pub fn policy(&self) -> &ToolSandboxPolicy {
        &self.policy
    }

    pub fn handler(&self) -> &ToolHandler {
        &self.handler
    }

    /// Call the tool, supplying a runtime when it asks for one.
    ///
    /// A `runtime` entry in `args` takes precedence over `runtime_context`.
    pub async fn invoke(
        &self,
        mut args: ToolArgs,
        runtime_context: Option<RuntimeContext>,
    ) -> ToolResult {
        let runtime = if self.needs_runtime {
            let context = match args.remove("runtime") {
                Some(value) => Some(
                    serde_json::from_value::<RuntimeContext>(value)
                        .context("invalid runtime argument")?,
                ),
                None => runtime_context,
            };
            let context = context.ok_or(DispatchError::MissingRuntime)?;
            Some(ToolRuntime::from_context(context))
        } else {
            None
        };

        match &self.handler {
            ToolHandler::AsyncTool(tool) => tool.invoke(args, runtime).await,
            ToolHandler::SyncTool(tool) => tool.invoke(args, runtime),
            ToolHandler::AsyncFn(f) => f(args).await,
            ToolHandler::SyncFn(f) => f(args),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("No module named '{0}'")]
    NoModule(String),

    #[error("module '{module}' has no tool '{tool}'")]
    NoTool { module: String, tool: String },

    #[error("Tool requires runtime but no runtime_context provided")]
    MissingRuntime,
}

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    modules: BTreeMap<String, BTreeMap<String, ToolRegistration>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every tool that ships with toolcage, with file tools reading their
    /// root from the worker environment.
    pub fn builtin() -> Self {
        Self::builtin_in(&WorkspaceRoot::from_env())
    }

    /// Builtins with file tools fixed to `root`, for running tools in-process.
    pub fn builtin_in(root: &WorkspaceRoot) -> Self {
        let mut registry = Self::new();
        crate::tools::register_builtin_tools(&mut registry, root);
        registry
    }

    /// Add `registration`, returning the one it replaced.
    pub fn register(&mut self, registration: ToolRegistration) -> Option<ToolRegistration> {
        self.modules
            .entry(registration.module.clone())
            .or_default()
            .insert(registration.name.clone(), registration)
    }

    pub fn resolve(&self, module: &str, tool: &str) -> Result<&ToolRegistration, DispatchError> {
        let tools = self
            .modules
            .get(module)
            .ok_or_else(|| DispatchError::NoModule(module.to_string()))?;
        tools.get(tool).ok_or_else(|| DispatchError::NoTool {
            module: module.to_string(),
            tool: tool.to_string(),
        })
    }

    /// Look a tool up by `module.tool` or, failing that, by bare name.
    pub fn find(&self, name: &str) -> Option<&ToolRegistration> {
        if let Some((module, tool)) = name.rsplit_once('.') {
            if let Ok(found) = self.resolve(module, tool) {
                return Some(found);
            }
        }
        self.iter().find(|registration| registration.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolRegistration> {
        self.modules.values().flat_map(BTreeMap::values)
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn invoke(
        &self,
        module: &str,
        tool: &str,
        args: ToolArgs,
        runtime_context: Option<RuntimeContext>,
    ) -> ToolResult {
        self.resolve(module, tool)?.invoke(args, runtime_context).await
    }
}

/// Required string argument.
pub fn required_str<'a>(args: &'a ToolArgs, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .ok_or_else(|| anyhow!("missing required argument '{key}'"))?
        .as_str()
        .ok_or_else(|| anyhow!("argument '{key}' must be a string"))
}

/// Optional numeric argument.
pub fn optional_f64(args: &ToolArgs, key: &str) -> anyhow::Result<Option<f64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| anyhow!("argument '{key}' must be a number")),
    }
}
