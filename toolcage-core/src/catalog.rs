//! Tool discovery and the `run_tool` proxy exposed to the agent.
//!
//! The catalog's own entry points bypass the sandbox, but every tool they
//! proxy to goes through the same gate as a direct call.

use std::sync::Arc;

use regex::RegexBuilder;
use serde::Serialize;
use serde_json::{Value, json};

use crate::middleware::{ToolCall, ToolCallResult, execute_sandboxed};
use crate::sandboxing::{GateDecision, GateSubject, PermissionGate};
use crate::worker::protocol::{ToolArgs, ToolResponse};
use crate::worker::registry::{ToolRegistration, ToolRegistry};
use crate::worker::runtime::{AgentRuntime, RuntimeContext};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct ToolCatalog {
    registry: Arc<ToolRegistry>,
}

impl ToolCatalog {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Tools whose qualified name or description matches `pattern`,
    /// case-insensitively.
    pub fn fetch_tools(&self, pattern: &str) -> Result<Vec<ToolSummary>, regex::Error> {
        let matcher = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(self
            .registry
            .iter()
            .filter(|tool| {
                matcher.is_match(&tool.qualified_name()) || matcher.is_match(tool.description())
            })
            .map(|tool| ToolSummary {
                name: tool.qualified_name(),
                description: tool.description().to_string(),
            })
            .collect())
    }

    /// JSON description of one tool, including its sandbox requirements.
    pub fn get_tool(&self, name: &str) -> Option<Value> {
        let tool = self.registry.find(name)?;
        let policy = tool.policy();
        Some(json!({
            "name": tool.qualified_name(),
            "description": tool.description(),
            "parameters": tool.parameters(),
            "requires_runtime": tool.needs_runtime(),
            "sandbox_permissions": policy.permissions,
            "sandbox_bypass": policy.bypass,
        }))
    }

    /// Run a tool by name on behalf of the agent.
    pub async fn run_tool(&self, name: &str, args: ToolArgs, runtime: &AgentRuntime) -> ToolCallResult {
        let call_id = runtime
            .tool_call_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let Some(registration) = self.registry.find(name) else {
            return ToolCallResult::error(&call_id, name, format!("Tool '{name}' not found"), None);
        };

        let Some(sandbox) = runtime.context.sandbox.as_deref() else {
            return run_in_process(registration, args, runtime, &call_id).await;
        };

        match PermissionGate::evaluate(GateSubject::Tool, name, registration.policy(), sandbox.config()) {
            Err(err) => ToolCallResult::error(&call_id, name, err.to_string(), None),
            Ok(GateDecision::Bypassed) => run_in_process(registration, args, runtime, &call_id).await,
            Ok(GateDecision::Allowed(_)) => {
                let call = ToolCall::new(call_id, registration.name(), args);
                execute_sandboxed(sandbox, registration, call, runtime).await
            }
        }
    }
}

async fn run_in_process(
    registration: &ToolRegistration,
    args: ToolArgs,
    runtime: &AgentRuntime,
    call_id: &str,
) -> ToolCallResult {
    let context = RuntimeContext::capture(runtime).with_tool_call_id(call_id);
    let response = match registration.invoke(args, Some(context)).await {
        Ok(output) => ToolResponse::from_output(output),
        Err(err) => ToolResponse::failure(err.to_string()).with_traceback(format!("{err:?}")),
    };
    runtime.config.notify_tool_end(registration.name(), response.success);
    ToolCallResult::from_response(response, call_id, registration.name())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn catalog() -> ToolCatalog {
        ToolCatalog::new(Arc::new(ToolRegistry::builtin()))
    }

    #[test]
    fn fetch_matches_names_and_descriptions() {
        let catalog = catalog();
        let names: Vec<String> = catalog
            .fetch_tools("^OS\\.PATH")
            .expect("regex")
            .into_iter()
            .map(|summary| summary.name)
            .collect();
        assert_eq!(names, ["os.path.basename", "os.path.dirname"]);

        let by_description = catalog.fetch_tools("todo list").expect("regex");
        assert_eq!(by_description.len(), 1);
        assert!(catalog.fetch_tools("(").is_err());
    }

    #[test]
    fn get_tool_reports_sandbox_policy() {
        let tool = catalog().get_tool("read_file").expect("tool");
        assert_eq!(tool["name"], json!("tools.file_system.read_file"));
        assert_eq!(tool["sandbox_permissions"], json!(["filesystem"]));
        assert_eq!(tool["sandbox_bypass"], json!(false));
        assert!(catalog().get_tool("nope").is_none());
    }

    #[tokio::test]
    async fn runs_in_process_without_sandbox() {
        let mut args = ToolArgs::new();
        args.insert("path".to_string(), json!("/a/b/c.txt"));
        let result = catalog().run_tool("basename", args, &AgentRuntime::default()).await;
        assert_eq!(result.as_message().map(|m| m.content.as_str()), Some("c.txt"));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let result = catalog()
            .run_tool("nope", ToolArgs::new(), &AgentRuntime::default())
            .await;
        assert!(result.is_error());
    }
}
