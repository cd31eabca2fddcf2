//! Routes agent tool calls through the permission gate and the sandbox.

use std::future::Future;
use std::sync::Arc;

use crate::sandboxing::{GateDecision, GateSubject, PermissionGate, Sandbox, ToolSandboxPolicy};
use crate::worker::protocol::{GraphCommand, ToolArgs, ToolMessage, ToolResponse, ToolStatus};
use crate::worker::registry::{ToolRegistration, ToolRegistry};
use crate::worker::runtime::{AgentRuntime, RuntimeContext};

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: ToolArgs,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// What a tool call hands back to the agent loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallResult {
    Message(ToolMessage),
    Command(GraphCommand),
}

impl ToolCallResult {
    pub fn error(
        tool_call_id: &str,
        tool_name: &str,
        content: impl Into<String>,
        details: Option<String>,
    ) -> Self {
        let mut message = ToolMessage::error(content).with_name(tool_name);
        message.tool_call_id = Some(tool_call_id.to_string());
        message.short_content = details;
        Self::Message(message)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Message(message) if message.is_error())
    }

    pub fn as_message(&self) -> Option<&ToolMessage> {
        match self {
            Self::Message(message) => Some(message),
            Self::Command(_) => None,
        }
    }

    /// Convert a worker response. Failures keep the traceback (or stderr)
    /// in `short_content`.
    pub fn from_response(response: ToolResponse, tool_call_id: &str, tool_name: &str) -> Self {
        if !response.success {
            let details = response.traceback.clone().or_else(|| response.stderr.clone());
            return Self::error(tool_call_id, tool_name, response.error_message(), details);
        }

        if response.is_command {
            return Self::Command(GraphCommand {
                update: response.update,
                resume: response.resume,
                goto: response.goto,
                graph: response.graph,
            });
        }

        let status = match response.status {
            Some(status) => status,
            None if response.is_error => ToolStatus::Error,
            None => ToolStatus::Success,
        };
        Self::Message(ToolMessage {
            content: response.content.unwrap_or_default(),
            name: Some(response.name.unwrap_or_else(|| tool_name.to_string())),
            tool_call_id: Some(tool_call_id.to_string()),
            status,
            short_content: response.short_content,
            artifact: response.artifact,
            return_direct: response.return_direct,
        })
    }
}

/// Run `registration` in `sandbox` with its declared permissions.
pub(crate) async fn execute_sandboxed(
    sandbox: &Sandbox,
    registration: &ToolRegistration,
    call: ToolCall,
    runtime: &AgentRuntime,
) -> ToolCallResult {
    let ToolCall { id, name, args } = call;
    let timeout = match sandbox.config().timeout_duration() {
        Ok(timeout) => timeout,
        Err(err) => {
            runtime.config.notify_tool_end(&name, false);
            return ToolCallResult::error(&id, &name, format!("{err:#}"), None);
        }
    };
    let context = RuntimeContext::capture(runtime).with_tool_call_id(id.clone());
    let response = sandbox
        .execute(
            registration.module(),
            registration.name(),
            args,
            timeout,
            registration.policy().declared(),
            Some(&context),
        )
        .await;

    runtime.config.notify_tool_end(&name, response.success);
    if !response.success {
        tracing::debug!(tool = %name, error = response.error_message(), "sandboxed tool failed");
    }
    ToolCallResult::from_response(response, &id, &name)
}

/// Intercepts tool calls while a sandbox is active.
#[derive(Debug, Clone)]
pub struct SandboxMiddleware {
    registry: Arc<ToolRegistry>,
}

impl SandboxMiddleware {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Gate `call` and run it in the sandbox, or pass it to `handler` when no
    /// sandbox is active or the tool bypasses it. MCP tools are gated with
    /// their server's policy and then handed to `handler`, since their server
    /// already runs sandboxed.
    pub async fn wrap_tool_call<F, Fut>(
        &self,
        call: ToolCall,
        runtime: &AgentRuntime,
        handler: F,
    ) -> ToolCallResult
    where
        F: FnOnce(ToolCall) -> Fut,
        Fut: Future<Output = ToolCallResult>,
    {
        let Some(sandbox) = runtime.context.sandbox.as_deref() else {
            return handler(call).await;
        };

        let mcp_policy = runtime.context.mcp_tools.get(&call.name);
        let registration = match mcp_policy {
            Some(_) => None,
            None => self.registry.find(&call.name),
        };
        let policy = match (mcp_policy, registration) {
            (Some(policy), _) => policy.clone(),
            (None, Some(registration)) => registration.policy().clone(),
            (None, None) => ToolSandboxPolicy::undeclared(),
        };

        match PermissionGate::evaluate(GateSubject::Tool, &call.name, &policy, sandbox.config()) {
            Err(err) => ToolCallResult::error(&call.id, &call.name, err.to_string(), None),
            Ok(GateDecision::Bypassed) => handler(call).await,
            Ok(GateDecision::Allowed(_)) if mcp_policy.is_some() => {
                tracing::debug!(tool = %call.name, "MCP tool permitted; its server is sandboxed");
                handler(call).await
            }
            Ok(GateDecision::Allowed(_)) => match registration {
                Some(registration) => execute_sandboxed(sandbox, registration, call, runtime).await,
                None => ToolCallResult::error(
                    &call.id,
                    &call.name,
                    format!("Tool '{}' is not registered", call.name),
                    None,
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn failed_response_becomes_error_message() {
        let response = ToolResponse::failure("bubblewrap failed with code 1").with_stderr("bwrap: oops");
        let result = ToolCallResult::from_response(response, "call-1", "read_file");
        let message = result.as_message().expect("message");
        assert!(result.is_error());
        assert_eq!(message.content, "bubblewrap failed with code 1");
        assert_eq!(message.short_content.as_deref(), Some("bwrap: oops"));
        assert_eq!(message.tool_call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn command_response_becomes_command() {
        let response = ToolResponse {
            success: true,
            is_command: true,
            update: Some(json!({"todos": []})),
            ..ToolResponse::default()
        };
        assert_eq!(
            ToolCallResult::from_response(response, "c", "write_todos"),
            ToolCallResult::Command(GraphCommand {
                update: Some(json!({"todos": []})),
                ..GraphCommand::default()
            })
        );
    }

    #[test]
    fn plain_response_keeps_tool_name() {
        let response = ToolResponse {
            success: true,
            content: Some("c.txt".to_string()),
            ..ToolResponse::default()
        };
        let result = ToolCallResult::from_response(response, "c", "basename");
        let message = result.as_message().expect("message");
        assert_eq!(message.name.as_deref(), Some("basename"));
        assert_eq!(message.status, ToolStatus::Success);
    }

    #[tokio::test]
    async fn without_sandbox_the_handler_runs() {
        let middleware = SandboxMiddleware::new(Arc::new(ToolRegistry::builtin()));
        let runtime = AgentRuntime::default();
        let call = ToolCall::new("c", "basename", ToolArgs::new());

        let result = middleware
            .wrap_tool_call(call, &runtime, |call| async move {
                ToolCallResult::Message(ToolMessage::text("handled").with_name(call.name))
            })
            .await;
        assert_eq!(result.as_message().map(|m| m.content.as_str()), Some("handled"));
    }
}
