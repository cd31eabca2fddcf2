//! JSON documents exchanged with the worker over stdin/stdout.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::runtime::RuntimeContext;

/// Keyword arguments of a tool call.
pub type ToolArgs = Map<String, Value>;

/// The single document a worker reads from stdin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub args: ToolArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_context: Option<RuntimeContext>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    #[default]
    Success,
    Error,
}

/// A tool result addressed to the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub status: ToolStatus,
    /// Compact form for UIs; carries the traceback for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Value>,
    #[serde(default)]
    pub return_direct: bool,
}

impl ToolMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            status: ToolStatus::Error,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }
}

/// A state-graph control instruction returned instead of a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
}

/// Everything a tool may return.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Message(ToolMessage),
    Command(GraphCommand),
    Value(Value),
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<ToolMessage> for ToolOutput {
    fn from(message: ToolMessage) -> Self {
        Self::Message(message)
    }
}

impl From<GraphCommand> for ToolOutput {
    fn from(command: GraphCommand) -> Self {
        Self::Command(command)
    }
}

/// Strings print bare; everything else as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The single document a worker writes to stdout, also used for every
/// parent-side failure of a sandboxed call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_command: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_content: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub return_direct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
}

impl ToolResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = Some(stderr.into());
        self
    }

    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = Some(stdout.into());
        self
    }

    #[must_use]
    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    /// Flatten a tool's return value into the wire shape.
    pub fn from_output(output: ToolOutput) -> Self {
        match output {
            ToolOutput::Text(text) => Self {
                success: true,
                content: Some(text),
                ..Self::default()
            },
            ToolOutput::Value(value) => Self {
                success: true,
                content: Some(display_value(&value)),
                ..Self::default()
            },
            ToolOutput::Message(message) => Self {
                success: true,
                is_error: message.is_error(),
                content: Some(message.content),
                name: message.name,
                status: Some(message.status),
                short_content: message.short_content,
                return_direct: message.return_direct,
                artifact: message.artifact,
                ..Self::default()
            },
            ToolOutput::Command(command) => Self {
                success: true,
                is_command: true,
                update: command.update,
                resume: command.resume,
                goto: command.goto,
                graph: command.graph,
                ..Self::default()
            },
        }
    }

    /// Best single-line description of a failure.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("Unknown sandbox error")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn request_defaults_missing_fields() {
        let request: WorkerRequest =
            serde_json::from_str(r#"{"module":"os.path","tool_name":"basename"}"#)
                .expect("parse");
        assert!(request.args.is_empty());
        assert!(request.runtime_context.is_none());
    }

    #[test]
    fn values_display_like_text() {
        assert_eq!(display_value(&json!("c.txt")), "c.txt");
        assert_eq!(display_value(&json!({"a": [1, 2]})), r#"{"a":[1,2]}"#);
        assert_eq!(display_value(&json!(42)), "42");
    }

    #[test]
    fn message_output_keeps_every_field() {
        let message = ToolMessage {
            content: "done".to_string(),
            name: Some("write_file".to_string()),
            tool_call_id: None,
            status: ToolStatus::Error,
            short_content: Some("short".to_string()),
            artifact: Some(json!({"bytes": 4})),
            return_direct: true,
        };
        let response = ToolResponse::from_output(message.into());
        assert_eq!(
            serde_json::to_value(&response).expect("serialize"),
            json!({
                "success": true,
                "content": "done",
                "name": "write_file",
                "status": "error",
                "short_content": "short",
                "is_error": true,
                "return_direct": true,
                "artifact": {"bytes": 4}
            })
        );
    }

    #[test]
    fn command_output_sets_flag() {
        let response = ToolResponse::from_output(ToolOutput::Command(GraphCommand {
            update: Some(json!({"todos": []})),
            goto: Some(json!("agent")),
            ..GraphCommand::default()
        }));
        assert!(response.success && response.is_command);
        assert_eq!(response.goto, Some(json!("agent")));
        assert!(response.content.is_none());
    }

    #[test]
    fn failure_round_trips_through_json() {
        let response = ToolResponse::failure("boom").with_stderr("trace");
        let text = serde_json::to_string(&response).expect("serialize");
        assert_eq!(text, r#"{"success":false,"error":"boom","stderr":"trace"}"#);
        let parsed: ToolResponse = serde_json::from_str(&text).expect("parse");
        assert_eq!(parsed, response);
    }
}
