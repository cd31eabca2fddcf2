use anyhow::Context;
use serde_json::{Value, json};

use crate::worker::protocol::{GraphCommand, ToolArgs, ToolOutput};
use crate::worker::registry::{SyncTool, ToolResult, ToolSchema};
use crate::worker::runtime::{TodoItem, ToolRuntime};

pub const MODULE: &str = "tools.todo";

/// Replaces the agent's todo list through a state update.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteTodosTool;

impl SyncTool for WriteTodosTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            description: "Replace the todo list".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "todos": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "content": {"type": "string"},
                                "status": {"enum": ["pending", "in_progress", "completed"]}
                            },
                            "required": ["content"]
                        }
                    }
                },
                "required": ["todos"]
            }),
            runtime: true,
        }
    }

    fn invoke(&self, mut args: ToolArgs, runtime: Option<ToolRuntime>) -> ToolResult {
        let todos: Vec<TodoItem> = serde_json::from_value(args.remove("todos").unwrap_or(Value::Null))
            .context("argument 'todos' must be a list of todo items")?;
        let tool_call_id = runtime.and_then(|runtime| runtime.tool_call_id);

        let summary = format!("Updated todo list to {}", serde_json::to_string(&todos)?);
        Ok(ToolOutput::Command(GraphCommand {
            update: Some(json!({
                "todos": todos,
                "messages": [{
                    "role": "tool",
                    "content": summary,
                    "tool_call_id": tool_call_id,
                }],
            })),
            ..GraphCommand::default()
        }))
    }
}
