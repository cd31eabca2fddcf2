//! Reading and writing files under the agent's working directory.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use super::WorkspaceRoot;
use crate::worker::protocol::{ToolArgs, ToolMessage};
use crate::worker::registry::{AsyncTool, ToolResult, ToolSchema, required_str};
use crate::worker::runtime::ToolRuntime;

pub const MODULE: &str = "tools.file_system";

fn optional_str<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|value| value.as_str())
}

#[derive(Debug, Clone)]
pub struct ReadFileTool {
    root: WorkspaceRoot,
}

impl ReadFileTool {
    pub fn new(root: WorkspaceRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl AsyncTool for ReadFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            description: "Read a UTF-8 text file relative to the working directory".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
            runtime: false,
        }
    }

    async fn invoke(&self, args: ToolArgs, _runtime: Option<ToolRuntime>) -> ToolResult {
        let requested = required_str(&args, "path")?;
        let path = self.root.resolve(requested)?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {requested}"))?;

        let mut message = ToolMessage::text(String::from_utf8_lossy(&bytes)).with_name("read_file");
        message.artifact = Some(json!({"path": requested, "bytes": bytes.len()}));
        Ok(message.into())
    }
}

#[derive(Debug, Clone)]
pub struct WriteFileTool {
    root: WorkspaceRoot,
}

impl WriteFileTool {
    pub fn new(root: WorkspaceRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl AsyncTool for WriteFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            description: "Write a text file relative to the working directory, creating parents"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }),
            runtime: false,
        }
    }

    async fn invoke(&self, args: ToolArgs, _runtime: Option<ToolRuntime>) -> ToolResult {
        let requested = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        let path = self.root.resolve(requested)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create parent directories of {requested}"))?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("failed to write {requested}"))?;

        let mut message = ToolMessage::text(format!("Wrote {} bytes to {requested}", content.len()))
            .with_name("write_file");
        message.artifact = Some(json!({"path": requested, "bytes": content.len()}));
        Ok(message.into())
    }
}

#[derive(Debug, Clone)]
pub struct ListDirectoryTool {
    root: WorkspaceRoot,
}

impl ListDirectoryTool {
    pub fn new(root: WorkspaceRoot) -> Self {
        Self { root }
    }

    async fn entries(&self, requested: &str) -> Result<Vec<String>> {
        let path = self.root.resolve(requested)?;
        let mut reader = tokio::fs::read_dir(&path)
            .await
            .with_context(|| format!("failed to list {requested}"))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.is_ok_and(|kind| kind.is_dir()) {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();
        Ok(entries)
    }
}

#[async_trait]
impl AsyncTool for ListDirectoryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            description: "List a directory relative to the working directory".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"path": {"type": "string", "default": "."}}
            }),
            runtime: false,
        }
    }

    async fn invoke(&self, args: ToolArgs, _runtime: Option<ToolRuntime>) -> ToolResult {
        let requested = optional_str(&args, "path").unwrap_or(".");
        let entries = self.entries(requested).await?;

        let mut message = ToolMessage::text(entries.join("\n")).with_name("list_directory");
        message.artifact = Some(json!({"entries": entries}));
        Ok(message.into())
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use serde_json::Value;

    use super::*;
    use crate::worker::protocol::ToolOutput;

    fn args(value: Value) -> ToolArgs {
        match value {
            Value::Object(map) => map,
            _ => ToolArgs::new(),
        }
    }

    fn content(output: ToolOutput) -> String {
        match output {
            ToolOutput::Message(message) => message.content,
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_then_read_and_list() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let root = WorkspaceRoot::fixed(dir.path());

        WriteFileTool::new(root.clone())
            .invoke(args(json!({"path": "notes/a.txt", "content": "hello"})), None)
            .await?;
        dir.child("notes/a.txt").assert("hello");

        let read = ReadFileTool::new(root.clone())
            .invoke(args(json!({"path": "notes/a.txt"})), None)
            .await?;
        assert_eq!(content(read), "hello");

        dir.child("notes/sub").create_dir_all()?;
        let listed = ListDirectoryTool::new(root)
            .invoke(args(json!({"path": "notes"})), None)
            .await?;
        assert_eq!(content(listed), "a.txt\nsub/");
        Ok(())
    }

    #[tokio::test]
    async fn refuses_without_working_dir() {
        let tool = ReadFileTool::new(WorkspaceRoot::from_env());
        // The test process never exports the working directory.
        if std::env::var_os("TOOLCAGE_WORKING_DIR").is_some() {
            return;
        }
        let err = tool
            .invoke(args(json!({"path": "a.txt"})), None)
            .await
            .expect_err("no working dir");
        assert_eq!(
            err.to_string(),
            "working directory unavailable: filesystem permission not granted"
        );
    }

    #[tokio::test]
    async fn refuses_escaping_paths() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let tool = WriteFileTool::new(WorkspaceRoot::fixed(dir.path()));
        let err = tool
            .invoke(args(json!({"path": "../escape.txt", "content": "x"})), None)
            .await
            .expect_err("escape");
        assert!(err.to_string().contains("escapes the working directory"));
        Ok(())
    }
}
