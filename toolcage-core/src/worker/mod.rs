//! The process on the inside of the sandbox.
//!
//! A worker reads exactly one [`WorkerRequest`] from stdin, runs the named
//! tool and writes exactly one [`ToolResponse`] to stdout. Logs go to stderr.

pub mod protocol;
pub mod registry;
pub mod runtime;

use std::any::Any;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub use protocol::{
    GraphCommand, ToolArgs, ToolMessage, ToolOutput, ToolResponse, ToolStatus, WorkerRequest,
};
pub use registry::{
    AsyncTool, DispatchError, SyncTool, ToolHandler, ToolRegistration, ToolRegistry, ToolResult,
    ToolSchema,
};
pub use runtime::{AgentRuntime, ApprovalMode, RuntimeContext, ToolRuntime};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run one request against `registry`. Tool errors and panics become
/// unsuccessful responses.
pub async fn dispatch(registry: Arc<ToolRegistry>, request: WorkerRequest) -> ToolResponse {
    let WorkerRequest {
        module,
        tool_name,
        args,
        runtime_context,
    } = request;

    let task = {
        let module = module.clone();
        let tool_name = tool_name.clone();
        tokio::spawn(async move {
            registry
                .invoke(&module, &tool_name, args, runtime_context)
                .await
        })
    };

    match task.await {
        Ok(Ok(output)) => ToolResponse::from_output(output),
        Ok(Err(err)) => {
            tracing::error!(%module, tool = %tool_name, error = ?err, "tool failed");
            ToolResponse::failure(err.to_string()).with_traceback(format!("{err:?}"))
        }
        Err(join_err) if join_err.is_panic() => {
            let message = panic_message(join_err.into_panic().as_ref());
            tracing::error!(%module, tool = %tool_name, panic = %message, "tool panicked");
            ToolResponse::failure(format!("Tool panicked: {message}")).with_traceback(message)
        }
        Err(join_err) => ToolResponse::failure(format!("Tool task was cancelled: {join_err}")),
    }
}

async fn emit<W: AsyncWrite + Unpin>(output: &mut W, response: &ToolResponse) {
    let mut line = match serde_json::to_vec(response) {
        Ok(line) => line,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize response");
            br#"{"success":false,"error":"Failed to serialize tool response"}"#.to_vec()
        }
    };
    line.push(b'\n');
    if let Err(err) = output.write_all(&line).await {
        tracing::error!(error = %err, "failed to write response");
        return;
    }
    let _ = output.flush().await;
}

/// Worker entry point. Returns the process exit code.
pub async fn run<R, W>(registry: Arc<ToolRegistry>, mut input: R, mut output: W) -> i32
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut raw = Vec::new();
    if let Err(err) = input.read_to_end(&mut raw).await {
        emit(&mut output, &ToolResponse::failure(format!("Failed to read request: {err}"))).await;
        return 1;
    }

    let request: WorkerRequest = match serde_json::from_slice(&raw) {
        Ok(request) => request,
        Err(err) => {
            emit(&mut output, &ToolResponse::failure(format!("Invalid JSON: {err}"))).await;
            return 1;
        }
    };
    if request.module.is_empty() || request.tool_name.is_empty() {
        emit(&mut output, &ToolResponse::failure("Missing module or tool_name")).await;
        return 1;
    }

    tracing::debug!(module = %request.module, tool = %request.tool_name, "worker request");
    let response = dispatch(registry, request).await;
    emit(&mut output, &response).await;
    0
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(ToolRegistration::sync_fn("t", "fail", |_| {
            Err(anyhow::anyhow!("inner cause")).map_err(|err| err.context("outer failure"))
        }));
        registry.register(ToolRegistration::sync_fn("t", "panic", |_| -> ToolResult {
            panic!("tool exploded")
        }));
        Arc::new(registry)
    }

    async fn run_raw(input: &[u8]) -> (i32, Value) {
        let mut output = Vec::new();
        let code = run(registry(), input, &mut output).await;
        let value = serde_json::from_slice(&output).expect("one JSON document");
        (code, value)
    }

    #[tokio::test]
    async fn invalid_json_exits_one() {
        let (code, value) = run_raw(b"{not json").await;
        assert_eq!(code, 1);
        assert_eq!(value["success"], json!(false));
        assert!(value["error"].as_str().is_some_and(|e| e.starts_with("Invalid JSON")));
    }

    #[tokio::test]
    async fn missing_tool_name_exits_one() {
        let (code, value) = run_raw(br#"{"module":"t"}"#).await;
        assert_eq!(code, 1);
        assert_eq!(value["error"], json!("Missing module or tool_name"));
    }

    #[tokio::test]
    async fn tool_error_keeps_chain_in_traceback() {
        let (code, value) = run_raw(br#"{"module":"t","tool_name":"fail"}"#).await;
        assert_eq!(code, 0);
        assert_eq!(value["error"], json!("outer failure"));
        assert!(value["traceback"].as_str().is_some_and(|t| t.contains("inner cause")));
    }

    #[tokio::test]
    async fn panics_are_reported() {
        let (code, value) = run_raw(br#"{"module":"t","tool_name":"panic"}"#).await;
        assert_eq!(code, 0);
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], json!("Tool panicked: tool exploded"));
    }

    #[tokio::test]
    async fn unknown_module_is_a_tool_error() {
        let (code, value) = run_raw(br#"{"module":"nope","tool_name":"x","args":{}}"#).await;
        assert_eq!(code, 0);
        assert_eq!(value["error"], json!("No module named 'nope'"));
    }
}
