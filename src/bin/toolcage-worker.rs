//! The process started inside the sandbox.
//!
//! Reads one JSON request on stdin, writes one JSON response on stdout and
//! logs to stderr only.

use std::sync::Arc;

use toolcage_core::worker::{self, ToolRegistry};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    }

    let registry = Arc::new(ToolRegistry::builtin());
    let code = worker::run(registry, tokio::io::stdin(), tokio::io::stdout()).await;
    std::process::exit(code);
}
