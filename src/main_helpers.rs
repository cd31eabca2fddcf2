use anyhow::{Result, anyhow};
use toolcage_config::ToolcageConfig;
use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber when `RUST_LOG` is set. Returns whether it did.
pub(crate) fn initialize_tracing() -> bool {
    if std::env::var("RUST_LOG").is_err() {
        return false;
    }

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(err) = init_result {
        eprintln!("warning: tracing already initialized: {err}");
    }
    true
}

/// Subscriber driven by the `[debug]` section. Logs go to stderr so command
/// output on stdout stays machine-readable.
pub(crate) fn initialize_tracing_from_config(config: &ToolcageConfig) -> Result<()> {
    let directives = config.debug.filter_directives();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize tracing: {err}"))?;

    tracing::info!(filter = %directives, "debug tracing enabled");
    Ok(())
}
