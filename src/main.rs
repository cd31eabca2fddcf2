//! toolcage - permission-gated sandboxed tool execution
//!
//! Thin binary entry point that delegates to the CLI handlers.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

mod cli;
mod main_helpers;
mod startup;

use cli::{Cli, Commands};
use startup::StartupContext;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    // RUST_LOG takes precedence over the [debug] section
    let env_tracing = main_helpers::initialize_tracing();

    let startup = StartupContext::from_cli_args(&args)?;
    if !env_tracing && startup.config().debug.enable_tracing {
        main_helpers::initialize_tracing_from_config(startup.config()).ok();
    }

    let succeeded = match args.command {
        Commands::Sandboxes => cli::handle_sandboxes_command(&startup)?,
        Commands::Exec {
            module,
            tool,
            args: raw_args,
            permissions,
            timeout,
        } => {
            let options = cli::ExecCommandOptions {
                module,
                tool,
                args: raw_args,
                permissions,
                timeout,
            };
            cli::handle_exec_command(&startup, options).await?
        }
        Commands::RunTool { name, args: raw_args } => {
            cli::handle_run_tool_command(&startup, &name, raw_args.as_deref()).await?
        }
        Commands::WrapMcp { name } => cli::handle_wrap_mcp_command(&startup, &name).await?,
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
