//! Command-line interface of the `toolcage` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use toolcage_config::SandboxPermission;

mod exec;
mod run_tool;
mod sandboxes;
mod wrap_mcp;

pub use exec::{ExecCommandOptions, handle_exec_command};
pub use run_tool::handle_run_tool_command;
pub use sandboxes::handle_sandboxes_command;
pub use wrap_mcp::handle_wrap_mcp_command;

#[derive(Debug, Parser)]
#[command(name = "toolcage")]
#[command(about = "Run agent tools and MCP servers inside OS sandboxes")]
#[command(version)]
pub struct Cli {
    /// Workspace root (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Sandbox definition to use, overriding `[sandbox].active`
    #[arg(long, global = true, value_name = "NAME")]
    pub sandbox: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List configured sandboxes and whether their backend runs on this host
    Sandboxes,

    /// Run one tool call through the active sandbox and print the worker response
    ///
    /// Examples:
    ///   toolcage exec --module os.path --tool basename --args '{"p":"/a/b/c.txt"}'
    ///   toolcage exec --module os --tool getcwd --permission filesystem
    Exec {
        /// Module path of the tool, e.g. `tools.file_system`
        #[arg(long)]
        module: String,

        /// Tool name within the module
        #[arg(long)]
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,

        /// Permission the call declares; repeatable. Omit to use the full grant.
        #[arg(long = "permission", value_name = "PERMISSION")]
        permissions: Vec<SandboxPermission>,

        /// Wall-clock limit in seconds (defaults to the sandbox timeout)
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Run a catalog tool by name through the permission gate and the sandbox
    RunTool {
        /// Tool name, bare (`read_file`) or qualified (`tools.file_system.read_file`)
        name: String,

        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },

    /// Print the sandboxed launch command of a configured MCP server
    WrapMcp {
        /// Server name from `[[mcp.servers]]`
        name: String,
    },
}

/// Parse `--args`; absent means no arguments.
pub(crate) fn parse_tool_args(raw: Option<&str>) -> anyhow::Result<toolcage_core::ToolArgs> {
    use anyhow::Context;

    match raw {
        None => Ok(toolcage_core::ToolArgs::new()),
        Some(raw) => serde_json::from_str(raw).context("--args must be a JSON object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exec_collects_repeated_permissions() {
        let cli = Cli::try_parse_from([
            "toolcage",
            "--sandbox",
            "dev",
            "exec",
            "--module",
            "os",
            "--tool",
            "getcwd",
            "--permission",
            "filesystem",
            "--permission",
            "network",
        ])
        .expect("parse");

        assert_eq!(cli.sandbox.as_deref(), Some("dev"));
        match cli.command {
            Commands::Exec { permissions, .. } => assert_eq!(
                permissions,
                vec![SandboxPermission::Filesystem, SandboxPermission::Network]
            ),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let result = Cli::try_parse_from([
            "toolcage", "exec", "--module", "os", "--tool", "getpid", "--permission", "root",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn tool_args_must_be_an_object() {
        assert!(parse_tool_args(None).expect("empty").is_empty());
        assert_eq!(
            parse_tool_args(Some(r#"{"path":"x"}"#)).expect("object")["path"],
            serde_json::json!("x")
        );
        assert!(parse_tool_args(Some("[1]")).is_err());
    }
}
