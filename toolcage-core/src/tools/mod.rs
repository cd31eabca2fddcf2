//! Tools shipped with the worker.

pub mod basic;
pub mod file_system;
pub mod terminal;
pub mod todo;

mod workspace;

use std::sync::Arc;

use toolcage_config::SandboxPermission;

use crate::sandboxing::ToolSandboxPolicy;
use crate::worker::registry::{ToolRegistration, ToolRegistry};

pub use workspace::WorkspaceRoot;

fn filesystem() -> ToolSandboxPolicy {
    ToolSandboxPolicy::requires([SandboxPermission::Filesystem])
}

/// Register every builtin; file and terminal tools operate under `root`.
pub fn register_builtin_tools(registry: &mut ToolRegistry, root: &WorkspaceRoot) {
    for registration in basic::registrations() {
        registry.register(registration);
    }

    let module = file_system::MODULE;
    registry.register(
        ToolRegistration::from_async_tool(
            module,
            "read_file",
            Arc::new(file_system::ReadFileTool::new(root.clone())),
        )
        .with_policy(filesystem()),
    );
    registry.register(
        ToolRegistration::from_async_tool(
            module,
            "write_file",
            Arc::new(file_system::WriteFileTool::new(root.clone())),
        )
        .with_policy(filesystem()),
    );
    registry.register(
        ToolRegistration::from_async_tool(
            module,
            "list_directory",
            Arc::new(file_system::ListDirectoryTool::new(root.clone())),
        )
        .with_policy(filesystem()),
    );

    registry.register(
        ToolRegistration::from_async_tool(
            terminal::MODULE,
            "run_command",
            Arc::new(terminal::RunCommandTool::new(root.clone())),
        )
        .with_policy(filesystem()),
    );

    registry.register(
        ToolRegistration::from_sync_tool(todo::MODULE, "write_todos", Arc::new(todo::WriteTodosTool))
            .with_policy(ToolSandboxPolicy::bypass()),
    );
}
