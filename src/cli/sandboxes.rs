use anyhow::Result;
use toolcage_config::{SandboxConfig, SandboxType};
use toolcage_core::sandboxing::{BubblewrapBackend, SeatbeltBackend};

use crate::startup::StartupContext;

fn backend_available(sandbox_type: SandboxType) -> bool {
    match sandbox_type {
        SandboxType::Bubblewrap => BubblewrapBackend::is_available(),
        SandboxType::Seatbelt => SeatbeltBackend::is_available(),
    }
}

fn describe(config: &SandboxConfig, active: bool) -> String {
    let permissions = if config.permissions.is_empty() {
        "none".to_string()
    } else {
        config.permissions.to_string()
    };
    let availability = if backend_available(config.sandbox_type) {
        "available"
    } else {
        "unavailable"
    };
    format!(
        "{marker} {name:<20} {kind:<11} permissions: {permissions:<21} timeout: {timeout}s  [{availability}]",
        marker = if active { "*" } else { " " },
        name = config.name,
        kind = config.sandbox_type.as_str(),
        timeout = config.timeout,
    )
}

pub fn handle_sandboxes_command(startup: &StartupContext) -> Result<bool> {
    let sandboxes = startup.manager().sandboxes();
    if sandboxes.is_empty() {
        println!(
            "No sandboxes configured in {}",
            startup.workspace.join(".toolcage/sandboxes").display()
        );
        return Ok(true);
    }

    let active = startup
        .active_sandbox_config()
        .ok()
        .flatten()
        .map(|config| config.name.clone());
    for config in sandboxes.sandboxes() {
        let is_active = active.as_deref() == Some(config.name.as_str());
        println!("{}", describe(config, is_active));
    }
    Ok(true)
}
