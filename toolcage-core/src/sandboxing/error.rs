use std::io;

use super::permissions::PermissionError;

/// Error type for sandbox construction and command building.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("{label} sandbox is not available. {hint}")]
    Unavailable {
        label: &'static str,
        hint: &'static str,
    },

    #[error("sandbox worker binary not found: {0}")]
    WorkerNotFound(String),

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to write seatbelt profile: {0}")]
    Profile(#[source] io::Error),

    #[error(transparent)]
    Permission(#[from] PermissionError),
}
