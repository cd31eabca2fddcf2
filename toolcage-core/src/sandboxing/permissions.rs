//! Permission model and the gate evaluated before anything runs sandboxed.
//!
//! A sandbox grants a ceiling of permissions; each tool or MCP server declares
//! what it needs. The process that actually runs receives the intersection,
//! never more than either side.

use std::fmt;

use serde::{Deserialize, Serialize};
use toolcage_config::{McpServerConfig, PermissionSet, SandboxConfig, SandboxPermission};

pub fn has_permission(config: &SandboxConfig, permission: SandboxPermission) -> bool {
    config.has_permission(permission)
}

/// Permissions a sandboxed process runs with.
///
/// `None` means "no narrowing requested" and yields the sandbox's full grant
/// (used when wrapping MCP servers without a declaration). `Some` yields the
/// declared permissions the sandbox also grants; `Some(&[])` yields nothing.
pub fn compute_effective_permissions(
    config: &SandboxConfig,
    declared: Option<&[SandboxPermission]>,
) -> PermissionSet {
    match declared {
        None => config.permissions.clone(),
        Some(declared) => declared
            .iter()
            .copied()
            .filter(|permission| config.has_permission(*permission))
            .collect(),
    }
}

/// Declared permissions the sandbox does not grant.
pub fn missing_permissions(
    config: &SandboxConfig,
    declared: &[SandboxPermission],
) -> PermissionSet {
    declared
        .iter()
        .copied()
        .filter(|permission| !config.has_permission(*permission))
        .collect()
}

/// Sandbox metadata attached to every tool and MCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSandboxPolicy {
    /// Permissions the subject needs. `None` and empty are both "undeclared".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<SandboxPermission>>,
    /// Run outside the sandbox entirely.
    #[serde(default)]
    pub bypass: bool,
}

impl ToolSandboxPolicy {
    pub fn requires(permissions: impl IntoIterator<Item = SandboxPermission>) -> Self {
        Self {
            permissions: Some(permissions.into_iter().collect()),
            bypass: false,
        }
    }

    pub fn bypass() -> Self {
        Self {
            permissions: None,
            bypass: true,
        }
    }

    pub fn undeclared() -> Self {
        Self::default()
    }

    pub fn declared(&self) -> Option<&[SandboxPermission]> {
        self.permissions.as_deref()
    }
}

/// An MCP server's declaration, which also covers every tool it serves.
impl From<&McpServerConfig> for ToolSandboxPolicy {
    fn from(server: &McpServerConfig) -> Self {
        Self {
            permissions: server.sandbox_permissions.clone(),
            bypass: server.sandbox_bypass,
        }
    }
}

/// What the gate is evaluating, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSubject {
    Tool,
    McpServer,
}

impl fmt::Display for GateSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool => f.write_str("Tool"),
            Self::McpServer => f.write_str("MCP server"),
        }
    }
}

/// Outcome of a successful gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Run unsandboxed.
    Bypassed,
    /// Run sandboxed; every declared permission is granted.
    Allowed(PermissionSet),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error(
        "{subject} '{name}' has no declared sandbox_permissions and cannot run in sandbox mode."
    )]
    NoDeclaration { subject: GateSubject, name: String },

    #[error("{subject} '{name}' requires permissions not granted by sandbox: {missing}")]
    MissingPermissions {
        subject: GateSubject,
        name: String,
        missing: PermissionSet,
    },
}

/// Deny-by-default check shared by tool calls, the catalog proxy and MCP startup.
#[derive(Debug, Clone, Copy)]
pub struct PermissionGate;

impl PermissionGate {
    pub fn evaluate(
        subject: GateSubject,
        name: &str,
        policy: &ToolSandboxPolicy,
        config: &SandboxConfig,
    ) -> Result<GateDecision, PermissionError> {
        if policy.bypass {
            tracing::debug!(%subject, name, "sandbox bypassed");
            return Ok(GateDecision::Bypassed);
        }

        let declared = match policy.declared() {
            Some(declared) if !declared.is_empty() => declared,
            _ => {
                tracing::warn!(%subject, name, "denied: no declared sandbox permissions");
                return Err(PermissionError::NoDeclaration {
                    subject,
                    name: name.to_string(),
                });
            }
        };

        let missing = missing_permissions(config, declared);
        if !missing.is_empty() {
            tracing::warn!(
                %subject,
                name,
                %missing,
                granted = %config.permissions,
                "denied: permissions not granted"
            );
            return Err(PermissionError::MissingPermissions {
                subject,
                name: name.to_string(),
                missing,
            });
        }

        let allowed = PermissionSet::from(declared);
        tracing::debug!(%subject, name, permissions = %allowed, "allowed");
        Ok(GateDecision::Allowed(allowed))
    }
}
