//! Environment handed to sandboxed workers.

use std::collections::HashMap;
use std::path::Path;

use toolcage_config::constants::env;

/// Credentials never passed to a worker when filtering is enabled.
const SENSITIVE_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GEMINI_API_KEY",
    "HF_TOKEN",
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "NPM_TOKEN",
    "CARGO_REGISTRY_TOKEN",
    "DATABASE_URL",
    "PGPASSWORD",
    "MYSQL_PWD",
    "SSH_AUTH_SOCK",
    "GPG_AGENT_INFO",
    "VAULT_TOKEN",
    "KUBECONFIG",
    "DOCKER_AUTH_CONFIG",
];

/// Whether `key` names a credential or a dynamic-linker override.
pub fn is_sensitive_env_var(key: &str) -> bool {
    SENSITIVE_ENV_VARS.contains(&key)
        || ["AWS_", "AZURE_", "GOOGLE_", "GCP_", "LD_", "DYLD_"]
            .iter()
            .any(|prefix| key.starts_with(prefix))
        || ["_TOKEN", "_API_KEY", "_SECRET", "_PASSWORD", "_CREDENTIALS"]
            .iter()
            .any(|suffix| key.ends_with(suffix))
}

/// Copy of `parent` (optionally without credentials) plus sandbox markers.
///
/// `working_dir` is exported only when the call was granted filesystem
/// access; tools use its absence to refuse path operations.
pub fn build_worker_env(
    parent: impl IntoIterator<Item = (String, String)>,
    filter_sensitive: bool,
    backend: &str,
    working_dir: Option<&Path>,
) -> HashMap<String, String> {
    let mut child: HashMap<String, String> = parent
        .into_iter()
        .filter(|(key, _)| !(filter_sensitive && is_sensitive_env_var(key)))
        .collect();

    child.insert(env::SANDBOX_ACTIVE.to_string(), "1".to_string());
    child.insert(env::SANDBOX_TYPE.to_string(), backend.to_string());
    match working_dir {
        Some(dir) => {
            child.insert(env::WORKING_DIR.to_string(), dir.to_string_lossy().into_owned());
        }
        None => {
            child.remove(env::WORKING_DIR);
        }
    }
    child
}

/// The current process environment, skipping entries that are not UTF-8.
pub fn current_env() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}
