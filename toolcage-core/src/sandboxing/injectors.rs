//! Launch-command rewriting for sandboxes without network access.
//!
//! Injectors are tried in order; the first one whose `should_apply` matches
//! rewrites the command and the chain stops there.

use std::sync::Arc;

use async_trait::async_trait;
use toolcage_config::{SandboxConfig, SandboxPermission};

use super::package_cache::{PackageCache, SystemPackageCache, detect_package};

const OFFLINE_FLAG: &str = "--offline";

/// Result of running a launch command through an injector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionOutcome {
    pub command: String,
    pub args: Vec<String>,
    /// `false` means the server must not be started.
    pub success: bool,
}

impl InjectionOutcome {
    fn unchanged(command: String, args: Vec<String>) -> Self {
        Self {
            command,
            args,
            success: true,
        }
    }
}

#[async_trait]
pub trait CommandInjector: Send + Sync {
    fn name(&self) -> &'static str;

    fn should_apply(&self, command: &str, args: &[String], config: &SandboxConfig) -> bool;

    async fn apply(
        &self,
        server_name: &str,
        command: String,
        args: Vec<String>,
        config: &SandboxConfig,
    ) -> InjectionOutcome;
}

/// Adds `--network none` to `docker run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerNetworkInjector;

fn has_network_flag(args: &[String]) -> bool {
    args.iter().any(|arg| {
        arg == "--network"
            || arg == "--net"
            || arg.starts_with("--network=")
            || arg.starts_with("--net=")
    })
}

#[async_trait]
impl CommandInjector for DockerNetworkInjector {
    fn name(&self) -> &'static str {
        "docker-network"
    }

    fn should_apply(&self, command: &str, args: &[String], config: &SandboxConfig) -> bool {
        command == "docker"
            && args.iter().any(|arg| arg == "run")
            && !config.has_permission(SandboxPermission::Network)
    }

    async fn apply(
        &self,
        server_name: &str,
        command: String,
        mut args: Vec<String>,
        _config: &SandboxConfig,
    ) -> InjectionOutcome {
        if has_network_flag(&args) {
            return InjectionOutcome::unchanged(command, args);
        }

        if let Some(run_index) = args.iter().position(|arg| arg == "run") {
            args.insert(run_index + 1, "--network".to_string());
            args.insert(run_index + 2, "none".to_string());
            tracing::debug!(server = server_name, "injected --network none");
        }
        InjectionOutcome::unchanged(command, args)
    }
}

/// Ensures the package is cached on the host, then switches `npx`/`uvx` to
/// offline mode.
pub struct PackageOfflineInjector {
    cache: Arc<dyn PackageCache>,
}

impl PackageOfflineInjector {
    pub fn new(cache: Arc<dyn PackageCache>) -> Self {
        Self { cache }
    }
}

impl Default for PackageOfflineInjector {
    fn default() -> Self {
        Self::new(Arc::new(SystemPackageCache::new()))
    }
}

/// Add `--offline` to an `npx`/`uvx` launch.
///
/// Direct launches get the flag prepended to `args`. `sh -c "<manager> ..."`
/// is re-tokenized and the flag is inserted right after the manager. Shell
/// strings that fail to parse are left untouched. The flag is never added twice.
pub fn inject_offline_flag(command: &str, args: &[String]) -> Vec<String> {
    if command == "sh" && args.first().is_some_and(|arg| arg == "-c") {
        if let Some(script) = args.get(1) {
            match shell_words::split(script) {
                Ok(mut tokens) => {
                    let is_manager = tokens
                        .first()
                        .is_some_and(|first| first == "npx" || first == "uvx");
                    if is_manager && !tokens.iter().any(|t| t == OFFLINE_FLAG) {
                        tokens.insert(1, OFFLINE_FLAG.to_string());
                        let mut rewritten = vec!["-c".to_string(), shell_words::join(&tokens)];
                        rewritten.extend(args.iter().skip(2).cloned());
                        return rewritten;
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "unparsable shell script; offline flag not injected");
                }
            }
        }
    }

    if (command == "npx" || command == "uvx") && !args.iter().any(|arg| arg == OFFLINE_FLAG) {
        let mut rewritten = Vec::with_capacity(args.len() + 1);
        rewritten.push(OFFLINE_FLAG.to_string());
        rewritten.extend(args.iter().cloned());
        return rewritten;
    }

    args.to_vec()
}

#[async_trait]
impl CommandInjector for PackageOfflineInjector {
    fn name(&self) -> &'static str {
        "package-offline"
    }

    fn should_apply(&self, command: &str, args: &[String], config: &SandboxConfig) -> bool {
        !config.has_permission(SandboxPermission::Network) && detect_package(command, args).is_some()
    }

    async fn apply(
        &self,
        server_name: &str,
        command: String,
        args: Vec<String>,
        _config: &SandboxConfig,
    ) -> InjectionOutcome {
        let Some(package) = detect_package(&command, &args) else {
            return InjectionOutcome::unchanged(command, args);
        };

        if !self.cache.is_cached(&package).await {
            tracing::info!(
                server = server_name,
                package = %package.name,
                manager = %package.manager,
                "caching package for sandbox"
            );
            if !self.cache.populate(&package).await {
                tracing::warn!(server = server_name, package = %package.name, "blocking MCP server: cache failed");
                return InjectionOutcome {
                    command,
                    args,
                    success: false,
                };
            }
        }

        if package.manager.supports_offline_flag() {
            let args = inject_offline_flag(&command, &args);
            return InjectionOutcome::unchanged(command, args);
        }
        InjectionOutcome::unchanged(command, args)
    }
}

/// Ordered injectors; the first match wins.
pub struct InjectorChain {
    injectors: Vec<Box<dyn CommandInjector>>,
}

impl InjectorChain {
    pub fn new(injectors: Vec<Box<dyn CommandInjector>>) -> Self {
        Self { injectors }
    }

    /// Docker network isolation, then package caching, using `cache`.
    pub fn with_package_cache(cache: Arc<dyn PackageCache>) -> Self {
        Self::new(vec![
            Box::new(DockerNetworkInjector),
            Box::new(PackageOfflineInjector::new(cache)),
        ])
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.injectors.iter().map(|injector| injector.name()).collect()
    }

    pub async fn apply(
        &self,
        server_name: &str,
        command: String,
        args: Vec<String>,
        config: &SandboxConfig,
    ) -> InjectionOutcome {
        for injector in &self.injectors {
            if injector.should_apply(&command, &args, config) {
                tracing::debug!(server = server_name, injector = injector.name(), "applying injector");
                return injector.apply(server_name, command, args, config).await;
            }
        }
        InjectionOutcome::unchanged(command, args)
    }
}

impl Default for InjectorChain {
    fn default() -> Self {
        Self::with_package_cache(Arc::new(SystemPackageCache::new()))
    }
}

impl std::fmt::Debug for InjectorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectorChain")
            .field("injectors", &self.names())
            .finish()
    }
}
