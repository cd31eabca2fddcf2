//! Detection and host-side caching of packages fetched at launch time.
//!
//! `npx`, `uvx` and `docker run` download what they run. Inside a sandbox
//! without network that download fails, so the package is fetched once on the
//! host and the launch is switched to offline mode.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use toolcage_process::run_with_timeout;

/// `npx [flags] <package>`; scoped packages keep their scope.
static NPX_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r"npx\s+(?:-[\w]+\s+|--[\w-]+(?:=\S+)?\s+)*(@[\w/-]+[\w.-]*|[\w-]+)")
});

/// `uvx [--flags] <package>[extras]`
static UVX_PACKAGE: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"uvx\s+(?:--[\w-]+(?:=\S+)?\s+)*([\w-]+(?:\[[\w,]+\])?)"));

/// `docker run [flags] <image>[:tag]`
static DOCKER_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r"docker\s+run\s+(?:(?:-\w+|--[\w-]+(?:=\S+)?)\s+)*([\w./-]+(?::[\w.-]+)?)")
});

fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        // Covered by the `patterns_compile` test
        Err(err) => panic!("invalid regex pattern `{pattern}`: {err}"),
    }
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const PACKAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(120);
const IMAGE_PULL_TIMEOUT: Duration = Duration::from_secs(300);

const NPX_NOT_CACHED: &str = "ENOTCACHED";
const UVX_NOT_CACHED: &str = "unavailable because the network was disabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    Npx,
    Uvx,
    Docker,
}

impl PackageManager {
    pub fn binary(self) -> &'static str {
        match self {
            Self::Npx => "npx",
            Self::Uvx => "uvx",
            Self::Docker => "docker",
        }
    }

    /// Whether the manager understands `--offline`.
    pub fn supports_offline_flag(self) -> bool {
        matches!(self, Self::Npx | Self::Uvx)
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// A package (or image) a launch command would fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub manager: PackageManager,
    pub name: String,
}

fn capture(pattern: &Regex, line: &str) -> Option<String> {
    pattern
        .captures(line)?
        .get(1)
        .map(|found| found.as_str().to_string())
}

/// Find the package a launch command fetches, skipping leading flags.
///
/// Matching runs on the space-joined command line, so `sh -c "npx -y pkg"`
/// is detected too.
pub fn detect_package(command: &str, args: &[String]) -> Option<PackageRef> {
    let line = std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    let candidates = [
        (PackageManager::Npx, "npx", &NPX_PACKAGE),
        (PackageManager::Uvx, "uvx", &UVX_PACKAGE),
        (PackageManager::Docker, "docker run", &DOCKER_IMAGE),
    ];

    candidates
        .into_iter()
        .filter(|(_, needle, _)| line.contains(needle))
        .find_map(|(manager, _, pattern)| {
            capture(pattern, &line).map(|name| PackageRef { manager, name })
        })
}

/// Probe and populate the host package caches.
#[async_trait]
pub trait PackageCache: Send + Sync {
    /// Whether the package can be launched without network access.
    async fn is_cached(&self, package: &PackageRef) -> bool;

    /// Fetch the package on the host. Returns whether it is now cached.
    async fn populate(&self, package: &PackageRef) -> bool;
}

/// [`PackageCache`] backed by the real `npx`, `uvx` and `docker` binaries.
#[derive(Debug, Clone, Default)]
pub struct SystemPackageCache;

impl SystemPackageCache {
    pub fn new() -> Self {
        Self
    }

    async fn run(program: &str, args: &[&str], timeout: Duration) -> Option<(bool, String)> {
        let args: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
        match run_with_timeout(program, &args, timeout).await {
            Ok(output) => Some((output.status.success(), output.stderr)),
            Err(err) => {
                tracing::debug!(program, error = %err, "package cache command failed");
                None
            }
        }
    }
}

#[async_trait]
impl PackageCache for SystemPackageCache {
    async fn is_cached(&self, package: &PackageRef) -> bool {
        let binary = package.manager.binary();
        if which::which(binary).is_err() {
            return false;
        }

        let name = package.name.as_str();
        let (program_args, marker): (Vec<&str>, Option<&str>) = match package.manager {
            PackageManager::Npx => (vec!["--offline", name, "--help"], Some(NPX_NOT_CACHED)),
            PackageManager::Uvx => (vec!["--offline", name, "--help"], Some(UVX_NOT_CACHED)),
            PackageManager::Docker => (vec!["image", "inspect", name], None),
        };

        match Self::run(binary, &program_args, PROBE_TIMEOUT).await {
            Some((true, _)) => true,
            Some((false, stderr)) => {
                if marker.is_some_and(|marker| stderr.contains(marker)) {
                    tracing::debug!(manager = %package.manager, package = name, "not cached");
                } else {
                    tracing::debug!(
                        manager = %package.manager,
                        package = name,
                        "offline probe failed; treating as not cached"
                    );
                }
                false
            }
            None => false,
        }
    }

    async fn populate(&self, package: &PackageRef) -> bool {
        let binary = package.manager.binary();
        if which::which(binary).is_err() {
            tracing::warn!(manager = binary, "package manager not installed; cannot cache");
            return false;
        }

        let name = package.name.as_str();
        let (program_args, timeout): (Vec<&str>, Duration) = match package.manager {
            PackageManager::Npx => (vec!["-y", name, "--help"], PACKAGE_FETCH_TIMEOUT),
            PackageManager::Uvx => (vec![name, "--help"], PACKAGE_FETCH_TIMEOUT),
            PackageManager::Docker => (vec!["pull", name], IMAGE_PULL_TIMEOUT),
        };

        tracing::info!(manager = binary, package = name, "caching for offline use");
        match Self::run(binary, &program_args, timeout).await {
            Some((true, _)) => {
                tracing::info!(manager = binary, package = name, "cached");
                true
            }
            Some((false, stderr)) => {
                tracing::warn!(manager = binary, package = name, %stderr, "failed to cache");
                false
            }
            None => false,
        }
    }
}
