//! macOS isolation through `sandbox-exec` and generated Seatbelt profiles.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::TempPath;
use toolcage_config::{PermissionSet, SandboxConfig, SandboxPermission};

use super::backend::{BackendContext, SandboxBackend};
use super::error::SandboxError;

pub const SANDBOX_EXEC_BINARY: &str = "sandbox-exec";

/// Directories that must be listable for the dynamic loader and path
/// resolution to work at all.
const LITERAL_READ_PATHS: &[&str] = &[
    "/",
    "/opt",
    "/var",
    "/private",
    "/private/var",
    "/private/var/select",
    "/Users",
];

/// Escape a path for interpolation into a Seatbelt string literal.
///
/// Backslashes and quotes are escaped; newline, carriage return and NUL are
/// dropped so a path cannot terminate the rule it appears in.
pub fn escape_seatbelt_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for ch in path.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' | '\r' | '\0' => {}
            other => escaped.push(other),
        }
    }
    escaped
}

fn quoted(path: &Path) -> String {
    escape_seatbelt_path(&path.to_string_lossy())
}

/// Inputs of a generated profile beyond the sandbox config itself.
#[derive(Debug, Clone, Default)]
pub struct ProfileOptions<'a> {
    pub working_dir: Option<&'a Path>,
    pub extra_read_paths: &'a [PathBuf],
    /// POSIX shared memory, needed by the worker runtime but not MCP servers.
    pub allow_ipc: bool,
}

/// Render a deny-by-default Seatbelt profile for `permissions`.
pub fn generate_seatbelt_profile(
    config: &SandboxConfig,
    permissions: &PermissionSet,
    options: &ProfileOptions<'_>,
) -> String {
    let mut profile = String::from(
        "(version 1)\n\
         (deny default)\n\
         (allow process-fork)\n\
         (allow process-exec)\n\
         (allow process-exec-interpreter)\n\
         (allow signal (target self))\n\
         (allow mach-lookup)\n\
         (allow sysctl-read)\n\
         (allow file-write* (literal \"/dev/null\"))\n",
    );

    if options.allow_ipc {
        profile.push_str("(allow ipc-posix-shm-read-data ipc-posix-shm-write-data)\n");
    }

    for path in LITERAL_READ_PATHS {
        let _ = writeln!(profile, "(allow file-read* (literal \"{path}\"))");
    }
    for path in config
        .expanded_execution_ro_paths()
        .iter()
        .chain(options.extra_read_paths)
    {
        let _ = writeln!(profile, "(allow file-read* (subpath \"{}\"))", quoted(path));
    }
    for path in config.expanded_execution_rw_paths() {
        let _ = writeln!(
            profile,
            "(allow file-read* file-write* (subpath \"{}\"))",
            quoted(&path)
        );
    }

    if permissions.contains(SandboxPermission::Filesystem) {
        let writable = config
            .expanded_filesystem_paths()
            .into_iter()
            .chain(options.working_dir.map(Path::to_path_buf));
        for path in writable {
            let _ = writeln!(
                profile,
                "(allow file-read* file-write* (subpath \"{}\"))",
                quoted(&path)
            );
        }
    }

    // Local unix sockets stay reachable even without network; the allowlist
    // below names specific sockets on top of that.
    profile.push_str("(allow network* (local unix-socket))\n");
    for path in config.expanded_socket_paths() {
        let path = quoted(&path);
        let _ = writeln!(profile, "(allow file-read* (literal \"{path}\"))");
        let _ = writeln!(
            profile,
            "(allow network-outbound (remote unix-socket (path-literal \"{path}\")))"
        );
    }

    if permissions.contains(SandboxPermission::Network) {
        profile.push_str(
            "(allow network-outbound)\n\
             (allow network-inbound)\n\
             (allow system-socket)\n",
        );
    }

    profile
}

/// Profile files owned by one backend instance.
#[derive(Debug, Default)]
struct ProfileStore {
    /// Reused across tool calls with the same effective permissions.
    tool_profiles: HashMap<PermissionSet, TempPath>,
    mcp_profiles: Vec<TempPath>,
}

#[derive(Debug)]
pub struct SeatbeltBackend {
    ctx: BackendContext,
    profiles: Mutex<ProfileStore>,
}

impl SeatbeltBackend {
    pub fn new(ctx: BackendContext) -> Self {
        Self {
            ctx,
            profiles: Mutex::new(ProfileStore::default()),
        }
    }

    /// `sandbox-exec` is on `PATH` and we are on macOS.
    pub fn is_available() -> bool {
        cfg!(target_os = "macos") && which::which(SANDBOX_EXEC_BINARY).is_ok()
    }

    fn render(&self, permissions: &PermissionSet, allow_ipc: bool) -> String {
        let extra: Vec<PathBuf> = self.ctx.worker_dir.iter().cloned().collect();
        generate_seatbelt_profile(
            &self.ctx.config,
            permissions,
            &ProfileOptions {
                working_dir: Some(&self.ctx.working_dir),
                extra_read_paths: &extra,
                allow_ipc,
            },
        )
    }

    fn write_profile(content: &str) -> Result<TempPath, SandboxError> {
        let mut file = tempfile::Builder::new()
            .prefix("toolcage_")
            .suffix(".sb")
            .tempfile()
            .map_err(SandboxError::Profile)?;
        file.write_all(content.as_bytes())
            .and_then(|()| file.flush())
            .map_err(SandboxError::Profile)?;
        Ok(file.into_temp_path())
    }

    fn tool_profile(&self, permissions: &PermissionSet) -> Result<String, SandboxError> {
        if let Some(existing) = self.profiles.lock().tool_profiles.get(permissions) {
            return Ok(existing.to_string_lossy().into_owned());
        }

        let written = Self::write_profile(&self.render(permissions, true))?;
        let mut store = self.profiles.lock();
        // A concurrent call may have written the same profile; keep the first.
        let path = store
            .tool_profiles
            .entry(permissions.clone())
            .or_insert(written);
        Ok(path.to_string_lossy().into_owned())
    }

    /// Number of profile files currently on disk.
    pub fn profile_count(&self) -> usize {
        let store = self.profiles.lock();
        store.tool_profiles.len() + store.mcp_profiles.len()
    }
}

impl SandboxBackend for SeatbeltBackend {
    fn name(&self) -> &'static str {
        "seatbelt"
    }

    fn build_sandbox_command(
        &self,
        permissions: &PermissionSet,
    ) -> Result<Vec<String>, SandboxError> {
        let profile = self.tool_profile(permissions)?;
        tracing::debug!(backend = "seatbelt", %permissions, %profile, "sandbox command");
        Ok(vec![
            SANDBOX_EXEC_BINARY.to_string(),
            "-f".to_string(),
            profile,
        ])
    }

    fn build_mcp_wrapper(
        &self,
        command: &str,
        args: &[String],
        permissions: &PermissionSet,
    ) -> Result<(String, Vec<String>), SandboxError> {
        let written = Self::write_profile(&self.render(permissions, false))?;
        let profile = written.to_string_lossy().into_owned();
        self.profiles.lock().mcp_profiles.push(written);

        let mut wrapped = vec!["-f".to_string(), profile, command.to_string()];
        wrapped.extend(args.iter().cloned());
        tracing::debug!(backend = "seatbelt", command, args = ?wrapped, "wrapped MCP server");
        Ok((SANDBOX_EXEC_BINARY.to_string(), wrapped))
    }

    fn cleanup(&self) {
        let mut store = self.profiles.lock();
        let removed = store.tool_profiles.len() + store.mcp_profiles.len();
        // Dropping a TempPath unlinks the file.
        store.tool_profiles.clear();
        store.mcp_profiles.clear();
        if removed > 0 {
            tracing::debug!(removed, "removed seatbelt profiles");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use toolcage_config::SandboxType;

    use super::*;

    fn config() -> SandboxConfig {
        let mut config = SandboxConfig::new("mac", SandboxType::Seatbelt);
        config.execution_ro_paths = vec!["/usr".to_string()];
        config.filesystem_paths = vec!["/data".to_string()];
        config.socket_paths = vec!["/var/run/docker.sock".to_string()];
        config
    }

    fn backend() -> SeatbeltBackend {
        SeatbeltBackend::new(BackendContext {
            config: Arc::new(config()),
            working_dir: PathBuf::from("/Users/dev/project"),
            worker_dir: Some(PathBuf::from("/opt/toolcage/bin")),
        })
    }

    #[test]
    fn escapes_quotes_and_strips_line_breaks() {
        assert_eq!(escape_seatbelt_path(r#"/a"b\c"#), r#"/a\"b\\c"#);
        assert_eq!(escape_seatbelt_path("/a\nb\rc\0d"), "/abcd");
    }

    #[test]
    fn injected_path_cannot_close_rule() {
        let mut config = config();
        config.execution_ro_paths = vec!["/tmp/x\"))\n(allow network*".to_string()];
        let profile = generate_seatbelt_profile(
            &config,
            &PermissionSet::new(),
            &ProfileOptions::default(),
        );
        assert!(profile.contains(r#"(subpath "/tmp/x\"))(allow network*")"#));
        assert!(!profile.contains("(allow network-outbound)"));
    }

    #[test]
    fn unix_socket_carve_out_is_unconditional() {
        let set_network: PermissionSet = [SandboxPermission::Network].into_iter().collect();
        for permissions in [PermissionSet::new(), set_network, PermissionSet::all()] {
            let profile =
                generate_seatbelt_profile(&config(), &permissions, &ProfileOptions::default());
            assert!(profile.contains("(allow network* (local unix-socket))"));
            assert!(profile.contains(
                r#"(allow network-outbound (remote unix-socket (path-literal "/var/run/docker.sock")))"#
            ));
            assert_eq!(
                profile.contains("(allow network-outbound)\n"),
                permissions.contains(SandboxPermission::Network)
            );
        }
    }

    #[test]
    fn filesystem_rules_follow_permission() {
        let working_dir = PathBuf::from("/Users/dev/project");
        let options = ProfileOptions {
            working_dir: Some(&working_dir),
            ..ProfileOptions::default()
        };
        let closed = generate_seatbelt_profile(&config(), &PermissionSet::new(), &options);
        assert!(!closed.contains("/Users/dev/project"));
        assert!(!closed.contains("/data"));

        let open: PermissionSet = [SandboxPermission::Filesystem].into_iter().collect();
        let profile = generate_seatbelt_profile(&config(), &open, &options);
        assert!(profile.contains(r#"(allow file-read* file-write* (subpath "/Users/dev/project"))"#));
        assert!(profile.contains(r#"(allow file-read* file-write* (subpath "/data"))"#));
    }

    #[test]
    fn profile_starts_deny_default_and_reads_literals() {
        let profile =
            generate_seatbelt_profile(&config(), &PermissionSet::new(), &ProfileOptions::default());
        assert!(profile.starts_with("(version 1)\n(deny default)\n"));
        assert!(profile.contains(r#"(allow file-read* (literal "/private/var/select"))"#));
        assert!(profile.contains(r#"(allow file-read* (subpath "/usr"))"#));
        assert!(!profile.contains("ipc-posix-shm"));
    }

    #[test]
    fn tool_profiles_are_cached_per_permission_set() {
        let backend = backend();
        let none = PermissionSet::new();
        let first = backend.build_sandbox_command(&none).expect("command");
        let second = backend.build_sandbox_command(&none).expect("command");
        assert_eq!(first, second);
        assert_eq!(first.get(..2), Some(&["sandbox-exec".to_string(), "-f".to_string()][..]));

        let profile = std::fs::read_to_string(&first[2]).expect("profile on disk");
        assert!(profile.contains("ipc-posix-shm"));
        assert!(profile.contains(r#"(subpath "/opt/toolcage/bin")"#));

        let all = backend.build_sandbox_command(&PermissionSet::all()).expect("command");
        assert_ne!(all[2], first[2]);
        assert_eq!(backend.profile_count(), 2);
    }

    #[test]
    fn cleanup_unlinks_every_profile() {
        let backend = backend();
        let tool = backend.build_sandbox_command(&PermissionSet::new()).expect("command");
        let (program, args) = backend
            .build_mcp_wrapper("node", &["server.js".to_string()], &PermissionSet::new())
            .expect("wrapper");
        assert_eq!(program, "sandbox-exec");
        assert_eq!(args[0], "-f");
        assert_eq!(&args[2..], ["node", "server.js"]);

        let paths = [PathBuf::from(&tool[2]), PathBuf::from(&args[1])];
        assert!(paths.iter().all(|path| path.exists()));
        let mcp_profile = std::fs::read_to_string(&paths[1]).expect("profile");
        assert!(!mcp_profile.contains("ipc-posix-shm"));

        backend.cleanup();
        assert!(paths.iter().all(|path| !path.exists()));
        assert_eq!(backend.profile_count(), 0);
        backend.cleanup();
    }
}
