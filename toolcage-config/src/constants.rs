//! Shared constants for toolcage configuration and the sandbox runtime.

/// File and directory names.
pub mod paths {
    /// Workspace configuration file.
    pub const CONFIG_FILE_NAME: &str = "toolcage.toml";
    /// Workspace-local configuration directory.
    pub const CONFIG_DIR: &str = ".toolcage";
    /// Directory (under [`CONFIG_DIR`]) holding one TOML file per sandbox.
    pub const SANDBOXES_DIR: &str = "sandboxes";
}

/// Sandbox defaults and bounds.
pub mod sandbox {
    /// Default wall-clock limit for one sandboxed tool call, in seconds.
    pub const DEFAULT_TIMEOUT_SECS: f64 = 60.0;
    pub const MIN_TIMEOUT_SECS: f64 = 1.0;
    pub const MAX_TIMEOUT_SECS: f64 = 3600.0;

    /// Read-only system locations mounted when a sandbox file does not list its own.
    pub const DEFAULT_EXECUTION_RO_PATHS: &[&str] =
        &["/usr", "/lib", "/lib64", "/bin", "/sbin", "/etc"];
}

/// Output limits enforced on the worker pipes.
pub mod limits {
    /// Maximum captured stdout of a sandboxed worker (10 MiB).
    pub const DEFAULT_STDOUT_MAX_BYTES: usize = 10 * 1024 * 1024;
    /// Maximum captured stderr of a sandboxed worker (1 MiB).
    pub const DEFAULT_STDERR_MAX_BYTES: usize = 1024 * 1024;
    /// Characters of raw output kept in error previews.
    pub const DEFAULT_PREVIEW_CHARS: usize = 2000;
}

/// Environment variables understood by the sandbox and the worker.
pub mod env {
    /// Working directory handed to tools that were granted filesystem access.
    pub const WORKING_DIR: &str = "TOOLCAGE_WORKING_DIR";
    /// Set to `1` inside every sandboxed child.
    pub const SANDBOX_ACTIVE: &str = "TOOLCAGE_SANDBOX_ACTIVE";
    /// Backend name (`bubblewrap`, `seatbelt`) of the enclosing sandbox.
    pub const SANDBOX_TYPE: &str = "TOOLCAGE_SANDBOX_TYPE";
    /// Overrides the worker binary location.
    pub const WORKER_PATH: &str = "TOOLCAGE_WORKER";
}

/// Default tracing targets when `[debug].trace_targets` is empty.
pub const DEFAULT_TRACE_TARGETS: &str = "toolcage,toolcage_core";

/// Name of the worker binary shipped next to the CLI.
pub const WORKER_BINARY_NAME: &str = "toolcage-worker";
