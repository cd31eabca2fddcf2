//! Process plumbing shared by the sandbox runtime: process-group isolation and
//! cleanup, bounded draining of child pipes, and a timed one-shot command
//! runner used for host-side pre-flight checks.

pub mod process_group;
pub mod runner;
pub mod stream;

pub use process_group::{ProcessGroupGuard, kill_process_group};
pub use runner::{CommandOutput, CommandStatus, RunError, run_with_timeout, run_with_timeout_in};
pub use stream::{CapturedStream, read_bounded};
