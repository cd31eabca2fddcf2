//! Process-group helpers for sandboxed children.
//!
//! Every sandboxed worker is started as the leader of a fresh session so the
//! wrapper (`bwrap`, `sandbox-exec`), the worker and anything the tool spawns
//! share one process group that can be signalled as a unit:
//! - [`detach_from_tty`] runs in `pre_exec` and starts the new session.
//! - [`set_parent_death_signal`] (Linux only) delivers `SIGTERM` to the child
//!   if the agent process dies first.
//! - [`ProcessGroupGuard`] kills the group when dropped, which covers
//!   cancellation of the future that owns the child.
//!
//! On non-Unix platforms these helpers are no-ops.

use std::io;

/// Arrange for the child to receive SIGTERM when the original parent dies.
///
/// Must run inside `pre_exec`. `parent_pid` is captured before spawning so a
/// parent that exits between fork and exec is still detected.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn set_parent_death_signal(parent_pid: libc::pid_t) -> io::Result<()> {
    // SAFETY: prctl/getppid/raise are async-signal-safe and take no pointers.
    unsafe {
        if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
            return Err(io::Error::last_os_error());
        }
        if libc::getppid() != parent_pid {
            libc::raise(libc::SIGTERM);
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_parent_death_signal(_parent_pid: i32) -> io::Result<()> {
    Ok(())
}

/// Start a new session (and therefore a new process group) for the caller,
/// falling back to a bare process group when it already leads a session.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn detach_from_tty() -> io::Result<()> {
    // SAFETY: setsid/setpgid only affect the calling process.
    unsafe {
        if libc::setsid() != -1 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EPERM) {
            return Err(err);
        }
        if libc::setpgid(0, 0) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn detach_from_tty() -> io::Result<()> {
    Ok(())
}

/// SIGKILL every member of group `pgid`. A group that is already gone is not
/// an error; group 0 and below are refused since they would hit the caller.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn kill_process_group(pgid: u32) -> io::Result<()> {
    let target = match libc::pid_t::try_from(pgid) {
        Ok(target) if target > 0 => target,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to signal process group {pgid}"),
            ));
        }
    };

    // SAFETY: plain syscall on a validated, positive group id.
    if unsafe { libc::killpg(target, libc::SIGKILL) } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn kill_process_group(_pgid: u32) -> io::Result<()> {
    Ok(())
}

/// Kills a process group when dropped unless [`disarm`](Self::disarm)ed.
///
/// The sandboxed child leads its own group, so the group ID is its PID.
#[derive(Debug)]
pub struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    pub fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    pub fn pgid(&self) -> Option<u32> {
        self.pgid
    }

    /// Kill the group now. Later calls and the drop are no-ops.
    pub fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            if let Err(err) = kill_process_group(pgid) {
                tracing::debug!(pgid, error = %err, "failed to kill process group");
            }
        }
    }

    /// Stop tracking the group; it will not be killed on drop.
    pub fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}
