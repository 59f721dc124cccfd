//! OS process helpers: liveness, process-group signals, PID files

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Signals the supervisor sends to a process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    Terminate,
    Kill,
}

/// How a process group went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Already gone before any signal was sent
    AlreadyExited,
    /// Exited within the grace period after SIGTERM
    Graceful,
    /// Needed SIGKILL
    Killed,
}

/// Check if a process is still alive
///
/// Uses kill(pid, 0) on Unix to check if the process exists
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    // SAFETY: kill with signal 0 only checks if process exists, doesn't send a signal
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

/// Send `signal` to every process in the group led by `pgid`.
///
/// A group that no longer exists is not an error.
#[cfg(unix)]
pub fn signal_group(pgid: u32, signal: GroupSignal) -> io::Result<()> {
    let signo = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };
    // SAFETY: killpg has no memory-safety preconditions
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, signo) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
pub fn signal_group(_pgid: u32, _signal: GroupSignal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process groups are only supported on Unix",
    ))
}

/// SIGTERM the group, wait up to `grace` for `alive` to turn false, then
/// SIGKILL.
///
/// `alive` lets a parent reap its own child instead of seeing a zombie.
pub async fn terminate_group(
    pgid: u32,
    grace: Duration,
    mut alive: impl FnMut() -> bool,
) -> io::Result<Termination> {
    if !alive() {
        return Ok(Termination::AlreadyExited);
    }

    debug!("Sending SIGTERM to process group {}", pgid);
    signal_group(pgid, GroupSignal::Terminate)?;

    let start = Instant::now();
    while start.elapsed() < grace {
        if !alive() {
            return Ok(Termination::Graceful);
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }

    warn!(
        "Process group {} still alive after {:?}, sending SIGKILL",
        pgid, grace
    );
    signal_group(pgid, GroupSignal::Kill)?;

    // SIGKILL cannot be ignored; give the kernel a moment to tear it down
    for _ in 0..20 {
        if !alive() {
            break;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
    Ok(Termination::Killed)
}

/// Write `pid` to `path`, creating parent directories
pub fn write_pid_file(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{pid}\n"))
}

/// Read a PID file; `None` when missing or unparsable
pub fn read_pid_file(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Remove a PID file if it exists
pub fn remove_pid_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
