// Keyhost Engine — Single-Instance Guard
//
// `<data_dir>/keyhost.pid` holds the PID of the running host. A second host
// pointed at the same data dir backs off; a PID file left behind by a dead
// process is reclaimed. KEYHOST_ISOLATED=1 skips the guard so test hosts can
// run side by side.

use crate::atoms::constants::{ISOLATED_ENV_VAR, PID_FILE_NAME};
use crate::atoms::error::{EngineError, EngineResult};
use log::{info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum InstanceStatus {
    /// We own the data dir until the guard is dropped.
    Held(InstanceGuard),
    /// Another live process does.
    NotHeld { pid: u32 },
}

#[derive(Debug)]
pub struct InstanceGuard {
    /// `None` when the guard was skipped.
    path: Option<PathBuf>,
    pid: u32,
}

impl InstanceGuard {
    pub fn acquire(data_dir: &Path) -> EngineResult<InstanceStatus> {
        let isolated = std::env::var(ISOLATED_ENV_VAR).map(|v| v == "1").unwrap_or(false);
        Self::acquire_with(data_dir, isolated)
    }

    pub(crate) fn acquire_with(data_dir: &Path, isolated: bool) -> EngineResult<InstanceStatus> {
        let pid = std::process::id();
        if isolated {
            info!("[host] {}=1, skipping single-instance guard", ISOLATED_ENV_VAR);
            return Ok(InstanceStatus::Held(InstanceGuard { path: None, pid }));
        }

        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(PID_FILE_NAME);

        // Two rounds: the second one runs after clearing a stale file.
        for _ in 0..2 {
            match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    write!(file, "{}", pid)?;
                    file.sync_all()?;
                    info!("[host] Acquired instance lock {} (pid {})", path.display(), pid);
                    return Ok(InstanceStatus::Held(InstanceGuard { path: Some(path), pid }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let recorded = std::fs::read_to_string(&path)
                        .ok()
                        .and_then(|s| s.trim().parse::<u32>().ok());
                    match recorded {
                        Some(other) if process_alive(other) => {
                            warn!("[host] Another host is running (pid {})", other);
                            return Ok(InstanceStatus::NotHeld { pid: other });
                        }
                        stale => {
                            warn!("[host] Reclaiming stale pid file ({:?})", stale);
                            match std::fs::remove_file(&path) {
                                Ok(()) => {}
                                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                                Err(e) => return Err(e.into()),
                            }
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::Internal(format!("could not acquire {}", path.display())))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_isolated(&self) -> bool {
        self.path.is_none()
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        let Some(path) = &self.path else { return };
        // Only remove the file if it is still ours.
        let ours = std::fs::read_to_string(path)
            .map(|s| s.trim() == self.pid.to_string())
            .unwrap_or(false);
        if ours {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("[host] Failed to remove pid file {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // No signal: existence and permission checks only. EPERM means someone
    // else's live process.
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    // No cheap liveness probe: treat the recorded owner as alive.
    true
}
