//! Lifecycle of the key notifier helper process.
//!
//! The helper taps global keyboard events outside this process and reports
//! them to the key listener. Exactly one copy may run: `start` force-kills
//! any instance found already running before launching a fresh one, and
//! `stop` interrupts the copy it launched.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use crate::config::default_helper_dir;
use crate::error::PlatformError;

/// A running process as seen by `ProcessControl::processes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub command: String,
}

/// OS process operations the helper lifecycle needs.
pub trait ProcessControl {
    /// Running processes with their full command lines.
    fn processes(&mut self) -> Vec<ProcessInfo>;

    /// Launches `program` with no arguments and returns its pid.
    fn spawn(&mut self, program: &Path) -> io::Result<u32>;

    fn signal(&mut self, pid: u32, signal: Signal) -> Result<(), Errno>;
}

// ---------------------------------------------------------------------------
// System implementation
// ---------------------------------------------------------------------------

/// How long `signal` waits for one of our own children to exit.
const EXIT_GRACE: Duration = Duration::from_millis(500);
const EXIT_POLL: Duration = Duration::from_millis(10);

/// `ProcessControl` backed by the real process table.
pub struct SystemProcesses {
    system: System,
    children: Vec<Child>,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            children: Vec::new(),
        }
    }

    /// Collects exit statuses of children that have terminated.
    fn reap(&mut self) {
        self.children
            .retain_mut(|child| !matches!(child.try_wait(), Ok(Some(_))));
    }

    /// Gives a signalled child of ours up to `EXIT_GRACE` to exit and reaps it.
    fn await_exit(&mut self, pid: u32) {
        let Some(index) = self.children.iter().position(|c| c.id() == pid) else {
            return;
        };
        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            match self.children[index].try_wait() {
                Ok(Some(status)) => {
                    log::debug!("helper: pid {pid} exited with {status}");
                    self.children.swap_remove(index);
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
                Ok(None) => {
                    log::debug!("helper: pid {pid} still running after {EXIT_GRACE:?}");
                    return;
                }
                Err(e) => {
                    log::warn!("helper: could not wait for pid {pid}: {e}");
                    return;
                }
            }
        }
    }
}

impl Drop for SystemProcesses {
    fn drop(&mut self) {
        self.reap();
        // Whatever is left is waited for off-thread so it never lingers as
        // a zombie.
        for mut child in self.children.drain(..) {
            let pid = child.id();
            let spawned = thread::Builder::new()
                .name("helper-reaper".into())
                .spawn(move || match child.wait() {
                    Ok(status) => log::debug!("helper: pid {pid} exited with {status}"),
                    Err(e) => log::warn!("helper: could not wait for pid {pid}: {e}"),
                });
            if let Err(e) = spawned {
                log::warn!("helper: could not start reaper for pid {pid}: {e}");
            }
        }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SystemProcesses {
    fn processes(&mut self) -> Vec<ProcessInfo> {
        self.reap();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );
        self.system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let command = if process.cmd().is_empty() {
                    process.name().to_string_lossy().into_owned()
                } else {
                    process
                        .cmd()
                        .iter()
                        .map(|arg| arg.to_string_lossy())
                        .collect::<Vec<_>>()
                        .join(" ")
                };
                ProcessInfo {
                    pid: pid.as_u32(),
                    command,
                }
            })
            .collect()
    }

    fn spawn(&mut self, program: &Path) -> io::Result<u32> {
        let child = Command::new(program).spawn()?;
        let pid = child.id();
        self.children.push(child);
        Ok(pid)
    }

    fn signal(&mut self, pid: u32, signal: Signal) -> Result<(), Errno> {
        let raw = i32::try_from(pid).map_err(|_| Errno::ESRCH)?;
        kill(Pid::from_raw(raw), signal)?;
        self.await_exit(pid);
        self.reap();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Starts and stops the key notifier helper.
pub struct HelperController {
    name: String,
    fallback_dir: Option<PathBuf>,
    processes: Box<dyn ProcessControl>,
    pid: Option<u32>,
}

impl HelperController {
    pub fn new(
        name: impl Into<String>,
        fallback_dir: Option<PathBuf>,
        processes: Box<dyn ProcessControl>,
    ) -> Self {
        Self {
            name: name.into(),
            fallback_dir,
            processes,
            pid: None,
        }
    }

    /// Pid of the helper this controller launched, while it is considered live.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Kills any running helper (including one this controller started) and
    /// launches a fresh one.
    pub fn start(&mut self) -> Result<(), PlatformError> {
        self.kill_existing();
        self.pid = None;

        let primary = PathBuf::from(&self.name);
        let pid = match self.launch(&primary) {
            Err(PlatformError::HelperLaunch { source, .. })
                if source.kind() == io::ErrorKind::NotFound =>
            {
                log::info!("helper: '{}' not found on the search path", self.name);
                let dir = match &self.fallback_dir {
                    Some(dir) => dir.clone(),
                    None => default_helper_dir()?,
                };
                let fallback = dir.join(&self.name);
                self.launch(&fallback)?
            }
            other => other?,
        };

        log::info!("helper: started with pid {pid}");
        self.pid = Some(pid);
        Ok(())
    }

    /// Interrupts the launched helper. A helper that already exited is only
    /// logged; the recorded pid is cleared either way.
    pub fn stop(&mut self) -> Result<(), PlatformError> {
        let Some(pid) = self.pid.take() else {
            return Ok(());
        };
        log::info!("helper: stopping pid {pid}");
        match self.processes.signal(pid, Signal::SIGINT) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => {
                log::warn!("helper: process {pid} no longer exists");
                Ok(())
            }
            Err(source) => Err(PlatformError::HelperSignal { pid, source }),
        }
    }

    fn launch(&mut self, program: &Path) -> Result<u32, PlatformError> {
        log::info!("helper: trying to launch '{}'", program.display());
        self.processes
            .spawn(program)
            .map_err(|source| PlatformError::HelperLaunch {
                path: program.to_path_buf(),
                source,
            })
    }

    fn kill_existing(&mut self) {
        let own_pid = std::process::id();
        let stale: Vec<u32> = self
            .processes
            .processes()
            .into_iter()
            .filter(|info| info.pid != own_pid && info.command.contains(&self.name))
            .map(|info| info.pid)
            .collect();

        for pid in stale {
            log::info!("helper: killing existing instance {pid}");
            match self.processes.signal(pid, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => log::warn!("helper: could not kill {pid}: {e}"),
            }
        }
    }
}

impl Drop for HelperController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("helper: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
