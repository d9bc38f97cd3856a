//! Daemon process management
//!
//! Pid-file handling and process control for the orchestrator binary.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use eyre::{Context, Result};
use tracing::{debug, info, warn};

/// Crate version recorded next to the pid file
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default pid file location
fn default_pid_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("taskforge")
        .join("taskforge.pid")
}

/// Daemon process manager
#[derive(Debug)]
pub struct DaemonManager {
    pid_file: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonManager {
    pub fn new() -> Self {
        Self {
            pid_file: default_pid_path(),
        }
    }

    pub fn with_pid_file(pid_file: PathBuf) -> Self {
        Self { pid_file }
    }

    pub fn is_running(&self) -> bool {
        self.read_pid().is_some_and(is_process_running)
    }

    pub fn running_pid(&self) -> Option<u32> {
        self.read_pid().filter(|&pid| is_process_running(pid))
    }

    fn read_pid(&self) -> Option<u32> {
        if !self.pid_file.exists() {
            return None;
        }
        let mut file = fs::File::open(&self.pid_file).ok()?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).ok()?;
        contents.trim().parse().ok()
    }

    fn write_pid(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.pid_file.parent() {
            fs::create_dir_all(parent).context("Failed to create pid file directory")?;
        }
        let mut file = fs::File::create(&self.pid_file).context("Failed to create pid file")?;
        write!(file, "{}", pid).context("Failed to write pid")?;
        debug!(pid, path = ?self.pid_file, "Wrote pid file");
        Ok(())
    }

    fn remove_pid_file(&self) -> Result<()> {
        if self.pid_file.exists() {
            fs::remove_file(&self.pid_file).context("Failed to remove pid file")?;
        }
        Ok(())
    }

    /// Fork the daemon process and return immediately
    pub fn start(&self) -> Result<u32> {
        if let Some(pid) = self.running_pid() {
            return Err(eyre::eyre!("Daemon already running with pid {}", pid));
        }

        let exe = std::env::current_exe().context("Failed to get current executable")?;
        let child = Command::new(&exe)
            .arg("run-daemon")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn daemon process")?;

        let pid = child.id();
        self.write_pid(pid)?;
        info!(pid, "Daemon started");
        Ok(pid)
    }

    /// SIGTERM the daemon, escalating to SIGKILL after a grace period
    pub fn stop(&self) -> Result<()> {
        let pid = self
            .running_pid()
            .ok_or_else(|| eyre::eyre!("Daemon is not running"))?;

        info!(pid, "Stopping daemon...");
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            kill(Pid::from_raw(pid as i32), Signal::SIGTERM).context("Failed to send SIGTERM")?;
        }

        let mut attempts = 0;
        while is_process_running(pid) && attempts < 50 {
            std::thread::sleep(std::time::Duration::from_millis(100));
            attempts += 1;
        }

        if is_process_running(pid) {
            warn!(pid, "Daemon did not stop gracefully, sending SIGKILL");
            #[cfg(unix)]
            {
                use nix::sys::signal::{Signal, kill};
                use nix::unistd::Pid;
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
        }

        self.remove_pid_file()?;
        info!(pid, "Daemon stopped");
        Ok(())
    }

    /// Register the current process as the daemon
    pub fn register_self(&self) -> Result<()> {
        let pid = std::process::id();
        self.write_pid(pid)?;
        info!(pid, version = VERSION, "Daemon registered");
        Ok(())
    }

    pub fn pid_file(&self) -> &PathBuf {
        &self.pid_file
    }

    pub fn status(&self) -> DaemonStatus {
        let pid = self.running_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            pid_file: self.pid_file.clone(),
        }
    }
}

/// Check if a process with the given pid is running
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        // Signal 0 checks existence without affecting the process
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Daemon status information
#[derive(Debug)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub pid_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_not_running_without_pid_file() {
        let temp = TempDir::new().unwrap();
        let manager = DaemonManager::with_pid_file(temp.path().join("none.pid"));
        assert!(!manager.is_running());
        assert!(manager.running_pid().is_none());
    }

    #[test]
    fn test_write_and_read_pid() {
        let temp = TempDir::new().unwrap();
        let manager = DaemonManager::with_pid_file(temp.path().join("test.pid"));

        manager.write_pid(12345).unwrap();
        assert_eq!(manager.read_pid(), Some(12345));

        manager.remove_pid_file().unwrap();
        assert_eq!(manager.read_pid(), None);
    }

    #[test]
    fn test_register_self_is_running() {
        let temp = TempDir::new().unwrap();
        let manager = DaemonManager::with_pid_file(temp.path().join("self.pid"));

        manager.register_self().unwrap();
        // Our own process is definitely alive
        assert!(manager.is_running());
        assert_eq!(manager.running_pid(), Some(std::process::id()));
    }

    #[test]
    fn test_status() {
        let temp = TempDir::new().unwrap();
        let pid_file = temp.path().join("status.pid");
        let manager = DaemonManager::with_pid_file(pid_file.clone());

        let status = manager.status();
        assert!(!status.running);
        assert_eq!(status.pid_file, pid_file);
    }

    #[test]
    fn test_stop_without_daemon_errors() {
        let temp = TempDir::new().unwrap();
        let manager = DaemonManager::with_pid_file(temp.path().join("stop.pid"));
        assert!(manager.stop().is_err());
    }
}
