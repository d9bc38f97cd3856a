//! Worker process management
//!
//! Spawning, output forwarding, signal delivery, and the live-process handle
//! table. The table is private to the supervisor; nothing else reads it.

use std::collections::HashMap;
use std::process::Stdio;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::config::SupervisorConfig;
use super::messages::SupervisorEvent;

/// Live worker pids keyed by worker id.
///
/// Rebuilt from the storage view on restart; entries recovered that way have
/// no Child handle, so their exit is detected by the heartbeat monitor
/// rather than an OS exit event.
#[derive(Debug, Default)]
pub struct ProcessTable {
    pids: HashMap<String, u32>,
}

impl ProcessTable {
    pub fn insert(&mut self, worker_id: impl Into<String>, pid: u32) {
        self.pids.insert(worker_id.into(), pid);
    }

    pub fn remove(&mut self, worker_id: &str) -> Option<u32> {
        self.pids.remove(worker_id)
    }

    pub fn pid_of(&self, worker_id: &str) -> Option<u32> {
        self.pids.get(worker_id).copied()
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn worker_ids(&self) -> Vec<String> {
        self.pids.keys().cloned().collect()
    }
}

/// Spawn a worker process with the standard command line and environment:
/// `<worker-binary> --agent-id <id> --task-id <task> --task-list-id <list>
/// [--resume-execution-id <exec>]`
pub fn spawn_worker_process(
    config: &SupervisorConfig,
    worker_id: &str,
    task_id: &str,
    list_id: &str,
    resume_of: Option<&str>,
) -> Result<Child> {
    let mut command = Command::new(&config.worker_binary);
    command
        .args(&config.worker_args)
        .arg("--agent-id")
        .arg(worker_id)
        .arg("--task-id")
        .arg(task_id)
        .arg("--task-list-id")
        .arg(list_id)
        .env("AGENT_ID", worker_id)
        .env("TASK_ID", task_id)
        .env("TASK_LIST_ID", list_id)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    if let Some(resume) = resume_of {
        command.arg("--resume-execution-id").arg(resume);
    }

    command
        .spawn()
        .with_context(|| format!("Failed to spawn worker {} for task {}", worker_id, task_id))
}

/// Forward the child's stdout/stderr to the log and watch for exit.
///
/// Consumes the Child; the exit notification lands back in the supervisor
/// loop as a `WorkerExit` event.
pub fn watch_worker(mut child: Child, worker_id: String, tx: mpsc::Sender<SupervisorEvent>) {
    if let Some(stdout) = child.stdout.take() {
        let id = worker_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(worker_id = %id, "worker stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let id = worker_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(worker_id = %id, "worker stderr: {}", line);
            }
        });
    }

    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                let signal = exit_signal_name(&status);
                let _ = tx
                    .send(SupervisorEvent::WorkerExit {
                        worker_id,
                        exit_code: status.code(),
                        signal,
                    })
                    .await;
            }
            Err(e) => {
                warn!(worker_id = %worker_id, error = %e, "Failed to wait on worker");
                let _ = tx
                    .send(SupervisorEvent::WorkerExit {
                        worker_id,
                        exit_code: None,
                        signal: None,
                    })
                    .await;
            }
        }
    });
}

#[cfg(unix)]
fn exit_signal_name(status: &std::process::ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|s| {
        nix::sys::signal::Signal::try_from(s)
            .map(|sig| sig.as_str().to_string())
            .unwrap_or_else(|_| format!("signal_{}", s))
    })
}

#[cfg(not(unix))]
fn exit_signal_name(_status: &std::process::ExitStatus) -> Option<String> {
    None
}

/// Best-effort SIGTERM; there is no SIGKILL escalation in the core
#[cfg(unix)]
pub fn send_sigterm(pid: u32) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).context("Failed to send SIGTERM")?;
    Ok(())
}

#[cfg(not(unix))]
pub fn send_sigterm(_pid: u32) -> Result<()> {
    Ok(())
}

/// Signal-0 probe: does the process still exist?
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh_config(script: &str) -> SupervisorConfig {
        SupervisorConfig {
            worker_binary: PathBuf::from("/bin/sh"),
            worker_args: vec!["-c".to_string(), script.to_string(), "worker".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_process_table() {
        let mut table = ProcessTable::default();
        assert!(table.is_empty());

        table.insert("w-1", 100);
        table.insert("w-2", 200);
        assert_eq!(table.len(), 2);
        assert_eq!(table.pid_of("w-1"), Some(100));

        assert_eq!(table.remove("w-1"), Some(100));
        assert_eq!(table.remove("w-1"), None);
        assert!(table.pid_of("w-1").is_none());
    }

    #[tokio::test]
    async fn test_spawn_and_exit_event() {
        let config = sh_config("exit 0");
        let child = spawn_worker_process(&config, "w-1", "t-1", "list-1", None).unwrap();
        assert!(child.id().is_some());

        let (tx, mut rx) = mpsc::channel(8);
        watch_worker(child, "w-1".to_string(), tx);

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            SupervisorEvent::WorkerExit {
                worker_id, exit_code, ..
            } => {
                assert_eq!(worker_id, "w-1");
                assert_eq!(exit_code, Some(0));
            }
            other => panic!("Expected WorkerExit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_code_propagates() {
        let config = sh_config("exit 3");
        let child = spawn_worker_process(&config, "w-1", "t-1", "list-1", None).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        watch_worker(child, "w-1".to_string(), tx);

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            SupervisorEvent::WorkerExit {
                exit_code: Some(3),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_worker_sees_environment() {
        // The worker echoes its environment; the exit code proves the vars
        // were present
        let config = sh_config(r#"[ "$AGENT_ID" = w-9 ] && [ "$TASK_ID" = t-9 ] && [ "$TASK_LIST_ID" = l-9 ]"#);
        let child = spawn_worker_process(&config, "w-9", "t-9", "l-9", None).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        watch_worker(child, "w-9".to_string(), tx);

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            SupervisorEvent::WorkerExit {
                exit_code: Some(0),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let config = SupervisorConfig {
            worker_binary: PathBuf::from("/nonexistent/worker/binary"),
            ..Default::default()
        };
        assert!(spawn_worker_process(&config, "w-1", "t-1", "list-1", None).is_err());
    }

    #[test]
    fn test_process_alive_for_self() {
        assert!(process_alive(std::process::id()));
        // A pid far beyond the usual range should be gone
        assert!(!process_alive(999_999_999));
    }
}
