//! `tf` - the taskforge orchestrator binary

use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::Result;
use tracing_subscriber::EnvFilter;

use taskforge::cli::{Cli, Command};
use taskforge::config::Config;
use taskforge::daemon::DaemonManager;
use taskforge::events::create_event_bus;
use taskforge::failure::LoggingInspector;
use taskforge::gatekeeper::Gatekeeper;
use taskforge::planner;
use taskforge::state::StateManager;
use taskforge::supervisor::Supervisor;

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "taskforge=info,workstore=info",
        1 => "taskforge=debug,workstore=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load(cli.config.as_ref())?;

    match cli.command {
        Command::Start => {
            let manager = DaemonManager::new();
            let pid = manager.start()?;
            println!("{} daemon started (pid {})", "ok:".green().bold(), pid);
        }

        Command::Stop => {
            let manager = DaemonManager::new();
            manager.stop()?;
            println!("{} daemon stopped", "ok:".green().bold());
        }

        Command::Status => {
            let manager = DaemonManager::new();
            let status = manager.status();
            if status.running {
                println!(
                    "{} running (pid {})",
                    "daemon:".bold(),
                    status.pid.unwrap_or_default()
                );
            } else {
                println!("{} {}", "daemon:".bold(), "not running".yellow());
            }
            println!("{} {}", "store:".bold(), config.storage.data_dir.display());
        }

        Command::RunDaemon => {
            run_daemon(config).await?;
        }

        Command::Plan { list_id } => {
            let state = StateManager::spawn(&config.storage.data_dir)?;
            let plan = planner::plan_list(&state, &list_id).await?;
            println!(
                "{} {} waves, max parallelism {}",
                "plan:".bold(),
                plan.waves.len(),
                plan.max_parallelism
            );
            for wave in &plan.waves {
                let cap_note = if wave.cap_limited { " (cap-limited)" } else { "" };
                println!("  wave {}: {}{}", wave.index, wave.task_ids.join(", "), cap_note);
            }
            state.shutdown().await?;
        }

        Command::Readiness { task_id } => {
            let state = StateManager::spawn(&config.storage.data_dir)?;
            let gatekeeper = Gatekeeper::new(state.clone());
            let report = gatekeeper.calculate_readiness(&task_id).await?;
            let verdict = if report.is_ready {
                "ready".green().bold()
            } else {
                "not ready".red().bold()
            };
            println!("{} {} ({}/100)", "readiness:".bold(), verdict, report.score);
            for item in &report.missing {
                println!("  - {}", item);
            }
            state.shutdown().await?;
        }

        Command::Conflicts { task_a, task_b } => {
            let state = StateManager::spawn(&config.storage.data_dir)?;
            let gatekeeper = Gatekeeper::new(state.clone());
            let details = gatekeeper.conflict_details(&task_a, &task_b).await?;
            if details.is_empty() {
                println!("{} no shared targets", "conflicts:".bold());
            }
            for conflict in &details {
                let severity = if conflict.class.is_blocking() {
                    "blocking".red().bold()
                } else {
                    "warning".yellow()
                };
                println!(
                    "  {} {} ({} vs {}) on {}",
                    severity, conflict.kind, conflict.a_op, conflict.b_op, conflict.target
                );
            }
            let parallel = gatekeeper.can_run_parallel(&task_a, &task_b).await?;
            println!("{} {}", "can run in parallel:".bold(), parallel);
            state.shutdown().await?;
        }

        Command::Exec { list_id, cap } => {
            let state = StateManager::spawn(&config.storage.data_dir)?;
            let events = create_event_bus();
            let supervisor = Supervisor::new(
                config.supervisor.clone(),
                state.clone(),
                Arc::new(LoggingInspector),
                events,
            );
            let handle = supervisor.handle();
            let supervisor_task = tokio::spawn(supervisor.run());

            let plan = handle.start_execution(&list_id, cap).await?;
            println!(
                "{} started {} with {} waves",
                "ok:".green().bold(),
                list_id,
                plan.waves.len()
            );

            // Foreground execution: wait for ctrl-c or list completion
            tokio::signal::ctrl_c().await?;
            handle.shutdown().await?;
            let _ = supervisor_task.await;
            state.shutdown().await?;
        }

        Command::Pause { list_id } => {
            with_supervisor(&config, |handle| async move { handle.pause_execution(&list_id).await }).await?;
            println!("{} paused", "ok:".green().bold());
        }

        Command::Resume { list_id } => {
            with_supervisor(&config, |handle| async move { handle.resume_execution(&list_id).await }).await?;
            println!("{} resumed", "ok:".green().bold());
        }

        Command::Coverage { prd_id } => {
            let state = StateManager::spawn(&config.storage.data_dir)?;
            let coverage = state.prd_coverage(&prd_id).await?;
            println!(
                "{} {}/{} requirements covered ({}%)",
                "coverage:".bold(),
                coverage.covered_requirements,
                coverage.total_requirements,
                coverage.coverage_percent
            );
            for missing in &coverage.uncovered {
                println!("  - uncovered: {}", missing);
            }
            state.shutdown().await?;
        }
    }

    Ok(())
}

/// Run a single supervisor operation against the store and shut down
async fn with_supervisor<F, Fut, T>(config: &Config, op: F) -> Result<T>
where
    F: FnOnce(taskforge::supervisor::SupervisorHandle) -> Fut,
    Fut: std::future::Future<Output = taskforge::error::CoreResult<T>>,
{
    let state = StateManager::spawn(&config.storage.data_dir)?;
    let supervisor = Supervisor::new(
        config.supervisor.clone(),
        state.clone(),
        Arc::new(LoggingInspector),
        create_event_bus(),
    );
    let handle = supervisor.handle();
    let supervisor_task = tokio::spawn(supervisor.run());

    let result = op(handle.clone()).await?;

    handle.shutdown().await.ok();
    let _ = supervisor_task.await;
    state.shutdown().await?;
    Ok(result)
}

/// The daemon loop: supervisor + signal handling
async fn run_daemon(config: Config) -> Result<()> {
    let daemon = DaemonManager::new();
    daemon.register_self()?;

    let state = StateManager::spawn(&config.storage.data_dir)?;
    let events = create_event_bus();

    // Log subscriber for core activity
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => tracing::info!(event_type = event.event_type(), "event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });

    let supervisor = Supervisor::new(
        config.supervisor.clone(),
        state.clone(),
        Arc::new(LoggingInspector),
        events,
    );
    let handle = supervisor.handle();
    let supervisor_task = tokio::spawn(supervisor.run());

    tracing::info!("Daemon running; waiting for shutdown signal");
    shutdown_signal().await?;

    handle.shutdown().await.ok();
    let _ = supervisor_task.await;
    state.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
