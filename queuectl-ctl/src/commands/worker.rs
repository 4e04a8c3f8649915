/*
 *  Copyright 2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Worker process orchestration.
//!
//! `start` spawns detached re-exec'd `worker run` children and returns
//! once each has registered. `stop` is the cooperative shutdown: flag the
//! registry rows `stopping`, send SIGTERM to each PID, and wait a bounded
//! 30 seconds before declaring stragglers lost. `run` is the hidden
//! foreground loop the spawned processes execute.

use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use queuectl::{Dal, WorkerRuntime, WorkerStatus};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::WorkerCommands;

/// How long `start` waits for all spawned workers to register.
const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(15);

/// How long `stop` waits for workers to reach `stopped`.
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_STEP: Duration = Duration::from_millis(250);

pub async fn dispatch(dal: Dal, cmd: WorkerCommands) -> Result<()> {
    match cmd {
        WorkerCommands::Start { count } => start(&dal, count).await,
        WorkerCommands::Stop => stop(&dal).await,
        WorkerCommands::Run { id } => run(dal, id).await,
    }
}

/// Spawns `count` detached worker processes and waits for registration.
async fn start(dal: &Dal, count: usize) -> Result<()> {
    let exe = std::env::current_exe().context("Failed to resolve the queuectl binary path")?;

    let mut spawned = Vec::with_capacity(count);
    for _ in 0..count {
        let worker_id = WorkerRuntime::generate_worker_id();
        let child = std::process::Command::new(&exe)
            .arg("worker")
            .arg("run")
            .arg("--id")
            .arg(&worker_id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn worker {}", worker_id))?;
        spawned.push((worker_id, child.id()));
    }

    // Return only once every spawned worker shows up in the registry.
    let deadline = Instant::now() + REGISTRATION_TIMEOUT;
    let mut pending: Vec<&(String, u32)> = spawned.iter().collect();
    while !pending.is_empty() {
        if Instant::now() > deadline {
            anyhow::bail!(
                "workers failed to register within {:?}: {}",
                REGISTRATION_TIMEOUT,
                pending
                    .iter()
                    .map(|(id, _)| id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        let mut still_pending = Vec::new();
        for entry in pending {
            if dal.workers().get(&entry.0).await?.is_none() {
                still_pending.push(entry);
            }
        }
        pending = still_pending;
        if !pending.is_empty() {
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    println!("Started {} worker(s)", count);
    for (worker_id, pid) in &spawned {
        println!("  {} (PID: {})", worker_id, pid);
    }
    Ok(())
}

/// Gracefully stops all live workers.
async fn stop(dal: &Dal) -> Result<()> {
    let workers = dal.workers().request_stop_all().await?;
    if workers.is_empty() {
        println!("No workers running");
        return Ok(());
    }

    let mut remaining = Vec::new();
    for worker in workers {
        if send_sigterm(worker.os_pid, &worker.id) {
            remaining.push(worker);
        } else {
            // Already gone (crashed or killed earlier); settle its row now.
            dal.workers()
                .set_status(&worker.id, WorkerStatus::Stopped, Utc::now())
                .await?;
        }
    }

    let deadline = Instant::now() + STOP_TIMEOUT;
    loop {
        let mut alive = Vec::new();
        for worker in remaining {
            match dal.workers().get(&worker.id).await? {
                Some(w) if w.status != WorkerStatus::Stopped => alive.push(w),
                _ => {}
            }
        }
        remaining = alive;

        if remaining.is_empty() {
            break;
        }
        if Instant::now() > deadline {
            // The workers themselves keep draining their current job; we
            // just stop waiting and record them as released.
            for worker in &remaining {
                warn!(worker_id = %worker.id, pid = worker.os_pid, "worker lost: did not stop in time");
                eprintln!(
                    "{} worker {} (pid {}) did not stop within {:?}, marking lost",
                    "warning:".yellow().bold(),
                    worker.id,
                    worker.os_pid,
                    STOP_TIMEOUT
                );
                dal.workers()
                    .set_status(&worker.id, WorkerStatus::Stopped, Utc::now())
                    .await?;
            }
            break;
        }
        tokio::time::sleep(POLL_STEP).await;
    }

    println!("Stopped workers");
    Ok(())
}

/// The hidden foreground loop a spawned worker process runs.
async fn run(dal: Dal, id: Option<String>) -> Result<()> {
    let worker_id = id.unwrap_or_else(WorkerRuntime::generate_worker_id);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    WorkerRuntime::new(dal, worker_id).run(shutdown_rx).await?;
    Ok(())
}

/// SIGINT and SIGTERM are both treated as the graceful shutdown signal.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Sends SIGTERM; `false` means the process no longer exists.
#[cfg(unix)]
fn send_sigterm(pid: i32, worker_id: &str) -> bool {
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        info!(worker_id, pid, "SIGTERM not delivered, process already gone");
        return false;
    }
    true
}

#[cfg(not(unix))]
fn send_sigterm(_pid: i32, worker_id: &str) -> bool {
    // No SIGTERM here; the registry `stopping` flag alone drives shutdown.
    info!(worker_id, "relying on registry stop flag");
    true
}
