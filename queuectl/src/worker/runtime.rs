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

//! Worker runtime: registration, heartbeating, the claim/execute/finalize
//! loop, and cooperative shutdown.
//!
//! One `WorkerRuntime` runs per worker OS process and owns at most one
//! child command at a time. All coordination with other workers flows
//! through the store; there is no shared in-process state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dal::{Dal, QueueConfig};
use crate::error::QueueError;
use crate::models::job::Job;
use crate::models::worker::WorkerStatus;
use crate::retry;
use crate::worker::executor::CommandExecutor;

/// Heartbeats faster than this even when `poll_interval` is long, so a
/// worker stuck on a slow job still looks alive to stuck-job recovery.
const MAX_HEARTBEAT_SECS: f64 = 5.0;

/// The process-local worker loop.
pub struct WorkerRuntime {
    dal: Dal,
    worker_id: String,
}

impl WorkerRuntime {
    pub fn new(dal: Dal, worker_id: impl Into<String>) -> Self {
        Self {
            dal,
            worker_id: worker_id.into(),
        }
    }

    /// Generates a worker id in the registry's `worker-<hex8>` form.
    pub fn generate_worker_id() -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("worker-{}", &hex[..8])
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Runs the worker until `shutdown` flips to `true` (OS signal) or
    /// the registry flags the worker `stopping`.
    ///
    /// A job in flight when shutdown arrives is always finalized before
    /// the worker exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        let now = Utc::now();
        let host = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
        self.dal
            .workers()
            .register(&self.worker_id, std::process::id() as i32, &host, now)
            .await?;
        info!(worker_id = %self.worker_id, pid = std::process::id(), "worker registered");

        // Merge the two shutdown sources (OS signal, registry flag) into
        // one flag the loop and sleeps can watch.
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);

        let forward_tx = stop_tx.clone();
        let signal_forwarder = tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    let _ = forward_tx.send(true);
                    return;
                }
                if shutdown.changed().await.is_err() {
                    return;
                }
            }
        });

        let initial_cfg = self.dal.config().get().await.unwrap_or_default();
        let heartbeat = self.spawn_heartbeat(&initial_cfg, stop_tx.clone());

        let mut announced_running = false;
        while !*stop_rx.borrow() {
            let cfg = match self.dal.config().get().await {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(error = %e, "failed to read config, using defaults this cycle");
                    QueueConfig::default()
                }
            };

            if !announced_running {
                self.dal
                    .workers()
                    .set_status(&self.worker_id, WorkerStatus::Running, Utc::now())
                    .await?;
                announced_running = true;
            }

            match self
                .dal
                .jobs()
                .claim_next(&self.worker_id, Utc::now(), cfg.poll_interval)
                .await
            {
                Ok(Some(job)) => self.process_job(job, &cfg).await,
                Ok(None) => {
                    debug!("no eligible jobs");
                    self.idle_sleep(cfg.poll_interval, &mut stop_rx).await;
                }
                Err(e) => {
                    // One bad cycle must not kill the worker.
                    error!(error = %e, "claim failed");
                    self.idle_sleep(cfg.poll_interval, &mut stop_rx).await;
                }
            }
        }

        info!(worker_id = %self.worker_id, "worker shutting down");
        heartbeat.abort();
        signal_forwarder.abort();

        let now = Utc::now();
        if let Err(e) = self
            .dal
            .workers()
            .set_status(&self.worker_id, WorkerStatus::Stopping, now)
            .await
        {
            warn!(error = %e, "failed to mark worker stopping");
        }
        self.dal
            .workers()
            .set_status(&self.worker_id, WorkerStatus::Stopped, Utc::now())
            .await?;
        info!(worker_id = %self.worker_id, "worker stopped");
        Ok(())
    }

    /// Background heartbeat at `min(poll_interval, 5s)` cadence. Also the
    /// point where a `stopping` flag set by `worker stop` is observed.
    fn spawn_heartbeat(
        &self,
        cfg: &QueueConfig,
        stop_tx: Arc<watch::Sender<bool>>,
    ) -> JoinHandle<()> {
        let dal = self.dal.clone();
        let worker_id = self.worker_id.clone();
        let cadence = Duration::from_secs_f64(
            cfg.poll_interval.clamp(0.1, MAX_HEARTBEAT_SECS),
        );

        tokio::spawn(async move {
            loop {
                match dal.workers().heartbeat(&worker_id, Utc::now()).await {
                    Ok(Some(WorkerStatus::Stopping)) => {
                        info!(worker_id = %worker_id, "stop requested via registry");
                        let _ = stop_tx.send(true);
                        return;
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        warn!(worker_id = %worker_id, "registry row disappeared, shutting down");
                        let _ = stop_tx.send(true);
                        return;
                    }
                    Err(e) => warn!(error = %e, "heartbeat failed"),
                }
                tokio::time::sleep(cadence).await;
            }
        })
    }

    /// Executes one claimed job and finalizes it.
    ///
    /// Execution failures are expected and recorded on the job; store
    /// failures during finalization are logged so the loop survives them
    /// (stuck-job recovery will eventually reclaim the row if the update
    /// never landed).
    async fn process_job(&self, job: Job, cfg: &QueueConfig) {
        info!(
            job_id = %job.id,
            attempt = job.attempts + 1,
            command = %job.command,
            "executing job"
        );

        let executor = CommandExecutor::new(Duration::from_secs(cfg.job_timeout));
        let outcome = executor.execute(&job.command).await;
        let now = Utc::now();

        let result = match &outcome.error {
            None => {
                info!(job_id = %job.id, "job completed");
                self.dal
                    .jobs()
                    .mark_completed(&job.id, &self.worker_id, &outcome.output, now)
                    .await
            }
            Some(exec_err) => {
                let attempts_after = job.attempts + 1;
                let decision =
                    retry::decide(attempts_after, job.max_retries, cfg.backoff_base, now);
                match decision {
                    retry::RetryDecision::Retry { run_at } => warn!(
                        job_id = %job.id,
                        error = %exec_err,
                        retry_at = %run_at,
                        "job failed, scheduling retry"
                    ),
                    retry::RetryDecision::Dead => warn!(
                        job_id = %job.id,
                        error = %exec_err,
                        attempts = attempts_after,
                        "job exhausted retries, moving to dead letter queue"
                    ),
                }
                self.dal
                    .jobs()
                    .mark_failed(
                        &job.id,
                        &self.worker_id,
                        &exec_err.to_string(),
                        &outcome.output,
                        now,
                        decision,
                    )
                    .await
            }
        };

        if let Err(e) = result {
            error!(job_id = %job.id, error = %e, "failed to finalize job");
        }
    }

    /// Sleeps one poll interval, waking early on shutdown.
    async fn idle_sleep(&self, poll_interval: f64, stop_rx: &mut watch::Receiver<bool>) {
        let nap = Duration::from_secs_f64(poll_interval.max(0.0));
        tokio::select! {
            _ = tokio::time::sleep(nap) => {}
            _ = stop_rx.changed() => {}
        }
    }
}
