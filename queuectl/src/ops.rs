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

//! Control operations: the stateless façade the CLI collaborator calls.
//!
//! Each operation maps onto one repository/registry call (or composes a
//! couple); rendering and argv handling stay with the CLI. Worker process
//! orchestration (`worker start` / `worker stop`) lives with the CLI as
//! well, since it spawns and signals OS processes rather than touching
//! the store.

use chrono::Utc;
use serde::Serialize;

use crate::dal::Dal;
use crate::error::QueueError;
use crate::models::job::{Job, JobSpec, JobState};
use crate::models::worker::Worker;

/// Snapshot returned by [`status`].
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Per-state job counts, every state present, in display order.
    pub counts: Vec<(JobState, i64)>,
    pub total: i64,
    /// Workers that have not reached `stopped`.
    pub workers: Vec<Worker>,
}

/// Inserts one job from a validated submission spec.
pub async fn enqueue(dal: &Dal, spec: JobSpec) -> Result<Job, QueueError> {
    dal.jobs().insert(spec).await
}

/// Lists jobs, optionally filtered by state, ordered by enqueue time.
pub async fn list(dal: &Dal, state: Option<JobState>) -> Result<Vec<Job>, QueueError> {
    dal.jobs().list(state).await
}

/// Count-by-state plus the live worker roster.
pub async fn status(dal: &Dal) -> Result<StatusReport, QueueError> {
    let counts = dal.jobs().count_by_state().await?;
    let total = counts.iter().map(|(_, n)| n).sum();
    let workers = dal.workers().list_active().await?;
    Ok(StatusReport {
        counts,
        total,
        workers,
    })
}

/// Lists the dead letter queue, most recent failure first.
pub async fn dlq_list(dal: &Dal) -> Result<Vec<Job>, QueueError> {
    dal.jobs().list_dead().await
}

/// Requeues a dead job for execution from scratch.
pub async fn dlq_retry(dal: &Dal, job_id: &str) -> Result<Job, QueueError> {
    dal.jobs().requeue_from_dlq(job_id, Utc::now()).await
}

/// All config keys merged with defaults, in display order.
pub async fn config_get(dal: &Dal) -> Result<Vec<(&'static str, String)>, QueueError> {
    Ok(dal.config().get().await?.entries())
}

/// Validates and persists one config value.
pub async fn config_set(dal: &Dal, key: &str, value: &str) -> Result<(), QueueError> {
    dal.config().set(key, value).await
}
