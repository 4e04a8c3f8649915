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

//! Worker registry: tracks live worker processes.
//!
//! Rows are never deleted; stopped workers are retained for post-mortem
//! and hidden from `status` output by the caller.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::Dal;
use crate::database::schema::workers;
use crate::error::QueueError;
use crate::models::format_timestamp;
use crate::models::worker::{NewWorkerRow, Worker, WorkerRow, WorkerStatus};

/// Data access layer for worker registry operations.
pub struct WorkerDal<'a> {
    pub(crate) dal: &'a Dal,
}

impl<'a> WorkerDal<'a> {
    /// Registers a new worker in state `starting`.
    pub async fn register(
        &self,
        id: &str,
        os_pid: i32,
        host: &str,
        now: DateTime<Utc>,
    ) -> Result<Worker, QueueError> {
        let row = NewWorkerRow {
            id: id.to_string(),
            os_pid,
            status: WorkerStatus::Starting.as_str().to_string(),
            host: host.to_string(),
            started_at: format_timestamp(now),
            heartbeat_at: format_timestamp(now),
        };

        self.dal
            .transaction(move |conn| {
                diesel::insert_into(workers::table)
                    .values(&row)
                    .execute(conn)?;
                let fetched: WorkerRow = workers::table.find(&row.id).first(conn)?;
                Ok(Worker::try_from(fetched)?)
            })
            .await
    }

    /// Refreshes a worker's heartbeat and reports its registry status.
    ///
    /// Returns `None` when the row no longer exists. The status lets the
    /// runtime observe a `stopping` flag set by `worker stop` without a
    /// second query.
    pub async fn heartbeat(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkerStatus>, QueueError> {
        let id = id.to_string();
        let now_text = format_timestamp(now);

        self.dal
            .transaction(move |conn| {
                let updated = diesel::update(workers::table.find(&id))
                    .set(workers::heartbeat_at.eq(&now_text))
                    .execute(conn)?;
                if updated == 0 {
                    return Ok(None);
                }

                let status: String = workers::table
                    .find(&id)
                    .select(workers::status)
                    .first(conn)?;
                Ok(Some(status.parse()?))
            })
            .await
    }

    /// Sets a worker's status; `stopped` also records the stop time.
    pub async fn set_status(
        &self,
        id: &str,
        status: WorkerStatus,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let id = id.to_string();
        let now_text = format_timestamp(now);

        self.dal
            .transaction(move |conn| {
                if status == WorkerStatus::Stopped {
                    diesel::update(workers::table.find(&id))
                        .set((
                            workers::status.eq(status.as_str()),
                            workers::stopped_at.eq(Some(now_text.clone())),
                        ))
                        .execute(conn)?;
                } else {
                    diesel::update(workers::table.find(&id))
                        .set(workers::status.eq(status.as_str()))
                        .execute(conn)?;
                }
                Ok(())
            })
            .await
    }

    /// Fetches one worker by id.
    pub async fn get(&self, id: &str) -> Result<Option<Worker>, QueueError> {
        let id = id.to_string();
        self.dal
            .read(move |conn| {
                let row: Option<WorkerRow> =
                    workers::table.find(&id).first(conn).optional()?;
                row.map(|r| Worker::try_from(r).map_err(Into::into))
                    .transpose()
            })
            .await
    }

    /// Lists workers that have not reached `stopped`.
    pub async fn list_active(&self) -> Result<Vec<Worker>, QueueError> {
        self.dal
            .read(|conn| {
                let rows: Vec<WorkerRow> = workers::table
                    .filter(workers::status.ne(WorkerStatus::Stopped.as_str()))
                    .order((workers::started_at.asc(), workers::id.asc()))
                    .load(conn)?;
                rows.into_iter()
                    .map(|r| Worker::try_from(r).map_err(Into::into))
                    .collect()
            })
            .await
    }

    /// Flags every non-stopped worker `stopping` and returns them.
    ///
    /// Used by `worker stop`: the registry flag is one half of the
    /// cooperative shutdown signal, the OS signal the caller sends to each
    /// returned PID is the other.
    pub async fn request_stop_all(&self) -> Result<Vec<Worker>, QueueError> {
        self.dal
            .transaction(move |conn| {
                let rows: Vec<WorkerRow> = workers::table
                    .filter(workers::status.ne(WorkerStatus::Stopped.as_str()))
                    .load(conn)?;
                if rows.is_empty() {
                    return Ok(Vec::new());
                }

                let ids: Vec<&String> = rows.iter().map(|r| &r.id).collect();
                diesel::update(workers::table.filter(workers::id.eq_any(ids)))
                    .set(workers::status.eq(WorkerStatus::Stopping.as_str()))
                    .execute(conn)?;

                let refreshed: Vec<WorkerRow> = workers::table
                    .filter(workers::status.ne(WorkerStatus::Stopped.as_str()))
                    .order((workers::started_at.asc(), workers::id.asc()))
                    .load(conn)?;
                refreshed
                    .into_iter()
                    .map(|r| Worker::try_from(r).map_err(Into::into))
                    .collect()
            })
            .await
    }
}
