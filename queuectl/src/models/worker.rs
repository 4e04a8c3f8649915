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

//! Worker registry model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::error::StoreError;
use crate::models::parse_timestamp;

/// Worker lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(WorkerStatus::Starting),
            "running" => Ok(WorkerStatus::Running),
            "stopping" => Ok(WorkerStatus::Stopping),
            "stopped" => Ok(WorkerStatus::Stopped),
            other => Err(StoreError::Decode {
                entity: "worker",
                message: format!("unknown status '{}'", other),
            }),
        }
    }
}

/// A registered worker process.
#[derive(Debug, Clone, Serialize)]
pub struct Worker {
    pub id: String,
    pub os_pid: i32,
    pub status: WorkerStatus,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Raw `workers` row.
#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = crate::database::schema::workers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct WorkerRow {
    pub id: String,
    pub os_pid: i32,
    pub status: String,
    pub host: String,
    pub started_at: String,
    pub heartbeat_at: String,
    pub stopped_at: Option<String>,
}

/// Insertable `workers` row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::workers)]
pub struct NewWorkerRow {
    pub id: String,
    pub os_pid: i32,
    pub status: String,
    pub host: String,
    pub started_at: String,
    pub heartbeat_at: String,
}

fn decode_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    parse_timestamp(value).map_err(|e| StoreError::Decode {
        entity: "worker",
        message: format!("bad {} timestamp '{}': {}", field, value, e),
    })
}

impl TryFrom<WorkerRow> for Worker {
    type Error = StoreError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        Ok(Worker {
            status: row.status.parse()?,
            started_at: decode_timestamp("started_at", &row.started_at)?,
            heartbeat_at: decode_timestamp("heartbeat_at", &row.heartbeat_at)?,
            stopped_at: row
                .stopped_at
                .as_deref()
                .map(|s| decode_timestamp("stopped_at", s))
                .transpose()?,
            id: row.id,
            os_pid: row.os_pid,
            host: row.host,
        })
    }
}
