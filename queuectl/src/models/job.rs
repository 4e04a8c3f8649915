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

//! Job model: submission document, state machine, row and domain types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, ValidationError};
use crate::models::{format_timestamp, parse_timestamp};

/// The job state machine.
///
/// `Failed` is transient: a job that fails an attempt with retry budget
/// left returns to `Pending` with its attempt counter incremented, so no
/// committed row rests in `Failed`. The variant is kept so the original
/// CLI state grammar (`list --state failed`) still parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobState {
    /// All states, in the order `status` output reports them.
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "dead" => Ok(JobState::Dead),
            other => Err(ValidationError::UnknownState(other.to_string())),
        }
    }
}

/// A job submission document, as accepted by `enqueue`.
///
/// Unknown fields are ignored. `command` is required and non-empty;
/// everything else defaults at insert time (`priority = 0`,
/// `max_retries = Config.max_retries`, `run_at = now`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobSpec {
    pub id: Option<String>,
    pub command: Option<String>,
    pub priority: Option<i32>,
    pub max_retries: Option<i32>,
    pub run_at: Option<DateTime<Utc>>,
}

impl JobSpec {
    /// Parses and validates a submission document.
    pub fn from_json(raw: &str) -> Result<Self, ValidationError> {
        let spec: JobSpec = serde_json::from_str(raw)
            .map_err(|e| ValidationError::InvalidJson(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Validates the document without consuming it.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.command {
            Some(command) if !command.trim().is_empty() => {}
            _ => return Err(ValidationError::MissingCommand),
        }
        if matches!(self.max_retries, Some(n) if n < 0) {
            return Err(ValidationError::NegativeMaxRetries);
        }
        Ok(())
    }
}

/// Generates a server-side job id.
pub(crate) fn generate_job_id() -> String {
    format!("job-{}", Uuid::new_v4().simple())
}

/// A job as seen by callers: chrono-typed, state as enum.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub priority: i32,
    /// Count of completed execution attempts.
    pub attempts: i32,
    pub max_retries: i32,
    /// Earliest moment the job is eligible to run.
    pub run_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    /// Timestamp of the current/last claim.
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Id of the worker that currently owns the job.
    pub picked_by: Option<String>,
    pub last_error: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// Captured output of one execution attempt, as recorded on the job row.
#[derive(Debug, Clone, Default)]
pub struct AttemptOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Raw `jobs` row with TEXT-typed timestamps.
#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = crate::database::schema::jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobRow {
    pub id: String,
    pub command: String,
    pub state: String,
    pub priority: i32,
    pub attempts: i32,
    pub max_retries: i32,
    pub run_at: String,
    pub enqueued_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub picked_by: Option<String>,
    pub last_error: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub updated_at: String,
}

/// Insertable `jobs` row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::jobs)]
pub struct NewJobRow {
    pub id: String,
    pub command: String,
    pub state: String,
    pub priority: i32,
    pub attempts: i32,
    pub max_retries: i32,
    pub run_at: String,
    pub enqueued_at: String,
    pub updated_at: String,
}

fn decode_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    parse_timestamp(value).map_err(|e| StoreError::Decode {
        entity: "job",
        message: format!("bad {} timestamp '{}': {}", field, value, e),
    })
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state = JobState::from_str(&row.state).map_err(|_| StoreError::Decode {
            entity: "job",
            message: format!("unknown state '{}'", row.state),
        })?;

        Ok(Job {
            state,
            run_at: decode_timestamp("run_at", &row.run_at)?,
            enqueued_at: decode_timestamp("enqueued_at", &row.enqueued_at)?,
            started_at: row
                .started_at
                .as_deref()
                .map(|s| decode_timestamp("started_at", s))
                .transpose()?,
            finished_at: row
                .finished_at
                .as_deref()
                .map(|s| decode_timestamp("finished_at", s))
                .transpose()?,
            updated_at: decode_timestamp("updated_at", &row.updated_at)?,
            id: row.id,
            command: row.command,
            priority: row.priority,
            attempts: row.attempts,
            max_retries: row.max_retries,
            picked_by: row.picked_by,
            last_error: row.last_error,
            stdout: row.stdout,
            stderr: row.stderr,
            exit_code: row.exit_code,
        })
    }
}

impl NewJobRow {
    /// Resolves a validated spec into an insertable row.
    pub(crate) fn from_spec(
        spec: JobSpec,
        default_max_retries: i32,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        spec.validate()?;
        let command = spec.command.ok_or(ValidationError::MissingCommand)?;
        let now_text = format_timestamp(now);

        Ok(NewJobRow {
            id: spec.id.unwrap_or_else(generate_job_id),
            command,
            state: JobState::Pending.as_str().to_string(),
            priority: spec.priority.unwrap_or(0),
            attempts: 0,
            max_retries: spec.max_retries.unwrap_or(default_max_retries),
            run_at: format_timestamp(spec.run_at.unwrap_or(now)),
            enqueued_at: now_text.clone(),
            updated_at: now_text,
        })
    }
}
