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

//! Error types for the QueueCTL engine.
//!
//! Errors are classified by concern rather than funneled through a single
//! enum: callers that can act on a class of failure (a CLI mapping
//! validation failures to exit code 2, a worker feeding execution failures
//! into the retry policy) match on the class, not on strings.

use thiserror::Error;

use crate::models::job::JobState;

/// Input or request validation failures.
///
/// These are never recovered internally; the CLI collaborator surfaces
/// them with exit code 2.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The submission document was not valid JSON.
    #[error("invalid job JSON: {0}")]
    InvalidJson(String),

    /// The submission document lacked a usable `command` field.
    #[error("job must include a non-empty 'command'")]
    MissingCommand,

    /// `max_retries` in the submission document was negative.
    #[error("'max_retries' must be non-negative")]
    NegativeMaxRetries,

    /// A job with the requested id already exists.
    #[error("job '{0}' already exists")]
    DuplicateId(String),

    /// No job with the requested id exists.
    #[error("job '{0}' not found")]
    NotFound(String),

    /// A DLQ operation was attempted on a job that is not dead.
    #[error("job '{id}' is not in the dead letter queue (state: {state})")]
    NotDead { id: String, state: JobState },

    /// A finalizing worker no longer owns the job it tried to finalize.
    #[error("job '{job_id}' is not owned by worker '{worker_id}'")]
    NotOwner { job_id: String, worker_id: String },

    /// An unrecognized job state was supplied (e.g. `list --state`).
    #[error("unknown job state '{0}'")]
    UnknownState(String),

    /// An unrecognized config key was supplied to `config set`.
    #[error("unknown config key '{0}'")]
    UnknownConfigKey(String),

    /// A config value failed type or range validation.
    #[error("invalid value '{value}' for config key '{key}': {reason}")]
    InvalidConfigValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Failures of the persistence substrate.
///
/// Lock contention is retried a bounded number of times inside the DAL
/// before one of these surfaces to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("database interaction failed: {0}")]
    Interact(String),

    #[error(transparent)]
    Database(#[from] diesel::result::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    /// A persisted row could not be decoded into its domain type.
    #[error("corrupt {entity} row: {message}")]
    Decode {
        entity: &'static str,
        message: String,
    },
}

/// Attempt-level failures of a job's child process.
///
/// Never surfaced to the CLI: recorded on the job and fed to the retry
/// policy.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("failed to spawn command: {0}")]
    Spawn(String),

    /// Wall-clock timeout; the child was terminated.
    #[error("timeout")]
    Timeout,

    #[error("exit code {0}")]
    NonZeroExit(i32),

    /// The child was terminated by a signal before reporting an exit code.
    #[error("terminated by signal {0}")]
    Killed(i32),
}

/// Umbrella error returned by repository, registry and control operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<diesel::result::Error> for QueueError {
    fn from(err: diesel::result::Error) -> Self {
        QueueError::Store(StoreError::Database(err))
    }
}

impl QueueError {
    /// Whether this error represents SQLite lock contention that a
    /// bounded transaction retry may clear.
    pub(crate) fn is_lock_contention(&self) -> bool {
        match self {
            QueueError::Store(StoreError::Database(diesel::result::Error::DatabaseError(
                _,
                info,
            ))) => info.message().contains("database is locked"),
            _ => false,
        }
    }
}
