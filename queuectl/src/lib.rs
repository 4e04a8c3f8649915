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

//! QueueCTL engine: a durable, single-host background job queue.
//!
//! Producers submit shell-command jobs; long-running worker processes
//! claim them through an atomic claim protocol, execute them as child
//! processes, and record outcomes in an embedded SQLite store. Failed
//! jobs retry with exponential backoff; jobs that exhaust their budget
//! divert to a dead letter queue for manual replay.
//!
//! # Architecture
//!
//! - [`database`]: the SQLite store (pooling, WAL crash-safety, migrations).
//! - [`dal`]: typed repositories over jobs, workers and config, each
//!   mutation a single transaction.
//! - [`retry`]: the pure retry/backoff/DLQ policy.
//! - [`worker`]: the per-process runtime loop and shell executor.
//! - [`ops`]: the stateless control operations the CLI invokes.
//!
//! There is no ambient store: every component receives an explicit
//! [`Database`] or [`Dal`] handle. Worker processes coordinate only
//! through the store.

pub mod dal;
pub mod database;
pub mod error;
pub mod models;
pub mod ops;
pub mod retry;
pub mod worker;

pub use dal::{Dal, QueueConfig};
pub use database::{default_database_url, Database};
pub use error::{ExecutionError, QueueError, StoreError, ValidationError};
pub use models::job::{AttemptOutput, Job, JobSpec, JobState};
pub use models::worker::{Worker, WorkerStatus};
pub use worker::WorkerRuntime;

/// Initializes tracing for binaries and tests.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// `filter` overrides the `RUST_LOG`-style directive; `None` falls back
/// to the environment, defaulting to `info`.
pub fn init_logging(filter: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let env_filter = match filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
