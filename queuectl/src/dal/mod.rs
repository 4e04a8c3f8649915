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

//! Data Access Layer
//!
//! All persistence flows through this module: jobs, the worker registry
//! and the config table each get a focused DAL handle, and every mutating
//! operation runs inside a single immediate transaction so a worker crash
//! can never leave a half-applied state change behind.

use diesel::sqlite::SqliteConnection;
use std::time::Duration;

use crate::database::Database;
use crate::error::{QueueError, StoreError};

pub mod config;
pub mod job;
pub mod worker;

pub use config::{ConfigDal, QueueConfig};
pub use job::JobDal;
pub use worker::WorkerDal;

/// Bounded retry budget for transactions that hit SQLite lock contention.
const STORE_ATTEMPTS: u32 = 3;

/// The main Data Access Layer struct.
#[derive(Clone)]
pub struct Dal {
    database: Database,
}

impl Dal {
    /// Creates a new DAL instance over the provided database handle.
    pub fn new(database: Database) -> Self {
        Dal { database }
    }

    /// Returns a JobDal instance for job table operations.
    pub fn jobs(&self) -> JobDal<'_> {
        JobDal { dal: self }
    }

    /// Returns a WorkerDal instance for worker registry operations.
    pub fn workers(&self) -> WorkerDal<'_> {
        WorkerDal { dal: self }
    }

    /// Returns a ConfigDal instance for config table operations.
    pub fn config(&self) -> ConfigDal<'_> {
        ConfigDal { dal: self }
    }

    /// Executes a closure within an immediate (write-locking) transaction.
    ///
    /// Lock contention from concurrent worker processes is retried up to
    /// [`STORE_ATTEMPTS`] times before the error surfaces.
    pub(crate) async fn transaction<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        F: Fn(&mut SqliteConnection) -> Result<T, QueueError> + Clone + Send + 'static,
        T: Send + 'static,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let f = f.clone();
            let conn = self
                .database
                .pool()
                .get()
                .await
                .map_err(|e| StoreError::Pool(e.to_string()))?;

            let result = conn
                .interact(move |conn| conn.immediate_transaction(|conn| f(conn)))
                .await
                .map_err(|e| QueueError::from(StoreError::Interact(e.to_string())))?;

            match result {
                Err(err) if attempt < STORE_ATTEMPTS && err.is_lock_contention() => {
                    tracing::warn!(attempt, "store transaction hit lock contention, retrying");
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                other => return other,
            }
        }
    }

    /// Executes a read-only closure on a pooled connection.
    pub(crate) async fn read<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, QueueError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| QueueError::from(StoreError::Interact(e.to_string())))?
    }
}
