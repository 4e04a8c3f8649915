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

//! Database connection management for the embedded SQLite store.
//!
//! Provides an async connection pool implementation using `deadpool-diesel`.
//! The store location is a plain file path (or `:memory:`), optionally
//! prefixed with `sqlite://`, and is usually taken from the `QUEUECTL_DB`
//! environment variable.
//!
//! Every workspace process (the CLI and each worker) opens its own pool
//! against the same file; cross-process coordination relies on WAL mode
//! plus a generous `busy_timeout`, both applied before migrations run.

use deadpool_diesel::sqlite::{Manager, Pool, Runtime};
use tracing::info;

use crate::error::StoreError;

/// Environment variable naming the store location.
pub const DB_ENV_VAR: &str = "QUEUECTL_DB";

/// Fallback store path when [`DB_ENV_VAR`] is unset.
pub const DEFAULT_DB_PATH: &str = "./queuectl.db";

/// Resolves the store location from the environment.
pub fn default_database_url() -> String {
    std::env::var(DB_ENV_VAR).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
}

/// A pool of connections to the embedded store.
///
/// `Database` is `Clone`; each clone references the same underlying pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Database(...)")
    }
}

impl Database {
    /// Creates a new connection pool for the given store location.
    ///
    /// SQLite has limited concurrent write support even with WAL mode, so
    /// the pool holds a single connection per process; concurrency across
    /// worker processes is serialized by SQLite itself.
    ///
    /// # Panics
    ///
    /// Panics if the connection pool cannot be created.
    pub fn new(connection_string: &str) -> Self {
        let connection_url = Self::build_sqlite_url(connection_string);
        let manager = Manager::new(connection_url, Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(1)
            .build()
            .expect("Failed to create SQLite connection pool");

        info!("SQLite connection pool initialized");

        Self { pool }
    }

    /// Returns a clone of the connection pool.
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    /// Applies concurrency pragmas and runs pending migrations.
    ///
    /// WAL mode allows concurrent reads during writes and gives the
    /// crash-safety the store contract requires; `busy_timeout` makes
    /// SQLite wait instead of immediately failing on cross-process locks.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        use diesel::prelude::*;
        use diesel_migrations::MigrationHarness;

        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        conn.interact(|conn| {
            diesel::sql_query("PRAGMA journal_mode=WAL;")
                .execute(conn)
                .map_err(|e| StoreError::Migration(format!("failed to set WAL mode: {}", e)))?;
            diesel::sql_query("PRAGMA busy_timeout=30000;")
                .execute(conn)
                .map_err(|e| StoreError::Migration(format!("failed to set busy_timeout: {}", e)))?;

            conn.run_pending_migrations(crate::database::MIGRATIONS)
                .map_err(|e| StoreError::Migration(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Interact(e.to_string()))?
    }

    /// Builds a SQLite connection URL, stripping any `sqlite://` prefix.
    fn build_sqlite_url(connection_string: &str) -> String {
        if let Some(path) = connection_string.strip_prefix("sqlite://") {
            path.to_string()
        } else {
            connection_string.to_string()
        }
    }
}
