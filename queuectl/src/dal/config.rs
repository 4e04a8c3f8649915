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

//! Config service: a small set of named tunables with defaults.
//!
//! Values persist as TEXT in the `config` table; readers get a typed
//! [`QueueConfig`] with defaults merged in. Workers and the scheduler
//! re-read once per poll cycle, so `config set` takes effect without a
//! worker restart.

use diesel::prelude::*;
use tracing::warn;

use super::Dal;
use crate::database::schema::config;
use crate::error::{QueueError, ValidationError};

pub const DEFAULT_MAX_RETRIES: i32 = 3;
pub const DEFAULT_BACKOFF_BASE: i32 = 2;
pub const DEFAULT_POLL_INTERVAL: f64 = 0.5;
pub const DEFAULT_JOB_TIMEOUT: u64 = 120;

/// Recognized config keys, in display order.
pub const CONFIG_KEYS: [&str; 4] = [
    "max_retries",
    "backoff_base",
    "poll_interval",
    "job_timeout",
];

/// Typed view of the config table merged with defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Default retry budget for jobs that do not override it.
    pub max_retries: i32,
    /// Base of the exponential retry backoff.
    pub backoff_base: i32,
    /// Worker idle poll interval, in seconds.
    pub poll_interval: f64,
    /// Wall-clock timeout for a single job execution, in seconds.
    pub job_timeout: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

impl QueueConfig {
    /// Key/value pairs in display order, for `config get`.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("max_retries", self.max_retries.to_string()),
            ("backoff_base", self.backoff_base.to_string()),
            ("poll_interval", self.poll_interval.to_string()),
            ("job_timeout", self.job_timeout.to_string()),
        ]
    }

    /// Overlays one persisted entry, keeping the default when the stored
    /// value does not parse (a hand-edited store must not wedge workers).
    fn apply(&mut self, key: &str, value: &str) {
        let applied = match key {
            "max_retries" => value.parse().map(|v| self.max_retries = v).is_ok(),
            "backoff_base" => value.parse().map(|v| self.backoff_base = v).is_ok(),
            "poll_interval" => value.parse().map(|v| self.poll_interval = v).is_ok(),
            "job_timeout" => value.parse().map(|v| self.job_timeout = v).is_ok(),
            _ => {
                warn!(key, "ignoring unrecognized config row");
                true
            }
        };
        if !applied {
            warn!(key, value, "ignoring unparsable config row");
        }
    }
}

/// Validates a `config set` request: recognized key, correct type,
/// non-negative value.
pub fn validate_entry(key: &str, value: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidConfigValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    match key {
        "max_retries" | "backoff_base" | "job_timeout" => {
            let parsed: i64 = value.parse().map_err(|_| invalid("expected an integer"))?;
            if parsed < 0 {
                return Err(invalid("must be non-negative"));
            }
        }
        "poll_interval" => {
            let parsed: f64 = value.parse().map_err(|_| invalid("expected a number"))?;
            if !parsed.is_finite() || parsed < 0.0 {
                return Err(invalid("must be a non-negative number"));
            }
        }
        other => return Err(ValidationError::UnknownConfigKey(other.to_string())),
    }
    Ok(())
}

/// Data access layer for config operations.
pub struct ConfigDal<'a> {
    pub(crate) dal: &'a Dal,
}

impl<'a> ConfigDal<'a> {
    /// Returns all recognized keys merged with defaults.
    pub async fn get(&self) -> Result<QueueConfig, QueueError> {
        self.dal
            .read(|conn| {
                let rows: Vec<(String, String)> = config::table.load(conn)?;
                let mut cfg = QueueConfig::default();
                for (key, value) in &rows {
                    cfg.apply(key, value);
                }
                Ok(cfg)
            })
            .await
    }

    /// Validates and persists one config value.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), QueueError> {
        validate_entry(key, value)?;

        let key = key.to_string();
        let value = value.to_string();
        self.dal
            .transaction(move |conn| {
                diesel::insert_into(config::table)
                    .values((config::key.eq(&key), config::value.eq(&value)))
                    .on_conflict(config::key)
                    .do_update()
                    .set(config::value.eq(&value))
                    .execute(conn)?;
                Ok(())
            })
            .await
    }
}
