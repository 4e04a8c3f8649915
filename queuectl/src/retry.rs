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

//! Retry policy: a pure function from a failed attempt to what happens
//! next.
//!
//! The exponent is the attempt number *after* the failure is recorded, so
//! the first retry waits `base^1` seconds, the second `base^2`, and so
//! on. Once the budget is exhausted the job diverts to the dead letter
//! queue.

use chrono::{DateTime, Duration, Utc};

/// Upper bound on a single backoff delay. Only reachable with extreme
/// `backoff_base` / attempt combinations, where the exact delay stops
/// being meaningful anyway.
pub const MAX_BACKOFF_SECS: i64 = 30 * 24 * 60 * 60;

/// What to do with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Return the job to the queue, eligible again at `run_at`.
    Retry { run_at: DateTime<Utc> },
    /// The retry budget is exhausted; divert to the DLQ.
    Dead,
}

/// Decides between retry and DLQ for a job whose failure is about to be
/// recorded.
///
/// `attempts_after_failure` is the attempt count *including* the failure
/// being recorded; a job dies once it exceeds `max_retries`.
pub fn decide(
    attempts_after_failure: i32,
    max_retries: i32,
    backoff_base: i32,
    now: DateTime<Utc>,
) -> RetryDecision {
    if attempts_after_failure > max_retries {
        return RetryDecision::Dead;
    }

    let delay_secs = i64::from(backoff_base.max(1))
        .checked_pow(attempts_after_failure.max(0) as u32)
        .unwrap_or(MAX_BACKOFF_SECS)
        .min(MAX_BACKOFF_SECS);

    RetryDecision::Retry {
        run_at: now + Duration::seconds(delay_secs),
    }
}
