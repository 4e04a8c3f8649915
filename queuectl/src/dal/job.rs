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

//! Job repository: typed operations over the `jobs` table.
//!
//! The scheduler is embedded in [`JobDal::claim_next`]: candidate ranking,
//! the guarded conditional UPDATE that makes claiming atomic, and the
//! stuck-job recovery pass all run inside one immediate transaction.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use tracing::{debug, warn};

use super::Dal;
use crate::database::schema::{jobs, workers};
use crate::error::{QueueError, ValidationError};
use crate::models::format_timestamp;
use crate::models::job::{AttemptOutput, Job, JobRow, JobSpec, JobState, NewJobRow};
use crate::models::worker::WorkerStatus;
use crate::retry::RetryDecision;

/// How many ranked candidates one claim call will race for before giving
/// up and reporting an empty queue.
const CLAIM_ATTEMPTS: usize = 4;

/// Floor on the heartbeat-staleness window used by stuck-job recovery.
const RECOVERY_GRACE_FLOOR_SECS: i64 = 30;

/// Recorded on jobs reclaimed from a lost worker.
const WORKER_LOST_ERROR: &str = "worker lost";

/// Data access layer for job operations.
pub struct JobDal<'a> {
    pub(crate) dal: &'a Dal,
}

impl<'a> JobDal<'a> {
    /// Inserts a new job from a submission spec.
    ///
    /// Generates an id if the spec has none and fills `priority`,
    /// `max_retries` and `run_at` defaults (the retry budget default comes
    /// from the config table).
    pub async fn insert(&self, spec: JobSpec) -> Result<Job, QueueError> {
        let defaults = self.dal.config().get().await?;
        let row = NewJobRow::from_spec(spec, defaults.max_retries, Utc::now())?;

        self.dal
            .transaction(move |conn| {
                let inserted = diesel::insert_into(jobs::table).values(&row).execute(conn);
                match inserted {
                    Err(diesel::result::Error::DatabaseError(
                        diesel::result::DatabaseErrorKind::UniqueViolation,
                        _,
                    )) => return Err(ValidationError::DuplicateId(row.id.clone()).into()),
                    other => other?,
                };

                let fetched: JobRow = jobs::table.find(&row.id).first(conn)?;
                Ok(Job::try_from(fetched)?)
            })
            .await
    }

    /// Fetches one job by id.
    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, QueueError> {
        let job_id = job_id.to_string();
        self.dal
            .read(move |conn| {
                let row: Option<JobRow> = jobs::table.find(&job_id).first(conn).optional()?;
                row.map(|r| Job::try_from(r).map_err(Into::into)).transpose()
            })
            .await
    }

    /// Lists jobs, optionally filtered by state, ordered by enqueue time.
    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        self.dal
            .read(move |conn| {
                let mut query = jobs::table.into_boxed();
                if let Some(state) = state {
                    query = query.filter(jobs::state.eq(state.as_str()));
                }
                let rows: Vec<JobRow> = query
                    .order((jobs::enqueued_at.asc(), jobs::id.asc()))
                    .load(conn)?;
                rows.into_iter()
                    .map(|r| Job::try_from(r).map_err(Into::into))
                    .collect()
            })
            .await
    }

    /// Lists the dead letter queue, most recent failure first.
    pub async fn list_dead(&self) -> Result<Vec<Job>, QueueError> {
        self.dal
            .read(|conn| {
                let rows: Vec<JobRow> = jobs::table
                    .filter(jobs::state.eq(JobState::Dead.as_str()))
                    .order(jobs::finished_at.desc())
                    .load(conn)?;
                rows.into_iter()
                    .map(|r| Job::try_from(r).map_err(Into::into))
                    .collect()
            })
            .await
    }

    /// Counts jobs per state, reporting every state (zero included).
    pub async fn count_by_state(&self) -> Result<Vec<(JobState, i64)>, QueueError> {
        self.dal
            .read(|conn| {
                let rows: Vec<(String, i64)> = jobs::table
                    .group_by(jobs::state)
                    .select((jobs::state, diesel::dsl::count_star()))
                    .load(conn)?;

                let counted: HashMap<String, i64> = rows.into_iter().collect();
                Ok(JobState::ALL
                    .iter()
                    .map(|state| {
                        (
                            *state,
                            counted.get(state.as_str()).copied().unwrap_or(0),
                        )
                    })
                    .collect())
            })
            .await
    }

    /// Claims the next eligible job for a worker, or returns `None`.
    ///
    /// Runs the stuck-job recovery pass, then repeatedly selects the
    /// top-ranked eligible row (`priority DESC, run_at ASC, enqueued_at
    /// ASC, id ASC`) and attempts a conditional UPDATE guarded on the row
    /// still being pending and unowned. A lost race falls through to the
    /// next-ranked candidate, bounded by [`CLAIM_ATTEMPTS`].
    pub async fn claim_next(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        poll_interval: f64,
    ) -> Result<Option<Job>, QueueError> {
        let worker_id = worker_id.to_string();

        self.dal
            .transaction(move |conn| {
                recover_stuck_jobs(conn, now, poll_interval)?;

                let now_text = format_timestamp(now);
                for _ in 0..CLAIM_ATTEMPTS {
                    let candidate: Option<String> = jobs::table
                        .filter(jobs::state.eq(JobState::Pending.as_str()))
                        .filter(jobs::run_at.le(&now_text))
                        .filter(jobs::picked_by.is_null())
                        .order((
                            jobs::priority.desc(),
                            jobs::run_at.asc(),
                            jobs::enqueued_at.asc(),
                            jobs::id.asc(),
                        ))
                        .select(jobs::id)
                        .first(conn)
                        .optional()?;

                    let Some(job_id) = candidate else {
                        return Ok(None);
                    };

                    let claimed = diesel::update(
                        jobs::table
                            .filter(jobs::id.eq(&job_id))
                            .filter(jobs::state.eq(JobState::Pending.as_str()))
                            .filter(jobs::picked_by.is_null()),
                    )
                    .set((
                        jobs::state.eq(JobState::Processing.as_str()),
                        jobs::picked_by.eq(&worker_id),
                        jobs::started_at.eq(Some(now_text.clone())),
                        jobs::updated_at.eq(&now_text),
                    ))
                    .execute(conn)?;

                    if claimed == 1 {
                        debug!(job_id = %job_id, worker_id = %worker_id, "claimed job");
                        let row: JobRow = jobs::table.find(&job_id).first(conn)?;
                        return Ok(Some(Job::try_from(row)?));
                    }
                    // Lost the race for this candidate; the next SELECT
                    // skips it because it is no longer pending.
                }
                Ok(None)
            })
            .await
    }

    /// Transitions `processing -> completed` for the owning worker.
    pub async fn mark_completed(
        &self,
        job_id: &str,
        worker_id: &str,
        output: &AttemptOutput,
        finished_at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let job_id = job_id.to_string();
        let worker_id = worker_id.to_string();
        let output = output.clone();

        self.dal
            .transaction(move |conn| {
                let updated = diesel::update(
                    jobs::table
                        .filter(jobs::id.eq(&job_id))
                        .filter(jobs::state.eq(JobState::Processing.as_str()))
                        .filter(jobs::picked_by.eq(&worker_id)),
                )
                    .set((
                        jobs::state.eq(JobState::Completed.as_str()),
                        jobs::attempts.eq(jobs::attempts + 1),
                        jobs::finished_at.eq(Some(format_timestamp(finished_at))),
                        jobs::picked_by.eq(None::<String>),
                        jobs::last_error.eq(None::<String>),
                        jobs::stdout.eq(Some(output.stdout.clone())),
                        jobs::stderr.eq(Some(output.stderr.clone())),
                        jobs::exit_code.eq(output.exit_code),
                        jobs::updated_at.eq(format_timestamp(finished_at)),
                    ))
                    .execute(conn)?;

                if updated == 0 {
                    return Err(ValidationError::NotOwner {
                        job_id: job_id.clone(),
                        worker_id: worker_id.clone(),
                    }
                    .into());
                }
                Ok(())
            })
            .await
    }

    /// Records a failed attempt and applies the retry policy's decision:
    /// either back to `pending` with a new `run_at`, or to `dead`.
    ///
    /// The attempt counter increments atomically with the transition.
    pub async fn mark_failed(
        &self,
        job_id: &str,
        worker_id: &str,
        last_error: &str,
        output: &AttemptOutput,
        now: DateTime<Utc>,
        decision: RetryDecision,
    ) -> Result<(), QueueError> {
        let job_id = job_id.to_string();
        let worker_id = worker_id.to_string();
        let last_error = last_error.to_string();
        let output = output.clone();

        self.dal
            .transaction(move |conn| {
                let updated = match decision {
                    RetryDecision::Retry { run_at } => {
                        diesel::update(
                            jobs::table
                                .filter(jobs::id.eq(&job_id))
                                .filter(jobs::state.eq(JobState::Processing.as_str()))
                                .filter(jobs::picked_by.eq(&worker_id)),
                        )
                            .set((
                                jobs::state.eq(JobState::Pending.as_str()),
                                jobs::attempts.eq(jobs::attempts + 1),
                                jobs::run_at.eq(format_timestamp(run_at)),
                                jobs::picked_by.eq(None::<String>),
                                jobs::last_error.eq(Some(last_error.clone())),
                                jobs::stdout.eq(Some(output.stdout.clone())),
                                jobs::stderr.eq(Some(output.stderr.clone())),
                                jobs::exit_code.eq(output.exit_code),
                                jobs::updated_at.eq(format_timestamp(now)),
                            ))
                            .execute(conn)?
                    }
                    RetryDecision::Dead => {
                        diesel::update(
                            jobs::table
                                .filter(jobs::id.eq(&job_id))
                                .filter(jobs::state.eq(JobState::Processing.as_str()))
                                .filter(jobs::picked_by.eq(&worker_id)),
                        )
                            .set((
                                jobs::state.eq(JobState::Dead.as_str()),
                                jobs::attempts.eq(jobs::attempts + 1),
                                jobs::finished_at.eq(Some(format_timestamp(now))),
                                jobs::picked_by.eq(None::<String>),
                                jobs::last_error.eq(Some(last_error.clone())),
                                jobs::stdout.eq(Some(output.stdout.clone())),
                                jobs::stderr.eq(Some(output.stderr.clone())),
                                jobs::exit_code.eq(output.exit_code),
                                jobs::updated_at.eq(format_timestamp(now)),
                            ))
                            .execute(conn)?
                    }
                };

                if updated == 0 {
                    return Err(ValidationError::NotOwner {
                        job_id: job_id.clone(),
                        worker_id: worker_id.clone(),
                    }
                    .into());
                }
                Ok(())
            })
            .await
    }

    /// Requeues a dead job: `dead -> pending` with the attempt counter
    /// and error fields reset.
    pub async fn requeue_from_dlq(
        &self,
        job_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, QueueError> {
        let job_id = job_id.to_string();

        self.dal
            .transaction(move |conn| {
                let row: Option<JobRow> = jobs::table.find(&job_id).first(conn).optional()?;
                let Some(row) = row else {
                    return Err(ValidationError::NotFound(job_id.clone()).into());
                };
                let job = Job::try_from(row)?;
                if job.state != JobState::Dead {
                    return Err(ValidationError::NotDead {
                        id: job_id.clone(),
                        state: job.state,
                    }
                    .into());
                }

                diesel::update(jobs::table.find(&job_id))
                    .set((
                        jobs::state.eq(JobState::Pending.as_str()),
                        jobs::attempts.eq(0),
                        jobs::run_at.eq(format_timestamp(now)),
                        jobs::picked_by.eq(None::<String>),
                        jobs::last_error.eq(None::<String>),
                        jobs::finished_at.eq(None::<String>),
                        jobs::updated_at.eq(format_timestamp(now)),
                    ))
                    .execute(conn)?;

                let refreshed: JobRow = jobs::table.find(&job_id).first(conn)?;
                Ok(Job::try_from(refreshed)?)
            })
            .await
    }
}

/// Returns orphaned `processing` jobs to `pending`.
///
/// A job is orphaned when its owning worker is gone from the registry,
/// has reached `stopped` without releasing it, or has not heartbeat
/// within `max(3 x poll_interval, 30s)` (a SIGKILLed worker still claims
/// `running`, so staleness alone is disqualifying). The attempt counter
/// is not incremented: the attempt never completed observably. This pass
/// is the source of the queue's at-least-once semantics.
fn recover_stuck_jobs(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    poll_interval: f64,
) -> Result<(), QueueError> {
    let grace_secs = ((poll_interval * 3.0).ceil() as i64).max(RECOVERY_GRACE_FLOOR_SECS);
    let cutoff = format_timestamp(now - Duration::seconds(grace_secs));

    let registry: Vec<(String, String, String)> = workers::table
        .select((workers::id, workers::status, workers::heartbeat_at))
        .load(conn)?;
    let live: HashSet<String> = registry
        .into_iter()
        .filter(|(_, status, heartbeat_at)| {
            status != WorkerStatus::Stopped.as_str() && heartbeat_at.as_str() >= cutoff.as_str()
        })
        .map(|(id, _, _)| id)
        .collect();

    let processing: Vec<(String, Option<String>)> = jobs::table
        .filter(jobs::state.eq(JobState::Processing.as_str()))
        .select((jobs::id, jobs::picked_by))
        .load(conn)?;

    let orphaned: Vec<String> = processing
        .into_iter()
        .filter(|(_, picked_by)| match picked_by {
            Some(owner) => !live.contains(owner),
            None => true,
        })
        .map(|(id, _)| id)
        .collect();

    if !orphaned.is_empty() {
        warn!(jobs = ?orphaned, "returning jobs from lost workers to pending");
        diesel::update(jobs::table.filter(jobs::id.eq_any(&orphaned)))
            .set((
                jobs::state.eq(JobState::Pending.as_str()),
                jobs::picked_by.eq(None::<String>),
                jobs::last_error.eq(Some(WORKER_LOST_ERROR)),
                jobs::updated_at.eq(format_timestamp(now)),
            ))
            .execute(conn)?;
    }
    Ok(())
}
