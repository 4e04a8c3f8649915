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

//! Job repository tests: insert defaults, round-trips, listing, DLQ
//! replay, and ownership checks on finalization.

use chrono::{Duration as ChronoDuration, Utc};
use queuectl::models::job::AttemptOutput;
use queuectl::retry::RetryDecision;
use queuectl::{JobSpec, JobState, QueueError, ValidationError};

use crate::fixtures::{db_precision, spec, TestStore};

#[tokio::test]
async fn test_insert_round_trips_every_field() {
    let store = TestStore::new().await;
    let dal = store.dal();

    let run_at = Utc::now() + ChronoDuration::hours(1);
    let submitted = JobSpec {
        id: Some("j-full".to_string()),
        command: Some("echo full".to_string()),
        priority: Some(7),
        max_retries: Some(5),
        run_at: Some(run_at),
    };

    let job = dal.jobs().insert(submitted).await.unwrap();
    assert_eq!(job.id, "j-full");
    assert_eq!(job.command, "echo full");
    assert_eq!(job.priority, 7);
    assert_eq!(job.max_retries, 5);
    assert_eq!(job.run_at, db_precision(run_at));
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert!(job.picked_by.is_none());

    // And recoverable through get/list.
    let fetched = dal.jobs().get("j-full").await.unwrap().unwrap();
    assert_eq!(fetched.command, "echo full");
    assert_eq!(fetched.priority, 7);
    assert_eq!(fetched.run_at, db_precision(run_at));
}

#[tokio::test]
async fn test_insert_fills_defaults() {
    let store = TestStore::new().await;
    let dal = store.dal();

    let before = Utc::now();
    let job = dal
        .jobs()
        .insert(JobSpec {
            command: Some("true".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(job.id.starts_with("job-"), "generated id: {}", job.id);
    assert_eq!(job.priority, 0);
    assert_eq!(job.max_retries, 3); // config default
    assert!(job.run_at >= db_precision(before) && job.run_at <= Utc::now());
    assert_eq!(job.run_at, job.enqueued_at);
}

#[tokio::test]
async fn test_insert_duplicate_id_rejected() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.jobs().insert(spec("dup", "true")).await.unwrap();
    let err = dal.jobs().insert(spec("dup", "false")).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::Validation(ValidationError::DuplicateId(id)) if id == "dup"
    ));
}

#[tokio::test]
async fn test_list_orders_by_enqueue_time_and_filters() {
    let store = TestStore::new().await;
    let dal = store.dal();

    for id in ["a", "b", "c"] {
        dal.jobs().insert(spec(id, "true")).await.unwrap();
    }

    let all = dal.jobs().list(None).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    let pending = dal.jobs().list(Some(JobState::Pending)).await.unwrap();
    assert_eq!(pending.len(), 3);

    let completed = dal.jobs().list(Some(JobState::Completed)).await.unwrap();
    assert!(completed.is_empty());
}

#[tokio::test]
async fn test_count_by_state_reports_every_state() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.jobs().insert(spec("one", "true")).await.unwrap();
    dal.jobs().insert(spec("two", "true")).await.unwrap();

    let counts = dal.jobs().count_by_state().await.unwrap();
    assert_eq!(counts.len(), JobState::ALL.len());
    for (state, count) in counts {
        let expected = if state == JobState::Pending { 2 } else { 0 };
        assert_eq!(count, expected, "count for {}", state);
    }
}

#[tokio::test]
async fn test_mark_completed_requires_ownership() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.jobs().insert(spec("owned", "true")).await.unwrap();
    let job = dal
        .jobs()
        .claim_next("w1", Utc::now(), 0.5)
        .await
        .unwrap()
        .expect("job should be claimable");
    assert_eq!(job.id, "owned");

    let err = dal
        .jobs()
        .mark_completed("owned", "w2", &AttemptOutput::default(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::Validation(ValidationError::NotOwner { .. })
    ));

    // The rightful owner still can.
    dal.jobs()
        .mark_completed(
            "owned",
            "w1",
            &AttemptOutput {
                stdout: "done\n".to_string(),
                stderr: String::new(),
                exit_code: Some(0),
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let job = dal.jobs().get("owned").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.exit_code, Some(0));
    assert_eq!(job.stdout.as_deref(), Some("done\n"));
    assert!(job.picked_by.is_none());
    assert!(job.finished_at.is_some());
    assert!(job.last_error.is_none());
}

#[tokio::test]
async fn test_mark_failed_retry_returns_job_to_pending() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.jobs().insert(spec("flaky", "false")).await.unwrap();
    dal.jobs().claim_next("w1", Utc::now(), 0.5).await.unwrap();

    let retry_at = Utc::now() + ChronoDuration::seconds(2);
    dal.jobs()
        .mark_failed(
            "flaky",
            "w1",
            "exit code 1",
            &AttemptOutput {
                exit_code: Some(1),
                ..Default::default()
            },
            Utc::now(),
            RetryDecision::Retry { run_at: retry_at },
        )
        .await
        .unwrap();

    let job = dal.jobs().get("flaky").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.run_at, db_precision(retry_at));
    assert!(job.picked_by.is_none());
    assert_eq!(job.last_error.as_deref(), Some("exit code 1"));
    assert!(job.finished_at.is_none());
}

#[tokio::test]
async fn test_mark_failed_dead_diverts_to_dlq() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.jobs().insert(spec("doomed", "false")).await.unwrap();
    dal.jobs().claim_next("w1", Utc::now(), 0.5).await.unwrap();

    let now = Utc::now();
    dal.jobs()
        .mark_failed(
            "doomed",
            "w1",
            "exit code 1",
            &AttemptOutput {
                exit_code: Some(1),
                ..Default::default()
            },
            now,
            RetryDecision::Dead,
        )
        .await
        .unwrap();

    let job = dal.jobs().get("doomed").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 1);
    assert!(job.finished_at.is_some());
    assert!(job.picked_by.is_none());

    let dlq = dal.jobs().list_dead().await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].id, "doomed");
}

#[tokio::test]
async fn test_requeue_from_dlq_resets_job() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.jobs().insert(spec("revive", "false")).await.unwrap();
    dal.jobs().claim_next("w1", Utc::now(), 0.5).await.unwrap();
    dal.jobs()
        .mark_failed(
            "revive",
            "w1",
            "exit code 1",
            &AttemptOutput::default(),
            Utc::now(),
            RetryDecision::Dead,
        )
        .await
        .unwrap();

    let before = Utc::now();
    let job = dal.jobs().requeue_from_dlq("revive", before).await.unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert!(job.picked_by.is_none());
    assert!(job.last_error.is_none());
    assert!(job.finished_at.is_none());
    assert_eq!(job.run_at, db_precision(before));

    // And a worker cycle picks it again.
    let claimed = dal
        .jobs()
        .claim_next("w2", Utc::now(), 0.5)
        .await
        .unwrap()
        .expect("requeued job should be claimable");
    assert_eq!(claimed.id, "revive");
}

#[tokio::test]
async fn test_jobs_survive_reopening_the_store() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.jobs().insert(spec("p1", "echo ok")).await.unwrap();
    drop(dal);

    // A fresh pool over the same file sees the committed job, the way a
    // worker started later (or after a crash) would.
    let reopened = queuectl::Dal::new(store.reopen().await);
    let job = reopened.jobs().get("p1").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.command, "echo ok");

    let claimed = reopened
        .jobs()
        .claim_next("w1", Utc::now(), 0.5)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, "p1");
}

#[tokio::test]
async fn test_requeue_rejects_missing_and_non_dead_jobs() {
    let store = TestStore::new().await;
    let dal = store.dal();

    let err = dal
        .jobs()
        .requeue_from_dlq("ghost", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::Validation(ValidationError::NotFound(id)) if id == "ghost"
    ));

    dal.jobs().insert(spec("alive", "true")).await.unwrap();
    let err = dal
        .jobs()
        .requeue_from_dlq("alive", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::Validation(ValidationError::NotDead { state: JobState::Pending, .. })
    ));
}
