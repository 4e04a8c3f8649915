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

//! End-to-end worker runtime tests: a real `WorkerRuntime` against a real
//! store, executing real shell commands.
//!
//! These are timing-sensitive (they wait on poll cycles and backoff
//! delays), so they run serially.

use std::time::Duration;

use queuectl::{Dal, JobSpec, JobState, WorkerRuntime, WorkerStatus};
use serial_test::serial;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::fixtures::{spec, wait_for_state, TestStore};

struct RunningWorker {
    worker_id: String,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Result<(), queuectl::QueueError>>,
}

impl RunningWorker {
    fn spawn(dal: Dal) -> Self {
        let worker_id = WorkerRuntime::generate_worker_id();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let runtime = WorkerRuntime::new(dal, worker_id.clone());
        let handle = tokio::spawn(runtime.run(shutdown_rx));
        RunningWorker {
            worker_id,
            shutdown,
            handle,
        }
    }

    async fn stop(self) {
        let _ = self.shutdown.send(true);
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("worker did not stop in time")
            .expect("worker task panicked")
            .expect("worker runtime errored");
    }
}

#[tokio::test]
#[serial]
async fn test_happy_path_completes_job() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.jobs().insert(spec("h1", "echo ok")).await.unwrap();
    let worker = RunningWorker::spawn(store.dal());

    let job = wait_for_state(&dal, "h1", JobState::Completed, Duration::from_secs(10)).await;
    assert_eq!(job.attempts, 1);
    assert_eq!(job.exit_code, Some(0));
    assert!(job.stdout.as_deref().unwrap_or("").contains("ok"));
    assert!(job.picked_by.is_none());
    assert!(job.finished_at.is_some());

    worker.stop().await;
}

#[tokio::test]
#[serial]
async fn test_failing_job_exhausts_budget_into_dlq() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.jobs()
        .insert(JobSpec {
            max_retries: Some(0),
            ..spec("f1", "false")
        })
        .await
        .unwrap();
    let worker = RunningWorker::spawn(store.dal());

    let job = wait_for_state(&dal, "f1", JobState::Dead, Duration::from_secs(10)).await;
    assert_eq!(job.attempts, 1);
    assert_eq!(job.exit_code, Some(1));
    assert_eq!(job.last_error.as_deref(), Some("exit code 1"));

    worker.stop().await;
}

#[tokio::test]
#[serial]
async fn test_retry_after_backoff_then_success() {
    let store = TestStore::new().await;
    let dal = store.dal();

    // Fail once, then succeed: the marker file survives between attempts.
    dal.config().set("backoff_base", "1").await.unwrap();
    let marker = std::env::temp_dir().join(format!("queuectl-retry-{}", std::process::id()));
    let _ = std::fs::remove_file(&marker);
    let command = format!(
        "test -f {path} || {{ touch {path}; exit 1; }}",
        path = marker.display()
    );
    dal.jobs().insert(spec("r1", &command)).await.unwrap();

    let worker = RunningWorker::spawn(store.dal());
    let job = wait_for_state(&dal, "r1", JobState::Completed, Duration::from_secs(20)).await;
    assert_eq!(job.attempts, 2);
    assert!(job.last_error.is_none());

    worker.stop().await;
    let _ = std::fs::remove_file(&marker);
}

#[tokio::test]
#[serial]
async fn test_single_worker_runs_high_priority_first() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.jobs()
        .insert(JobSpec {
            priority: Some(1),
            ..spec("lo", "echo lo")
        })
        .await
        .unwrap();
    dal.jobs()
        .insert(JobSpec {
            priority: Some(10),
            ..spec("hi", "echo hi")
        })
        .await
        .unwrap();

    let worker = RunningWorker::spawn(store.dal());
    let hi = wait_for_state(&dal, "hi", JobState::Completed, Duration::from_secs(10)).await;
    let lo = wait_for_state(&dal, "lo", JobState::Completed, Duration::from_secs(10)).await;
    assert!(hi.started_at.unwrap() < lo.started_at.unwrap());

    worker.stop().await;
}

#[tokio::test]
#[serial]
async fn test_registry_stop_flag_shuts_worker_down() {
    let store = TestStore::new().await;
    let dal = store.dal();

    let worker = RunningWorker::spawn(store.dal());

    // Wait for registration, then stop through the registry alone.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if dal
            .workers()
            .get(&worker.worker_id)
            .await
            .unwrap()
            .is_some()
        {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "worker never registered");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    dal.workers().request_stop_all().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), worker.handle)
        .await
        .expect("worker ignored registry stop flag")
        .expect("worker task panicked");
    result.expect("worker runtime errored");

    let row = dal
        .workers()
        .get(&worker.worker_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, WorkerStatus::Stopped);
    assert!(row.stopped_at.is_some());
}

#[tokio::test]
#[serial]
async fn test_shutdown_waits_for_job_in_flight() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.jobs().insert(spec("slow", "sleep 2")).await.unwrap();
    let worker = RunningWorker::spawn(store.dal());

    // Let the worker claim the job, then ask it to stop mid-execution.
    wait_for_state(&dal, "slow", JobState::Processing, Duration::from_secs(10)).await;
    let _ = worker.shutdown.send(true);

    tokio::time::timeout(Duration::from_secs(15), worker.handle)
        .await
        .expect("worker did not stop")
        .expect("worker task panicked")
        .expect("worker runtime errored");

    // The in-flight job was finalized, not abandoned.
    let job = dal.jobs().get("slow").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 1);
}
