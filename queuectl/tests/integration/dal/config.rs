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

//! Config service tests: defaults, round-trips, and validation.

use queuectl::{JobSpec, QueueError, ValidationError};

use crate::fixtures::TestStore;

#[tokio::test]
async fn test_defaults_present_after_init() {
    let store = TestStore::new().await;
    let cfg = store.dal().config().get().await.unwrap();

    assert_eq!(cfg.max_retries, 3);
    assert_eq!(cfg.backoff_base, 2);
    assert_eq!(cfg.poll_interval, 0.5);
    assert_eq!(cfg.job_timeout, 120);
}

#[tokio::test]
async fn test_set_round_trips() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.config().set("max_retries", "7").await.unwrap();
    dal.config().set("poll_interval", "0.25").await.unwrap();
    dal.config().set("job_timeout", "30").await.unwrap();

    let cfg = dal.config().get().await.unwrap();
    assert_eq!(cfg.max_retries, 7);
    assert_eq!(cfg.poll_interval, 0.25);
    assert_eq!(cfg.job_timeout, 30);

    // Overwrite takes effect too.
    dal.config().set("max_retries", "1").await.unwrap();
    assert_eq!(dal.config().get().await.unwrap().max_retries, 1);
}

#[tokio::test]
async fn test_new_default_applies_to_inserts() {
    let store = TestStore::new().await;
    let dal = store.dal();

    dal.config().set("max_retries", "9").await.unwrap();
    let job = dal
        .jobs()
        .insert(JobSpec {
            command: Some("true".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(job.max_retries, 9);
}

#[tokio::test]
async fn test_set_rejects_bad_values() {
    let store = TestStore::new().await;
    let dal = store.dal();

    for (key, value) in [
        ("max_retries", "several"),
        ("max_retries", "-1"),
        ("backoff_base", "2.5"),
        ("poll_interval", "-0.5"),
        ("poll_interval", "soon"),
        ("job_timeout", "-10"),
    ] {
        let err = dal.config().set(key, value).await.unwrap_err();
        assert!(
            matches!(
                err,
                QueueError::Validation(ValidationError::InvalidConfigValue { .. })
            ),
            "{}={} should be rejected",
            key,
            value
        );
    }

    let err = dal.config().set("burst_limit", "10").await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::Validation(ValidationError::UnknownConfigKey(_))
    ));

    // Nothing leaked into the typed view.
    let cfg = dal.config().get().await.unwrap();
    assert_eq!(cfg.max_retries, 3);
    assert_eq!(cfg.poll_interval, 0.5);
}
