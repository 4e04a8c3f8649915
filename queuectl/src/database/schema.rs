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

//! Diesel schema for the three queue relations.
//!
//! Timestamps are stored as fixed-width RFC-3339 UTC TEXT (see
//! [`crate::models::format_timestamp`]) so that TEXT comparisons in SQL
//! match chronological order.

diesel::table! {
    jobs (id) {
        id -> Text,
        command -> Text,
        state -> Text,
        priority -> Integer,
        attempts -> Integer,
        max_retries -> Integer,
        run_at -> Text,
        enqueued_at -> Text,
        started_at -> Nullable<Text>,
        finished_at -> Nullable<Text>,
        picked_by -> Nullable<Text>,
        last_error -> Nullable<Text>,
        stdout -> Nullable<Text>,
        stderr -> Nullable<Text>,
        exit_code -> Nullable<Integer>,
        updated_at -> Text,
    }
}

diesel::table! {
    workers (id) {
        id -> Text,
        os_pid -> Integer,
        status -> Text,
        host -> Text,
        started_at -> Text,
        heartbeat_at -> Text,
        stopped_at -> Nullable<Text>,
    }
}

diesel::table! {
    config (key) {
        key -> Text,
        value -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(jobs, workers, config);
