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

//! Domain and row models for jobs, workers and config entries.
//!
//! Row structs mirror the SQLite schema (timestamps as TEXT) and are
//! converted to chrono-typed domain structs at the DAL boundary.

use chrono::{DateTime, SecondsFormat, Utc};

pub mod job;
pub mod worker;

/// Formats a timestamp for TEXT storage.
///
/// Fixed microsecond precision keeps every stored timestamp the same
/// width, which makes lexicographic comparison in SQL equivalent to
/// chronological comparison.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored TEXT timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|ts| ts.with_timezone(&Utc))
}
