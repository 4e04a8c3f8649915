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

use anyhow::Result;
use queuectl::{ops, Dal, JobState, QueueError};

pub async fn list(dal: &Dal, state: Option<&str>) -> Result<()> {
    let filter = state
        .map(|s| s.parse::<JobState>())
        .transpose()
        .map_err(QueueError::from)?;

    let jobs = ops::list(dal, filter).await?;
    if jobs.is_empty() {
        println!("(no jobs)");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{:<24} {:<10} attempts={}/{} due={} cmd={}",
            job.id,
            job.state,
            job.attempts,
            job.max_retries,
            job.run_at.format("%Y-%m-%dT%H:%M:%SZ"),
            job.command
        );
    }
    Ok(())
}
