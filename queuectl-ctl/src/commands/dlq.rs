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
use queuectl::{ops, Dal};

use crate::cli::DlqCommands;

pub async fn dispatch(dal: &Dal, cmd: DlqCommands) -> Result<()> {
    match cmd {
        DlqCommands::List => list(dal).await,
        DlqCommands::Retry { job_id } => retry(dal, &job_id).await,
    }
}

async fn list(dal: &Dal) -> Result<()> {
    let jobs = ops::dlq_list(dal).await?;
    if jobs.is_empty() {
        println!("(no jobs in DLQ)");
        return Ok(());
    }

    println!("Dead Letter Queue ({} jobs):", jobs.len());
    for job in jobs {
        println!();
        println!("  ID: {}", job.id);
        println!("  Command: {}", job.command);
        println!("  Attempts: {}/{}", job.attempts, job.max_retries);
        println!(
            "  Last Error: {}",
            job.last_error.as_deref().unwrap_or("(none)")
        );
        println!("  Created: {}", job.enqueued_at.format("%Y-%m-%dT%H:%M:%SZ"));
        if let Some(finished_at) = job.finished_at {
            println!("  Failed: {}", finished_at.format("%Y-%m-%dT%H:%M:%SZ"));
        }
    }
    Ok(())
}

async fn retry(dal: &Dal, job_id: &str) -> Result<()> {
    let job = ops::dlq_retry(dal, job_id).await?;
    println!(
        "Reset job '{}' to pending (will retry from beginning)",
        job.id
    );
    Ok(())
}
