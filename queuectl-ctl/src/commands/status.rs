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
use colored::Colorize;
use queuectl::{ops, Dal};
use sysinfo::{Pid, System};

pub async fn status(dal: &Dal) -> Result<()> {
    let report = ops::status(dal).await?;

    println!("Jobs:");
    for (state, count) in &report.counts {
        println!("  {:<10}: {}", state.as_str(), count);
    }
    println!("  {:<10}: {}", "total", report.total);

    println!("\nWorkers:");
    if report.workers.is_empty() {
        println!("  (none running)");
        return Ok(());
    }

    let mut system = System::new_all();
    system.refresh_all();

    for worker in &report.workers {
        let liveness = if system.process(Pid::from(worker.os_pid as usize)).is_some() {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        };
        println!(
            "  {} {} pid={} status={} hb={}",
            liveness,
            worker.id,
            worker.os_pid,
            worker.status,
            worker.heartbeat_at.format("%Y-%m-%dT%H:%M:%SZ")
        );
    }
    Ok(())
}
