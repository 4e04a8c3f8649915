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

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "queuectl",
    version,
    about = "Durable background job queue with worker processes, retries and a DLQ",
    long_about = "Submit shell-command jobs, run worker processes that execute them \
                  with retry/backoff, and inspect or replay the dead letter queue"
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a job to the queue
    Enqueue {
        /// Job JSON: {"id"?, "command", "max_retries"?, "run_at"?, "priority"?}
        job_json: String,
    },
    /// List jobs, optionally filtered by state
    List {
        /// Only show jobs in this state (pending, processing, completed, failed, dead)
        #[arg(long)]
        state: Option<String>,
    },
    /// Show job counts and worker status
    Status,
    /// Worker process commands
    #[command(subcommand)]
    Worker(WorkerCommands),
    /// Dead letter queue operations
    #[command(subcommand)]
    Dlq(DlqCommands),
    /// Get or set configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum WorkerCommands {
    /// Start worker processes in the background
    Start {
        /// Number of workers to start
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Gracefully stop all running workers
    Stop,
    /// Run a single worker loop in the foreground (spawned by `start`)
    #[command(hide = true)]
    Run {
        /// Worker id to register as (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DlqCommands {
    /// List all jobs in the dead letter queue
    List,
    /// Requeue a dead job for execution from scratch
    Retry {
        /// Job id to retry
        job_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show all config values
    Get,
    /// Set a config value
    Set { key: String, value: String },
}
