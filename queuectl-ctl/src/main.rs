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

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use queuectl::{Dal, Database};
use queuectl_ctl::cli::{Cli, Commands};
use queuectl_ctl::{commands, exit_code_for, log_directive};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    queuectl::init_logging(Some(log_directive(&cli)));

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(exit_code_for(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let database = Database::new(&queuectl::default_database_url());
    database
        .run_migrations()
        .await
        .context("Failed to initialize the store")?;
    let dal = Dal::new(database);

    match cli.command {
        Commands::Enqueue { job_json } => commands::enqueue::enqueue(&dal, &job_json).await,
        Commands::List { state } => commands::list::list(&dal, state.as_deref()).await,
        Commands::Status => commands::status::status(&dal).await,
        Commands::Worker(cmd) => commands::worker::dispatch(dal, cmd).await,
        Commands::Dlq(cmd) => commands::dlq::dispatch(&dal, cmd).await,
        Commands::Config(cmd) => commands::config::dispatch(&dal, cmd).await,
    }
}
