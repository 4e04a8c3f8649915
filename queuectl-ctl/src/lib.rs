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

//! Command-line control plane for the QueueCTL engine.
//!
//! Maps argv onto the engine's control operations and renders results.
//! Validation failures exit with code 2; everything else that fails
//! exits 1.

pub mod cli;
pub mod commands;

use queuectl::{QueueError, ValidationError};

/// Maps an error to the process exit code the CLI contract promises.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    let validation = match error.downcast_ref::<QueueError>() {
        Some(QueueError::Validation(_)) => true,
        Some(_) => false,
        None => error.downcast_ref::<ValidationError>().is_some(),
    };
    if validation {
        2
    } else {
        1
    }
}

/// Tracing filter directive for the global verbosity flags.
pub fn log_directive(cli: &cli::Cli) -> &'static str {
    if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    }
}
