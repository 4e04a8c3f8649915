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

//! Worker runtime: the process-local loop that claims, executes, and
//! finalizes jobs, plus the shell-command executor it drives.

pub mod executor;
pub mod runtime;

pub use executor::{CommandExecutor, CommandOutcome, OUTPUT_CAP_BYTES, TIMEOUT_EXIT_CODE};
pub use runtime::WorkerRuntime;
