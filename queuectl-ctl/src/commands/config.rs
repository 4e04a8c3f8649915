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

use crate::cli::ConfigCommands;

pub async fn dispatch(dal: &Dal, cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Get => {
            for (key, value) in ops::config_get(dal).await? {
                println!("{} = {}", key, value);
            }
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            ops::config_set(dal, &key, &value).await?;
            println!("Set {} = {}", key, value);
            Ok(())
        }
    }
}
