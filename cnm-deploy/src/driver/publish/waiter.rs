// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Waits for an asynchronous function code update to take effect.
//!
//! Lambda accepts a code update immediately but applies it in the background.
//! Invocations keep hitting the previous code until `LastUpdateStatus` turns
//! `Successful`, so the publisher is only done once this waiter is.

use crate::aws::{FunctionService, UpdateStatus};
use crate::config::PublishConfig;
use crate::error::{DeployError, Result};
use log::{debug, info};
use rusoto_lambda::FunctionConfiguration;
use std::time::Duration;

/// The configuration observed once the update completed.
#[derive(Debug, Clone)]
pub struct Completed {
    /// The function configuration reporting `Successful`.
    pub configuration: FunctionConfiguration,
    /// How many polls it took.
    pub polls:         usize,
}

/// Polls the function configuration until the last update settles.
pub struct UpdateWaiter<'a> {
    service:      &'a dyn FunctionService,
    delay:        Duration,
    max_attempts: usize,
}

impl<'a> UpdateWaiter<'a> {
    /// Creates a waiter with the configured delay and number of polls.
    pub fn new(service: &'a dyn FunctionService, config: &PublishConfig) -> Self {
        Self {
            service,
            delay: config.delay,
            max_attempts: config.max_attempts,
        }
    }

    /// Blocks until the last update of `function_name` is `Successful`.
    ///
    /// Returns an error as soon as the update is reported `Failed`, when a
    /// poll itself fails, or after `max_attempts` polls that all reported the
    /// update still in progress.
    pub async fn wait(&self, function_name: &str) -> Result<Completed> {
        for attempt in 1..=self.max_attempts {
            let configuration = self.service.get_function_configuration(function_name).await?;
            match UpdateStatus::of(&configuration) {
                UpdateStatus::Successful => {
                    info!(
                        "Function {} updated after {} poll(s)",
                        function_name, attempt
                    );
                    return Ok(Completed {
                        configuration,
                        polls: attempt,
                    });
                }
                UpdateStatus::Failed(reason) => {
                    return Err(DeployError::Publish(format!(
                        "the code update of {} failed: {}",
                        function_name, reason
                    )));
                }
                UpdateStatus::InProgress => {
                    debug!(
                        "Function {} update in progress ({}/{})",
                        function_name, attempt, self.max_attempts
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        Err(DeployError::Timeout(format!(
            "the code update of {} was still in progress after {} polls",
            function_name, self.max_attempts
        )))
    }
}
