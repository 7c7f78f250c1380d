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

//! This crate contains all wrapped functions of the AWS Lambda services.

use crate::error::{DeployError, Result};
use async_trait::async_trait;
use rusoto_lambda::{
    FunctionConfiguration, GetFunctionConfigurationRequest, Lambda, LambdaClient,
    UpdateFunctionCodeRequest,
};

/// The status of the last update applied to a function.
///
/// <https://docs.aws.amazon.com/lambda/latest/dg/functions-states.html>
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    /// The update completed and the new code serves invocations.
    Successful,
    /// The update failed; the previous code keeps serving invocations.
    Failed(String),
    /// The update is still being applied. Functions that never had an update
    /// report no status at all, which is treated the same way.
    InProgress,
}

impl UpdateStatus {
    /// Reads the update status out of a function configuration.
    pub fn of(conf: &FunctionConfiguration) -> Self {
        match conf.last_update_status.as_deref() {
            Some("Successful") => UpdateStatus::Successful,
            Some("Failed") => UpdateStatus::Failed(
                conf.last_update_status_reason
                    .clone()
                    .unwrap_or_else(|| "no reason given".to_owned()),
            ),
            _ => UpdateStatus::InProgress,
        }
    }
}

/// The Lambda calls the publisher depends on.
#[async_trait]
pub trait FunctionService: Send + Sync {
    /// Replaces the deployed code of a function. Lambda applies the update
    /// asynchronously: the returned configuration usually still reports
    /// `InProgress`.
    async fn update_function_code(
        &self,
        request: UpdateFunctionCodeRequest,
    ) -> Result<FunctionConfiguration>;

    /// Returns the current configuration of a function.
    async fn get_function_configuration(&self, function_name: &str)
        -> Result<FunctionConfiguration>;
}

#[async_trait]
impl FunctionService for LambdaClient {
    async fn update_function_code(
        &self,
        request: UpdateFunctionCodeRequest,
    ) -> Result<FunctionConfiguration> {
        Lambda::update_function_code(self, request)
            .await
            .map_err(|e| DeployError::AWS(e.to_string()))
    }

    async fn get_function_configuration(
        &self,
        function_name: &str,
    ) -> Result<FunctionConfiguration> {
        Lambda::get_function_configuration(
            self,
            GetFunctionConfigurationRequest {
                function_name: function_name.to_owned(),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| DeployError::AWS(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusoto_core::Region;

    fn with_status(status: Option<&str>, reason: Option<&str>) -> FunctionConfiguration {
        FunctionConfiguration {
            last_update_status: status.map(str::to_owned),
            last_update_status_reason: reason.map(str::to_owned),
            ..Default::default()
        }
    }

    #[test]
    fn update_status_mapping() {
        assert_eq!(
            UpdateStatus::of(&with_status(Some("Successful"), None)),
            UpdateStatus::Successful
        );
        assert_eq!(
            UpdateStatus::of(&with_status(Some("InProgress"), None)),
            UpdateStatus::InProgress
        );
        assert_eq!(
            UpdateStatus::of(&with_status(None, None)),
            UpdateStatus::InProgress
        );
        assert_eq!(
            UpdateStatus::of(&with_status(
                Some("Failed"),
                Some("EniLimitExceeded: too many network interfaces")
            )),
            UpdateStatus::Failed("EniLimitExceeded: too many network interfaces".to_owned())
        );
    }

    #[tokio::test]
    #[ignore]
    async fn get_configuration() -> Result<()> {
        let client = LambdaClient::new(Region::default());
        let conf = FunctionService::get_function_configuration(&client, "cnm-responder").await?;
        println!("{:?}", conf.last_update_status);
        Ok(())
    }
}
