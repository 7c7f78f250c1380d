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

//! The artifact publisher replaces the deployed code of a function with a
//! previously built artifact and returns once Lambda confirms the update.

pub mod waiter;

use crate::aws::{ArtifactStore, FunctionService};
use crate::config::{PackageConfig, PublishConfig};
use crate::driver::package::validate_app_name;
use crate::error::{DeployError, Result};
use bytes::Bytes;
use log::info;
use rusoto_lambda::UpdateFunctionCodeRequest;
use std::fs;
use waiter::UpdateWaiter;

/// What a successful publish left deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// The updated function.
    pub function_name: String,
    /// The revision of the function after the update.
    pub revision_id:   Option<String>,
    /// Base64 SHA-256 of the deployed code, as reported by Lambda.
    pub code_sha256:   Option<String>,
    /// Where the artifact was staged, when it was too large to send inline.
    pub staged_at:     Option<String>,
    /// How many update-status polls it took.
    pub polls:         usize,
}

/// Publishes artifacts built by the package builder.
pub struct Publisher<'a> {
    package:   &'a PackageConfig,
    publish:   &'a PublishConfig,
    functions: &'a dyn FunctionService,
    store:     Option<&'a dyn ArtifactStore>,
}

impl<'a> Publisher<'a> {
    /// Creates a publisher that can only send artifacts inline.
    pub fn new(
        package: &'a PackageConfig,
        publish: &'a PublishConfig,
        functions: &'a dyn FunctionService,
    ) -> Self {
        Self {
            package,
            publish,
            functions,
            store: None,
        }
    }

    /// Sets the store large artifacts are staged to.
    pub fn with_store(mut self, store: &'a dyn ArtifactStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the code of `function_name` with `<output_dir>/<app_name>.zip`
    /// and waits until the update is live.
    ///
    /// No provider call is made when the artifact is missing.
    pub async fn publish(&self, function_name: &str, app_name: &str) -> Result<PublishOutcome> {
        if function_name.is_empty() {
            return Err(DeployError::Publish("no function name provided".to_owned()));
        }
        validate_app_name(app_name)?;

        let artifact = self.package.artifact(app_name);
        if !artifact.is_file() {
            return Err(DeployError::Publish(format!(
                "the artifact ({}) doesn't exist, package {} first",
                artifact.display(),
                app_name
            )));
        }
        let body = fs::read(&artifact)?;
        info!(
            "Publishing {} ({} bytes) to {}",
            artifact.display(),
            body.len(),
            function_name
        );

        let mut staged_at = None;
        let mut request = UpdateFunctionCodeRequest {
            function_name: function_name.to_owned(),
            ..Default::default()
        };
        if body.len() as u64 <= self.publish.direct_upload_limit {
            request.zip_file = Some(Bytes::from(body));
        } else {
            let (bucket, store) = match (&self.publish.code_bucket, self.store) {
                (Some(bucket), Some(store)) => (bucket, store),
                _ => {
                    return Err(DeployError::Publish(format!(
                        "the artifact is {} bytes, over the {} bytes inline limit, and no \
                         code bucket is configured to stage it",
                        body.len(),
                        self.publish.direct_upload_limit
                    )));
                }
            };
            let key = staging_key(&self.publish.code_prefix, app_name);
            info!("Staging the artifact to s3://{}/{}", bucket, key);
            let version = store.put_artifact(bucket, &key, body).await?;
            staged_at = Some(format!("s3://{}/{}", bucket, key));
            request.s3_bucket = Some(bucket.clone());
            request.s3_key = Some(key);
            request.s3_object_version = version;
        }

        let submitted = self.functions.update_function_code(request).await?;
        info!(
            "Code update of {} submitted (revision {})",
            function_name,
            submitted.revision_id.as_deref().unwrap_or("unknown")
        );

        let completed = UpdateWaiter::new(self.functions, self.publish)
            .wait(function_name)
            .await?;

        Ok(PublishOutcome {
            function_name: function_name.to_owned(),
            revision_id: completed.configuration.revision_id,
            code_sha256: completed.configuration.code_sha_256,
            staged_at,
            polls: completed.polls,
        })
    }
}

/// `<prefix>/<app_name>.zip`, or just `<app_name>.zip` with no prefix.
fn staging_key(prefix: &str, app_name: &str) -> String {
    match prefix.trim_matches('/') {
        "" => format!("{}.zip", app_name),
        prefix => format!("{}/{}.zip", prefix, app_name),
    }
}
