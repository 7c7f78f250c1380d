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

//! This crate contains all wrapped functions of the AWS S3 service.

use crate::error::{DeployError, Result};
use async_trait::async_trait;
use rusoto_core::ByteStream;
use rusoto_s3::{PutObjectRequest, S3Client, S3};

/// Stores artifacts too large to be sent inline with a code update.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Puts an artifact to the store. If the object exists, it is
    /// overwritten.
    ///
    /// # Arguments
    /// * `bucket` - The name of the bucket to put the artifact in.
    /// * `key` - The key of the artifact.
    /// * `body` - The artifact bytes.
    ///
    /// # Returns
    /// The version of the stored object, when the bucket is versioned.
    async fn put_artifact(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<Option<String>>;
}

#[async_trait]
impl ArtifactStore for S3Client {
    async fn put_artifact(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<Option<String>> {
        self.put_object(PutObjectRequest {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            body: Some(ByteStream::from(body)),
            content_type: Some("application/zip".to_owned()),
            ..Default::default()
        })
        .await
        .map_err(|e| DeployError::AWS(e.to_string()))
        .map(|output| output.version_id)
    }
}
