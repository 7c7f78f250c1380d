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

//! Deployment error types

use std::error;
use std::fmt::{Display, Formatter};
use std::io;
use std::result;

use zip::result::ZipError;

/// Result type for operations that could result in a [DeployError]
pub type Result<T> = result::Result<T, DeployError>;

/// Deployment error
#[derive(Debug)]
pub enum DeployError {
    /// Error associated to I/O operations and associated traits.
    IoError(io::Error),
    /// Error returned when serde_json failed to serialize or deserialize data.
    SerdeJson(serde_json::Error),
    /// Error returned when the zip archive can't be written or read.
    Zip(ZipError),
    /// Error returned when the deployment package can't be assembled.
    /// Examples include a missing handler source file or a failed
    /// dependency installation.
    Package(String),
    /// Error returned when the artifact can't be handed to the provider.
    Publish(String),
    /// Error returned when the provider never confirmed a code update within
    /// the configured number of polls.
    Timeout(String),
    /// Error returned when a policy document is malformed or grants more than
    /// the function needs.
    Policy(String),
    /// Error returned when a configuration value is missing or out of range.
    Config(String),
    /// Error returned when accessing the AWS services fails.
    AWS(String),
    /// Error returned on a broken internal invariant. This error should not
    /// happen in normal usage.
    Internal(String),
}

impl From<io::Error> for DeployError {
    fn from(e: io::Error) -> Self {
        DeployError::IoError(e)
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(e: serde_json::Error) -> Self {
        DeployError::SerdeJson(e)
    }
}

impl From<ZipError> for DeployError {
    fn from(e: ZipError) -> Self {
        DeployError::Zip(e)
    }
}

impl From<&str> for DeployError {
    fn from(e: &str) -> Self {
        DeployError::Internal(e.to_string())
    }
}

impl Display for DeployError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            DeployError::IoError(ref desc) => write!(f, "IO error: {}", desc),
            DeployError::SerdeJson(ref desc) => write!(f, "serde_json error: {}", desc),
            DeployError::Zip(ref desc) => write!(f, "Zip error: {}", desc),
            DeployError::Package(ref desc) => write!(f, "Packaging error: {}", desc),
            DeployError::Publish(ref desc) => write!(f, "Publish error: {}", desc),
            DeployError::Timeout(ref desc) => write!(f, "Timed out: {}", desc),
            DeployError::Policy(ref desc) => write!(f, "Policy error: {}", desc),
            DeployError::Config(ref desc) => write!(f, "Configuration error: {}", desc),
            DeployError::AWS(ref desc) => write!(f, "AWS error: {}", desc),
            DeployError::Internal(ref desc) => write!(
                f,
                "Internal error: {}. This was likely caused by a bug in cnm-deploy's \
                    code and we would welcome that you file an bug report in our issue tracker",
                desc
            ),
        }
    }
}

impl error::Error for DeployError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            DeployError::IoError(ref e) => Some(e),
            DeployError::SerdeJson(ref e) => Some(e),
            DeployError::Zip(ref e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_source() {
        let err: DeployError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, DeployError::IoError(_)));
        assert!(error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "IO error: gone");
    }

    #[test]
    fn timeout_message() {
        let err = DeployError::Timeout("function cnm-responder still InProgress".to_owned());
        assert_eq!(
            err.to_string(),
            "Timed out: function cnm-responder still InProgress"
        );
    }
}
