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

//! This crate contains all wrapped functions of the AWS services the
//! publisher talks to.

pub mod lambda;
pub mod s3;

pub use lambda::{FunctionService, UpdateStatus};
pub use s3::ArtifactStore;

use crate::error::{DeployError, Result};
use rusoto_core::Region;
use std::str::FromStr;

/// Parses a region name such as `us-west-2`.
pub fn region(name: &str) -> Result<Region> {
    Region::from_str(name).map_err(|e| DeployError::Config(format!("{}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_regions() -> Result<()> {
        assert_eq!(region("us-west-2")?, Region::UsWest2);
        assert!(region("mars-north-1").is_err());
        Ok(())
    }
}
