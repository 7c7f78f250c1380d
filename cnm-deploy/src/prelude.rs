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

//! A "prelude" for users of the cnm-deploy crate.
//!
//! Like the standard library's prelude, this module simplifies importing of
//! common items. Unlike the standard prelude, the contents of this module must
//! be imported manually:
//!
//! ```
//! use cnm_deploy::prelude::*;
//! ```

pub use crate::aws::{region, ArtifactStore, FunctionService, UpdateStatus};
pub use crate::config::{DeployConfig, PackageConfig, PublishConfig};
pub use crate::driver::package::{
    read_entries, Artifact, DependencyInstaller, PackageBuilder, PipInstaller,
};
pub use crate::driver::publish::{PublishOutcome, Publisher};
pub use crate::error::{DeployError, Result};
pub use crate::infra::policy::{ensure_least_privilege, ExecutionGrants, PolicyKind};
pub use crate::infra::{audit, execution_policy, trust_policy, Manifest, PolicyDocument, Violation};
