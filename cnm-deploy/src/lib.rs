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

#![warn(missing_docs, clippy::needless_borrow)]
// Clippy lints, some should be disabled incrementally
#![allow(clippy::module_inception, clippy::upper_case_acronyms)]

//! Deployment tooling for the AWS Lambda function that answers CNM
//! (Cloud Notification Message) responses.
//!
//! The crate covers the three steps of a deployment:
//!
//! - [`driver::package`] builds the zip artifact out of the handler source and
//!   its installed dependencies;
//! - [`driver::publish`] replaces the function's code with the artifact and
//!   waits until Lambda reports the update live;
//! - [`infra`] describes the function, its execution role and its topic
//!   subscription as a Terraform manifest, and audits the role's policies.

pub mod aws;
pub mod config;
pub mod driver;
pub mod error;
pub mod infra;
pub mod prelude;
