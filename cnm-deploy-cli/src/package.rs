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

//! CNM deploy CLI builds the deployment artifact of the function.

use crate::rainbow::rainbow_println;
use anyhow::{anyhow, Context as _, Result};
use clap::{App, Arg, ArgMatches};
use cnm_deploy::prelude::*;

pub fn command(conf: &DeployConfig, matches: &ArgMatches) -> Result<()> {
    let app_name = matches
        .value_of("app name")
        .ok_or_else(|| anyhow!("No application name provided"))?;
    run(conf, app_name)?;
    Ok(())
}

pub fn command_args() -> App<'static> {
    App::new("package")
        .about("Zips the handler source file and its dependencies into <APP_NAME>.zip")
        .arg(
            Arg::new("app name")
                .value_name("APP_NAME")
                .help("Sets the application name, <APP_NAME>.py is the handler source file")
                .required(true)
                .index(1),
        )
}

/// Builds the artifact of `app_name`.
pub fn run(conf: &DeployConfig, app_name: &str) -> Result<Artifact> {
    let artifact = PackageBuilder::new(app_name, &conf.package)
        .build()
        .with_context(|| anyhow!("Failed to package {}", app_name))?;
    rainbow_println(format!(
        "[OK] packaged {} ({} entries, {} bytes)",
        artifact.path.display(),
        artifact.entries.len(),
        artifact.size
    ));
    Ok(artifact)
}
