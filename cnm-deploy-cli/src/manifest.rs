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

//! CNM deploy CLI renders the Terraform manifest of the function.

use crate::rainbow::rainbow_println;
use anyhow::{anyhow, Context as _, Result};
use clap::{App, Arg, ArgMatches};
use cnm_deploy::prelude::*;
use std::path::Path;

pub fn command(conf: &DeployConfig, matches: &ArgMatches) -> Result<()> {
    let manifest = Manifest::from_config(conf)?;
    match matches.value_of("output") {
        Some(path) => {
            manifest
                .write(Path::new(path))
                .with_context(|| anyhow!("Failed to write {}", path))?;
            rainbow_println(format!("[OK] wrote {}", path));
        }
        None => {
            manifest.validate()?;
            println!("{}", manifest.render()?);
        }
    }
    Ok(())
}

pub fn command_args() -> App<'static> {
    App::new("manifest")
        .about("Validates and renders the Terraform JSON manifest of the function")
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Writes the manifest to FILE (e.g. main.tf.json) instead of stdout")
                .takes_value(true),
        )
}
