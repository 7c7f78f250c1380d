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

use crate::args;
use crate::manifest;
use crate::package;
use crate::policy;
use crate::publish;
use crate::rainbow::{self, rainbow_println};
use anyhow::{anyhow, Context as _, Result};
use clap::{crate_version, App, AppSettings};
use cnm_deploy::prelude::*;
use log::info;
use std::path::Path;

pub fn command_args() -> App<'static> {
    App::new("cnm-deploy")
        .version(crate_version!())
        .about("Command Line Deployment Tool for the CNM Responder")
        .author("UMD Database Group")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .args(args::get_args())
        .subcommand(package::command_args())
        .subcommand(publish::command_args())
        .subcommand(publish::deploy_command_args())
        .subcommand(manifest::command_args())
        .subcommand(policy::command_args())
}

#[tokio::main]
pub async fn main() -> Result<()> {
    let matches = command_args().get_matches();

    args::get_logging(&matches)?.init();

    let conf = DeployConfig::load(matches.value_of("config").map(Path::new))
        .with_context(|| anyhow!("Failed to load the configuration"))?;
    info!("Deploying to {} in {}", conf.function.name, conf.region);

    rainbow::set_silent(matches.is_present("silent"));
    rainbow_println(include_str!("./banner"));

    match matches.subcommand() {
        Some(("package", package_matches)) => package::command(&conf, package_matches)?,
        Some(("publish", publish_matches)) => publish::command(&conf, publish_matches).await?,
        Some(("deploy", deploy_matches)) => publish::deploy_command(&conf, deploy_matches).await?,
        Some(("manifest", manifest_matches)) => manifest::command(&conf, manifest_matches)?,
        Some(("policy", policy_matches)) => policy::command(&conf, policy_matches)?,
        _ => command_args().print_help()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_is_well_formed() {
        command_args().debug_assert();
    }

    #[test]
    fn parse_publish_targets() -> Result<()> {
        let matches = command_args().try_get_matches_from(vec![
            "cnm-deploy",
            "-c",
            "deploy.toml",
            "publish",
            "cnm-responder",
            "cnm_responder",
        ])?;
        assert_eq!(matches.value_of("config"), Some("deploy.toml"));

        let (command, publish_matches) = matches.subcommand().ok_or_else(|| anyhow!("none"))?;
        assert_eq!(command, "publish");
        assert_eq!(publish_matches.value_of("function name"), Some("cnm-responder"));
        assert_eq!(publish_matches.value_of("app name"), Some("cnm_responder"));
        Ok(())
    }

    #[test]
    fn publish_needs_both_targets() {
        let res = command_args().try_get_matches_from(vec!["cnm-deploy", "publish", "cnm-responder"]);
        assert!(res.is_err());
    }

    #[test]
    fn policy_kinds() {
        assert!(command_args()
            .try_get_matches_from(vec!["cnm-deploy", "policy", "render", "trust"])
            .is_ok());
        assert!(command_args()
            .try_get_matches_from(vec!["cnm-deploy", "policy", "render", "admin"])
            .is_err());
    }

    #[test]
    fn global_flags_after_subcommand() -> Result<()> {
        let matches = command_args().try_get_matches_from(vec![
            "cnm-deploy",
            "manifest",
            "-o",
            "main.tf.json",
            "--silent",
        ])?;
        assert!(matches.is_present("silent"));
        rainbow::set_silent(matches.is_present("silent"));
        assert!(rainbow::is_silent());
        rainbow::set_silent(false);
        let (_, manifest_matches) = matches.subcommand().ok_or_else(|| anyhow!("none"))?;
        assert_eq!(manifest_matches.value_of("output"), Some("main.tf.json"));
        Ok(())
    }
}
