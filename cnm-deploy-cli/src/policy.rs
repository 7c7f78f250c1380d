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

//! CNM deploy CLI prints and audits the execution role's policy documents.

use crate::rainbow::rainbow_println;
use anyhow::{anyhow, bail, Context as _, Result};
use clap::{App, AppSettings, Arg, ArgMatches};
use cnm_deploy::prelude::*;
use log::{error, warn};
use std::fs;

pub fn command(conf: &DeployConfig, matches: &ArgMatches) -> Result<()> {
    let (command, matches) = match matches.subcommand() {
        Some((command, matches)) => (command, matches),
        None => unreachable!(),
    };

    match command {
        "render" => render(conf, matches),
        "check" => check(conf, matches),
        _ => {
            warn!("{} command is not implemented", command);
            Ok(())
        }
    }
    .with_context(|| anyhow!("policy {} command failed", command))?;

    Ok(())
}

pub fn command_args() -> App<'static> {
    App::new("policy")
        .about("Prints or audits the execution role's policy documents")
        .setting(AppSettings::SubcommandRequired)
        .subcommand(
            App::new("render")
                .about("Prints a policy document generated from the configuration")
                .arg(
                    Arg::new("kind")
                        .value_name("KIND")
                        .possible_values(["trust", "execution"])
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            App::new("check")
                .about("Parses a policy document and audits it for least privilege")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .help("The JSON policy document to check")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("bucket")
                        .short('b')
                        .long("bucket")
                        .value_name("BUCKET")
                        .help("Sets the one bucket storage access is allowed on [default: from config]")
                        .takes_value(true),
                ),
        )
}

fn render(conf: &DeployConfig, matches: &ArgMatches) -> Result<()> {
    let doc = match matches.value_of("kind") {
        Some("trust") => trust_policy(cnm_deploy::infra::policy::LAMBDA_SERVICE),
        Some("execution") => execution_policy(&ExecutionGrants::from_config(conf)),
        other => bail!("unknown policy kind {:?}", other),
    };
    println!("{}", doc.to_json()?);
    Ok(())
}

fn check(conf: &DeployConfig, matches: &ArgMatches) -> Result<()> {
    let path = matches
        .value_of("file")
        .ok_or_else(|| anyhow!("No policy file provided"))?;
    let bucket = matches.value_of("bucket").unwrap_or(&conf.bucket);

    let text = fs::read_to_string(path).with_context(|| anyhow!("Failed to read {}", path))?;
    let doc = PolicyDocument::parse(&text)?;

    match doc.kind() {
        PolicyKind::Trust => {
            rainbow_println(format!(
                "[OK] {} is a well-formed trust policy ({} statements)",
                path,
                doc.statements().len()
            ));
        }
        PolicyKind::Identity => {
            let violations = audit(&doc, &conf.partition, bucket);
            if !violations.is_empty() {
                for violation in &violations {
                    error!("{}", violation);
                }
                bail!(
                    "{} grants more than the function needs ({} violations)",
                    path,
                    violations.len()
                );
            }
            rainbow_println(format!(
                "[OK] {} is least privilege on bucket {}",
                path, bucket
            ));
        }
    }
    Ok(())
}
