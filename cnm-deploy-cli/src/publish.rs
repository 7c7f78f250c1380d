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

//! CNM deploy CLI replaces the deployed code of a function and waits for the
//! update to go live.

use crate::package;
use crate::rainbow::rainbow_println;
use anyhow::{anyhow, Context as _, Result};
use clap::{App, Arg, ArgMatches};
use cnm_deploy::prelude::*;
use rusoto_lambda::LambdaClient;
use rusoto_s3::S3Client;

pub async fn command(conf: &DeployConfig, matches: &ArgMatches) -> Result<()> {
    let (function_name, app_name) = targets(matches)?;
    run(conf, function_name, app_name).await?;
    Ok(())
}

pub fn command_args() -> App<'static> {
    target_args(
        App::new("publish")
            .about("Uploads <APP_NAME>.zip to a function and waits until the update is live"),
    )
}

pub async fn deploy_command(conf: &DeployConfig, matches: &ArgMatches) -> Result<()> {
    let (function_name, app_name) = targets(matches)?;
    package::run(conf, app_name)?;
    run(conf, function_name, app_name).await?;
    Ok(())
}

pub fn deploy_command_args() -> App<'static> {
    target_args(App::new("deploy").about("Packages <APP_NAME> then publishes it"))
}

fn target_args(app: App<'static>) -> App<'static> {
    app.arg(
        Arg::new("function name")
            .value_name("FUNCTION_NAME")
            .help("Sets the name of the function to update")
            .required(true)
            .index(1),
    )
    .arg(
        Arg::new("app name")
            .value_name("APP_NAME")
            .help("Sets the application name of the artifact")
            .required(true)
            .index(2),
    )
}

fn targets(matches: &ArgMatches) -> Result<(&str, &str)> {
    let function_name = matches
        .value_of("function name")
        .ok_or_else(|| anyhow!("No function name provided"))?;
    let app_name = matches
        .value_of("app name")
        .ok_or_else(|| anyhow!("No application name provided"))?;
    Ok((function_name, app_name))
}

/// Publishes `<APP_NAME>.zip` to `function_name`.
async fn run(conf: &DeployConfig, function_name: &str, app_name: &str) -> Result<PublishOutcome> {
    let region = region(&conf.region)?;
    let lambda = LambdaClient::new(region.clone());
    let s3 = S3Client::new(region);

    rainbow_println(format!("Publishing {} to {}...", app_name, function_name));
    let outcome = Publisher::new(&conf.package, &conf.publish, &lambda)
        .with_store(&s3)
        .publish(function_name, app_name)
        .await
        .with_context(|| anyhow!("Failed to publish {} to {}", app_name, function_name))?;

    if let Some(staged_at) = &outcome.staged_at {
        rainbow_println(format!("[OK] staged the artifact at {}", staged_at));
    }
    rainbow_println(format!(
        "[OK] {} is live (revision {}, sha256 {})",
        outcome.function_name,
        outcome.revision_id.as_deref().unwrap_or("unknown"),
        outcome.code_sha256.as_deref().unwrap_or("unknown")
    ));
    Ok(outcome)
}
