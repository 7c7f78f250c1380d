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

//! The declarative infrastructure definition of the function.
//!
//! The manifest is a Terraform JSON configuration (`main.tf.json`). It only
//! describes the desired end state: Terraform's plan/apply cycle reconciles
//! it against the account. The function code itself is owned by the
//! publisher, so Terraform is told to ignore code changes.

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::infra::policy::{
    ensure_least_privilege, execution_policy, trust_policy, ExecutionGrants, PolicyDocument,
    PolicyKind, LAMBDA_SERVICE, SNS_SERVICE,
};
use log::{info, warn};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

/// The AWS provider constraint the manifest is written for.
const AWS_PROVIDER_VERSION: &str = ">= 4.0";

/// A rendered Terraform JSON configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    label:     String,
    partition: String,
    bucket:    String,
    topic_arn: Option<String>,
    document:  Value,
}

/// Turns a function name into a Terraform resource label.
fn label(function_name: &str) -> String {
    function_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

impl Manifest {
    /// Describes the role, log group, function and subscription of the
    /// configured deployment.
    pub fn from_config(conf: &DeployConfig) -> Result<Manifest> {
        let f = &conf.function;
        let name = label(&f.name);
        let trust = trust_policy(LAMBDA_SERVICE);
        let execution = execution_policy(&ExecutionGrants::from_config(conf));

        let mut role = json!({
            "name": conf.role_name,
            "assume_role_policy": trust.to_json()?,
        });
        if let Some(boundary) = &conf.permissions_boundary {
            role["permissions_boundary"] = json!(boundary);
        } else {
            warn!("The execution role has no permissions boundary");
        }

        let mut function = json!({
            "function_name": f.name,
            "role": format!("${{aws_iam_role.{}.arn}}", name),
            "handler": f.handler(),
            "runtime": f.runtime,
            "memory_size": f.memory_size,
            "timeout": f.timeout,
            "filename": conf.package.artifact(&f.app_name).display().to_string(),
            "depends_on": [
                format!("aws_cloudwatch_log_group.{}", name),
                format!("aws_iam_role_policy.{}", name),
            ],
            "lifecycle": { "ignore_changes": ["filename", "source_code_hash"] },
        });
        if !f.environment.is_empty() {
            function["environment"] = json!({ "variables": f.environment });
        }
        if conf.vpc.is_attached() {
            function["vpc_config"] = json!({
                "subnet_ids": conf.vpc.subnet_ids,
                "security_group_ids": conf.vpc.security_group_ids,
            });
        }
        if let Some(access_point_arn) = &conf.efs.access_point_arn {
            function["file_system_config"] = json!({
                "arn": access_point_arn,
                "local_mount_path": conf.efs.mount_path,
            });
        }

        let mut resources = Map::new();
        resources.insert(
            "aws_iam_role".to_owned(),
            json!({ name.clone(): role }),
        );
        resources.insert(
            "aws_iam_role_policy".to_owned(),
            json!({ name.clone(): {
                "name": format!("{}-execution", f.name),
                "role": format!("${{aws_iam_role.{}.id}}", name),
                "policy": execution.to_json()?,
            }}),
        );
        resources.insert(
            "aws_cloudwatch_log_group".to_owned(),
            json!({ name.clone(): {
                "name": format!("/aws/lambda/{}", f.name),
                "retention_in_days": conf.log_retention_days,
            }}),
        );
        resources.insert(
            "aws_lambda_function".to_owned(),
            json!({ name.clone(): function }),
        );

        match &conf.topic_arn {
            Some(topic_arn) => {
                resources.insert(
                    "aws_sns_topic_subscription".to_owned(),
                    json!({ name.clone(): {
                        "topic_arn": topic_arn,
                        "protocol": "lambda",
                        "endpoint": format!("${{aws_lambda_function.{}.arn}}", name),
                    }}),
                );
                resources.insert(
                    "aws_lambda_permission".to_owned(),
                    json!({ name.clone(): {
                        "statement_id": "AllowExecutionFromSNS",
                        "action": "lambda:InvokeFunction",
                        "function_name": format!("${{aws_lambda_function.{}.function_name}}", name),
                        "principal": SNS_SERVICE,
                        "source_arn": topic_arn,
                    }}),
                );
            }
            None => warn!("No topic configured, the function won't be subscribed"),
        }

        let document = json!({
            "terraform": {
                "required_providers": {
                    "aws": { "source": "hashicorp/aws", "version": AWS_PROVIDER_VERSION }
                }
            },
            "provider": { "aws": { "region": conf.region } },
            "resource": resources,
        });

        Ok(Manifest {
            label: name,
            partition: conf.partition.clone(),
            bucket: conf.bucket.clone(),
            topic_arn: conf.topic_arn.clone(),
            document,
        })
    }

    /// The Terraform JSON document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    fn resource(&self, kind: &str) -> Option<&Value> {
        self.document
            .get("resource")
            .and_then(|r| r.get(kind))
            .and_then(|r| r.get(&self.label))
    }

    fn embedded_policy(&self, kind: &str, attribute: &str) -> Result<PolicyDocument> {
        let text = self
            .resource(kind)
            .and_then(|r| r.get(attribute))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DeployError::Policy(format!("{}.{} has no {}", kind, self.label, attribute))
            })?;
        PolicyDocument::parse(text)
    }

    /// Parses every embedded policy back and checks the execution policy and
    /// the invoke permission stay within what the function needs.
    pub fn validate(&self) -> Result<()> {
        let trust = self.embedded_policy("aws_iam_role", "assume_role_policy")?;
        if trust.kind() != PolicyKind::Trust {
            return Err(DeployError::Policy(
                "the assume role policy names no principal".to_owned(),
            ));
        }

        let execution = self.embedded_policy("aws_iam_role_policy", "policy")?;
        if execution.kind() != PolicyKind::Identity {
            return Err(DeployError::Policy(
                "the execution policy can't name principals".to_owned(),
            ));
        }
        ensure_least_privilege(&execution, &self.partition, &self.bucket)?;

        if let Some(topic_arn) = &self.topic_arn {
            let permission = self.resource("aws_lambda_permission").ok_or_else(|| {
                DeployError::Policy("the topic isn't allowed to invoke the function".to_owned())
            })?;
            if permission["principal"] != SNS_SERVICE || permission["source_arn"] != *topic_arn {
                return Err(DeployError::Policy(format!(
                    "the invoke permission must be scoped to {} from {}",
                    SNS_SERVICE, topic_arn
                )));
            }
        }
        Ok(())
    }

    /// Pretty-printed JSON with sorted keys, stable across runs.
    pub fn render(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }

    /// Validates the manifest and writes it to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let mut text = self.render()?;
        text.push('\n');
        fs::write(path, text)?;
        info!("Wrote {}", path.display());
        Ok(())
    }
}
