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

//! IAM policy documents of the execution role.
//!
//! The documents are static: they are built once from the configuration,
//! serialized into the manifest, and checked back by parsing them. Nothing
//! here talks to IAM.

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};

/// The current policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";
/// The principal Lambda assumes the execution role as.
pub const LAMBDA_SERVICE: &str = "lambda.amazonaws.com";
/// The principal SNS invokes subscribed functions as.
pub const SNS_SERVICE: &str = "sns.amazonaws.com";

/// Every action the function may ever be granted. Anything else is more than
/// it needs.
const ALLOWED_ACTIONS: &[&str] = &[
    "logs:CreateLogGroup",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
    "ec2:CreateNetworkInterface",
    "ec2:DescribeNetworkInterfaces",
    "ec2:DeleteNetworkInterface",
    "ec2:AssignPrivateIpAddresses",
    "ec2:UnassignPrivateIpAddresses",
    "elasticfilesystem:ClientMount",
    "elasticfilesystem:ClientWrite",
    "s3:ListBucket",
    "s3:DeleteObject",
    "ssm:GetParameter",
    "sns:ListTopics",
    "sns:Publish",
];

/// Actions that must name the one resource they are granted on.
const SINGLE_RESOURCE_ACTIONS: &[&str] = &["ssm:GetParameter", "sns:Publish"];

/// A JSON value that is either a single item or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// `"Action": "s3:ListBucket"`
    One(T),
    /// `"Action": ["s3:ListBucket", "s3:DeleteObject"]`
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// The items as a slice.
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item),
            OneOrMany::Many(items) => items.as_slice(),
        }
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(mut items: Vec<T>) -> Self {
        if items.len() == 1 {
            OneOrMany::One(items.remove(0))
        } else {
            OneOrMany::Many(items)
        }
    }
}

/// Whether a statement grants or refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Grants the actions.
    Allow,
    /// Refuses the actions, overriding any grant.
    Deny,
}

/// Who a trust statement applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Principal {
    /// `"Principal": "*"`
    Any(String),
    /// `"Principal": {"Service": "lambda.amazonaws.com"}`
    Typed(BTreeMap<String, OneOrMany<String>>),
}

/// One statement of a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Statement {
    /// Statement identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid:          Option<String>,
    /// Allow or Deny.
    pub effect:       Effect,
    /// Present on trust (resource-based) statements only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal:    Option<Principal>,
    /// The actions the statement covers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action:       Option<OneOrMany<String>>,
    /// Every action except these.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_action:   Option<OneOrMany<String>>,
    /// The resources the actions apply to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource:     Option<OneOrMany<String>>,
    /// Every resource except these.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_resource: Option<OneOrMany<String>>,
    /// Conditions, kept as raw JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition:    Option<serde_json::Value>,
}

impl Statement {
    fn allow(sid: &str, actions: &[&str], resources: Vec<String>) -> Self {
        Statement {
            sid:          Some(sid.to_owned()),
            effect:       Effect::Allow,
            principal:    None,
            action:       Some(
                actions
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .into(),
            ),
            not_action:   None,
            resource:     Some(resources.into()),
            not_resource: None,
            condition:    None,
        }
    }

    /// The listed actions, empty when the statement uses `NotAction`.
    pub fn actions(&self) -> &[String] {
        self.action.as_ref().map(|a| a.as_slice()).unwrap_or(&[])
    }

    /// The listed resources, empty when the statement uses `NotResource`.
    pub fn resources(&self) -> &[String] {
        self.resource.as_ref().map(|r| r.as_slice()).unwrap_or(&[])
    }

    fn label(&self, index: usize) -> String {
        match &self.sid {
            Some(sid) => sid.clone(),
            None => format!("#{}", index),
        }
    }
}

/// Whether a document is attached to a role as its trust policy or as a
/// permission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Says who may assume the role; statements carry a principal.
    Trust,
    /// Says what the role may do; statements carry resources.
    Identity,
}

/// An IAM policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct PolicyDocument {
    /// The policy language version.
    pub version:   String,
    /// Optional document identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id:        Option<String>,
    /// The statements.
    pub statement: OneOrMany<Statement>,
}

impl PolicyDocument {
    /// Parses a policy document and checks it is well formed.
    pub fn parse(text: &str) -> Result<PolicyDocument> {
        let doc: PolicyDocument = serde_json::from_str(text)
            .map_err(|e| DeployError::Policy(format!("not a policy document: {}", e)))?;
        doc.validate()?;
        Ok(doc)
    }

    /// The statements of the document.
    pub fn statements(&self) -> &[Statement] {
        self.statement.as_slice()
    }

    /// A document is a trust policy when its statements name principals.
    pub fn kind(&self) -> PolicyKind {
        if self.statements().iter().any(|s| s.principal.is_some()) {
            PolicyKind::Trust
        } else {
            PolicyKind::Identity
        }
    }

    /// Checks the document is well formed for its kind.
    pub fn validate(&self) -> Result<()> {
        if self.version != POLICY_VERSION && self.version != "2008-10-17" {
            return Err(DeployError::Policy(format!(
                "unknown policy version {}",
                self.version
            )));
        }
        if self.statements().is_empty() {
            return Err(DeployError::Policy("the policy has no statement".to_owned()));
        }

        let kind = self.kind();
        let mut sids = HashSet::new();
        for (i, statement) in self.statements().iter().enumerate() {
            let label = statement.label(i);
            if let Some(sid) = &statement.sid {
                if !sids.insert(sid.as_str()) {
                    return Err(DeployError::Policy(format!("duplicate Sid {}", sid)));
                }
            }
            match (&statement.action, &statement.not_action) {
                (Some(_), None) | (None, Some(_)) => {}
                _ => {
                    return Err(DeployError::Policy(format!(
                        "statement {} needs exactly one of Action and NotAction",
                        label
                    )));
                }
            }
            let actions = statement
                .action
                .as_ref()
                .or(statement.not_action.as_ref())
                .map(|a| a.as_slice())
                .unwrap_or(&[]);
            if actions.is_empty() {
                return Err(DeployError::Policy(format!(
                    "statement {} lists no action",
                    label
                )));
            }
            if let Some(action) = actions.iter().find(|a| !is_action(a)) {
                return Err(DeployError::Policy(format!(
                    "statement {} has a malformed action {:?}",
                    label, action
                )));
            }

            match kind {
                PolicyKind::Trust => {
                    if statement.principal.is_none() {
                        return Err(DeployError::Policy(format!(
                            "trust statement {} has no Principal",
                            label
                        )));
                    }
                    if statement.resource.is_some() || statement.not_resource.is_some() {
                        return Err(DeployError::Policy(format!(
                            "trust statement {} can't name resources",
                            label
                        )));
                    }
                }
                PolicyKind::Identity => match (&statement.resource, &statement.not_resource) {
                    (Some(r), None) if !r.as_slice().is_empty() => {}
                    (None, Some(r)) if !r.as_slice().is_empty() => {}
                    _ => {
                        return Err(DeployError::Policy(format!(
                            "statement {} needs exactly one non-empty Resource or NotResource",
                            label
                        )));
                    }
                },
            }
        }
        Ok(())
    }

    /// Serializes the document the way IAM expects it.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// `*`, or `service:Action` where the action may hold `*`/`?` wildcards.
fn is_action(action: &str) -> bool {
    if action == "*" {
        return true;
    }
    match action.split_once(':') {
        Some((service, name)) => {
            !service.is_empty()
                && !name.is_empty()
                && service
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '*' || c == '?')
        }
        None => false,
    }
}

/// The trust policy letting `service` assume the role.
pub fn trust_policy(service: &str) -> PolicyDocument {
    let mut principal = BTreeMap::new();
    principal.insert("Service".to_owned(), OneOrMany::One(service.to_owned()));
    PolicyDocument {
        version:   POLICY_VERSION.to_owned(),
        id:        None,
        statement: OneOrMany::Many(vec![Statement {
            sid:          Some("AssumeExecutionRole".to_owned()),
            effect:       Effect::Allow,
            principal:    Some(Principal::Typed(principal)),
            action:       Some(OneOrMany::One("sts:AssumeRole".to_owned())),
            not_action:   None,
            resource:     None,
            not_resource: None,
            condition:    None,
        }]),
    }
}

/// What the execution role is granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionGrants {
    /// AWS partition of every ARN.
    pub partition:         String,
    /// Region of the log group.
    pub region:            String,
    /// The function whose log group is written to.
    pub function_name:     String,
    /// The one bucket staged granules are listed and deleted in.
    pub bucket:            String,
    /// Whether the function manages network interfaces in a VPC.
    pub vpc:               bool,
    /// The file system and access point mounted by the function.
    pub file_system:       Option<(String, String)>,
    /// The parameter holding the function's credentials.
    pub parameter_arn:     Option<String>,
    /// The topic failures are reported to.
    pub failure_topic_arn: Option<String>,
}

impl ExecutionGrants {
    /// The grants implied by the deployment configuration.
    pub fn from_config(conf: &DeployConfig) -> Self {
        let file_system = match (&conf.efs.file_system_arn, &conf.efs.access_point_arn) {
            (Some(fs), Some(ap)) => Some((fs.clone(), ap.clone())),
            _ => None,
        };
        ExecutionGrants {
            partition: conf.partition.clone(),
            region: conf.region.clone(),
            function_name: conf.function.name.clone(),
            bucket: conf.bucket.clone(),
            vpc: conf.vpc.is_attached(),
            file_system,
            parameter_arn: conf.parameter_arn.clone(),
            failure_topic_arn: conf.failure_topic_arn.clone(),
        }
    }

    /// ARN of the bucket itself.
    pub fn bucket_arn(&self) -> String {
        bucket_arn(&self.partition, &self.bucket)
    }

    /// ARN of the function's log group.
    pub fn log_group_arn(&self) -> String {
        format!(
            "arn:{}:logs:{}:*:log-group:/aws/lambda/{}:*",
            self.partition, self.region, self.function_name
        )
    }
}

/// ARN of a bucket.
pub fn bucket_arn(partition: &str, bucket: &str) -> String {
    format!("arn:{}:s3:::{}", partition, bucket)
}

/// The least-privilege permission policy of the execution role.
pub fn execution_policy(grants: &ExecutionGrants) -> PolicyDocument {
    let mut statements = vec![Statement::allow(
        "WriteLogs",
        &["logs:CreateLogStream", "logs:PutLogEvents"],
        vec![grants.log_group_arn()],
    )];

    if grants.vpc {
        // EC2 doesn't support resource-level permissions on these actions.
        statements.push(Statement::allow(
            "ManageNetworkInterfaces",
            &[
                "ec2:CreateNetworkInterface",
                "ec2:DescribeNetworkInterfaces",
                "ec2:DeleteNetworkInterface",
                "ec2:AssignPrivateIpAddresses",
                "ec2:UnassignPrivateIpAddresses",
            ],
            vec!["*".to_owned()],
        ));
    }

    if let Some((file_system_arn, access_point_arn)) = &grants.file_system {
        let mut statement = Statement::allow(
            "MountFileSystem",
            &["elasticfilesystem:ClientMount", "elasticfilesystem:ClientWrite"],
            vec![file_system_arn.clone()],
        );
        statement.condition = Some(json!({
            "StringEquals": { "elasticfilesystem:AccessPointArn": access_point_arn }
        }));
        statements.push(statement);
    }

    statements.push(Statement::allow(
        "ListStagedGranules",
        &["s3:ListBucket"],
        vec![grants.bucket_arn()],
    ));
    statements.push(Statement::allow(
        "DeleteStagedGranules",
        &["s3:DeleteObject"],
        vec![format!("{}/*", grants.bucket_arn())],
    ));

    if let Some(parameter_arn) = &grants.parameter_arn {
        statements.push(Statement::allow(
            "ReadToken",
            &["ssm:GetParameter"],
            vec![parameter_arn.clone()],
        ));
    }
    if let Some(topic_arn) = &grants.failure_topic_arn {
        // The handler looks the topic up by name, and SNS has no
        // resource-level permissions on listing.
        statements.push(Statement::allow(
            "FindFailureTopic",
            &["sns:ListTopics"],
            vec!["*".to_owned()],
        ));
        statements.push(Statement::allow(
            "ReportFailures",
            &["sns:Publish"],
            vec![topic_arn.clone()],
        ));
    }

    PolicyDocument {
        version:   POLICY_VERSION.to_owned(),
        id:        None,
        statement: OneOrMany::Many(statements),
    }
}

/// A grant broader than the function needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The offending statement, by Sid or position.
    pub statement: String,
    /// What is wrong with it.
    pub message:   String,
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "statement {}: {}", self.statement, self.message)
    }
}

/// The segments of `arn:partition:service:region:account:resource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Arn<'a> {
    partition: &'a str,
    service:   &'a str,
    region:    &'a str,
    account:   &'a str,
    resource:  &'a str,
}

impl<'a> Arn<'a> {
    /// A bare `*` stands for every segment.
    fn parse(text: &'a str) -> Option<Arn<'a>> {
        if text == "*" {
            return Some(Arn {
                partition: "*",
                service:   "*",
                region:    "*",
                account:   "*",
                resource:  "*",
            });
        }
        let mut parts = text.splitn(6, ':');
        if parts.next()? != "arn" {
            return None;
        }
        Some(Arn {
            partition: parts.next()?,
            service:   parts.next()?,
            region:    parts.next()?,
            account:   parts.next()?,
            resource:  parts.next()?,
        })
    }

    /// Whether the ARN may name an S3 bucket or object.
    fn is_storage(&self) -> bool {
        self.service == "s3" || has_wildcard(self.service)
    }

    /// Whether any segment in front of the resource is a pattern.
    fn has_wildcard_scope(&self) -> bool {
        [self.partition, self.service, self.region, self.account]
            .iter()
            .any(|segment| has_wildcard(segment))
    }
}

fn has_wildcard(text: &str) -> bool {
    text.contains('*') || text.contains('?')
}

/// Checks every `Allow` statement of a permission policy against the
/// function's least-privilege envelope.
///
/// Storage access is limited to `s3:ListBucket` on `bucket` and
/// `s3:DeleteObject` on objects of `bucket`. A storage resource is any ARN
/// whose service is `s3` or a pattern, `*` included. It is a wildcard when
/// its partition, service, region, account or bucket name holds `*` or `?`;
/// wildcards in object keys of the one bucket are fine. `ssm:GetParameter`
/// and `sns:Publish` must name their one parameter or topic.
pub fn audit(doc: &PolicyDocument, partition: &str, bucket: &str) -> Vec<Violation> {
    let bucket_arn = bucket_arn(partition, bucket);
    let mut violations = vec![];

    for (i, statement) in doc.statements().iter().enumerate() {
        if statement.effect != Effect::Allow {
            continue;
        }
        let mut flag = |message: String| {
            violations.push(Violation {
                statement: statement.label(i),
                message,
            })
        };

        if statement.not_action.is_some() {
            flag("NotAction grants every other action".to_owned());
        }
        if statement.not_resource.is_some() {
            flag("NotResource grants every other resource".to_owned());
        }

        let mut storage_actions = vec![];
        let mut scoped_actions = vec![];
        for action in statement.actions() {
            if action == "*" || action.ends_with(":*") {
                flag(format!("{} grants every action of the service", action));
            } else if has_wildcard(action) {
                flag(format!("{} is a wildcard action", action));
            } else if !ALLOWED_ACTIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(action))
            {
                flag(format!("{} is not needed by the function", action));
            }
            if action.to_ascii_lowercase().starts_with("s3:") || action == "*" {
                storage_actions.push(action.to_ascii_lowercase());
            }
            if SINGLE_RESOURCE_ACTIONS
                .iter()
                .any(|scoped| scoped.eq_ignore_ascii_case(action))
            {
                scoped_actions.push(action.as_str());
            }
        }

        for resource in statement.resources() {
            if has_wildcard(resource) {
                for action in &scoped_actions {
                    flag(format!("{} must target one resource, not {}", action, resource));
                }
            }
            if storage_actions.is_empty() {
                continue;
            }

            let arn = match Arn::parse(resource) {
                Some(arn) if arn.is_storage() => arn,
                _ => {
                    flag(format!("{} is outside of bucket {}", resource, bucket));
                    continue;
                }
            };
            let bucket_part = arn.resource.split('/').next().unwrap_or_default();
            if arn.has_wildcard_scope() || has_wildcard(bucket_part) {
                flag(format!("{} is a wildcard storage resource", resource));
                continue;
            }
            if arn.partition != partition
                || !arn.region.is_empty()
                || !arn.account.is_empty()
                || bucket_part != bucket
            {
                flag(format!("{} is outside of bucket {}", resource, bucket));
                continue;
            }
            for action in &storage_actions {
                match action.as_str() {
                    "s3:listbucket" if resource != &bucket_arn => flag(format!(
                        "s3:ListBucket must target {} only, not {}",
                        bucket_arn, resource
                    )),
                    "s3:deleteobject" if !resource.starts_with(&format!("{}/", bucket_arn)) => {
                        flag(format!(
                            "s3:DeleteObject must target objects of {}, not {}",
                            bucket_arn, resource
                        ))
                    }
                    _ => {}
                }
            }
        }
    }

    violations
}

/// Audits `doc` and turns any violation into an error.
pub fn ensure_least_privilege(doc: &PolicyDocument, partition: &str, bucket: &str) -> Result<()> {
    let violations = audit(doc, partition, bucket);
    if violations.is_empty() {
        return Ok(());
    }
    Err(DeployError::Policy(
        violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; "),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn grants() -> ExecutionGrants {
        ExecutionGrants {
            partition:         "aws".to_owned(),
            region:            "us-west-2".to_owned(),
            function_name:     "cnm-responder".to_owned(),
            bucket:            "sst-l2p-granules".to_owned(),
            vpc:               true,
            file_system:       Some((
                "arn:aws:elasticfilesystem:us-west-2:123456789012:file-system/fs-1".to_owned(),
                "arn:aws:elasticfilesystem:us-west-2:123456789012:access-point/fsap-1".to_owned(),
            )),
            parameter_arn:     Some(
                "arn:aws:ssm:us-west-2:123456789012:parameter/sst-edl-token".to_owned(),
            ),
            failure_topic_arn: Some(
                "arn:aws:sns:us-west-2:123456789012:sst-batch-job-failure".to_owned(),
            ),
        }
    }

    #[test]
    fn trust_policy_is_scoped_to_lambda() -> Result<()> {
        let doc = PolicyDocument::parse(&trust_policy(LAMBDA_SERVICE).to_json()?)?;
        assert_eq!(doc.kind(), PolicyKind::Trust);
        let statement = &doc.statements()[0];
        assert_eq!(statement.actions().to_vec(), vec!["sts:AssumeRole".to_owned()]);
        match &statement.principal {
            Some(Principal::Typed(map)) => {
                assert_eq!(map["Service"].as_slice().to_vec(), vec![LAMBDA_SERVICE.to_owned()]);
            }
            other => panic!("unexpected principal {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn storage_grants_stay_inside_one_bucket() -> Result<()> {
        let doc = PolicyDocument::parse(&execution_policy(&grants()).to_json()?)?;
        assert_eq!(doc.kind(), PolicyKind::Identity);
        assert!(audit(&doc, "aws", "sst-l2p-granules").is_empty());

        let mut storage = vec![];
        for statement in doc.statements() {
            for action in statement.actions().iter().filter(|a| a.starts_with("s3:")) {
                for resource in statement.resources() {
                    storage.push((action.clone(), resource.clone()));
                }
            }
        }
        assert_eq!(
            storage,
            vec![
                (
                    "s3:ListBucket".to_owned(),
                    "arn:aws:s3:::sst-l2p-granules".to_owned()
                ),
                (
                    "s3:DeleteObject".to_owned(),
                    "arn:aws:s3:::sst-l2p-granules/*".to_owned()
                ),
            ]
        );
        assert!(doc
            .statements()
            .iter()
            .flat_map(|s| s.resources())
            .all(|r| r != "arn:aws:s3:::*"));
        Ok(())
    }

    #[test]
    fn optional_grants_follow_the_configuration() {
        let mut minimal = grants();
        minimal.vpc = false;
        minimal.file_system = None;
        minimal.parameter_arn = None;
        minimal.failure_topic_arn = None;

        let sids = |doc: &PolicyDocument| {
            doc.statements()
                .iter()
                .filter_map(|s| s.sid.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(
            sids(&execution_policy(&minimal)),
            vec!["WriteLogs", "ListStagedGranules", "DeleteStagedGranules"]
        );
        assert_eq!(
            sids(&execution_policy(&grants())),
            vec![
                "WriteLogs",
                "ManageNetworkInterfaces",
                "MountFileSystem",
                "ListStagedGranules",
                "DeleteStagedGranules",
                "ReadToken",
                "FindFailureTopic",
                "ReportFailures",
            ]
        );

        let doc = execution_policy(&grants());
        let listing = doc
            .statements()
            .iter()
            .find(|s| s.sid.as_deref() == Some("FindFailureTopic"))
            .unwrap();
        assert_eq!(listing.actions().to_vec(), vec!["sns:ListTopics".to_owned()]);
        assert_eq!(listing.resources().to_vec(), vec!["*".to_owned()]);
        assert!(audit(&doc, "aws", "sst-l2p-granules").is_empty());
    }

    #[test]
    fn flags_broad_storage_access() -> Result<()> {
        let doc = PolicyDocument::parse(indoc! {r#"
            {
              "Version": "2012-10-17",
              "Statement": [
                {
                  "Sid": "Everything",
                  "Effect": "Allow",
                  "Action": "s3:*",
                  "Resource": "arn:aws:s3:::*"
                },
                {
                  "Sid": "Read",
                  "Effect": "Allow",
                  "Action": ["s3:GetObject", "s3:DeleteObject"],
                  "Resource": "arn:aws:s3:::other-bucket/*"
                },
                {
                  "Sid": "Refuse",
                  "Effect": "Deny",
                  "Action": "s3:*",
                  "Resource": "*"
                }
              ]
            }
        "#})?;

        let violations = audit(&doc, "aws", "sst-l2p-granules");
        let messages = violations.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        assert_eq!(
            messages,
            vec![
                "statement Everything: s3:* grants every action of the service",
                "statement Everything: arn:aws:s3:::* is a wildcard storage resource",
                "statement Read: s3:GetObject is not needed by the function",
                "statement Read: arn:aws:s3:::other-bucket/* is outside of bucket sst-l2p-granules",
            ]
        );
        assert!(ensure_least_privilege(&doc, "aws", "sst-l2p-granules").is_err());
        Ok(())
    }

    #[test]
    fn flags_star_resource_and_misplaced_list() -> Result<()> {
        let doc = PolicyDocument::parse(indoc! {r#"
            {
              "Version": "2012-10-17",
              "Statement": {
                "Effect": "Allow",
                "Action": ["s3:ListBucket", "s3:DeleteObject"],
                "Resource": ["*", "arn:aws:s3:::sst-l2p-granules/*"]
              }
            }
        "#})?;

        let messages = audit(&doc, "aws", "sst-l2p-granules")
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            messages,
            vec![
                "statement #0: * is a wildcard storage resource",
                "statement #0: s3:ListBucket must target arn:aws:s3:::sst-l2p-granules only, \
                 not arn:aws:s3:::sst-l2p-granules/*",
            ]
        );
        Ok(())
    }

    #[test]
    fn network_actions_on_star_are_fine() -> Result<()> {
        let mut vpc_only = grants();
        vpc_only.file_system = None;
        let doc = execution_policy(&vpc_only);
        assert!(ensure_least_privilege(&doc, "aws", "sst-l2p-granules").is_ok());
        Ok(())
    }

    #[test]
    fn rejects_malformed_documents() {
        let cases = [
            r#"{"Version": "2012-10-17", "Statement": []}"#,
            r#"{"Version": "2020-01-01", "Statement": [{"Effect": "Allow", "Action": "s3:ListBucket", "Resource": "*"}]}"#,
            r#"{"Version": "2012-10-17", "Statement": [{"Effect": "Allow", "Action": "ListBucket", "Resource": "*"}]}"#,
            r#"{"Version": "2012-10-17", "Statement": [{"Effect": "Allow", "Action": "s3:ListBucket"}]}"#,
            r#"{"Version": "2012-10-17", "Statement": [{"Effect": "Maybe", "Action": "s3:ListBucket", "Resource": "*"}]}"#,
            r#"{"Version": "2012-10-17", "Statement": [{"Effect": "Allow", "Principal": {"Service": "lambda.amazonaws.com"}, "Action": "sts:AssumeRole", "Resource": "*"}]}"#,
            r#"{"Version": "2012-10-17", "Statement": [{"Sid": "A", "Effect": "Allow", "Action": "s3:ListBucket", "Resource": "*"}, {"Sid": "A", "Effect": "Allow", "Action": "s3:DeleteObject", "Resource": "*"}]}"#,
            r#"{"Version": "2012-10-17", "Statement": [{"Effect": "Allow", "Action": "s3:ListBucket", "Resource": "*", "Extra": 1}]}"#,
            r#"not json"#,
        ];
        for case in cases {
            let err = PolicyDocument::parse(case).unwrap_err();
            assert!(matches!(err, DeployError::Policy(_)), "{}", case);
        }
    }

    #[test]
    fn not_action_is_a_violation() -> Result<()> {
        let doc = PolicyDocument::parse(
            r#"{"Version": "2012-10-17", "Statement": [{"Sid": "Rest", "Effect": "Allow", "NotAction": "iam:*", "Resource": "arn:aws:logs:us-west-2:*:log-group:x:*"}]}"#,
        )?;
        let violations = audit(&doc, "aws", "sst-l2p-granules");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].statement, "Rest");
        Ok(())
    }

    fn messages(doc: &PolicyDocument) -> Vec<String> {
        audit(doc, "aws", "sst-l2p-granules")
            .iter()
            .map(|v| v.to_string())
            .collect()
    }

    #[test]
    fn wildcards_in_any_storage_arn_segment() -> Result<()> {
        let doc = PolicyDocument::parse(indoc! {r#"
            {
              "Version": "2012-10-17",
              "Statement": [
                {
                  "Sid": "AnyPartition",
                  "Effect": "Allow",
                  "Action": ["s3:DeleteObject", "s3:ListBucket"],
                  "Resource": ["arn:*:s3:::*", "arn:aws:s3:*:*:*"]
                },
                {
                  "Sid": "AnyService",
                  "Effect": "Allow",
                  "Action": "s3:DeleteObject",
                  "Resource": "arn:aws:*:::sst-l2p-granules/*"
                },
                {
                  "Sid": "AnyAccount",
                  "Effect": "Allow",
                  "Action": "s3:ListBucket",
                  "Resource": "arn:aws:s3::12345678901?:sst-l2p-granules"
                }
              ]
            }
        "#})?;

        assert_eq!(
            messages(&doc),
            vec![
                "statement AnyPartition: arn:*:s3:::* is a wildcard storage resource",
                "statement AnyPartition: arn:aws:s3:*:*:* is a wildcard storage resource",
                "statement AnyService: arn:aws:*:::sst-l2p-granules/* is a wildcard storage \
                 resource",
                "statement AnyAccount: arn:aws:s3::12345678901?:sst-l2p-granules is a wildcard \
                 storage resource",
            ]
        );
        Ok(())
    }

    #[test]
    fn storage_actions_on_other_resources() -> Result<()> {
        let doc = PolicyDocument::parse(indoc! {r#"
            {
              "Version": "2012-10-17",
              "Statement": [
                {
                  "Sid": "Logs",
                  "Effect": "Allow",
                  "Action": "s3:DeleteObject",
                  "Resource": "arn:aws:logs:us-west-2:123456789012:log-group:x"
                },
                {
                  "Sid": "OtherPartition",
                  "Effect": "Allow",
                  "Action": "s3:ListBucket",
                  "Resource": "arn:aws-cn:s3:::sst-l2p-granules"
                }
              ]
            }
        "#})?;

        assert_eq!(
            messages(&doc),
            vec![
                "statement Logs: arn:aws:logs:us-west-2:123456789012:log-group:x is outside of \
                 bucket sst-l2p-granules",
                "statement OtherPartition: arn:aws-cn:s3:::sst-l2p-granules is outside of \
                 bucket sst-l2p-granules",
            ]
        );
        Ok(())
    }

    #[test]
    fn token_and_topic_grants_name_one_resource() -> Result<()> {
        let doc = PolicyDocument::parse(indoc! {r#"
            {
              "Version": "2012-10-17",
              "Statement": [
                {
                  "Sid": "AnyParameter",
                  "Effect": "Allow",
                  "Action": "ssm:GetParameter",
                  "Resource": "*"
                },
                {
                  "Sid": "AnyTopic",
                  "Effect": "Allow",
                  "Action": ["sns:ListTopics", "sns:Publish"],
                  "Resource": "arn:aws:sns:us-west-2:123456789012:*"
                }
              ]
            }
        "#})?;

        assert_eq!(
            messages(&doc),
            vec![
                "statement AnyParameter: ssm:GetParameter must target one resource, not *",
                "statement AnyTopic: sns:Publish must target one resource, not \
                 arn:aws:sns:us-west-2:123456789012:*",
            ]
        );
        Ok(())
    }
}
