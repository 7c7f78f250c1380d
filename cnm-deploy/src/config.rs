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

//! Configuration settings for packaging, publishing and describing the
//! function.
//!
//! The defaults are compiled in from `config.toml`. A user file only needs to
//! carry the keys it changes; everything else falls back to the defaults.

use crate::error::{DeployError, Result};
use humantime::parse_duration;
use ini::Ini;
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static! {
    /// Global default settings.
    pub static ref CNM_CONF: Ini = Ini::load_from_str(include_str!("./config.toml")).unwrap();
}

/// Settings of the package builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageConfig {
    /// Directory holding `<app_name>.<extension>` and the requirements file.
    pub source_dir:   PathBuf,
    /// Scratch directory the dependencies are installed into. It is wiped at
    /// the start of every build.
    pub build_dir:    PathBuf,
    /// Directory the `<app_name>.zip` artifact is written to.
    pub output_dir:   PathBuf,
    /// Dependency list handed to the installer, relative to `source_dir`.
    pub requirements: PathBuf,
    /// Extension of the handler source file, without the dot.
    pub extension:    String,
    /// Program used to install the dependencies (`pip3` by default).
    pub installer:    String,
}

impl PackageConfig {
    /// Path of the handler source file for the given application.
    pub fn source_file(&self, app_name: &str) -> PathBuf {
        self.source_dir
            .join(format!("{}.{}", app_name, self.extension))
    }

    /// Path of the requirements file.
    pub fn requirements_file(&self) -> PathBuf {
        self.source_dir.join(&self.requirements)
    }

    /// Path of the deployment artifact for the given application.
    pub fn artifact(&self, app_name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.zip", app_name))
    }
}

/// Settings of the deployed function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionConfig {
    /// The function name.
    pub name:        String,
    /// The application (module) name the handler lives in.
    pub app_name:    String,
    /// The entry point inside the application module.
    pub entry_point: String,
    /// The Lambda runtime identifier, e.g. `python3.9`.
    pub runtime:     String,
    /// Memory size in MB.
    pub memory_size: i64,
    /// Timeout in seconds.
    pub timeout:     i64,
    /// Environment variables of the function.
    pub environment: BTreeMap<String, String>,
}

impl FunctionConfig {
    /// The handler string Lambda resolves, `<module>.<entry point>`.
    pub fn handler(&self) -> String {
        format!("{}.{}", self.app_name, self.entry_point)
    }
}

/// Settings of the artifact publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    /// Pause between two update-status polls.
    pub delay:               Duration,
    /// Number of polls before the update is considered stuck.
    pub max_attempts:        usize,
    /// Largest artifact sent inline with the update request. Bigger artifacts
    /// are staged to `code_bucket` first.
    pub direct_upload_limit: u64,
    /// Bucket used to stage artifacts over the inline limit.
    pub code_bucket:         Option<String>,
    /// Key prefix of staged artifacts.
    pub code_prefix:         String,
}

/// Private network attachment of the function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VpcConfig {
    /// Subnets the function's network interfaces are placed in.
    pub subnet_ids:         Vec<String>,
    /// Security groups attached to those interfaces.
    pub security_group_ids: Vec<String>,
}

impl VpcConfig {
    /// Whether the function is attached to a VPC.
    pub fn is_attached(&self) -> bool {
        !self.subnet_ids.is_empty()
    }
}

/// Shared filesystem mount of the function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EfsConfig {
    /// ARN of the file system the client actions are granted on.
    pub file_system_arn:  Option<String>,
    /// ARN of the access point the function mounts.
    pub access_point_arn: Option<String>,
    /// Local mount path inside the function, must live under `/mnt/`.
    pub mount_path:       String,
}

impl EfsConfig {
    /// Whether the function mounts the file system.
    pub fn is_mounted(&self) -> bool {
        self.access_point_arn.is_some()
    }
}

/// The whole deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    /// `[package]`
    pub package:              PackageConfig,
    /// `[function]`
    pub function:             FunctionConfig,
    /// `[publish]`
    pub publish:              PublishConfig,
    /// AWS region the resources live in.
    pub region:               String,
    /// AWS partition, `aws` outside of China and GovCloud.
    pub partition:            String,
    /// Name of the execution role.
    pub role_name:            String,
    /// ARN of the managed policy bounding the execution role.
    pub permissions_boundary: Option<String>,
    /// `[vpc]`
    pub vpc:                  VpcConfig,
    /// `[efs]`
    pub efs:                  EfsConfig,
    /// The single bucket the function lists and deletes staged granules in.
    pub bucket:               String,
    /// Topic the function subscribes to.
    pub topic_arn:            Option<String>,
    /// Topic the function reports failures to.
    pub failure_topic_arn:    Option<String>,
    /// Parameter the function reads its credentials from.
    pub parameter_arn:        Option<String>,
    /// Retention of the function's log group in days.
    pub log_retention_days:   i64,
}

/// Looks a key up in the user settings first, then in the defaults.
struct Settings<'a> {
    user: Option<&'a Ini>,
}

impl<'a> Settings<'a> {
    fn raw(&self, section: &str, key: &str) -> Option<&'a str> {
        self.user
            .and_then(|ini| ini.get_from(Some(section), key))
            .or_else(|| CNM_CONF.get_from(Some(section), key))
            .map(str::trim)
    }

    fn string(&self, section: &str, key: &str) -> Result<String> {
        match self.raw(section, key) {
            Some(value) if !value.is_empty() => Ok(value.to_owned()),
            _ => Err(DeployError::Config(format!(
                "[{}] {} must be set",
                section, key
            ))),
        }
    }

    fn optional(&self, section: &str, key: &str) -> Option<String> {
        self.raw(section, key)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    }

    fn list(&self, section: &str, key: &str) -> Vec<String> {
        self.raw(section, key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn parse<T: std::str::FromStr>(&self, section: &str, key: &str) -> Result<T> {
        let value = self.string(section, key)?;
        value.parse::<T>().map_err(|_| {
            DeployError::Config(format!(
                "[{}] {} has an invalid value: {}",
                section, key, value
            ))
        })
    }

    fn duration(&self, section: &str, key: &str) -> Result<Duration> {
        let value = self.string(section, key)?;
        parse_duration(&value).map_err(|e| {
            DeployError::Config(format!("[{}] {} = {}: {}", section, key, value, e))
        })
    }

    fn environment(&self, section: &str, key: &str) -> Result<BTreeMap<String, String>> {
        self.list(section, key)
            .into_iter()
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => {
                    Ok((k.trim().to_owned(), v.trim().to_owned()))
                }
                _ => Err(DeployError::Config(format!(
                    "[{}] {} expects KEY=VALUE pairs, got {}",
                    section, key, pair
                ))),
            })
            .collect()
    }
}

impl DeployConfig {
    /// Loads the configuration, layering the optional user file over the
    /// compiled-in defaults.
    pub fn load(path: Option<&Path>) -> Result<DeployConfig> {
        match path {
            Some(path) => {
                let user = Ini::load_from_file(path).map_err(|e| {
                    DeployError::Config(format!("failed to read {}: {}", path.display(), e))
                })?;
                Self::from_settings(Settings { user: Some(&user) })
            }
            None => Self::from_settings(Settings { user: None }),
        }
    }

    /// Builds the configuration from INI text layered over the defaults.
    pub fn from_overrides(text: &str) -> Result<DeployConfig> {
        let user = Ini::load_from_str(text)
            .map_err(|e| DeployError::Config(format!("invalid settings: {}", e)))?;
        Self::from_settings(Settings { user: Some(&user) })
    }

    fn from_settings(s: Settings) -> Result<DeployConfig> {
        let conf = DeployConfig {
            package:              PackageConfig {
                source_dir:   PathBuf::from(s.string("package", "source_dir")?),
                build_dir:    PathBuf::from(s.string("package", "build_dir")?),
                output_dir:   PathBuf::from(s.string("package", "output_dir")?),
                requirements: PathBuf::from(s.string("package", "requirements")?),
                extension:    s.string("package", "extension")?,
                installer:    s.string("package", "installer")?,
            },
            function:             FunctionConfig {
                name:        s.string("function", "name")?,
                app_name:    s.string("function", "app_name")?,
                entry_point: s.string("function", "entry_point")?,
                runtime:     s.string("function", "runtime")?,
                memory_size: s.parse("function", "memory_size")?,
                timeout:     s.parse("function", "timeout")?,
                environment: s.environment("function", "environment")?,
            },
            publish:              PublishConfig {
                delay:               s.duration("publish", "delay")?,
                max_attempts:        s.parse("publish", "max_attempts")?,
                direct_upload_limit: s.parse("publish", "direct_upload_limit")?,
                code_bucket:         s.optional("publish", "code_bucket"),
                code_prefix:         s.optional("publish", "code_prefix").unwrap_or_default(),
            },
            region:               s.string("aws", "region")?,
            partition:            s.string("aws", "partition")?,
            role_name:            s.string("iam", "role_name")?,
            permissions_boundary: s.optional("iam", "permissions_boundary"),
            vpc:                  VpcConfig {
                subnet_ids:         s.list("vpc", "subnet_ids"),
                security_group_ids: s.list("vpc", "security_group_ids"),
            },
            efs:                  EfsConfig {
                file_system_arn:  s.optional("efs", "file_system_arn"),
                access_point_arn: s.optional("efs", "access_point_arn"),
                mount_path:       s.string("efs", "mount_path")?,
            },
            bucket:               s.string("s3", "bucket")?,
            topic_arn:            s.optional("sns", "topic_arn"),
            failure_topic_arn:    s.optional("sns", "failure_topic_arn"),
            parameter_arn:        s.optional("ssm", "parameter_arn"),
            log_retention_days:   s.parse("logs", "retention_days")?,
        };
        conf.validate()?;
        Ok(conf)
    }

    /// Checks the limits Lambda enforces and the cross-section constraints.
    pub fn validate(&self) -> Result<()> {
        let f = &self.function;
        if !(128..=10240).contains(&f.memory_size) {
            return Err(DeployError::Config(format!(
                "memory size must be within 128..=10240 MB, got {}",
                f.memory_size
            )));
        }
        if !(1..=900).contains(&f.timeout) {
            return Err(DeployError::Config(format!(
                "timeout must be within 1..=900 seconds, got {}",
                f.timeout
            )));
        }
        if self.publish.max_attempts == 0 {
            return Err(DeployError::Config(
                "[publish] max_attempts must be at least 1".to_owned(),
            ));
        }
        if self.vpc.subnet_ids.is_empty() != self.vpc.security_group_ids.is_empty() {
            return Err(DeployError::Config(
                "[vpc] subnet_ids and security_group_ids must be set together".to_owned(),
            ));
        }
        if self.efs.file_system_arn.is_some() && !self.efs.is_mounted() {
            return Err(DeployError::Config(
                "[efs] access_point_arn must be set with file_system_arn".to_owned(),
            ));
        }
        if self.efs.is_mounted() {
            if !self.vpc.is_attached() {
                return Err(DeployError::Config(
                    "an EFS mount requires the function to be attached to a VPC".to_owned(),
                ));
            }
            if self.efs.file_system_arn.is_none() {
                return Err(DeployError::Config(
                    "[efs] file_system_arn must be set with access_point_arn".to_owned(),
                ));
            }
            if !self.efs.mount_path.starts_with("/mnt/") {
                return Err(DeployError::Config(format!(
                    "[efs] mount_path must live under /mnt/, got {}",
                    self.efs.mount_path
                )));
            }
        }
        if self.bucket.contains('*') || self.bucket.contains('?') {
            return Err(DeployError::Config(format!(
                "[s3] bucket must name exactly one bucket, got {}",
                self.bucket
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn setting_shows() -> Result<()> {
        let conf = Ini::load_from_str(include_str!("./config.toml")).unwrap();

        for (sec, prop) in &conf {
            println!("Section: {:?}", sec);
            for (key, value) in prop.iter() {
                println!("{:?}:{:?}", key, value);
            }
        }

        assert_eq!("60", &conf["publish"]["max_attempts"]);
        assert_eq!("52428800", &conf["publish"]["direct_upload_limit"]);
        Ok(())
    }

    #[test]
    fn defaults() -> Result<()> {
        let conf = DeployConfig::load(None)?;
        assert_eq!(conf.function.handler(), "cnm_responder.cnm_handler");
        assert_eq!(conf.publish.delay, Duration::from_secs(5));
        assert_eq!(conf.publish.max_attempts, 60);
        assert_eq!(conf.publish.code_bucket, None);
        assert!(!conf.vpc.is_attached());
        assert!(!conf.efs.is_mounted());
        assert_eq!(
            conf.package.artifact("cnm_responder"),
            PathBuf::from("./cnm_responder.zip")
        );
        Ok(())
    }

    #[test]
    fn user_settings_override_defaults() -> Result<()> {
        let conf = DeployConfig::from_overrides(indoc! {"
            [function]
            name = sst-cnm-responder
            memory_size = 512
            environment = PREFIX=sst, LOG_LEVEL=debug

            [vpc]
            subnet_ids = subnet-1, subnet-2
            security_group_ids = sg-1

            [efs]
            file_system_arn = arn:aws:elasticfilesystem:us-west-2:123456789012:file-system/fs-1
            access_point_arn = arn:aws:elasticfilesystem:us-west-2:123456789012:access-point/fsap-1
        "})?;

        assert_eq!(conf.function.name, "sst-cnm-responder");
        assert_eq!(conf.function.memory_size, 512);
        assert_eq!(conf.function.timeout, 300);
        assert_eq!(conf.function.environment["PREFIX"], "sst");
        assert_eq!(conf.function.environment["LOG_LEVEL"], "debug");
        assert_eq!(conf.vpc.subnet_ids, vec!["subnet-1", "subnet-2"]);
        assert!(conf.efs.is_mounted());
        assert_eq!(conf.efs.mount_path, "/mnt/data");
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_limits() {
        let err = DeployConfig::from_overrides("[function]\nmemory_size = 64\n").unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));

        let err = DeployConfig::from_overrides("[function]\ntimeout = 901\n").unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));

        let err = DeployConfig::from_overrides("[publish]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn efs_requires_vpc() {
        let err = DeployConfig::from_overrides(indoc! {"
            [efs]
            file_system_arn = arn:aws:elasticfilesystem:us-west-2:123456789012:file-system/fs-1
            access_point_arn = arn:aws:elasticfilesystem:us-west-2:123456789012:access-point/fsap-1
        "})
        .unwrap_err();
        assert!(err.to_string().contains("VPC"));
    }

    #[test]
    fn efs_requires_an_access_point() {
        let err = DeployConfig::from_overrides(indoc! {"
            [vpc]
            subnet_ids = subnet-1
            security_group_ids = sg-1

            [efs]
            file_system_arn = arn:aws:elasticfilesystem:us-west-2:123456789012:file-system/fs-1
        "})
        .unwrap_err();
        assert!(err.to_string().contains("access_point_arn"));
    }

    #[test]
    fn empty_code_prefix_is_allowed() -> Result<()> {
        let conf = DeployConfig::from_overrides("[publish]\ncode_prefix =\n")?;
        assert_eq!(conf.publish.code_prefix, "");
        Ok(())
    }

    #[test]
    fn rejects_wildcard_bucket() {
        let err = DeployConfig::from_overrides("[s3]\nbucket = *\n").unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn rejects_bad_environment() {
        let err = DeployConfig::from_overrides("[function]\nenvironment = NOPE\n").unwrap_err();
        assert!(err.to_string().contains("KEY=VALUE"));
    }
}
