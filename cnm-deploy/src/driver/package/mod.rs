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

//! The package builder assembles the handler source file and its installed
//! dependencies into a single deployment artifact.
//!
//! The build is done in one canonical order: the dependencies are installed
//! into the scratch build directory first, then the archive is written with
//! the dependency tree followed by the handler file, both at the archive
//! root.

pub mod archive;

use crate::config::PackageConfig;
use crate::error::{DeployError, Result};
use archive::Entry;
use glob::glob;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub use archive::read_entries;

/// Installs the runtime dependencies of the handler into a directory.
pub trait DependencyInstaller {
    /// Installs every dependency listed in `requirements` into `target`.
    fn install(&self, requirements: &Path, target: &Path) -> Result<()>;
}

/// Installs dependencies with `pip install --target`.
#[derive(Debug, Clone)]
pub struct PipInstaller {
    program: String,
}

impl PipInstaller {
    /// Creates an installer running the given pip executable.
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_owned(),
        }
    }
}

impl DependencyInstaller for PipInstaller {
    fn install(&self, requirements: &Path, target: &Path) -> Result<()> {
        info!(
            "Installing dependencies from {} into {}",
            requirements.display(),
            target.display()
        );
        let output = Command::new(&self.program)
            .arg("install")
            .arg("--target")
            .arg(target)
            .arg("-r")
            .arg(requirements)
            .output()
            .map_err(|e| {
                DeployError::Package(format!("failed to execute {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(DeployError::Package(format!(
                "{} install exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!("{}", String::from_utf8_lossy(&output.stdout).trim());
        Ok(())
    }
}

/// The deployment artifact produced by a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Where the archive was written.
    pub path:    PathBuf,
    /// The archive entries, in stored order.
    pub entries: Vec<String>,
    /// The archive size in bytes.
    pub size:    u64,
}

/// Builds the deployment artifact of one application.
pub struct PackageBuilder<'a> {
    app_name:  String,
    config:    &'a PackageConfig,
    installer: Box<dyn DependencyInstaller + 'a>,
}

impl<'a> PackageBuilder<'a> {
    /// Creates a builder installing dependencies with the configured pip.
    pub fn new(app_name: &str, config: &'a PackageConfig) -> Self {
        Self::with_installer(app_name, config, PipInstaller::new(&config.installer))
    }

    /// Creates a builder with a custom dependency installer.
    pub fn with_installer<I>(app_name: &str, config: &'a PackageConfig, installer: I) -> Self
    where
        I: DependencyInstaller + 'a,
    {
        Self {
            app_name: app_name.to_owned(),
            config,
            installer: Box::new(installer),
        }
    }

    /// Builds `<output_dir>/<app_name>.zip`.
    ///
    /// Fails before touching the build directory if the handler source file
    /// or the requirements file is missing. Any later failure leaves no
    /// archive at all: a previous one is removed before the dependencies are
    /// installed, and the new one only appears once fully written.
    pub fn build(&self) -> Result<Artifact> {
        validate_app_name(&self.app_name)?;

        let source = self.config.source_file(&self.app_name);
        if !source.is_file() {
            return Err(DeployError::Package(format!(
                "the handler source file ({}) doesn't exist",
                source.display()
            )));
        }
        let requirements = self.config.requirements_file();
        if !requirements.is_file() {
            return Err(DeployError::Package(format!(
                "the requirements file ({}) doesn't exist",
                requirements.display()
            )));
        }

        // A stale artifact must not outlive a failed rebuild.
        let dest = self.config.artifact(&self.app_name);
        if dest.is_file() {
            fs::remove_file(&dest)?;
        }

        let build_dir = &self.config.build_dir;
        if build_dir.exists() {
            fs::remove_dir_all(build_dir)?;
        }
        fs::create_dir_all(build_dir)?;
        self.installer.install(&requirements, build_dir)?;

        let handler_name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| DeployError::Internal("handler file name is not UTF-8".to_owned()))?
            .to_owned();

        let mut entries = dependency_entries(build_dir)?;
        if entries.iter().any(|e| e.name == handler_name) {
            return Err(DeployError::Package(format!(
                "the dependency tree already contains {} at its root",
                handler_name
            )));
        }
        entries.push(Entry {
            name:       handler_name.clone(),
            executable: false,
        });

        fs::create_dir_all(&self.config.output_dir)?;
        info!(
            "Writing {} entries into {}",
            entries.len(),
            dest.display()
        );
        let size = archive::write(&dest, &entries, |entry| {
            if entry.name == handler_name {
                Ok(fs::read(&source)?)
            } else {
                Ok(fs::read(build_dir.join(&entry.name))?)
            }
        })?;

        Ok(Artifact {
            path: dest,
            entries: entries.into_iter().map(|e| e.name).collect(),
            size,
        })
    }
}

pub(crate) fn validate_app_name(app_name: &str) -> Result<()> {
    if app_name.is_empty()
        || app_name.contains('/')
        || app_name.contains('\\')
        || app_name == "."
        || app_name == ".."
    {
        return Err(DeployError::Package(format!(
            "invalid application name: {:?}",
            app_name
        )));
    }
    Ok(())
}

/// Collects every regular file under `root`, sorted by archive name.
///
/// Python bytecode caches are left out: they embed source timestamps and
/// the runtime regenerates them anyway.
fn dependency_entries(root: &Path) -> Result<Vec<Entry>> {
    let root_str = root
        .to_str()
        .ok_or_else(|| DeployError::Package(format!("non UTF-8 path: {}", root.display())))?;
    let pattern = format!("{}/**/*", glob::Pattern::escape(root_str));
    let paths = glob(&pattern)
        .map_err(|e| DeployError::Package(format!("invalid build directory pattern: {}", e)))?;

    let mut entries = vec![];
    for path in paths {
        let path = path.map_err(|e| DeployError::Package(e.to_string()))?;
        let meta = fs::symlink_metadata(&path)?;
        if !meta.is_file() {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .map_err(|e| DeployError::Internal(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if name.split('/').any(|part| part == "__pycache__") || name.ends_with(".pyc") {
            debug!("Skipping {}", name);
            continue;
        }
        entries.push(Entry {
            name,
            executable: is_executable(&meta),
        });
    }

    if entries.is_empty() {
        warn!("No dependencies were installed into {}", root.display());
    }
    entries.sort();
    Ok(entries)
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}
