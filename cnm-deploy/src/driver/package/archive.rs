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

//! Deterministic zip archives.
//!
//! Two archives built from the same files are byte-for-byte identical: the
//! entries are written in the order given, with a fixed timestamp, fixed
//! compression and normalised permissions.

use crate::error::Result;
use std::fs;
use std::io::{Read, Seek, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Permissions of regular entries.
const FILE_MODE: u32 = 0o644;
/// Permissions of executable entries.
const EXEC_MODE: u32 = 0o755;

/// A file to store in the archive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entry {
    /// Name inside the archive, `/` separated and relative to the root.
    pub name:       String,
    /// Whether the entry keeps its executable bit.
    pub executable: bool,
}

/// Writes `entries` into a new archive at `dest`, reading each entry's bytes
/// through `read`.
///
/// The archive is assembled in a temporary file next to `dest` and only moved
/// into place once complete, so a failed write never leaves a readable but
/// truncated archive behind.
///
/// # Arguments
/// * `dest` - The archive to create. An existing file is replaced.
/// * `entries` - The entries, in archive order.
/// * `read` - Loads the content of an entry.
pub fn write<F>(dest: &Path, entries: &[Entry], mut read: F) -> Result<u64>
where
    F: FnMut(&Entry) -> Result<Vec<u8>>,
{
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut zip = ZipWriter::new(NamedTempFile::new_in(dir)?);
    for entry in entries {
        zip.start_file(entry.name.as_str(), options(entry))?;
        zip.write_all(&read(entry)?)?;
    }
    let file = zip.finish()?.persist(dest).map_err(|e| e.error)?;
    // Temporary files are created owner-only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
    }
    Ok(file.metadata()?.len())
}

fn options(entry: &Entry) -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(if entry.executable {
            EXEC_MODE
        } else {
            FILE_MODE
        })
}

/// Lists the entry names of an archive in stored order.
pub fn read_entries(path: &Path) -> Result<Vec<String>> {
    entries_of(fs::File::open(path)?)
}

fn entries_of<R: Read + Seek>(reader: R) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(reader)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index(i)?.name().to_owned());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;
    use std::collections::HashMap;

    fn sample() -> (Vec<Entry>, HashMap<String, Vec<u8>>) {
        let entries = vec![
            Entry {
                name:       "requests/__init__.py".to_owned(),
                executable: false,
            },
            Entry {
                name:       "bin/normalizer".to_owned(),
                executable: true,
            },
            Entry {
                name:       "cnm_responder.py".to_owned(),
                executable: false,
            },
        ];
        let content = entries
            .iter()
            .map(|e| (e.name.clone(), format!("content of {}", e.name).into_bytes()))
            .collect();
        (entries, content)
    }

    #[test]
    fn keeps_entry_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("app.zip");
        let (entries, content) = sample();

        let size = write(&dest, &entries, |e| Ok(content[&e.name].clone()))?;
        assert_eq!(size, fs::metadata(&dest)?.len());
        assert_eq!(
            read_entries(&dest)?,
            vec!["requests/__init__.py", "bin/normalizer", "cnm_responder.py"]
        );
        Ok(())
    }

    #[test]
    fn identical_input_identical_bytes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (entries, content) = sample();

        let first = dir.path().join("first.zip");
        let second = dir.path().join("second.zip");
        write(&first, &entries, |e| Ok(content[&e.name].clone()))?;
        std::thread::sleep(std::time::Duration::from_millis(1100));
        write(&second, &entries, |e| Ok(content[&e.name].clone()))?;

        assert_eq!(fs::read(&first)?, fs::read(&second)?);
        Ok(())
    }

    #[test]
    fn normalises_permissions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("app.zip");
        let (entries, content) = sample();
        write(&dest, &entries, |e| Ok(content[&e.name].clone()))?;

        let mut archive = ZipArchive::new(fs::File::open(&dest)?)?;
        let mode = |archive: &mut ZipArchive<fs::File>, name: &str| {
            archive
                .by_name(name)
                .unwrap()
                .unix_mode()
                .map(|m| m & 0o777)
        };
        assert_eq!(mode(&mut archive, "bin/normalizer"), Some(0o755));
        assert_eq!(mode(&mut archive, "cnm_responder.py"), Some(0o644));
        Ok(())
    }

    #[test]
    fn failed_write_leaves_nothing_behind() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("app.zip");
        let (entries, content) = sample();

        let res = write(&dest, &entries, |e| {
            if e.name == "bin/normalizer" {
                Err(DeployError::Package("unreadable".to_owned()))
            } else {
                Ok(content[&e.name].clone())
            }
        });

        assert!(res.is_err());
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }
}
