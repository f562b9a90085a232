// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::Error;
use log::debug;
use std::{fs::File, path::Path};
use tempfile::NamedTempFile;

/// Write a cache file so that readers only ever observe a complete file.
///
/// The content is produced into a temporary file created next to `path` and
/// renamed over it once `write` succeeds. If `write` fails the temporary file
/// is removed and any existing cache file is left untouched.
pub(crate) fn persist_atomic<F>(path: &Path, write: F) -> Result<(), Error>
where
    F: FnOnce(&mut File) -> Result<(), Error>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;

    debug!("Cache file written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::TempDir;

    #[test]
    fn test_persist_atomic_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("table.csv");

        persist_atomic(&path, |f| {
            f.write_all(b"a,b\n1,2\n")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn test_persist_atomic_failure_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.csv");

        let result = persist_atomic(&path, |f| {
            f.write_all(b"a,b\n1,")?;
            Err(Error::InvalidParameters("interrupted".to_string()))
        });

        assert!(result.is_err());
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_persist_atomic_failure_keeps_previous() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "old").unwrap();

        let result = persist_atomic(&path, |_| {
            Err(Error::InvalidParameters("interrupted".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");
    }
}
