// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Scratch files for sound data that only exists in memory.
//!
//! Platforms load samples from paths, so byte blobs are written out to
//! `sound<random>pool` files in a scratch directory. A [`TempBlob`] deletes its
//! file once dropped, and [`TempBlobStore::sweep`] clears anything a previous
//! process left behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tempfile::{Builder, TempPath};
use tracing::{debug, info, warn};

const PREFIX: &str = "sound";
const SUFFIX: &str = "pool";

static BLOB_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sound.*pool$").expect("blob name pattern is valid"));

/// A staged blob. The file is removed when this is dropped.
#[derive(Debug)]
pub struct TempBlob {
    path: TempPath,
}

impl TempBlob {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Writes blobs into a scratch directory.
#[derive(Debug, Clone)]
pub struct TempBlobStore {
    dir: PathBuf,
}

impl TempBlobStore {
    /// Creates a store rooted at `dir`. The directory is created on first use.
    pub fn new(dir: impl Into<PathBuf>) -> TempBlobStore {
        TempBlobStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` to a fresh scratch file. The data is flushed and synced
    /// and the handle closed before the path is handed out.
    pub fn store(&self, bytes: &[u8]) -> io::Result<TempBlob> {
        fs::create_dir_all(&self.dir)?;
        let mut file = Builder::new()
            .prefix(PREFIX)
            .suffix(SUFFIX)
            .tempfile_in(&self.dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.as_file().sync_all()?;

        let path = file.into_temp_path();
        debug!(path = ?path, bytes = bytes.len(), "Staged sound data");
        Ok(TempBlob { path })
    }

    /// Removes staged files left behind by an earlier process. Returns how many
    /// files were deleted.
    pub fn sweep(&self) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !BLOB_NAME.is_match(name) || !entry.path().is_file() {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = ?entry.path(), err = %e, "Unable to remove stale blob"),
            }
        }

        if removed > 0 {
            info!(dir = ?self.dir, removed, "Removed stale sound blobs");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_writes_full_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempBlobStore::new(dir.path());

        let blob = store.store(b"RIFF-not-really").unwrap();
        let name = blob.path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("sound"));
        assert!(name.ends_with("pool"));
        assert_eq!(fs::read(blob.path()).unwrap(), b"RIFF-not-really");
    }

    #[test]
    fn test_blob_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempBlobStore::new(dir.path());

        let blob = store.store(&[1, 2, 3]).unwrap();
        let path = blob.path().to_path_buf();
        assert!(path.exists());
        drop(blob);
        assert!(!path.exists());
    }

    #[test]
    fn test_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempBlobStore::new(dir.path());

        let a = store.store(&[1]).unwrap();
        let b = store.store(&[1]).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempBlobStore::new(dir.path().join("nested").join("scratch"));

        let blob = store.store(&[9]).unwrap();
        assert!(blob.path().exists());
    }

    #[test]
    fn test_sweep_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sound123pool"), b"stale").unwrap();
        fs::write(dir.path().join("soundpool"), b"stale").unwrap();
        fs::write(dir.path().join("keep.wav"), b"keep").unwrap();
        fs::write(dir.path().join("sound123pool.bak"), b"keep").unwrap();

        let store = TempBlobStore::new(dir.path());
        assert_eq!(store.sweep().unwrap(), 2);
        assert!(dir.path().join("keep.wav").exists());
        assert!(dir.path().join("sound123pool.bak").exists());
        assert!(!dir.path().join("sound123pool").exists());
    }

    #[test]
    fn test_sweep_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempBlobStore::new(dir.path().join("missing"));
        assert_eq!(store.sweep().unwrap(), 0);
    }

    #[test]
    fn test_store_into_unwritable_location() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"not a dir").unwrap();

        let store = TempBlobStore::new(blocker.join("scratch"));
        assert!(store.store(&[1]).is_err());
    }
}
