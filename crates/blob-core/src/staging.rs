use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreResult;

/// Implicit variable naming the directory staging files are created in.
///
/// Falls back to [`std::env::temp_dir`] when unset.
pub const TMP_DIR_VAR: &str = blob_implicit::prefixed!("TMP_DIR");

/// Resolve the staging directory, creating it if needed.
pub fn staging_dir() -> StoreResult<PathBuf> {
    let dir = match blob_implicit::get_opt(TMP_DIR_VAR)? {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir(),
    };
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// A local file holding a blob's bytes while it is open.
///
/// Each staging file gets a random UUID name, so concurrent opens of the
/// same blob never share a file. The file is removed when the guard drops,
/// on every exit path.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
}

impl StagingFile {
    /// Reserve a fresh staging path in [`staging_dir`].
    pub fn new() -> StoreResult<Self> {
        Ok(Self::in_dir(&staging_dir()?))
    }

    /// Reserve a fresh staging path in `dir`. Nothing is created on disk
    /// until the file is first written.
    pub fn in_dir(dir: &Path) -> Self {
        let path = dir.join(Uuid::new_v4().to_string());
        debug!(path = %path.display(), "reserved staging file");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create (or truncate) the staging file for writing.
    pub fn create(&self) -> io::Result<File> {
        File::create(&self.path)
    }

    /// Open the staged bytes for reading.
    pub fn open(&self) -> io::Result<File> {
        File::open(&self.path)
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed staging file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to remove staging file: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let staging = StagingFile::in_dir(dir.path());
            staging.create().unwrap().write_all(b"bytes").unwrap();
            assert!(staging.path().exists());
            staging.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn never_written_file_drops_quietly() {
        let dir = tempfile::tempdir().unwrap();
        drop(StagingFile::in_dir(dir.path()));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = StagingFile::in_dir(dir.path());
        let b = StagingFile::in_dir(dir.path());
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn staging_dir_follows_the_implicit_variable() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("staging");
        blob_implicit::with_vars([(TMP_DIR_VAR, nested.to_str().unwrap())], || {
            let resolved = staging_dir().unwrap();
            assert_eq!(resolved, nested);
            assert!(nested.is_dir());
            let staging = StagingFile::new().unwrap();
            assert_eq!(staging.path().parent(), Some(nested.as_path()));
        });
    }
}
