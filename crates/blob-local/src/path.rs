use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use blob_core::{BlobPath, OpenMode, Openable, StagingFile, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Implicit variable naming the base directory blobs live under.
pub const BASE_VAR: &str = blob_implicit::prefixed!("LOCAL_RELATIVE_BASE_DIR");

/// Identity fields of a [`LocalRelativeBlobPath`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalRelativePayload {
    pub relpath_parts: Vec<String>,
}

/// A blob stored as a file under the implicit base directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalRelativeBlobPath {
    parts: Vec<String>,
}

impl LocalRelativeBlobPath {
    /// A handle for a relative path such as `a/b.txt`.
    ///
    /// Absolute paths and `..` segments are rejected so a handle can never
    /// point outside its base directory.
    pub fn new(relpath: impl AsRef<Path>) -> StoreResult<Self> {
        Self::from_parts(blob_core::logical::segments(relpath.as_ref())?)
    }

    /// A handle from already-split path segments.
    pub fn from_parts<I, S>(parts: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        if parts.is_empty() {
            return Err(StoreError::Validation("relative path is empty".into()));
        }
        if let Some(bad) = parts.iter().find(|p| {
            p.is_empty() || *p == "." || *p == ".." || p.chars().any(std::path::is_separator)
        }) {
            return Err(StoreError::Validation(format!(
                "invalid relative path segment `{bad}`"
            )));
        }
        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// The path relative to the base directory.
    pub fn relpath(&self) -> PathBuf {
        self.parts.iter().collect()
    }

    /// The absolute location under the current base directory.
    pub fn absolute_path(&self) -> StoreResult<PathBuf> {
        Ok(base_dir()?.join(self.relpath()))
    }
}

/// Resolve the base directory, creating it if it does not exist yet.
fn base_dir() -> StoreResult<PathBuf> {
    let base = PathBuf::from(blob_implicit::get(BASE_VAR)?);
    fs::create_dir_all(&base)?;
    Ok(base)
}

impl Openable for LocalRelativeBlobPath {
    fn open_with(
        &self,
        mode: OpenMode,
        f: &mut dyn FnMut(&mut File) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let path = self.absolute_path()?;
        debug!(kind = Self::KIND, path = %path.display(), %mode, "opening blob");
        match mode {
            OpenMode::Read => {
                let mut file = File::open(&path).map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => StoreError::DoesNotExist(self.to_string()),
                    _ => StoreError::Io(e),
                })?;
                f(&mut file)
            }
            OpenMode::Write => {
                let parent = path.parent().ok_or_else(|| {
                    StoreError::Validation(format!("{} has no parent directory", path.display()))
                })?;
                fs::create_dir_all(parent)?;
                // Staged next to the target so the rename stays on one filesystem.
                let staging = StagingFile::in_dir(parent);
                {
                    let mut file = staging.create()?;
                    f(&mut file)?;
                    file.sync_all()?;
                }
                fs::rename(staging.path(), &path)?;
                Ok(())
            }
        }
    }
}

impl BlobPath for LocalRelativeBlobPath {
    const KIND: &'static str = "blob-store-local-relative";
    type Payload = LocalRelativePayload;

    fn exists(&self) -> StoreResult<bool> {
        match fs::metadata(self.absolute_path()?) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self) -> StoreResult<bool> {
        if !self.exists()? {
            return Ok(false);
        }
        match fs::remove_file(self.absolute_path()?) {
            Ok(()) => {
                debug!(kind = Self::KIND, relpath = %self.relpath().display(), "deleted blob");
                Ok(true)
            }
            // Lost a race with another deleter.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn payload(&self) -> LocalRelativePayload {
        LocalRelativePayload {
            relpath_parts: self.parts.clone(),
        }
    }

    fn from_payload(payload: LocalRelativePayload) -> StoreResult<Self> {
        Self::from_parts(payload.relpath_parts)
    }

    fn create_default(logical_path: &Path) -> StoreResult<Self> {
        Self::new(logical_path)
    }
}

impl fmt::Display for LocalRelativeBlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kind={} relative_path={} implicit_vars=[{}]",
            Self::KIND,
            self.parts.join("/"),
            BASE_VAR
        )
    }
}
