use std::fmt;
use std::fs::File;
use std::path::Path;

use blob_azure::AzureBlobPath;
use blob_core::{BlobPath, OpenMode, Openable, SerialisedBlobPath, StoreResult};
use blob_local::LocalRelativeBlobPath;
use blob_s3::S3BlobPath;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::registry;

/// A handle to a blob in any registered backend.
///
/// Serializes through [`SerialisedBlobPath`], so it can be embedded in any
/// serde document and read back by another process.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlobHandle {
    LocalRelative(LocalRelativeBlobPath),
    S3(S3BlobPath),
    Azure(AzureBlobPath),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            BlobHandle::LocalRelative($inner) => $body,
            BlobHandle::S3($inner) => $body,
            BlobHandle::Azure($inner) => $body,
        }
    };
}

impl BlobHandle {
    /// Build a handle for `logical_path` in the backend registered as
    /// `kind`, configured from the implicit variable context.
    pub fn create_default(kind: &str, logical_path: &Path) -> StoreResult<Self> {
        registry::backend(kind)?.create_default(logical_path)
    }

    /// See [`registry::deserialise`].
    pub fn deserialise(data: &SerialisedBlobPath) -> StoreResult<Self> {
        registry::deserialise(data)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocalRelative(_) => LocalRelativeBlobPath::KIND,
            Self::S3(_) => S3BlobPath::KIND,
            Self::Azure(_) => AzureBlobPath::KIND,
        }
    }

    pub fn exists(&self) -> StoreResult<bool> {
        dispatch!(self, p => p.exists())
    }

    pub fn delete(&self) -> StoreResult<bool> {
        dispatch!(self, p => p.delete())
    }

    pub fn open<R>(
        &self,
        mode: OpenMode,
        f: impl FnOnce(&mut File) -> StoreResult<R>,
    ) -> StoreResult<R> {
        dispatch!(self, p => p.open(mode, f))
    }

    pub fn serialise(&self) -> StoreResult<SerialisedBlobPath> {
        dispatch!(self, p => p.serialise())
    }

    pub fn cp(&self, destination: &dyn Openable) -> StoreResult<u64> {
        dispatch!(self, p => p.cp(destination))
    }

    pub fn read_bytes(&self) -> StoreResult<Vec<u8>> {
        dispatch!(self, p => p.read_bytes())
    }

    pub fn read_string(&self) -> StoreResult<String> {
        dispatch!(self, p => p.read_string())
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> StoreResult<()> {
        dispatch!(self, p => p.write_bytes(bytes))
    }

    pub fn write_str(&self, text: &str) -> StoreResult<()> {
        dispatch!(self, p => p.write_str(text))
    }
}

impl Openable for BlobHandle {
    fn open_with(
        &self,
        mode: OpenMode,
        f: &mut dyn FnMut(&mut File) -> StoreResult<()>,
    ) -> StoreResult<()> {
        dispatch!(self, p => p.open_with(mode, f))
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, p => fmt::Display::fmt(p, f))
    }
}

impl From<LocalRelativeBlobPath> for BlobHandle {
    fn from(p: LocalRelativeBlobPath) -> Self {
        Self::LocalRelative(p)
    }
}

impl From<S3BlobPath> for BlobHandle {
    fn from(p: S3BlobPath) -> Self {
        Self::S3(p)
    }
}

impl From<AzureBlobPath> for BlobHandle {
    fn from(p: AzureBlobPath) -> Self {
        Self::Azure(p)
    }
}

impl Serialize for BlobHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.serialise()
            .map_err(<S::Error as serde::ser::Error>::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BlobHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data = SerialisedBlobPath::deserialize(deserializer)?;
        registry::deserialise(&data).map_err(serde::de::Error::custom)
    }
}
