use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::copy::copy;
use crate::error::{StoreError, StoreResult};
use crate::mode::OpenMode;
use crate::serialised::SerialisedBlobPath;

/// Scoped byte access, object-safe.
///
/// Implemented by every blob handle and by raw filesystem paths. The
/// callback receives a local [`File`]:
///
/// - [`OpenMode::Read`]: positioned at the start of the complete contents.
/// - [`OpenMode::Write`]: empty; whatever the callback writes becomes the
///   new contents once `open_with` returns `Ok`.
///
/// An error from the callback is returned unchanged and nothing is written
/// back to the backend.
pub trait Openable {
    fn open_with(
        &self,
        mode: OpenMode,
        f: &mut dyn FnMut(&mut File) -> StoreResult<()>,
    ) -> StoreResult<()>;
}

impl Openable for Path {
    fn open_with(
        &self,
        mode: OpenMode,
        f: &mut dyn FnMut(&mut File) -> StoreResult<()>,
    ) -> StoreResult<()> {
        match mode {
            OpenMode::Read => f(&mut File::open(self)?),
            OpenMode::Write => {
                let mut file = File::create(self)?;
                f(&mut file)?;
                file.sync_all()?;
                Ok(())
            }
        }
    }
}

impl Openable for PathBuf {
    fn open_with(
        &self,
        mode: OpenMode,
        f: &mut dyn FnMut(&mut File) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.as_path().open_with(mode, f)
    }
}

/// A handle to a blob in one storage backend.
///
/// A handle consists of its backend's identity fields and nothing else, so
/// two handles with the same `KIND` and equal identity fields refer to the
/// same blob. Implementations must keep every operation free of cached or
/// per-process state.
pub trait BlobPath: Openable + fmt::Display + Sized {
    /// Stable discriminant written into [`SerialisedBlobPath::kind`].
    const KIND: &'static str;

    /// The backend's identity fields, as serialized into the payload.
    type Payload: Serialize + DeserializeOwned;

    /// Whether the blob is present. "Not found" is `Ok(false)`, never an
    /// error.
    fn exists(&self) -> StoreResult<bool>;

    /// Delete the blob if present and report whether anything was deleted.
    fn delete(&self) -> StoreResult<bool>;

    /// The identity fields of this handle.
    fn payload(&self) -> Self::Payload;

    /// Rebuild a handle from validated identity fields.
    fn from_payload(payload: Self::Payload) -> StoreResult<Self>;

    /// A handle for `logical_path`, configured from the implicit variable
    /// context at call time.
    fn create_default(logical_path: &Path) -> StoreResult<Self>;

    /// Open the blob for the duration of `f`. See [`Openable`] for the
    /// read and write contracts.
    fn open<R>(
        &self,
        mode: OpenMode,
        f: impl FnOnce(&mut File) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut f = Some(f);
        let mut out = None;
        self.open_with(mode, &mut |file| {
            if let Some(f) = f.take() {
                out = Some(f(file)?);
            }
            Ok(())
        })?;
        out.ok_or_else(|| StoreError::ContractViolation(format!("{self} skipped the open scope")))
    }

    /// The kind-tagged payload for this handle. Performs no I/O.
    fn serialise(&self) -> StoreResult<SerialisedBlobPath> {
        let payload = serde_json::to_value(self.payload())
            .map_err(|e| StoreError::Validation(format!("{}: {e}", Self::KIND)))?;
        Ok(SerialisedBlobPath::new(Self::KIND, payload))
    }

    /// Inverse of [`serialise`](Self::serialise).
    fn deserialise(data: &SerialisedBlobPath) -> StoreResult<Self> {
        if data.kind != Self::KIND {
            return Err(StoreError::Validation(format!(
                "expected kind `{}`, found `{}`",
                Self::KIND,
                data.kind
            )));
        }
        let payload = serde_json::from_value(data.payload.clone()).map_err(|e| {
            StoreError::Validation(format!("invalid `{}` payload: {e}", Self::KIND))
        })?;
        Self::from_payload(payload)
    }

    /// Copy this blob's bytes to `destination`, returning the byte count.
    fn cp(&self, destination: &dyn Openable) -> StoreResult<u64> {
        copy(self, destination)
    }

    fn read_bytes(&self) -> StoreResult<Vec<u8>> {
        self.open(OpenMode::Read, |file| {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(buf)
        })
    }

    /// Read the blob as UTF-8 text.
    fn read_string(&self) -> StoreResult<String> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|e| StoreError::Validation(format!("{self} is not valid UTF-8: {e}")))
    }

    fn write_bytes(&self, bytes: &[u8]) -> StoreResult<()> {
        self.open(OpenMode::Write, |file| Ok(file.write_all(bytes)?))
    }

    fn write_str(&self, text: &str) -> StoreResult<()> {
        self.write_bytes(text.as_bytes())
    }
}
