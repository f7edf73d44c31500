use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use blob_core::{OpenMode, Openable, StoreResult};
use tracing::debug;

use crate::handle::BlobHandle;

/// One side of a [`cp`]: a filesystem path or a blob handle.
#[derive(Clone, Copy, Debug)]
pub enum Operand<'a> {
    Path(&'a Path),
    Handle(&'a BlobHandle),
}

impl Openable for Operand<'_> {
    fn open_with(
        &self,
        mode: OpenMode,
        f: &mut dyn FnMut(&mut File) -> StoreResult<()>,
    ) -> StoreResult<()> {
        match self {
            Operand::Path(path) => path.open_with(mode, f),
            Operand::Handle(handle) => handle.open_with(mode, f),
        }
    }
}

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Path(path) => write!(f, "path={}", path.display()),
            Operand::Handle(handle) => write!(f, "{handle}"),
        }
    }
}

impl<'a> From<&'a Path> for Operand<'a> {
    fn from(path: &'a Path) -> Self {
        Operand::Path(path)
    }
}

impl<'a> From<&'a PathBuf> for Operand<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Operand::Path(path)
    }
}

impl<'a> From<&'a BlobHandle> for Operand<'a> {
    fn from(handle: &'a BlobHandle) -> Self {
        Operand::Handle(handle)
    }
}

/// Copy every byte of `src` to `dest`, returning the number of bytes.
///
/// Either side may be a filesystem path or a handle in any backend.
pub fn cp<'a, 'b>(src: impl Into<Operand<'a>>, dest: impl Into<Operand<'b>>) -> StoreResult<u64> {
    let (src, dest) = (src.into(), dest.into());
    let bytes = blob_core::copy(&src, &dest)?;
    debug!(%src, %dest, bytes, "cp");
    Ok(bytes)
}
