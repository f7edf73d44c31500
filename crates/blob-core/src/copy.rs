use std::io;

use tracing::debug;

use crate::error::StoreResult;
use crate::mode::OpenMode;
use crate::traits::Openable;

/// Stream every byte of `src` into `dest`.
///
/// Built only from [`Openable::open_with`], so any pairing of filesystem
/// paths and blob handles works. The destination is opened inside the
/// source's scope and both are released before this returns.
pub fn copy(src: &dyn Openable, dest: &dyn Openable) -> StoreResult<u64> {
    let mut copied = 0;
    src.open_with(OpenMode::Read, &mut |reader| {
        dest.open_with(OpenMode::Write, &mut |writer| {
            copied = io::copy(&mut *reader, &mut *writer)?;
            Ok(())
        })
    })?;
    debug!(bytes = copied, "copied blob");
    Ok(copied)
}
