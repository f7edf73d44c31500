use std::path::{Component, Path};

use crate::error::{StoreError, StoreResult};

/// Split a relative logical path into its normal segments.
///
/// `.` segments, repeated separators and a trailing separator are dropped,
/// so `./runs//7/` and `runs/7` yield the same segments. Absolute paths and
/// `..` segments are rejected.
pub fn segments(logical_path: &Path) -> StoreResult<Vec<String>> {
    let mut parts = Vec::new();
    for component in logical_path.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| {
                        StoreError::Validation(format!(
                            "logical path {} is not valid unicode",
                            logical_path.display()
                        ))
                    })?
                    .to_owned(),
            ),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StoreError::Validation(format!(
                    "logical path {} must be relative and must not contain `..`",
                    logical_path.display()
                )))
            }
        }
    }
    if parts.is_empty() {
        return Err(StoreError::Validation(format!(
            "logical path {} is empty",
            logical_path.display()
        )));
    }
    Ok(parts)
}

/// The `/`-joined key for a logical path, as used by object and blob stores.
pub fn key(logical_path: &Path) -> StoreResult<String> {
    Ok(segments(logical_path)?.join("/"))
}
