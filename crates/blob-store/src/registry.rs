use std::path::Path;

use blob_core::{BlobPath, SerialisedBlobPath, StoreError, StoreResult};
use blob_azure::AzureBlobPath;
use blob_local::LocalRelativeBlobPath;
use blob_s3::S3BlobPath;
use tracing::debug;

use crate::handle::BlobHandle;

/// One registered backend.
#[derive(Clone, Copy)]
pub struct Backend {
    /// The backend's kind tag.
    pub kind: &'static str,
    deserialise: fn(&SerialisedBlobPath) -> StoreResult<BlobHandle>,
    create_default: fn(&Path) -> StoreResult<BlobHandle>,
}

impl Backend {
    const fn of<B>() -> Self
    where
        B: BlobPath + Into<BlobHandle>,
    {
        Self {
            kind: B::KIND,
            deserialise: deserialise_as::<B>,
            create_default: create_default_as::<B>,
        }
    }

    pub fn deserialise(&self, data: &SerialisedBlobPath) -> StoreResult<BlobHandle> {
        (self.deserialise)(data)
    }

    pub fn create_default(&self, logical_path: &Path) -> StoreResult<BlobHandle> {
        (self.create_default)(logical_path)
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").field("kind", &self.kind).finish()
    }
}

fn deserialise_as<B>(data: &SerialisedBlobPath) -> StoreResult<BlobHandle>
where
    B: BlobPath + Into<BlobHandle>,
{
    B::deserialise(data).map(Into::into)
}

fn create_default_as<B>(logical_path: &Path) -> StoreResult<BlobHandle>
where
    B: BlobPath + Into<BlobHandle>,
{
    B::create_default(logical_path).map(Into::into)
}

/// Every backend a serialized handle can name, in registration order.
pub static BACKENDS: [Backend; 3] = [
    Backend::of::<S3BlobPath>(),
    Backend::of::<LocalRelativeBlobPath>(),
    Backend::of::<AzureBlobPath>(),
];

/// The registered kind tags.
pub fn known_kinds() -> Vec<&'static str> {
    BACKENDS.iter().map(|b| b.kind).collect()
}

/// Look up the backend registered for `kind`.
pub fn backend(kind: &str) -> StoreResult<&'static Backend> {
    BACKENDS
        .iter()
        .find(|b| b.kind == kind)
        .ok_or_else(|| StoreError::UnknownBackendKind {
            kind: kind.to_owned(),
            known: known_kinds().into_iter().map(str::to_owned).collect(),
        })
}

/// Rebuild a handle from its serialized form, dispatching on `data.kind`.
pub fn deserialise(data: &SerialisedBlobPath) -> StoreResult<BlobHandle> {
    let handle = backend(&data.kind)?.deserialise(data)?;
    debug!(kind = %data.kind, "deserialised blob handle");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_are_unique() {
        let mut kinds = known_kinds();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), BACKENDS.len());
    }

    #[test]
    fn unknown_kind_lists_exactly_the_registered_kinds() {
        let data = SerialisedBlobPath::new("nonexistent-backend", json!({}));
        match deserialise(&data) {
            Err(StoreError::UnknownBackendKind { kind, known }) => {
                assert_eq!(kind, "nonexistent-backend");
                assert_eq!(
                    known,
                    ["blob-store-aws", "blob-store-local-relative", "blob-store-azure"]
                );
            }
            other => panic!("expected UnknownBackendKind, got {other:?}"),
        }
    }

    #[test]
    fn dispatches_on_kind() {
        let data = SerialisedBlobPath::new(
            "blob-store-aws",
            json!({"bucket": "bkt", "region": "us-east-1", "object_key": "k1"}),
        );
        assert_eq!(
            deserialise(&data).unwrap(),
            BlobHandle::S3(S3BlobPath::new("bkt", "us-east-1", "k1"))
        );

        let data = SerialisedBlobPath::new(
            "blob-store-local-relative",
            json!({"relpath_parts": ["a", "b.txt"]}),
        );
        assert_eq!(
            deserialise(&data).unwrap(),
            BlobHandle::LocalRelative(LocalRelativeBlobPath::from_parts(["a", "b.txt"]).unwrap())
        );
    }

    #[test]
    fn payload_shape_is_checked_by_the_selected_backend() {
        let data = SerialisedBlobPath::new("blob-store-azure", json!({"relpath_parts": ["a"]}));
        assert!(matches!(deserialise(&data), Err(StoreError::Validation(_))));
    }
}
