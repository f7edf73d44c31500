use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use blob_core::{BlobPath, ClientError, OpenMode, Openable, StagingFile, StoreResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{current_connector, S3Client};

/// Implicit variable holding the bucket used by [`S3BlobPath::create_default`].
pub const IMPLICIT_GEN_BUCKET: &str = blob_implicit::prefixed!("GEN_S3_BUCKET");
/// Implicit variable holding the region used by [`S3BlobPath::create_default`].
pub const IMPLICIT_GEN_REGION: &str = blob_implicit::prefixed!("GEN_S3_REGION");

/// Identity fields of an [`S3BlobPath`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Payload {
    pub bucket: String,
    pub region: String,
    pub object_key: String,
}

/// An object in an S3-compatible bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct S3BlobPath {
    bucket: String,
    region: String,
    object_key: String,
}

impl S3BlobPath {
    pub fn new(
        bucket: impl Into<String>,
        region: impl Into<String>,
        object_key: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            object_key: object_key.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    fn client(&self) -> StoreResult<Arc<dyn S3Client>> {
        current_connector().connect(&self.region)
    }

    fn download(&self, client: &dyn S3Client, staging: &StagingFile) -> StoreResult<()> {
        let bytes = client
            .download_to(&self.bucket, &self.object_key, staging.path())
            .map_err(|e| e.into_store_error(self))?;
        debug!(bucket = %self.bucket, key = %self.object_key, bytes, "downloaded object");
        Ok(())
    }

    fn upload(&self, client: &dyn S3Client, staging: &StagingFile) -> StoreResult<()> {
        let bytes = client
            .upload_from(&self.bucket, &self.object_key, staging.path())
            .map_err(|e| e.into_store_error(self))?;
        debug!(bucket = %self.bucket, key = %self.object_key, bytes, "uploaded object");
        Ok(())
    }
}

impl Openable for S3BlobPath {
    fn open_with(
        &self,
        mode: OpenMode,
        f: &mut dyn FnMut(&mut File) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let client = self.client()?;
        let staging = StagingFile::new()?;
        match mode {
            OpenMode::Read => {
                self.download(client.as_ref(), &staging)?;
                f(&mut staging.open()?)
            }
            OpenMode::Write => {
                {
                    let mut file = staging.create()?;
                    f(&mut file)?;
                    file.sync_all()?;
                }
                self.upload(client.as_ref(), &staging)
            }
        }
    }
}

impl BlobPath for S3BlobPath {
    const KIND: &'static str = "blob-store-aws";
    type Payload = S3Payload;

    fn exists(&self) -> StoreResult<bool> {
        let client = self.client()?;
        ClientError::existence(client.head_object(&self.bucket, &self.object_key), self)
    }

    fn delete(&self) -> StoreResult<bool> {
        let client = self.client()?;
        if !ClientError::existence(client.head_object(&self.bucket, &self.object_key), self)? {
            return Ok(false);
        }
        client
            .delete_object(&self.bucket, &self.object_key)
            .map_err(|e| e.into_store_error(self))?;
        debug!(bucket = %self.bucket, key = %self.object_key, "deleted object");
        Ok(true)
    }

    fn payload(&self) -> S3Payload {
        S3Payload {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            object_key: self.object_key.clone(),
        }
    }

    fn from_payload(payload: S3Payload) -> StoreResult<Self> {
        Ok(Self::new(payload.bucket, payload.region, payload.object_key))
    }

    fn create_default(logical_path: &Path) -> StoreResult<Self> {
        let bucket = blob_implicit::get(IMPLICIT_GEN_BUCKET)?;
        let region = blob_implicit::get(IMPLICIT_GEN_REGION)?;
        let key = blob_core::logical::key(logical_path)?;
        Ok(Self::new(bucket, region, key))
    }
}

impl fmt::Display for S3BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kind={} bucket={} region={} object_key={}",
            Self::KIND,
            self.bucket,
            self.region,
            self.object_key
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::client::with_connector;
    use crate::memory::{InMemoryS3, S3Op};
    use blob_core::{SerialisedBlobPath, StoreError};
    use proptest::prelude::*;
    use serde_json::json;

    /// Run `f` against an in-memory S3 with staging files under a private
    /// directory, returning the directory for inspection.
    fn with_s3<R>(store: &InMemoryS3, f: impl FnOnce() -> R) -> (tempfile::TempDir, R) {
        let tmp = tempfile::tempdir().unwrap();
        let out = blob_implicit::with_vars(
            [(blob_core::TMP_DIR_VAR, tmp.path().to_str().unwrap())],
            || with_connector(store.connector(), f),
        );
        (tmp, out)
    }

    fn staged_files(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    fn blob() -> S3BlobPath {
        S3BlobPath::new("bkt", "us-east-1", "k1")
    }

    #[test]
    fn serialised_wire_shape() {
        let s = blob().serialise().unwrap();
        assert_eq!(
            serde_json::to_value(&s).unwrap(),
            json!({
                "kind": "blob-store-aws",
                "payload": {"bucket": "bkt", "region": "us-east-1", "object_key": "k1"}
            })
        );
        assert_eq!(S3BlobPath::deserialise(&s).unwrap(), blob());
    }

    #[test]
    fn deserialise_rejects_incomplete_payload() {
        let data = SerialisedBlobPath::new(
            S3BlobPath::KIND,
            json!({"bucket": "bkt", "object_key": "k1"}),
        );
        let err = S3BlobPath::deserialise(&data).unwrap_err();
        assert!(matches!(err, StoreError::Validation(msg) if msg.contains("region")));
    }

    #[test]
    fn write_then_read_cleans_up_staging() {
        let store = InMemoryS3::new();
        let (tmp, ()) = with_s3(&store, || {
            assert!(!blob().exists().unwrap());
            blob().write_bytes(b"hello").unwrap();
            assert!(blob().exists().unwrap());
            assert_eq!(blob().read_bytes().unwrap(), b"hello");
        });
        assert_eq!(store.get("bkt", "k1"), Some(b"hello".to_vec()));
        assert_eq!(staged_files(&tmp), 0);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = InMemoryS3::new();
        store.put("bkt", "k1", b"x".to_vec());
        with_s3(&store, || {
            assert!(blob().delete().unwrap());
            assert!(!blob().exists().unwrap());
            assert!(!blob().delete().unwrap());
        });
        assert!(store.is_empty());
    }

    #[test]
    fn failing_write_scope_uploads_nothing_and_cleans_up() {
        let store = InMemoryS3::new();
        let (tmp, result) = with_s3(&store, || {
            blob().open(OpenMode::Write, |file| -> StoreResult<()> {
                file.write_all(b"partial")?;
                Err(StoreError::Validation("abandoned".into()))
            })
        });
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert!(store.is_empty());
        assert_eq!(staged_files(&tmp), 0);
    }

    #[test]
    fn failing_read_scope_cleans_up() {
        let store = InMemoryS3::new();
        store.put("bkt", "k1", b"data".to_vec());
        let (tmp, result) = with_s3(&store, || {
            blob().open(OpenMode::Read, |_| -> StoreResult<()> {
                Err(StoreError::Transport("reader failed".into()))
            })
        });
        assert!(result.is_err());
        assert_eq!(staged_files(&tmp), 0);
    }

    #[test]
    fn upload_failure_propagates_and_cleans_up() {
        let store = InMemoryS3::new();
        store.inject_fault(S3Op::Upload, || {
            ClientError::response(Some(403), "AccessDenied", "denied")
        });
        let (tmp, result) = with_s3(&store, || blob().write_bytes(b"x"));
        assert!(matches!(result, Err(StoreError::Transport(msg)) if msg.contains("AccessDenied")));
        assert_eq!(staged_files(&tmp), 0);
    }

    #[test]
    fn vanished_object_is_does_not_exist() {
        let store = InMemoryS3::new();
        let (tmp, result) = with_s3(&store, || blob().read_bytes());
        assert!(matches!(result, Err(StoreError::DoesNotExist(_))));
        assert_eq!(staged_files(&tmp), 0);
    }

    #[test]
    fn exists_separates_not_found_from_other_failures() {
        let store = InMemoryS3::new();
        store.inject_fault(S3Op::Head, || ClientError::Transport("timeout".into()));
        let (_tmp, result) = with_s3(&store, || blob().exists());
        assert!(matches!(result, Err(StoreError::Transport(_))));

        store.inject_fault(S3Op::Head, || ClientError::Response {
            status: Some(500),
            code: None,
            message: "<html>gateway</html>".into(),
        });
        let (_tmp, result) = with_s3(&store, || blob().exists());
        assert!(matches!(result, Err(StoreError::ContractViolation(_))));

        let (_tmp, result) = with_s3(&store, || blob().delete());
        assert!(matches!(result, Err(StoreError::ContractViolation(_))));
    }

    #[test]
    fn create_default_reads_implicit_bucket_and_region() {
        let handle = blob_implicit::with_vars(
            [(IMPLICIT_GEN_BUCKET, "gen-bkt"), (IMPLICIT_GEN_REGION, "eu-west-1")],
            || S3BlobPath::create_default(Path::new("runs/7/out.json")),
        )
        .unwrap();
        assert_eq!(handle, S3BlobPath::new("gen-bkt", "eu-west-1", "runs/7/out.json"));
    }

    #[test]
    fn create_default_normalises_the_logical_path() {
        let vars = [(IMPLICIT_GEN_BUCKET, "bkt"), (IMPLICIT_GEN_REGION, "us-east-1")];
        let (plain, messy) = blob_implicit::with_vars(vars, || {
            (
                S3BlobPath::create_default(Path::new("runs/7")).unwrap(),
                S3BlobPath::create_default(Path::new("./runs//7/")).unwrap(),
            )
        });
        assert_eq!(plain, messy);
        assert_eq!(messy.object_key(), "runs/7");

        let escaped = blob_implicit::with_vars(vars, || {
            S3BlobPath::create_default(Path::new("../outside"))
        });
        assert!(matches!(escaped, Err(StoreError::Validation(_))));
    }

    #[test]
    fn panicking_scopes_remove_their_staging_files() {
        let store = InMemoryS3::new();
        store.put("bkt", "k1", b"data".to_vec());
        for mode in [OpenMode::Read, OpenMode::Write] {
            let (tmp, result) = with_s3(&store, || {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    blob().open(mode, |_| -> StoreResult<()> { panic!("scope crashed") })
                }))
            });
            assert!(result.is_err(), "{mode}");
            assert_eq!(staged_files(&tmp), 0, "{mode}");
        }
        assert_eq!(store.get("bkt", "k1"), Some(b"data".to_vec()));
    }

    #[test]
    fn create_default_without_bucket_fails() {
        let err = blob_implicit::with_vars([(IMPLICIT_GEN_REGION, "eu-west-1")], || {
            S3BlobPath::create_default(Path::new("k"))
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Implicit(_)));
    }

    #[test]
    fn display() {
        assert_eq!(
            blob().to_string(),
            "kind=blob-store-aws bucket=bkt region=us-east-1 object_key=k1"
        );
    }

    proptest! {
        #[test]
        fn serialise_round_trip(
            bucket in "[a-z0-9.-]{3,20}",
            region in "[a-z]{2}-[a-z]{4,9}-[1-9]",
            key in "\\PC{1,40}",
        ) {
            let handle = S3BlobPath::new(bucket, region, key);
            let back = S3BlobPath::deserialise(&handle.serialise().unwrap()).unwrap();
            prop_assert_eq!(back, handle);
        }
    }
}
