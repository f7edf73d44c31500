use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use blob_core::{BlobPath, ClientError, OpenMode, Openable, StagingFile, StoreResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{current_connector, AzureClient};

/// Implicit variable holding the storage account used by
/// [`AzureBlobPath::create_default`].
pub const IMPLICIT_GEN_STORAGE_ACCOUNT: &str =
    blob_implicit::prefixed!("GEN_AZURE_BLOB_STORAGE_ACCOUNT");
/// Implicit variable holding the container used by
/// [`AzureBlobPath::create_default`].
pub const IMPLICIT_GEN_CONTAINER: &str = blob_implicit::prefixed!("GEN_AZURE_BLOB_CONTAINER");

/// Identity fields of an [`AzureBlobPath`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzurePayload {
    pub storage_account: String,
    pub container: String,
    pub name: String,
}

/// A blob in an Azure storage account container.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AzureBlobPath {
    storage_account: String,
    container: String,
    name: String,
}

impl AzureBlobPath {
    pub fn new(
        storage_account: impl Into<String>,
        container: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            storage_account: storage_account.into(),
            container: container.into(),
            name: name.into(),
        }
    }

    pub fn storage_account(&self) -> &str {
        &self.storage_account
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn client(&self) -> StoreResult<Arc<dyn AzureClient>> {
        current_connector().connect(&self.storage_account)
    }
}

impl Openable for AzureBlobPath {
    fn open_with(
        &self,
        mode: OpenMode,
        f: &mut dyn FnMut(&mut File) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let client = self.client()?;
        let staging = StagingFile::new()?;
        match mode {
            OpenMode::Read => {
                let bytes = client
                    .download_to(&self.container, &self.name, staging.path())
                    .map_err(|e| e.into_store_error(self))?;
                debug!(container = %self.container, name = %self.name, bytes, "downloaded blob");
                f(&mut staging.open()?)
            }
            OpenMode::Write => {
                {
                    let mut file = staging.create()?;
                    f(&mut file)?;
                    file.sync_all()?;
                }
                let bytes = client
                    .upload_from(&self.container, &self.name, staging.path())
                    .map_err(|e| e.into_store_error(self))?;
                debug!(container = %self.container, name = %self.name, bytes, "uploaded blob");
                Ok(())
            }
        }
    }
}

impl BlobPath for AzureBlobPath {
    const KIND: &'static str = "blob-store-azure";
    type Payload = AzurePayload;

    fn exists(&self) -> StoreResult<bool> {
        let client = self.client()?;
        ClientError::existence(client.get_properties(&self.container, &self.name), self)
    }

    fn delete(&self) -> StoreResult<bool> {
        let client = self.client()?;
        if !ClientError::existence(client.get_properties(&self.container, &self.name), self)? {
            return Ok(false);
        }
        match client.delete_blob(&self.container, &self.name) {
            Ok(()) => {
                debug!(container = %self.container, name = %self.name, "deleted blob");
                Ok(true)
            }
            // Lost a race with another deleter.
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into_store_error(self)),
        }
    }

    fn payload(&self) -> AzurePayload {
        AzurePayload {
            storage_account: self.storage_account.clone(),
            container: self.container.clone(),
            name: self.name.clone(),
        }
    }

    fn from_payload(payload: AzurePayload) -> StoreResult<Self> {
        Ok(Self::new(
            payload.storage_account,
            payload.container,
            payload.name,
        ))
    }

    fn create_default(logical_path: &Path) -> StoreResult<Self> {
        let storage_account = blob_implicit::get(IMPLICIT_GEN_STORAGE_ACCOUNT)?;
        let container = blob_implicit::get(IMPLICIT_GEN_CONTAINER)?;
        let name = blob_core::logical::key(logical_path)?;
        Ok(Self::new(storage_account, container, name))
    }
}

impl fmt::Display for AzureBlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kind={} storage_account={} container={} name={}",
            Self::KIND,
            self.storage_account,
            self.container,
            self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;
    use crate::client::with_connector;
    use crate::memory::{AzureOp, InMemoryAzure};
    use blob_core::{SerialisedBlobPath, StoreError};
    use proptest::prelude::*;
    use serde_json::json;

    fn with_azure<R>(store: &InMemoryAzure, f: impl FnOnce() -> R) -> (tempfile::TempDir, R) {
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

    fn blob() -> AzureBlobPath {
        AzureBlobPath::new("acct", "data", "runs/1/model.bin")
    }

    #[test]
    fn serialised_wire_shape() {
        let s = blob().serialise().unwrap();
        assert_eq!(
            serde_json::to_value(&s).unwrap(),
            json!({
                "kind": "blob-store-azure",
                "payload": {"storage_account": "acct", "container": "data", "name": "runs/1/model.bin"}
            })
        );
        assert_eq!(AzureBlobPath::deserialise(&s).unwrap(), blob());
    }

    #[test]
    fn deserialise_rejects_foreign_payloads() {
        let s3_shaped = SerialisedBlobPath::new(
            AzureBlobPath::KIND,
            json!({"bucket": "bkt", "region": "us-east-1", "object_key": "k1"}),
        );
        assert!(matches!(
            AzureBlobPath::deserialise(&s3_shaped),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn lifecycle_against_memory_store() {
        let store = InMemoryAzure::new();
        let (tmp, ()) = with_azure(&store, || {
            assert!(!blob().exists().unwrap());
            blob()
                .open(OpenMode::Write, |file| Ok(file.write_all(b"weights")?))
                .unwrap();
            assert!(blob().exists().unwrap());
            let text = blob()
                .open(OpenMode::Read, |file| {
                    let mut s = String::new();
                    file.read_to_string(&mut s)?;
                    Ok(s)
                })
                .unwrap();
            assert_eq!(text, "weights");
            assert!(blob().delete().unwrap());
            assert!(!blob().delete().unwrap());
        });
        assert!(store.is_empty());
        assert_eq!(staged_files(&tmp), 0);
    }

    #[test]
    fn reading_a_missing_blob_is_does_not_exist() {
        let store = InMemoryAzure::new();
        let (tmp, result) = with_azure(&store, || blob().read_bytes());
        assert!(matches!(result, Err(StoreError::DoesNotExist(_))));
        assert_eq!(staged_files(&tmp), 0);
    }

    #[test]
    fn auth_failures_propagate_from_exists() {
        let store = InMemoryAzure::new();
        store.inject_fault(AzureOp::Properties, || {
            ClientError::response(Some(403), "AuthorizationPermissionMismatch", "forbidden")
        });
        let (_tmp, result) = with_azure(&store, || blob().exists());
        assert!(matches!(result, Err(StoreError::Transport(_))));
    }

    #[test]
    fn failed_upload_leaves_no_staging_file() {
        let store = InMemoryAzure::new();
        store.inject_fault(AzureOp::Upload, || ClientError::Transport("reset".into()));
        let (tmp, result) = with_azure(&store, || blob().write_bytes(b"x"));
        assert!(matches!(result, Err(StoreError::Transport(_))));
        assert_eq!(staged_files(&tmp), 0);
    }

    #[test]
    fn create_default_reads_implicit_account_and_container() {
        let handle = blob_implicit::with_vars(
            [
                (IMPLICIT_GEN_STORAGE_ACCOUNT, "genacct"),
                (IMPLICIT_GEN_CONTAINER, "gencontainer"),
            ],
            || AzureBlobPath::create_default(Path::new("a/b.txt")),
        )
        .unwrap();
        assert_eq!(handle, AzureBlobPath::new("genacct", "gencontainer", "a/b.txt"));
    }

    #[test]
    fn create_default_normalises_the_logical_path() {
        let vars = [
            (IMPLICIT_GEN_STORAGE_ACCOUNT, "acct"),
            (IMPLICIT_GEN_CONTAINER, "data"),
        ];
        let (plain, messy) = blob_implicit::with_vars(vars, || {
            (
                AzureBlobPath::create_default(Path::new("runs/7")).unwrap(),
                AzureBlobPath::create_default(Path::new("./runs//7/")).unwrap(),
            )
        });
        assert_eq!(plain, messy);
        assert_eq!(messy.name(), "runs/7");
    }

    #[test]
    fn panicking_scopes_remove_their_staging_files() {
        let store = InMemoryAzure::new();
        store.put("acct", "data", "runs/1/model.bin", b"weights".to_vec());
        for mode in [OpenMode::Read, OpenMode::Write] {
            let (tmp, result) = with_azure(&store, || {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    blob().open(mode, |_| -> StoreResult<()> { panic!("scope crashed") })
                }))
            });
            assert!(result.is_err(), "{mode}");
            assert_eq!(staged_files(&tmp), 0, "{mode}");
        }
        assert_eq!(
            store.get("acct", "data", "runs/1/model.bin"),
            Some(b"weights".to_vec())
        );
    }

    #[test]
    fn display() {
        assert_eq!(
            blob().to_string(),
            "kind=blob-store-azure storage_account=acct container=data name=runs/1/model.bin"
        );
    }

    proptest! {
        #[test]
        fn serialise_round_trip(
            account in "[a-z0-9]{3,24}",
            container in "[a-z0-9-]{3,20}",
            name in "\\PC{1,60}",
        ) {
            let handle = AzureBlobPath::new(account, container, name);
            let back = AzureBlobPath::deserialise(&handle.serialise().unwrap()).unwrap();
            prop_assert_eq!(back, handle);
        }
    }
}
