use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use blob_core::{ClientError, StoreResult};

use crate::client::{AzureClient, AzureConnector};

/// Operations of [`AzureClient`], for fault injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AzureOp {
    Properties,
    Download,
    Upload,
    Delete,
}

type BlobKey = (String, String, String);

#[derive(Default)]
struct State {
    blobs: HashMap<BlobKey, Vec<u8>>,
    faults: HashMap<AzureOp, fn() -> ClientError>,
}

/// In-memory Azure Blob Storage stand-in, acting as connector and client.
///
/// Blobs are keyed by storage account, container, and name. Clones share
/// state.
#[derive(Clone, Default)]
pub struct InMemoryAzure {
    state: Arc<RwLock<State>>,
}

/// A client view of [`InMemoryAzure`] bound to one storage account.
struct AccountClient {
    store: InMemoryAzure,
    account: String,
}

impl InMemoryAzure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn AzureConnector> {
        Arc::new(self.clone())
    }

    pub fn put(&self, account: &str, container: &str, name: &str, data: impl Into<Vec<u8>>) {
        self.state
            .write()
            .expect("lock poisoned")
            .blobs
            .insert(key(account, container, name), data.into());
    }

    pub fn get(&self, account: &str, container: &str, name: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .expect("lock poisoned")
            .blobs
            .get(&key(account, container, name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inject_fault(&self, op: AzureOp, make: fn() -> ClientError) {
        self.state
            .write()
            .expect("lock poisoned")
            .faults
            .insert(op, make);
    }

    pub fn clear_faults(&self) {
        self.state.write().expect("lock poisoned").faults.clear();
    }

    fn check(&self, op: AzureOp) -> Result<(), ClientError> {
        match self.state.read().expect("lock poisoned").faults.get(&op) {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

fn key(account: &str, container: &str, name: &str) -> BlobKey {
    (account.to_owned(), container.to_owned(), name.to_owned())
}

fn blob_not_found() -> ClientError {
    ClientError::response(
        Some(404),
        "BlobNotFound",
        "The specified blob does not exist.",
    )
}

impl AzureConnector for InMemoryAzure {
    fn connect(&self, storage_account: &str) -> StoreResult<Arc<dyn AzureClient>> {
        Ok(Arc::new(AccountClient {
            store: self.clone(),
            account: storage_account.to_owned(),
        }))
    }
}

impl AzureClient for AccountClient {
    fn get_properties(&self, container: &str, name: &str) -> Result<(), ClientError> {
        self.store.check(AzureOp::Properties)?;
        match self.store.get(&self.account, container, name) {
            Some(_) => Ok(()),
            None => Err(blob_not_found()),
        }
    }

    fn download_to(&self, container: &str, name: &str, dest: &Path) -> Result<u64, ClientError> {
        self.store.check(AzureOp::Download)?;
        let data = self
            .store
            .get(&self.account, container, name)
            .ok_or_else(blob_not_found)?;
        fs::write(dest, &data)?;
        Ok(data.len() as u64)
    }

    fn upload_from(&self, container: &str, name: &str, src: &Path) -> Result<u64, ClientError> {
        self.store.check(AzureOp::Upload)?;
        let data = fs::read(src)?;
        let len = data.len() as u64;
        self.store.put(&self.account, container, name, data);
        Ok(len)
    }

    fn delete_blob(&self, container: &str, name: &str) -> Result<(), ClientError> {
        self.store.check(AzureOp::Delete)?;
        let removed = self
            .store
            .state
            .write()
            .expect("lock poisoned")
            .blobs
            .remove(&key(&self.account, container, name));
        match removed {
            Some(_) => Ok(()),
            None => Err(blob_not_found()),
        }
    }
}

impl std::fmt::Debug for InMemoryAzure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAzure")
            .field("blob_count", &self.len())
            .finish()
    }
}
