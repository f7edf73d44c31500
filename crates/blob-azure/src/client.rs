use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;

use blob_core::{ClientError, StoreResult};
use blob_implicit::scoped::{self, FrameGuard, Frames};

use crate::rest::RestConnector;

/// The blob operations the Azure backend needs from a client bound to one
/// storage account.
pub trait AzureClient: Send + Sync {
    /// Existence check; a missing blob is a "not found" error.
    fn get_properties(&self, container: &str, name: &str) -> Result<(), ClientError>;

    /// Download the whole blob into `dest`, returning the byte count.
    fn download_to(&self, container: &str, name: &str, dest: &Path) -> Result<u64, ClientError>;

    /// Upload the file at `src` as a block blob, replacing any existing one.
    fn upload_from(&self, container: &str, name: &str, src: &Path) -> Result<u64, ClientError>;

    fn delete_blob(&self, container: &str, name: &str) -> Result<(), ClientError>;
}

/// Produces clients for a storage account.
pub trait AzureConnector: Send + Sync {
    fn connect(&self, storage_account: &str) -> StoreResult<Arc<dyn AzureClient>>;
}

thread_local! {
    static CONNECTORS: RefCell<Frames<Arc<dyn AzureConnector>>> = const { RefCell::new(Frames::new()) };
}

/// Keeps a connector override active until dropped.
#[derive(Debug)]
#[must_use = "the connector override ends as soon as the guard is dropped"]
pub struct ConnectorGuard {
    _frame: FrameGuard<Arc<dyn AzureConnector>>,
}

pub fn use_connector(connector: Arc<dyn AzureConnector>) -> ConnectorGuard {
    ConnectorGuard {
        _frame: scoped::push(&CONNECTORS, connector),
    }
}

pub fn with_connector<R>(connector: Arc<dyn AzureConnector>, f: impl FnOnce() -> R) -> R {
    let _guard = use_connector(connector);
    f()
}

/// The innermost override on this thread, or a [`RestConnector`] using
/// ambient credentials.
pub fn current_connector() -> Arc<dyn AzureConnector> {
    scoped::find_map(&CONNECTORS, |c| Some(Arc::clone(c)))
        .unwrap_or_else(|| Arc::new(RestConnector::default()))
}
