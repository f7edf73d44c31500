use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;

use blob_core::{ClientError, StoreResult};
use blob_implicit::scoped::{self, FrameGuard, Frames};

use crate::aws::AwsConnector;

/// The object operations the S3 backend needs from a client.
///
/// Errors are returned raw; classification into the store's taxonomy is
/// the caller's job (see [`blob_core::classify`]).
pub trait S3Client: Send + Sync {
    /// Metadata-only existence check.
    fn head_object(&self, bucket: &str, key: &str) -> Result<(), ClientError>;

    /// Download the whole object into `dest`, returning the byte count.
    fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, ClientError>;

    /// Upload the whole file at `src` as the object's new contents.
    fn upload_from(&self, bucket: &str, key: &str, src: &Path) -> Result<u64, ClientError>;

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ClientError>;
}

/// Produces clients for a region.
pub trait S3Connector: Send + Sync {
    fn connect(&self, region: &str) -> StoreResult<Arc<dyn S3Client>>;
}

thread_local! {
    static CONNECTORS: RefCell<Frames<Arc<dyn S3Connector>>> = const { RefCell::new(Frames::new()) };
}

/// Keeps a connector override active until dropped.
#[derive(Debug)]
#[must_use = "the connector override ends as soon as the guard is dropped"]
pub struct ConnectorGuard {
    _frame: FrameGuard<Arc<dyn S3Connector>>,
}

/// Make `connector` the active one on this thread until the guard drops.
pub fn use_connector(connector: Arc<dyn S3Connector>) -> ConnectorGuard {
    ConnectorGuard {
        _frame: scoped::push(&CONNECTORS, connector),
    }
}

/// Run `f` with `connector` active.
pub fn with_connector<R>(connector: Arc<dyn S3Connector>, f: impl FnOnce() -> R) -> R {
    let _guard = use_connector(connector);
    f()
}

/// The innermost override on this thread, or the AWS SDK connector.
pub fn current_connector() -> Arc<dyn S3Connector> {
    scoped::find_map(&CONNECTORS, |c| Some(Arc::clone(c)))
        .unwrap_or_else(|| Arc::new(AwsConnector))
}
