use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use blob_core::{ClientError, StoreResult};

use crate::client::{S3Client, S3Connector};

/// Operations of [`S3Client`], for fault injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum S3Op {
    Head,
    Download,
    Upload,
    Delete,
}

#[derive(Default)]
struct State {
    objects: HashMap<(String, String), Vec<u8>>,
    faults: HashMap<S3Op, fn() -> ClientError>,
}

/// In-memory S3 stand-in, acting as both connector and client.
///
/// Intended for tests and embedding. Clones share the same objects, so a
/// test can keep one clone for inspection while the backend uses another.
/// Regions are accepted but ignored; objects are keyed by bucket and key.
#[derive(Clone, Default)]
pub struct InMemoryS3 {
    state: Arc<RwLock<State>>,
}

impl InMemoryS3 {
    pub fn new() -> Self {
        Self::default()
    }

    /// This store as a connector, ready for [`with_connector`](crate::with_connector).
    pub fn connector(&self) -> Arc<dyn S3Connector> {
        Arc::new(self.clone())
    }

    /// Insert an object directly.
    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.state
            .write()
            .expect("lock poisoned")
            .objects
            .insert((bucket.to_owned(), key.to_owned()), data.into());
    }

    /// Fetch an object's bytes directly.
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .expect("lock poisoned")
            .objects
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every future `op` fail with the error produced by `make`.
    pub fn inject_fault(&self, op: S3Op, make: fn() -> ClientError) {
        self.state
            .write()
            .expect("lock poisoned")
            .faults
            .insert(op, make);
    }

    pub fn clear_faults(&self) {
        self.state.write().expect("lock poisoned").faults.clear();
    }

    fn check(&self, op: S3Op) -> Result<(), ClientError> {
        match self.state.read().expect("lock poisoned").faults.get(&op) {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }

    fn object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ClientError> {
        self.get(bucket, key)
            .ok_or_else(|| ClientError::response(Some(404), "NoSuchKey", format!("{bucket}/{key}")))
    }
}

impl S3Connector for InMemoryS3 {
    fn connect(&self, _region: &str) -> StoreResult<Arc<dyn S3Client>> {
        Ok(Arc::new(self.clone()))
    }
}

impl S3Client for InMemoryS3 {
    fn head_object(&self, bucket: &str, key: &str) -> Result<(), ClientError> {
        self.check(S3Op::Head)?;
        // HEAD responses carry no body, so S3 reports a bare status code.
        match self.get(bucket, key) {
            Some(_) => Ok(()),
            None => Err(ClientError::response(Some(404), "404", "Not Found")),
        }
    }

    fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, ClientError> {
        self.check(S3Op::Download)?;
        let data = self.object(bucket, key)?;
        fs::write(dest, &data)?;
        Ok(data.len() as u64)
    }

    fn upload_from(&self, bucket: &str, key: &str, src: &Path) -> Result<u64, ClientError> {
        self.check(S3Op::Upload)?;
        let data = fs::read(src)?;
        let len = data.len() as u64;
        self.put(bucket, key, data);
        Ok(len)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ClientError> {
        self.check(S3Op::Delete)?;
        self.state
            .write()
            .expect("lock poisoned")
            .objects
            .remove(&(bucket.to_owned(), key.to_owned()));
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryS3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryS3")
            .field("object_count", &self.len())
            .finish()
    }
}
