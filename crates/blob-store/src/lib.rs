//! Serializable handles to blobs in interchangeable storage backends.
//!
//! ```text
//! BlobHandle ─┬─ LocalRelativeBlobPath   "blob-store-local-relative"
//!             ├─ S3BlobPath              "blob-store-aws"
//!             └─ AzureBlobPath           "blob-store-azure"
//! ```
//!
//! A handle serializes to `{"kind": ..., "payload": ...}` and [`deserialise`]
//! turns that back into the right backend using only the kind tag. Backend
//! defaults (base directory, bucket, storage account, ...) come from the
//! implicit variable context in [`implicit`], so code can build handles
//! with [`BlobHandle::create_default`] without knowing which backend is
//! configured.
//!
//! [`cp`] copies between any two operands, each a filesystem path or a
//! handle.
//!
//! # Adding a backend
//!
//! Implement [`BlobPath`] for the new handle type, add a [`BlobHandle`]
//! variant, and register its kind in [`registry`].

pub mod copy;
pub mod handle;
pub mod registry;

pub use blob_core::{
    classify, BlobPath, ClientError, ErrorClass, OpenMode, Openable, SerialisedBlobPath,
    StagingFile, StoreError, StoreResult,
};
pub use blob_implicit as implicit;
pub use blob_azure::{self as azure, AzureBlobPath};
pub use blob_local::{self as local, LocalRelativeBlobPath};
pub use blob_s3::{self as s3, S3BlobPath};
pub use copy::{cp, Operand};
pub use handle::BlobHandle;
pub use registry::{backend, deserialise, known_kinds, Backend, BACKENDS};
