//! Backend-agnostic blob handles.
//!
//! A *blob* is a named, opaque byte sequence held by some storage backend.
//! A *handle* identifies one blob by its backend and the identity fields
//! that locate it, and nothing more. Handles are cheap to clone, carry no
//! live sessions or descriptors, and serialize to a self-describing
//! [`SerialisedBlobPath`] that any process can turn back into an equal
//! handle.
//!
//! # Interface
//!
//! Every backend implements [`BlobPath`]:
//!
//! - `exists` / `delete`: existence check and idempotent delete
//! - `open`: scoped access to the bytes through a local [`std::fs::File`]
//! - `serialise` / `deserialise`: the kind-tagged wire form
//! - `create_default`: a handle for a logical path, configured from the
//!   implicit variable context
//! - `cp`: a generic copy built only from `open`
//!
//! [`Openable`] is the object-safe slice of that interface. Raw filesystem
//! paths implement it too, which is what lets [`copy()`] move bytes between
//! any combination of paths and handles.
//!
//! # Errors
//!
//! Backend client failures are reported as [`ClientError`] and run through
//! [`classify`]. Only "not found" is ever turned into an ordinary `false`;
//! everything else propagates.

pub mod classify;
pub mod copy;
pub mod error;
pub mod logical;
pub mod mode;
pub mod serialised;
pub mod staging;
pub mod traits;

pub use classify::{classify, ClientError, ErrorClass, NOT_FOUND_CODES};
pub use copy::copy;
pub use error::{StoreError, StoreResult};
pub use mode::OpenMode;
pub use serialised::SerialisedBlobPath;
pub use staging::{staging_dir, StagingFile, TMP_DIR_VAR};
pub use traits::{BlobPath, Openable};
