//! S3-compatible object storage backend.
//!
//! An [`S3BlobPath`] is a bucket, a region, and an object key. Reads stage
//! the whole object into a local [`StagingFile`](blob_core::StagingFile)
//! before handing it out; writes go to a staging file first and are
//! uploaded in one piece when the scope ends.
//!
//! Network access goes through the [`S3Client`] capability, obtained per
//! region from the active [`S3Connector`]. The default connector is
//! [`AwsConnector`]; tests and embedders can swap in another one for a
//! scope with [`with_connector`], e.g. an [`InMemoryS3`].

pub mod aws;
pub mod client;
pub mod memory;
pub mod path;

pub use aws::{AwsConnector, AwsS3Client};
pub use client::{
    current_connector, use_connector, with_connector, ConnectorGuard, S3Client, S3Connector,
};
pub use memory::{InMemoryS3, S3Op};
pub use path::{S3BlobPath, S3Payload, IMPLICIT_GEN_BUCKET, IMPLICIT_GEN_REGION};
