//! Azure Blob Storage backend.
//!
//! An [`AzureBlobPath`] is a storage account, a container, and a blob name.
//! It follows the same staging pattern as the S3 backend: reads download
//! the whole blob into a staging file, writes upload the staging file when
//! the scope ends, and the staging file is always removed.
//!
//! Handles never carry credentials. The default [`RestConnector`] asks the
//! process-wide [`DefaultTokenCredential`] for a bearer token each time it
//! connects; that credential caches its token and refreshes it before
//! expiry.

pub mod client;
pub mod credential;
pub mod memory;
pub mod path;
pub mod rest;

pub use client::{
    current_connector, use_connector, with_connector, AzureClient, AzureConnector, ConnectorGuard,
};
pub use credential::{
    AccessToken, AzureCliCredential, CachedTokenCredential, ChainedTokenCredential,
    DefaultTokenCredential, EnvironmentCredential, ManagedIdentityCredential,
    StaticTokenCredential, TokenCredential, ACCESS_TOKEN_VAR,
};
pub use memory::{AzureOp, InMemoryAzure};
pub use path::{AzureBlobPath, AzurePayload, IMPLICIT_GEN_CONTAINER, IMPLICIT_GEN_STORAGE_ACCOUNT};
pub use rest::{RestClient, RestConnector, API_VERSION};
