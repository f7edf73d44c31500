use blob_implicit::ImplicitError;

/// Errors from blob handle operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The blob was required to exist and does not.
    #[error("blob does not exist: {0}")]
    DoesNotExist(String),

    /// A serialized handle names a backend nobody registered.
    #[error("unknown backend kind `{kind}`, known kinds: {known:?}")]
    UnknownBackendKind { kind: String, known: Vec<String> },

    /// A serialized payload does not match the backend's identity schema.
    #[error("validation error: {0}")]
    Validation(String),

    /// The backend client failed for a reason other than "not found".
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend client answered with an error of unrecognized shape.
    #[error("backend contract violation: {0}")]
    ContractViolation(String),

    /// Backend configuration could not be resolved.
    #[error(transparent)]
    Implicit(#[from] ImplicitError),

    /// Local I/O failure (staging files, local backend).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for blob handle operations.
pub type StoreResult<T> = Result<T, StoreError>;
