use crate::error::StoreError;

/// Error codes that mean "the blob is not there".
///
/// Covers the S3 family (`404` from HEAD requests, `NotFound`, `NoSuchKey`)
/// and the Azure family (`BlobNotFound`, `ContainerNotFound`,
/// `ResourceNotFound`).
pub const NOT_FOUND_CODES: &[&str] = &[
    "404",
    "NotFound",
    "NoSuchKey",
    "BlobNotFound",
    "ContainerNotFound",
    "ResourceNotFound",
];

/// A failure reported by a backend client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a service response (network, DNS,
    /// credential resolution, timeouts).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered with an error response.
    #[error("error response (status={status:?}, code={code:?}): {message}")]
    Response {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// Reading or writing the local side of a transfer failed.
    #[error("local I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a [`ClientError`] lands in the store's error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// The blob does not exist.
    NotFound,
    /// Any other recognized failure.
    Transport,
    /// An error response without an error code.
    ContractViolation,
}

/// Classify a backend client error.
pub fn classify(err: &ClientError) -> ErrorClass {
    match err {
        ClientError::Transport(_) | ClientError::Io(_) => ErrorClass::Transport,
        ClientError::Response { code: None, .. } => ErrorClass::ContractViolation,
        ClientError::Response {
            code: Some(code), ..
        } if NOT_FOUND_CODES.contains(&code.as_str()) => ErrorClass::NotFound,
        ClientError::Response { .. } => ErrorClass::Transport,
    }
}

impl ClientError {
    /// An error response carrying `code`.
    pub fn response(
        status: Option<u16>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Response {
            status,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// The canonical "no such blob" response.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::response(Some(404), "NotFound", message)
    }

    /// Whether this error means the blob does not exist.
    pub fn is_not_found(&self) -> bool {
        classify(self) == ErrorClass::NotFound
    }

    /// Convert into a [`StoreError`] for an operation on `blob`.
    ///
    /// "Not found" becomes [`StoreError::DoesNotExist`]; callers that want
    /// a boolean instead should use [`existence`](Self::existence).
    pub fn into_store_error(self, blob: &dyn std::fmt::Display) -> StoreError {
        match (classify(&self), self) {
            (_, ClientError::Io(e)) => StoreError::Io(e),
            (ErrorClass::NotFound, err) => StoreError::DoesNotExist(format!("{blob}: {err}")),
            (ErrorClass::Transport, err) => StoreError::Transport(format!("{blob}: {err}")),
            (ErrorClass::ContractViolation, err) => StoreError::ContractViolation(format!(
                "unidentified error response body for {blob}: {err}"
            )),
        }
    }

    /// Turn the outcome of an existence check into a boolean.
    ///
    /// `Ok` means present, "not found" means absent, every other failure
    /// propagates.
    pub fn existence(
        result: Result<(), ClientError>,
        blob: &dyn std::fmt::Display,
    ) -> Result<bool, StoreError> {
        match result {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into_store_error(blob)),
        }
    }
}
