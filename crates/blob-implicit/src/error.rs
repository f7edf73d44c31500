/// Errors from implicit variable resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImplicitError {
    /// Neither an override frame nor the environment defines the variable.
    #[error("implicit variable `{0}` is not set")]
    Missing(String),

    /// The variable is defined but empty.
    #[error("implicit variable `{0}` is empty")]
    Empty(String),

    /// The environment value is not valid unicode.
    #[error("implicit variable `{0}` is not valid unicode")]
    NotUnicode(String),
}

/// Result alias for implicit variable lookups.
pub type ImplicitResult<T> = Result<T, ImplicitError>;
