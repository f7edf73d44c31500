use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// How a blob is opened.
///
/// Streams are always bytes. The text spellings (`"rt"`, `"wt"`) are
/// accepted for compatibility and behave like their binary counterparts;
/// UTF-8 checking is done by [`BlobPath::read_string`](crate::BlobPath::read_string).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// The blob's bytes are materialized locally before the stream is handed out.
    Read,
    /// The stream's bytes replace the blob once the scope exits successfully.
    Write,
}

impl OpenMode {
    pub fn is_read(self) -> bool {
        self == Self::Read
    }

    pub fn is_write(self) -> bool {
        self == Self::Write
    }
}

impl FromStr for OpenMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "rb" | "rt" => Ok(Self::Read),
            "w" | "wb" | "wt" => Ok(Self::Write),
            other => Err(StoreError::Validation(format!(
                "unsupported open mode `{other}`"
            ))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "rb"),
            Self::Write => write!(f, "wb"),
        }
    }
}
