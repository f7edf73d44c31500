//! Local filesystem backend.
//!
//! A [`LocalRelativeBlobPath`] stores only a relative path. The absolute
//! root comes from the [`BASE_VAR`] implicit variable and is resolved again
//! on every access, so the same handle can point into different base
//! directories in different processes or override scopes.

pub mod path;

pub use path::{LocalRelativeBlobPath, LocalRelativePayload, BASE_VAR};
