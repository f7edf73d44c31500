//! Implicit (ambient) configuration for blob-store backends.
//!
//! Backends read their defaults (base directories, buckets, storage
//! accounts) from named *implicit variables* instead of having
//! them threaded through every call. A variable resolves, in order:
//!
//! 1. the innermost active override frame on the current thread that
//!    defines it (see [`with_vars`] and [`OverrideGuard`]);
//! 2. the process environment.
//!
//! Override frames form a stack. Pushing a frame never mutates the frames
//! below it, and dropping the guard pops it again, so overrides are scoped
//! and fully reversible.
//!
//! Every variable name carries the [`PREFIX`] namespace; use [`prefixed!`]
//! to declare one.

pub mod error;
pub mod scoped;
pub mod vars;

pub use error::{ImplicitError, ImplicitResult};
pub use scoped::{FrameGuard, Frames};
pub use vars::{get, get_opt, override_vars, with_vars, ImplicitVars, OverrideGuard, PREFIX};

/// Builds a namespaced implicit variable name at compile time.
///
/// ```
/// const BUCKET: &str = blob_implicit::prefixed!("GEN_S3_BUCKET");
/// assert_eq!(BUCKET, "BLOB_STORE_GEN_S3_BUCKET");
/// ```
#[macro_export]
macro_rules! prefixed {
    ($name:literal) => {
        concat!("BLOB_STORE_", $name)
    };
}
