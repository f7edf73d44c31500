use std::cell::RefCell;
use std::collections::BTreeMap;
use std::env::{self, VarError};

use crate::error::{ImplicitError, ImplicitResult};
use crate::scoped::{self, FrameGuard, Frames};

/// Namespace shared by every implicit variable name.
pub const PREFIX: &str = "BLOB_STORE_";

type Frame = BTreeMap<String, String>;

thread_local! {
    static FRAMES: RefCell<Frames<Frame>> = const { RefCell::new(Frames::new()) };
}

/// An active set of implicit variable overrides.
///
/// Created by [`override_vars`] or [`ImplicitVars::scope`]; the overrides
/// stay visible on the current thread until the guard is dropped.
#[derive(Debug)]
#[must_use = "the overrides are reverted as soon as the guard is dropped"]
pub struct OverrideGuard {
    _frame: FrameGuard<Frame>,
}

/// Resolve an implicit variable.
///
/// Returns the innermost override if one is active on this thread,
/// otherwise the value from the process environment.
pub fn get(name: &str) -> ImplicitResult<String> {
    match get_opt(name)? {
        Some(value) if value.is_empty() => Err(ImplicitError::Empty(name.to_owned())),
        Some(value) => Ok(value),
        None => Err(ImplicitError::Missing(name.to_owned())),
    }
}

/// Resolve an implicit variable, returning `Ok(None)` when it is unset.
pub fn get_opt(name: &str) -> ImplicitResult<Option<String>> {
    if let Some(value) = scoped::find_map(&FRAMES, |frame| frame.get(name).cloned()) {
        return Ok(Some(value));
    }
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ImplicitError::NotUnicode(name.to_owned())),
    }
}

/// Push one frame of overrides for the lifetime of the returned guard.
pub fn override_vars<I, K, V>(vars: I) -> OverrideGuard
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let frame: Frame = vars
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    tracing::debug!(vars = ?frame.keys().collect::<Vec<_>>(), "pushing implicit overrides");
    OverrideGuard {
        _frame: scoped::push(&FRAMES, frame),
    }
}

/// Run `f` with the given overrides active, reverting them afterwards.
///
/// The overrides are reverted even if `f` panics.
pub fn with_vars<I, K, V, R>(vars: I, f: impl FnOnce() -> R) -> R
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let _guard = override_vars(vars);
    f()
}

/// An explicit, owned set of implicit variable values.
///
/// Useful for passing configuration around as a value and activating it
/// only where needed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImplicitVars {
    values: BTreeMap<String, String>,
}

impl ImplicitVars {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture every [`PREFIX`]ed variable currently in the environment.
    pub fn from_env() -> Self {
        let values = env::vars()
            .filter(|(name, _)| name.starts_with(PREFIX))
            .collect();
        Self { values }
    }

    /// Set a value, returning the updated set.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Look up a value held by this set only.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Number of values in the set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the set holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Activate every value in this set as a single override frame.
    pub fn scope(&self) -> OverrideGuard {
        override_vars(self.values.clone())
    }
}
