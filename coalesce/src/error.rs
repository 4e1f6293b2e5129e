use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur when building a coalescer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// A `time_to_live` of zero was configured. Values written with a zero TTL
  /// would expire before any caller could read them back.
  #[error("time to live cannot be zero")]
  ZeroTimeToLive,
  /// An `async_fetch` was configured but a synchronous handle was requested.
  /// A blocking caller has no executor to drive the returned future.
  #[error("an async fetch can only be used with `build_async`")]
  AsyncFetchOnSyncHandle,
}

/// The reason a [`Context`](crate::Context) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ContextError {
  /// `cancel()` was called on the context or one of its ancestors.
  #[error("context cancelled")]
  Cancelled,
  /// The context's deadline passed.
  #[error("context deadline exceeded")]
  DeadlineExceeded,
}

/// The error returned to a caller of `get`, `get_with` or `get_with_retention`.
///
/// Cache store failures never appear here. A failed read is treated as a miss
/// and a failed write is reported to the store error observer only.
pub enum CoalesceError<E> {
  /// The fetch returned an error. Every caller that joined the same in-flight
  /// computation receives the same shared error.
  Fetch(Arc<E>),
  /// The caller's own context ended while it was waiting on another caller's
  /// computation. The computation itself keeps running.
  Context(ContextError),
  /// The key was not cached and no fetch was configured on the builder.
  MissingFetch,
  /// The caller computing the value went away without resolving it, either by
  /// panicking inside the fetch or by dropping its future.
  Abandoned,
}

impl<E> CoalesceError<E> {
  /// Returns the fetch error, if this is one.
  pub fn fetch_error(&self) -> Option<&E> {
    match self {
      CoalesceError::Fetch(err) => Some(&**err),
      _ => None,
    }
  }

  /// Returns `true` if the caller's context ended before a result arrived.
  pub fn is_context(&self) -> bool {
    matches!(self, CoalesceError::Context(_))
  }
}

impl<E> Clone for CoalesceError<E> {
  fn clone(&self) -> Self {
    match self {
      CoalesceError::Fetch(err) => CoalesceError::Fetch(Arc::clone(err)),
      CoalesceError::Context(err) => CoalesceError::Context(*err),
      CoalesceError::MissingFetch => CoalesceError::MissingFetch,
      CoalesceError::Abandoned => CoalesceError::Abandoned,
    }
  }
}

impl<E> From<ContextError> for CoalesceError<E> {
  fn from(err: ContextError) -> Self {
    CoalesceError::Context(err)
  }
}

impl<E: fmt::Debug> fmt::Debug for CoalesceError<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CoalesceError::Fetch(err) => f.debug_tuple("Fetch").field(err).finish(),
      CoalesceError::Context(err) => f.debug_tuple("Context").field(err).finish(),
      CoalesceError::MissingFetch => write!(f, "MissingFetch"),
      CoalesceError::Abandoned => write!(f, "Abandoned"),
    }
  }
}

impl<E: fmt::Display> fmt::Display for CoalesceError<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CoalesceError::Fetch(err) => write!(f, "fetch failed: {}", err),
      CoalesceError::Context(err) => write!(f, "{}", err),
      CoalesceError::MissingFetch => write!(f, "missing fetch function"),
      CoalesceError::Abandoned => write!(f, "in-flight computation was abandoned"),
    }
  }
}

impl<E> std::error::Error for CoalesceError<E>
where
  E: std::error::Error + 'static,
{
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      CoalesceError::Fetch(err) => Some(err.as_ref()),
      CoalesceError::Context(err) => Some(err),
      _ => None,
    }
  }
}

/// A specialized `Result` type for coalesced lookups.
pub type Result<T, E> = std::result::Result<T, CoalesceError<E>>;
