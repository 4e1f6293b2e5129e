//! The cache store contract consumed by the coalescer, plus the adapters that
//! ship with the crate.

pub mod memory;

#[cfg(feature = "serde")]
pub mod codec;

use crate::context::Context;

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by a [`TtlStore`].
#[derive(Debug, Error)]
pub enum StoreError {
  /// The key is absent or its entry has expired.
  #[error("not found in cache")]
  Miss,
  /// A bounded store has no room for another key.
  #[error("store is full ({capacity} entries)")]
  Full { capacity: usize },
  /// A value could not be encoded or decoded.
  #[error("codec error: {0}")]
  Codec(#[source] Box<dyn StdError + Send + Sync>),
  /// Any other failure of the underlying store, e.g. a transport error.
  #[error("store backend error: {0}")]
  Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl StoreError {
  /// Returns `true` for the not-found class.
  pub fn is_miss(&self) -> bool {
    matches!(self, StoreError::Miss)
  }

  /// Wraps an arbitrary backend failure.
  pub fn backend(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
    StoreError::Backend(err.into())
  }
}

/// A key-value store with its own expiry policy.
///
/// Implementations must be safe to call from many threads at once; the
/// coalescer does not serialize store access.
///
/// Every operation receives the context of the call it serves: the caller's
/// own for lookups, the computing caller's for write-backs. A remote store can
/// use it to abandon I/O once the context has ended.
pub trait TtlStore<K, V>: Send + Sync {
  /// Looks up `key`.
  ///
  /// The coalescer treats *every* `Err` as a miss, not only
  /// [`StoreError::Miss`]. A degraded store is therefore indistinguishable
  /// from a cold one and callers fall through to computing the value.
  fn get(&self, ctx: &Context, key: &K) -> Result<V, StoreError>;

  /// Stores `value` under the store's default expiry.
  fn set(&self, ctx: &Context, key: &K, value: V) -> Result<(), StoreError>;

  /// Stores `value` with an explicit time to live.
  fn set_with_ttl(&self, ctx: &Context, key: &K, value: V, ttl: Duration) -> Result<(), StoreError>;

  /// Removes the given keys. Absent keys are ignored.
  fn del(&self, ctx: &Context, keys: &[K]) -> Result<(), StoreError>;

  /// Removes every entry.
  fn clear(&self, ctx: &Context) -> Result<(), StoreError>;
}

impl<K, V, S> TtlStore<K, V> for Arc<S>
where
  S: TtlStore<K, V> + ?Sized,
{
  fn get(&self, ctx: &Context, key: &K) -> Result<V, StoreError> {
    (**self).get(ctx, key)
  }

  fn set(&self, ctx: &Context, key: &K, value: V) -> Result<(), StoreError> {
    (**self).set(ctx, key, value)
  }

  fn set_with_ttl(&self, ctx: &Context, key: &K, value: V, ttl: Duration) -> Result<(), StoreError> {
    (**self).set_with_ttl(ctx, key, value, ttl)
  }

  fn del(&self, ctx: &Context, keys: &[K]) -> Result<(), StoreError> {
    (**self).del(ctx, keys)
  }

  fn clear(&self, ctx: &Context) -> Result<(), StoreError> {
    (**self).clear(ctx)
  }
}

/// How a freshly computed value is written back to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
  /// Use the coalescer's `time_to_live` if one was configured, otherwise the
  /// store's own default expiry.
  #[default]
  Default,
  /// Store with this explicit time to live.
  Ttl(Duration),
  /// Do not store the value; the next miss computes it again.
  Skip,
}
