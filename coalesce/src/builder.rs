use crate::error::BuildError;
use crate::handles::Coalescer;
#[cfg(feature = "tokio")]
use crate::handles::AsyncCoalescer;
use crate::loader::Loader;
use crate::metrics::Metrics;
use crate::registry::Registry;
use crate::shared::{CoalescerShared, StoreErrorObserver};
use crate::store::{StoreError, TtlStore};

use core::fmt;
#[cfg(feature = "tokio")]
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tokio")]
use futures_util::FutureExt;

/// A builder for creating `Coalescer` and `AsyncCoalescer` instances.
pub struct CoalescerBuilder<K, V, E, S> {
  store: S,
  loader: Option<Loader<K, V, E>>,
  on_store_error: Option<StoreErrorObserver>,
  time_to_live: Option<Duration>,
}

// Manual Debug implementation for CoalescerBuilder.
impl<K, V, E, S> fmt::Debug for CoalescerBuilder<K, V, E, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CoalescerBuilder")
      .field("has_loader", &self.loader.is_some())
      .field("has_store_error_observer", &self.on_store_error.is_some())
      .field("time_to_live", &self.time_to_live)
      .finish_non_exhaustive()
  }
}

impl<K, V, E, S> CoalescerBuilder<K, V, E, S>
where
  K: Eq + Hash + Clone,
  V: Clone,
  S: TtlStore<K, V>,
{
  /// Starts a builder around `store`. The store may be shared with other
  /// consumers, e.g. by passing an `Arc`.
  pub fn new(store: S) -> Self {
    Self {
      store,
      loader: None,
      on_store_error: None,
      time_to_live: None,
    }
  }

  /// Sets the default fetch used by `get` on a miss. It receives the key.
  pub fn fetch(mut self, f: impl Fn(K) -> Result<V, E> + Send + Sync + 'static) -> Self {
    self.loader = Some(Loader::Sync(Arc::new(f)));
    self
  }

  /// Sets an asynchronous default fetch. Only valid with `build_async`.
  #[cfg(feature = "tokio")]
  pub fn async_fetch<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    self.loader = Some(Loader::Async(Arc::new(move |key: K| f(key).boxed())));
    self
  }

  /// Sets the observer told about failed writes of computed values back to
  /// the store. It is advisory: callers still receive the computed value.
  pub fn on_store_error(mut self, f: impl Fn(&StoreError) + Send + Sync + 'static) -> Self {
    self.on_store_error = Some(Arc::new(f));
    self
  }

  /// Writes computed values with this time to live instead of the store's
  /// own default.
  pub fn time_to_live(mut self, duration: Duration) -> Self {
    self.time_to_live = Some(duration);
    self
  }

  /// Builds a blocking `Coalescer`.
  pub fn build(self) -> Result<Coalescer<K, V, E, S>, BuildError> {
    self.validate()?;
    #[cfg(feature = "tokio")]
    {
      if matches!(self.loader, Some(Loader::Async(_))) {
        return Err(BuildError::AsyncFetchOnSyncHandle);
      }
    }
    Ok(Coalescer {
      shared: Arc::new(self.build_shared_core()),
    })
  }

  /// Builds an asynchronous `AsyncCoalescer`. Both kinds of default fetch are
  /// accepted; a blocking one runs inline on the calling task.
  #[cfg(feature = "tokio")]
  pub fn build_async(self) -> Result<AsyncCoalescer<K, V, E, S>, BuildError> {
    self.validate()?;
    Ok(AsyncCoalescer {
      shared: Arc::new(self.build_shared_core()),
    })
  }

  fn build_shared_core(self) -> CoalescerShared<K, V, E, S> {
    CoalescerShared {
      store: self.store,
      registry: Registry::new(),
      loader: self.loader,
      on_store_error: self.on_store_error,
      time_to_live: self.time_to_live,
      metrics: Metrics::new(),
    }
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.time_to_live == Some(Duration::ZERO) {
      return Err(BuildError::ZeroTimeToLive);
    }
    Ok(())
  }
}
