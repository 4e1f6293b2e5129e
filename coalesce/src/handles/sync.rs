use crate::context::Context;
use crate::error::CoalesceError;
use crate::loader::Loader;
use crate::registry::Slot;
use crate::shared::CoalescerShared;
use crate::store::{Retention, TtlStore};
use crate::CoalescerBuilder;

use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A thread-safe, blocking request-coalescing cache.
///
/// For every key, at most one fetch runs at a time. Callers that miss the
/// store while that fetch is running block until it finishes and receive the
/// same result. Handles are cheap to clone and share one in-flight registry.
pub struct Coalescer<K, V, E, S> {
  pub(crate) shared: Arc<CoalescerShared<K, V, E, S>>,
}

impl_diagnostics!(Coalescer);

impl<K, V, E, S> Coalescer<K, V, E, S>
where
  K: Eq + Hash + Clone,
  V: Clone,
  S: TtlStore<K, V>,
{
  /// Starts building a coalescer over `store`.
  pub fn builder(store: S) -> CoalescerBuilder<K, V, E, S> {
    CoalescerBuilder::new(store)
  }

  /// Returns the cached value for `key`, computing it with the builder's
  /// default fetch on a miss.
  ///
  /// Fails with [`CoalesceError::MissingFetch`] if the value is not cached
  /// and no default fetch was configured.
  pub fn get(&self, ctx: &Context, key: &K) -> crate::Result<V, E> {
    if let Some(value) = self.shared.lookup(ctx, key) {
      return Ok(value);
    }

    let loader = match &self.shared.loader {
      Some(Loader::Sync(f)) => Arc::clone(f),
      _ => {
        tracing::debug!("miss with no fetch configured");
        return Err(CoalesceError::MissingFetch);
      }
    };
    let owned_key = key.clone();
    self.coalesce(ctx, key, move || {
      loader(owned_key).map(|value| (value, Retention::Default))
    })
  }

  /// Returns the cached value for `key`, computing it with `fetch` on a miss.
  ///
  /// `fetch` only runs if no other caller is already computing `key`; in that
  /// case this call waits for the other caller's result instead, until `ctx`
  /// ends. A successful result is written back to the store, an error is not.
  pub fn get_with<F>(&self, ctx: &Context, key: &K, fetch: F) -> crate::Result<V, E>
  where
    F: FnOnce() -> Result<V, E>,
  {
    if let Some(value) = self.shared.lookup(ctx, key) {
      return Ok(value);
    }
    self.coalesce(ctx, key, || fetch().map(|value| (value, Retention::Default)))
  }

  /// Like [`get_with`](Coalescer::get_with), but `fetch` also decides how its
  /// value is written back to the store.
  pub fn get_with_retention<F>(&self, ctx: &Context, key: &K, fetch: F) -> crate::Result<V, E>
  where
    F: FnOnce() -> Result<(V, Retention), E>,
  {
    if let Some(value) = self.shared.lookup(ctx, key) {
      return Ok(value);
    }
    self.coalesce(ctx, key, fetch)
  }

  /// The miss path: join the computation in flight for `key`, or lead one.
  fn coalesce<F>(&self, ctx: &Context, key: &K, fetch: F) -> crate::Result<V, E>
  where
    F: FnOnce() -> Result<(V, Retention), E>,
  {
    match self.shared.registry.join_or_lead(key) {
      Slot::Join(joined) => {
        self.shared.metrics.coalesced.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("joining in-flight computation");
        let waited = joined.signal().wait(ctx);
        drop(joined);
        self.shared.finish_wait(waited)
      }
      Slot::Lead(lead) => {
        // The leader's context never interrupts the fetch; it only reaches
        // the store write-back.
        self.shared.metrics.fetches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("leading computation");
        let result = fetch();
        self.shared.settle(lead, ctx, key, result)
      }
    }
  }
}
