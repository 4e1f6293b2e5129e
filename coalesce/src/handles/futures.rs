use crate::context::Context;
use crate::error::CoalesceError;
use crate::loader::Loader;
use crate::registry::Slot;
use crate::shared::CoalescerShared;
use crate::store::{Retention, TtlStore};
use crate::CoalescerBuilder;

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::future::{self, Either};

/// A thread-safe, asynchronous request-coalescing cache.
///
/// The leader awaits its fetch inline on its own task; nothing is spawned.
/// Dropping the leader's future before the fetch completes abandons the
/// computation, and its waiters receive [`CoalesceError::Abandoned`].
pub struct AsyncCoalescer<K, V, E, S> {
  pub(crate) shared: Arc<CoalescerShared<K, V, E, S>>,
}

impl_diagnostics!(AsyncCoalescer);

impl<K, V, E, S> AsyncCoalescer<K, V, E, S>
where
  K: Eq + Hash + Clone,
  V: Clone,
  S: TtlStore<K, V>,
{
  /// Starts building a coalescer over `store`.
  pub fn builder(store: S) -> CoalescerBuilder<K, V, E, S> {
    CoalescerBuilder::new(store)
  }

  /// Asynchronously returns the cached value for `key`, computing it with the
  /// builder's default fetch on a miss.
  pub async fn get(&self, ctx: &Context, key: &K) -> crate::Result<V, E> {
    if let Some(value) = self.shared.lookup(ctx, key) {
      return Ok(value);
    }

    let fetch = match &self.shared.loader {
      Some(Loader::Async(f)) => Either::Left(Arc::clone(f)),
      Some(Loader::Sync(f)) => Either::Right(Arc::clone(f)),
      None => {
        tracing::debug!("miss with no fetch configured");
        return Err(CoalesceError::MissingFetch);
      }
    };
    let owned_key = key.clone();
    self
      .coalesce(ctx, key, move || {
        let load = match fetch {
          Either::Left(f) => Either::Left(f(owned_key)),
          Either::Right(f) => Either::Right(future::ready(f(owned_key))),
        };
        async move { load.await.map(|value| (value, Retention::Default)) }
      })
      .await
  }

  /// Asynchronously returns the cached value for `key`, computing it with
  /// `fetch` on a miss.
  ///
  /// See [`Coalescer::get_with`](crate::Coalescer::get_with) for the
  /// coalescing rules.
  pub async fn get_with<F, Fut>(&self, ctx: &Context, key: &K, fetch: F) -> crate::Result<V, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
  {
    if let Some(value) = self.shared.lookup(ctx, key) {
      return Ok(value);
    }
    self
      .coalesce(ctx, key, || async move {
        fetch().await.map(|value| (value, Retention::Default))
      })
      .await
  }

  /// Like [`get_with`](AsyncCoalescer::get_with), but `fetch` also decides how
  /// its value is written back to the store.
  pub async fn get_with_retention<F, Fut>(
    &self,
    ctx: &Context,
    key: &K,
    fetch: F,
  ) -> crate::Result<V, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(V, Retention), E>>,
  {
    if let Some(value) = self.shared.lookup(ctx, key) {
      return Ok(value);
    }
    self.coalesce(ctx, key, fetch).await
  }

  async fn coalesce<F, Fut>(&self, ctx: &Context, key: &K, fetch: F) -> crate::Result<V, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(V, Retention), E>>,
  {
    match self.shared.registry.join_or_lead(key) {
      Slot::Join(joined) => {
        self.shared.metrics.coalesced.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("joining in-flight computation");
        let waited = joined.signal().wait_async(ctx).await;
        drop(joined);
        self.shared.finish_wait(waited)
      }
      Slot::Lead(lead) => {
        self.shared.metrics.fetches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("leading computation");
        let result = fetch().await;
        self.shared.settle(lead, ctx, key, result)
      }
    }
  }
}
