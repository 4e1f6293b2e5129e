use crate::context::Context;
use crate::error::CoalesceError;
use crate::loader::Loader;
use crate::metrics::Metrics;
use crate::registry::{Lead, Registry};
use crate::signal::WaitError;
use crate::store::{Retention, StoreError, TtlStore};

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// What every waiter of one coalescing episode receives.
pub(crate) type Outcome<V, E> = Result<V, Arc<E>>;

pub(crate) type StoreErrorObserver = Arc<dyn Fn(&StoreError) + Send + Sync>;

/// The internal, thread-safe core shared by every handle of one coalescer.
pub(crate) struct CoalescerShared<K, V, E, S> {
  pub(crate) store: S,
  pub(crate) registry: Registry<K, Outcome<V, E>>,
  pub(crate) loader: Option<Loader<K, V, E>>,
  pub(crate) on_store_error: Option<StoreErrorObserver>,
  pub(crate) time_to_live: Option<Duration>,
  pub(crate) metrics: Metrics,
}

impl<K, V, E, S> fmt::Debug for CoalescerShared<K, V, E, S>
where
  K: Eq + Hash + Clone,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CoalescerShared")
      .field("in_flight", &self.registry.len())
      .field("has_loader", &self.loader.is_some())
      .field("time_to_live", &self.time_to_live)
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<K, V, E, S> CoalescerShared<K, V, E, S>
where
  K: Eq + Hash + Clone,
  V: Clone,
  S: TtlStore<K, V>,
{
  /// Reads `key` from the store. Any failure, not only a miss, is reported as
  /// `None` so the caller falls through to computing the value.
  pub(crate) fn lookup(&self, ctx: &Context, key: &K) -> Option<V> {
    match self.store.get(ctx, key) {
      Ok(value) => {
        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("store hit");
        Some(value)
      }
      Err(StoreError::Miss) => {
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("store miss");
        None
      }
      Err(err) => {
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(error = %err, "store read failed; treating as a miss");
        None
      }
    }
  }

  /// Publishes the leader's result, writes a successful value back to the
  /// store and finally unregisters the entry.
  ///
  /// Cleanup comes last so that a caller racing with this one either joins
  /// the still-registered entry or re-reads a store that already holds the
  /// value. The write-back runs under the leader's `ctx`.
  pub(crate) fn settle(
    &self,
    mut lead: Lead<'_, K, Outcome<V, E>>,
    ctx: &Context,
    key: &K,
    result: Result<(V, Retention), E>,
  ) -> crate::Result<V, E> {
    match result {
      Ok((value, retention)) => {
        lead.resolve(Ok(value.clone()));
        if retention != Retention::Skip {
          self.populate(ctx, key, value.clone(), retention);
        }
        drop(lead);
        Ok(value)
      }
      Err(err) => {
        self.metrics.fetch_errors.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("fetch failed; nothing is cached");
        let err = Arc::new(err);
        lead.resolve(Err(Arc::clone(&err)));
        drop(lead);
        Err(CoalesceError::Fetch(err))
      }
    }
  }

  fn populate(&self, ctx: &Context, key: &K, value: V, retention: Retention) {
    let written = match (retention, self.time_to_live) {
      (Retention::Skip, _) => return,
      (Retention::Ttl(ttl), _) | (Retention::Default, Some(ttl)) => {
        self.store.set_with_ttl(ctx, key, value, ttl)
      }
      (Retention::Default, None) => self.store.set(ctx, key, value),
    };

    if let Err(err) = written {
      self.metrics.store_errors.fetch_add(1, Ordering::Relaxed);
      tracing::warn!(error = %err, "failed to store computed value");
      if let Some(observer) = &self.on_store_error {
        observer(&err);
      }
    }
  }

  /// Turns what a joined caller observed into its return value.
  pub(crate) fn finish_wait(
    &self,
    waited: Result<Outcome<V, E>, WaitError>,
  ) -> crate::Result<V, E> {
    match waited {
      Ok(outcome) => outcome.map_err(CoalesceError::Fetch),
      Err(WaitError::Context(err)) => {
        self.metrics.cancellations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(reason = %err, "waiter left before the value arrived");
        Err(CoalesceError::Context(err))
      }
      Err(WaitError::Abandoned) => {
        self.metrics.abandoned.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("computation was abandoned by its leader");
        Err(CoalesceError::Abandoned)
      }
    }
  }
}
