/// Diagnostics shared by both handle flavours.
macro_rules! impl_diagnostics {
  ($handle:ident) => {
    impl<K, V, E, S> $handle<K, V, E, S>
    where
      K: Eq + std::hash::Hash + Clone,
    {
      /// Returns a snapshot of this coalescer's counters.
      pub fn metrics(&self) -> crate::MetricsSnapshot {
        self.shared.metrics.snapshot()
      }

      /// Number of callers currently waiting on the in-flight computation for
      /// `key`, or `None` if nothing is in flight for it.
      pub fn waiters<Q>(&self, key: &Q) -> Option<usize>
      where
        K: std::borrow::Borrow<Q>,
        Q: std::hash::Hash + Eq + ?Sized,
      {
        self.shared.registry.waiters(key)
      }

      /// Returns `true` while a computation for `key` is in flight.
      pub fn is_in_flight<Q>(&self, key: &Q) -> bool
      where
        K: std::borrow::Borrow<Q>,
        Q: std::hash::Hash + Eq + ?Sized,
      {
        self.shared.registry.contains(key)
      }

      /// Number of keys with a computation in flight.
      pub fn in_flight(&self) -> usize {
        self.shared.registry.len()
      }

      /// The store this coalescer reads from and populates.
      pub fn store(&self) -> &S {
        &self.shared.store
      }
    }

    impl<K, V, E, S> Clone for $handle<K, V, E, S> {
      fn clone(&self) -> Self {
        Self {
          shared: std::sync::Arc::clone(&self.shared),
        }
      }
    }

    impl<K, V, E, S> std::fmt::Debug for $handle<K, V, E, S>
    where
      K: Eq + std::hash::Hash + Clone,
    {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!($handle))
          .field("shared", &self.shared)
          .finish()
      }
    }
  };
}

pub mod sync;

#[cfg(feature = "tokio")]
pub mod futures;

pub use self::sync::Coalescer;

#[cfg(feature = "tokio")]
pub use self::futures::AsyncCoalescer;
