use crate::signal::{self, CompletionSignal, Resolver};

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use parking_lot::Mutex;

/// One in-flight computation.
pub(crate) struct InFlight<T> {
  pub(crate) signal: Arc<CompletionSignal<T>>,
  /// Callers currently blocked on `signal`. Diagnostics only; it is updated
  /// outside the map lock on the way out.
  waiting: AtomicUsize,
}

/// The outcome of consulting the registry for a key.
pub(crate) enum Slot<'a, K: Eq + Hash, T> {
  /// Another caller is already computing the value.
  Join(Joined<T>),
  /// This caller created the entry and must compute the value.
  Lead(Lead<'a, K, T>),
}

/// The map from key to its single pending computation.
///
/// An entry is present exactly while its computation is in flight: the leader
/// removes it right after resolving, so a completed entry is never reused.
pub(crate) struct Registry<K, T> {
  entries: Mutex<HashMap<K, Arc<InFlight<T>>>>,
}

impl<K, T> Registry<K, T>
where
  K: Eq + Hash + Clone,
{
  pub(crate) fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
    }
  }

  /// Joins the pending computation for `key`, or registers a new one and
  /// makes the caller its leader.
  ///
  /// The map lock is held only for the lookup and insert, never while the
  /// caller waits or computes.
  pub(crate) fn join_or_lead(&self, key: &K) -> Slot<'_, K, T> {
    let mut entries = self.entries.lock();

    if let Some(existing) = entries.get(key) {
      existing.waiting.fetch_add(1, Ordering::AcqRel);
      return Slot::Join(Joined {
        entry: Arc::clone(existing),
      });
    }

    let (signal, resolver) = signal::pair();
    let entry = Arc::new(InFlight {
      signal,
      waiting: AtomicUsize::new(0),
    });
    entries.insert(key.clone(), Arc::clone(&entry));

    Slot::Lead(Lead {
      registry: self,
      key: key.clone(),
      entry,
      resolver: Some(resolver),
    })
  }

  /// Number of callers blocked on the computation for `key`, or `None` when
  /// nothing is in flight for it.
  pub(crate) fn waiters<Q>(&self, key: &Q) -> Option<usize>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self
      .entries
      .lock()
      .get(key)
      .map(|entry| entry.waiting.load(Ordering::Acquire))
  }

  pub(crate) fn contains<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.entries.lock().contains_key(key)
  }

  pub(crate) fn len(&self) -> usize {
    self.entries.lock().len()
  }
}

impl<K: Eq + Hash, T> Registry<K, T> {
  /// Removes `entry` for `key`, but only if it is still the registered one.
  fn remove(&self, key: &K, entry: &Arc<InFlight<T>>) {
    let mut entries = self.entries.lock();
    if entries
      .get(key)
      .is_some_and(|current| Arc::ptr_eq(current, entry))
    {
      entries.remove(key);
    }
  }
}

/// A caller waiting on someone else's computation. Dropping it, including by
/// cancellation, decrements the entry's waiter count.
pub(crate) struct Joined<T> {
  entry: Arc<InFlight<T>>,
}

impl<T> Joined<T> {
  pub(crate) fn signal(&self) -> &CompletionSignal<T> {
    &self.entry.signal
  }
}

impl<T> Drop for Joined<T> {
  fn drop(&mut self) {
    self.entry.waiting.fetch_sub(1, Ordering::AcqRel);
  }
}

/// The caller responsible for computing a key.
///
/// Dropping a `Lead` always unregisters the entry. If it was never resolved
/// (the fetch panicked or the leader's future was dropped), waiters are
/// released as abandoned first.
pub(crate) struct Lead<'a, K: Eq + Hash, T> {
  registry: &'a Registry<K, T>,
  key: K,
  entry: Arc<InFlight<T>>,
  resolver: Option<Resolver<T>>,
}

impl<K: Eq + Hash, T> Lead<'_, K, T> {
  /// Publishes the outcome to every waiter. The entry stays registered until
  /// the `Lead` is dropped, so callers arriving in between still join it.
  pub(crate) fn resolve(&mut self, outcome: T) {
    if let Some(resolver) = self.resolver.take() {
      resolver.resolve(outcome);
    }
  }
}

impl<K: Eq + Hash, T> Drop for Lead<'_, K, T> {
  fn drop(&mut self) {
    if let Some(resolver) = self.resolver.take() {
      tracing::warn!("in-flight computation abandoned before resolving; releasing waiters");
      drop(resolver);
    }
    self.registry.remove(&self.key, &self.entry);
  }
}
