use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for a coalescer.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Store lookups ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Coalescing ---
  pub(crate) coalesced: CachePadded<AtomicU64>,
  pub(crate) fetches: CachePadded<AtomicU64>,
  pub(crate) fetch_errors: CachePadded<AtomicU64>,

  // --- Failures kept away from callers ---
  pub(crate) store_errors: CachePadded<AtomicU64>,
  pub(crate) cancellations: CachePadded<AtomicU64>,
  pub(crate) abandoned: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      coalesced: CachePadded::new(AtomicU64::new(0)),
      fetches: CachePadded::new(AtomicU64::new(0)),
      fetch_errors: CachePadded::new(AtomicU64::new(0)),
      store_errors: CachePadded::new(AtomicU64::new(0)),
      cancellations: CachePadded::new(AtomicU64::new(0)),
      abandoned: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      coalesced: self.coalesced.load(Ordering::Relaxed),
      fetches: self.fetches.load(Ordering::Relaxed),
      fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
      store_errors: self.store_errors.load(Ordering::Relaxed),
      cancellations: self.cancellations.load(Ordering::Relaxed),
      abandoned: self.abandoned.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of a coalescer's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Lookups answered by the store.
  pub hits: u64,
  /// Lookups the store could not answer, for any reason.
  pub misses: u64,
  /// The store hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// Misses that joined a computation already in flight.
  pub coalesced: u64,
  /// Fetches actually executed.
  pub fetches: u64,
  /// Fetches that returned an error.
  pub fetch_errors: u64,
  /// Failed writes of computed values back to the store.
  pub store_errors: u64,
  /// Waiters released early because their context ended.
  pub cancellations: u64,
  /// Waiters whose computation was abandoned by a panicking or dropped leader.
  pub abandoned: u64,
  /// The number of seconds the coalescer has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("coalesced", &self.coalesced)
      .field("fetches", &self.fetches)
      .field("fetch_errors", &self.fetch_errors)
      .field("store_errors", &self.store_errors)
      .field("cancellations", &self.cancellations)
      .field("abandoned", &self.abandoned)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
