#![allow(dead_code)]

use fibre_coalesce::{Context, MemoryStore, StoreError, TtlStore};

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Routes `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fibre_coalesce=debug")),
    )
    .with_test_writer()
    .try_init();
}

/// A `MemoryStore` whose reads and writes can be made to fail on demand.
#[derive(Default)]
pub struct FlakyStore {
  inner: MemoryStore<String, u64>,
  pub fail_get: AtomicBool,
  pub fail_set: AtomicBool,
  pub gets: AtomicUsize,
  pub sets: AtomicUsize,
  pub ttl_sets: AtomicUsize,
  /// Operations that arrived with an already ended context.
  pub ended_contexts: AtomicUsize,
}

impl FlakyStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn inner(&self) -> &MemoryStore<String, u64> {
    &self.inner
  }

  fn note_context(&self, ctx: &Context) {
    if ctx.is_done() {
      self.ended_contexts.fetch_add(1, Ordering::SeqCst);
    }
  }
}

impl TtlStore<String, u64> for FlakyStore {
  fn get(&self, ctx: &Context, key: &String) -> Result<u64, StoreError> {
    self.gets.fetch_add(1, Ordering::SeqCst);
    self.note_context(ctx);
    if self.fail_get.load(Ordering::SeqCst) {
      return Err(StoreError::backend(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "connection reset",
      )));
    }
    self.inner.get(ctx, key)
  }

  fn set(&self, ctx: &Context, key: &String, value: u64) -> Result<(), StoreError> {
    self.sets.fetch_add(1, Ordering::SeqCst);
    self.note_context(ctx);
    if self.fail_set.load(Ordering::SeqCst) {
      return Err(StoreError::backend(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "broken pipe",
      )));
    }
    self.inner.set(ctx, key, value)
  }

  fn set_with_ttl(
    &self,
    ctx: &Context,
    key: &String,
    value: u64,
    ttl: Duration,
  ) -> Result<(), StoreError> {
    self.ttl_sets.fetch_add(1, Ordering::SeqCst);
    self.note_context(ctx);
    self.inner.set_with_ttl(ctx, key, value, ttl)
  }

  fn del(&self, ctx: &Context, keys: &[String]) -> Result<(), StoreError> {
    self.inner.del(ctx, keys)
  }

  fn clear(&self, ctx: &Context) -> Result<(), StoreError> {
    self.inner.clear(ctx)
  }
}

/// An error type for fetches in tests.
#[derive(Debug, PartialEq, Eq)]
pub struct FetchFailed(pub &'static str);

impl std::fmt::Display for FetchFailed {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "fetch failed: {}", self.0)
  }
}

impl std::error::Error for FetchFailed {}

/// Polls `condition` every few milliseconds, panicking after `timeout`.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
  let start = Instant::now();
  while !condition() {
    assert!(
      start.elapsed() < timeout,
      "condition not reached within {:?}",
      timeout
    );
    std::thread::sleep(Duration::from_millis(5));
  }
}
