use fibre_coalesce::{BuildError, Coalescer, Context, MemoryStore, StoreError, TtlStore};
use std::convert::Infallible;
use std::time::Duration;

#[test]
fn test_zero_time_to_live_is_rejected() {
  let result = Coalescer::<u32, u32, Infallible, _>::builder(MemoryStore::new())
    .time_to_live(Duration::ZERO)
    .build();

  assert!(matches!(result, Err(BuildError::ZeroTimeToLive)));
}

#[test]
fn test_builder_without_fetch_is_valid() {
  // A coalescer without a default fetch still serves `get_with`.
  let coalescer = Coalescer::<u32, u32, Infallible, _>::builder(MemoryStore::new())
    .build()
    .unwrap();

  let value = coalescer
    .get_with(&Context::background(), &1, || Ok(10))
    .unwrap();
  assert_eq!(value, 10);
  assert_eq!(coalescer.store().get(&Context::background(), &1).unwrap(), 10);
}

#[test]
fn test_bounded_store_failure_does_not_fail_the_call() {
  let store = MemoryStore::new().max_entries(1);
  let coalescer = Coalescer::<u32, u32, Infallible, _>::builder(store)
    .on_store_error(|err: &StoreError| assert!(matches!(err, StoreError::Full { capacity: 1 })))
    .build()
    .unwrap();
  let ctx = Context::background();

  assert_eq!(coalescer.get_with(&ctx, &1, || Ok(1)).unwrap(), 1);
  assert_eq!(coalescer.get_with(&ctx, &2, || Ok(2)).unwrap(), 2);
  assert_eq!(coalescer.metrics().store_errors, 1);
  assert!(coalescer.store().get(&Context::background(), &2).unwrap_err().is_miss());
}

#[cfg(feature = "tokio")]
#[test]
fn test_async_fetch_is_rejected_by_the_blocking_handle() {
  let result = Coalescer::<u32, u32, Infallible, _>::builder(MemoryStore::new())
    .async_fetch(|key: u32| async move { Ok(key) })
    .build();

  assert!(matches!(result, Err(BuildError::AsyncFetchOnSyncHandle)));
}

#[cfg(feature = "tokio")]
#[tokio::test]
async fn test_async_handle_rejects_zero_time_to_live() {
  let result = fibre_coalesce::AsyncCoalescer::<u32, u32, Infallible, _>::builder(MemoryStore::new())
    .time_to_live(Duration::ZERO)
    .build_async();

  assert!(matches!(result, Err(BuildError::ZeroTimeToLive)));
}
