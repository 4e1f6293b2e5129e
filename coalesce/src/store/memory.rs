use super::{StoreError, TtlStore};
use crate::context::Context;

use core::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use ahash::{HashMap, HashMapExt};
use parking_lot::RwLock;

/// A stored value with its absolute expiry. `None` means it never expires.
#[derive(Debug)]
struct StoredValue<V> {
  value: V,
  expires_at: Option<Instant>,
}

impl<V> StoredValue<V> {
  #[inline]
  fn is_expired(&self, now: Instant) -> bool {
    self.expires_at.is_some_and(|at| now >= at)
  }
}

/// An in-process [`TtlStore`]. Operations never block, so the context is unused.
///
/// Expiry is lazy: an expired entry stays in memory until it is read, or until
/// [`purge_expired`](MemoryStore::purge_expired) runs. There is no eviction
/// policy; a store built with [`max_entries`](MemoryStore::max_entries)
/// rejects new keys with [`StoreError::Full`] once the bound is reached.
pub struct MemoryStore<K, V> {
  map: RwLock<HashMap<K, StoredValue<V>>>,
  default_ttl: Option<Duration>,
  max_entries: Option<usize>,
}

impl<K, V> fmt::Debug for MemoryStore<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryStore")
      .field("len", &self.map.read().len())
      .field("default_ttl", &self.default_ttl)
      .field("max_entries", &self.max_entries)
      .finish()
  }
}

impl<K, V> Default for MemoryStore<K, V> {
  fn default() -> Self {
    Self {
      map: RwLock::new(HashMap::new()),
      default_ttl: None,
      max_entries: None,
    }
  }
}

impl<K, V> MemoryStore<K, V> {
  /// Creates an unbounded store whose entries never expire unless written
  /// with `set_with_ttl`.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates an unbounded store whose `set` applies `ttl`.
  pub fn with_ttl(ttl: Duration) -> Self {
    Self {
      default_ttl: Some(ttl),
      ..Self::default()
    }
  }

  /// Bounds the number of stored keys.
  pub fn max_entries(mut self, max_entries: usize) -> Self {
    self.max_entries = Some(max_entries);
    self
  }

  /// Number of stored entries, expired ones included.
  pub fn len(&self) -> usize {
    self.map.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.map.read().is_empty()
  }

  /// Drops every expired entry and returns how many were removed.
  pub fn purge_expired(&self) -> usize {
    let now = Instant::now();
    let mut map = self.map.write();
    let before = map.len();
    map.retain(|_, stored| !stored.is_expired(now));
    before - map.len()
  }
}

impl<K, V> MemoryStore<K, V>
where
  K: Eq + Hash + Clone,
{
  fn insert(&self, key: &K, value: V, ttl: Option<Duration>) -> Result<(), StoreError> {
    let now = Instant::now();
    let stored = StoredValue {
      value,
      expires_at: ttl.map(|ttl| now + ttl),
    };

    let mut map = self.map.write();
    if let Some(capacity) = self.max_entries {
      if !map.contains_key(key) && map.len() >= capacity {
        map.retain(|_, stored| !stored.is_expired(now));
        if map.len() >= capacity {
          return Err(StoreError::Full { capacity });
        }
      }
    }
    map.insert(key.clone(), stored);
    Ok(())
  }
}

impl<K, V> TtlStore<K, V> for MemoryStore<K, V>
where
  K: Eq + Hash + Clone + Send + Sync,
  V: Clone + Send + Sync,
{
  fn get(&self, _ctx: &Context, key: &K) -> Result<V, StoreError> {
    let now = Instant::now();
    {
      let map = self.map.read();
      match map.get(key) {
        None => return Err(StoreError::Miss),
        Some(stored) if !stored.is_expired(now) => return Ok(stored.value.clone()),
        Some(_) => {}
      }
    } // Read lock is dropped here.

    // Expired: remove it, unless a writer replaced it in the meantime.
    let mut map = self.map.write();
    if map.get(key).is_some_and(|stored| stored.is_expired(now)) {
      map.remove(key);
    }
    Err(StoreError::Miss)
  }

  fn set(&self, _ctx: &Context, key: &K, value: V) -> Result<(), StoreError> {
    self.insert(key, value, self.default_ttl)
  }

  fn set_with_ttl(&self, _ctx: &Context, key: &K, value: V, ttl: Duration) -> Result<(), StoreError> {
    self.insert(key, value, Some(ttl))
  }

  fn del(&self, _ctx: &Context, keys: &[K]) -> Result<(), StoreError> {
    let mut map = self.map.write();
    for key in keys {
      map.remove(key);
    }
    Ok(())
  }

  fn clear(&self, _ctx: &Context) -> Result<(), StoreError> {
    self.map.write().clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;

  #[test]
  fn get_after_set_hits() {
    let ctx = Context::background();
    let store = MemoryStore::new();
    store.set(&ctx, &"a", 1).unwrap();
    assert_eq!(store.get(&ctx, &"a").unwrap(), 1);
    assert!(store.get(&ctx, &"b").unwrap_err().is_miss());
  }

  #[test]
  fn default_ttl_expires_lazily() {
    let ctx = Context::background();
    let store = MemoryStore::with_ttl(Duration::from_millis(20));
    store.set(&ctx, &1u32, "v").unwrap();
    assert_eq!(store.get(&ctx, &1).unwrap(), "v");

    thread::sleep(Duration::from_millis(40));
    assert_eq!(store.len(), 1, "expired entries stay until read");
    assert!(store.get(&ctx, &1).unwrap_err().is_miss());
    assert!(store.is_empty());
  }

  #[test]
  fn explicit_ttl_overrides_default() {
    let ctx = Context::background();
    let store = MemoryStore::with_ttl(Duration::from_millis(10));
    store
      .set_with_ttl(&ctx, &1u32, "long", Duration::from_secs(60))
      .unwrap();
    store.set(&ctx, &2u32, "short").unwrap();

    thread::sleep(Duration::from_millis(30));
    assert_eq!(store.get(&ctx, &1).unwrap(), "long");
    assert_eq!(store.purge_expired(), 1);
  }

  #[test]
  fn del_and_clear_remove_entries() {
    let ctx = Context::background();
    let store = MemoryStore::new();
    for i in 0..4u8 {
      store.set(&ctx, &i, i).unwrap();
    }
    store.del(&ctx, &[0, 1, 9]).unwrap();
    assert_eq!(store.len(), 2);
    store.clear(&ctx).unwrap();
    assert!(store.is_empty());
  }

  #[test]
  fn bounded_store_rejects_new_keys_when_full() {
    let ctx = Context::background();
    let store = MemoryStore::new().max_entries(2);
    store.set(&ctx, &1u8, 'a').unwrap();
    store.set(&ctx, &2u8, 'b').unwrap();
    // Overwriting an existing key is always allowed.
    store.set(&ctx, &2u8, 'c').unwrap();

    let err = store.set(&ctx, &3u8, 'd').unwrap_err();
    assert!(matches!(err, StoreError::Full { capacity: 2 }));

    store.set_with_ttl(&ctx, &2u8, 'e', Duration::from_millis(1)).unwrap();
    thread::sleep(Duration::from_millis(5));
    store.set(&ctx, &3u8, 'f').expect("expired entries make room");
  }
}
