use super::{StoreError, TtlStore};
use crate::context::Context;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts values to and from the bytes kept by a byte-oriented store.
pub trait Codec: Send + Sync {
  fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, StoreError>;
  fn decode<V: DeserializeOwned>(&self, data: &[u8]) -> Result<V, StoreError>;
}

/// JSON encoding via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
  fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Codec(Box::new(e)))
  }

  fn decode<V: DeserializeOwned>(&self, data: &[u8]) -> Result<V, StoreError> {
    serde_json::from_slice(data).map_err(|e| StoreError::Codec(Box::new(e)))
  }
}

/// Compact binary encoding via `bincode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
  fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Codec(e))
  }

  fn decode<V: DeserializeOwned>(&self, data: &[u8]) -> Result<V, StoreError> {
    bincode::deserialize(data).map_err(|e| StoreError::Codec(e))
  }
}

/// A typed view over a store of raw bytes.
///
/// Values are encoded on write and decoded on read. A value that fails to
/// decode surfaces as [`StoreError::Codec`], which a coalescer treats like any
/// other miss.
#[derive(Debug, Clone)]
pub struct CodecStore<S, C> {
  inner: S,
  codec: C,
}

impl<S, C> CodecStore<S, C> {
  pub fn new(inner: S, codec: C) -> Self {
    Self { inner, codec }
  }

  /// The underlying byte store.
  pub fn inner(&self) -> &S {
    &self.inner
  }
}

impl<K, V, S, C> TtlStore<K, V> for CodecStore<S, C>
where
  S: TtlStore<K, Vec<u8>>,
  C: Codec,
  V: Serialize + DeserializeOwned,
{
  fn get(&self, ctx: &Context, key: &K) -> Result<V, StoreError> {
    let data = self.inner.get(ctx, key)?;
    self.codec.decode(&data)
  }

  fn set(&self, ctx: &Context, key: &K, value: V) -> Result<(), StoreError> {
    let data = self.codec.encode(&value)?;
    self.inner.set(ctx, key, data)
  }

  fn set_with_ttl(&self, ctx: &Context, key: &K, value: V, ttl: Duration) -> Result<(), StoreError> {
    let data = self.codec.encode(&value)?;
    self.inner.set_with_ttl(ctx, key, data, ttl)
  }

  fn del(&self, ctx: &Context, keys: &[K]) -> Result<(), StoreError> {
    self.inner.del(ctx, keys)
  }

  fn clear(&self, ctx: &Context) -> Result<(), StoreError> {
    self.inner.clear(ctx)
  }
}
