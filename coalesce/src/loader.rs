use std::sync::Arc;

#[cfg(feature = "tokio")]
use futures_util::future::BoxFuture;

/// The default fetch configured on the builder, used by `get` when the caller
/// does not supply one.
///
/// Unlike a per-call fetch, it receives the missing key.
pub(crate) enum Loader<K, V, E> {
  Sync(Arc<dyn Fn(K) -> Result<V, E> + Send + Sync>),
  #[cfg(feature = "tokio")]
  Async(Arc<dyn Fn(K) -> BoxFuture<'static, Result<V, E>> + Send + Sync>),
}

impl<K, V, E> Clone for Loader<K, V, E> {
  fn clone(&self) -> Self {
    match self {
      Loader::Sync(f) => Loader::Sync(f.clone()),
      #[cfg(feature = "tokio")]
      Loader::Async(f) => Loader::Async(f.clone()),
    }
  }
}
