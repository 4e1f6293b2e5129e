//! A request-coalescing cache-aside layer that prevents cache stampedes.
//!
//! Given a [`TtlStore`] and a fetch function, a coalescer guarantees that for
//! any key at most one fetch is in flight at a time, however many callers miss
//! the store for that key concurrently. The callers that arrive while the
//! fetch is running wait for it and share its result.
//!
//! # Features
//! - **Sync & Async**: a blocking [`Coalescer`] for threads and an
//!   [`AsyncCoalescer`] for tasks (`tokio` feature).
//! - **Per-caller cancellation**: a waiter whose [`Context`] ends returns
//!   early without disturbing the shared computation or the other waiters.
//! - **No negative caching**: failed fetches are shared with every waiter but
//!   never stored.
//! - **Pluggable stores**: an in-process [`MemoryStore`] and, with the `serde`
//!   feature, a [`CodecStore`](store::codec::CodecStore) over any byte store.

// Public modules that form the API
pub mod builder;
pub mod context;
pub mod error;
pub mod handles;
pub mod metrics;
pub mod signal;
pub mod store;

// Internal, crate-only modules
mod loader;
mod registry;
mod shared;
mod waiter;

// Re-export the primary user-facing types for convenience
pub use builder::CoalescerBuilder;
pub use context::Context;
pub use error::{BuildError, CoalesceError, ContextError, Result};
pub use handles::Coalescer;
#[cfg(feature = "tokio")]
pub use handles::AsyncCoalescer;
pub use metrics::MetricsSnapshot;
pub use store::memory::MemoryStore;
pub use store::{Retention, StoreError, TtlStore};
