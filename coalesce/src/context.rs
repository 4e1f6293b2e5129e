//! Caller-scoped cancellation and deadlines.
//!
//! A [`Context`] travels with a single `get` call. It only bounds how long
//! that caller is willing to *wait* for a value another caller is computing;
//! it never aborts the computation itself.

use crate::error::ContextError;
use crate::waiter::{self, Waiter};

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct State {
  cancelled: bool,
  next_id: u64,
  waiters: Vec<(u64, Waiter)>,
}

struct Inner {
  parent: Option<Context>,
  /// The effective deadline, already folded with every ancestor's.
  deadline: Option<Instant>,
  state: Mutex<State>,
}

/// A cancellation scope with an optional deadline.
///
/// Cloning a `Context` yields another handle to the same scope; cancelling
/// any clone cancels all of them and every context derived from them with
/// [`child`](Context::child).
///
/// The default context is [`Context::background`].
#[derive(Clone, Default)]
pub struct Context {
  inner: Option<Arc<Inner>>,
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context")
      .field("deadline", &self.deadline())
      .field("err", &self.err())
      .finish()
  }
}

impl Context {
  /// A context that never ends. Cancelling it is a no-op.
  pub fn background() -> Self {
    Self { inner: None }
  }

  /// A context that ends only when [`cancel`](Context::cancel) is called.
  pub fn new() -> Self {
    Self::build(None, None)
  }

  /// A cancellable context that also ends after `timeout`.
  pub fn with_timeout(timeout: Duration) -> Self {
    Self::build(None, Some(Instant::now() + timeout))
  }

  /// A cancellable context that also ends at `deadline`.
  pub fn with_deadline(deadline: Instant) -> Self {
    Self::build(None, Some(deadline))
  }

  /// Derives a context that ends when `self` ends or when it is cancelled
  /// itself. Cancelling the child does not affect the parent.
  pub fn child(&self) -> Self {
    Self::build(Some(self.clone()), self.deadline())
  }

  /// Like [`child`](Context::child), but also ends after `timeout`.
  pub fn child_with_timeout(&self, timeout: Duration) -> Self {
    let own = Instant::now() + timeout;
    let deadline = match self.deadline() {
      Some(parent) if parent < own => parent,
      _ => own,
    };
    Self::build(Some(self.clone()), Some(deadline))
  }

  fn build(parent: Option<Context>, deadline: Option<Instant>) -> Self {
    // A background parent contributes nothing to the chain.
    let parent = parent.filter(|p| p.inner.is_some());
    Self {
      inner: Some(Arc::new(Inner {
        parent,
        deadline,
        state: Mutex::new(State {
          cancelled: false,
          next_id: 0,
          waiters: Vec::new(),
        }),
      })),
    }
  }

  /// Ends this context and every context derived from it, waking all callers
  /// currently waiting under it.
  pub fn cancel(&self) {
    let Some(inner) = &self.inner else {
      return;
    };
    let waiters = {
      let mut state = inner.state.lock();
      if state.cancelled {
        return;
      }
      state.cancelled = true;
      state.waiters.drain(..).map(|(_, w)| w).collect()
    };
    waiter::wake_all(waiters);
  }

  /// The instant this context's deadline passes, if it has one.
  pub fn deadline(&self) -> Option<Instant> {
    self.inner.as_ref().and_then(|inner| inner.deadline)
  }

  /// Returns why the context ended, or `None` while it is still live.
  pub fn err(&self) -> Option<ContextError> {
    let mut link = self.inner.as_ref();
    while let Some(inner) = link {
      if inner.state.lock().cancelled {
        return Some(ContextError::Cancelled);
      }
      if let Some(deadline) = inner.deadline {
        if Instant::now() >= deadline {
          return Some(ContextError::DeadlineExceeded);
        }
      }
      link = inner.parent.as_ref().and_then(|p| p.inner.as_ref());
    }
    None
  }

  /// Returns `true` once the context has ended.
  pub fn is_done(&self) -> bool {
    self.err().is_some()
  }

  /// Registers a waiter with this context and all of its ancestors so that a
  /// cancellation anywhere in the chain wakes it. The waiter is removed again
  /// when the returned registration is dropped.
  pub(crate) fn register(&self, make: impl Fn() -> Waiter) -> Registration {
    let mut entries = Vec::new();
    let mut link = self.inner.as_ref();
    while let Some(inner) = link {
      {
        let mut state = inner.state.lock();
        if !state.cancelled {
          let id = state.next_id;
          state.next_id += 1;
          state.waiters.push((id, make()));
          entries.push((Arc::clone(inner), id));
        }
      }
      link = inner.parent.as_ref().and_then(|p| p.inner.as_ref());
    }
    Registration { entries }
  }
}

/// Keeps a waiter registered with a context chain until dropped.
pub(crate) struct Registration {
  entries: Vec<(Arc<Inner>, u64)>,
}

impl Drop for Registration {
  fn drop(&mut self) {
    for (inner, id) in self.entries.drain(..) {
      let mut state = inner.state.lock();
      if let Some(pos) = state.waiters.iter().position(|(entry_id, _)| *entry_id == id) {
        state.waiters.swap_remove(pos);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;

  #[test]
  fn background_never_ends() {
    let ctx = Context::background();
    ctx.cancel();
    assert_eq!(ctx.err(), None);
    assert_eq!(ctx.deadline(), None);
  }

  #[test]
  fn cancel_is_shared_by_clones() {
    let ctx = Context::new();
    let clone = ctx.clone();
    assert!(!ctx.is_done());
    clone.cancel();
    assert_eq!(ctx.err(), Some(ContextError::Cancelled));
  }

  #[test]
  fn deadline_is_reported_after_it_passes() {
    let ctx = Context::with_timeout(Duration::from_millis(10));
    assert_eq!(ctx.err(), None);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
  }

  #[test]
  fn parent_cancellation_reaches_child_but_not_the_reverse() {
    let parent = Context::new();
    let child = parent.child();
    child.cancel();
    assert_eq!(parent.err(), None);

    let other = parent.child();
    parent.cancel();
    assert_eq!(other.err(), Some(ContextError::Cancelled));
  }

  #[test]
  fn child_deadline_never_outlives_parent() {
    let parent = Context::with_timeout(Duration::from_millis(5));
    let child = parent.child_with_timeout(Duration::from_secs(60));
    assert_eq!(child.deadline(), parent.deadline());
  }

  #[test]
  fn registration_is_removed_on_drop() {
    let ctx = Context::new();
    let registration = ctx.register(|| Waiter::Sync(thread::current()));
    assert_eq!(ctx.inner.as_ref().unwrap().state.lock().waiters.len(), 1);
    drop(registration);
    assert!(ctx.inner.as_ref().unwrap().state.lock().waiters.is_empty());
  }
}
