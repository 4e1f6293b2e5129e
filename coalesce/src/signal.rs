//! A one-shot, multi-observer completion signal.
//!
//! One [`Resolver`] publishes a value exactly once; any number of threads and
//! tasks can wait on the matching [`CompletionSignal`], including ones that
//! only start waiting after the value was published.

use crate::context::Context;
use crate::error::ContextError;
use crate::waiter::{self, Waiter};

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

/// Why a wait on a [`CompletionSignal`] returned without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
  /// The waiter's context ended first.
  Context(ContextError),
  /// The resolver was dropped without publishing a value.
  Abandoned,
}

enum State<T> {
  Pending,
  Complete(T),
  Abandoned,
}

struct Inner<T> {
  state: State<T>,
  next_id: u64,
  waiters: Vec<(u64, Waiter)>,
}

impl<T> Inner<T> {
  fn enqueue(&mut self, waiter: Waiter) -> u64 {
    let id = self.next_id;
    self.next_id += 1;
    self.waiters.push((id, waiter));
    id
  }
}

/// The observing half of a signal created by [`pair`].
pub struct CompletionSignal<T> {
  inner: Mutex<Inner<T>>,
}

/// The publishing half of a signal created by [`pair`].
///
/// Dropping a `Resolver` without calling [`resolve`](Resolver::resolve)
/// abandons the signal, releasing every waiter with [`WaitError::Abandoned`].
pub struct Resolver<T> {
  signal: Arc<CompletionSignal<T>>,
  resolved: bool,
}

/// Creates a pending signal and the resolver that completes it.
pub fn pair<T>() -> (Arc<CompletionSignal<T>>, Resolver<T>) {
  let signal = Arc::new(CompletionSignal {
    inner: Mutex::new(Inner {
      state: State::Pending,
      next_id: 0,
      waiters: Vec::new(),
    }),
  });
  let resolver = Resolver {
    signal: Arc::clone(&signal),
    resolved: false,
  };
  (signal, resolver)
}

impl<T> Resolver<T> {
  /// Publishes `value` and wakes every waiter.
  pub fn resolve(mut self, value: T) {
    self.resolved = true;
    self.signal.finish(State::Complete(value));
  }
}

impl<T> Drop for Resolver<T> {
  fn drop(&mut self) {
    if !self.resolved {
      self.signal.finish(State::Abandoned);
    }
  }
}

impl<T> fmt::Debug for Resolver<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Resolver").field("signal", &self.signal).finish()
  }
}

impl<T> fmt::Debug for CompletionSignal<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock();
    let state = match inner.state {
      State::Pending => "pending",
      State::Complete(_) => "complete",
      State::Abandoned => "abandoned",
    };
    f.debug_struct("CompletionSignal")
      .field("state", &state)
      .field("waiters", &inner.waiters.len())
      .finish()
  }
}

/// A waiter's slot in a signal's queue. Dropping it takes the waiter off the
/// queue, so callers that give up early leave nothing behind.
struct Queued<'a, T> {
  signal: &'a CompletionSignal<T>,
  id: u64,
}

impl<T> Drop for Queued<'_, T> {
  fn drop(&mut self) {
    let mut inner = self.signal.inner.lock();
    if let Some(pos) = inner.waiters.iter().position(|(id, _)| *id == self.id) {
      inner.waiters.swap_remove(pos);
    }
  }
}

impl<T> CompletionSignal<T> {
  fn finish(&self, state: State<T>) {
    let waiters = {
      let mut inner = self.inner.lock();
      if !matches!(inner.state, State::Pending) {
        return;
      }
      inner.state = state;
      std::mem::take(&mut inner.waiters)
    };
    waiter::wake_all(waiters.into_iter().map(|(_, w)| w).collect());
  }

  /// Returns `true` once the signal has been resolved or abandoned.
  pub fn is_complete(&self) -> bool {
    !matches!(self.inner.lock().state, State::Pending)
  }
}

impl<T: Clone> CompletionSignal<T> {
  /// Returns the outcome without blocking, or `None` while still pending.
  pub fn peek(&self) -> Option<Result<T, WaitError>> {
    match &self.inner.lock().state {
      State::Pending => None,
      State::Complete(value) => Some(Ok(value.clone())),
      State::Abandoned => Some(Err(WaitError::Abandoned)),
    }
  }

  /// Blocks the current thread until the signal completes or `ctx` ends,
  /// whichever happens first.
  ///
  /// A completed signal always wins over an ended context, so a caller whose
  /// context ends at the same moment still observes the value.
  pub fn wait(&self, ctx: &Context) -> Result<T, WaitError> {
    let _registration = ctx.register(|| Waiter::Sync(thread::current()));
    let mut queued: Option<Queued<'_, T>> = None;
    loop {
      let outcome = {
        let mut inner = self.inner.lock();
        match &inner.state {
          State::Complete(value) => Some(Ok(value.clone())),
          State::Abandoned => Some(Err(WaitError::Abandoned)),
          State::Pending => match ctx.err() {
            Some(err) => Some(Err(WaitError::Context(err))),
            None => {
              // Queued once; spurious wakeups keep the same slot.
              if queued.is_none() {
                let id = inner.enqueue(Waiter::Sync(thread::current()));
                queued = Some(Queued { signal: self, id });
              }
              None
            }
          },
        }
      }; // Unlock before parking or dequeueing.

      if let Some(outcome) = outcome {
        return outcome;
      }

      match ctx.deadline() {
        Some(deadline) => {
          let now = Instant::now();
          if deadline > now {
            thread::park_timeout(deadline - now);
          }
        }
        None => thread::park(),
      }
    }
  }

  /// Waits asynchronously until the signal completes or `ctx` ends.
  ///
  /// Deadlines use the tokio timer when polled inside a tokio runtime and a
  /// watcher thread otherwise, so the future can be driven by any executor.
  #[cfg(feature = "tokio")]
  pub fn wait_async<'a>(&'a self, ctx: &'a Context) -> wait_future::WaitFuture<'a, T> {
    wait_future::WaitFuture::new(self, ctx)
  }
}

#[cfg(feature = "tokio")]
pub mod wait_future {
  use super::{CompletionSignal, Queued, State, WaitError};
  use crate::context::{Context, Registration};
  use crate::error::ContextError;
  use crate::waiter::Waiter;

  use std::future::Future;
  use std::pin::Pin;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;
  use std::task::{Context as TaskContext, Poll, Waker};
  use std::thread::{self, Thread};
  use std::time::Instant;

  use parking_lot::Mutex;

  /// The `Future` returned by [`CompletionSignal::wait_async`].
  #[must_use = "futures do nothing unless you .await or poll them"]
  pub struct WaitFuture<'a, T> {
    signal: &'a CompletionSignal<T>,
    ctx: &'a Context,
    queued: Option<Queued<'a, T>>,
    registration: Option<Registration>,
    timer: Option<DeadlineTimer>,
  }

  impl<'a, T> WaitFuture<'a, T> {
    pub(super) fn new(signal: &'a CompletionSignal<T>, ctx: &'a Context) -> Self {
      Self {
        signal,
        ctx,
        queued: None,
        registration: None,
        timer: None,
      }
    }
  }

  impl<T: Clone> Future for WaitFuture<'_, T> {
    type Output = Result<T, WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
      let this = self.get_mut();

      {
        let mut inner = this.signal.inner.lock();
        match &inner.state {
          State::Complete(value) => return Poll::Ready(Ok(value.clone())),
          State::Abandoned => return Poll::Ready(Err(WaitError::Abandoned)),
          State::Pending => {}
        }
        match &this.queued {
          Some(queued) => {
            // Keep one slot per future; only refresh a stale waker.
            let id = queued.id;
            if let Some((_, waiter)) = inner.waiters.iter_mut().find(|(entry, _)| *entry == id) {
              if !waiter.will_wake(cx.waker()) {
                *waiter = Waiter::Async(cx.waker().clone());
              }
            }
          }
          None => {
            let id = inner.enqueue(Waiter::Async(cx.waker().clone()));
            this.queued = Some(Queued {
              signal: this.signal,
              id,
            });
          }
        }
      }

      // Re-register with the latest waker before checking, so a cancel that
      // lands in between is never lost.
      this.registration = None;
      this.registration = Some(this.ctx.register(|| Waiter::Async(cx.waker().clone())));
      if let Some(err) = this.ctx.err() {
        return Poll::Ready(Err(WaitError::Context(err)));
      }

      if let Some(deadline) = this.ctx.deadline() {
        let timer = this
          .timer
          .get_or_insert_with(|| DeadlineTimer::arm(deadline));
        if timer.poll_elapsed(cx).is_ready() {
          return Poll::Ready(Err(WaitError::Context(ContextError::DeadlineExceeded)));
        }
      }

      Poll::Pending
    }
  }

  /// Wakes a pending wait once its context's deadline passes.
  enum DeadlineTimer {
    Tokio(Pin<Box<tokio::time::Sleep>>),
    Watcher(DeadlineWatcher),
  }

  impl DeadlineTimer {
    fn arm(deadline: Instant) -> Self {
      match tokio::runtime::Handle::try_current() {
        Ok(_) => DeadlineTimer::Tokio(Box::pin(tokio::time::sleep_until(deadline.into()))),
        Err(_) => DeadlineTimer::Watcher(DeadlineWatcher::new(deadline)),
      }
    }

    fn poll_elapsed(&mut self, cx: &mut TaskContext<'_>) -> Poll<()> {
      match self {
        DeadlineTimer::Tokio(sleep) => sleep.as_mut().poll(cx),
        DeadlineTimer::Watcher(watcher) => watcher.poll_elapsed(cx),
      }
    }
  }

  struct WatcherShared {
    waker: Mutex<Option<Waker>>,
    done: AtomicBool,
  }

  /// A parked helper thread standing in for the tokio timer outside a tokio
  /// runtime. It exits at the deadline or as soon as the wait is dropped.
  struct DeadlineWatcher {
    deadline: Instant,
    shared: Arc<WatcherShared>,
    thread: Option<Thread>,
  }

  impl DeadlineWatcher {
    fn new(deadline: Instant) -> Self {
      Self {
        deadline,
        shared: Arc::new(WatcherShared {
          waker: Mutex::new(None),
          done: AtomicBool::new(false),
        }),
        thread: None,
      }
    }

    fn poll_elapsed(&mut self, cx: &mut TaskContext<'_>) -> Poll<()> {
      if Instant::now() >= self.deadline {
        return Poll::Ready(());
      }
      *self.shared.waker.lock() = Some(cx.waker().clone());

      if self.thread.is_none() {
        let shared = Arc::clone(&self.shared);
        let deadline = self.deadline;
        let spawned = thread::Builder::new()
          .name("fibre-coalesce-deadline".to_string())
          .spawn(move || {
            loop {
              if shared.done.load(Ordering::Acquire) {
                return;
              }
              let now = Instant::now();
              if now >= deadline {
                break;
              }
              thread::park_timeout(deadline - now);
            }
            if let Some(waker) = shared.waker.lock().take() {
              waker.wake();
            }
          });
        match spawned {
          Ok(handle) => self.thread = Some(handle.thread().clone()),
          Err(err) => {
            tracing::warn!(error = %err, "failed to start deadline watcher; retrying on next poll")
          }
        }
      }

      Poll::Pending
    }
  }

  impl Drop for DeadlineWatcher {
    fn drop(&mut self) {
      self.shared.done.store(true, Ordering::Release);
      if let Some(thread) = &self.thread {
        thread.unpark();
      }
    }
  }
}
