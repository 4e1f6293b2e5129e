use std::task::Waker;
use std::thread::Thread;

/// A parked caller waiting on a signal or a context.
pub(crate) enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  pub(crate) fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }

  /// Returns `true` if waking `self` would wake the same task as `waker`.
  pub(crate) fn will_wake(&self, waker: &Waker) -> bool {
    match self {
      Waiter::Async(existing) => existing.will_wake(waker),
      Waiter::Sync(_) => false,
    }
  }
}

/// Wakes every waiter. Callers drain their queue under the lock and wake
/// outside of it.
pub(crate) fn wake_all(waiters: Vec<Waiter>) {
  for waiter in waiters {
    waiter.wake();
  }
}
