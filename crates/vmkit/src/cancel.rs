//! Cooperative cancellation shared between the batch and its poll loops.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

/// Cloneable cancellation flag.
///
/// Waits performed through [`CancelToken::wait`] wake up as soon as the token
/// is cancelled, so a stuck shutdown poll can be aborted from another thread
/// (Ctrl-C handler, timeout watchdog).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel, waking every waiter.
    pub fn cancel(&self) {
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.inner.wakeup.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the token was cancelled before or during the wait.
    /// A duration too large to represent as a deadline waits until cancelled.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            cancelled = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.inner
                        .wakeup
                        .wait_timeout(cancelled, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .inner
                    .wakeup
                    .wait(cancelled)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        true
    }

    /// Cancel this token once `timeout` elapses.
    ///
    /// The watchdog thread exits early if the token is cancelled by someone
    /// else first.
    pub fn cancel_after(&self, timeout: Duration) {
        let token = self.clone();
        thread::spawn(move || {
            if !token.wait(timeout) {
                log::warn!(
                    "batch timeout of {}s reached, cancelling",
                    timeout.as_secs()
                );
                token.cancel();
            }
        });
    }
}
