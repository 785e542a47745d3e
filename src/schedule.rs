//! Fixed-rate recurring tasks with cooperative cancellation
//!
//! A [`RecurringTask`] runs a closure on its own thread at a fixed rate
//! until its [`CancellationToken`] is cancelled. Cancelling means "do not
//! run again": a tick already in progress finishes normally, but the wait
//! before the next tick wakes immediately.

use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

/// Shared one-way cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token.
    ///
    /// Returns `true` only for the call that actually flipped it.
    pub fn cancel(&self) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        if *cancelled {
            return false;
        }
        *cancelled = true;
        self.inner.cond.notify_all();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Block until `deadline` or cancellation, whichever comes first.
    ///
    /// Returns `true` if the token was cancelled.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self.inner.cond.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

/// Closure run on a fixed-rate timer thread.
///
/// Dropping the task detaches it; only [`RecurringTask::cancel`] (or a
/// tick cancelling its own token) stops it.
#[derive(Debug)]
pub struct RecurringTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RecurringTask {
    /// Run `tick` every `period`, first after `initial_delay`.
    ///
    /// Ticks never overlap. A tick that overruns its slot pushes the next
    /// one back instead of triggering a catch-up burst.
    pub fn spawn_at_fixed_rate<F>(
        name: &str,
        initial_delay: Duration,
        period: Duration,
        mut tick: F,
    ) -> io::Result<Self>
    where
        F: FnMut(&CancellationToken) + Send + 'static,
    {
        let token = CancellationToken::new();
        let thread_token = token.clone();

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            let mut next = Instant::now() + initial_delay;
            loop {
                if thread_token.wait_until(next) {
                    break;
                }

                tick(&thread_token);
                if thread_token.is_cancelled() {
                    break;
                }

                next += period;
                let now = Instant::now();
                if next < now {
                    next = now;
                }
            }
        })?;

        Ok(RecurringTask {
            token,
            handle: Some(handle),
        })
    }

    /// Request that no further ticks run
    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }

    /// Wait for the timer thread to exit.
    ///
    /// Only returns once the task has been cancelled.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            // A panicking tick already reported itself through the panic hook
            let _ = handle.join();
        }
    }
}
