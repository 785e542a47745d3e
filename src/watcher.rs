//! Connectivity watcher
//!
//! Polls a transport channel at a fixed rate after an outage and fires a
//! "became ready" callback once the channel reports READY.
//!
//! ```text
//! activate() ──► on_unready() ──► ARMED ──tick: READY──────────► DONE (on_ready fired)
//!                                   │
//!                                   └──tick: attempts exhausted─► DONE (nothing fired)
//! ```
//!
//! A watcher never re-arms on its own. Supervising several outages means
//! calling [`ConnectivityWatcher::activate`] again for each one.

use crate::channel::TransportChannel;
use crate::config::WatcherConfig;
use crate::error::Result;
use crate::schedule::{CancellationToken, RecurringTask};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback invoked on a connectivity transition
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Coarse watcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Still polling
    Armed,
    /// Polling has stopped for good
    Done,
}

/// How a reconnect session ended, if it has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchOutcome {
    Pending = 0,
    /// READY observed, ready callback fired
    Ready = 1,
    /// Attempt cap reached without seeing READY
    Exhausted = 2,
    /// Stopped by [`WatchHandle::cancel`]
    Cancelled = 3,
}

impl WatchOutcome {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WatchOutcome::Ready,
            2 => WatchOutcome::Exhausted,
            3 => WatchOutcome::Cancelled,
            _ => WatchOutcome::Pending,
        }
    }
}

/// Working state of one `activate()` call
#[derive(Debug)]
struct ReconnectSession {
    attempts: AtomicU32,
    max_attempts: Option<u32>,
    outcome: AtomicU8,
}

impl ReconnectSession {
    fn new(max_attempts: Option<u32>) -> Self {
        ReconnectSession {
            attempts: AtomicU32::new(0),
            max_attempts,
            outcome: AtomicU8::new(WatchOutcome::Pending as u8),
        }
    }

    fn outcome(&self) -> WatchOutcome {
        WatchOutcome::from_u8(self.outcome.load(Ordering::Acquire))
    }

    /// Record the terminal outcome.
    ///
    /// Only the first caller wins; it then owns cancelling the timer and,
    /// for READY, firing the callback.
    fn settle(&self, outcome: WatchOutcome) -> bool {
        self.outcome
            .compare_exchange(
                WatchOutcome::Pending as u8,
                outcome as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// One poll tick
    fn tick(&self, channel: &dyn TransportChannel, token: &CancellationToken, on_ready: &Callback) {
        if token.is_cancelled() || self.outcome() != WatchOutcome::Pending {
            return;
        }

        if let Some(max) = self.max_attempts {
            if self.attempts.load(Ordering::Acquire) >= max {
                warn!(max_attempts = max, "maximum reconnect attempts exceeded");
                if self.settle(WatchOutcome::Exhausted) {
                    token.cancel();
                }
                return;
            }
        }

        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let state = channel.current_state(true);
        debug!(attempt, %state, "polled channel state");

        if state.is_ready() && self.settle(WatchOutcome::Ready) {
            token.cancel();
            info!(attempt, "channel ready");
            on_ready();
        }
    }
}

/// Polls a channel until it becomes ready
pub struct ConnectivityWatcher {
    channel: Arc<dyn TransportChannel>,
    on_ready: Callback,
    on_unready: Callback,
    config: WatcherConfig,
}

impl ConnectivityWatcher {
    /// Create a watcher with the default poll rate and no attempt cap
    pub fn new<R, U>(channel: Arc<dyn TransportChannel>, on_ready: R, on_unready: U) -> Self
    where
        R: Fn() + Send + Sync + 'static,
        U: Fn() + Send + Sync + 'static,
    {
        ConnectivityWatcher {
            channel,
            on_ready: Arc::new(on_ready),
            on_unready: Arc::new(on_unready),
            config: WatcherConfig::default(),
        }
    }

    /// Replace the poll settings
    pub fn with_config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Fire "became unready" and start polling.
    ///
    /// The unready callback runs on the caller's thread before this
    /// returns; the ready callback runs on the watcher's timer thread.
    /// A zero poll rate is rejected before either callback runs.
    pub fn activate(&self) -> Result<WatchHandle> {
        self.config.validate()?;
        (self.on_unready)();

        let session = Arc::new(ReconnectSession::new(self.config.max_attempts));
        let tick_session = session.clone();
        let channel = self.channel.clone();
        let on_ready = self.on_ready.clone();

        let task = RecurringTask::spawn_at_fixed_rate(
            "connectivity-watcher",
            self.config.rate,
            self.config.rate,
            move |token| tick_session.tick(&*channel, token, &on_ready),
        )?;

        info!(
            rate_ms = self.config.rate.as_millis() as u64,
            max_attempts = ?self.config.max_attempts,
            "connectivity watcher armed"
        );

        Ok(WatchHandle { session, task })
    }
}

/// Handle on an armed (or finished) reconnect session
#[derive(Debug)]
pub struct WatchHandle {
    session: Arc<ReconnectSession>,
    task: RecurringTask,
}

impl WatchHandle {
    /// `Done` exactly when [`outcome`](Self::outcome) is no longer pending
    pub fn state(&self) -> WatcherState {
        match self.outcome() {
            WatchOutcome::Pending => WatcherState::Armed,
            _ => WatcherState::Done,
        }
    }

    pub fn outcome(&self) -> WatchOutcome {
        self.session.outcome()
    }

    /// State queries issued so far
    pub fn attempts(&self) -> u32 {
        self.session.attempts.load(Ordering::Acquire)
    }

    /// Stop polling without firing anything.
    ///
    /// Returns `false` if the session had already finished.
    pub fn cancel(&self) -> bool {
        if self.session.settle(WatchOutcome::Cancelled) {
            self.task.cancel();
            info!("connectivity watcher cancelled");
            true
        } else {
            false
        }
    }

    /// Block until polling has stopped and return how it ended.
    ///
    /// With no attempt cap this only returns after READY or `cancel()`.
    pub fn join(self) -> WatchOutcome {
        let session = self.session;
        self.task.join();
        session.outcome()
    }
}
