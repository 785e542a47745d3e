//! Seams to the RPC transport
//!
//! The harness never owns a real RPC stack. It sees the transport through
//! [`TransportChannel`] (one state query) and the generated service
//! through [`RpcStub`] (one unary call, one bidirectional stream).

use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Connectivity state reported by a transport channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

impl ConnectivityState {
    /// Get state name
    pub fn name(&self) -> &'static str {
        match self {
            ConnectivityState::Idle => "IDLE",
            ConnectivityState::Connecting => "CONNECTING",
            ConnectivityState::Ready => "READY",
            ConnectivityState::TransientFailure => "TRANSIENT_FAILURE",
            ConnectivityState::Shutdown => "SHUTDOWN",
        }
    }

    pub fn is_ready(&self) -> bool {
        *self == ConnectivityState::Ready
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A transport channel whose connectivity can be queried.
///
/// Implementations must tolerate concurrent callers; the harness queries
/// from the watcher thread and from every stress worker without any lock
/// of its own.
pub trait TransportChannel: Send + Sync {
    /// Current state.
    ///
    /// With `request_connection` set, an idle channel is asked to start
    /// connecting, so this is a command and not a pure read.
    fn current_state(&self, request_connection: bool) -> ConnectivityState;
}

impl<T: TransportChannel + ?Sized> TransportChannel for Arc<T> {
    fn current_state(&self, request_connection: bool) -> ConnectivityState {
        (**self).current_state(request_connection)
    }
}

/// Receives responses for one call or stream
pub trait ResponseObserver: Send + Sync {
    fn on_next(&self, value: &str);
    fn on_error(&self, error: &str);
    fn on_completed(&self);
}

/// Client half of a bidirectional stream
pub trait RequestSink: Send {
    fn send(&mut self, query: &str);
    fn complete(&mut self);
}

/// Generated service stub, treated as opaque
pub trait RpcStub: Send + Sync {
    /// Unary request; responses go to `observer`
    fn request(&self, query: &str, observer: Arc<dyn ResponseObserver>);

    /// Open the client-to-server message stream
    fn open_stream(&self, observer: Arc<dyn ResponseObserver>) -> Box<dyn RequestSink>;
}

/// Observer that only logs what it sees
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    label: String,
}

impl LoggingObserver {
    pub fn new(label: impl Into<String>) -> Self {
        LoggingObserver { label: label.into() }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl ResponseObserver for LoggingObserver {
    fn on_next(&self, value: &str) {
        info!(stream = %self.label, value, "stream next value");
    }

    fn on_error(&self, err: &str) {
        error!(stream = %self.label, error = err, "stream error");
    }

    fn on_completed(&self) {
        info!(stream = %self.label, "stream completed");
    }
}
