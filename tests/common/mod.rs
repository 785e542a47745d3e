//! Shared fakes for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use reconnect_harness::channel::{RequestSink, ResponseObserver, RpcStub};
use reconnect_harness::{ConnectivityState, TransportChannel};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Channel that replays a script, repeating the last state forever
pub struct ScriptedChannel {
    script: Vec<ConnectivityState>,
    calls: AtomicUsize,
}

impl ScriptedChannel {
    pub fn new(script: &[ConnectivityState]) -> Arc<Self> {
        assert!(!script.is_empty());
        Arc::new(ScriptedChannel {
            script: script.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn always(state: ConnectivityState) -> Arc<Self> {
        Self::new(&[state])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TransportChannel for ScriptedChannel {
    fn current_state(&self, _request_connection: bool) -> ConnectivityState {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.script[n.min(self.script.len() - 1)]
    }
}

/// Channel whose state query takes a while, recording when each call began
pub struct SlowChannel {
    delay: Duration,
    starts: Mutex<Vec<Instant>>,
}

impl SlowChannel {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(SlowChannel {
            delay,
            starts: Mutex::new(Vec::new()),
        })
    }

    pub fn starts(&self) -> Vec<Instant> {
        self.starts.lock().clone()
    }
}

impl TransportChannel for SlowChannel {
    fn current_state(&self, _request_connection: bool) -> ConnectivityState {
        self.starts.lock().push(Instant::now());
        thread::sleep(self.delay);
        ConnectivityState::Connecting
    }
}

/// Stub that records every call
#[derive(Default)]
pub struct RecordingStub {
    pub requests: Mutex<Vec<String>>,
    pub streams_opened: AtomicUsize,
    pub stream_messages: Arc<Mutex<Vec<String>>>,
    pub streams_completed: Arc<AtomicUsize>,
}

impl RecordingStub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn stream_messages(&self) -> Vec<String> {
        self.stream_messages.lock().clone()
    }
}

struct RecordingSink {
    messages: Arc<Mutex<Vec<String>>>,
    completed: Arc<AtomicUsize>,
}

impl RequestSink for RecordingSink {
    fn send(&mut self, query: &str) {
        self.messages.lock().push(query.to_string());
    }

    fn complete(&mut self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

impl RpcStub for RecordingStub {
    fn request(&self, query: &str, observer: Arc<dyn ResponseObserver>) {
        self.requests.lock().push(query.to_string());
        observer.on_next(&format!("response to {}", query));
        observer.on_completed();
    }

    fn open_stream(&self, _observer: Arc<dyn ResponseObserver>) -> Box<dyn RequestSink> {
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        Box::new(RecordingSink {
            messages: self.stream_messages.clone(),
            completed: self.streams_completed.clone(),
        })
    }
}

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_for<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
