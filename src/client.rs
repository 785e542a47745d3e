//! Client-side harness runner
//!
//! Wires a [`ConnectivityWatcher`] to an RPC stub: every time the watcher
//! sees the channel come back it reopens the message stream and sends an
//! on-connect request. On top of that it drives either plain request
//! iterations or the concurrent state poller.

use crate::channel::{LoggingObserver, RequestSink, ResponseObserver, RpcStub, TransportChannel};
use crate::config::{ClientOptions, TestOperation};
use crate::error::Result;
use crate::stress::{ConcurrentStatePoller, StressReport};
use crate::watcher::{ConnectivityWatcher, WatchHandle};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Threads used for asynchronous request submission
pub const DEFAULT_POOL_SIZE: usize = 3;

/// Query sent on a freshly opened message stream
pub const STREAM_SETUP_QUERY: &str = "SETUP-STREAM-QUERY";

/// Unary request issued after every reconnect
pub const ON_CONNECT_QUERY: &str = "ON-CONNECT-REQUEST";

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of job threads fed by a channel
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);

        for n in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("client-pool-{}", n))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })?;
            workers.push(handle);
        }

        Ok(WorkerPool {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue a job; dropped with a warning if the pool is closing
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let sent = self.sender.as_ref().map(|sender| sender.send(Box::new(job)));
        if !matches!(sent, Some(Ok(()))) {
            warn!("worker pool closed, job dropped");
        }
    }

    /// Finish queued jobs and stop the threads
    pub fn shutdown(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("client pool worker panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Re-arms application traffic whenever the channel becomes ready
struct ConnectHandler {
    stub: Arc<dyn RpcStub>,
    observer: Arc<dyn ResponseObserver>,
    stream: Mutex<Option<Box<dyn RequestSink>>>,
}

impl ConnectHandler {
    fn on_connect(&self) {
        warn!("connection started");

        let mut sink = self
            .stub
            .open_stream(Arc::new(LoggingObserver::new("stream-response")));
        sink.send(STREAM_SETUP_QUERY);
        info!("initialized RPC stream");
        *self.stream.lock() = Some(sink);

        self.stub.request(ON_CONNECT_QUERY, self.observer.clone());
    }

    fn on_disconnect(&self) {
        warn!("connection dropped");
    }
}

/// Drives one RPC client against a transport channel
pub struct ClientHarness {
    channel: Arc<dyn TransportChannel>,
    stub: Arc<dyn RpcStub>,
    observer: Arc<dyn ResponseObserver>,
    handler: Arc<ConnectHandler>,
    pool: WorkerPool,
}

impl ClientHarness {
    pub fn new(channel: Arc<dyn TransportChannel>, stub: Arc<dyn RpcStub>) -> Result<Self> {
        let observer: Arc<dyn ResponseObserver> = Arc::new(LoggingObserver::new("test-response"));
        let handler = Arc::new(ConnectHandler {
            stub: stub.clone(),
            observer: observer.clone(),
            stream: Mutex::new(None),
        });

        Ok(ClientHarness {
            channel,
            stub,
            observer,
            handler,
            pool: WorkerPool::new(DEFAULT_POOL_SIZE)?,
        })
    }

    /// Activate the connectivity watcher
    pub fn start(&self, options: &ClientOptions) -> Result<WatchHandle> {
        let on_ready = self.handler.clone();
        let on_unready = self.handler.clone();

        ConnectivityWatcher::new(
            self.channel.clone(),
            move || on_ready.on_connect(),
            move || on_unready.on_disconnect(),
        )
        .with_config(options.watcher)
        .activate()
    }

    /// Whether a message stream has been opened since the last reconnect
    pub fn has_stream(&self) -> bool {
        self.handler.stream.lock().is_some()
    }

    /// Issue `num_iterations` requests, inline or through the pool
    pub fn run_normal(&self, options: &ClientOptions) {
        for iteration in 1..=options.num_iterations {
            info!(iteration, "iteration");

            if options.execute_async {
                let stub = self.stub.clone();
                let observer = self.observer.clone();
                self.pool.submit(move || execute_request(&*stub, observer, iteration));
            } else {
                execute_request(&*self.stub, self.observer.clone(), iteration);
            }

            if !options.iteration_delay.is_zero() {
                thread::sleep(options.iteration_delay);
            }
        }
    }

    /// Run the concurrent state poller to completion
    pub fn run_stress(&self, options: &ClientOptions) -> Result<StressReport> {
        let report = ConcurrentStatePoller::new(self.channel.clone(), options.stress_config()).run()?;
        info!(
            workers = report.workers.len(),
            max_in_flight = report.max_in_flight,
            overlaps = report.overlaps,
            "stress run complete"
        );
        Ok(report)
    }

    /// Dispatch on the configured operation
    pub fn run(&self, options: &ClientOptions) -> Result<Option<StressReport>> {
        info!(operation = %options.operation, "client run");
        match options.operation {
            TestOperation::NormalClientExecution => {
                self.run_normal(options);
                Ok(None)
            }
            TestOperation::SpamChannelGetState => self.run_stress(options).map(Some),
        }
    }

    /// Wait for queued asynchronous requests and close the stream
    pub fn shutdown(&mut self) {
        self.pool.shutdown();
        if let Some(mut sink) = self.handler.stream.lock().take() {
            sink.complete();
        }
    }
}

fn execute_request(stub: &dyn RpcStub, observer: Arc<dyn ResponseObserver>, iteration: u32) {
    info!(iteration, "client execution starting");
    stub.request(&format!("test-query #{}", iteration), observer);
    info!(iteration, "client execution completed");
}
