//! Fault-injecting listener
//!
//! Accepts raw TCP connections and, on each one, writes a single SETTINGS
//! frame followed by a GOAWAY frame every `goaway_interval` until the peer
//! goes away or the server is shut down. Nothing the peer sends is read.
//!
//! Shutdown is cooperative. The accept loop notices it within
//! `accept_poll`; a connection worker notices it only after its current
//! sleep, so the worst-case latency is one GOAWAY interval.
//!
//! # Examples
//!
//! ```no_run
//! use reconnect_harness::server::FaultInjectingServerBuilder;
//! use std::time::Duration;
//!
//! let server = FaultInjectingServerBuilder::new()
//!     .port(9991)
//!     .goaway_interval(Duration::from_secs(60))
//!     .bind()?;
//! server.start()?;
//!
//! // ... point a client at 127.0.0.1:9991 ...
//!
//! server.shutdown();
//! server.join();
//! # Ok::<(), reconnect_harness::Error>(())
//! ```

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::session::{poll_readable, ConnectionHandle};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

struct ServerShared {
    shutdown: AtomicBool,
    goaway_interval: Duration,
    accept_poll: Duration,
    accepted: AtomicU64,
    active: AtomicUsize,
}

impl ServerShared {
    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Builder for [`FaultInjectingServer`]
#[derive(Debug, Clone)]
pub struct FaultInjectingServerBuilder {
    host: IpAddr,
    config: ServerConfig,
}

impl FaultInjectingServerBuilder {
    /// Defaults: all interfaces, port 9991, GOAWAY every 60 seconds
    pub fn new() -> Self {
        Self::from_config(ServerConfig::default())
    }

    pub fn from_config(config: ServerConfig) -> Self {
        FaultInjectingServerBuilder {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            config,
        }
    }

    /// Address to bind
    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Port to bind; 0 picks an ephemeral port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Delay between GOAWAY frames on a connection
    pub fn goaway_interval(mut self, interval: Duration) -> Self {
        self.config.goaway_interval = interval;
        self
    }

    /// Connections the kernel queues before the accept loop picks them up
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.config.backlog = backlog;
        self
    }

    /// How often the accept loop rechecks the shutdown flag
    pub fn accept_poll(mut self, poll: Duration) -> Self {
        self.config.accept_poll = poll;
        self
    }

    /// Bind the listening socket. Nothing is accepted until `start()`.
    ///
    /// Fails with [`Error::Config`] if an interval or the backlog is zero.
    pub fn bind(self) -> Result<FaultInjectingServer> {
        self.config.validate()?;
        let addr = SocketAddr::new(self.host, self.config.port);

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(i32::try_from(self.config.backlog).unwrap_or(i32::MAX))?;

        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, backlog = self.config.backlog, "fault injector bound");

        Ok(FaultInjectingServer {
            local_addr,
            listener: Mutex::new(Some(listener)),
            accept_thread: Mutex::new(None),
            shared: Arc::new(ServerShared {
                shutdown: AtomicBool::new(false),
                goaway_interval: self.config.goaway_interval,
                accept_poll: self.config.accept_poll,
                accepted: AtomicU64::new(0),
                active: AtomicUsize::new(0),
            }),
        })
    }
}

impl Default for FaultInjectingServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener that starves every client with GOAWAY frames
pub struct FaultInjectingServer {
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<ServerShared>,
}

impl FaultInjectingServer {
    /// Bound address (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start the accept loop on its own thread
    pub fn start(&self) -> Result<()> {
        if self.shared.is_shut_down() {
            return Err(Error::ShutDown);
        }

        let listener = self.listener.lock().take().ok_or(Error::AlreadyStarted)?;
        let shared = self.shared.clone();

        let handle = thread::Builder::new()
            .name("goaway-accept".to_string())
            .spawn(move || accept_loop(listener, shared, listener_readable))?;
        *self.accept_thread.lock() = Some(handle);

        Ok(())
    }

    /// Ask every worker to stop.
    ///
    /// Safe to call repeatedly; returns `true` only for the first call.
    /// Sockets are closed by their own workers, never here.
    pub fn shutdown(&self) -> bool {
        let first = !self.shared.shutdown.swap(true, Ordering::AcqRel);
        if first {
            info!(addr = %self.local_addr, "fault injector shutting down");
        } else {
            debug!("fault injector already shutting down");
        }
        first
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }

    /// Wait for the accept loop to exit (after `shutdown()`)
    pub fn join(&self) {
        let handle = self.accept_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("accept loop panicked");
            }
        }
    }

    /// Connections accepted since start
    pub fn accepted_connections(&self) -> u64 {
        self.shared.accepted.load(Ordering::Acquire)
    }

    /// Connection workers still running
    pub fn active_connections(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }
}

impl Drop for FaultInjectingServer {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
    }
}

fn listener_readable(listener: &TcpListener, timeout: Duration) -> io::Result<bool> {
    poll_readable(listener.as_raw_fd(), Some(timeout))
}

/// Accept until shutdown. `ready` waits up to the given timeout for a
/// pending connection; its errors are logged and retried after a pause.
fn accept_loop<F>(listener: TcpListener, shared: Arc<ServerShared>, mut ready: F)
where
    F: FnMut(&TcpListener, Duration) -> io::Result<bool>,
{
    info!("accept loop started");

    while !shared.is_shut_down() {
        match ready(&listener, shared.accept_poll) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                error!(error = %e, "poll on listener failed");
                thread::sleep(ACCEPT_ERROR_BACKOFF);
                continue;
            }
        }

        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    error!(%peer, error = %e, "cannot make connection blocking");
                    continue;
                }
                let id = shared.accepted.fetch_add(1, Ordering::AcqRel) + 1;
                spawn_connection(ConnectionHandle::new(id, stream, peer), shared.clone());
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                error!(error = %e, "accept failed");
                // Out of descriptors and the like: back off instead of spinning
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }

    info!("accept loop stopped");
}

fn spawn_connection(conn: ConnectionHandle, shared: Arc<ServerShared>) {
    let id = conn.id();
    let peer = conn.peer();
    info!(connection = id, %peer, "accepted connection");

    shared.active.fetch_add(1, Ordering::AcqRel);
    let worker_shared = shared.clone();
    let spawned = thread::Builder::new()
        .name(format!("goaway-conn-{}", id))
        .spawn(move || {
            run_connection(conn, &worker_shared);
            worker_shared.active.fetch_sub(1, Ordering::AcqRel);
        });

    if let Err(e) = spawned {
        // The closure, and the socket with it, was dropped
        error!(connection = id, %peer, error = %e, "cannot spawn connection worker");
        shared.active.fetch_sub(1, Ordering::AcqRel);
    }
}

fn run_connection(mut conn: ConnectionHandle, shared: &ServerShared) {
    let id = conn.id();
    let peer = conn.peer();

    if let Err(e) = conn.send_settings() {
        error!(connection = id, %peer, error = %e, "SETTINGS send failed");
    }

    while !shared.is_shut_down() {
        info!(connection = id, %peer, "sending GOAWAY");
        if let Err(e) = conn.send_goaway() {
            error!(connection = id, %peer, error = %e, "GOAWAY send failed");
            break;
        }
        thread::sleep(shared.goaway_interval);
    }

    if let Err(e) = conn.close() {
        info!(connection = id, %peer, error = %e, "socket error on close");
    }
    debug!(connection = id, "connection worker exited");
}
