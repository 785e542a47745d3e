//! Reconnect harness - fault injection for HTTP/2 RPC clients
//!
//! Two halves that are normally run as separate processes:
//!
//! - [`server`]: a listener that forges an HTTP/2 SETTINGS frame and then
//!   keeps sending GOAWAY frames, pushing a real client's transport into
//!   its failure/retry loop.
//! - [`watcher`]: a client-side state machine that polls a transport
//!   channel and re-initializes application state once per outage.
//!
//! [`stress`] queries channel state from many threads at once, and
//! [`client`] ties the watcher and an RPC stub together.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod h2;
pub mod schedule;
pub mod server;
pub mod session;
pub mod stress;
pub mod watcher;

pub use channel::{ConnectivityState, RpcStub, TransportChannel};
pub use config::{ClientOptions, ServerConfig, StressConfig, WatcherConfig};
pub use error::{Error, Result};
pub use server::{FaultInjectingServer, FaultInjectingServerBuilder};
pub use stress::{ConcurrentStatePoller, StressReport};
pub use watcher::{ConnectivityWatcher, WatchHandle, WatchOutcome, WatcherState};
