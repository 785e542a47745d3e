//! Concurrent state poller (stress mode)
//!
//! Hammers `TransportChannel::current_state` from many threads at once to
//! check that the transport's state query tolerates concurrent callers.
//! Overlapping queries are reported, never treated as failures.

use crate::channel::TransportChannel;
use crate::config::StressConfig;
use crate::error::Result;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

struct StressShared {
    channel: Arc<dyn TransportChannel>,
    config: StressConfig,
    barrier: Barrier,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    overlaps: AtomicU64,
}

impl StressShared {
    fn query(&self, worker: usize) -> bool {
        let count = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(count, Ordering::AcqRel);

        let overlapped = count > 1;
        if overlapped {
            self.overlaps.fetch_add(1, Ordering::Relaxed);
            info!(worker, concurrent = count, "concurrent state query");
        }

        self.channel.current_state(true);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        overlapped
    }

    fn run_worker(&self, worker: usize) -> WorkerReport {
        info!(worker, "stress worker waiting at start barrier");
        self.barrier.wait();
        let started_at = Instant::now();
        info!(worker, "stress worker released");

        let mut overlaps = 0;
        for iteration in 0..self.config.iterations {
            if iteration > 0 {
                thread::sleep(self.config.interval);
            }
            if self.query(worker) {
                overlaps += 1;
            }
        }

        info!(worker, "stress worker finished");
        WorkerReport {
            worker,
            started_at,
            queries: self.config.iterations,
            overlaps,
        }
    }
}

/// What one worker did
#[derive(Debug, Clone, Copy)]
pub struct WorkerReport {
    pub worker: usize,
    /// When the worker left the start barrier
    pub started_at: Instant,
    pub queries: u32,
    /// Queries that found another query already in flight
    pub overlaps: u32,
}

/// Summary of a finished stress run
#[derive(Debug, Clone)]
pub struct StressReport {
    pub workers: Vec<WorkerReport>,
    /// Highest in-flight count any query observed
    pub max_in_flight: usize,
    pub overlaps: u64,
}

impl StressReport {
    /// Distance between the first and last worker leaving the barrier
    pub fn start_spread(&self) -> Duration {
        let first = self.workers.iter().map(|w| w.started_at).min();
        let last = self.workers.iter().map(|w| w.started_at).max();
        match (first, last) {
            (Some(first), Some(last)) => last.duration_since(first),
            _ => Duration::ZERO,
        }
    }

    pub fn total_queries(&self) -> u64 {
        self.workers.iter().map(|w| w.queries as u64).sum()
    }
}

/// Launches synchronized state-query workers
pub struct ConcurrentStatePoller {
    channel: Arc<dyn TransportChannel>,
    config: StressConfig,
}

impl ConcurrentStatePoller {
    pub fn new(channel: Arc<dyn TransportChannel>, config: StressConfig) -> Self {
        ConcurrentStatePoller { channel, config }
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Start every worker; none begins polling until all have reached the barrier.
    ///
    /// If a worker thread cannot be spawned the ones already started stay
    /// parked at the barrier, so callers should treat the error as fatal.
    pub fn spawn(&self) -> Result<StressRun> {
        let shared = Arc::new(StressShared {
            channel: self.channel.clone(),
            config: self.config,
            barrier: Barrier::new(self.config.workers),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            overlaps: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(self.config.workers);
        for worker in 0..self.config.workers {
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("state-poller-{}", worker))
                .spawn(move || shared.run_worker(worker))?;
            workers.push(handle);
        }

        info!(workers = self.config.workers, iterations = self.config.iterations, "stress run started");
        Ok(StressRun { shared, workers })
    }

    /// Spawn and wait for completion
    pub fn run(&self) -> Result<StressReport> {
        Ok(self.spawn()?.join())
    }
}

/// A stress run in progress
pub struct StressRun {
    shared: Arc<StressShared>,
    workers: Vec<JoinHandle<WorkerReport>>,
}

impl StressRun {
    /// Wait for every worker and summarize
    pub fn join(self) -> StressReport {
        let mut reports = Vec::with_capacity(self.workers.len());
        for handle in self.workers {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(_) => warn!("stress worker panicked"),
            }
        }

        StressReport {
            workers: reports,
            max_in_flight: self.shared.max_in_flight.load(Ordering::Acquire),
            overlaps: self.shared.overlaps.load(Ordering::Acquire),
        }
    }
}
