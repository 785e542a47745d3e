//! Concurrent state poller integration tests

mod common;

use common::{ScriptedChannel, SlowChannel};
use reconnect_harness::{ConcurrentStatePoller, ConnectivityState, StressConfig};
use std::time::Duration;

#[test]
fn test_ten_workers_start_together() {
    let channel = SlowChannel::new(Duration::from_millis(20));
    let config = StressConfig {
        workers: 10,
        iterations: 2,
        interval: Duration::from_millis(10),
    };

    let report = ConcurrentStatePoller::new(channel.clone(), config).run().unwrap();

    assert_eq!(report.workers.len(), 10);
    assert_eq!(report.total_queries(), 20);
    assert_eq!(channel.starts().len(), 20);

    // Everyone left the barrier at (nearly) the same moment
    assert!(report.start_spread() < Duration::from_millis(50), "spread {:?}", report.start_spread());

    // No query started before the last worker was released
    let last_release = report.workers.iter().map(|w| w.started_at).max().unwrap();
    let first_query = channel.starts().into_iter().min().unwrap();
    assert!(first_query + Duration::from_millis(50) >= last_release);
}

#[test]
fn test_overlap_is_reported_not_fatal() {
    let channel = SlowChannel::new(Duration::from_millis(30));
    let config = StressConfig {
        workers: 10,
        iterations: 1,
        interval: Duration::from_millis(1),
    };

    let report = ConcurrentStatePoller::new(channel, config).run().unwrap();

    assert!(report.max_in_flight > 1);
    assert!(report.overlaps >= 1);
    let per_worker: u64 = report.workers.iter().map(|w| w.overlaps as u64).sum();
    assert_eq!(per_worker, report.overlaps);
}

#[test]
fn test_spawn_then_join() {
    let channel = ScriptedChannel::always(ConnectivityState::Idle);
    let config = StressConfig {
        workers: 4,
        iterations: 3,
        interval: Duration::from_millis(5),
    };

    let run = ConcurrentStatePoller::new(channel.clone(), config).spawn().unwrap();
    let report = run.join();

    assert_eq!(report.workers.len(), 4);
    assert_eq!(channel.calls(), 12);
    let mut ids: Vec<usize> = report.workers.iter().map(|w| w.worker).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3]);
}
