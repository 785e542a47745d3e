//! Fault injector integration tests
//!
//! Real loopback sockets against a server on an ephemeral port.

mod common;

use common::wait_for;
use reconnect_harness::h2::{FrameCodec, FrameType, GOAWAY_FRAME_LEN, SETTINGS_FRAME_LEN};
use reconnect_harness::{FaultInjectingServer, FaultInjectingServerBuilder};
use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, TcpStream};
use std::time::{Duration, Instant};

const SETTINGS_FIXTURE: [u8; 15] = [0, 0, 6, 4, 0, 0, 0, 0, 0, 0, 3, 0x7f, 0xff, 0xff, 0xff];
const GOAWAY_FIXTURE: [u8; 17] = [0, 0, 8, 7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

fn start_server(interval: Duration) -> FaultInjectingServer {
    let server = FaultInjectingServerBuilder::new()
        .host(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .port(0)
        .goaway_interval(interval)
        .accept_poll(Duration::from_millis(10))
        .bind()
        .unwrap();
    server.start().unwrap();
    server
}

fn connect(server: &FaultInjectingServer) -> TcpStream {
    let stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream
}

#[test]
fn test_settings_then_goaways() {
    let server = start_server(Duration::from_millis(50));
    let start = Instant::now();
    let mut stream = connect(&server);

    let mut settings = [0u8; SETTINGS_FRAME_LEN];
    stream.read_exact(&mut settings).unwrap();
    assert_eq!(settings, SETTINGS_FIXTURE);

    for _ in 0..2 {
        let mut goaway = [0u8; GOAWAY_FRAME_LEN];
        stream.read_exact(&mut goaway).unwrap();
        assert_eq!(goaway, GOAWAY_FIXTURE);
    }
    assert!(start.elapsed() < Duration::from_millis(150));

    server.shutdown();
    server.join();
}

#[test]
fn test_frames_parse_as_http2() {
    let server = start_server(Duration::from_millis(20));
    let mut stream = connect(&server);

    let (header, _) = FrameCodec::read_frame(&mut stream).unwrap();
    assert_eq!(header.kind(), Some(FrameType::Settings));
    assert_eq!(header.stream_id, 0);

    for _ in 0..3 {
        let (header, payload) = FrameCodec::read_frame(&mut stream).unwrap();
        assert_eq!(header.kind(), Some(FrameType::Goaway));
        assert_eq!(header.length, 8);
        assert_eq!(&payload[..], &[0u8; 8]);
    }

    server.shutdown();
}

#[test]
fn test_peer_bytes_are_ignored() {
    let server = start_server(Duration::from_millis(20));
    let mut stream = connect(&server);

    stream.write_all(b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n").unwrap();
    stream.write_all(&[0xde, 0xad, 0xbe, 0xef]).unwrap();

    let mut frames = [0u8; SETTINGS_FRAME_LEN + 2 * GOAWAY_FRAME_LEN];
    stream.read_exact(&mut frames).unwrap();
    assert_eq!(&frames[..SETTINGS_FRAME_LEN], &SETTINGS_FIXTURE);
    assert_eq!(&frames[SETTINGS_FRAME_LEN..SETTINGS_FRAME_LEN + GOAWAY_FRAME_LEN], &GOAWAY_FIXTURE);

    server.shutdown();
}

#[test]
fn test_each_connection_gets_its_own_cadence() {
    let server = start_server(Duration::from_millis(30));
    let mut streams: Vec<TcpStream> = (0..3).map(|_| connect(&server)).collect();

    for stream in streams.iter_mut() {
        let mut settings = [0u8; SETTINGS_FRAME_LEN];
        stream.read_exact(&mut settings).unwrap();
        assert_eq!(settings, SETTINGS_FIXTURE);

        let mut goaway = [0u8; GOAWAY_FRAME_LEN];
        stream.read_exact(&mut goaway).unwrap();
        assert_eq!(goaway, GOAWAY_FIXTURE);
    }

    assert!(wait_for(Duration::from_secs(1), || server.accepted_connections() == 3));
    assert_eq!(server.active_connections(), 3);

    server.shutdown();
}

#[test]
fn test_peer_disconnect_ends_only_that_worker() {
    let server = start_server(Duration::from_millis(10));

    let mut keeper = connect(&server);
    let mut settings = [0u8; SETTINGS_FRAME_LEN];
    keeper.read_exact(&mut settings).unwrap();

    let mut leaver = connect(&server);
    leaver.read_exact(&mut settings).unwrap();
    assert!(wait_for(Duration::from_secs(1), || server.active_connections() == 2));
    drop(leaver);

    assert!(wait_for(Duration::from_secs(2), || server.active_connections() == 1));

    // Survivor keeps receiving GOAWAY frames and the accept loop still works
    let mut goaway = [0u8; GOAWAY_FRAME_LEN];
    keeper.read_exact(&mut goaway).unwrap();
    assert_eq!(goaway, GOAWAY_FIXTURE);

    let mut late = connect(&server);
    late.read_exact(&mut settings).unwrap();
    assert_eq!(settings, SETTINGS_FIXTURE);

    server.shutdown();
}

#[test]
fn test_shutdown_closes_connections_once() {
    let server = start_server(Duration::from_millis(50));
    let mut stream = connect(&server);

    let mut settings = [0u8; SETTINGS_FRAME_LEN];
    stream.read_exact(&mut settings).unwrap();

    assert!(server.shutdown());
    assert!(!server.shutdown());
    server.join();

    // Worker notices within one interval, then closes its socket
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert_eq!(rest.len() % GOAWAY_FRAME_LEN, 0);
    assert!(rest.chunks(GOAWAY_FRAME_LEN).all(|frame| frame == GOAWAY_FIXTURE));

    assert!(wait_for(Duration::from_secs(1), || server.active_connections() == 0));
    assert!(!server.shutdown());
}

#[test]
fn test_no_accepts_after_shutdown() {
    let server = start_server(Duration::from_millis(50));
    let addr = server.local_addr();

    server.shutdown();
    server.join();
    drop(server);

    // Listener is gone with the accept thread; connecting either fails or
    // yields a socket that never receives a frame
    if let Ok(mut stream) = TcpStream::connect(addr) {
        stream.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let mut buf = [0u8; 1];
        assert!(!matches!(stream.read(&mut buf), Ok(1)));
    }
}
