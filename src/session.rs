//! Per-connection handle and socket readiness polling
//!
//! A `ConnectionHandle` owns one accepted socket for the lifetime of its
//! worker. Closing consumes the handle, so a socket can only be closed once.

use crate::h2::FrameCodec;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::RawFd;
use std::time::Duration;

/// Wait until `fd` has something to read (or accept).
///
/// Returns `Ok(false)` on timeout. `None` waits forever.
pub fn poll_readable(fd: RawFd, timeout: Option<Duration>) -> io::Result<bool> {
    use libc::{poll, pollfd, POLLIN};

    let mut pfd = pollfd {
        fd,
        events: POLLIN,
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

    if result < 0 {
        let err = io::Error::last_os_error();
        // A signal landing mid-poll is just an early wakeup
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }

    Ok(result > 0)
}

/// One accepted connection on the fault injector
#[derive(Debug)]
pub struct ConnectionHandle {
    id: u64,
    peer: SocketAddr,
    stream: TcpStream,
}

impl ConnectionHandle {
    /// Wrap an accepted stream
    pub fn new(id: u64, stream: TcpStream, peer: SocketAddr) -> Self {
        ConnectionHandle { id, peer, stream }
    }

    /// Sequence number assigned by the accept loop
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send the SETTINGS frame
    pub fn send_settings(&mut self) -> io::Result<()> {
        FrameCodec::write_frame(&mut self.stream, &FrameCodec::encode_settings_frame())
    }

    /// Send one GOAWAY frame
    pub fn send_goaway(&mut self) -> io::Result<()> {
        FrameCodec::write_frame(&mut self.stream, &FrameCodec::encode_goaway_frame())
    }

    /// Shut the socket down in both directions.
    ///
    /// The descriptor itself is released when the handle drops at the end
    /// of this call.
    pub fn close(self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}
