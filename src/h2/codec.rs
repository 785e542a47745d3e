//! Forged HTTP/2 frame encoding
//!
//! The fault injector does not speak HTTP/2. It writes two fixed control
//! frames, byte for byte, and never looks at what the peer sends. The
//! decoding helpers below read the injector's own output back, for
//! clients and tests that check what went on the wire.

use super::frames::{ErrorCode, FrameFlags, FrameType, SettingsParameter};
use super::{CONNECTION_STREAM_ID, FRAME_HEADER_SIZE, MAX_FRAME_SIZE, MAX_STREAM_ID};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Read, Write};

/// Total size of the forged SETTINGS frame on the wire
pub const SETTINGS_FRAME_LEN: usize = FRAME_HEADER_SIZE + 6;

/// Total size of the forged GOAWAY frame on the wire
pub const GOAWAY_FRAME_LEN: usize = FRAME_HEADER_SIZE + GOAWAY_DECLARED_LEN;

/// Length written into the GOAWAY header.
///
/// Clients reject a GOAWAY declaring fewer than 8 payload octets, so the
/// frame carries exactly last-stream-id and error code, nothing else.
pub const GOAWAY_DECLARED_LEN: usize = 8;

/// Value advertised for SETTINGS_MAX_CONCURRENT_STREAMS
pub const ADVERTISED_MAX_CONCURRENT_STREAMS: u32 = 0x7FFF_FFFF;

/// Decoded 9-byte frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Declared payload length (24 bits)
    pub length: usize,
    /// Raw frame type octet
    pub frame_type: u8,
    /// Frame flags
    pub flags: FrameFlags,
    /// Stream identifier with the reserved bit masked off
    pub stream_id: u32,
}

impl FrameHeader {
    /// Frame type, if it is one this crate knows
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }
}

/// Stateless encoder for the injector's frames
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame header
    pub fn encode_header(
        frame_type: FrameType,
        flags: FrameFlags,
        stream_id: u32,
        length: usize,
    ) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        header[0] = ((length >> 16) & 0xFF) as u8;
        header[1] = ((length >> 8) & 0xFF) as u8;
        header[2] = (length & 0xFF) as u8;

        header[3] = frame_type.as_u8();
        header[4] = flags.as_u8();

        // Reserved bit is always sent as 0
        header[5..9].copy_from_slice(&(stream_id & MAX_STREAM_ID).to_be_bytes());

        header
    }

    /// Decode a frame header
    pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> FrameHeader {
        let length =
            ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);
        let stream_id = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) & MAX_STREAM_ID;

        FrameHeader {
            length,
            frame_type: bytes[3],
            flags: FrameFlags::from_u8(bytes[4]),
            stream_id,
        }
    }

    /// Encode the SETTINGS frame sent once per connection.
    ///
    /// `[0,0,6, 4, 0, 0,0,0,0, 0,3, 0x7f,0xff,0xff,0xff]`
    pub fn encode_settings_frame() -> Bytes {
        let mut buf = BytesMut::with_capacity(SETTINGS_FRAME_LEN);

        let header = Self::encode_header(
            FrameType::Settings,
            FrameFlags::empty(),
            CONNECTION_STREAM_ID,
            SETTINGS_FRAME_LEN - FRAME_HEADER_SIZE,
        );
        buf.put_slice(&header);

        buf.put_u16(SettingsParameter::MaxConcurrentStreams.as_u16());
        buf.put_u32(ADVERTISED_MAX_CONCURRENT_STREAMS);

        buf.freeze()
    }

    /// Encode the GOAWAY frame resent on every injector tick.
    ///
    /// Header declares 8 octets, followed by last-stream-id 0 and
    /// `NO_ERROR`. These are literal bytes clients are known to accept, not
    /// a general GOAWAY encoder.
    pub fn encode_goaway_frame() -> Bytes {
        let mut buf = BytesMut::with_capacity(GOAWAY_FRAME_LEN);

        let header = Self::encode_header(
            FrameType::Goaway,
            FrameFlags::empty(),
            CONNECTION_STREAM_ID,
            GOAWAY_DECLARED_LEN,
        );
        buf.put_slice(&header);

        // Last stream ID
        buf.put_u32(0);
        buf.put_u32(ErrorCode::NoError.as_u32());

        buf.freeze()
    }

    /// Write a frame and flush it
    pub fn write_frame<W: Write>(writer: &mut W, frame_data: &[u8]) -> io::Result<()> {
        writer.write_all(frame_data)?;
        writer.flush()?;
        Ok(())
    }

    /// Read one frame (header plus declared payload)
    pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<(FrameHeader, Bytes)> {
        let mut raw = [0u8; FRAME_HEADER_SIZE];
        reader.read_exact(&mut raw)?;

        let header = Self::decode_header(&raw);
        if header.length > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Frame payload too large: {}", header.length),
            ));
        }

        let mut payload = vec![0u8; header.length];
        if header.length > 0 {
            reader.read_exact(&mut payload)?;
        }

        Ok((header, Bytes::from(payload)))
    }
}
