//! Minimal HTTP/2 framing
//!
//! Just enough of RFC 7540 to forge the SETTINGS and GOAWAY frames the
//! fault injector writes. There is no HPACK, no flow control and no stream
//! handling here.
//!
//! # Examples
//!
//! ```
//! use reconnect_harness::h2::FrameCodec;
//!
//! let settings = FrameCodec::encode_settings_frame();
//! assert_eq!(settings.len(), 15);
//!
//! let goaway = FrameCodec::encode_goaway_frame();
//! assert_eq!(&goaway[..4], &[0, 0, 8, 7]);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{FrameCodec, FrameHeader, GOAWAY_FRAME_LEN, SETTINGS_FRAME_LEN};
pub use frames::{ErrorCode, FrameFlags, FrameType, SettingsParameter};

/// HTTP/2 frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// Maximum frame payload size (16MB - 1)
pub const MAX_FRAME_SIZE: usize = 0x00FF_FFFF;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;
