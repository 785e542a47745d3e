//! HTTP/2 frame vocabulary
//!
//! Only the identifiers the fault injector needs to forge its two control
//! frames are modelled here (RFC 7540 Sections 6.5, 6.8 and 7).

/// HTTP/2 frame types emitted by the fault injector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// SETTINGS frame (0x4) - Conveys configuration parameters
    Settings = 0x4,
    /// GOAWAY frame (0x7) - Initiates shutdown of connection
    Goaway = 0x7,
}

impl FrameType {
    /// Convert frame type to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create frame type from u8
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x4 => Some(FrameType::Settings),
            0x7 => Some(FrameType::Goaway),
            _ => None,
        }
    }
}

/// HTTP/2 frame flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Create empty flags
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Create from u8
    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    /// Get raw u8 value
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

/// SETTINGS identifiers (RFC 7540 Section 6.5.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SettingsParameter {
    /// SETTINGS_MAX_CONCURRENT_STREAMS (0x3)
    MaxConcurrentStreams = 0x3,
}

impl SettingsParameter {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// GOAWAY error codes (RFC 7540 Section 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}
