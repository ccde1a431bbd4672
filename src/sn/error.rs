//! MQTT-SN codec error types

use std::fmt;

/// Errors that can occur while decoding an MQTT-SN frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer ended before the length header was complete
    InsufficientData,
    /// The length header does not match the buffer length
    LengthMismatch,
    /// Unknown message type code
    InvalidMessageType(u8),
    /// CONNECT carried a protocol id other than 0x01
    UnsupportedProtocolId(u8),
    /// Invalid UTF-8 in a string field
    InvalidUtf8,
    /// Body too short or otherwise inconsistent for its type
    MalformedPacket(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "insufficient data in buffer"),
            Self::LengthMismatch => {
                write!(f, "Length of packet is not the same as the length header")
            }
            Self::InvalidMessageType(t) => write!(f, "invalid message type: {:#04x}", t),
            Self::UnsupportedProtocolId(id) => {
                write!(f, "Unsupported protocol ID number: {}", id)
            }
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 string"),
            Self::MalformedPacket(msg) => write!(f, "malformed packet: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors that can occur while encoding an MQTT-SN frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Body exceeds the 65,531 byte maximum
    PacketTooLarge,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooLarge => write!(f, "packet too large"),
        }
    }
}

impl std::error::Error for EncodeError {}
