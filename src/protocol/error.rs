//! Protocol error types

use std::fmt;

use super::ConnectReturnCode;

/// Errors that can occur during packet decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough data in buffer
    InsufficientData,
    /// Invalid packet type
    InvalidPacketType(u8),
    /// Invalid remaining length encoding
    InvalidRemainingLength,
    /// Invalid protocol name
    InvalidProtocolName,
    /// Invalid protocol version
    InvalidProtocolVersion(u8),
    /// Invalid QoS value
    InvalidQoS(u8),
    /// Invalid UTF-8 string
    InvalidUtf8,
    /// Invalid packet flags
    InvalidFlags,
    /// Invalid CONNACK return code
    InvalidReturnCode(u8),
    /// Invalid SUBACK return code
    InvalidSubscribeReturnCode(u8),
    /// Malformed packet
    MalformedPacket(&'static str),
    /// Packet too large
    PacketTooLarge,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "insufficient data in buffer"),
            Self::InvalidPacketType(t) => write!(f, "invalid packet type: {}", t),
            Self::InvalidRemainingLength => write!(f, "invalid remaining length encoding"),
            Self::InvalidProtocolName => write!(f, "invalid protocol name"),
            Self::InvalidProtocolVersion(v) => write!(f, "invalid protocol version: {}", v),
            Self::InvalidQoS(q) => write!(f, "invalid QoS value: {}", q),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 string"),
            Self::InvalidFlags => write!(f, "invalid packet flags"),
            Self::InvalidReturnCode(c) => write!(f, "invalid connect return code: {}", c),
            Self::InvalidSubscribeReturnCode(c) => {
                write!(f, "invalid subscribe return code: {}", c)
            }
            Self::MalformedPacket(msg) => write!(f, "malformed packet: {}", msg),
            Self::PacketTooLarge => write!(f, "packet too large"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors that can occur during packet encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Packet body exceeds the maximum remaining length
    PacketTooLarge,
    /// String too long for its u16 length prefix
    StringTooLong,
    /// v3.1.1 forbids a password without a username
    PasswordWithoutUsername,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooLarge => write!(f, "packet too large"),
            Self::StringTooLong => write!(f, "string too long"),
            Self::PasswordWithoutUsername => {
                write!(f, "password cannot be set without a username")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// High-level protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Decode error
    Decode(DecodeError),
    /// Encode error
    Encode(EncodeError),
    /// Server refused the connection
    ConnectionRefused(ConnectReturnCode),
    /// A packet arrived where another was required
    UnexpectedPacket(&'static str),
    /// Protocol violation
    ProtocolViolation(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode error: {}", e),
            Self::Encode(e) => write!(f, "encode error: {}", e),
            Self::ConnectionRefused(code) => write!(f, "connection refused: {}", code),
            Self::UnexpectedPacket(msg) => write!(f, "unexpected packet: {}", msg),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<DecodeError> for ProtocolError {
    fn from(e: DecodeError) -> Self {
        ProtocolError::Decode(e)
    }
}

impl From<EncodeError> for ProtocolError {
    fn from(e: EncodeError) -> Self {
        ProtocolError::Encode(e)
    }
}
