//! Client error types

use std::fmt;

use crate::config::ConfigError;
use crate::protocol::{DecodeError, EncodeError, ProtocolError};

use super::tls::TlsError;

/// Errors surfaced by the client session engine
#[derive(Debug)]
pub enum ClientError {
    /// Wire-level protocol error
    Protocol(ProtocolError),
    /// Configuration error
    Config(ConfigError),
    /// Socket error
    Io(std::io::Error),
    /// TLS setup or handshake error
    Tls(TlsError),
    /// No PINGRESP within keep-alive plus ack timeout
    KeepAliveTimeout,
    /// Operation requires a live session
    NotConnected,
    /// Session terminated while an operation was waiting
    ConnectionClosed,
    /// Retransmission limit reached without an acknowledgement
    ResendLimitExceeded,
    /// Invalid topic or topic list argument
    InvalidTopic(&'static str),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Protocol(e) => write!(f, "protocol error: {}", e),
            ClientError::Config(e) => write!(f, "configuration error: {}", e),
            ClientError::Io(e) => write!(f, "IO error: {}", e),
            ClientError::Tls(e) => write!(f, "TLS error: {}", e),
            ClientError::KeepAliveTimeout => write!(f, "no ping response received"),
            ClientError::NotConnected => write!(f, "not connected to the broker"),
            ClientError::ConnectionClosed => write!(f, "connection to the broker was closed"),
            ClientError::ResendLimitExceeded => {
                write!(f, "no acknowledgement within the resend limit")
            }
            ClientError::InvalidTopic(msg) => write!(f, "invalid topic: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        ClientError::Protocol(e)
    }
}

impl From<DecodeError> for ClientError {
    fn from(e: DecodeError) -> Self {
        ClientError::Protocol(ProtocolError::Decode(e))
    }
}

impl From<EncodeError> for ClientError {
    fn from(e: EncodeError) -> Self {
        ClientError::Protocol(ProtocolError::Encode(e))
    }
}

impl From<ConfigError> for ClientError {
    fn from(e: ConfigError) -> Self {
        ClientError::Config(e)
    }
}

impl From<TlsError> for ClientError {
    fn from(e: TlsError) -> Self {
        ClientError::Tls(e)
    }
}
