//! MQTT Protocol definitions and types
//!
//! Defines core protocol types shared by the codec and the client session
//! engine. Covers MQTT v3.1 (protocol level 3) and v3.1.1 (protocol level 4).

mod error;
mod packet;

pub use error::{DecodeError, EncodeError, ProtocolError};
pub use packet::*;

use serde::Deserialize;

/// MQTT Protocol Version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[repr(u8)]
pub enum ProtocolVersion {
    /// MQTT v3.1 (protocol level 3, protocol name "MQIsdp")
    #[serde(rename = "3.1.0")]
    V31 = 3,
    /// MQTT v3.1.1 (protocol level 4, protocol name "MQTT")
    #[default]
    #[serde(rename = "3.1.1")]
    V311 = 4,
}

impl ProtocolVersion {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            3 => Some(ProtocolVersion::V31),
            4 => Some(ProtocolVersion::V311),
            _ => None,
        }
    }

    /// Protocol name carried in the CONNECT variable header
    pub fn protocol_name(self) -> &'static str {
        match self {
            ProtocolVersion::V31 => "MQIsdp",
            ProtocolVersion::V311 => "MQTT",
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolVersion::V31 => write!(f, "3.1.0"),
            ProtocolVersion::V311 => write!(f, "3.1.1"),
        }
    }
}

/// Quality of Service levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[repr(u8)]
pub enum QoS {
    /// At most once delivery
    #[default]
    AtMostOnce = 0,
    /// At least once delivery
    AtLeastOnce = 1,
    /// Exactly once delivery
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

/// CONNACK return code (v3.1 / v3.1.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUserNameOrPassword = 4,
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ConnectReturnCode::Accepted),
            1 => Some(ConnectReturnCode::UnacceptableProtocolVersion),
            2 => Some(ConnectReturnCode::IdentifierRejected),
            3 => Some(ConnectReturnCode::ServerUnavailable),
            4 => Some(ConnectReturnCode::BadUserNameOrPassword),
            5 => Some(ConnectReturnCode::NotAuthorized),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectReturnCode::Accepted => write!(f, "connection accepted"),
            ConnectReturnCode::UnacceptableProtocolVersion => {
                write!(f, "unacceptable protocol version")
            }
            ConnectReturnCode::IdentifierRejected => write!(f, "client identifier rejected"),
            ConnectReturnCode::ServerUnavailable => write!(f, "server unavailable"),
            ConnectReturnCode::BadUserNameOrPassword => write!(f, "bad user name or password"),
            ConnectReturnCode::NotAuthorized => write!(f, "not authorised"),
        }
    }
}

/// SUBACK return code: granted QoS or failure (0x80)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReturnCode {
    /// Subscription accepted at the given QoS
    Success(QoS),
    /// Subscription refused
    Failure,
}

impl SubscribeReturnCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x80 => Some(SubscribeReturnCode::Failure),
            _ => QoS::from_u8(v).map(SubscribeReturnCode::Success),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            SubscribeReturnCode::Success(qos) => qos as u8,
            SubscribeReturnCode::Failure => 0x80,
        }
    }
}

/// MQTT Packet Type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(PacketType::Connect),
            2 => Some(PacketType::ConnAck),
            3 => Some(PacketType::Publish),
            4 => Some(PacketType::PubAck),
            5 => Some(PacketType::PubRec),
            6 => Some(PacketType::PubRel),
            7 => Some(PacketType::PubComp),
            8 => Some(PacketType::Subscribe),
            9 => Some(PacketType::SubAck),
            10 => Some(PacketType::Unsubscribe),
            11 => Some(PacketType::UnsubAck),
            12 => Some(PacketType::PingReq),
            13 => Some(PacketType::PingResp),
            14 => Some(PacketType::Disconnect),
            _ => None,
        }
    }
}
