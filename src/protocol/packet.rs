//! MQTT Packet Definitions
//!
//! Typed representations of the 14 MQTT v3.1/v3.1.1 control packets.

use bytes::Bytes;

use super::{ConnectReturnCode, ProtocolVersion, QoS, SubscribeReturnCode};

/// MQTT control packet
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Packet {
    Connect(Box<Connect>),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Get packet type as u8
    pub fn packet_type(&self) -> u8 {
        match self {
            Packet::Connect(_) => 1,
            Packet::ConnAck(_) => 2,
            Packet::Publish(_) => 3,
            Packet::PubAck(_) => 4,
            Packet::PubRec(_) => 5,
            Packet::PubRel(_) => 6,
            Packet::PubComp(_) => 7,
            Packet::Subscribe(_) => 8,
            Packet::SubAck(_) => 9,
            Packet::Unsubscribe(_) => 10,
            Packet::UnsubAck(_) => 11,
            Packet::PingReq => 12,
            Packet::PingResp => 13,
            Packet::Disconnect => 14,
        }
    }

    /// Packet identifier carried by this packet, if any
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Packet::Publish(p) => p.packet_id,
            Packet::PubAck(p) => Some(p.packet_id),
            Packet::PubRec(p) => Some(p.packet_id),
            Packet::PubRel(p) => Some(p.packet_id),
            Packet::PubComp(p) => Some(p.packet_id),
            Packet::Subscribe(p) => Some(p.packet_id),
            Packet::SubAck(p) => Some(p.packet_id),
            Packet::Unsubscribe(p) => Some(p.packet_id),
            Packet::UnsubAck(p) => Some(p.packet_id),
            _ => None,
        }
    }

    /// Mark a PUBLISH as a duplicate delivery; no-op for other packet types
    pub fn set_dup(&mut self) {
        if let Packet::Publish(p) = self {
            p.dup = true;
        }
    }
}

/// CONNECT packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// Protocol version (determines protocol name and level byte)
    pub protocol_version: ProtocolVersion,
    /// Client identifier
    pub client_id: String,
    /// Clean session flag
    pub clean_session: bool,
    /// Keep alive interval in seconds (0 disables)
    pub keep_alive: u16,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<Bytes>,
    /// Will message (optional)
    pub will: Option<Will>,
}

impl Default for Connect {
    fn default() -> Self {
        Self {
            protocol_version: ProtocolVersion::V311,
            client_id: String::new(),
            clean_session: true,
            keep_alive: 15,
            username: None,
            password: None,
            will: None,
        }
    }
}

/// Will message configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    /// Will topic
    pub topic: String,
    /// Will payload
    pub payload: Bytes,
    /// Will QoS
    pub qos: QoS,
    /// Will retain flag
    pub retain: bool,
}

/// CONNACK packet (server -> client)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    /// Session present flag (v3.1.1; the byte is reserved in v3.1)
    pub session_present: bool,
    /// Connection return code
    pub return_code: ConnectReturnCode,
}

impl Default for ConnAck {
    fn default() -> Self {
        Self {
            session_present: false,
            return_code: ConnectReturnCode::Accepted,
        }
    }
}

/// PUBLISH packet (bidirectional)
///
/// The payload is opaque and runs to the end of the packet; it is not
/// length-prefixed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Publish {
    /// Duplicate delivery flag
    pub dup: bool,
    /// Quality of service
    pub qos: QoS,
    /// Retain flag
    pub retain: bool,
    /// Topic name
    pub topic: String,
    /// Packet identifier (present only for QoS > 0)
    pub packet_id: Option<u16>,
    /// Payload
    pub payload: Bytes,
}

/// PUBACK packet (QoS 1 acknowledgement)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAck {
    pub packet_id: u16,
}

impl PubAck {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// PUBREC packet (QoS 2 step 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubRec {
    pub packet_id: u16,
}

impl PubRec {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// PUBREL packet (QoS 2 step 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubRel {
    pub packet_id: u16,
}

impl PubRel {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// PUBCOMP packet (QoS 2 step 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubComp {
    pub packet_id: u16,
}

impl PubComp {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// Single subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Topic filter
    pub filter: String,
    /// Requested QoS
    pub qos: QoS,
}

/// SUBSCRIBE packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    /// Packet identifier
    pub packet_id: u16,
    /// Requested subscriptions (must be non-empty)
    pub subscriptions: Vec<Subscription>,
}

/// SUBACK packet (server -> client)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    /// Packet identifier
    pub packet_id: u16,
    /// Granted QoS / failure, one per requested subscription
    pub return_codes: Vec<SubscribeReturnCode>,
}

/// UNSUBSCRIBE packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    /// Packet identifier
    pub packet_id: u16,
    /// Topic filters to unsubscribe from (must be non-empty)
    pub filters: Vec<String>,
}

/// UNSUBACK packet (server -> client)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubAck {
    /// Packet identifier
    pub packet_id: u16,
}
