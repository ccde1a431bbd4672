//! MQTT-SN v1.2 Packet Codec
//!
//! Frame-level encoding and decoding of MQTT-SN packets. MQTT-SN frames are
//! self-delimiting (each datagram is one packet), so this codec works on
//! complete buffers rather than a byte stream. The session engine does not
//! speak MQTT-SN; this module is a standalone codec.

mod decode;
mod encode;
mod error;


pub use decode::decode;
pub use encode::encode;
pub use error::{DecodeError, EncodeError};

use bytes::Bytes;

/// Largest encodable body: a 3-byte length header plus the type byte leaves
/// this much room under the u16 length field.
pub const MAX_BODY_LENGTH: usize = 65_531;

/// MQTT-SN message type codes
pub mod types {
    pub const ADVERTISE: u8 = 0x00;
    pub const SEARCHGW: u8 = 0x01;
    pub const GWINFO: u8 = 0x02;
    pub const CONNECT: u8 = 0x04;
    pub const CONNACK: u8 = 0x05;
    pub const WILLTOPICREQ: u8 = 0x06;
    pub const WILLTOPIC: u8 = 0x07;
    pub const WILLMSGREQ: u8 = 0x08;
    pub const WILLMSG: u8 = 0x09;
    pub const REGISTER: u8 = 0x0A;
    pub const REGACK: u8 = 0x0B;
    pub const PUBLISH: u8 = 0x0C;
    pub const PUBACK: u8 = 0x0D;
    pub const PUBCOMP: u8 = 0x0E;
    pub const PUBREC: u8 = 0x0F;
    pub const PUBREL: u8 = 0x10;
    pub const SUBSCRIBE: u8 = 0x12;
    pub const SUBACK: u8 = 0x13;
    pub const UNSUBSCRIBE: u8 = 0x14;
    pub const UNSUBACK: u8 = 0x15;
    pub const PINGREQ: u8 = 0x16;
    pub const PINGRESP: u8 = 0x17;
    pub const DISCONNECT: u8 = 0x18;
    pub const WILLTOPICUPD: u8 = 0x1A;
    pub const WILLTOPICRESP: u8 = 0x1B;
    pub const WILLMSGUPD: u8 = 0x1C;
    pub const WILLMSGRESP: u8 = 0x1D;
}

/// Quality of service as carried in the MQTT-SN flags byte.
///
/// MQTT-SN adds a fourth level (flag bits `0b11`) for publishing without a
/// session, conventionally written as QoS -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
    /// QoS -1: publish without a connection
    NoSession,
}

impl Qos {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Qos::AtMostOnce),
            1 => Some(Qos::AtLeastOnce),
            2 => Some(Qos::ExactlyOnce),
            3 => Some(Qos::NoSession),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
            Qos::NoSession => 3,
        }
    }

    /// Numeric QoS level, -1 for [`Qos::NoSession`]
    pub fn level(self) -> i8 {
        match self {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
            Qos::NoSession => -1,
        }
    }
}

/// How the topic field of a PUBLISH/SUBSCRIBE is to be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicIdType {
    /// Registered topic id
    Normal,
    /// Topic id agreed out-of-band
    Predefined,
    /// Two-character topic name carried in the id field
    Short,
}

impl TopicIdType {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(TopicIdType::Normal),
            1 => Some(TopicIdType::Predefined),
            2 => Some(TopicIdType::Short),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            TopicIdType::Normal => 0,
            TopicIdType::Predefined => 1,
            TopicIdType::Short => 2,
        }
    }
}

/// MQTT-SN flags byte
///
/// Bit layout: 7 dup, 6-5 qos, 4 retain, 3 will, 2 clean session,
/// 1-0 topic id type. Bits `0b11` in the topic-id-type position are
/// reserved; they decode to `None` and the raw topic-id bytes are kept
/// as-is by the packet that carries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub dup: bool,
    pub qos: Qos,
    pub retain: bool,
    pub will: bool,
    pub clean_session: bool,
    pub topic_id_type: Option<TopicIdType>,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            dup: false,
            qos: Qos::AtMostOnce,
            retain: false,
            will: false,
            clean_session: false,
            topic_id_type: Some(TopicIdType::Normal),
        }
    }
}

impl Flags {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            dup: (byte & 0x80) != 0,
            // Two bits always name a valid level
            qos: Qos::from_bits((byte >> 5) & 0x03).unwrap_or_default(),
            retain: (byte & 0x10) != 0,
            will: (byte & 0x08) != 0,
            clean_session: (byte & 0x04) != 0,
            topic_id_type: TopicIdType::from_bits(byte & 0x03),
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = 0u8;
        if self.dup {
            byte |= 0x80;
        }
        byte |= self.qos.bits() << 5;
        if self.retain {
            byte |= 0x10;
        }
        if self.will {
            byte |= 0x08;
        }
        if self.clean_session {
            byte |= 0x04;
        }
        byte |= self.topic_id_type.map(TopicIdType::bits).unwrap_or(0x03);
        byte
    }
}

/// Topic id field of PUBLISH and the registration acknowledgements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicId {
    /// Numeric id (normal or predefined per the flags)
    Id(u16),
    /// Two-character short topic name
    Short([u8; 2]),
}

impl TopicId {
    /// Build a short topic id from a 2-character name
    pub fn short(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        Some(TopicId::Short([bytes[0], bytes[1]]))
    }

    pub(crate) fn to_bytes(self) -> [u8; 2] {
        match self {
            TopicId::Id(id) => id.to_be_bytes(),
            TopicId::Short(b) => b,
        }
    }

    pub(crate) fn from_bytes(bytes: [u8; 2], id_type: Option<TopicIdType>) -> Self {
        match id_type {
            Some(TopicIdType::Short) => TopicId::Short(bytes),
            _ => TopicId::Id(u16::from_be_bytes(bytes)),
        }
    }
}

/// Topic field of SUBSCRIBE/UNSUBSCRIBE: a full name, a predefined id, or a
/// short name, selected by the flags byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Name(String),
    Id(u16),
    Short([u8; 2]),
}

impl Topic {
    pub(crate) fn id_type(&self) -> TopicIdType {
        match self {
            Topic::Name(_) => TopicIdType::Normal,
            Topic::Id(_) => TopicIdType::Predefined,
            Topic::Short(_) => TopicIdType::Short,
        }
    }
}

/// CONNACK / REGACK / PUBACK / SUBACK return code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Accepted,
    Congestion,
    InvalidTopicId,
    NotSupported,
    /// Any other code the peer may send
    Rejected(u8),
}

impl ReturnCode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => ReturnCode::Accepted,
            1 => ReturnCode::Congestion,
            2 => ReturnCode::InvalidTopicId,
            3 => ReturnCode::NotSupported,
            other => ReturnCode::Rejected(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            ReturnCode::Accepted => 0,
            ReturnCode::Congestion => 1,
            ReturnCode::InvalidTopicId => 2,
            ReturnCode::NotSupported => 3,
            ReturnCode::Rejected(v) => v,
        }
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnCode::Accepted => write!(f, "accepted"),
            ReturnCode::Congestion => write!(f, "rejected: congestion"),
            ReturnCode::InvalidTopicId => write!(f, "rejected: invalid topic ID"),
            ReturnCode::NotSupported => write!(f, "rejected: not supported"),
            ReturnCode::Rejected(_) => write!(f, "rejected"),
        }
    }
}

/// MQTT-SN control packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Advertise(Advertise),
    Searchgw(Searchgw),
    Gwinfo(Gwinfo),
    Connect(Connect),
    Connack(Connack),
    Willtopicreq,
    Willtopic(Willtopic),
    Willmsgreq,
    Willmsg(Willmsg),
    Register(Register),
    Regack(Regack),
    Publish(Publish),
    Puback(Puback),
    Pubcomp(Pubcomp),
    Pubrec(Pubrec),
    Pubrel(Pubrel),
    Subscribe(Subscribe),
    Suback(Suback),
    Unsubscribe(Unsubscribe),
    Unsuback(Unsuback),
    Pingreq(Pingreq),
    Pingresp,
    Disconnect(Disconnect),
    Willtopicupd(Willtopicupd),
    Willtopicresp(Willtopicresp),
    Willmsgupd(Willmsgupd),
    Willmsgresp(Willmsgresp),
}

impl Packet {
    /// Get the message type code
    pub fn message_type(&self) -> u8 {
        match self {
            Packet::Advertise(_) => types::ADVERTISE,
            Packet::Searchgw(_) => types::SEARCHGW,
            Packet::Gwinfo(_) => types::GWINFO,
            Packet::Connect(_) => types::CONNECT,
            Packet::Connack(_) => types::CONNACK,
            Packet::Willtopicreq => types::WILLTOPICREQ,
            Packet::Willtopic(_) => types::WILLTOPIC,
            Packet::Willmsgreq => types::WILLMSGREQ,
            Packet::Willmsg(_) => types::WILLMSG,
            Packet::Register(_) => types::REGISTER,
            Packet::Regack(_) => types::REGACK,
            Packet::Publish(_) => types::PUBLISH,
            Packet::Puback(_) => types::PUBACK,
            Packet::Pubcomp(_) => types::PUBCOMP,
            Packet::Pubrec(_) => types::PUBREC,
            Packet::Pubrel(_) => types::PUBREL,
            Packet::Subscribe(_) => types::SUBSCRIBE,
            Packet::Suback(_) => types::SUBACK,
            Packet::Unsubscribe(_) => types::UNSUBSCRIBE,
            Packet::Unsuback(_) => types::UNSUBACK,
            Packet::Pingreq(_) => types::PINGREQ,
            Packet::Pingresp => types::PINGRESP,
            Packet::Disconnect(_) => types::DISCONNECT,
            Packet::Willtopicupd(_) => types::WILLTOPICUPD,
            Packet::Willtopicresp(_) => types::WILLTOPICRESP,
            Packet::Willmsgupd(_) => types::WILLMSGUPD,
            Packet::Willmsgresp(_) => types::WILLMSGRESP,
        }
    }
}

/// ADVERTISE: gateway presence broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advertise {
    pub gateway_id: u8,
    /// Seconds until the next ADVERTISE
    pub duration: u16,
}

/// SEARCHGW: gateway discovery probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Searchgw {
    pub radius: u8,
}

/// GWINFO: gateway discovery answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gwinfo {
    pub gateway_id: u8,
    /// Gateway address; empty when the gateway answers for itself
    pub gateway_address: Bytes,
}

/// CONNECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub flags: Flags,
    /// Keep-alive duration in seconds
    pub duration: u16,
    pub client_id: String,
}

/// CONNACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connack {
    pub return_code: ReturnCode,
}

/// WILLTOPIC: answer to WILLTOPICREQ; `None` deletes the will
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Willtopic {
    pub flags: Flags,
    pub topic: String,
}

/// WILLMSG: answer to WILLMSGREQ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Willmsg {
    pub message: Bytes,
}

/// REGISTER: map a topic name to a topic id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub topic_id: u16,
    pub message_id: u16,
    pub topic_name: String,
}

/// REGACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regack {
    pub topic_id: u16,
    pub message_id: u16,
    pub return_code: ReturnCode,
}

/// PUBLISH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub flags: Flags,
    pub topic_id: TopicId,
    pub message_id: u16,
    pub data: Bytes,
}

/// PUBACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Puback {
    pub topic_id: u16,
    pub message_id: u16,
    pub return_code: ReturnCode,
}

/// PUBREC (QoS 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pubrec {
    pub message_id: u16,
}

/// PUBREL (QoS 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pubrel {
    pub message_id: u16,
}

/// PUBCOMP (QoS 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pubcomp {
    pub message_id: u16,
}

/// SUBSCRIBE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub flags: Flags,
    pub message_id: u16,
    pub topic: Topic,
}

/// SUBACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suback {
    pub flags: Flags,
    pub topic_id: u16,
    pub message_id: u16,
    pub return_code: ReturnCode,
}

/// UNSUBSCRIBE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub flags: Flags,
    pub message_id: u16,
    pub topic: Topic,
}

/// UNSUBACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsuback {
    pub message_id: u16,
}

/// PINGREQ; the client id is present when a sleeping client announces itself
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pingreq {
    pub client_id: Option<String>,
}

/// DISCONNECT; a duration turns disconnection into sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Disconnect {
    pub duration: Option<u16>,
}

/// WILLTOPICUPD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Willtopicupd {
    pub flags: Flags,
    pub topic: String,
}

/// WILLTOPICRESP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Willtopicresp {
    pub return_code: ReturnCode,
}

/// WILLMSGUPD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Willmsgupd {
    pub message: Bytes,
}

/// WILLMSGRESP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Willmsgresp {
    pub return_code: ReturnCode,
}
