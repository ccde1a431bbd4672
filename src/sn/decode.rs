//! MQTT-SN Packet Decoder

use bytes::Bytes;

use super::error::DecodeError;
use super::{
    types, Advertise, Connack, Connect, Disconnect, Flags, Gwinfo, Packet, Pingreq, Puback,
    Pubcomp, Publish, Pubrec, Pubrel, Regack, Register, ReturnCode, Searchgw, Suback, Subscribe,
    Topic, TopicId, TopicIdType, Unsuback, Unsubscribe, Willmsg, Willmsgresp, Willmsgupd,
    Willtopic, Willtopicresp, Willtopicupd,
};

/// Decode one MQTT-SN packet from a complete frame.
///
/// The length header must account for the whole buffer; a mismatch is an
/// error because MQTT-SN frames are never split or coalesced.
pub fn decode(buf: &[u8]) -> Result<Packet, DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::InsufficientData);
    }

    // 1-byte length, or 0x01 followed by a u16 length; the value counts the
    // length field itself.
    let (length, header_len) = if buf[0] == 0x01 {
        if buf.len() < 3 {
            return Err(DecodeError::InsufficientData);
        }
        (u16::from_be_bytes([buf[1], buf[2]]) as usize, 3)
    } else {
        (buf[0] as usize, 1)
    };

    if length != buf.len() {
        return Err(DecodeError::LengthMismatch);
    }
    if buf.len() < header_len + 1 {
        return Err(DecodeError::InsufficientData);
    }

    let message_type = buf[header_len];
    let body = &buf[header_len + 1..];

    match message_type {
        types::ADVERTISE => decode_advertise(body),
        types::SEARCHGW => decode_searchgw(body),
        types::GWINFO => decode_gwinfo(body),
        types::CONNECT => decode_connect(body),
        types::CONNACK => Ok(Packet::Connack(Connack {
            return_code: decode_return_code(body)?,
        })),
        types::WILLTOPICREQ => Ok(Packet::Willtopicreq),
        types::WILLTOPIC => {
            let (flags, topic) = decode_will_topic(body)?;
            Ok(Packet::Willtopic(Willtopic { flags, topic }))
        }
        types::WILLMSGREQ => Ok(Packet::Willmsgreq),
        types::WILLMSG => Ok(Packet::Willmsg(Willmsg {
            message: Bytes::copy_from_slice(body),
        })),
        types::REGISTER => decode_register(body),
        types::REGACK => decode_regack(body),
        types::PUBLISH => decode_publish(body),
        types::PUBACK => decode_puback(body),
        types::PUBCOMP => Ok(Packet::Pubcomp(Pubcomp {
            message_id: decode_message_id(body)?,
        })),
        types::PUBREC => Ok(Packet::Pubrec(Pubrec {
            message_id: decode_message_id(body)?,
        })),
        types::PUBREL => Ok(Packet::Pubrel(Pubrel {
            message_id: decode_message_id(body)?,
        })),
        types::SUBSCRIBE => {
            let (flags, message_id, topic) = decode_topic_request(body)?;
            Ok(Packet::Subscribe(Subscribe {
                flags,
                message_id,
                topic,
            }))
        }
        types::SUBACK => decode_suback(body),
        types::UNSUBSCRIBE => {
            let (flags, message_id, topic) = decode_topic_request(body)?;
            Ok(Packet::Unsubscribe(Unsubscribe {
                flags,
                message_id,
                topic,
            }))
        }
        types::UNSUBACK => Ok(Packet::Unsuback(Unsuback {
            message_id: decode_message_id(body)?,
        })),
        types::PINGREQ => decode_pingreq(body),
        types::PINGRESP => Ok(Packet::Pingresp),
        types::DISCONNECT => decode_disconnect(body),
        types::WILLTOPICUPD => {
            let (flags, topic) = decode_will_topic(body)?;
            Ok(Packet::Willtopicupd(Willtopicupd { flags, topic }))
        }
        types::WILLTOPICRESP => Ok(Packet::Willtopicresp(Willtopicresp {
            return_code: decode_return_code(body)?,
        })),
        types::WILLMSGUPD => Ok(Packet::Willmsgupd(Willmsgupd {
            message: Bytes::copy_from_slice(body),
        })),
        types::WILLMSGRESP => Ok(Packet::Willmsgresp(Willmsgresp {
            return_code: decode_return_code(body)?,
        })),
        other => Err(DecodeError::InvalidMessageType(other)),
    }
}

fn decode_advertise(body: &[u8]) -> Result<Packet, DecodeError> {
    if body.len() < 3 {
        return Err(DecodeError::MalformedPacket("ADVERTISE body too short"));
    }
    Ok(Packet::Advertise(Advertise {
        gateway_id: body[0],
        duration: u16::from_be_bytes([body[1], body[2]]),
    }))
}

fn decode_searchgw(body: &[u8]) -> Result<Packet, DecodeError> {
    if body.is_empty() {
        return Err(DecodeError::MalformedPacket("SEARCHGW body too short"));
    }
    Ok(Packet::Searchgw(Searchgw { radius: body[0] }))
}

fn decode_gwinfo(body: &[u8]) -> Result<Packet, DecodeError> {
    if body.is_empty() {
        return Err(DecodeError::MalformedPacket("GWINFO body too short"));
    }
    Ok(Packet::Gwinfo(Gwinfo {
        gateway_id: body[0],
        gateway_address: Bytes::copy_from_slice(&body[1..]),
    }))
}

fn decode_connect(body: &[u8]) -> Result<Packet, DecodeError> {
    if body.len() < 4 {
        return Err(DecodeError::MalformedPacket("CONNECT body too short"));
    }
    let flags = Flags::from_byte(body[0]);
    let protocol_id = body[1];
    if protocol_id != 0x01 {
        return Err(DecodeError::UnsupportedProtocolId(protocol_id));
    }
    let duration = u16::from_be_bytes([body[2], body[3]]);
    let client_id = std::str::from_utf8(&body[4..])
        .map_err(|_| DecodeError::InvalidUtf8)?
        .to_string();

    Ok(Packet::Connect(Connect {
        flags,
        duration,
        client_id,
    }))
}

fn decode_register(body: &[u8]) -> Result<Packet, DecodeError> {
    if body.len() < 4 {
        return Err(DecodeError::MalformedPacket("REGISTER body too short"));
    }
    let topic_name = std::str::from_utf8(&body[4..]).map_err(|_| DecodeError::InvalidUtf8)?;
    Ok(Packet::Register(Register {
        topic_id: u16::from_be_bytes([body[0], body[1]]),
        message_id: u16::from_be_bytes([body[2], body[3]]),
        topic_name: topic_name.to_string(),
    }))
}

fn decode_regack(body: &[u8]) -> Result<Packet, DecodeError> {
    if body.len() < 5 {
        return Err(DecodeError::MalformedPacket("REGACK body too short"));
    }
    Ok(Packet::Regack(Regack {
        topic_id: u16::from_be_bytes([body[0], body[1]]),
        message_id: u16::from_be_bytes([body[2], body[3]]),
        return_code: ReturnCode::from_u8(body[4]),
    }))
}

fn decode_publish(body: &[u8]) -> Result<Packet, DecodeError> {
    if body.len() < 5 {
        return Err(DecodeError::MalformedPacket("PUBLISH body too short"));
    }
    let flags = Flags::from_byte(body[0]);
    // Reserved topic-id-type keeps the raw bytes as a numeric id
    let topic_id = TopicId::from_bytes([body[1], body[2]], flags.topic_id_type);
    let message_id = u16::from_be_bytes([body[3], body[4]]);
    let data = Bytes::copy_from_slice(&body[5..]);

    Ok(Packet::Publish(Publish {
        flags,
        topic_id,
        message_id,
        data,
    }))
}

fn decode_puback(body: &[u8]) -> Result<Packet, DecodeError> {
    if body.len() < 5 {
        return Err(DecodeError::MalformedPacket("PUBACK body too short"));
    }
    Ok(Packet::Puback(Puback {
        topic_id: u16::from_be_bytes([body[0], body[1]]),
        message_id: u16::from_be_bytes([body[2], body[3]]),
        return_code: ReturnCode::from_u8(body[4]),
    }))
}

fn decode_suback(body: &[u8]) -> Result<Packet, DecodeError> {
    if body.len() < 6 {
        return Err(DecodeError::MalformedPacket("SUBACK body too short"));
    }
    Ok(Packet::Suback(Suback {
        flags: Flags::from_byte(body[0]),
        topic_id: u16::from_be_bytes([body[1], body[2]]),
        message_id: u16::from_be_bytes([body[3], body[4]]),
        return_code: ReturnCode::from_u8(body[5]),
    }))
}

/// Shared body shape of SUBSCRIBE and UNSUBSCRIBE
fn decode_topic_request(body: &[u8]) -> Result<(Flags, u16, Topic), DecodeError> {
    if body.len() < 3 {
        return Err(DecodeError::MalformedPacket("topic request body too short"));
    }
    let flags = Flags::from_byte(body[0]);
    let message_id = u16::from_be_bytes([body[1], body[2]]);
    let rest = &body[3..];

    let topic = match flags.topic_id_type {
        Some(TopicIdType::Normal) | None => {
            let name = std::str::from_utf8(rest).map_err(|_| DecodeError::InvalidUtf8)?;
            Topic::Name(name.to_string())
        }
        Some(TopicIdType::Predefined) => {
            if rest.len() < 2 {
                return Err(DecodeError::MalformedPacket("predefined topic id too short"));
            }
            Topic::Id(u16::from_be_bytes([rest[0], rest[1]]))
        }
        Some(TopicIdType::Short) => {
            if rest.len() < 2 {
                return Err(DecodeError::MalformedPacket("short topic name too short"));
            }
            Topic::Short([rest[0], rest[1]])
        }
    };

    Ok((flags, message_id, topic))
}

fn decode_pingreq(body: &[u8]) -> Result<Packet, DecodeError> {
    let client_id = if body.is_empty() {
        None
    } else {
        Some(
            std::str::from_utf8(body)
                .map_err(|_| DecodeError::InvalidUtf8)?
                .to_string(),
        )
    };
    Ok(Packet::Pingreq(Pingreq { client_id }))
}

fn decode_disconnect(body: &[u8]) -> Result<Packet, DecodeError> {
    let duration = match body.len() {
        0 => None,
        1 => return Err(DecodeError::MalformedPacket("DISCONNECT duration too short")),
        _ => Some(u16::from_be_bytes([body[0], body[1]])),
    };
    Ok(Packet::Disconnect(Disconnect { duration }))
}

/// WILLTOPIC and WILLTOPICUPD: an empty body deletes the will
fn decode_will_topic(body: &[u8]) -> Result<(Flags, String), DecodeError> {
    if body.is_empty() {
        return Ok((Flags::default(), String::new()));
    }
    let flags = Flags::from_byte(body[0]);
    let topic = std::str::from_utf8(&body[1..]).map_err(|_| DecodeError::InvalidUtf8)?;
    Ok((flags, topic.to_string()))
}

fn decode_return_code(body: &[u8]) -> Result<ReturnCode, DecodeError> {
    if body.is_empty() {
        return Err(DecodeError::MalformedPacket("missing return code"));
    }
    Ok(ReturnCode::from_u8(body[0]))
}

fn decode_message_id(body: &[u8]) -> Result<u16, DecodeError> {
    if body.len() < 2 {
        return Err(DecodeError::MalformedPacket("missing message id"));
    }
    Ok(u16::from_be_bytes([body[0], body[1]]))
}
