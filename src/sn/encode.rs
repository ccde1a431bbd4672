//! MQTT-SN Packet Encoder

use bytes::{BufMut, Bytes, BytesMut};

use super::error::EncodeError;
use super::{Packet, Topic, MAX_BODY_LENGTH};

/// Encode one MQTT-SN packet into a self-delimiting frame.
///
/// Frames shorter than 256 bytes get a 1-byte length header; longer frames
/// use the `0x01` escape followed by a u16 length. The length value counts
/// the whole frame, length field included.
pub fn encode(packet: &Packet) -> Result<Bytes, EncodeError> {
    let mut body = BytesMut::new();
    encode_body(packet, &mut body);

    if body.len() > MAX_BODY_LENGTH {
        return Err(EncodeError::PacketTooLarge);
    }

    // type byte + body, before the length field is chosen
    let without_length = 1 + body.len();

    let mut frame = BytesMut::with_capacity(without_length + 3);
    if without_length + 1 < 256 {
        frame.put_u8((without_length + 1) as u8);
    } else {
        frame.put_u8(0x01);
        frame.put_u16((without_length + 3) as u16);
    }
    frame.put_u8(packet.message_type());
    frame.extend_from_slice(&body);

    Ok(frame.freeze())
}

fn encode_body(packet: &Packet, buf: &mut BytesMut) {
    match packet {
        Packet::Advertise(p) => {
            buf.put_u8(p.gateway_id);
            buf.put_u16(p.duration);
        }
        Packet::Searchgw(p) => {
            buf.put_u8(p.radius);
        }
        Packet::Gwinfo(p) => {
            buf.put_u8(p.gateway_id);
            buf.put_slice(&p.gateway_address);
        }
        Packet::Connect(p) => {
            buf.put_u8(p.flags.to_byte());
            buf.put_u8(0x01); // protocol id
            buf.put_u16(p.duration);
            buf.put_slice(p.client_id.as_bytes());
        }
        Packet::Connack(p) => {
            buf.put_u8(p.return_code.to_u8());
        }
        Packet::Willtopicreq | Packet::Willmsgreq | Packet::Pingresp => {}
        Packet::Willtopic(p) => {
            // An empty topic deletes the will and is sent as an empty body
            if !p.topic.is_empty() {
                buf.put_u8(p.flags.to_byte());
                buf.put_slice(p.topic.as_bytes());
            }
        }
        Packet::Willmsg(p) => {
            buf.put_slice(&p.message);
        }
        Packet::Register(p) => {
            buf.put_u16(p.topic_id);
            buf.put_u16(p.message_id);
            buf.put_slice(p.topic_name.as_bytes());
        }
        Packet::Regack(p) => {
            buf.put_u16(p.topic_id);
            buf.put_u16(p.message_id);
            buf.put_u8(p.return_code.to_u8());
        }
        Packet::Publish(p) => {
            buf.put_u8(p.flags.to_byte());
            buf.put_slice(&p.topic_id.to_bytes());
            buf.put_u16(p.message_id);
            buf.put_slice(&p.data);
        }
        Packet::Puback(p) => {
            buf.put_u16(p.topic_id);
            buf.put_u16(p.message_id);
            buf.put_u8(p.return_code.to_u8());
        }
        Packet::Pubcomp(p) => {
            buf.put_u16(p.message_id);
        }
        Packet::Pubrec(p) => {
            buf.put_u16(p.message_id);
        }
        Packet::Pubrel(p) => {
            buf.put_u16(p.message_id);
        }
        Packet::Subscribe(p) => {
            encode_topic_request(p.flags, p.message_id, &p.topic, buf);
        }
        Packet::Suback(p) => {
            buf.put_u8(p.flags.to_byte());
            buf.put_u16(p.topic_id);
            buf.put_u16(p.message_id);
            buf.put_u8(p.return_code.to_u8());
        }
        Packet::Unsubscribe(p) => {
            encode_topic_request(p.flags, p.message_id, &p.topic, buf);
        }
        Packet::Unsuback(p) => {
            buf.put_u16(p.message_id);
        }
        Packet::Pingreq(p) => {
            if let Some(ref client_id) = p.client_id {
                buf.put_slice(client_id.as_bytes());
            }
        }
        Packet::Disconnect(p) => {
            if let Some(duration) = p.duration {
                buf.put_u16(duration);
            }
        }
        Packet::Willtopicupd(p) => {
            if !p.topic.is_empty() {
                buf.put_u8(p.flags.to_byte());
                buf.put_slice(p.topic.as_bytes());
            }
        }
        Packet::Willtopicresp(p) => {
            buf.put_u8(p.return_code.to_u8());
        }
        Packet::Willmsgupd(p) => {
            buf.put_slice(&p.message);
        }
        Packet::Willmsgresp(p) => {
            buf.put_u8(p.return_code.to_u8());
        }
    }
}

/// Shared body shape of SUBSCRIBE and UNSUBSCRIBE; the flags' topic-id-type
/// is forced to match the topic representation.
fn encode_topic_request(mut flags: super::Flags, message_id: u16, topic: &Topic, buf: &mut BytesMut) {
    flags.topic_id_type = Some(topic.id_type());
    buf.put_u8(flags.to_byte());
    buf.put_u16(message_id);
    match topic {
        Topic::Name(name) => buf.put_slice(name.as_bytes()),
        Topic::Id(id) => buf.put_u16(*id),
        Topic::Short(b) => buf.put_slice(b),
    }
}
