//! MQTT Packet Encoder
//!
//! Encodes MQTT v3.1/v3.1.1 packets into a byte buffer.

use bytes::{BufMut, BytesMut};

use super::{write_binary, write_string, write_variable_int};
use crate::protocol::{
    ConnAck, Connect, EncodeError, Packet, ProtocolVersion, Publish, QoS, SubAck, Subscribe,
    UnsubAck, Unsubscribe,
};

/// MQTT Packet Encoder
#[derive(Default)]
pub struct Encoder;

impl Encoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a packet to the buffer
    pub fn encode(&self, packet: &Packet, buf: &mut BytesMut) -> Result<(), EncodeError> {
        match packet {
            Packet::Connect(p) => self.encode_connect(p, buf),
            Packet::ConnAck(p) => self.encode_connack(p, buf),
            Packet::Publish(p) => self.encode_publish(p, buf),
            Packet::PubAck(p) => Self::encode_packet_id(0x40, p.packet_id, buf),
            Packet::PubRec(p) => Self::encode_packet_id(0x50, p.packet_id, buf),
            Packet::PubRel(p) => Self::encode_packet_id(0x62, p.packet_id, buf),
            Packet::PubComp(p) => Self::encode_packet_id(0x70, p.packet_id, buf),
            Packet::Subscribe(p) => self.encode_subscribe(p, buf),
            Packet::SubAck(p) => self.encode_suback(p, buf),
            Packet::Unsubscribe(p) => self.encode_unsubscribe(p, buf),
            Packet::UnsubAck(p) => self.encode_unsuback(p, buf),
            Packet::PingReq => {
                buf.put_u8(0xC0);
                buf.put_u8(0x00);
                Ok(())
            }
            Packet::PingResp => {
                buf.put_u8(0xD0);
                buf.put_u8(0x00);
                Ok(())
            }
            Packet::Disconnect => {
                buf.put_u8(0xE0);
                buf.put_u8(0x00);
                Ok(())
            }
        }
    }

    /// Shared shape of the packet-id-only acknowledgements
    fn encode_packet_id(first_byte: u8, packet_id: u16, buf: &mut BytesMut) -> Result<(), EncodeError> {
        buf.put_u8(first_byte);
        buf.put_u8(0x02);
        buf.put_u16(packet_id);
        Ok(())
    }

    fn encode_connect(&self, packet: &Connect, buf: &mut BytesMut) -> Result<(), EncodeError> {
        // [MQTT-3.1.2-22] a password requires a username in v3.1.1
        if packet.protocol_version == ProtocolVersion::V311
            && packet.username.is_none()
            && packet.password.is_some()
        {
            return Err(EncodeError::PasswordWithoutUsername);
        }

        let protocol_name = packet.protocol_version.protocol_name();

        // Calculate remaining length
        let mut remaining_length = 2 + protocol_name.len(); // protocol name
        remaining_length += 1; // protocol level
        remaining_length += 1; // connect flags
        remaining_length += 2; // keep alive
        remaining_length += 2 + packet.client_id.len();

        if let Some(ref will) = packet.will {
            remaining_length += 2 + will.topic.len();
            remaining_length += 2 + will.payload.len();
        }
        if let Some(ref username) = packet.username {
            remaining_length += 2 + username.len();
        }
        if let Some(ref password) = packet.password {
            remaining_length += 2 + password.len();
        }

        // Fixed header
        buf.put_u8(0x10);
        write_variable_int(buf, remaining_length as u32)?;

        // Protocol name + level
        write_string(buf, protocol_name)?;
        buf.put_u8(packet.protocol_version as u8);

        // Connect flags
        let mut connect_flags: u8 = 0;
        if packet.clean_session {
            connect_flags |= 0x02;
        }
        if let Some(ref will) = packet.will {
            connect_flags |= 0x04;
            connect_flags |= (will.qos as u8) << 3;
            if will.retain {
                connect_flags |= 0x20;
            }
        }
        if packet.password.is_some() {
            connect_flags |= 0x40;
        }
        if packet.username.is_some() {
            connect_flags |= 0x80;
        }
        buf.put_u8(connect_flags);

        // Keep alive
        buf.put_u16(packet.keep_alive);

        // Client ID
        write_string(buf, &packet.client_id)?;

        // Will message
        if let Some(ref will) = packet.will {
            write_string(buf, &will.topic)?;
            write_binary(buf, &will.payload)?;
        }

        // Username
        if let Some(ref username) = packet.username {
            write_string(buf, username)?;
        }

        // Password
        if let Some(ref password) = packet.password {
            write_binary(buf, password)?;
        }

        Ok(())
    }

    fn encode_connack(&self, packet: &ConnAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
        buf.put_u8(0x20);
        buf.put_u8(0x02);
        buf.put_u8(if packet.session_present { 0x01 } else { 0x00 });
        buf.put_u8(packet.return_code as u8);
        Ok(())
    }

    fn encode_publish(&self, packet: &Publish, buf: &mut BytesMut) -> Result<(), EncodeError> {
        // Calculate remaining length
        let mut remaining_length = 2 + packet.topic.len();
        if packet.qos != QoS::AtMostOnce {
            remaining_length += 2; // packet identifier
        }
        remaining_length += packet.payload.len();

        // Fixed header
        let mut first_byte: u8 = 0x30;
        if packet.dup {
            first_byte |= 0x08;
        }
        first_byte |= (packet.qos as u8) << 1;
        if packet.retain {
            first_byte |= 0x01;
        }
        buf.put_u8(first_byte);
        write_variable_int(buf, remaining_length as u32)?;

        // Topic name
        write_string(buf, &packet.topic)?;

        // Packet identifier (only for QoS > 0)
        if packet.qos != QoS::AtMostOnce {
            if let Some(packet_id) = packet.packet_id {
                buf.put_u16(packet_id);
            }
        }

        // Payload runs to the end of the packet
        buf.put_slice(&packet.payload);

        Ok(())
    }

    fn encode_subscribe(&self, packet: &Subscribe, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let mut remaining_length = 2; // packet identifier
        for sub in &packet.subscriptions {
            remaining_length += 2 + sub.filter.len() + 1; // string + qos byte
        }

        buf.put_u8(0x82); // SUBSCRIBE type with flags 0010
        write_variable_int(buf, remaining_length as u32)?;

        buf.put_u16(packet.packet_id);

        for sub in &packet.subscriptions {
            write_string(buf, &sub.filter)?;
            buf.put_u8(sub.qos as u8);
        }

        Ok(())
    }

    fn encode_suback(&self, packet: &SubAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let remaining_length = 2 + packet.return_codes.len();

        buf.put_u8(0x90);
        write_variable_int(buf, remaining_length as u32)?;

        buf.put_u16(packet.packet_id);
        for code in &packet.return_codes {
            buf.put_u8(code.to_u8());
        }

        Ok(())
    }

    fn encode_unsubscribe(
        &self,
        packet: &Unsubscribe,
        buf: &mut BytesMut,
    ) -> Result<(), EncodeError> {
        let mut remaining_length = 2; // packet identifier
        for filter in &packet.filters {
            remaining_length += 2 + filter.len();
        }

        buf.put_u8(0xA2); // UNSUBSCRIBE type with flags 0010
        write_variable_int(buf, remaining_length as u32)?;

        buf.put_u16(packet.packet_id);
        for filter in &packet.filters {
            write_string(buf, filter)?;
        }

        Ok(())
    }

    fn encode_unsuback(&self, packet: &UnsubAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
        buf.put_u8(0xB0);
        buf.put_u8(0x02);
        buf.put_u16(packet.packet_id);
        Ok(())
    }
}
