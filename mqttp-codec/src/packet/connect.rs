use bytes::{BufMut, Bytes};
use bytestring::ByteString;

use super::properties::Properties;
use super::PacketBody;
use crate::error::{DecodeError, EncodeError, Malformed, Violation};
use crate::topic::validate_topic_name;
use crate::types::{ConnectAckFlags, ConnectAckReason, ConnectFlags, ConnectReturnCode, QoS, WILL_QOS_SHIFT};
use crate::utils::{Encode, Reader};
use crate::version::ProtocolVersion;

#[derive(Debug, PartialEq, Eq, Clone)]
/// Connection Will
pub struct LastWill {
    /// the QoS level to be used when publishing the Will Message.
    pub qos: QoS,
    /// the Will Message is to be Retained when it is published.
    pub retain: bool,
    /// MQTT 5 only
    pub properties: Properties,
    /// the Will Topic
    pub topic: ByteString,
    /// defines the Application Message that is to be published to the Will Topic
    pub message: Bytes,
}

#[derive(Debug, PartialEq, Eq, Clone)]
/// Connect packet content
pub struct Connect {
    /// selects the protocol name and level written on the wire
    pub version: ProtocolVersion,
    /// the handling of the Session state, clean start in MQTT 5.
    pub clean_session: bool,
    /// a time interval measured in seconds.
    pub keep_alive: u16,
    /// MQTT 5 only
    pub properties: Properties,
    /// identifies the Client to the Server.
    pub client_id: ByteString,
    /// Will Message be stored on the Server and associated with the Network Connection.
    pub last_will: Option<LastWill>,
    /// username can be used by the Server for authentication and authorization.
    pub username: Option<ByteString>,
    /// password can be used by the Server for authentication and authorization.
    pub password: Option<Bytes>,
}

impl Connect {
    pub fn new<T: Into<ByteString>>(version: ProtocolVersion, client_id: T) -> Self {
        Connect {
            version,
            clean_session: true,
            keep_alive: 0,
            properties: Properties::default(),
            client_id: client_id.into(),
            last_will: None,
            username: None,
            password: None,
        }
    }

    fn connect_flags(&self) -> ConnectFlags {
        let mut flags = ConnectFlags::empty();
        flags.set(ConnectFlags::CLEAN_START, self.clean_session);
        flags.set(ConnectFlags::USERNAME, self.username.is_some());
        flags.set(ConnectFlags::PASSWORD, self.password.is_some());
        if let Some(will) = &self.last_will {
            flags |= ConnectFlags::WILL;
            flags.set(ConnectFlags::WILL_RETAIN, will.retain);
            flags |= ConnectFlags::from_bits_retain(u8::from(will.qos) << WILL_QOS_SHIFT);
        }
        flags
    }
}

impl PacketBody for Connect {
    fn empty(version: ProtocolVersion) -> Self {
        Connect::new(version, ByteString::new())
    }

    fn decode(version: ProtocolVersion, _flags: u8, src: &mut Reader) -> Result<Self, DecodeError> {
        let offset = src.offset();
        let name = src.read::<Bytes>()?;
        ensure!(name == version.name().as_bytes(), DecodeError::malformed(offset, Malformed::InvalidProtocolName));

        let level = src.read::<u8>()?;
        ensure!(level == version.level(), Violation::ProtocolLevelMismatch { expected: version, actual: level }.into());

        let offset = src.offset();
        let bits = src.read::<u8>()?;
        let reserved = || DecodeError::malformed(offset, Malformed::ReservedBits { field: "connect flags", value: bits });
        let flags = ConnectFlags::from_bits(bits).ok_or_else(reserved)?;
        let will_qos = QoS::try_from((flags & ConnectFlags::WILL_QOS).bits() >> WILL_QOS_SHIFT)
            .map_err(|e| DecodeError::malformed(offset, e))?;
        if !flags.contains(ConnectFlags::WILL) {
            ensure!(will_qos == QoS::AtMostOnce && !flags.contains(ConnectFlags::WILL_RETAIN), reserved());
        }
        if !version.is_v5() {
            ensure!(
                flags.contains(ConnectFlags::USERNAME) || !flags.contains(ConnectFlags::PASSWORD),
                Violation::PasswordWithoutUsername.into()
            );
        }

        let keep_alive = src.read::<u16>()?;
        let properties = if version.is_v5() { Properties::decode(src)? } else { Properties::default() };
        let client_id = src.read::<ByteString>()?;
        let clean_session = flags.contains(ConnectFlags::CLEAN_START);
        if !version.is_v5() {
            ensure!(!client_id.is_empty() || clean_session, Violation::InvalidClientId.into());
        }

        let last_will = if flags.contains(ConnectFlags::WILL) {
            let properties = if version.is_v5() { Properties::decode(src)? } else { Properties::default() };
            let offset = src.offset();
            let topic = src.read::<ByteString>()?;
            validate_topic_name(&topic).map_err(|e| DecodeError::malformed(offset, e))?;
            Some(LastWill {
                qos: will_qos,
                retain: flags.contains(ConnectFlags::WILL_RETAIN),
                properties,
                topic,
                message: src.read()?,
            })
        } else {
            None
        };
        let username = if flags.contains(ConnectFlags::USERNAME) { Some(src.read()?) } else { None };
        let password = if flags.contains(ConnectFlags::PASSWORD) { Some(src.read()?) } else { None };

        Ok(Connect { version, clean_session, keep_alive, properties, client_id, last_will, username, password })
    }

    fn encoded_size(&self) -> usize {
        let v5 = self.version.is_v5();
        let props = |p: &Properties| if v5 { p.encoded_size() } else { 0 };
        let will = self
            .last_will
            .as_ref()
            .map_or(0, |w| props(&w.properties) + w.topic.encoded_size() + w.message.encoded_size());

        // name + level + flags + keep alive
        self.version.name().as_bytes().encoded_size()
            + 4
            + props(&self.properties)
            + self.client_id.encoded_size()
            + will
            + self.username.encoded_size()
            + self.password.encoded_size()
    }

    fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
        let v5 = self.version.is_v5();
        self.version.name().as_bytes().encode(dst)?;
        dst.put_u8(self.version.level());
        dst.put_u8(self.connect_flags().bits());
        self.keep_alive.encode(dst)?;
        if v5 {
            self.properties.encode(dst)?;
        }
        self.client_id.encode(dst)?;
        if let Some(will) = &self.last_will {
            if v5 {
                will.properties.encode(dst)?;
            }
            will.topic.encode(dst)?;
            will.message.encode(dst)?;
        }
        self.username.encode(dst)?;
        self.password.encode(dst)
    }
}

/// CONNACK return code, its meaning depends on the protocol version.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ConnectAckCode {
    V3(ConnectReturnCode),
    V5(ConnectAckReason),
}

impl ConnectAckCode {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, ConnectAckCode::V3(ConnectReturnCode::ConnectionAccepted) | ConnectAckCode::V5(ConnectAckReason::Success))
    }
}

impl From<ConnectAckCode> for u8 {
    fn from(code: ConnectAckCode) -> Self {
        match code {
            ConnectAckCode::V3(c) => c.into(),
            ConnectAckCode::V5(c) => c.into(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
/// ConnectAck message
pub struct ConnectAck {
    pub version: ProtocolVersion,
    /// enables a Client to establish whether the Client and Server have a consistent view
    /// about whether there is already stored Session state.
    pub session_present: bool,
    pub code: ConnectAckCode,
    /// MQTT 5 only
    pub properties: Properties,
}

impl ConnectAck {
    /// Successful CONNACK for `version`.
    pub fn new(version: ProtocolVersion, session_present: bool) -> Self {
        let code = if version.is_v5() {
            ConnectAckCode::V5(ConnectAckReason::Success)
        } else {
            ConnectAckCode::V3(ConnectReturnCode::ConnectionAccepted)
        };
        ConnectAck { version, session_present, code, properties: Properties::default() }
    }
}

impl PacketBody for ConnectAck {
    fn empty(version: ProtocolVersion) -> Self {
        ConnectAck::new(version, false)
    }

    fn decode(version: ProtocolVersion, _flags: u8, src: &mut Reader) -> Result<Self, DecodeError> {
        let offset = src.offset();
        let bits = src.read::<u8>()?;
        let flags = ConnectAckFlags::from_bits(bits).ok_or_else(|| {
            DecodeError::malformed(offset, Malformed::ReservedBits { field: "connect acknowledge flags", value: bits })
        })?;

        let offset = src.offset();
        let code = src.read::<u8>()?;
        let code = if version.is_v5() {
            ConnectAckReason::try_from(code).map(ConnectAckCode::V5)
        } else {
            ConnectReturnCode::try_from(code).map(ConnectAckCode::V3)
        }
        .map_err(|e| DecodeError::malformed(offset, e))?;
        let properties = if version.is_v5() { Properties::decode(src)? } else { Properties::default() };

        Ok(ConnectAck { version, session_present: flags.contains(ConnectAckFlags::SESSION_PRESENT), code, properties })
    }

    fn encoded_size(&self) -> usize {
        if self.version.is_v5() {
            2 + self.properties.encoded_size()
        } else {
            2
        }
    }

    fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
        let mut flags = ConnectAckFlags::empty();
        flags.set(ConnectAckFlags::SESSION_PRESENT, self.session_present);
        dst.put_u8(flags.bits());
        dst.put_u8(self.code.into());
        if self.version.is_v5() {
            self.properties.encode(dst)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn decode_body<T: PacketBody>(version: ProtocolVersion, body: &'static [u8]) -> Result<T, DecodeError> {
        let mut src = Reader::new(Bytes::from_static(body), 2);
        let packet = T::decode(version, 0, &mut src)?;
        src.finish()?;
        Ok(packet)
    }

    fn encode_body<T: PacketBody>(packet: &T) -> BytesMut {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), packet.encoded_size());
        buf
    }

    #[test]
    fn test_decode_connect() {
        let body = b"\x00\x04MQTT\x04\xC0\x00\x3C\x00\x0512345\x00\x04user\x00\x04pass";
        let packet = decode_body::<Connect>(ProtocolVersion::V3_1_1, body).unwrap();
        assert_eq!(
            packet,
            Connect {
                version: ProtocolVersion::V3_1_1,
                clean_session: false,
                keep_alive: 60,
                properties: Properties::default(),
                client_id: ByteString::from_static("12345"),
                last_will: None,
                username: Some(ByteString::from_static("user")),
                password: Some(Bytes::from_static(b"pass")),
            }
        );
        assert_eq!(encode_body(&packet), body.as_ref());

        let body = b"\x00\x06MQIsdp\x03\x34\x00\x3C\x00\x0512345\x00\x05topic\x00\x07message";
        let packet = decode_body::<Connect>(ProtocolVersion::V3_1, body).unwrap();
        assert_eq!(
            packet.last_will,
            Some(LastWill {
                qos: QoS::ExactlyOnce,
                retain: true,
                properties: Properties::default(),
                topic: ByteString::from_static("topic"),
                message: Bytes::from_static(b"message"),
            })
        );
        assert_eq!(encode_body(&packet), body.as_ref());
    }

    #[test]
    fn test_decode_connect_v5() {
        let body = b"\x00\x04MQTT\x05\x06\x00\x0a\x05\x11\x00\x00\x00\x0a\x00\x00\x00\x00\x03a/b\x00\x00";
        let packet = decode_body::<Connect>(ProtocolVersion::V5_0, body).unwrap();
        assert!(packet.clean_session);
        assert!(packet.client_id.is_empty());
        assert_eq!(packet.properties, Properties::new(Bytes::from_static(b"\x11\x00\x00\x00\x0a")));
        let will = packet.last_will.as_ref().unwrap();
        assert_eq!(will.topic, "a/b");
        assert!(will.message.is_empty());
        assert_eq!(encode_body(&packet), body.as_ref());
    }

    #[test]
    fn test_connect_errors() {
        assert!(matches!(
            decode_body::<Connect>(ProtocolVersion::V3_1_1, b"\x00\x04MQAA\x04\x02\x00\x3C\x00\x00"),
            Err(DecodeError::MalformedPacket { offset: 2, reason: Malformed::InvalidProtocolName })
        ));
        assert!(matches!(
            decode_body::<Connect>(ProtocolVersion::V3_1, b"\x00\x04MQTT\x04\x02\x00\x3C\x00\x00"),
            Err(DecodeError::MalformedPacket { reason: Malformed::InvalidProtocolName, .. })
        ));
        assert!(matches!(
            decode_body::<Connect>(ProtocolVersion::V3_1_1, b"\x00\x04MQTT\x05\x02\x00\x3C\x00\x00"),
            Err(DecodeError::ProtocolError(Violation::ProtocolLevelMismatch { actual: 5, .. }))
        ));
        assert!(matches!(
            decode_body::<Connect>(ProtocolVersion::V3_1_1, b"\x00\x04MQTT\x04\x03\x00\x3C\x00\x00"),
            Err(DecodeError::MalformedPacket { offset: 9, reason: Malformed::ReservedBits { .. } })
        ));
        assert!(matches!(
            decode_body::<Connect>(ProtocolVersion::V3_1_1, b"\x00\x04MQTT\x04\x1e\x00\x3C\x00\x00"),
            Err(DecodeError::MalformedPacket { offset: 9, reason: Malformed::InvalidValue { field: "QoS", value: 3 } })
        ));
        assert!(matches!(
            decode_body::<Connect>(ProtocolVersion::V3_1_1, b"\x00\x04MQTT\x04\x22\x00\x3C\x00\x00"),
            Err(DecodeError::MalformedPacket { offset: 9, reason: Malformed::ReservedBits { .. } })
        ));
        assert!(matches!(
            decode_body::<Connect>(ProtocolVersion::V3_1_1, b"\x00\x04MQTT\x04\x42\x00\x3C\x00\x00\x00\x00"),
            Err(DecodeError::ProtocolError(Violation::PasswordWithoutUsername))
        ));
        assert!(matches!(
            decode_body::<Connect>(ProtocolVersion::V3_1_1, b"\x00\x04MQTT\x04\x00\x00\x3C\x00\x00"),
            Err(DecodeError::ProtocolError(Violation::InvalidClientId))
        ));
        assert!(matches!(
            decode_body::<Connect>(ProtocolVersion::V3_1_1, b"\x00\x04MQTT\x04\x06\x00\x3C\x00\x00\x00\x01#\x00\x00"),
            Err(DecodeError::MalformedPacket { offset: 14, .. })
        ));
    }

    #[test]
    fn test_connect_ack() {
        let packet = decode_body::<ConnectAck>(ProtocolVersion::V3_1_1, b"\x01\x04").unwrap();
        assert!(packet.session_present);
        assert_eq!(packet.code, ConnectAckCode::V3(ConnectReturnCode::BadUserNameOrPassword));
        assert!(!packet.code.is_success());
        assert_eq!(encode_body(&packet), b"\x01\x04".as_ref());

        assert!(matches!(
            decode_body::<ConnectAck>(ProtocolVersion::V3_1_1, b"\x03\x04"),
            Err(DecodeError::MalformedPacket { offset: 2, reason: Malformed::ReservedBits { .. } })
        ));
        assert!(matches!(
            decode_body::<ConnectAck>(ProtocolVersion::V3_1_1, b"\x00\x06"),
            Err(DecodeError::MalformedPacket { offset: 3, .. })
        ));

        let packet = decode_body::<ConnectAck>(ProtocolVersion::V5_0, b"\x00\x00\x03\x21\x00\x0a").unwrap();
        assert!(packet.code.is_success());
        assert_eq!(encode_body(&packet), b"\x00\x00\x03\x21\x00\x0a".as_ref());
        assert!(decode_body::<ConnectAck>(ProtocolVersion::V5_0, b"\x00\x00").is_err());
        assert_eq!(ConnectAck::new(ProtocolVersion::V5_0, true).code, ConnectAckCode::V5(ConnectAckReason::Success));
    }
}
