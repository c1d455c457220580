use bytes::{BufMut, Bytes};
use bytestring::ByteString;

use super::properties::Properties;
use super::PacketBody;
use crate::error::{DecodeError, EncodeError, Malformed};
use crate::topic::validate_topic_name;
use crate::types::QoS;
use crate::utils::{Encode, Reader};
use crate::version::ProtocolVersion;

const DUP: u8 = 0b1000;
const QOS_MASK: u8 = 0b0110;
const RETAIN: u8 = 0b0001;

#[derive(Debug, PartialEq, Eq, Clone)]
/// Publish message
pub struct Publish {
    pub version: ProtocolVersion,
    /// this might be re-delivery of an earlier attempt to send the Packet.
    pub dup: bool,
    pub retain: bool,
    /// the level of assurance for delivery of an Application Message.
    pub qos: QoS,
    /// the information channel to which payload data is published.
    pub topic: ByteString,
    /// only present in PUBLISH Packets where the QoS level is 1 or 2.
    pub packet_id: Option<u16>,
    /// MQTT 5 only
    pub properties: Properties,
    /// the Application Message that is being published.
    pub payload: Bytes,
}

impl Publish {
    pub fn new<T: Into<ByteString>>(version: ProtocolVersion, topic: T, qos: QoS, payload: Bytes) -> Self {
        Publish {
            version,
            dup: false,
            retain: false,
            qos,
            topic: topic.into(),
            packet_id: None,
            properties: Properties::default(),
            payload,
        }
    }

    /// Fixed header flags carrying dup, QoS and retain.
    pub fn flags(&self) -> u8 {
        let mut flags = u8::from(self.qos) << 1;
        if self.dup {
            flags |= DUP;
        }
        if self.retain {
            flags |= RETAIN;
        }
        flags
    }
}

impl PacketBody for Publish {
    fn empty(version: ProtocolVersion) -> Self {
        Publish::new(version, ByteString::new(), QoS::AtMostOnce, Bytes::new())
    }

    fn decode(version: ProtocolVersion, flags: u8, src: &mut Reader) -> Result<Self, DecodeError> {
        let qos = QoS::try_from((flags & QOS_MASK) >> 1).map_err(|e| DecodeError::malformed(0, e))?;
        let dup = flags & DUP != 0;
        // DUP must be 0 for QoS 0 messages
        ensure!(
            !(dup && qos == QoS::AtMostOnce),
            DecodeError::malformed(0, Malformed::InvalidFlags { expected: flags & !DUP, actual: flags })
        );

        let offset = src.offset();
        let topic = src.read::<ByteString>()?;
        // an empty topic name refers to a MQTT 5 topic alias
        if !(version.is_v5() && topic.is_empty()) {
            validate_topic_name(&topic).map_err(|e| DecodeError::malformed(offset, e))?;
        }

        let packet_id = if qos == QoS::AtMostOnce { None } else { Some(src.read::<u16>()?) };
        let properties = if version.is_v5() { Properties::decode(src)? } else { Properties::default() };

        Ok(Publish {
            version,
            dup,
            retain: flags & RETAIN != 0,
            qos,
            topic,
            packet_id,
            properties,
            payload: src.take_rest(),
        })
    }

    fn encoded_size(&self) -> usize {
        let packet_id = if self.qos == QoS::AtMostOnce { 0 } else { 2 };
        let props = if self.version.is_v5() { self.properties.encoded_size() } else { 0 };
        self.topic.encoded_size() + packet_id + props + self.payload.len()
    }

    fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
        self.topic.encode(dst)?;
        if self.qos != QoS::AtMostOnce {
            self.packet_id.ok_or(EncodeError::PacketIdRequired)?.encode(dst)?;
        }
        if self.version.is_v5() {
            self.properties.encode(dst)?;
        }
        dst.put_slice(&self.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::TopicError;
    use bytes::BytesMut;

    fn decode_body(version: ProtocolVersion, flags: u8, body: &'static [u8]) -> Result<Publish, DecodeError> {
        let mut src = Reader::new(Bytes::from_static(body), 2);
        let packet = Publish::decode(version, flags, &mut src)?;
        src.finish()?;
        Ok(packet)
    }

    #[test]
    fn test_decode_publish() {
        let packet = decode_body(ProtocolVersion::V3_1_1, 0b1011, b"\x00\x03a/b\x43\x21data").unwrap();
        assert!(packet.dup);
        assert!(packet.retain);
        assert_eq!(packet.qos, QoS::AtLeastOnce);
        assert_eq!(packet.topic, "a/b");
        assert_eq!(packet.packet_id, Some(0x4321));
        assert_eq!(packet.payload, Bytes::from_static(b"data"));
        assert_eq!(packet.flags(), 0b1011);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf, b"\x00\x03a/b\x43\x21data".as_ref());
        assert_eq!(buf.len(), packet.encoded_size());

        let packet = decode_body(ProtocolVersion::V3_1_1, 0, b"\x00\x03a/b").unwrap();
        assert_eq!(packet.packet_id, None);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_decode_publish_v5() {
        let packet = decode_body(ProtocolVersion::V5_0, 0b0100, b"\x00\x00\x00\x01\x03\x23\x00\x01hi").unwrap();
        assert_eq!(packet.qos, QoS::ExactlyOnce);
        assert!(packet.topic.is_empty());
        assert_eq!(packet.properties.as_bytes(), &Bytes::from_static(b"\x23\x00\x01"));
        assert_eq!(packet.payload, Bytes::from_static(b"hi"));

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf, b"\x00\x00\x00\x01\x03\x23\x00\x01hi".as_ref());
    }

    #[test]
    fn test_publish_errors() {
        assert!(matches!(
            decode_body(ProtocolVersion::V3_1_1, 0b0110, b"\x00\x01a\x00\x01"),
            Err(DecodeError::MalformedPacket { offset: 0, reason: Malformed::InvalidValue { field: "QoS", value: 3 } })
        ));
        assert!(matches!(
            decode_body(ProtocolVersion::V3_1_1, 0b1000, b"\x00\x01a"),
            Err(DecodeError::MalformedPacket { offset: 0, reason: Malformed::InvalidFlags { .. } })
        ));
        assert!(matches!(
            decode_body(ProtocolVersion::V3_1_1, 0, b"\x00\x03a/+"),
            Err(DecodeError::MalformedPacket { offset: 2, reason: Malformed::Topic(TopicError::WildcardInTopicName) })
        ));
        assert!(matches!(
            decode_body(ProtocolVersion::V3_1_1, 0, b"\x00\x00"),
            Err(DecodeError::MalformedPacket { reason: Malformed::Topic(TopicError::Empty), .. })
        ));
        assert!(matches!(
            decode_body(ProtocolVersion::V3_1_1, 0b0010, b"\x00\x01a\x00"),
            Err(DecodeError::MalformedPacket { offset: 5, reason: Malformed::Truncated { .. } })
        ));
    }

    #[test]
    fn test_packet_id_required() {
        let packet = Publish::new(ProtocolVersion::V3_1_1, "a", QoS::AtLeastOnce, Bytes::new());
        let mut buf = BytesMut::new();
        assert!(matches!(packet.encode(&mut buf), Err(EncodeError::PacketIdRequired)));
    }
}
