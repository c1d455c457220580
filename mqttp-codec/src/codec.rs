//! `tokio_util::codec` framing over the registry.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::config::CodecConfig;
use crate::error::{DecodeError, EncodeError, Violation};
use crate::header::FixedHeader;
use crate::packet::Packet;
use crate::registry::Registry;
use crate::version::ProtocolVersion;

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    FrameHeader,
    Frame(FixedHeader, usize),
}

/// Framed codec for one protocol version.
///
/// Decoded items carry the packet and its remaining length.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: &'static Registry,
    state: DecodeState,
    max_size: u32,
}

impl Codec {
    /// Create `Codec` instance
    ///
    /// If max size is set to `0`, size is unlimited.
    pub fn new(version: ProtocolVersion, max_size: u32) -> Self {
        Codec { registry: Registry::for_version(version), state: DecodeState::FrameHeader, max_size }
    }

    pub fn from_config(config: &CodecConfig) -> Self {
        Codec::new(config.version, config.max_packet_size)
    }

    #[inline]
    pub fn version(&self) -> ProtocolVersion {
        self.registry.version()
    }

    /// Switches the protocol version, e.g. after a CONNECT negotiated it.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.registry = Registry::for_version(version);
    }

    #[inline]
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Set max inbound remaining length.
    ///
    /// If max size is set to `0`, size is unlimited.
    pub fn set_max_size(&mut self, size: u32) {
        self.max_size = size;
    }
}

impl Default for Codec {
    fn default() -> Self {
        Codec::from_config(&CodecConfig::default())
    }
}

impl Decoder for Codec {
    type Item = (Packet, u32);
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, DecodeError> {
        loop {
            match self.state {
                DecodeState::FrameHeader => {
                    let (header, header_len) = match FixedHeader::parse(src) {
                        Ok(res) => res,
                        Err(DecodeError::InsufficientData { .. }) => return Ok(None),
                        Err(e) => return Err(e),
                    };
                    if self.max_size != 0 && header.remaining_length > self.max_size {
                        log::debug!(
                            "packet too large, max-size: {}, remaining: {}",
                            self.max_size,
                            header.remaining_length
                        );
                        return Err(Violation::PacketTooLarge { size: header.remaining_length, max: self.max_size }.into());
                    }
                    self.state = DecodeState::Frame(header, header_len);
                }
                DecodeState::Frame(header, header_len) => {
                    let len = header.packet_len();
                    if src.len() < len {
                        src.reserve(len - src.len());
                        return Ok(None);
                    }
                    self.state = DecodeState::FrameHeader;
                    let mut frame = src.split_to(len);
                    let body = frame.split_off(header_len).freeze();
                    let packet = self.registry.decode_body(header, header_len, body)?;
                    return Ok(Some((packet, header.remaining_length)));
                }
            }
        }
    }
}

impl Encoder<Packet> for Codec {
    type Error = EncodeError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), EncodeError> {
        dst.reserve(item.encoded_len()?);
        self.registry.encode(&item, dst)?;
        Ok(())
    }
}

/// Reads the protocol version from the first CONNECT of a connection.
///
/// Nothing is consumed, the CONNECT is then decoded by a [`Codec`] for that version.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionCodec;

impl Decoder for VersionCodec {
    type Item = ProtocolVersion;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, DecodeError> {
        match ProtocolVersion::probe(src) {
            Ok(version) => Ok(Some(version)),
            Err(DecodeError::InsufficientData { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Malformed;
    use crate::packet::PublishAck;
    use crate::types::QoS;

    #[test]
    fn test_decode_frames() {
        let mut codec = Codec::new(ProtocolVersion::V3_1_1, 0);
        let mut buf = BytesMut::from(b"\x40".as_ref());
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\x02\x00");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\x09\xc0\x00\xd0");
        let (packet, remaining) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet, Packet::PublishAck(PublishAck::new(ProtocolVersion::V3_1_1, 9)));
        assert_eq!(remaining, 2);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some((Packet::PingRequest, 0)));
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.as_ref(), b"\xd0");
    }

    #[test]
    fn test_max_size() {
        let mut codec = Codec::from_config(&CodecConfig::new(ProtocolVersion::V3_1_1).max_packet_size(4));
        let mut buf = BytesMut::from(b"\x30\x05".as_ref());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(DecodeError::ProtocolError(Violation::PacketTooLarge { size: 5, max: 4 }))
        ));

        codec.set_max_size(0);
        assert_eq!(codec.max_size(), 0);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_error() {
        let mut codec = Codec::default();
        let mut buf = BytesMut::from(b"\x30\x03\x00\x01+".as_ref());
        assert!(matches!(codec.decode(&mut buf), Err(DecodeError::MalformedPacket { offset: 2, .. })));

        let mut buf = BytesMut::from(b"\x10\xff\xff\xff\xff\x01".as_ref());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(DecodeError::MalformedPacket { offset: 1, reason: Malformed::VarintOverlong })
        ));
    }

    #[test]
    fn test_encode() {
        let mut codec = Codec::new(ProtocolVersion::V5_0, 0);
        let mut buf = BytesMut::new();
        let mut publish = crate::packet::Publish::new(ProtocolVersion::V5_0, "a", QoS::AtLeastOnce, "hi".into());
        publish.packet_id = Some(3);
        codec.encode(publish.clone().into(), &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"\x32\x08\x00\x01a\x00\x03\x00hi");

        let (packet, _) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet, Packet::Publish(publish));
        assert!(buf.is_empty());

        codec.set_version(ProtocolVersion::V3_1_1);
        assert_eq!(codec.version(), ProtocolVersion::V3_1_1);
        assert!(matches!(
            codec.encode(Packet::Auth(Default::default()), &mut buf),
            Err(EncodeError::UnsupportedPacketType { code: 15, .. })
        ));
    }

    #[test]
    fn test_version_codec() {
        let mut buf = BytesMut::from(b"\x10\x0d\x00\x04MQ".as_ref());
        assert!(VersionCodec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"TT\x05\x02\x00\x3c\x00\x00\x00");
        assert_eq!(VersionCodec.decode(&mut buf).unwrap(), Some(ProtocolVersion::V5_0));
        assert_eq!(buf.len(), 15);

        let mut buf = BytesMut::from(b"\x30\x00".as_ref());
        assert!(matches!(VersionCodec.decode(&mut buf), Err(DecodeError::UnsupportedPacketType { code: 3 })));
    }
}
