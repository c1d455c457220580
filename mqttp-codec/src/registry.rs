//! Per protocol version dispatch table from packet type code to payload codec.
//!
//! The tables are immutable statics, so several protocol versions can be decoded
//! side by side in the same process.

use bytes::{BufMut, Bytes};

use crate::error::{DecodeError, EncodeError, Malformed};
use crate::header::{encode_fixed_header, FixedHeader};
use crate::packet::*;
use crate::types::PacketType;
use crate::utils::Reader;
use crate::version::ProtocolVersion;

/// Fixed header flags a packet type accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagRule {
    /// flags must equal the value
    Exact(u8),
    /// flags carry packet fields, PUBLISH only
    Any,
}

impl FlagRule {
    pub fn check(self, flags: u8) -> Result<(), Malformed> {
        match self {
            FlagRule::Exact(expected) if expected != flags => Err(Malformed::InvalidFlags { expected, actual: flags }),
            _ => Ok(()),
        }
    }
}

/// Decode and encode functions of one packet type.
#[derive(Clone, Copy)]
pub struct PayloadCodec {
    packet_type: PacketType,
    flags: FlagRule,
    construct: fn(ProtocolVersion) -> Packet,
    decode: fn(ProtocolVersion, u8, &mut Reader) -> Result<Packet, DecodeError>,
    encode: fn(&Packet, &mut dyn BufMut) -> Result<(), EncodeError>,
}

impl PayloadCodec {
    #[inline]
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    #[inline]
    pub fn flags(&self) -> FlagRule {
        self.flags
    }
}

impl std::fmt::Debug for PayloadCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec").field("packet_type", &self.packet_type).field("flags", &self.flags).finish()
    }
}

fn mismatch(packet: &Packet) -> EncodeError {
    EncodeError::UnsupportedPacketType {
        code: packet.packet_type().into(),
        version: packet.version().unwrap_or_default(),
    }
}

macro_rules! codec {
    ($variant:ident) => {
        PayloadCodec {
            packet_type: PacketType::$variant,
            flags: FlagRule::Exact(0),
            construct: |_| Packet::$variant,
            decode: |_, _, _| Ok(Packet::$variant),
            encode: |_, _| Ok(()),
        }
    };
    ($variant:ident, $body:ty, $flags:expr) => {
        PayloadCodec {
            packet_type: PacketType::$variant,
            flags: $flags,
            construct: |version| Packet::$variant(<$body as PacketBody>::empty(version).into()),
            decode: |version, flags, src| {
                Ok(Packet::$variant(<$body as PacketBody>::decode(version, flags, src)?.into()))
            },
            encode: |packet, dst| match packet {
                Packet::$variant(body) => body.encode(dst),
                packet => Err(mismatch(packet)),
            },
        }
    };
}

macro_rules! table {
    ($version:expr, $auth:expr) => {
        Registry {
            version: $version,
            codecs: [
                None,
                Some(codec!(Connect, Connect, FlagRule::Exact(0))),
                Some(codec!(ConnectAck, ConnectAck, FlagRule::Exact(0))),
                Some(codec!(Publish, Publish, FlagRule::Any)),
                Some(codec!(PublishAck, PublishAck, FlagRule::Exact(0))),
                Some(codec!(PublishReceived, PublishAck, FlagRule::Exact(0))),
                Some(codec!(PublishRelease, PublishAck2, FlagRule::Exact(0b0010))),
                Some(codec!(PublishComplete, PublishAck2, FlagRule::Exact(0))),
                Some(codec!(Subscribe, Subscribe, FlagRule::Exact(0b0010))),
                Some(codec!(SubscribeAck, SubscribeAck, FlagRule::Exact(0))),
                Some(codec!(Unsubscribe, Unsubscribe, FlagRule::Exact(0b0010))),
                Some(codec!(UnsubscribeAck, UnsubscribeAck, FlagRule::Exact(0))),
                Some(codec!(PingRequest)),
                Some(codec!(PingResponse)),
                Some(codec!(Disconnect, Disconnect, FlagRule::Exact(0))),
                $auth,
            ],
        }
    };
}

static V3_1: Registry = table!(ProtocolVersion::V3_1, None);
static V3_1_1: Registry = table!(ProtocolVersion::V3_1_1, None);
static V5_0: Registry = table!(ProtocolVersion::V5_0, Some(codec!(Auth, Auth, FlagRule::Exact(0))));

/// Packet types defined for one protocol version, indexed by type code.
#[derive(Debug)]
pub struct Registry {
    version: ProtocolVersion,
    codecs: [Option<PayloadCodec>; 16],
}

impl Registry {
    pub fn for_version(version: ProtocolVersion) -> &'static Registry {
        match version {
            ProtocolVersion::V3_1 => &V3_1,
            ProtocolVersion::V3_1_1 => &V3_1_1,
            ProtocolVersion::V5_0 => &V5_0,
        }
    }

    #[inline]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Payload codec of the packet type `code`.
    pub fn dispatch(&self, code: u8) -> Result<&PayloadCodec, DecodeError> {
        self.codecs
            .get(code as usize)
            .and_then(Option::as_ref)
            .ok_or(DecodeError::UnsupportedPacketType { code })
    }

    /// Fixed header flags accepted for `packet_type`, `None` when the type is not defined.
    pub fn permitted_flags(&self, packet_type: PacketType) -> Option<FlagRule> {
        self.dispatch(packet_type.into()).ok().map(|c| c.flags)
    }

    /// Empty packet of `packet_type`.
    pub fn construct(&self, packet_type: PacketType) -> Result<Packet, EncodeError> {
        let codec = self.encoder(packet_type)?;
        Ok((codec.construct)(self.version))
    }

    /// Decodes one packet from the start of `src`.
    ///
    /// Returns the packet and the number of bytes it occupies, bytes after it are left
    /// untouched.
    pub fn decode(&self, src: &[u8]) -> Result<(Packet, usize), DecodeError> {
        let (header, header_len) = FixedHeader::decode(src)?;
        let end = header_len + header.remaining_length as usize;
        let body = Bytes::copy_from_slice(&src[header_len..end]);
        let packet = self.decode_body(header, header_len, body)?;
        Ok((packet, end))
    }

    /// Decodes a packet body whose fixed header is already read.
    pub(crate) fn decode_body(
        &self,
        header: FixedHeader,
        header_len: usize,
        body: Bytes,
    ) -> Result<Packet, DecodeError> {
        let result = self.dispatch(header.packet_type.into()).and_then(|codec| {
            codec.flags.check(header.flags).map_err(|e| DecodeError::malformed(0, e))?;
            let mut src = Reader::new(body, header_len);
            let packet = (codec.decode)(self.version, header.flags, &mut src)?;
            src.finish()?;
            Ok(packet)
        });

        match &result {
            Ok(_) => log::trace!("decoded {} packet, {} bytes", header.packet_type.name(), header.packet_len()),
            Err(e) => log::debug!("failed to decode MQTT {} {} packet: {}", self.version, header.packet_type.name(), e),
        }
        result
    }

    /// Writes `packet` with its fixed header, returns the number of bytes written.
    ///
    /// `dst` must have room for [`Packet::encoded_len`] bytes.
    pub fn encode(&self, packet: &Packet, dst: &mut dyn BufMut) -> Result<usize, EncodeError> {
        let codec = self.encoder(packet.packet_type())?;
        let flags = match (codec.flags, packet) {
            (FlagRule::Exact(flags), _) => flags,
            (FlagRule::Any, Packet::Publish(p)) => p.flags(),
            (FlagRule::Any, packet) => return Err(mismatch(packet)),
        };
        let body_len = packet.as_body().map_or(0, |b| b.encoded_size());
        let header_len = encode_fixed_header(codec.packet_type, flags, body_len, dst)?;
        (codec.encode)(packet, dst)?;
        Ok(header_len + body_len)
    }

    fn encoder(&self, packet_type: PacketType) -> Result<&PayloadCodec, EncodeError> {
        self.dispatch(packet_type.into())
            .map_err(|_| EncodeError::UnsupportedPacketType { code: packet_type.into(), version: self.version })
    }
}
