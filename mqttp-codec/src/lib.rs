#![deny(unsafe_code)]

//! MQTT control packet codec for the v3.1, v3.1.1 and v5.0 protocols
//!
//! ## Core Features:
//! - **Version explicit**: every decode call takes the [`ProtocolVersion`], there is no process wide default
//! - **Dispatch tables**: one immutable [`Registry`] per protocol version maps type codes to payload codecs
//! - **Validated topics**: SUBSCRIBE and UNSUBSCRIBE filters are checked once, when decoded or added
//! - **Classified errors**: callers branch on [`ErrorKind`], malformed packets report the offending byte offset
//! - **Tokio Integration**: framing through `tokio_util::codec` with [`Codec`] and [`VersionCodec`]
//!
//! ```
//! use mqttp_codec::{decode, encode_to, Packet, ProtocolVersion};
//!
//! let src = b"\x82\x0a\x00\x07\x00\x05a/b/#\x01";
//! let (packet, consumed) = decode(ProtocolVersion::V3_1_1, src).unwrap();
//! assert_eq!(consumed, src.len());
//! if let Packet::Subscribe(ref subscribe) = packet {
//!     assert_eq!(subscribe.topics()[0].filter(), "a/b/#");
//! }
//!
//! let mut buf = bytes::BytesMut::new();
//! encode_to(&packet, &mut buf).unwrap();
//! assert_eq!(&buf[..], &src[..]);
//! ```

#[macro_use]
mod utils;

/// `tokio_util::codec` framing
pub mod codec;
/// Codec settings
pub mod config;
/// Error types for encoding/decoding operations
pub mod error;
/// Fixed header and remaining length
pub mod header;
/// Control packets of all protocol versions
pub mod packet;
/// Packet type dispatch tables
pub mod registry;
/// Topic filter and topic name validation
pub mod topic;
/// Shared types and constants for MQTT protocol
pub mod types;
/// Protocol versions and version detection
pub mod version;

use bytes::BytesMut;

pub use self::codec::{Codec, VersionCodec};
pub use self::config::CodecConfig;
pub use self::error::{DecodeError, EncodeError, ErrorKind, Malformed, Violation};
pub use self::header::{decode_remaining_length, encode_fixed_header, encode_remaining_length, FixedHeader};
pub use self::packet::Packet;
pub use self::registry::{FlagRule, PayloadCodec, Registry};
pub use self::topic::{validate_filter, validate_topic_name, SubscriptionOptions, TopicError, TopicFilter};
pub use self::types::{PacketType, QoS};
pub use self::utils::MAX_VARIABLE_LENGTH;
pub use self::version::ProtocolVersion;

/// Decodes one packet from the start of `src`.
///
/// Returns the packet and the number of bytes it occupies. `InsufficientData` means `src`
/// holds an incomplete packet, retry with more bytes from the same position.
pub fn decode(version: ProtocolVersion, src: &[u8]) -> Result<(Packet, usize), DecodeError> {
    Registry::for_version(version).decode(src)
}

/// Encodes `packet` at the start of `dst`, returns the number of bytes written.
///
/// Nothing is written when `dst` is too small.
pub fn encode(packet: &Packet, dst: &mut [u8]) -> Result<usize, EncodeError> {
    let required = packet.encoded_len()?;
    ensure!(required <= dst.len(), EncodeError::BufferTooSmall { required, available: dst.len() });
    let mut buf: &mut [u8] = dst;
    registry_for(packet).encode(packet, &mut buf)
}

/// Appends `packet` to `dst`, growing it as needed.
pub fn encode_to(packet: &Packet, dst: &mut BytesMut) -> Result<usize, EncodeError> {
    dst.reserve(packet.encoded_len()?);
    registry_for(packet).encode(packet, dst)
}

#[inline]
fn registry_for(packet: &Packet) -> &'static Registry {
    Registry::for_version(packet.version().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Disconnect, PublishAck};

    #[test]
    fn test_encode_into_slice() {
        let packet = Packet::PublishAck(PublishAck::new(ProtocolVersion::V3_1_1, 0x0102));
        let mut buf = [0u8; 8];
        assert_eq!(encode(&packet, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"\x40\x02\x01\x02");

        let mut buf = [0u8; 3];
        let err = encode(&packet, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodingError);
        assert!(matches!(err, EncodeError::BufferTooSmall { required: 4, available: 3 }));
        assert_eq!(buf, [0u8; 3]);
    }

    #[test]
    fn test_decode_leaves_following_bytes() {
        let (packet, consumed) = decode(ProtocolVersion::V5_0, b"\xe0\x00\xc0\x00").unwrap();
        assert_eq!(packet, Packet::Disconnect(Disconnect::new(ProtocolVersion::V5_0)));
        assert_eq!(consumed, 2);

        let mut buf = BytesMut::new();
        assert_eq!(encode_to(&packet, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..], b"\xe0\x00");
    }
}
