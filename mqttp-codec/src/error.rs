use std::io;

use crate::topic::TopicError;
use crate::types::DisconnectReasonCode;
use crate::version::ProtocolVersion;

/// Coarse classification of codec failures.
///
/// Callers should branch on the kind rather than on error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Buffer does not hold a complete packet yet, retry with more bytes.
    InsufficientData,
    /// The bytes violate the wire grammar.
    MalformedPacket,
    /// The bytes are well formed but break a protocol rule.
    ProtocolError,
    /// The packet type code is not defined for the protocol version.
    UnsupportedPacketType,
    /// The packet cannot be serialized into the given destination.
    EncodingError,
    /// Transport failure surfaced through the tokio-util adapter.
    Io,
}

/// Reasons a packet is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Malformed {
    #[error("variable byte integer longer than 4 bytes")]
    VarintOverlong,
    #[error("variable byte integer is not minimally encoded")]
    NonMinimalVarint,
    #[error("expected {needed} byte(s), {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("{remaining} unread byte(s) left in the packet body")]
    TrailingBytes { remaining: usize },
    #[error("invalid utf8 string")]
    InvalidUtf8,
    #[error("utf8 string contains a null character")]
    NullCharacter,
    #[error("{0}")]
    Topic(#[from] TopicError),
    #[error("invalid {field} value {value:#04x}")]
    InvalidValue { field: &'static str, value: u8 },
    #[error("fixed header flags {actual:#06b}, expected {expected:#06b}")]
    InvalidFlags { expected: u8, actual: u8 },
    #[error("reserved bits set in {field}, {value:#010b}")]
    ReservedBits { field: &'static str, value: u8 },
    #[error("invalid protocol name")]
    InvalidProtocolName,
    #[error("property {0:#04x} is not allowed in this packet")]
    UnexpectedProperty(u8),
}

/// Protocol rules broken by otherwise well-formed packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("at least one topic filter is required")]
    NoTopicFilters,
    #[error("at least one reason code is required")]
    NoReasonCodes,
    #[error("protocol level {actual} does not match MQTT {expected}")]
    ProtocolLevelMismatch { expected: ProtocolVersion, actual: u8 },
    #[error("password is set without a user name")]
    PasswordWithoutUsername,
    #[error("empty client id requires a clean session")]
    InvalidClientId,
    #[error("subscription identifier is set more than once")]
    DuplicateSubscriptionId,
    #[error("packet of {size} bytes exceeds the maximum of {max}")]
    PacketTooLarge { size: u32, max: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("insufficient data, {needed} more byte(s) required")]
    InsufficientData { needed: usize },
    #[error("malformed packet at offset {offset}, {reason}")]
    MalformedPacket { offset: usize, reason: Malformed },
    #[error("protocol error, {0}")]
    ProtocolError(#[from] Violation),
    #[error("unsupported packet type {code}")]
    UnsupportedPacketType { code: u8 },
    #[error("io error, {0}")]
    Io(#[from] io::Error),
}

impl DecodeError {
    #[inline]
    pub(crate) fn malformed(offset: usize, reason: impl Into<Malformed>) -> Self {
        DecodeError::MalformedPacket { offset, reason: reason.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::InsufficientData { .. } => ErrorKind::InsufficientData,
            DecodeError::MalformedPacket { .. } => ErrorKind::MalformedPacket,
            DecodeError::ProtocolError(_) => ErrorKind::ProtocolError,
            DecodeError::UnsupportedPacketType { .. } => ErrorKind::UnsupportedPacketType,
            DecodeError::Io(_) => ErrorKind::Io,
        }
    }

    /// MQTT 5 DISCONNECT reason code a server should send before closing the connection.
    ///
    /// `None` for errors that must not close the connection.
    pub fn reason_code(&self) -> Option<DisconnectReasonCode> {
        match self {
            DecodeError::InsufficientData { .. } | DecodeError::Io(_) => None,
            DecodeError::MalformedPacket { .. } => Some(DisconnectReasonCode::MalformedPacket),
            DecodeError::ProtocolError(Violation::PacketTooLarge { .. }) => {
                Some(DisconnectReasonCode::PacketTooLarge)
            }
            DecodeError::ProtocolError(_) | DecodeError::UnsupportedPacketType { .. } => {
                Some(DisconnectReasonCode::ProtocolError)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("destination holds {available} byte(s), {required} required")]
    BufferTooSmall { required: usize, available: usize },
    #[error("{field} of {value} exceeds the maximum of {max}")]
    OutOfRange { field: &'static str, value: usize, max: usize },
    #[error("packet id is required")]
    PacketIdRequired,
    #[error("packet type {code} is not defined for MQTT {version}")]
    UnsupportedPacketType { code: u8, version: ProtocolVersion },
    #[error("io error, {0}")]
    Io(#[from] io::Error),
}

impl EncodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncodeError::UnsupportedPacketType { .. } => ErrorKind::UnsupportedPacketType,
            EncodeError::Io(_) => ErrorKind::Io,
            _ => ErrorKind::EncodingError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::TopicError;

    #[test]
    fn test_error_kinds() {
        assert_eq!(DecodeError::InsufficientData { needed: 3 }.kind(), ErrorKind::InsufficientData);
        assert_eq!(DecodeError::malformed(4, Malformed::InvalidUtf8).kind(), ErrorKind::MalformedPacket);
        assert_eq!(DecodeError::from(Violation::NoTopicFilters).kind(), ErrorKind::ProtocolError);
        assert_eq!(DecodeError::UnsupportedPacketType { code: 0 }.kind(), ErrorKind::UnsupportedPacketType);
        assert_eq!(
            EncodeError::BufferTooSmall { required: 10, available: 2 }.kind(),
            ErrorKind::EncodingError
        );
        assert_eq!(
            EncodeError::UnsupportedPacketType { code: 15, version: ProtocolVersion::V3_1_1 }.kind(),
            ErrorKind::UnsupportedPacketType
        );
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(DecodeError::InsufficientData { needed: 1 }.reason_code(), None);
        assert_eq!(
            DecodeError::malformed(2, TopicError::Empty).reason_code(),
            Some(DisconnectReasonCode::MalformedPacket)
        );
        assert_eq!(
            DecodeError::from(Violation::NoTopicFilters).reason_code(),
            Some(DisconnectReasonCode::ProtocolError)
        );
        assert_eq!(
            DecodeError::from(Violation::PacketTooLarge { size: 10, max: 5 }).reason_code(),
            Some(DisconnectReasonCode::PacketTooLarge)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DecodeError::malformed(6, Malformed::InvalidValue { field: "QoS", value: 3 }).to_string(),
            "malformed packet at offset 6, invalid QoS value 0x03"
        );
        assert_eq!(
            EncodeError::BufferTooSmall { required: 39, available: 10 }.to_string(),
            "destination holds 10 byte(s), 39 required"
        );
    }
}
