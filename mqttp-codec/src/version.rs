use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Malformed};
use crate::header::FixedHeader;
use crate::types::PacketType;

pub(crate) const MQTT: &[u8] = b"MQTT";
pub(crate) const MQISDP: &[u8] = b"MQIsdp";
pub const MQTT_LEVEL_31: u8 = 3;
pub const MQTT_LEVEL_311: u8 = 4;
pub const MQTT_LEVEL_5: u8 = 5;

/// Protocol version selecting the grammar variant used for decoding and encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub enum ProtocolVersion {
    /// MQTT 3.1, protocol name `MQIsdp`
    #[serde(rename = "3.1")]
    V3_1,
    /// MQTT 3.1.1
    #[default]
    #[serde(rename = "3.1.1")]
    V3_1_1,
    /// MQTT 5.0
    #[serde(rename = "5.0")]
    V5_0,
}

impl ProtocolVersion {
    /// Protocol level byte carried by CONNECT.
    #[inline]
    pub fn level(self) -> u8 {
        match self {
            ProtocolVersion::V3_1 => MQTT_LEVEL_31,
            ProtocolVersion::V3_1_1 => MQTT_LEVEL_311,
            ProtocolVersion::V5_0 => MQTT_LEVEL_5,
        }
    }

    #[inline]
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            MQTT_LEVEL_31 => Some(ProtocolVersion::V3_1),
            MQTT_LEVEL_311 => Some(ProtocolVersion::V3_1_1),
            MQTT_LEVEL_5 => Some(ProtocolVersion::V5_0),
            _ => None,
        }
    }

    /// Protocol name carried by CONNECT.
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            ProtocolVersion::V3_1 => "MQIsdp",
            _ => "MQTT",
        }
    }

    #[inline]
    pub fn is_v5(self) -> bool {
        self == ProtocolVersion::V5_0
    }

    /// Reads the protocol version announced by a CONNECT packet at the start of `src`.
    ///
    /// Only the fixed header, protocol name and level are inspected, so this works
    /// before the version specific decoder is chosen.
    pub fn probe(src: &[u8]) -> Result<ProtocolVersion, DecodeError> {
        let (header, consumed) = FixedHeader::parse(src)?;
        if header.packet_type != PacketType::Connect {
            return Err(DecodeError::UnsupportedPacketType { code: header.packet_type.into() });
        }

        let name_len = match src.get(consumed..consumed + 2) {
            Some(len) => u16::from_be_bytes([len[0], len[1]]) as usize,
            None => return Err(DecodeError::InsufficientData { needed: consumed + 2 - src.len() }),
        };
        ensure!(
            name_len == MQTT.len() || name_len == MQISDP.len(),
            DecodeError::malformed(consumed, Malformed::InvalidProtocolName)
        );
        let level_at = consumed + 2 + name_len;
        if src.len() <= level_at {
            return Err(DecodeError::InsufficientData { needed: level_at + 1 - src.len() });
        }

        // protocol name must be "MQTT" or "MQIsdp"
        let name = &src[consumed + 2..level_at];
        ensure!(name == MQTT || name == MQISDP, DecodeError::malformed(consumed, Malformed::InvalidProtocolName));

        let level = src[level_at];
        match ProtocolVersion::from_level(level) {
            Some(version) if version.name().as_bytes() == name => Ok(version),
            _ => Err(DecodeError::malformed(level_at, Malformed::InvalidValue { field: "protocol level", value: level })),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V3_1 => f.write_str("3.1"),
            ProtocolVersion::V3_1_1 => f.write_str("3.1.1"),
            ProtocolVersion::V5_0 => f.write_str("5.0"),
        }
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = Malformed;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        ProtocolVersion::from_level(level).ok_or(Malformed::InvalidValue { field: "protocol level", value: level })
    }
}
