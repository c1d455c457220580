use bytes::BufMut;

use super::properties::{self, Properties};
use super::PacketBody;
use crate::error::{DecodeError, EncodeError};
use crate::types::{AuthReasonCode, DisconnectReasonCode};
use crate::utils::Reader;
use crate::version::ProtocolVersion;

/// DISCONNECT
///
/// The body is empty in MQTT 3.x. In MQTT 5 an absent reason code means normal
/// disconnection, absent properties an empty property block.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Disconnect {
    pub version: ProtocolVersion,
    pub reason_code: Option<DisconnectReasonCode>,
    pub properties: Option<Properties>,
}

impl Disconnect {
    pub fn new(version: ProtocolVersion) -> Self {
        Disconnect { version, reason_code: None, properties: None }
    }

    #[inline]
    pub fn reason(&self) -> DisconnectReasonCode {
        self.reason_code.unwrap_or(DisconnectReasonCode::NormalDisconnection)
    }
}

impl PacketBody for Disconnect {
    fn empty(version: ProtocolVersion) -> Self {
        Disconnect::new(version)
    }

    fn decode(version: ProtocolVersion, _flags: u8, src: &mut Reader) -> Result<Self, DecodeError> {
        let (reason_code, properties) =
            if version.is_v5() { properties::decode_reason_tail(src)? } else { (None, None) };
        Ok(Disconnect { version, reason_code, properties })
    }

    fn encoded_size(&self) -> usize {
        if self.version.is_v5() {
            properties::reason_tail_size(&self.reason_code, &self.properties)
        } else {
            0
        }
    }

    fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
        if self.version.is_v5() {
            properties::encode_reason_tail(&self.reason_code, &self.properties, dst)?;
        }
        Ok(())
    }
}

/// AUTH, MQTT 5 only
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Auth {
    pub reason_code: Option<AuthReasonCode>,
    pub properties: Option<Properties>,
}

impl PacketBody for Auth {
    fn empty(_version: ProtocolVersion) -> Self {
        Auth::default()
    }

    fn decode(_version: ProtocolVersion, _flags: u8, src: &mut Reader) -> Result<Self, DecodeError> {
        let (reason_code, properties) = properties::decode_reason_tail(src)?;
        Ok(Auth { reason_code, properties })
    }

    fn encoded_size(&self) -> usize {
        properties::reason_tail_size(&self.reason_code, &self.properties)
    }

    fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
        properties::encode_reason_tail(&self.reason_code, &self.properties, dst)
    }
}
