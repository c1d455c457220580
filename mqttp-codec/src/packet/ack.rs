use bytes::BufMut;

use super::properties::{self, Properties};
use super::PacketBody;
use crate::error::{DecodeError, EncodeError, Malformed, Violation};
use crate::types::{PublishAck2Reason, PublishAckReason, SubscribeAckReason, UnsubscribeAckReason};
use crate::utils::{Encode, Reader};
use crate::version::ProtocolVersion;

/// PUBACK and PUBREC
///
/// `reason_code` and `properties` are MQTT 5 only and keep whether they were present
/// on the wire.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublishAck {
    pub version: ProtocolVersion,
    /// Packet Identifier
    pub packet_id: u16,
    pub reason_code: Option<PublishAckReason>,
    pub properties: Option<Properties>,
}

/// PUBREL and PUBCOMP
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublishAck2 {
    pub version: ProtocolVersion,
    /// Packet Identifier
    pub packet_id: u16,
    pub reason_code: Option<PublishAck2Reason>,
    pub properties: Option<Properties>,
}

macro_rules! publish_ack {
    ($name:ident) => {
        impl $name {
            pub fn new(version: ProtocolVersion, packet_id: u16) -> Self {
                $name { version, packet_id, reason_code: None, properties: None }
            }
        }

        impl PacketBody for $name {
            fn empty(version: ProtocolVersion) -> Self {
                $name::new(version, 0)
            }

            fn decode(version: ProtocolVersion, _flags: u8, src: &mut Reader) -> Result<Self, DecodeError> {
                let packet_id = src.read::<u16>()?;
                let (reason_code, properties) =
                    if version.is_v5() { properties::decode_reason_tail(src)? } else { (None, None) };
                Ok($name { version, packet_id, reason_code, properties })
            }

            fn encoded_size(&self) -> usize {
                if self.version.is_v5() {
                    2 + properties::reason_tail_size(&self.reason_code, &self.properties)
                } else {
                    2
                }
            }

            fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
                self.packet_id.encode(dst)?;
                if self.version.is_v5() {
                    properties::encode_reason_tail(&self.reason_code, &self.properties, dst)?;
                }
                Ok(())
            }
        }
    };
}

publish_ack!(PublishAck);
publish_ack!(PublishAck2);

/// Represents SUBACK packet
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SubscribeAck {
    pub version: ProtocolVersion,
    pub packet_id: u16,
    /// MQTT 5 only
    pub properties: Properties,
    /// corresponds to a Topic Filter in the SUBSCRIBE Packet being acknowledged.
    pub reason_codes: Vec<SubscribeAckReason>,
}

impl SubscribeAck {
    pub fn new(version: ProtocolVersion, packet_id: u16, reason_codes: Vec<SubscribeAckReason>) -> Self {
        SubscribeAck { version, packet_id, properties: Properties::default(), reason_codes }
    }
}

impl PacketBody for SubscribeAck {
    fn empty(version: ProtocolVersion) -> Self {
        SubscribeAck::new(version, 0, Vec::new())
    }

    fn decode(version: ProtocolVersion, _flags: u8, src: &mut Reader) -> Result<Self, DecodeError> {
        let packet_id = src.read::<u16>()?;
        let properties = if version.is_v5() { Properties::decode(src)? } else { Properties::default() };

        let mut reason_codes = Vec::with_capacity(src.remaining());
        while src.has_remaining() {
            let offset = src.offset();
            let code = src.read::<u8>()?;
            let reason = SubscribeAckReason::try_from(code)
                .ok()
                .filter(|r| version.is_v5() || r.is_v3())
                .ok_or_else(|| {
                    DecodeError::malformed(offset, Malformed::InvalidValue { field: "SubscribeAckReason", value: code })
                })?;
            reason_codes.push(reason);
        }
        ensure!(!reason_codes.is_empty(), Violation::NoReasonCodes.into());

        Ok(SubscribeAck { version, packet_id, properties, reason_codes })
    }

    fn encoded_size(&self) -> usize {
        let props = if self.version.is_v5() { self.properties.encoded_size() } else { 0 };
        2 + props + self.reason_codes.len()
    }

    fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
        self.packet_id.encode(dst)?;
        if self.version.is_v5() {
            self.properties.encode(dst)?;
        }
        for &reason in &self.reason_codes {
            dst.put_u8(reason.into());
        }
        Ok(())
    }
}

/// Represents UNSUBACK packet
///
/// MQTT 3.x carries the packet identifier only, `properties` and `reason_codes` are
/// MQTT 5 only.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct UnsubscribeAck {
    pub version: ProtocolVersion,
    pub packet_id: u16,
    pub properties: Properties,
    pub reason_codes: Vec<UnsubscribeAckReason>,
}

impl UnsubscribeAck {
    pub fn new(version: ProtocolVersion, packet_id: u16) -> Self {
        UnsubscribeAck { version, packet_id, properties: Properties::default(), reason_codes: Vec::new() }
    }
}

impl PacketBody for UnsubscribeAck {
    fn empty(version: ProtocolVersion) -> Self {
        UnsubscribeAck::new(version, 0)
    }

    fn decode(version: ProtocolVersion, _flags: u8, src: &mut Reader) -> Result<Self, DecodeError> {
        let packet_id = src.read::<u16>()?;
        if !version.is_v5() {
            return Ok(UnsubscribeAck::new(version, packet_id));
        }

        let properties = Properties::decode(src)?;
        let mut reason_codes = Vec::with_capacity(src.remaining());
        while src.has_remaining() {
            let offset = src.offset();
            let reason =
                UnsubscribeAckReason::try_from(src.read::<u8>()?).map_err(|e| DecodeError::malformed(offset, e))?;
            reason_codes.push(reason);
        }
        ensure!(!reason_codes.is_empty(), Violation::NoReasonCodes.into());

        Ok(UnsubscribeAck { version, packet_id, properties, reason_codes })
    }

    fn encoded_size(&self) -> usize {
        if self.version.is_v5() {
            2 + self.properties.encoded_size() + self.reason_codes.len()
        } else {
            2
        }
    }

    fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
        self.packet_id.encode(dst)?;
        if self.version.is_v5() {
            self.properties.encode(dst)?;
            for &reason in &self.reason_codes {
                dst.put_u8(reason.into());
            }
        }
        Ok(())
    }
}
