use bytes::BufMut;

use crate::error::{DecodeError, EncodeError};
use crate::registry::Registry;
use crate::types::{PacketType, QoS};
use crate::utils::{var_int_len, Reader};
use crate::version::ProtocolVersion;

mod ack;
mod connect;
mod disconnect;
mod properties;
mod publish;
mod subscribe;

pub use ack::*;
pub use connect::*;
pub use disconnect::*;
pub use properties::{Properties, SubscribeProperty, UserProperty};
pub use publish::*;
pub use subscribe::*;

/// Body of a control packet, everything after the fixed header.
pub(crate) trait PacketBody {
    /// Empty body for `version`, used to construct packets by type.
    fn empty(version: ProtocolVersion) -> Self
    where
        Self: Sized;

    /// Decodes the body, `flags` is the already checked low nibble of the fixed header.
    fn decode(version: ProtocolVersion, flags: u8, src: &mut Reader) -> Result<Self, DecodeError>
    where
        Self: Sized;

    /// Remaining length of the packet.
    fn encoded_size(&self) -> usize;

    fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError>;
}

#[derive(Debug, PartialEq, Eq, Clone)]
/// MQTT Control Packets
pub enum Packet {
    /// Client request to connect to Server
    Connect(Box<Connect>),
    /// Connect acknowledgment
    ConnectAck(ConnectAck),
    /// Publish message
    Publish(Publish),
    /// Publish acknowledgment
    PublishAck(PublishAck),
    /// Publish received (assured delivery part 1)
    PublishReceived(PublishAck),
    /// Publish release (assured delivery part 2)
    PublishRelease(PublishAck2),
    /// Publish complete (assured delivery part 3)
    PublishComplete(PublishAck2),
    /// Client subscribe request
    Subscribe(Subscribe),
    /// Subscribe acknowledgment
    SubscribeAck(SubscribeAck),
    /// Unsubscribe request
    Unsubscribe(Unsubscribe),
    /// Unsubscribe acknowledgment
    UnsubscribeAck(UnsubscribeAck),
    /// PING request
    PingRequest,
    /// PING response
    PingResponse,
    /// Disconnection is advertised
    Disconnect(Disconnect),
    /// Auth exchange, MQTT 5 only
    Auth(Auth),
}

impl Packet {
    /// Empty packet of type `packet_type`, fails when the type is not defined for `version`.
    pub fn new(version: ProtocolVersion, packet_type: PacketType) -> Result<Packet, EncodeError> {
        Registry::for_version(version).construct(packet_type)
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnectAck(_) => PacketType::ConnectAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PublishAck(_) => PacketType::PublishAck,
            Packet::PublishReceived(_) => PacketType::PublishReceived,
            Packet::PublishRelease(_) => PacketType::PublishRelease,
            Packet::PublishComplete(_) => PacketType::PublishComplete,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubscribeAck(_) => PacketType::SubscribeAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubscribeAck(_) => PacketType::UnsubscribeAck,
            Packet::PingRequest => PacketType::PingRequest,
            Packet::PingResponse => PacketType::PingResponse,
            Packet::Disconnect(_) => PacketType::Disconnect,
            Packet::Auth(_) => PacketType::Auth,
        }
    }

    /// Protocol version the packet is encoded for.
    ///
    /// PINGREQ and PINGRESP are identical in every version and return `None`.
    pub fn version(&self) -> Option<ProtocolVersion> {
        match self {
            Packet::Connect(p) => Some(p.version),
            Packet::ConnectAck(p) => Some(p.version),
            Packet::Publish(p) => Some(p.version),
            Packet::PublishAck(p) | Packet::PublishReceived(p) => Some(p.version),
            Packet::PublishRelease(p) | Packet::PublishComplete(p) => Some(p.version),
            Packet::Subscribe(p) => Some(p.version),
            Packet::SubscribeAck(p) => Some(p.version),
            Packet::Unsubscribe(p) => Some(p.version),
            Packet::UnsubscribeAck(p) => Some(p.version),
            Packet::Disconnect(p) => Some(p.version),
            Packet::Auth(_) => Some(ProtocolVersion::V5_0),
            Packet::PingRequest | Packet::PingResponse => None,
        }
    }

    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Packet::Publish(p) => p.packet_id,
            Packet::PublishAck(p) | Packet::PublishReceived(p) => Some(p.packet_id),
            Packet::PublishRelease(p) | Packet::PublishComplete(p) => Some(p.packet_id),
            Packet::Subscribe(p) => Some(p.packet_id),
            Packet::SubscribeAck(p) => Some(p.packet_id),
            Packet::Unsubscribe(p) => Some(p.packet_id),
            Packet::UnsubscribeAck(p) => Some(p.packet_id),
            _ => None,
        }
    }

    /// Sets the packet identifier, returns `false` when the packet carries none.
    ///
    /// A QoS 0 PUBLISH has no packet identifier.
    pub fn set_packet_id(&mut self, id: u16) -> bool {
        match self {
            Packet::Publish(p) if p.qos != QoS::AtMostOnce => p.packet_id = Some(id),
            Packet::PublishAck(p) | Packet::PublishReceived(p) => p.packet_id = id,
            Packet::PublishRelease(p) | Packet::PublishComplete(p) => p.packet_id = id,
            Packet::Subscribe(p) => p.packet_id = id,
            Packet::SubscribeAck(p) => p.packet_id = id,
            Packet::Unsubscribe(p) => p.packet_id = id,
            Packet::UnsubscribeAck(p) => p.packet_id = id,
            _ => return false,
        }
        true
    }

    /// Size of the encoded packet, fixed header included.
    pub fn encoded_len(&self) -> Result<usize, EncodeError> {
        let body = self.as_body().map_or(0, |b| b.encoded_size());
        Ok(1 + var_int_len(body)? + body)
    }

    pub(crate) fn as_body(&self) -> Option<&dyn PacketBody> {
        let body: &dyn PacketBody = match self {
            Packet::Connect(p) => &**p,
            Packet::ConnectAck(p) => p,
            Packet::Publish(p) => p,
            Packet::PublishAck(p) | Packet::PublishReceived(p) => p,
            Packet::PublishRelease(p) | Packet::PublishComplete(p) => p,
            Packet::Subscribe(p) => p,
            Packet::SubscribeAck(p) => p,
            Packet::Unsubscribe(p) => p,
            Packet::UnsubscribeAck(p) => p,
            Packet::Disconnect(p) => p,
            Packet::Auth(p) => p,
            Packet::PingRequest | Packet::PingResponse => return None,
        };
        Some(body)
    }
}

impl From<Connect> for Packet {
    fn from(pkt: Connect) -> Self {
        Self::Connect(Box::new(pkt))
    }
}

impl From<Box<Connect>> for Packet {
    fn from(pkt: Box<Connect>) -> Self {
        Self::Connect(pkt)
    }
}

impl From<ConnectAck> for Packet {
    fn from(pkt: ConnectAck) -> Self {
        Self::ConnectAck(pkt)
    }
}

impl From<Publish> for Packet {
    fn from(pkt: Publish) -> Self {
        Self::Publish(pkt)
    }
}

impl From<Subscribe> for Packet {
    fn from(pkt: Subscribe) -> Self {
        Self::Subscribe(pkt)
    }
}

impl From<SubscribeAck> for Packet {
    fn from(pkt: SubscribeAck) -> Self {
        Self::SubscribeAck(pkt)
    }
}

impl From<Unsubscribe> for Packet {
    fn from(pkt: Unsubscribe) -> Self {
        Self::Unsubscribe(pkt)
    }
}

impl From<UnsubscribeAck> for Packet {
    fn from(pkt: UnsubscribeAck) -> Self {
        Self::UnsubscribeAck(pkt)
    }
}

impl From<Disconnect> for Packet {
    fn from(pkt: Disconnect) -> Self {
        Self::Disconnect(pkt)
    }
}

impl From<Auth> for Packet {
    fn from(pkt: Auth) -> Self {
        Self::Auth(pkt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_construct() {
        let packet = Packet::new(ProtocolVersion::V3_1_1, PacketType::Subscribe).unwrap();
        assert_eq!(packet, Packet::Subscribe(Subscribe::new(ProtocolVersion::V3_1_1, 0)));
        assert_eq!(packet.packet_type(), PacketType::Subscribe);
        assert_eq!(packet.version(), Some(ProtocolVersion::V3_1_1));

        let packet = Packet::new(ProtocolVersion::V5_0, PacketType::PingRequest).unwrap();
        assert_eq!(packet, Packet::PingRequest);
        assert_eq!(packet.version(), None);

        assert!(Packet::new(ProtocolVersion::V5_0, PacketType::Auth).is_ok());
        assert!(matches!(
            Packet::new(ProtocolVersion::V3_1, PacketType::Auth),
            Err(EncodeError::UnsupportedPacketType { code: 15, version: ProtocolVersion::V3_1 })
        ));
    }

    #[test]
    fn test_packet_id() {
        let mut packet = Packet::new(ProtocolVersion::V3_1_1, PacketType::Unsubscribe).unwrap();
        assert_eq!(packet.packet_id(), Some(0));
        assert!(packet.set_packet_id(7));
        assert_eq!(packet.packet_id(), Some(7));

        let mut packet = Packet::PingResponse;
        assert!(!packet.set_packet_id(7));
        assert_eq!(packet.packet_id(), None);

        let mut packet: Packet = Publish::new(ProtocolVersion::V3_1_1, "a", QoS::AtMostOnce, Bytes::new()).into();
        assert!(!packet.set_packet_id(7));
        let mut packet: Packet = Publish::new(ProtocolVersion::V3_1_1, "a", QoS::ExactlyOnce, Bytes::new()).into();
        assert!(packet.set_packet_id(7));
        assert_eq!(packet.packet_id(), Some(7));
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(Packet::PingRequest.encoded_len().unwrap(), 2);
        let packet: Packet = Publish::new(ProtocolVersion::V3_1_1, "a/b", QoS::AtMostOnce, Bytes::from(vec![0; 200])).into();
        assert_eq!(packet.encoded_len().unwrap(), 1 + 2 + 5 + 200);
    }
}
