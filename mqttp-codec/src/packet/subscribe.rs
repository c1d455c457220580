use std::num::NonZeroU32;

use bytes::BufMut;
use bytestring::ByteString;

use super::properties::{self, SubscribeProperty, UserProperty};
use super::PacketBody;
use crate::error::{DecodeError, EncodeError, Malformed, Violation};
use crate::topic::{validate_filter, SubscriptionOptions, TopicError, TopicFilter};
use crate::types::QoS;
use crate::utils::{Encode, Reader};
use crate::version::ProtocolVersion;

/// Represents SUBSCRIBE packet
///
/// Topic filters can only be added through [`Subscribe::add_topic`], so every stored
/// filter is valid for the packet's protocol version.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Subscribe {
    pub version: ProtocolVersion,
    /// Packet Identifier
    pub packet_id: u16,
    /// MQTT 5 only, in wire order
    pub properties: Vec<SubscribeProperty>,
    topics: Vec<TopicFilter>,
}

impl Subscribe {
    pub fn new(version: ProtocolVersion, packet_id: u16) -> Self {
        Subscribe { version, packet_id, properties: Vec::new(), topics: Vec::new() }
    }

    /// Appends a filter, failing when its options cannot be expressed in this protocol version.
    pub fn add_topic(&mut self, filter: TopicFilter) -> Result<(), Malformed> {
        if !self.version.is_v5() && !filter.options().is_v3() {
            return Err(Malformed::ReservedBits { field: "subscription options", value: filter.options().to_byte() });
        }
        self.topics.push(filter);
        Ok(())
    }

    /// Validates `pattern` and appends it with the given QoS.
    pub fn subscribe<T: Into<ByteString>>(&mut self, pattern: T, qos: QoS) -> Result<(), Malformed> {
        let filter = TopicFilter::new(pattern, SubscriptionOptions::new(qos))?;
        self.add_topic(filter)
    }

    /// Topic filters in the order they were added or decoded.
    #[inline]
    pub fn topics(&self) -> &[TopicFilter] {
        &self.topics
    }

    #[inline]
    pub fn into_topics(self) -> Vec<TopicFilter> {
        self.topics
    }

    pub fn subscription_id(&self) -> Option<NonZeroU32> {
        self.properties.iter().find_map(|p| match p {
            SubscribeProperty::SubscriptionIdentifier(id) => Some(*id),
            _ => None,
        })
    }
}

impl PacketBody for Subscribe {
    fn empty(version: ProtocolVersion) -> Self {
        Subscribe::new(version, 0)
    }

    fn decode(version: ProtocolVersion, _flags: u8, src: &mut Reader) -> Result<Self, DecodeError> {
        let packet_id = src.read::<u16>()?;
        let properties = if version.is_v5() { properties::decode_subscribe(src)? } else { Vec::new() };

        let mut topics = Vec::new();
        while src.has_remaining() {
            let offset = src.offset();
            let pattern = src.read::<ByteString>()?;
            validate_filter(&pattern).map_err(|e| DecodeError::malformed(offset, e))?;

            let offset = src.offset();
            let options = SubscriptionOptions::from_byte(src.read::<u8>()?, version)
                .map_err(|e| DecodeError::malformed(offset, e))?;
            topics.push(TopicFilter::from_parts(pattern, options));
        }
        ensure!(!topics.is_empty(), Violation::NoTopicFilters.into());

        Ok(Subscribe { version, packet_id, properties, topics })
    }

    fn encoded_size(&self) -> usize {
        let props = if self.version.is_v5() { properties::block_size(&self.properties) } else { 0 };
        self.topics.iter().fold(2 + props, |acc, t| acc + t.pattern().encoded_size() + 1)
    }

    fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
        self.packet_id.encode(dst)?;
        if self.version.is_v5() {
            properties::encode_block(&self.properties, dst)?;
        }
        for topic in &self.topics {
            topic.pattern().encode(dst)?;
            dst.put_u8(topic.options().to_byte());
        }
        Ok(())
    }
}

/// Represents UNSUBSCRIBE packet
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Unsubscribe {
    pub version: ProtocolVersion,
    /// Packet Identifier
    pub packet_id: u16,
    /// MQTT 5 only
    pub user_properties: Vec<UserProperty>,
    filters: Vec<ByteString>,
}

impl Unsubscribe {
    pub fn new(version: ProtocolVersion, packet_id: u16) -> Self {
        Unsubscribe { version, packet_id, user_properties: Vec::new(), filters: Vec::new() }
    }

    /// Validates `filter` and appends it.
    pub fn add_filter<T: Into<ByteString>>(&mut self, filter: T) -> Result<(), TopicError> {
        let filter = filter.into();
        validate_filter(&filter)?;
        self.filters.push(filter);
        Ok(())
    }

    /// Topic filters in the order they were added or decoded.
    #[inline]
    pub fn filters(&self) -> &[ByteString] {
        &self.filters
    }

    #[inline]
    pub fn into_filters(self) -> Vec<ByteString> {
        self.filters
    }
}

impl PacketBody for Unsubscribe {
    fn empty(version: ProtocolVersion) -> Self {
        Unsubscribe::new(version, 0)
    }

    fn decode(version: ProtocolVersion, _flags: u8, src: &mut Reader) -> Result<Self, DecodeError> {
        let packet_id = src.read::<u16>()?;
        let user_properties = if version.is_v5() { properties::decode_user_only(src)? } else { Vec::new() };

        let mut filters = Vec::new();
        while src.has_remaining() {
            let offset = src.offset();
            let filter = src.read::<ByteString>()?;
            validate_filter(&filter).map_err(|e| DecodeError::malformed(offset, e))?;
            filters.push(filter);
        }
        ensure!(!filters.is_empty(), Violation::NoTopicFilters.into());

        Ok(Unsubscribe { version, packet_id, user_properties, filters })
    }

    fn encoded_size(&self) -> usize {
        let props = if self.version.is_v5() { properties::block_size(&self.user_properties) } else { 0 };
        self.filters.iter().fold(2 + props, |acc, f| acc + f.encoded_size())
    }

    fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
        self.packet_id.encode(dst)?;
        if self.version.is_v5() {
            properties::encode_block(&self.user_properties, dst)?;
        }
        for filter in &self.filters {
            filter.encode(dst)?;
        }
        Ok(())
    }
}
