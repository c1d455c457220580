use std::num::NonZeroU32;

use bytes::{BufMut, Bytes};
use bytestring::ByteString;

use crate::error::{DecodeError, EncodeError, Malformed, Violation};
use crate::utils::{var_int_size, write_variable_length, Encode, Reader};

pub(crate) mod property_type {
    pub(crate) const SUB_ID: u8 = 0x0B;
    pub(crate) const USER: u8 = 0x26;
}

use property_type as pt;

pub type UserProperty = (ByteString, ByteString);

/// MQTT 5 property block carried verbatim.
///
/// Holds the property bytes without the length prefix.
#[derive(Debug, PartialEq, Eq, Clone, Default, Hash)]
pub struct Properties(Bytes);

impl Properties {
    #[inline]
    pub fn new(raw: Bytes) -> Self {
        Properties(raw)
    }

    #[inline]
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn decode(src: &mut Reader) -> Result<Self, DecodeError> {
        let len = src.read_variable_length()? as usize;
        Ok(Properties(src.take(len)?))
    }
}

impl Encode for Properties {
    fn encoded_size(&self) -> usize {
        var_int_size(self.0.len()) + self.0.len()
    }

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
        write_variable_length(self.0.len(), buf)?;
        buf.put_slice(&self.0);
        Ok(())
    }
}

/// Property allowed in a MQTT 5 SUBSCRIBE.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SubscribeProperty {
    SubscriptionIdentifier(NonZeroU32),
    User(UserProperty),
}

impl Encode for SubscribeProperty {
    fn encoded_size(&self) -> usize {
        match self {
            SubscribeProperty::SubscriptionIdentifier(id) => 1 + var_int_size(id.get() as usize),
            SubscribeProperty::User(prop) => 1 + prop.encoded_size(),
        }
    }

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
        match self {
            SubscribeProperty::SubscriptionIdentifier(id) => {
                buf.put_u8(pt::SUB_ID);
                write_variable_length(id.get() as usize, buf)
            }
            SubscribeProperty::User(prop) => {
                buf.put_u8(pt::USER);
                prop.encode(buf)
            }
        }
    }
}

/// Reads a property block through `f`, which parses one property at a time given its id.
fn decode_block<T, F>(src: &mut Reader, mut f: F) -> Result<Vec<T>, DecodeError>
where
    F: FnMut(u8, &mut Reader, &[T]) -> Result<T, DecodeError>,
{
    let len = src.read_variable_length()? as usize;
    let start = src.offset();
    let mut block = Reader::new(src.take(len)?, start);
    let mut props = Vec::new();
    while block.has_remaining() {
        let offset = block.offset();
        let id = block.read::<u8>()?;
        let prop = f(id, &mut block, &props).map_err(|e| match e {
            DecodeError::MalformedPacket { reason: Malformed::UnexpectedProperty(id), .. } => {
                DecodeError::malformed(offset, Malformed::UnexpectedProperty(id))
            }
            e => e,
        })?;
        props.push(prop);
    }
    Ok(props)
}

pub(crate) fn decode_subscribe(src: &mut Reader) -> Result<Vec<SubscribeProperty>, DecodeError> {
    decode_block(src, |id, block, seen| match id {
        pt::SUB_ID => {
            if seen.iter().any(|p| matches!(p, SubscribeProperty::SubscriptionIdentifier(_))) {
                return Err(Violation::DuplicateSubscriptionId.into());
            }
            let offset = block.offset();
            let val = block.read_variable_length()?;
            let id = NonZeroU32::new(val).ok_or_else(|| {
                DecodeError::malformed(offset, Malformed::InvalidValue { field: "subscription identifier", value: 0 })
            })?;
            Ok(SubscribeProperty::SubscriptionIdentifier(id))
        }
        pt::USER => Ok(SubscribeProperty::User((block.read()?, block.read()?))),
        id => Err(block.malformed(Malformed::UnexpectedProperty(id))),
    })
}

pub(crate) fn decode_user_only(src: &mut Reader) -> Result<Vec<UserProperty>, DecodeError> {
    decode_block(src, |id, block, _| match id {
        pt::USER => Ok((block.read()?, block.read()?)),
        id => Err(block.malformed(Malformed::UnexpectedProperty(id))),
    })
}

/// Size of a property list including its length prefix.
pub(crate) fn block_size(props: &impl Encode) -> usize {
    let len = props.encoded_size();
    var_int_size(len) + len
}

pub(crate) fn encode_block(props: &impl Encode, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
    write_variable_length(props.encoded_size(), buf)?;
    props.encode(buf)
}

impl Encode for Vec<SubscribeProperty> {
    fn encoded_size(&self) -> usize {
        self.iter().fold(0, |acc, p| acc + p.encoded_size())
    }

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
        for prop in self {
            prop.encode(buf)?;
        }
        Ok(())
    }
}

impl Encode for Vec<UserProperty> {
    fn encoded_size(&self) -> usize {
        self.iter().fold(0, |acc, p| acc + 1 + p.encoded_size())
    }

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
        for prop in self {
            buf.put_u8(pt::USER);
            prop.encode(buf)?;
        }
        Ok(())
    }
}

/// Reads the optional `[reason code [properties]]` tail of MQTT 5 acks, DISCONNECT and AUTH.
pub(crate) fn decode_reason_tail<R>(src: &mut Reader) -> Result<(Option<R>, Option<Properties>), DecodeError>
where
    R: TryFrom<u8, Error = Malformed>,
{
    if !src.has_remaining() {
        return Ok((None, None));
    }
    let offset = src.offset();
    let reason = R::try_from(src.read::<u8>()?).map_err(|e| DecodeError::malformed(offset, e))?;
    let properties = if src.has_remaining() { Some(Properties::decode(src)?) } else { None };
    Ok((Some(reason), properties))
}

pub(crate) fn reason_tail_size<R>(reason: &Option<R>, properties: &Option<Properties>) -> usize {
    match (reason, properties) {
        (None, None) => 0,
        (_, None) => 1,
        (_, Some(props)) => 1 + props.encoded_size(),
    }
}

/// Writes the tail, a missing reason code is written as success (0) when properties follow.
pub(crate) fn encode_reason_tail<R>(
    reason: &Option<R>,
    properties: &Option<Properties>,
    buf: &mut dyn BufMut,
) -> Result<(), EncodeError>
where
    R: Into<u8> + Copy,
{
    if reason.is_none() && properties.is_none() {
        return Ok(());
    }
    buf.put_u8(reason.map_or(0, Into::into));
    properties.encode(buf)
}
