//! Fixed header framing shared by every control packet.

use bytes::BufMut;

use crate::error::{DecodeError, EncodeError};
use crate::types::PacketType;
use crate::utils::{decode_variable_length, var_int_len, var_int_size, write_variable_length, MAX_VARIABLE_LENGTH};

/// Fixed header of a control packet.
///
/// Only lives for the duration of a decode or encode pass.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    /// low nibble of the first byte
    pub flags: u8,
    /// the number of bytes remaining within the current packet,
    /// including data in the variable header and the payload.
    pub remaining_length: u32,
}

impl FixedHeader {
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: usize) -> Result<Self, EncodeError> {
        ensure!(
            remaining_length <= MAX_VARIABLE_LENGTH,
            EncodeError::OutOfRange { field: "remaining length", value: remaining_length, max: MAX_VARIABLE_LENGTH }
        );
        Ok(FixedHeader { packet_type, flags: flags & 0b0000_1111, remaining_length: remaining_length as u32 })
    }

    /// Reads the type/flags byte and the remaining length.
    ///
    /// Does not check whether the body is present in `src`, returns the header and the
    /// number of bytes it occupies.
    pub fn parse(src: &[u8]) -> Result<(FixedHeader, usize), DecodeError> {
        let first_byte = match src.first() {
            Some(b) => *b,
            None => return Err(DecodeError::InsufficientData { needed: 2 }),
        };
        let packet_type = PacketType::try_from(first_byte >> 4)
            .map_err(|_| DecodeError::UnsupportedPacketType { code: first_byte >> 4 })?;
        let (remaining_length, consumed) = decode_remaining_length(&src[1..])
            .map_err(|e| match e {
                DecodeError::MalformedPacket { offset, reason } => DecodeError::malformed(offset + 1, reason),
                e => e,
            })?;
        Ok((FixedHeader { packet_type, flags: first_byte & 0b0000_1111, remaining_length }, consumed + 1))
    }

    /// Reads the fixed header and checks the declared body is fully contained in `src`.
    pub fn decode(src: &[u8]) -> Result<(FixedHeader, usize), DecodeError> {
        let (header, consumed) = FixedHeader::parse(src)?;
        let available = src.len() - consumed;
        let remaining_length = header.remaining_length as usize;
        if available < remaining_length {
            return Err(DecodeError::InsufficientData { needed: remaining_length - available });
        }
        Ok((header, consumed))
    }

    #[inline]
    pub fn first_byte(&self) -> u8 {
        (u8::from(self.packet_type) << 4) | self.flags
    }

    /// Size of the fixed header itself.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        1 + var_int_size(self.remaining_length as usize)
    }

    /// Size of the whole packet, fixed header included.
    #[inline]
    pub fn packet_len(&self) -> usize {
        self.encoded_len() + self.remaining_length as usize
    }

    pub fn encode(&self, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
        dst.put_u8(self.first_byte());
        write_variable_length(self.remaining_length as usize, dst)
    }
}

/// Decodes the remaining length at the start of `src`.
///
/// Fails with `InsufficientData` when `src` ends before the terminating byte, and with
/// `MalformedPacket` when the encoding is longer than 4 bytes or not minimal.
pub fn decode_remaining_length(src: &[u8]) -> Result<(u32, usize), DecodeError> {
    match decode_variable_length(src) {
        Ok(Some(res)) => Ok(res),
        Ok(None) => Err(DecodeError::InsufficientData { needed: 1 }),
        Err(reason) => Err(DecodeError::malformed(0, reason)),
    }
}

/// Writes `len` as a 1 to 4 byte remaining length, returns the number of bytes written.
pub fn encode_remaining_length(len: usize, dst: &mut dyn BufMut) -> Result<usize, EncodeError> {
    let size = var_int_len(len)?;
    write_variable_length(len, dst)?;
    Ok(size)
}

/// Writes the type/flags byte followed by the remaining length of `body_len`.
pub fn encode_fixed_header(
    packet_type: PacketType,
    flags: u8,
    body_len: usize,
    dst: &mut dyn BufMut,
) -> Result<usize, EncodeError> {
    let header = FixedHeader::new(packet_type, flags, body_len)?;
    header.encode(dst)?;
    Ok(header.encoded_len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Malformed};
    use bytes::BytesMut;

    #[test]
    fn test_decode_fixed_header() {
        let (header, consumed) = FixedHeader::decode(b"\x82\x02\x00\x07").unwrap();
        assert_eq!(header, FixedHeader { packet_type: PacketType::Subscribe, flags: 0b0010, remaining_length: 2 });
        assert_eq!(consumed, 2);

        let src = b"\x30\x80\x01";
        assert!(matches!(FixedHeader::decode(src), Err(DecodeError::InsufficientData { needed: 128 })));
        let (header, consumed) = FixedHeader::parse(src).unwrap();
        assert_eq!(header.remaining_length, 128);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_insufficient_data() {
        assert!(matches!(FixedHeader::decode(b""), Err(DecodeError::InsufficientData { needed: 2 })));
        assert!(matches!(FixedHeader::decode(b"\x82"), Err(DecodeError::InsufficientData { needed: 1 })));
        assert!(matches!(FixedHeader::decode(b"\x82\xff\xff"), Err(DecodeError::InsufficientData { needed: 1 })));
        assert!(matches!(FixedHeader::decode(b"\x82\x25\x00\x07"), Err(DecodeError::InsufficientData { needed: 35 })));
    }

    #[test]
    fn test_malformed_remaining_length() {
        let err = FixedHeader::decode(b"\x82\xff\xff\xff\xff\x01").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedPacket);
        assert!(matches!(err, DecodeError::MalformedPacket { offset: 1, reason: Malformed::VarintOverlong }));

        let err = FixedHeader::decode(b"\x82\x80\x80\x80\x80").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedPacket);
    }

    #[test]
    fn test_reserved_type() {
        assert!(matches!(FixedHeader::decode(b"\x00\x00"), Err(DecodeError::UnsupportedPacketType { code: 0 })));
    }

    #[test]
    fn test_encode_fixed_header() {
        let mut v = BytesMut::new();
        assert_eq!(encode_fixed_header(PacketType::Subscribe, 0b0010, 37, &mut v).unwrap(), 2);
        assert_eq!(v, b"\x82\x25".as_ref());

        v.clear();
        assert_eq!(encode_fixed_header(PacketType::Publish, 0b1011, 321, &mut v).unwrap(), 3);
        assert_eq!(v, b"\x3b\xc1\x02".as_ref());

        v.clear();
        assert_eq!(encode_remaining_length(268_435_455, &mut v).unwrap(), 4);
        assert_eq!(v, b"\xff\xff\xff\x7f".as_ref());

        assert!(matches!(
            encode_fixed_header(PacketType::Publish, 0, MAX_VARIABLE_LENGTH + 1, &mut v),
            Err(EncodeError::OutOfRange { .. })
        ));

        let header = FixedHeader::new(PacketType::PingRequest, 0, 0).unwrap();
        assert_eq!(header.first_byte(), 0xc0);
        assert_eq!(header.packet_len(), 2);
    }
}
