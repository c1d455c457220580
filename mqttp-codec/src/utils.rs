use bytes::{Buf, BufMut, Bytes};
use bytestring::ByteString;

use crate::error::{DecodeError, EncodeError, Malformed};

macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            return Err($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err($fmt, $($arg)+);
        }
    };
}

macro_rules! prim_enum {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident {
            $(
                $( #[$enum_item_attr:meta] )*
                $var:ident=$val:expr
            ),+
        }) => {
        $( #[$enum_attr] )*
        #[repr(u8)]
        #[derive(Debug, Eq, PartialEq, Copy, Clone)]
        pub enum $name {
            $(
                $( #[$enum_item_attr] )*
                $var = $val
            ),+
        }
        impl std::convert::TryFrom<u8> for $name {
            type Error = $crate::error::Malformed;
            fn try_from(v: u8) -> Result<Self, Self::Error> {
                match v {
                    $($val => Ok($name::$var)),+
                    ,_ => Err($crate::error::Malformed::InvalidValue { field: stringify!($name), value: v })
                }
            }
        }
        impl From<$name> for u8 {
            fn from(v: $name) -> Self {
                v as u8
            }
        }
    };
}

/// Largest value a remaining length (or any variable byte integer) can carry.
pub const MAX_VARIABLE_LENGTH: usize = 268_435_455;

/// Longest UTF-8 string or binary field, bounded by its 2 byte length prefix.
pub(crate) const MAX_FIELD_LENGTH: usize = u16::MAX as usize;

pub(crate) trait Decode: Sized {
    fn decode(src: &mut Bytes) -> Result<Self, Malformed>;
}

impl Decode for u8 {
    fn decode(src: &mut Bytes) -> Result<Self, Malformed> {
        ensure!(src.has_remaining(), Malformed::Truncated { needed: 1, remaining: 0 });
        Ok(src.get_u8())
    }
}

impl Decode for u16 {
    fn decode(src: &mut Bytes) -> Result<Self, Malformed> {
        ensure!(src.remaining() >= 2, Malformed::Truncated { needed: 2, remaining: src.remaining() });
        Ok(src.get_u16())
    }
}

impl Decode for Bytes {
    fn decode(src: &mut Bytes) -> Result<Self, Malformed> {
        let len = u16::decode(src)? as usize;
        ensure!(src.remaining() >= len, Malformed::Truncated { needed: len, remaining: src.remaining() });
        Ok(src.split_to(len))
    }
}

impl Decode for ByteString {
    fn decode(src: &mut Bytes) -> Result<Self, Malformed> {
        let s = ByteString::try_from(Bytes::decode(src)?).map_err(|_| Malformed::InvalidUtf8)?;
        ensure!(!s.contains('\0'), Malformed::NullCharacter);
        Ok(s)
    }
}

/// Decodes a variable byte integer from the start of `src`.
///
/// Returns `Ok(None)` when `src` ends before the terminating byte, the value and the
/// number of bytes it occupied otherwise. Encodings longer than 4 bytes or longer than
/// necessary are rejected.
#[allow(clippy::cast_lossless)]
pub(crate) fn decode_variable_length(src: &[u8]) -> Result<Option<(u32, usize)>, Malformed> {
    let mut len: u32 = 0;
    for (pos, &val) in src.iter().enumerate() {
        len |= ((val & 0b0111_1111) as u32) << (7 * pos);
        if val & 0b1000_0000 == 0 {
            ensure!(pos == 0 || val != 0, Malformed::NonMinimalVarint);
            return Ok(Some((len, pos + 1)));
        }
        ensure!(pos < 3, Malformed::VarintOverlong);
    }
    Ok(None)
}

pub(crate) fn var_int_len(len: usize) -> Result<usize, EncodeError> {
    match len {
        0..=127 => Ok(1),
        128..=16_383 => Ok(2),
        16_384..=2_097_151 => Ok(3),
        2_097_152..=MAX_VARIABLE_LENGTH => Ok(4),
        _ => Err(EncodeError::OutOfRange { field: "variable byte integer", value: len, max: MAX_VARIABLE_LENGTH }),
    }
}

/// Size of a variable byte integer, values out of range count as 4 bytes and fail on write.
#[inline]
pub(crate) fn var_int_size(len: usize) -> usize {
    var_int_len(len).unwrap_or(4)
}

pub(crate) fn write_variable_length(len: usize, dst: &mut dyn BufMut) -> Result<(), EncodeError> {
    match len {
        0..=127 => dst.put_u8(len as u8),
        128..=16_383 => dst.put_slice(&[((len & 0b0111_1111) | 0b1000_0000) as u8, (len >> 7) as u8]),
        16_384..=2_097_151 => {
            dst.put_slice(&[
                ((len & 0b0111_1111) | 0b1000_0000) as u8,
                (((len >> 7) & 0b0111_1111) | 0b1000_0000) as u8,
                (len >> 14) as u8,
            ]);
        }
        2_097_152..=MAX_VARIABLE_LENGTH => {
            dst.put_slice(&[
                ((len & 0b0111_1111) | 0b1000_0000) as u8,
                (((len >> 7) & 0b0111_1111) | 0b1000_0000) as u8,
                (((len >> 14) & 0b0111_1111) | 0b1000_0000) as u8,
                (len >> 21) as u8,
            ]);
        }
        _ => {
            return Err(EncodeError::OutOfRange {
                field: "variable byte integer",
                value: len,
                max: MAX_VARIABLE_LENGTH,
            })
        }
    }
    Ok(())
}

pub(crate) trait Encode {
    fn encoded_size(&self) -> usize;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError>;
}

impl<T: Encode> Encode for Option<T> {
    fn encoded_size(&self) -> usize {
        self.as_ref().map_or(0, |v| v.encoded_size())
    }
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
        if let Some(v) = self {
            v.encode(buf)
        } else {
            Ok(())
        }
    }
}

impl Encode for u8 {
    fn encoded_size(&self) -> usize {
        1
    }
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
        buf.put_u8(*self);
        Ok(())
    }
}

impl Encode for u16 {
    fn encoded_size(&self) -> usize {
        2
    }
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
        buf.put_u16(*self);
        Ok(())
    }
}

impl Encode for [u8] {
    fn encoded_size(&self) -> usize {
        2 + self.len()
    }
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
        let len = u16::try_from(self.len()).map_err(|_| EncodeError::OutOfRange {
            field: "length prefixed field",
            value: self.len(),
            max: MAX_FIELD_LENGTH,
        })?;
        buf.put_u16(len);
        buf.put_slice(self);
        Ok(())
    }
}

impl Encode for Bytes {
    fn encoded_size(&self) -> usize {
        self.as_ref().encoded_size()
    }
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
        self.as_ref().encode(buf)
    }
}

impl Encode for ByteString {
    fn encoded_size(&self) -> usize {
        self.as_bytes().encoded_size()
    }
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
        self.as_bytes().encode(buf)
    }
}

impl Encode for (ByteString, ByteString) {
    fn encoded_size(&self) -> usize {
        self.0.encoded_size() + self.1.encoded_size()
    }
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), EncodeError> {
        self.0.encode(buf)?;
        self.1.encode(buf)
    }
}

/// Cursor over a packet body.
///
/// Offsets reported in errors are relative to the first byte of the packet, fixed header
/// included.
pub(crate) struct Reader {
    src: Bytes,
    start: usize,
    len: usize,
}

impl Reader {
    pub(crate) fn new(src: Bytes, start: usize) -> Self {
        let len = src.len();
        Reader { src, start, len }
    }

    #[inline]
    pub(crate) fn offset(&self) -> usize {
        self.start + self.len - self.src.remaining()
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.src.remaining()
    }

    #[inline]
    pub(crate) fn has_remaining(&self) -> bool {
        self.src.has_remaining()
    }

    #[inline]
    pub(crate) fn malformed(&self, reason: impl Into<Malformed>) -> DecodeError {
        DecodeError::malformed(self.offset(), reason)
    }

    pub(crate) fn read<T: Decode>(&mut self) -> Result<T, DecodeError> {
        let offset = self.offset();
        T::decode(&mut self.src).map_err(|reason| DecodeError::malformed(offset, reason))
    }

    pub(crate) fn read_variable_length(&mut self) -> Result<u32, DecodeError> {
        match decode_variable_length(self.src.as_ref()).map_err(|e| self.malformed(e))? {
            Some((val, consumed)) => {
                self.src.advance(consumed);
                Ok(val)
            }
            None => Err(self.malformed(Malformed::Truncated { needed: 1, remaining: 0 })),
        }
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<Bytes, DecodeError> {
        ensure!(self.remaining() >= len, self.malformed(Malformed::Truncated { needed: len, remaining: self.remaining() }));
        Ok(self.src.split_to(len))
    }

    pub(crate) fn take_rest(&mut self) -> Bytes {
        self.src.split_off(0)
    }

    /// Fails when the body was not fully consumed.
    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        ensure!(!self.has_remaining(), self.malformed(Malformed::TrailingBytes { remaining: self.remaining() }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_decode_variable_length() {
        fn assert_variable_length<B: AsRef<[u8]> + 'static>(bytes: B, res: (u32, usize)) {
            assert_eq!(decode_variable_length(bytes.as_ref()).unwrap(), Some(res));
        }

        assert_variable_length(b"\x7f\x7f", (127, 1));

        assert_eq!(decode_variable_length(b"").unwrap(), None);
        assert_eq!(decode_variable_length(b"\xff\xff\xff").unwrap(), None);

        assert_eq!(decode_variable_length(b"\xff\xff\xff\xff\xff\xff"), Err(Malformed::VarintOverlong));
        // the 4th byte announcing a 5th is enough to reject the encoding
        assert_eq!(decode_variable_length(b"\x80\x80\x80\x80"), Err(Malformed::VarintOverlong));
        assert_eq!(decode_variable_length(b"\x80\x00"), Err(Malformed::NonMinimalVarint));
        assert_eq!(decode_variable_length(b"\xff\x80\x00"), Err(Malformed::NonMinimalVarint));

        assert_variable_length(b"\x00", (0, 1));
        assert_variable_length(b"\x7f", (127, 1));
        assert_variable_length(b"\x80\x01", (128, 2));
        assert_variable_length(b"\xff\x7f", (16383, 2));
        assert_variable_length(b"\x80\x80\x01", (16384, 3));
        assert_variable_length(b"\xff\xff\x7f", (2_097_151, 3));
        assert_variable_length(b"\x80\x80\x80\x01", (2_097_152, 4));
        assert_variable_length(b"\xff\xff\xff\x7f", (268_435_455, 4));
    }

    #[test]
    fn test_encode_variable_length() {
        let mut v = BytesMut::new();

        write_variable_length(123, &mut v).unwrap();
        assert_eq!(v, [123].as_ref());

        v.clear();

        write_variable_length(129, &mut v).unwrap();
        assert_eq!(v, b"\x81\x01".as_ref());

        v.clear();

        write_variable_length(16_383, &mut v).unwrap();
        assert_eq!(v, b"\xff\x7f".as_ref());

        v.clear();

        write_variable_length(2_097_151, &mut v).unwrap();
        assert_eq!(v, b"\xff\xff\x7f".as_ref());

        v.clear();

        write_variable_length(268_435_455, &mut v).unwrap();
        assert_eq!(v, b"\xff\xff\xff\x7f".as_ref());
        assert_eq!(var_int_len(268_435_455).unwrap(), 4);

        assert!(matches!(
            write_variable_length(MAX_VARIABLE_LENGTH + 1, &mut v),
            Err(EncodeError::OutOfRange { value: 268_435_456, .. })
        ));
        assert!(var_int_len(MAX_VARIABLE_LENGTH + 1).is_err());
    }

    #[test]
    fn test_decode_strings() {
        let mut src = Bytes::from_static(b"\x00\x04test\x00\x02a");
        assert_eq!(ByteString::decode(&mut src).unwrap(), "test");
        assert_eq!(ByteString::decode(&mut src), Err(Malformed::Truncated { needed: 2, remaining: 1 }));

        let mut src = Bytes::from_static(b"\x00\x02\xc3\x28");
        assert_eq!(ByteString::decode(&mut src), Err(Malformed::InvalidUtf8));

        let mut src = Bytes::from_static(b"\x00\x03a\x00b");
        assert_eq!(ByteString::decode(&mut src), Err(Malformed::NullCharacter));
    }

    #[test]
    fn test_reader_offsets() {
        let mut reader = Reader::new(Bytes::from_static(b"\x00\x07\x00\x05ab"), 2);
        assert_eq!(reader.offset(), 2);
        assert_eq!(reader.read::<u16>().unwrap(), 7);
        assert_eq!(reader.offset(), 4);

        let err = reader.read::<ByteString>().unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPacket { offset: 4, .. }));

        let reader = Reader::new(Bytes::from_static(b"\x00\x07\x01"), 2);
        let err = reader.finish().unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MalformedPacket { offset: 2, reason: Malformed::TrailingBytes { remaining: 3 } }
        ));
    }
}
