//! Fixed-capacity packet buffer.
//!
//! A [`Packet`] is allocated zero-filled at its final size and written
//! front to back through a cursor. Every write is bounds checked before any
//! byte is touched, so a failed append leaves the packet exactly as it was.
//!
//! Integers are stored either as fixed-width big-endian values
//! ([`Packet::put`] / [`Packet::get`]) or as decimal text
//! ([`Packet::put_text`] / [`Packet::get_text_int`]). Readers must use the
//! same scheme the writer used.

use std::fmt::Display;

use bytes::{Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Integer types that can be stored in a packet as big-endian bytes.
pub trait WireInt: Copy {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Writes `self` into `out`, which is exactly `SIZE` bytes long.
    fn write_be(self, out: &mut [u8]);

    /// Reads a value from `bytes`, which is exactly `SIZE` bytes long.
    fn read_be(bytes: &[u8]) -> Self;
}

macro_rules! impl_wire_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WireInt for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_be(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_be_bytes());
                }

                #[inline]
                fn read_be(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_be_bytes(raw)
                }
            }
        )*
    };
}

impl_wire_int!(u8, u16, u32, u64, i32, i64);

/// Fixed-capacity byte buffer with a write cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    buf: BytesMut,
    cursor: usize,
}

impl Packet {
    /// Creates a zero-filled packet of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::zeroed(capacity),
            cursor: 0,
        }
    }

    /// Builds a packet sized to exactly hold `parts`, already written.
    pub(crate) fn from_parts(parts: &[&[u8]]) -> Self {
        let size = parts.iter().map(|part| part.len()).sum();
        let mut buf = BytesMut::with_capacity(size);
        for part in parts {
            buf.extend_from_slice(part);
        }
        Self { buf, cursor: size }
    }

    /// Total size of the buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes written so far (the cursor position).
    #[inline]
    pub fn len(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Bytes that can still be written.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }

    /// Claims `len` bytes at the cursor, failing without side effects if they don't fit.
    fn claim(&mut self, len: usize) -> ProtocolResult<&mut [u8]> {
        if len > self.remaining() {
            return Err(ProtocolError::Overflow {
                requested: len,
                remaining: self.remaining(),
            });
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&mut self.buf[start..start + len])
    }

    /// Appends raw bytes.
    pub fn put_slice(&mut self, data: &[u8]) -> ProtocolResult<()> {
        self.claim(data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Appends an integer in fixed-width big-endian form.
    pub fn put<T: WireInt>(&mut self, value: T) -> ProtocolResult<()> {
        value.write_be(self.claim(T::SIZE)?);
        Ok(())
    }

    /// Appends the decimal text form of a number (or anything displayable).
    pub fn put_text(&mut self, value: impl Display) -> ProtocolResult<()> {
        self.put_slice(value.to_string().as_bytes())
    }

    /// Returns `len` bytes starting at `offset`.
    ///
    /// Reads are checked against the capacity, not the cursor, so zero
    /// padding past the last write is readable.
    pub fn get_slice(&self, offset: usize, len: usize) -> ProtocolResult<&[u8]> {
        match offset.checked_add(len) {
            Some(end) if end <= self.capacity() => Ok(&self.buf[offset..end]),
            _ => Err(ProtocolError::OutOfBounds {
                offset,
                len,
                capacity: self.capacity(),
            }),
        }
    }

    /// Reads a big-endian integer written with [`Packet::put`].
    pub fn get<T: WireInt>(&self, offset: usize) -> ProtocolResult<T> {
        self.get_slice(offset, T::SIZE).map(T::read_be)
    }

    /// Reads a decimal integer written with [`Packet::put_text`].
    ///
    /// Leading ASCII whitespace and a single sign are accepted, parsing stops
    /// at the first non-digit and an absent number reads as 0.
    pub fn get_text_int(&self, offset: usize) -> ProtocolResult<i64> {
        let tail = self.get_slice(offset, self.capacity().saturating_sub(offset))?;
        let mut bytes = tail
            .iter()
            .copied()
            .skip_while(u8::is_ascii_whitespace)
            .peekable();

        let negative = match bytes.peek() {
            Some(b'-') => {
                bytes.next();
                true
            }
            Some(b'+') => {
                bytes.next();
                false
            }
            _ => false,
        };

        let mut value: i64 = 0;
        for digit in bytes.take_while(u8::is_ascii_digit) {
            let digit = i64::from(digit - b'0');
            value = value
                .checked_mul(10)
                .and_then(|v| {
                    if negative {
                        v.checked_sub(digit)
                    } else {
                        v.checked_add(digit)
                    }
                })
                .ok_or_else(|| {
                    ProtocolError::parse(format!("integer at offset {offset} overflows i64"))
                })?;
        }
        Ok(value)
    }

    /// The bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.cursor]
    }

    /// The whole buffer, including zero padding past the cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// The whole buffer as text, with invalid UTF-8 replaced.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }

    /// Converts the packet into an immutable buffer for a transport.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_packet_is_zero_filled() {
        let packet = Packet::new(8);
        assert_eq!(packet.capacity(), 8);
        assert_eq!(packet.len(), 0);
        assert!(packet.is_empty());
        assert_eq!(packet.as_bytes(), &[0u8; 8]);
    }

    #[test]
    fn put_slice_advances_cursor() {
        let mut packet = Packet::new(10);
        packet.put_slice(b"hello").unwrap();
        packet.put_slice(b"!").unwrap();

        assert_eq!(packet.len(), 6);
        assert_eq!(packet.remaining(), 4);
        assert_eq!(packet.written(), b"hello!");
        assert_eq!(packet.as_bytes(), b"hello!\0\0\0\0");
    }

    #[test]
    fn overflow_leaves_packet_untouched() {
        let mut packet = Packet::new(6);
        packet.put_slice(b"abcd").unwrap();

        let err = packet.put_slice(b"xyz").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Overflow {
                requested: 3,
                remaining: 2
            }
        ));
        assert_eq!(packet.len(), 4);
        assert_eq!(packet.as_bytes(), b"abcd\0\0");

        // Integer writes are checked the same way.
        assert!(packet.put(7u32).is_err());
        assert_eq!(packet.len(), 4);
        packet.put(7u16).unwrap();
        assert_eq!(packet.remaining(), 0);
    }

    #[test]
    fn binary_integers_are_big_endian() {
        let mut packet = Packet::new(15);
        packet.put(0x0102_0304u32).unwrap();
        packet.put(-2i64).unwrap();
        packet.put(0xABu8).unwrap();
        packet.put(0x0506u16).unwrap();

        assert_eq!(&packet.as_bytes()[..4], &[1, 2, 3, 4]);
        assert_eq!(packet.get::<u32>(0).unwrap(), 0x0102_0304);
        assert_eq!(packet.get::<i64>(4).unwrap(), -2);
        assert_eq!(packet.get::<u8>(12).unwrap(), 0xAB);
        assert_eq!(packet.get::<u16>(13).unwrap(), 0x0506);
    }

    #[test]
    fn reads_past_capacity_fail() {
        let packet = Packet::new(4);
        assert!(packet.get::<u32>(0).is_ok());
        assert!(matches!(
            packet.get::<u32>(1),
            Err(ProtocolError::OutOfBounds {
                offset: 1,
                len: 4,
                capacity: 4
            })
        ));
        assert!(packet.get_slice(usize::MAX, 2).is_err());
        assert!(packet.get_text_int(5).is_err());
    }

    #[test]
    fn text_integers() {
        let mut packet = Packet::new(16);
        packet.put_text(17010370).unwrap();
        packet.put_slice(b";").unwrap();
        packet.put_text(-42).unwrap();

        assert_eq!(packet.written(), b"17010370;-42");
        assert_eq!(packet.get_text_int(0).unwrap(), 17010370);
        assert_eq!(packet.get_text_int(9).unwrap(), -42);
        assert_eq!(packet.get_text_int(4).unwrap(), 370);
        // Zero padding holds no digits.
        assert_eq!(packet.get_text_int(12).unwrap(), 0);
    }

    #[test]
    fn text_integer_overflow_is_a_parse_error() {
        let mut packet = Packet::new(32);
        packet.put_slice(b"99999999999999999999999").unwrap();
        assert!(matches!(
            packet.get_text_int(0),
            Err(ProtocolError::Parse(_))
        ));
    }

    #[test]
    fn freeze_keeps_padding() {
        let mut packet = Packet::new(5);
        packet.put_slice(b"ab").unwrap();
        assert_eq!(packet.to_string_lossy(), "ab\0\0\0");
        let bytes = packet.freeze();
        assert_eq!(&bytes[..], b"ab\0\0\0");
    }
}
