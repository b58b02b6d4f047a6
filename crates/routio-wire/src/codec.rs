// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Primitive reads and writes over a frame body.
//!
//! All values are little-endian. Strings are `u32 length | UTF-8 bytes`
//! (not NUL-terminated); arrays are `u32 count | count elements`.

use crate::error::DecodeError;

/// Cursor over a received frame body.
#[derive(Debug)]
pub struct MessageReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    /// Wrap a frame body for reading.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Current offset into the body.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: n - self.remaining(),
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a single byte interpreted as a boolean (zero is false).
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a `u32 length` prefix followed by that many UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Read exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.take(n)
    }

    /// Read a `u32 count` prefix followed by `count` encoded elements.
    pub fn read_array<T: Codec>(&mut self) -> Result<Vec<T>, DecodeError> {
        let count = self.read_u32()? as usize;
        // Every element encodes to at least one byte, so a count beyond the
        // remaining bytes is unsatisfiable. Checking up front bounds the
        // allocation as well.
        if count > self.remaining() {
            return Err(DecodeError::Truncated {
                needed: count - self.remaining(),
                remaining: self.remaining(),
            });
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(T::read(self)?);
        }
        Ok(out)
    }
}

/// Growable buffer a frame body is written into.
#[derive(Debug, Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    /// Fresh empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer with `capacity` bytes preallocated.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// View of the encoded body.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, returning the encoded body.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    /// Write a boolean as a single byte.
    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    /// Write a `u32 length` prefix followed by the UTF-8 bytes.
    pub fn write_string(&mut self, v: &str) {
        self.write_u32(v.len() as u32);
        self.buf.extend_from_slice(v.as_bytes());
    }

    /// Append raw bytes with no prefix.
    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Write a `u32 count` prefix followed by each element.
    pub fn write_array<T: Codec>(&mut self, items: &[T]) {
        self.write_u32(items.len() as u32);
        for item in items {
            item.write(self);
        }
    }
}

/// One read/write method pair per encodable type.
///
/// Generated aggregates compose child codecs field by field; the built-in
/// implementations below cover every primitive the description language can
/// name.
pub trait Codec: Sized {
    /// Decode one value from the reader.
    fn read(reader: &mut MessageReader<'_>) -> Result<Self, DecodeError>;

    /// Encode this value onto the writer.
    fn write(&self, writer: &mut MessageWriter);
}

macro_rules! numeric_codec {
    ($($ty:ty => $read:ident, $write:ident;)*) => {
        impl<'a> MessageReader<'a> {
            $(
                #[doc = concat!("Read a little-endian `", stringify!($ty), "`.")]
                pub fn $read(&mut self) -> Result<$ty, DecodeError> {
                    const N: usize = std::mem::size_of::<$ty>();
                    let bytes = self.take(N)?;
                    let mut raw = [0u8; N];
                    raw.copy_from_slice(bytes);
                    Ok(<$ty>::from_le_bytes(raw))
                }
            )*
        }

        impl MessageWriter {
            $(
                #[doc = concat!("Write a little-endian `", stringify!($ty), "`.")]
                pub fn $write(&mut self, v: $ty) {
                    self.buf.extend_from_slice(&v.to_le_bytes());
                }
            )*
        }

        $(
            impl Codec for $ty {
                fn read(reader: &mut MessageReader<'_>) -> Result<Self, DecodeError> {
                    reader.$read()
                }

                fn write(&self, writer: &mut MessageWriter) {
                    writer.$write(*self);
                }
            }
        )*
    };
}

numeric_codec! {
    u8  => read_u8,  write_u8;
    u16 => read_u16, write_u16;
    u32 => read_u32, write_u32;
    u64 => read_u64, write_u64;
    i8  => read_i8,  write_i8;
    i16 => read_i16, write_i16;
    i32 => read_i32, write_i32;
    i64 => read_i64, write_i64;
    f32 => read_f32, write_f32;
    f64 => read_f64, write_f64;
}

impl Codec for bool {
    fn read(reader: &mut MessageReader<'_>) -> Result<Self, DecodeError> {
        reader.read_bool()
    }

    fn write(&self, writer: &mut MessageWriter) {
        writer.write_bool(*self);
    }
}

impl Codec for String {
    fn read(reader: &mut MessageReader<'_>) -> Result<Self, DecodeError> {
        reader.read_string()
    }

    fn write(&self, writer: &mut MessageWriter) {
        writer.write_string(self);
    }
}

impl<T: Codec> Codec for Vec<T> {
    fn read(reader: &mut MessageReader<'_>) -> Result<Self, DecodeError> {
        reader.read_array()
    }

    fn write(&self, writer: &mut MessageWriter) {
        writer.write_array(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_roundtrip() {
        let mut w = MessageWriter::new();
        w.write_u8(0xab);
        w.write_u16(0xbeef);
        w.write_u32(0xdead_beef);
        w.write_u64(0x0123_4567_89ab_cdef);
        w.write_i8(-5);
        w.write_i16(-300);
        w.write_i32(-70_000);
        w.write_i64(-5_000_000_000);
        w.write_f32(1.5);
        w.write_f64(-2.25);

        let body = w.into_vec();
        let mut r = MessageReader::new(&body);
        assert_eq!(r.read_u8().unwrap(), 0xab);
        assert_eq!(r.read_u16().unwrap(), 0xbeef);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_u64().unwrap(), 0x0123_4567_89ab_cdef);
        assert_eq!(r.read_i8().unwrap(), -5);
        assert_eq!(r.read_i16().unwrap(), -300);
        assert_eq!(r.read_i32().unwrap(), -70_000);
        assert_eq!(r.read_i64().unwrap(), -5_000_000_000);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_f64().unwrap(), -2.25);
        assert!(r.is_empty());
    }

    #[test]
    fn test_little_endian_layout() {
        let mut w = MessageWriter::new();
        w.write_u32(0x0102_0304);
        assert_eq!(w.as_slice(), &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_bool_nonzero_is_true() {
        let mut r = MessageReader::new(&[0, 1, 42]);
        assert!(!r.read_bool().unwrap());
        assert!(r.read_bool().unwrap());
        assert!(r.read_bool().unwrap());
    }

    #[test]
    fn test_string_roundtrip() {
        let mut w = MessageWriter::new();
        w.write_string("topic/depth");
        let body = w.into_vec();
        assert_eq!(&body[..4], &11u32.to_le_bytes());

        let mut r = MessageReader::new(&body);
        assert_eq!(r.read_string().unwrap(), "topic/depth");
    }

    #[test]
    fn test_string_invalid_utf8() {
        let mut body = 2u32.to_le_bytes().to_vec();
        body.extend_from_slice(&[0xff, 0xfe]);
        let mut r = MessageReader::new(&body);
        assert_eq!(r.read_string(), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_string_truncated_body() {
        let mut body = 10u32.to_le_bytes().to_vec();
        body.extend_from_slice(b"abc");
        let mut r = MessageReader::new(&body);
        assert!(matches!(
            r.read_string(),
            Err(DecodeError::Truncated { needed: 7, .. })
        ));
    }

    #[test]
    fn test_truncated_primitive() {
        let mut r = MessageReader::new(&[1, 2]);
        assert!(matches!(r.read_u32(), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_array_roundtrip() {
        let values: Vec<i32> = vec![3, -1, 4_000];
        let mut w = MessageWriter::new();
        w.write_array(&values);
        let body = w.into_vec();

        let mut r = MessageReader::new(&body);
        assert_eq!(r.read_array::<i32>().unwrap(), values);
    }

    #[test]
    fn test_array_count_beyond_buffer() {
        // Declares 1000 elements but carries none.
        let body = 1000u32.to_le_bytes();
        let mut r = MessageReader::new(&body);
        assert!(matches!(
            r.read_array::<u8>(),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_nested_array_via_codec() {
        let values: Vec<Vec<u16>> = vec![vec![1, 2], vec![], vec![9]];
        let mut w = MessageWriter::new();
        values.write(&mut w);
        let body = w.into_vec();

        let mut r = MessageReader::new(&body);
        assert_eq!(Vec::<Vec<u16>>::read(&mut r).unwrap(), values);
        assert!(r.is_empty());
    }

    #[test]
    fn test_read_bytes_exact() {
        let mut r = MessageReader::new(b"abcdef");
        assert_eq!(r.read_bytes(3).unwrap(), b"abc");
        assert_eq!(r.position(), 3);
        assert!(r.read_bytes(4).is_err());
    }
}
