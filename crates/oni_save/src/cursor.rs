//! Little-endian binary cursor
//!
//! `ByteReader` walks a borrowed buffer and reports every failure with the
//! absolute stream offset (`base + position`). `ByteWriter` is its exact
//! mirror: anything read with one can be re-emitted with the other.

use crate::error::{Result, SaveError};

/// Forward-only reader over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.take(std::mem::size_of::<$ty>())?;
            let mut raw = [0u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(bytes);
            Ok(<$ty>::from_le_bytes(raw))
        }
    };
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, base: 0 }
    }

    /// Reader whose reported offsets start at `base` instead of zero.
    pub fn with_base(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    /// Absolute offset of the next byte.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn checkpoint(&self) -> usize {
        self.pos
    }

    /// Roll back to a position previously returned by `checkpoint`.
    pub fn rewind(&mut self, checkpoint: usize) {
        debug_assert!(checkpoint <= self.pos);
        self.pos = checkpoint.min(self.buf.len());
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if n > available {
            return Err(SaveError::TruncatedStream {
                offset: self.base + self.buf.len(),
                needed: n,
                available,
            });
        }
        let buf: &'a [u8] = self.buf;
        let slice = &buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    read_le!(read_i8, i8);
    read_le!(read_u8, u8);
    read_le!(read_i16, i16);
    read_le!(read_u16, u16);
    read_le!(read_i32, i32);
    read_le!(read_u32, u32);
    read_le!(read_i64, i64);
    read_le!(read_u64, u64);
    read_le!(read_f32, f32);
    read_le!(read_f64, f64);

    /// One byte, any non-zero value is `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Everything that has not been consumed yet.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.pos..];
        self.pos = buf.len();
        rest
    }

    /// Split off the next `n` bytes as an independent reader that keeps
    /// absolute offsets. The parent advances past them.
    pub fn sub_reader(&mut self, n: usize) -> Result<ByteReader<'a>> {
        let base = self.offset();
        let bytes = self.take(n)?;
        Ok(ByteReader::with_base(bytes, base))
    }

    /// Length-prefixed (`i32`) UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let at = self.offset();
        let len = self.read_i32()?;
        if len < 0 {
            return Err(SaveError::corrupt(at, format!("negative string length {}", len)));
        }
        let len = len as usize;
        if len > self.remaining() {
            return Err(SaveError::corrupt(
                at,
                format!("string length {} exceeds remaining {} bytes", len, self.remaining()),
            ));
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SaveError::corrupt(at, format!("invalid UTF-8 in string: {}", e)))
    }

    /// Count-prefixed array with an `i32` count.
    pub fn read_array<T, F>(&mut self, element: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        self.read_array_with(|r| r.read_i32(), element)
    }

    /// Count-prefixed array with a caller-chosen count encoding. The count is
    /// trusted; element reads fail on their own if the data runs out.
    pub fn read_array_with<T, C, F>(&mut self, count: C, mut element: F) -> Result<Vec<T>>
    where
        C: FnOnce(&mut Self) -> Result<i32>,
        F: FnMut(&mut Self) -> Result<T>,
    {
        let at = self.offset();
        let n = count(self)?;
        if n < 0 {
            return Err(SaveError::corrupt(at, format!("negative element count {}", n)));
        }
        let n = n as usize;
        let mut items = Vec::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            items.push(element(self)?);
        }
        Ok(items)
    }
}

/// Append-only little-endian writer, the mirror of `ByteReader`.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

macro_rules! write_le {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self, value: $ty) {
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    };
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    write_le!(write_i8, i8);
    write_le!(write_u8, u8);
    write_le!(write_i16, i16);
    write_le!(write_u16, u16);
    write_le!(write_i32, i32);
    write_le!(write_u32, u32);
    write_le!(write_i64, i64);
    write_le!(write_u64, u64);
    write_le!(write_f32, f32);
    write_le!(write_f64, f64);

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_i32(value.len() as i32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_array<T, F>(&mut self, items: &[T], mut element: F)
    where
        F: FnMut(&mut Self, &T),
    {
        self.write_i32(items.len() as i32);
        for item in items {
            element(self, item);
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
