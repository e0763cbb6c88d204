//! Random-access byte cursor
//!
//! Both decoders read their files through a [`ByteStream`], which owns the
//! file bytes and a cursor position. Every read checks bounds and advances
//! the cursor by the number of bytes consumed; reading past the end is a
//! [`FlipnoteError::UnexpectedEof`].

use crate::{FlipnoteError, Result};

/// Origin for [`ByteStream::seek`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Offset from the start of the buffer
    Begin,
    /// Offset from the current position
    Current,
    /// Offset from the end of the buffer
    End,
}

/// Owned byte buffer with a read cursor
#[derive(Debug, Clone)]
pub struct ByteStream {
    data: Vec<u8>,
    pos: usize,
}

impl ByteStream {
    /// Wrap a buffer, cursor at offset 0
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Total buffer length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The whole underlying buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Give the buffer back
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Move the cursor. Positions outside `[0, len]` are rejected.
    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()> {
        let base = match origin {
            SeekOrigin::Begin => 0,
            SeekOrigin::Current => self.pos as i64,
            SeekOrigin::End => self.data.len() as i64,
        };
        let target = base + offset;
        if target < 0 || target > self.data.len() as i64 {
            return Err(FlipnoteError::MalformedInput(format!(
                "seek to {target:#x} outside buffer of {} bytes",
                self.data.len()
            )));
        }
        self.pos = target as usize;
        Ok(())
    }

    /// Shorthand for an absolute seek
    pub fn seek_to(&mut self, offset: usize) -> Result<()> {
        self.seek(offset as i64, SeekOrigin::Begin)
    }

    /// Bounds-checked slice `[offset, offset + length)` that does not move the cursor
    pub fn slice(&self, offset: usize, length: usize) -> Result<&[u8]> {
        offset
            .checked_add(length)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(FlipnoteError::UnexpectedEof {
                offset,
                wanted: length,
                len: self.data.len(),
            })
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(self.pos, N)?);
        self.pos += N;
        Ok(out)
    }

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a signed byte
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take::<1>()?[0] as i8)
    }

    /// Read a little-endian `u16`
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    /// Read a big-endian `u16`
    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    /// Read a little-endian `i16`
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    /// Read a little-endian `u32`
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Read a big-endian `u32`
    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    /// Read a little-endian `i32`
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    /// Read a big-endian `i32`
    pub fn read_i32_be(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    /// Borrow the next `count` bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<&[u8]> {
        let start = self.pos;
        self.slice(start, count)?;
        self.pos += count;
        Ok(&self.data[start..start + count])
    }

    /// Read `count` bytes as upper-case hex, optionally in reverse byte order
    pub fn read_hex(&mut self, count: usize, reverse: bool) -> Result<String> {
        let bytes = self.read_bytes(count)?;
        let mut hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
        if reverse {
            hex.reverse();
        }
        Ok(hex.concat())
    }

    /// Read a fixed-length ASCII field, stopping at the first NUL
    ///
    /// The cursor always advances by `count`.
    pub fn read_chars(&mut self, count: usize) -> Result<String> {
        let bytes = self.read_bytes(count)?;
        Ok(bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect())
    }

    /// Read `count` UTF-16LE code units, stopping at the first zero unit
    ///
    /// Each unit maps to the code point of the same value. Surrogate pairs
    /// are not combined, and since a `char` cannot hold a surrogate, every
    /// unit in 0xD800..=0xDFFF becomes U+FFFD instead.
    /// The cursor always advances by `count * 2`.
    pub fn read_wide_chars(&mut self, count: usize) -> Result<String> {
        let bytes = self.read_bytes(count * 2)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
            .take_while(|&unit| unit != 0)
            .map(|unit| char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())
    }
}
