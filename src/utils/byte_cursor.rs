use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::err::{ResError, Result};
use crate::utils::bytes;
use crate::utils::utf16::decode_utf16_units_z;

/// Byte order used by a [`ByteCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// A lightweight cursor over an immutable byte slice.
///
/// This is the slice/offset equivalent of `Cursor<&[u8]>`, intended for chunk parsing where:
/// - the data is already in memory, and
/// - we want explicit bounds/offset control without IO-style error plumbing.
///
/// Reads are little-endian unless the cursor was switched with [`ByteCursor::big_endian`].
/// Every integer is returned widened and unsigned, and every read advances the cursor on success.
#[derive(Clone, Copy, Debug)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteCursor {
            buf,
            pos: 0,
            endian: Endian::Little,
        }
    }

    #[inline]
    pub fn with_pos(buf: &'a [u8], pos: usize) -> Result<Self> {
        // Allow pos == len (EOF), reject pos > len.
        let _ = bytes::slice_r(buf, pos, 0, "cursor.position")?;
        Ok(ByteCursor {
            buf,
            pos,
            endian: Endian::Little,
        })
    }

    pub fn big_endian(mut self) -> Self {
        self.endian = Endian::Big;
        self
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn buf(&self) -> &'a [u8] {
        self.buf
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    #[inline]
    pub fn set_pos(&mut self, pos: usize, what: &'static str) -> Result<()> {
        let _ = bytes::slice_r(self.buf, pos, 0, what)?;
        self.pos = pos;
        Ok(())
    }

    #[inline]
    pub fn skip(&mut self, n: usize, what: &'static str) -> Result<()> {
        let new_pos = self
            .pos
            .checked_add(n)
            .ok_or_else(|| bytes::truncated(what, self.pos, n, self.buf.len()))?;
        self.set_pos(new_pos, what)
    }

    #[inline]
    pub fn take_bytes(&mut self, len: usize, what: &'static str) -> Result<&'a [u8]> {
        let out = bytes::slice_r(self.buf, self.pos, len, what)?;
        self.pos += len;
        Ok(out)
    }

    #[inline]
    pub fn u8_named(&mut self, what: &'static str) -> Result<u8> {
        let b = bytes::read_u8(self.buf, self.pos)
            .ok_or_else(|| bytes::truncated(what, self.pos, 1, self.buf.len()))?;
        self.pos += 1;
        Ok(b)
    }

    #[inline]
    pub fn u16_named(&mut self, what: &'static str) -> Result<u16> {
        let raw = self.take_bytes(2, what)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_u16(raw),
            Endian::Big => BigEndian::read_u16(raw),
        })
    }

    #[inline]
    pub fn u32_named(&mut self, what: &'static str) -> Result<u32> {
        let raw = self.take_bytes(4, what)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_u32(raw),
            Endian::Big => BigEndian::read_u32(raw),
        })
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.u8_named("u8")
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.u16_named("u16")
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.u32_named("u32")
    }

    /// Read an unsigned integer of `width` bytes (1 to 4).
    pub fn uint(&mut self, width: usize, what: &'static str) -> Result<u32> {
        if !(1..=4).contains(&width) {
            return Err(ResError::malformed(
                what,
                self.pos,
                format!("unsupported integer width {width}"),
            ));
        }
        let raw = self.take_bytes(width, what)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_uint(raw, width) as u32,
            Endian::Big => BigEndian::read_uint(raw, width) as u32,
        })
    }

    /// Read `count` consecutive 32-bit words.
    pub fn u32_array(&mut self, count: usize, what: &'static str) -> Result<Vec<u32>> {
        let len = count
            .checked_mul(4)
            .ok_or_else(|| bytes::truncated(what, self.pos, usize::MAX, self.buf.len()))?;
        // One bounds check for the whole table.
        let _ = bytes::slice_r(self.buf, self.pos, len, what)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.u32_named(what)?);
        }
        Ok(out)
    }

    /// Read `count` UTF-16 code units.
    pub fn wide_chars(&mut self, count: usize, what: &'static str) -> Result<Vec<u16>> {
        let len = count
            .checked_mul(2)
            .ok_or_else(|| bytes::truncated(what, self.pos, usize::MAX, self.buf.len()))?;
        let _ = bytes::slice_r(self.buf, self.pos, len, what)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.u16_named(what)?);
        }
        Ok(out)
    }

    /// Read a fixed-width UTF-16 field of `count` code units, decoding up to the first NUL.
    pub fn utf16_fixed(&mut self, count: usize, what: &'static str) -> Result<String> {
        let start = self.pos;
        let units = self.wide_chars(count, what)?;
        decode_utf16_units_z(&units).map_err(|_| ResError::malformed(what, start, "invalid UTF-16"))
    }
}
