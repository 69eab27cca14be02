//! Byte-slice utilities for bounds-oriented parsing.
//!
//! There are two layers:
//! - **Option layer** (`read_*`): zero-cost helpers that return `Option<T>`.
//!   Use these when a miss is a normal outcome (e.g. an offset table lookup).
//! - **Result layer** (`*_r`): wrappers that map `None` to `ResError::Truncated`.
//!   Use these while decoding chunk structures.
//!
//! Design notes:
//! - Numeric reads take the byte order as a `byteorder::ByteOrder` type parameter. Resource
//!   chunks are always little-endian; big-endian reads exist for [`ByteCursor`](super::ByteCursor).
//! - Offsets are `usize` and are interpreted relative to the slice you pass in.
//! - Prefer a single up-front bounds check with [`slice_r`] when parsing fixed-size records.

use byteorder::{ByteOrder, LittleEndian};

use crate::err::{ResError, Result};

/// Read `N` raw bytes at `offset`.
///
/// Returns `None` if the range is out of bounds.
pub(crate) fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    let bytes: [u8; N] = buf.get(offset..end)?.try_into().ok()?;
    Some(bytes)
}

pub(crate) fn read_u8(buf: &[u8], offset: usize) -> Option<u8> {
    buf.get(offset).copied()
}

pub(crate) fn read_u16<E: ByteOrder>(buf: &[u8], offset: usize) -> Option<u16> {
    Some(E::read_u16(&read_array::<2>(buf, offset)?))
}

pub(crate) fn read_u32<E: ByteOrder>(buf: &[u8], offset: usize) -> Option<u32> {
    Some(E::read_u32(&read_array::<4>(buf, offset)?))
}

pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    read_u16::<LittleEndian>(buf, offset)
}

pub(crate) fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    read_u32::<LittleEndian>(buf, offset)
}

#[inline]
pub(crate) fn truncated(what: &'static str, offset: usize, need: usize, len: usize) -> ResError {
    ResError::Truncated {
        what,
        offset: offset as u64,
        need,
        have: len.saturating_sub(offset),
    }
}

pub(crate) fn slice_r<'a>(
    buf: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| truncated(what, offset, len, buf.len()))?;
    buf.get(offset..end)
        .ok_or_else(|| truncated(what, offset, len, buf.len()))
}

/// Read a `u32` (little-endian) at `offset`, or return `ResError::Truncated`.
pub(crate) fn read_u32_le_r(buf: &[u8], offset: usize, what: &'static str) -> Result<u32> {
    read_u32_le(buf, offset).ok_or_else(|| truncated(what, offset, 4, buf.len()))
}
