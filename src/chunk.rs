//! Chunk headers, the self-describing unit every resource container is built from.

use log::trace;

use crate::err::{ResError, Result};
use crate::utils::bytes;

pub const RES_NULL_TYPE: u16 = 0x0000;
pub const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub const RES_TABLE_TYPE: u16 = 0x0002;
pub const RES_XML_TYPE: u16 = 0x0003;

pub const RES_XML_FIRST_CHUNK_TYPE: u16 = 0x0100;
pub const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
pub const RES_XML_END_NAMESPACE_TYPE: u16 = 0x0101;
pub const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
pub const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
pub const RES_XML_CDATA_TYPE: u16 = 0x0104;
pub const RES_XML_LAST_CHUNK_TYPE: u16 = 0x017f;
pub const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;

pub const RES_TABLE_PACKAGE_TYPE: u16 = 0x0200;
pub const RES_TABLE_TYPE_TYPE: u16 = 0x0201;
pub const RES_TABLE_TYPE_SPEC_TYPE: u16 = 0x0202;

/// `type(u16) headerSize(u16) size(u32)`, little-endian, plus the absolute offset it was read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_type: u16,
    pub header_size: u16,
    pub size: u32,
    pub offset: usize,
}

impl ChunkHeader {
    pub const SIZE: usize = 8;

    /// Read a header at `offset` and check `header_size <= size` and that the chunk fits in `buf`.
    pub fn read(buf: &[u8], offset: usize) -> Result<Self> {
        let raw = bytes::slice_r(buf, offset, Self::SIZE, "chunk header")?;
        let header = ChunkHeader {
            chunk_type: u16::from_le_bytes([raw[0], raw[1]]),
            header_size: u16::from_le_bytes([raw[2], raw[3]]),
            size: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            offset,
        };
        header.validate(buf.len())?;
        Ok(header)
    }

    /// Geometry check: `8 <= header_size <= size` and `offset + size <= limit`.
    pub fn validate(&self, limit: usize) -> Result<()> {
        if (self.header_size as usize) < Self::SIZE {
            return Err(ResError::malformed(
                "chunk header",
                self.offset,
                format!("header size {} is smaller than a chunk header", self.header_size),
            ));
        }
        if self.header_size as u32 > self.size {
            return Err(ResError::malformed(
                "chunk header",
                self.offset,
                format!(
                    "header size {} exceeds chunk size {}",
                    self.header_size, self.size
                ),
            ));
        }
        let end = self.offset.checked_add(self.size as usize);
        if end.is_none_or(|end| end > limit) {
            return Err(bytes::truncated(
                "chunk",
                self.offset,
                self.size as usize,
                limit,
            ));
        }
        Ok(())
    }

    /// Reject a chunk whose type tag is not `expected`.
    pub fn expect_type(&self, expected: u16) -> Result<()> {
        if self.chunk_type != expected {
            return Err(ResError::UnexpectedChunkType {
                expected,
                found: self.chunk_type,
                offset: self.offset as u64,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.size as usize
    }

    /// Absolute offset of the first byte after the header.
    #[inline]
    pub fn body_offset(&self) -> usize {
        self.offset + self.header_size as usize
    }

    #[inline]
    pub fn body_len(&self) -> usize {
        self.size as usize - self.header_size as usize
    }

    pub fn is_xml_node(&self) -> bool {
        (RES_XML_FIRST_CHUNK_TYPE..=RES_XML_LAST_CHUNK_TYPE).contains(&self.chunk_type)
    }
}

/// Iterates the chunks packed inside `[start, end)` of a parent.
///
/// Fewer than 8 trailing bytes end the walk; a child that is malformed or overruns the parent
/// yields an error and ends the walk.
pub(crate) struct ChildChunks<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
    failed: bool,
}

impl<'a> ChildChunks<'a> {
    pub(crate) fn new(buf: &'a [u8], start: usize, end: usize) -> Self {
        ChildChunks {
            buf,
            pos: start,
            end: end.min(buf.len()),
            failed: false,
        }
    }
}

impl Iterator for ChildChunks<'_> {
    type Item = Result<ChunkHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos.saturating_add(ChunkHeader::SIZE) > self.end {
            return None;
        }
        let parent = &self.buf[..self.end];
        match ChunkHeader::read(parent, self.pos) {
            Ok(header) => {
                trace!(
                    "chunk 0x{:04x} at offset {} (header {}, size {})",
                    header.chunk_type, header.offset, header.header_size, header.size
                );
                self.pos = header.end();
                Some(Ok(header))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
