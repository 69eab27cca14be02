use std::sync::Arc;

use crate::err::Result;
use crate::utils::bytes;

/// Random-access view of a shared buffer as little-endian 32-bit words.
///
/// The whole span is bounds-checked once in [`IndexedIntArray::new`]; lookups after that only
/// check the index.
#[derive(Clone)]
pub struct IndexedIntArray {
    data: Arc<[u8]>,
    offset: usize,
    len: usize,
}

impl IndexedIntArray {
    pub fn new(data: Arc<[u8]>, offset: usize, len: usize, what: &'static str) -> Result<Self> {
        let byte_len = len
            .checked_mul(4)
            .ok_or_else(|| bytes::truncated(what, offset, usize::MAX, data.len()))?;
        let _ = bytes::slice_r(&data, offset, byte_len, what)?;
        Ok(IndexedIntArray { data, offset, len })
    }

    pub fn empty() -> Self {
        IndexedIntArray {
            data: Arc::from(Vec::<u8>::new()),
            offset: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<u32> {
        if index >= self.len {
            return None;
        }
        bytes::read_u32_le(&self.data, self.offset + index * 4)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Absolute offset of the first word.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len).filter_map(move |i| self.get(i))
    }

    /// Absolute offset one past the last word.
    pub fn end(&self) -> usize {
        self.offset + self.len * 4
    }
}

impl std::fmt::Debug for IndexedIntArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedIntArray")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_indexes_words() {
        let mut buf = vec![0xaa, 0xbb];
        for w in [7u32, 0xffff_ffff, 42] {
            buf.extend_from_slice(&w.to_le_bytes());
        }
        let array = IndexedIntArray::new(Arc::from(buf), 2, 3, "offsets").unwrap();
        assert_eq!(array.get(0), Some(7));
        assert_eq!(array.get(1), Some(0xffff_ffff));
        assert_eq!(array.get(3), None);
        assert_eq!(array.end(), 14);
        assert_eq!(array.iter().collect::<Vec<_>>(), vec![7, 0xffff_ffff, 42]);
    }

    #[test]
    fn test_rejects_span_past_end() {
        let data: Arc<[u8]> = Arc::from(vec![0u8; 8]);
        assert!(IndexedIntArray::new(data.clone(), 4, 2, "offsets").is_err());
        assert!(IndexedIntArray::new(data, 0, usize::MAX, "offsets").is_err());
        assert!(IndexedIntArray::empty().is_empty());
    }
}
