use bitflags::bitflags;
use serde::Serialize;

use crate::err::{ResError, Result};
use crate::utils::ByteCursor;
use crate::value::ResValue;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryFlags: u16 {
        /// The entry is a bag (`ResTable_map_entry`).
        const COMPLEX = 0x0001;
        const PUBLIC = 0x0002;
        const WEAK = 0x0004;
    }
}

/// `size(u16) flags(u16) key(u32)`.
const ENTRY_HEADER_SIZE: usize = 8;
/// Header plus `parent(u32) count(u32)`.
const MAP_ENTRY_HEADER_SIZE: usize = 16;
/// `name(u32)` plus a value.
const MAP_ITEM_SIZE: usize = 4 + ResValue::SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MapItem {
    pub name: u32,
    pub value: ResValue,
}

/// A decoded table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Simple {
        flags: EntryFlags,
        key: u32,
        value: ResValue,
    },
    Complex {
        flags: EntryFlags,
        key: u32,
        parent: u32,
        items: Vec<MapItem>,
    },
}

impl Entry {
    /// Decode the entry at `offset`; `buf` must end at the enclosing type chunk.
    pub(crate) fn read(buf: &[u8], offset: usize) -> Result<Self> {
        let mut cursor = ByteCursor::with_pos(buf, offset)?;
        let size = cursor.u16_named("entry size")? as usize;
        let flags = EntryFlags::from_bits_retain(cursor.u16_named("entry flags")?);
        let key = cursor.u32_named("entry key")?;
        if size < ENTRY_HEADER_SIZE {
            return Err(ResError::malformed(
                "entry",
                offset,
                format!("entry size {size} is smaller than its header"),
            ));
        }

        if !flags.contains(EntryFlags::COMPLEX) {
            cursor.set_pos(offset + size, "entry value")?;
            let value = ResValue::read(&mut cursor)?;
            return Ok(Entry::Simple { flags, key, value });
        }

        let (parent, count) = if size >= MAP_ENTRY_HEADER_SIZE {
            (
                cursor.u32_named("map entry parent")?,
                cursor.u32_named("map entry count")?,
            )
        } else {
            (0, 0)
        };

        cursor.set_pos(offset + size, "map entry items")?;
        let need = (count as usize).saturating_mul(MAP_ITEM_SIZE);
        if need > cursor.remaining() {
            return Err(ResError::malformed(
                "map entry",
                offset,
                format!(
                    "{count} items need {need} bytes, only {} remain",
                    cursor.remaining()
                ),
            ));
        }

        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let item_start = cursor.pos();
            let name = cursor.u32_named("map item name")?;
            let value = ResValue::read(&mut cursor)?;
            items.push(MapItem { name, value });
            // Items advance by the value's declared size.
            let stride = 4 + (value.size as usize).max(ResValue::SIZE);
            cursor.set_pos(item_start + stride, "next map item")?;
        }

        Ok(Entry::Complex {
            flags,
            key,
            parent,
            items,
        })
    }

    pub fn key(&self) -> u32 {
        match self {
            Entry::Simple { key, .. } | Entry::Complex { key, .. } => *key,
        }
    }

    pub fn flags(&self) -> EntryFlags {
        match self {
            Entry::Simple { flags, .. } | Entry::Complex { flags, .. } => *flags,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Entry::Complex { .. })
    }

    pub fn value(&self) -> Option<&ResValue> {
        match self {
            Entry::Simple { value, .. } => Some(value),
            Entry::Complex { .. } => None,
        }
    }
}
