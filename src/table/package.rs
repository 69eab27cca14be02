use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace, warn};

use crate::FastMap;
use crate::chunk::{
    ChildChunks, ChunkHeader, RES_STRING_POOL_TYPE, RES_TABLE_TYPE_SPEC_TYPE, RES_TABLE_TYPE_TYPE,
};
use crate::config::ResTableConfig;
use crate::err::{ResError, Result};
use crate::string_pool::StringPool;
use crate::table::TableHeader;
use crate::table::entry::Entry;
use crate::utils::{ByteCursor, IndexedIntArray};

/// Offset-table sentinel for "no entry in this variant".
pub const NO_ENTRY: u32 = 0xffff_ffff;

/// Wide characters reserved for the package name.
const PACKAGE_NAME_LEN: usize = 128;
/// Smallest entry record, used to bound `entriesStart`.
const MIN_ENTRY_SIZE: u32 = 8;

/// One configuration-specific slice of a type.
#[derive(Debug)]
pub(crate) struct Variant {
    pub(crate) config: ResTableConfig,
    data: Arc<[u8]>,
    chunk_end: usize,
    entries_start: usize,
    offsets: IndexedIntArray,
    cache: Mutex<FastMap<u32, Arc<Entry>>>,
}

impl Variant {
    /// Offset of entry `index` relative to the entry data, or `None` if absent.
    pub(crate) fn entry_offset(&self, index: usize) -> Option<u32> {
        self.offsets.get(index).filter(|&off| off != NO_ENTRY)
    }

    /// Decode (or fetch the cached) entry at `offset`.
    pub(crate) fn entry_at(&self, offset: u32) -> Result<Arc<Entry>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = cache.get(&offset) {
            return Ok(entry.clone());
        }

        let abs = self
            .entries_start
            .checked_add(offset as usize)
            .filter(|&abs| abs < self.chunk_end)
            .ok_or_else(|| {
                ResError::malformed(
                    "type chunk",
                    self.entries_start,
                    format!("entry offset {offset} is past the chunk"),
                )
            })?;
        let entry = Arc::new(Entry::read(&self.data[..self.chunk_end], abs)?);
        trace!("decoded entry at offset {abs}");
        cache.insert(offset, entry.clone());
        Ok(entry)
    }
}

#[derive(Debug)]
pub(crate) struct ResType {
    pub(crate) entry_count: usize,
    spec_flags: Option<IndexedIntArray>,
    pub(crate) variants: Vec<Variant>,
}

impl ResType {
    /// typeSpec flags of `entry`, `None` when the type had no spec chunk.
    pub(crate) fn spec_flags(&self, entry: usize) -> Option<u32> {
        self.spec_flags.as_ref().and_then(|flags| flags.get(entry))
    }
}

/// A decoded package chunk.
#[derive(Debug)]
pub(crate) struct Package {
    pub(crate) header: Arc<TableHeader>,
    pub(crate) id: u32,
    pub(crate) name: String,
    pub(crate) type_strings: StringPool,
    pub(crate) key_strings: StringPool,
    types: Vec<Option<ResType>>,
}

impl Package {
    /// Decode a package chunk. Returns `Ok(None)` for ids outside 1..=255, which cannot be
    /// addressed by a resource id.
    pub(crate) fn parse(
        data: &Arc<[u8]>,
        chunk: ChunkHeader,
        header: Arc<TableHeader>,
    ) -> Result<Option<Package>> {
        let buf = &data[..chunk.end()];
        let mut cursor = ByteCursor::with_pos(buf, chunk.offset + ChunkHeader::SIZE)?;
        let id = cursor.u32_named("package id")?;
        let name = cursor.utf16_fixed(PACKAGE_NAME_LEN, "package name")?;
        let type_strings = cursor.u32_named("package type strings")?;
        let _last_public_type = cursor.u32_named("package last public type")?;
        let key_strings = cursor.u32_named("package key strings")?;
        let _last_public_key = cursor.u32_named("package last public key")?;

        check_pool_offset(chunk, type_strings, "type strings")?;
        check_pool_offset(chunk, key_strings, "key strings")?;

        if id == 0 || id >= 256 {
            warn!("package `{name}` has id 0x{id:x}, which cannot be addressed; skipping it");
            return Ok(None);
        }

        let pool_at = |rel: u32| {
            let start = chunk.offset + rel as usize;
            StringPool::parse(data.clone(), start, chunk.end() - start)
        };
        let mut package = Package {
            header,
            id,
            name,
            type_strings: pool_at(type_strings)?,
            key_strings: pool_at(key_strings)?,
            types: Vec::new(),
        };
        debug!(
            "package 0x{:02x} `{}`: {} type names, {} key names",
            package.id,
            package.name,
            package.type_strings.count(),
            package.key_strings.count()
        );

        for child in ChildChunks::new(data, chunk.body_offset(), chunk.end()) {
            let child = child?;
            match child.chunk_type {
                RES_TABLE_TYPE_SPEC_TYPE => package.parse_type_spec(data, child)?,
                RES_TABLE_TYPE_TYPE => package.parse_type(data, child)?,
                RES_STRING_POOL_TYPE => {}
                other => trace!(
                    "skipping chunk 0x{other:04x} at offset {} in package 0x{id:02x}",
                    child.offset
                ),
            }
        }

        Ok(Some(package))
    }

    pub(crate) fn type_at(&self, index: usize) -> Option<&ResType> {
        self.types.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn type_count(&self) -> usize {
        self.types.len()
    }

    fn slot(&mut self, id: u8, chunk: ChunkHeader) -> Result<&mut Option<ResType>> {
        if id == 0 {
            return Err(ResError::malformed("type chunk", chunk.offset, "type id is 0"));
        }
        let index = id as usize - 1;
        if self.types.len() <= index {
            self.types.resize_with(index + 1, || None);
        }
        Ok(&mut self.types[index])
    }

    fn parse_type_spec(&mut self, data: &Arc<[u8]>, chunk: ChunkHeader) -> Result<()> {
        let mut cursor = ByteCursor::with_pos(&data[..chunk.end()], chunk.offset + ChunkHeader::SIZE)?;
        let id = cursor.u8_named("type spec id")?;
        cursor.skip(3, "type spec reserved")?;
        let entry_count = cursor.u32_named("type spec entry count")? as usize;
        check_offset_table(chunk, entry_count, "type spec")?;

        let flags = IndexedIntArray::new(
            data.clone(),
            chunk.body_offset(),
            entry_count,
            "type spec flags",
        )?;
        let slot = self.slot(id, chunk)?;
        if slot.is_some() {
            return Err(ResError::malformed(
                "type spec",
                chunk.offset,
                format!("duplicate type spec for type {id}"),
            ));
        }
        *slot = Some(ResType {
            entry_count,
            spec_flags: Some(flags),
            variants: Vec::new(),
        });
        Ok(())
    }

    fn parse_type(&mut self, data: &Arc<[u8]>, chunk: ChunkHeader) -> Result<()> {
        let mut cursor = ByteCursor::with_pos(&data[..chunk.end()], chunk.offset + ChunkHeader::SIZE)?;
        let id = cursor.u8_named("type id")?;
        cursor.skip(3, "type reserved")?;
        let entry_count = cursor.u32_named("type entry count")? as usize;
        let entries_start = cursor.u32_named("type entries start")?;
        let config = ResTableConfig::read(&mut cursor)?;

        check_offset_table(chunk, entry_count, "type")?;
        if entry_count != 0 && entries_start > chunk.size - MIN_ENTRY_SIZE {
            return Err(ResError::malformed(
                "type",
                chunk.offset,
                format!(
                    "entries start {entries_start} is past chunk size {}",
                    chunk.size
                ),
            ));
        }

        let offsets = IndexedIntArray::new(
            data.clone(),
            chunk.body_offset(),
            entry_count,
            "entry offsets",
        )?;
        let slot = self.slot(id, chunk)?;
        if let Some(existing) = slot.as_ref() {
            if existing.entry_count != entry_count {
                return Err(ResError::malformed(
                    "type",
                    chunk.offset,
                    format!(
                        "entry count {entry_count} differs from the type spec's {}",
                        existing.entry_count
                    ),
                ));
            }
        }
        let ty = slot.get_or_insert_with(|| ResType {
            entry_count,
            spec_flags: None,
            variants: Vec::new(),
        });

        if config.has_locale() {
            debug!("skipping localized variant {config} of type {id}");
            return Ok(());
        }

        trace!("type {id} variant {config}: {entry_count} entries");
        ty.variants.push(Variant {
            config,
            data: data.clone(),
            chunk_end: chunk.end(),
            entries_start: chunk.offset + entries_start as usize,
            offsets,
            cache: Mutex::new(FastMap::default()),
        });
        Ok(())
    }
}

fn check_pool_offset(chunk: ChunkHeader, offset: u32, what: &'static str) -> Result<()> {
    if offset >= chunk.size {
        return Err(ResError::malformed(
            "package",
            chunk.offset,
            format!("{what} offset {offset} is past package size {}", chunk.size),
        ));
    }
    if offset & 0x3 != 0 {
        return Err(ResError::malformed(
            "package",
            chunk.offset,
            format!("{what} offset {offset} is not 4-byte aligned"),
        ));
    }
    Ok(())
}

/// `headerSize + 4 * entryCount` must fit in the chunk.
fn check_offset_table(chunk: ChunkHeader, entry_count: usize, what: &'static str) -> Result<()> {
    let need = entry_count
        .checked_mul(4)
        .and_then(|n| n.checked_add(chunk.header_size as usize));
    if need.is_none_or(|need| need > chunk.size as usize) {
        return Err(ResError::malformed(
            what,
            chunk.offset,
            format!(
                "{entry_count} entries do not fit in chunk size {}",
                chunk.size
            ),
        ));
    }
    Ok(())
}
