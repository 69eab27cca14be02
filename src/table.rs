//! The resource table container: packages, types, variants and resolution.

mod bag;
mod entry;
mod package;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use serde::Serialize;

use crate::FastMap;
use crate::chunk::{ChildChunks, ChunkHeader, RES_STRING_POOL_TYPE, RES_TABLE_PACKAGE_TYPE, RES_TABLE_TYPE};
use crate::config::ResTableConfig;
use crate::err::{ErrorKind, ResError, Result};
use crate::string_pool::StringPool;
use crate::utils::bytes;
use crate::value::{DataType, ResValue};

pub use self::bag::{Bag, BagEntry};
pub(crate) use self::bag::BagSlot;
pub use self::entry::{Entry, EntryFlags, MapItem};
pub use self::package::NO_ENTRY;
use self::package::{Package, Variant};

/// Reference chains longer than this are reported instead of followed.
pub const MAX_REFERENCE_HOPS: usize = 20;

const MAX_PACKAGES: usize = 256;

/// Package id (high byte) of a resource id.
#[inline]
pub const fn package_id(id: u32) -> u32 {
    id >> 24
}

/// Zero-based type index, `None` for type id 0.
#[inline]
pub const fn type_index(id: u32) -> Option<usize> {
    match (id >> 16) & 0xff {
        0 => None,
        t => Some(t as usize - 1),
    }
}

#[inline]
pub const fn entry_index(id: u32) -> usize {
    (id & 0xffff) as usize
}

/// Pack package id, zero-based type index and entry index into a resource id.
#[inline]
pub const fn make_id(package: u32, type_index: usize, entry: usize) -> u32 {
    (package << 24) | (((type_index as u32 + 1) & 0xff) << 16) | (entry as u32 & 0xffff)
}

/// One buffer added to the table.
#[derive(Debug)]
pub(crate) struct TableHeader {
    pub(crate) cookie: u32,
    pub(crate) size: usize,
    pub(crate) values: StringPool,
}

/// All packages sharing one package id: the base package and its overlays, oldest first.
#[derive(Debug)]
pub(crate) struct PackageGroup {
    pub(crate) name: String,
    pub(crate) id: u32,
    pub(crate) packages: Vec<Arc<Package>>,
    pub(crate) type_count: usize,
    pub(crate) bags: Mutex<FastMap<u32, BagSlot>>,
}

impl PackageGroup {
    fn new(name: String, id: u32) -> Self {
        PackageGroup {
            name,
            id,
            packages: Vec::new(),
            type_count: 0,
            bags: Mutex::new(FastMap::default()),
        }
    }

    fn push(&mut self, package: Arc<Package>) -> Result<()> {
        self.packages
            .try_reserve(1)
            .map_err(|_| ResError::PackageRegistration {
                id: package.id,
                name: package.name.clone(),
            })?;
        self.type_count = self.type_count.max(package.type_count());
        self.packages.push(package);
        Ok(())
    }

    /// Entry count of type `t` in the base package.
    pub(crate) fn entry_count(&self, t: usize) -> usize {
        self.packages
            .first()
            .and_then(|p| p.type_at(t))
            .map_or(0, |ty| ty.entry_count)
    }

    fn clear_bags(&self) {
        self.bags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Entry chosen by [`ResTable::get_entry`].
#[derive(Debug, Clone)]
pub struct EntryMatch {
    pub entry: Arc<Entry>,
    pub config: ResTableConfig,
    /// typeSpec flags of the entry, `None` when its type has no spec chunk.
    pub type_spec_flags: Option<u32>,
}

/// A simple value found for a resource id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedValue {
    pub value: ResValue,
    /// Index of the table the value came from.
    pub block: usize,
    pub type_spec_flags: u32,
    pub config: ResTableConfig,
}

/// End of a reference chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedReference {
    pub value: ResValue,
    /// Table of the final value; `None` while the value still comes from an XML document.
    pub block: Option<usize>,
    /// The last resource id that was followed.
    pub last_ref: Option<u32>,
    pub type_spec_flags: u32,
    pub config: ResTableConfig,
}

/// `package:type/name` of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceName {
    pub package: String,
    pub type_name: String,
    pub name: String,
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.package, self.type_name, self.name)
    }
}

/// A decoded resource table, possibly merged from several buffers.
///
/// Built with [`ResTable::add`]; after that every lookup takes `&self`. Entry and bag caches
/// fill on demand behind mutexes.
#[derive(Debug)]
pub struct ResTable {
    headers: Vec<Arc<TableHeader>>,
    groups: Vec<PackageGroup>,
    /// Package id -> group index + 1; 0 is unmapped.
    package_map: [u8; MAX_PACKAGES],
    params: ResTableConfig,
    error: Option<ResError>,
}

impl Default for ResTable {
    fn default() -> Self {
        ResTable::new()
    }
}

impl ResTable {
    pub fn new() -> Self {
        ResTable {
            headers: Vec::new(),
            groups: Vec::new(),
            package_map: [0; MAX_PACKAGES],
            params: ResTableConfig::default(),
            error: Some(ResError::NotInitialized {
                what: "resource table",
            }),
        }
    }

    /// Decode a whole buffer as one table.
    pub fn parse(data: impl Into<Arc<[u8]>>, cookie: u32) -> Result<Self> {
        let data = data.into();
        let size = data.len();
        let mut table = ResTable::new();
        table.add(data, 0, size, cookie)?;
        Ok(table)
    }

    /// Add the table chunk at `offset` (at most `size` bytes) under `cookie`.
    ///
    /// A failure is sticky: later lookups report it through [`ResTable::status`].
    pub fn add(
        &mut self,
        data: impl Into<Arc<[u8]>>,
        offset: usize,
        size: usize,
        cookie: u32,
    ) -> Result<()> {
        let data = data.into();
        let result = self.add_inner(&data, offset, size, cookie);
        match &result {
            Ok(()) => self.error = None,
            Err(err) => {
                warn!("failed to add resource table with cookie {cookie}: {err}");
                self.error = Some(err.clone());
            }
        }
        result
    }

    fn add_inner(&mut self, data: &Arc<[u8]>, offset: usize, size: usize, cookie: u32) -> Result<()> {
        let limit = offset.saturating_add(size).min(data.len());
        let chunk = ChunkHeader::read(&data[..limit], offset)?;
        chunk.expect_type(RES_TABLE_TYPE)?;
        let package_count =
            bytes::read_u32_le_r(&data[..chunk.end()], offset + ChunkHeader::SIZE, "package count")?;
        debug!(
            "table at offset {offset}: size {}, {package_count} package(s), cookie {cookie}",
            chunk.size
        );

        let mut values = StringPool::new();
        let mut package_chunks = Vec::new();
        for child in ChildChunks::new(data, chunk.body_offset(), chunk.end()) {
            let child = child?;
            match child.chunk_type {
                RES_STRING_POOL_TYPE => {
                    if values.is_loaded() {
                        warn!("multiple value string pools in table, ignoring the one at offset {}", child.offset);
                    } else {
                        values.set_to(data.clone(), child.offset, child.size as usize)?;
                    }
                }
                RES_TABLE_PACKAGE_TYPE => {
                    if package_chunks.len() >= package_count as usize {
                        return Err(ResError::malformed(
                            "table",
                            offset,
                            format!("more package chunks than the declared {package_count}"),
                        ));
                    }
                    package_chunks.push(child);
                }
                other => warn!("unknown chunk type 0x{other:04x} at offset {} in table", child.offset),
            }
        }

        if package_chunks.len() < package_count as usize {
            return Err(ResError::malformed(
                "table",
                offset,
                format!(
                    "declares {package_count} package(s), found {}",
                    package_chunks.len()
                ),
            ));
        }
        values.status()?;

        let header = Arc::new(TableHeader {
            cookie,
            size: chunk.size as usize,
            values,
        });

        let mut packages = Vec::with_capacity(package_chunks.len());
        for package_chunk in package_chunks {
            if let Some(package) = Package::parse(data, package_chunk, header.clone())? {
                packages.push(Arc::new(package));
            }
        }

        self.headers.push(header);
        for package in packages {
            self.register(package)?;
        }
        Ok(())
    }

    /// Add `package` to the group of its id, creating the group on first sight.
    fn register(&mut self, package: Arc<Package>) -> Result<()> {
        let id = package.id as usize;
        let index = match self.package_map[id] {
            0 => {
                self.groups.try_reserve(1).map_err(|_| ResError::PackageRegistration {
                    id: package.id,
                    name: package.name.clone(),
                })?;
                self.groups
                    .push(PackageGroup::new(package.name.clone(), package.id));
                let index = self.groups.len() - 1;
                self.package_map[id] = (index + 1) as u8;
                index
            }
            mapped => {
                debug!(
                    "package 0x{id:02x} `{}` overlays an existing group",
                    package.name
                );
                mapped as usize - 1
            }
        };
        self.groups[index].push(package)
    }

    /// Merge every table of `other` into this one.
    ///
    /// Groups with a package id already present become overlays of that group.
    pub fn add_table(&mut self, other: &ResTable) -> Result<()> {
        if let Some(err) = &other.error {
            self.error = Some(err.clone());
            return Err(err.clone());
        }
        self.headers.extend(other.headers.iter().cloned());
        for group in &other.groups {
            for package in &group.packages {
                self.register(package.clone())?;
            }
        }
        self.clear_bags();
        self.error = None;
        Ok(())
    }

    /// The sticky error of the last failed [`ResTable::add`], or `NoInit` for an empty table.
    pub fn status(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn table_count(&self) -> usize {
        self.headers.len()
    }

    pub fn package_group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn table_cookie(&self, block: usize) -> Option<u32> {
        self.headers.get(block).map(|h| h.cookie)
    }

    pub fn table_size(&self, block: usize) -> Option<usize> {
        self.headers.get(block).map(|h| h.size)
    }

    /// Value string pool of table `block`.
    pub fn table_string_pool(&self, block: usize) -> Option<&StringPool> {
        self.headers.get(block).map(|h| &h.values)
    }

    /// Text of a STRING value that came from table `block`.
    pub fn string_for(&self, value: &ResValue, block: usize) -> Option<String> {
        if value.data_type != DataType::STRING {
            return None;
        }
        self.table_string_pool(block)?.string_at(value.data as usize)
    }

    pub fn parameters(&self) -> &ResTableConfig {
        &self.params
    }

    /// Set the requested configuration and drop every cached bag.
    pub fn set_parameters(&mut self, params: ResTableConfig) {
        info!("resource table parameters set to {params}, flushing bag caches");
        self.params = params;
        self.clear_bags();
    }

    fn clear_bags(&self) {
        for group in &self.groups {
            group.clear_bags();
        }
    }

    pub(crate) fn group_index(&self, id: u32) -> Option<usize> {
        let pkg = package_id(id) as usize;
        if pkg == 0 {
            return None;
        }
        (self.package_map[pkg] as usize).checked_sub(1)
    }

    pub(crate) fn group_for(&self, id: u32) -> Option<&PackageGroup> {
        self.groups.get(self.group_index(id)?)
    }

    pub(crate) fn group(&self, index: usize) -> Option<&PackageGroup> {
        self.groups.get(index)
    }

    /// Index of `header` within this table's headers.
    pub(crate) fn block_of(&self, header: &Arc<TableHeader>) -> usize {
        self.headers
            .iter()
            .position(|h| Arc::ptr_eq(h, header))
            .unwrap_or_default()
    }

    /// Pick the best variant of entry `e` of type `t` in one package.
    ///
    /// `Ok(None)` when the package lacks the type or every variant lacks the entry.
    fn entry_in_package(&self, package: &Package, t: usize, e: usize) -> Result<Option<EntryMatch>> {
        match get_entry(package, t, e, Some(&self.params)) {
            Ok(found) => Ok(found),
            Err(err) if err.kind() == ErrorKind::BadIndex => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Select the best variant of `id` in the base package of its group.
    ///
    /// With `wanted == None` the first variant holding the entry is taken.
    pub fn get_entry(&self, id: u32, wanted: Option<&ResTableConfig>) -> Result<EntryMatch> {
        let group = self.group_for(id).ok_or(ResError::Unmapped {
            id,
            reason: "package is not loaded",
        })?;
        let t = type_index(id).ok_or(ResError::Unmapped {
            id,
            reason: "type id is 0",
        })?;
        let package = group.packages.first().ok_or(ResError::Unmapped {
            id,
            reason: "package group is empty",
        })?;
        get_entry(package, t, entry_index(id), wanted)?.ok_or(ResError::Unmapped {
            id,
            reason: "type is not defined",
        })
    }

    /// Find the simple value of `id`, walking overlays newest first.
    pub fn resolve(&self, id: u32) -> Result<ResolvedValue> {
        self.status()?;
        let group = self.group_for(id).ok_or(ResError::Unmapped {
            id,
            reason: "package is not loaded",
        })?;
        let t = type_index(id).ok_or(ResError::Unmapped {
            id,
            reason: "type id is 0",
        })?;
        let e = entry_index(id);
        if t >= group.type_count {
            return Err(ResError::Unmapped {
                id,
                reason: "type is not defined",
            });
        }

        for package in group.packages.iter().rev() {
            let Some(found) = self.entry_in_package(package, t, e)? else {
                continue;
            };
            let Entry::Simple { value, .. } = &*found.entry else {
                continue;
            };
            return Ok(ResolvedValue {
                value: *value,
                block: self.block_of(&package.header),
                type_spec_flags: found.type_spec_flags.unwrap_or(u32::MAX),
                config: found.config,
            });
        }

        Err(ResError::NoValue { id })
    }

    /// Follow references starting at `value` until a non-reference value.
    ///
    /// At most [`MAX_REFERENCE_HOPS`] hops are taken; a value that is still a reference after
    /// that is an error. A reference to a bag stops the walk and is returned as is.
    pub fn resolve_reference(&self, value: ResValue, block: Option<usize>) -> Result<ResolvedReference> {
        self.resolve_reference_with_flags(value, block, 0)
    }

    pub(crate) fn resolve_reference_with_flags(
        &self,
        value: ResValue,
        block: Option<usize>,
        type_spec_flags: u32,
    ) -> Result<ResolvedReference> {
        let mut out = ResolvedReference {
            value,
            block,
            last_ref: None,
            type_spec_flags,
            config: ResTableConfig::default(),
        };

        let mut hops = 0;
        while out.value.is_reference() {
            if hops == MAX_REFERENCE_HOPS {
                return Err(ResError::ReferenceLimit {
                    id: out.value.data,
                    limit: MAX_REFERENCE_HOPS,
                });
            }
            let id = out.value.data;
            match self.resolve(id) {
                Ok(found) => {
                    out.last_ref = Some(id);
                    out.value = found.value;
                    out.block = Some(found.block);
                    out.type_spec_flags = found.type_spec_flags;
                    out.config = found.config;
                }
                Err(err) if err.kind() == ErrorKind::BadIndex => return Err(err),
                Err(err) => {
                    debug!("reference 0x{id:08x} left unresolved: {err}");
                    out.last_ref = Some(id);
                    break;
                }
            }
            hops += 1;
        }
        Ok(out)
    }

    /// `package:type/name` of `id`, taken from the base package of its group.
    pub fn resource_name(&self, id: u32) -> Result<ResourceName> {
        let group = self.group_for(id).ok_or(ResError::Unmapped {
            id,
            reason: "package is not loaded",
        })?;
        let found = self.get_entry(id, None)?;
        let package = group.packages.first().ok_or(ResError::Unmapped {
            id,
            reason: "package group is empty",
        })?;
        let missing = || ResError::NameNotFound {
            what: "resource name",
            name: format!("0x{id:08x}"),
        };
        let t = type_index(id).ok_or_else(missing)?;
        Ok(ResourceName {
            package: group.name.clone(),
            type_name: package.type_strings.string_at(t).ok_or_else(missing)?,
            name: package
                .key_strings
                .string_at(found.entry.key() as usize)
                .ok_or_else(missing)?,
        })
    }

    /// Look up the id of a named resource.
    ///
    /// `name` may be `name`, `type/name`, `package:type/name` or any of those with a leading
    /// `@`; parts it omits come from `default_type` and `default_package`. Without any package
    /// every group is searched.
    pub fn identifier(
        &self,
        name: &str,
        default_type: Option<&str>,
        default_package: Option<&str>,
    ) -> Result<u32> {
        let not_found = || ResError::NameNotFound {
            what: "resource",
            name: name.to_string(),
        };
        let full = name.strip_prefix('@').unwrap_or(name);
        let (package, rest) = match full.split_once(':') {
            Some((package, rest)) => (Some(package), rest),
            None => (default_package, full),
        };
        let (type_name, entry_name) = match rest.split_once('/') {
            Some((t, n)) => (Some(t), n),
            None => (default_type, rest),
        };
        let type_name = type_name.ok_or_else(not_found)?;

        for group in &self.groups {
            if package.is_some_and(|p| p != group.name) {
                continue;
            }
            let Some(base) = group.packages.first() else {
                continue;
            };
            let Some(t) = base.type_strings.index_of_string_from_end(type_name) else {
                continue;
            };
            let Some(key) = base.key_strings.index_of_string_from_end(entry_name) else {
                continue;
            };
            for e in 0..group.entry_count(t) {
                match get_entry(base, t, e, None) {
                    Ok(Some(found)) if found.entry.key() as usize == key => {
                        return Ok(make_id(group.id, t, e));
                    }
                    _ => {}
                }
            }
        }
        Err(not_found())
    }
}

/// Choose the variant of `(t, e)` in `package` that best matches `wanted`.
///
/// `Ok(None)` when the package has no such type, `BadType` when `e` is past the type's entries
/// and `BadIndex` when no variant holds the entry.
fn get_entry(
    package: &Package,
    t: usize,
    e: usize,
    wanted: Option<&ResTableConfig>,
) -> Result<Option<EntryMatch>> {
    let Some(ty) = package.type_at(t) else {
        return Ok(None);
    };
    if e >= ty.entry_count {
        return Err(ResError::EntryOutOfRange {
            type_id: t as u32 + 1,
            entry: e as u32,
            count: ty.entry_count as u32,
        });
    }

    let mut best: Option<(&Variant, u32)> = None;
    for variant in &ty.variants {
        let Some(offset) = variant.entry_offset(e) else {
            continue;
        };
        if let Some((current, _)) = best {
            if !variant.config.is_better_than(&current.config, wanted) {
                continue;
            }
        }
        best = Some((variant, offset));
        if wanted.is_none() {
            break;
        }
    }

    let (variant, offset) = best.ok_or(ResError::Unmapped {
        id: make_id(package.id, t, e),
        reason: "no variant holds the entry",
    })?;
    Ok(Some(EntryMatch {
        entry: variant.entry_at(offset)?,
        config: variant.config,
        type_spec_flags: ty.spec_flags(e),
    }))
}
