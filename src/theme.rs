//! Themes: attribute values layered from successively applied styles.

use std::ptr;

use log::{debug, trace};

use crate::err::{ResError, Result};
use crate::table::{MAX_REFERENCE_HOPS, ResTable, ResolvedReference, entry_index, type_index};
use crate::value::{DataType, ResValue};

const MAX_PACKAGE_GROUPS: usize = 255;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ThemeEntry {
    block: usize,
    type_spec_flags: u32,
    value: ResValue,
}

#[derive(Debug, Clone, Default)]
struct PackageSlots {
    /// Per type; an empty vector until a style touches the type.
    types: Vec<Vec<ThemeEntry>>,
}

/// An attribute value found in a theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeAttribute {
    pub value: ResValue,
    pub block: usize,
    pub type_spec_flags: u32,
}

/// Attribute values collected from styles applied on top of each other.
///
/// A theme borrows the table its styles come from.
#[derive(Debug, Clone)]
pub struct Theme<'t> {
    table: &'t ResTable,
    packages: Vec<Option<PackageSlots>>,
}

impl<'t> Theme<'t> {
    pub fn new(table: &'t ResTable) -> Self {
        Theme {
            table,
            packages: vec![None; MAX_PACKAGE_GROUPS],
        }
    }

    pub fn table(&self) -> &'t ResTable {
        self.table
    }

    /// Layer the bag of style `id` onto the theme.
    ///
    /// Without `force` only attributes that are still unset (NULL) are written.
    pub fn apply_style(&mut self, id: u32, force: bool) -> Result<()> {
        let bag = self.table.get_bag(id)?;
        debug!(
            "applying style 0x{id:08x} ({} attributes, force={force})",
            bag.len()
        );

        for item in bag.iter() {
            let attr = item.name;
            let (Some(group_index), Some(t)) = (self.table.group_index(attr), type_index(attr)) else {
                trace!("style 0x{id:08x}: attribute 0x{attr:08x} has no package, skipping");
                continue;
            };
            let Some(group) = self.table.group(group_index) else {
                continue;
            };
            let Some(package) = self.packages.get_mut(group_index) else {
                continue;
            };
            let package = package.get_or_insert_with(|| PackageSlots {
                types: vec![Vec::new(); group.type_count],
            });
            let Some(entries) = package.types.get_mut(t) else {
                continue;
            };
            if entries.is_empty() {
                entries.resize(group.entry_count(t), ThemeEntry::default());
            }
            let Some(slot) = entries.get_mut(entry_index(attr)) else {
                continue;
            };

            if force || slot.value.data_type == DataType::NULL {
                slot.block = item.block;
                slot.type_spec_flags |= bag.type_spec_flags;
                slot.value = item.value;
            }
        }
        Ok(())
    }

    /// Look up attribute `id`, following attribute indirections inside the theme.
    pub fn get_attribute(&self, id: u32) -> Result<ThemeAttribute> {
        let mut attr = id;
        let mut type_spec_flags = 0;
        for _ in 0..=MAX_REFERENCE_HOPS {
            let entry = self
                .slot(attr)
                .ok_or(ResError::AttributeNotFound { id: attr })?;
            type_spec_flags |= entry.type_spec_flags;
            match entry.value.data_type {
                DataType::ATTRIBUTE => attr = entry.value.data,
                DataType::NULL => return Err(ResError::AttributeNotFound { id: attr }),
                _ => {
                    return Ok(ThemeAttribute {
                        value: entry.value,
                        block: entry.block,
                        type_spec_flags,
                    });
                }
            }
        }
        Err(ResError::ReferenceLimit {
            id,
            limit: MAX_REFERENCE_HOPS,
        })
    }

    fn slot(&self, attr: u32) -> Option<&ThemeEntry> {
        let package = self.packages.get(self.table.group_index(attr)?)?.as_ref()?;
        package
            .types
            .get(type_index(attr)?)?
            .get(entry_index(attr))
    }

    /// Resolve an attribute indirection through the theme, then references through the table.
    pub fn resolve_attribute_reference(
        &self,
        value: ResValue,
        block: Option<usize>,
        type_spec_flags: u32,
    ) -> Result<ResolvedReference> {
        let (value, block, type_spec_flags) = if value.data_type == DataType::ATTRIBUTE {
            let found = self.get_attribute(value.data)?;
            (
                found.value,
                Some(found.block),
                type_spec_flags | found.type_spec_flags,
            )
        } else {
            (value, block, type_spec_flags)
        };
        self.table
            .resolve_reference_with_flags(value, block, type_spec_flags)
    }

    /// Copy `other` into this theme.
    ///
    /// Themes over the same table are copied completely. Across tables only the first package
    /// group is copied, since group indices of other packages need not line up.
    pub fn set_to(&mut self, other: &Theme<'_>) {
        if ptr::eq(self.table, other.table) {
            self.packages = other.packages.clone();
            return;
        }
        self.packages = vec![None; MAX_PACKAGE_GROUPS];
        self.packages[0] = other.packages.first().cloned().flatten();
    }
}
