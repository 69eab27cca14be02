//! Inheritance-merged attribute lists of complex entries.

use std::sync::{Arc, MutexGuard, PoisonError};

use log::{debug, trace, warn};
use serde::Serialize;

use crate::FastMap;
use crate::err::{ResError, Result};
use crate::table::entry::{Entry, MapItem};
use crate::table::{PackageGroup, ResTable, entry_index, type_index};
use crate::value::ResValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BagEntry {
    /// Index of the table the value came from.
    pub block: usize,
    /// Attribute (or array index) resource id.
    pub name: u32,
    pub value: ResValue,
}

/// A style, array or plural after parent merging.
///
/// Entries are sorted by `name`, each name appearing once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bag {
    pub type_spec_flags: u32,
    pub entries: Vec<BagEntry>,
}

impl Bag {
    pub fn get(&self, name: u32) -> Option<&BagEntry> {
        self.entries
            .binary_search_by_key(&name, |e| e.name)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BagEntry> {
        self.entries.iter()
    }

    fn merge(&mut self, block: usize, items: &[MapItem]) {
        for item in items {
            let entry = BagEntry {
                block,
                name: item.name,
                value: item.value,
            };
            match self.entries.binary_search_by_key(&item.name, |e| e.name) {
                Ok(i) => self.entries[i] = entry,
                Err(i) => self.entries.insert(i, entry),
            }
        }
    }
}

/// Per-group bag cache slot.
#[derive(Debug, Clone)]
pub(crate) enum BagSlot {
    /// Being built; seeing it again while walking the parent chain means a cycle.
    Building,
    Ready(Arc<Bag>),
}

/// One complex entry of a parent chain, with its overlays newest first.
struct ChainLink<'a> {
    id: u32,
    group: &'a PackageGroup,
    sources: Vec<(usize, Arc<Entry>)>,
    type_spec_flags: u32,
    parent: u32,
}

/// Where a parent chain stops.
enum ChainRoot {
    Cached(Arc<Bag>),
    Empty,
}

impl ResTable {
    /// The merged bag for `id`.
    ///
    /// The parent chain is walked without recursion, so its depth is bounded only by the
    /// number of entries. Every bag built on the way is cached in its package group until
    /// [`ResTable::set_parameters`] runs.
    pub fn get_bag(&self, id: u32) -> Result<Arc<Bag>> {
        self.status()?;
        let (group, t, e) = self.bag_location(id)?;
        if let Some(BagSlot::Ready(bag)) = lock_bags(group).get(&id) {
            trace!("bag 0x{id:08x}: cache hit");
            return Ok(bag.clone());
        }

        let mut chain: Vec<ChainLink<'_>> = Vec::new();
        let root = match self.collect_chain(id, group, t, e, &mut chain) {
            Ok(root) => root,
            Err(err) => {
                for link in &chain {
                    lock_bags(link.group).remove(&link.id);
                }
                return Err(err);
            }
        };

        let mut bag = match root {
            // Another caller finished `id` between the first lookup and the walk.
            ChainRoot::Cached(ready) if chain.is_empty() => return Ok(ready),
            ChainRoot::Cached(parent) => (*parent).clone(),
            ChainRoot::Empty => Bag::default(),
        };
        let mut built = None;
        for link in chain.iter().rev() {
            bag.type_spec_flags |= link.type_spec_flags;
            for (block, entry) in link.sources.iter().rev() {
                if let Entry::Complex { items, .. } = &**entry {
                    bag.merge(*block, items);
                }
            }
            debug!(
                "built bag 0x{:08x}: {} entries from {} overlay(s), parent 0x{:08x}",
                link.id,
                bag.len(),
                link.sources.len(),
                link.parent
            );
            let ready = Arc::new(bag.clone());
            lock_bags(link.group).insert(link.id, BagSlot::Ready(ready.clone()));
            built = Some(ready);
        }
        built.ok_or(ResError::Unmapped {
            id,
            reason: "resource is not a bag",
        })
    }

    /// Follow parents from `id` up to the root or the first cached ancestor.
    ///
    /// Each link is marked [`BagSlot::Building`] as it joins `chain`.
    fn collect_chain<'a>(
        &'a self,
        id: u32,
        group: &'a PackageGroup,
        t: usize,
        e: usize,
        chain: &mut Vec<ChainLink<'a>>,
    ) -> Result<ChainRoot> {
        let mut link = self.chain_link(id, group, t, e)?;
        loop {
            {
                let mut bags = lock_bags(link.group);
                match bags.get(&link.id) {
                    Some(BagSlot::Ready(bag)) => return Ok(ChainRoot::Cached(bag.clone())),
                    Some(BagSlot::Building) => return Err(ResError::CyclicBag { id: link.id }),
                    None => {
                        bags.insert(link.id, BagSlot::Building);
                    }
                }
            }
            let (child, parent) = (link.id, link.parent);
            chain.push(link);
            if parent == 0 {
                return Ok(ChainRoot::Empty);
            }

            let next = self
                .bag_location(parent)
                .and_then(|(group, t, e)| self.chain_link(parent, group, t, e));
            link = match next {
                Ok(next) => next,
                Err(err) => {
                    warn!("bag 0x{child:08x}: parent 0x{parent:08x} unavailable: {err}");
                    return Ok(ChainRoot::Empty);
                }
            };
        }
    }

    fn bag_location(&self, id: u32) -> Result<(&PackageGroup, usize, usize)> {
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
        let entry_count = group
            .packages
            .first()
            .and_then(|p| p.type_at(t))
            .map_or(0, |ty| ty.entry_count);
        if e >= entry_count {
            return Err(ResError::Unmapped {
                id,
                reason: "entry is out of range",
            });
        }
        Ok((group, t, e))
    }

    fn chain_link<'a>(
        &'a self,
        id: u32,
        group: &'a PackageGroup,
        t: usize,
        e: usize,
    ) -> Result<ChainLink<'a>> {
        let mut sources = Vec::new();
        let mut type_spec_flags = 0u32;
        let mut parent = None;
        for package in group.packages.iter().rev() {
            let Some(found) = self.entry_in_package(package, t, e)? else {
                continue;
            };
            if let Entry::Complex { parent: p, .. } = &*found.entry {
                // The newest overlay declares the parent; its items win over older overlays.
                parent.get_or_insert(*p);
                type_spec_flags |= found.type_spec_flags.unwrap_or(u32::MAX);
                sources.push((self.block_of(&package.header), found.entry.clone()));
            }
        }
        let parent = parent.ok_or(ResError::Unmapped {
            id,
            reason: "resource is not a bag",
        })?;
        Ok(ChainLink {
            id,
            group,
            sources,
            type_spec_flags,
            parent,
        })
    }
}

fn lock_bags(group: &PackageGroup) -> MutexGuard<'_, FastMap<u32, BagSlot>> {
    group.bags.lock().unwrap_or_else(PoisonError::into_inner)
}
