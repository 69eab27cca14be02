use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use log::{debug, trace};

use crate::FastMap;
use crate::err::Result;
use crate::table::ResTable;

/// Decoded tables shared between callers, keyed by the path they were loaded from.
///
/// A table is decoded at most once per key; lookups hand out `Arc` clones.
#[derive(Debug, Default)]
pub struct SharedTableCache {
    tables: Mutex<FastMap<String, Arc<ResTable>>>,
}

static GLOBAL: OnceLock<SharedTableCache> = OnceLock::new();

impl SharedTableCache {
    pub fn new() -> Self {
        SharedTableCache::default()
    }

    /// The process-wide cache.
    pub fn global() -> &'static SharedTableCache {
        GLOBAL.get_or_init(SharedTableCache::new)
    }

    fn lock(&self) -> MutexGuard<'_, FastMap<String, Arc<ResTable>>> {
        // Entries are only ever inserted whole, so a poisoned map is still consistent.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, path: &str) -> Option<Arc<ResTable>> {
        let hit = self.lock().get(path).cloned();
        trace!("table cache lookup `{path}`: hit={}", hit.is_some());
        hit
    }

    /// Store `table` under `path`, returning the table it replaced.
    pub fn insert(&self, path: impl Into<String>, table: ResTable) -> Option<Arc<ResTable>> {
        let path = path.into();
        debug!("caching table `{path}`");
        self.lock().insert(path, Arc::new(table))
    }

    /// Return the cached table for `path`, decoding it with `load` on a miss.
    ///
    /// `load` runs without the lock held. When two callers race on the same key the
    /// first one stored wins and the other's table is dropped.
    pub fn get_or_try_insert_with<F>(&self, path: &str, load: F) -> Result<Arc<ResTable>>
    where
        F: FnOnce() -> Result<ResTable>,
    {
        if let Some(table) = self.get(path) {
            return Ok(table);
        }
        let table = Arc::new(load()?);
        debug!("loaded table `{path}` ({} packages)", table.package_group_count());
        Ok(Arc::clone(
            self.lock().entry(path.to_string()).or_insert(table),
        ))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every cached table. Tables still held by callers stay alive.
    pub fn reset(&self) {
        let mut tables = self.lock();
        debug!("dropping {} cached tables", tables.len());
        tables.clear();
    }
}
