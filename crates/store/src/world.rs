//! All open regions of one light directory.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use lumen_engine::world::{BlockPos, CreateFn, LightSource, RegionPos};
use rayon::prelude::*;

use crate::cache::RegionCache;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

/// Custom light levels for a whole world, one [`RegionCache`] per region.
///
/// Regions are opened lazily on first access. Thread-safe, lock-sharded by
/// region: distinct regions never contend.
pub struct LightWorld<L> {
    config: StoreConfig,
    create: CreateFn<L>,
    regions: DashMap<RegionPos, Arc<RegionCache<L>>>,
}

impl<L: LightSource> LightWorld<L> {
    pub fn new(config: StoreConfig, create: CreateFn<L>) -> Self {
        Self {
            config,
            create,
            regions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The cache for `region`, opening its file on first use.
    pub fn region(&self, region: RegionPos) -> Result<Arc<RegionCache<L>>> {
        // The shard guard must be gone before the caller touches region locks.
        if let Some(cache) = self.regions.get(&region) {
            return Ok(Arc::clone(cache.value()));
        }
        // Open under the entry lock so a concurrent unload's save lands first.
        match self.regions.entry(region) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let opened = RegionCache::open(&self.config.root, region, self.config.deflate, self.create)?;
                Ok(Arc::clone(entry.insert(Arc::new(opened)).value()))
            }
        }
    }

    pub fn is_region_open(&self, region: RegionPos) -> bool {
        self.regions.contains_key(&region)
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Run `op` on the cache for `region`, looking it up again if it was
    /// closed by a concurrent [`unload_region`](Self::unload_region).
    fn with_region<T>(&self, region: RegionPos, op: impl Fn(&RegionCache<L>) -> Result<T>) -> Result<T> {
        loop {
            let cache = self.region(region)?;
            match op(cache.as_ref()) {
                Err(StoreError::RegionClosed(_)) => continue,
                result => return result,
            }
        }
    }

    pub fn get(&self, pos: BlockPos) -> Result<Option<L>> {
        self.with_region(pos.region(), |cache| cache.get(pos))
    }

    pub fn put(&self, source: L) -> Result<()> {
        self.with_region(source.position().region(), |cache| cache.put(source.clone()))
    }

    fn open_regions(&self) -> Vec<Arc<RegionCache<L>>> {
        self.regions.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Flush every open region in parallel. Returns the number of chunks written.
    pub fn flush_all(&self) -> Result<usize> {
        let flushed: Vec<usize> = self
            .open_regions()
            .par_iter()
            .map(|cache| cache.flush_all())
            .collect::<Result<_>>()?;
        Ok(flushed.into_iter().sum())
    }

    /// Flush and save every open region. Returns the number of files written.
    pub fn save_all(&self) -> Result<usize> {
        let saved: Vec<bool> = self
            .open_regions()
            .par_iter()
            .map(|cache| {
                cache.flush_all()?;
                cache.save()
            })
            .collect::<Result<_>>()?;
        let written = saved.into_iter().filter(|s| *s).count();
        tracing::info!("Saved {} of {} open regions", written, self.region_count());
        Ok(written)
    }

    /// Flush, save and forget `region`. Returns whether it was open.
    ///
    /// The map entry stays locked until the cache is closed, so nobody can
    /// reopen the file mid-save. Writers still holding the old cache get
    /// [`StoreError::RegionClosed`], which [`put`](Self::put) and
    /// [`get`](Self::get) retry against a fresh one. On error the region
    /// stays open.
    pub fn unload_region(&self, region: RegionPos) -> Result<bool> {
        let Entry::Occupied(entry) = self.regions.entry(region) else {
            return Ok(false);
        };
        entry.get().close()?;
        entry.remove();
        tracing::debug!("Unloaded region {}", region);
        Ok(true)
    }
}
