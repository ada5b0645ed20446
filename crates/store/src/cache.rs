//! Write-back chunk cache in front of one region's [`VariableRegionStore`].
//!
//! Each chunk slot is unloaded, loaded-clean, or loaded-dirty. Reads and
//! writes auto-load the owning chunk from the store; only dirty chunks are
//! ever written back.
//!
//! Locking: the cache lock is always taken before the store lock, never the
//! other way round.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use lumen_engine::migrate::MigrationSet;
use lumen_engine::world::position::REGION_CHUNKS;
use lumen_engine::world::{BlockPos, ChunkPos, CreateFn, LightRecord, LightSource, LocalBlockPos, RegionPos};

use crate::error::{Result, StoreError};
use crate::vldb::{VLDB_EXTENSION, VariableRegionStore, codec};

type ChunkEntries<L> = BTreeMap<LocalBlockPos, L>;

struct ChunkCache<L> {
    /// Indexed by [`ChunkPos::region_index`]; `None` means unloaded.
    slots: Vec<Option<ChunkEntries<L>>>,
    dirty: HashSet<ChunkPos>,
    /// Set by [`RegionCache::close`]; reads and writes fail from then on.
    closed: bool,
}

pub struct RegionCache<L> {
    region: RegionPos,
    create: CreateFn<L>,
    cache: Mutex<ChunkCache<L>>,
    store: VariableRegionStore<L>,
}

impl<L: LightSource> RegionCache<L> {
    pub fn new(store: VariableRegionStore<L>, create: CreateFn<L>) -> Self {
        Self {
            region: store.region(),
            create,
            cache: Mutex::new(ChunkCache {
                slots: std::iter::repeat_with(|| None).take(REGION_CHUNKS).collect(),
                dirty: HashSet::new(),
                closed: false,
            }),
            store,
        }
    }

    /// Open `root/r.<x>.<z>.vldb2`, creating `root` and a fresh store as needed.
    pub fn open(root: &Path, region: RegionPos, deflate: bool, create: CreateFn<L>) -> Result<Self> {
        if root.exists() {
            if !root.is_dir() {
                return Err(StoreError::NotADirectory(root.to_path_buf()));
            }
        } else {
            fs::create_dir_all(root).map_err(|source| StoreError::CreateDir {
                path: root.to_path_buf(),
                source,
            })?;
            tracing::info!("Created light directory {}", root.display());
        }

        let path = root.join(region.file_name(VLDB_EXTENSION));
        let store = if path.exists() {
            let store = VariableRegionStore::open(path, deflate, create)?;
            if store.region() != region {
                return Err(StoreError::Corrupt(format!(
                    "{} holds region {}, expected {}",
                    store.path().display(),
                    store.region(),
                    region
                )));
            }
            store
        } else {
            VariableRegionStore::create(path, region, deflate, create)?
        };
        Ok(Self::new(store, create))
    }

    pub fn region(&self) -> RegionPos {
        self.region
    }

    /// The backing store. Writing to it directly bypasses the cache.
    pub fn store(&self) -> &VariableRegionStore<L> {
        &self.store
    }

    fn cache(&self) -> MutexGuard<'_, ChunkCache<L>> {
        self.cache.lock().expect("chunk cache lock poisoned")
    }

    /// The cache lock, or [`StoreError::RegionClosed`] once closed.
    fn open_cache(&self) -> Result<MutexGuard<'_, ChunkCache<L>>> {
        let cache = self.cache();
        if cache.closed {
            return Err(StoreError::RegionClosed(self.region));
        }
        Ok(cache)
    }

    fn check_region(&self, chunk: ChunkPos) -> Result<()> {
        if !self.region.contains(chunk) {
            return Err(StoreError::OutsideRegion {
                chunk,
                region: self.region,
            });
        }
        Ok(())
    }

    // ── Chunk lifecycle ─────────────────────────────────────────────────

    /// (Re)load `chunk` from the store. Unflushed changes to it are discarded.
    pub fn load_chunk(&self, chunk: ChunkPos) -> Result<()> {
        self.check_region(chunk)?;
        let mut cache = self.open_cache()?;
        self.load_locked(&mut cache, chunk)
    }

    fn load_locked(&self, cache: &mut ChunkCache<L>, chunk: ChunkPos) -> Result<()> {
        if cache.dirty.remove(&chunk) {
            tracing::warn!("Reloading chunk {} discards unflushed light changes", chunk);
        }
        let entries: ChunkEntries<L> = self
            .store
            .read_chunk(chunk)?
            .into_iter()
            .map(|source| (source.position().local(), source))
            .collect();
        tracing::debug!("Loaded chunk {} ({} sources)", chunk, entries.len());
        cache.slots[chunk.region_index()] = Some(entries);
        Ok(())
    }

    fn loaded<'c>(&self, cache: &'c mut ChunkCache<L>, chunk: ChunkPos) -> Result<&'c mut ChunkEntries<L>> {
        let index = chunk.region_index();
        if cache.slots[index].is_none() {
            self.load_locked(cache, chunk)?;
        }
        cache.slots[index]
            .as_mut()
            .ok_or_else(|| StoreError::Corrupt(format!("chunk {chunk} vanished while loading")))
    }

    /// Write `chunk` back if it is dirty.
    pub fn flush(&self, chunk: ChunkPos) -> Result<()> {
        self.check_region(chunk)?;
        let mut cache = self.cache();
        self.flush_locked(&mut cache, chunk)
    }

    fn flush_locked(&self, cache: &mut ChunkCache<L>, chunk: ChunkPos) -> Result<()> {
        if !cache.dirty.contains(&chunk) {
            return Ok(());
        }
        let sources: Vec<L> = cache.slots[chunk.region_index()]
            .as_ref()
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default();

        let on_disk = self.store.has_chunk_data(chunk);
        if sources.is_empty() {
            if on_disk {
                self.store.remove_chunk(chunk)?;
            }
        } else if on_disk {
            self.store.edit_chunk(chunk, &sources)?;
        } else {
            self.store.insert_chunk(&sources)?;
        }
        cache.dirty.remove(&chunk);
        tracing::debug!("Flushed chunk {} ({} sources)", chunk, sources.len());
        Ok(())
    }

    /// Write back every dirty chunk. Returns how many were written.
    pub fn flush_all(&self) -> Result<usize> {
        let mut cache = self.cache();
        let mut dirty: Vec<ChunkPos> = cache.dirty.iter().copied().collect();
        dirty.sort();
        for chunk in &dirty {
            self.flush_locked(&mut cache, *chunk)?;
        }
        Ok(dirty.len())
    }

    /// Flush `chunk`, then drop it from the cache.
    pub fn unload_chunk(&self, chunk: ChunkPos) -> Result<()> {
        self.check_region(chunk)?;
        let mut cache = self.cache();
        self.flush_locked(&mut cache, chunk)?;
        cache.slots[chunk.region_index()] = None;
        Ok(())
    }

    /// Drop every cached chunk without flushing. Call [`flush_all`](Self::flush_all)
    /// first or dirty changes are lost.
    pub fn unload(&self) {
        let mut cache = self.cache();
        if !cache.dirty.is_empty() {
            tracing::warn!(
                "Unloading region {} discards {} unflushed chunks",
                self.region,
                cache.dirty.len()
            );
        }
        cache.slots.iter_mut().for_each(|slot| *slot = None);
        cache.dirty.clear();
    }

    /// Flush, save and unload under one lock, then refuse further reads and
    /// writes. Returns whether the file was written. On error the cache stays
    /// open with its dirty chunks intact.
    pub fn close(&self) -> Result<bool> {
        let mut cache = self.cache();
        if cache.closed {
            return Ok(false);
        }
        let mut dirty: Vec<ChunkPos> = cache.dirty.iter().copied().collect();
        dirty.sort();
        for chunk in dirty {
            self.flush_locked(&mut cache, chunk)?;
        }
        let saved = self.store.save()?;
        cache.slots.iter_mut().for_each(|slot| *slot = None);
        cache.closed = true;
        tracing::debug!("Closed region {}", self.region);
        Ok(saved)
    }

    pub fn is_closed(&self) -> bool {
        self.cache().closed
    }

    /// Flush every loaded chunk, then read the whole region from the store.
    pub fn load_all(&self) -> Result<Vec<L>> {
        let mut cache = self.open_cache()?;
        let loaded: Vec<ChunkPos> = (0..REGION_CHUNKS)
            .filter(|index| cache.slots[*index].is_some())
            .map(|index| self.region.chunk_at(index))
            .collect();
        for chunk in loaded {
            self.flush_locked(&mut cache, chunk)?;
        }
        self.store.read_all()
    }

    // ── Light sources ───────────────────────────────────────────────────

    /// The light source at `pos`, loading its chunk if needed.
    pub fn get(&self, pos: BlockPos) -> Result<Option<L>> {
        let chunk = pos.chunk();
        self.check_region(chunk)?;
        let mut cache = self.open_cache()?;
        let entries = self.loaded(&mut cache, chunk)?;
        Ok(entries.get(&pos.local()).cloned())
    }

    /// Store `source`, or clear its position when its luminance is 0.
    ///
    /// The chunk only becomes dirty if its content actually changed.
    pub fn put(&self, source: L) -> Result<()> {
        let pos = source.position();
        let chunk = pos.chunk();
        self.check_region(chunk)?;
        if source.luminance() != 0 {
            codec::validate(std::slice::from_ref(&source))?;
        }

        let mut cache = self.open_cache()?;
        let entries = self.loaded(&mut cache, chunk)?;
        let local = pos.local();
        let changed = if source.luminance() == 0 {
            entries.remove(&local).is_some()
        } else if entries.get(&local) == Some(&source) {
            false
        } else {
            entries.insert(local, source);
            true
        };
        if changed {
            cache.dirty.insert(chunk);
        }
        Ok(())
    }

    // ── Introspection ───────────────────────────────────────────────────

    pub fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool {
        self.region.contains(chunk) && self.cache().slots[chunk.region_index()].is_some()
    }

    pub fn is_dirty(&self, chunk: ChunkPos) -> bool {
        self.cache().dirty.contains(&chunk)
    }

    pub fn dirty_count(&self) -> usize {
        self.cache().dirty.len()
    }

    /// Snapshot of a loaded chunk's light sources; `None` if it is not loaded.
    pub fn cached(&self, chunk: ChunkPos) -> Option<Vec<L>> {
        if !self.region.contains(chunk) {
            return None;
        }
        self.cache().slots[chunk.region_index()]
            .as_ref()
            .map(|entries| entries.values().cloned().collect())
    }

    /// Chunks with a record in the store, ignoring unflushed changes.
    pub fn affected_chunks(&self) -> Vec<ChunkPos> {
        let mut chunks: Vec<ChunkPos> = self.store.offset_table().into_keys().collect();
        chunks.sort();
        chunks
    }

    /// Write the store to disk if it changed. Does not flush.
    pub fn save(&self) -> Result<bool> {
        self.store.save()
    }

    // ── Migrations ──────────────────────────────────────────────────────

    /// Apply `migrations` to every light source not yet marked migrated and
    /// write the upgraded sources back, flagged as migrated. Returns how many
    /// sources changed.
    pub fn run_migrations(&self, migrations: &MigrationSet<LightRecord>) -> Result<usize> {
        if migrations.is_empty() {
            return Ok(0);
        }
        let mut migrated = 0;
        for source in self.load_all()? {
            if source.is_migrated() {
                continue;
            }
            let original = LightRecord::of(&source);
            let mut record = original.clone();
            if !migrations.apply(&mut record) {
                continue;
            }
            record.migrated = true;
            if record.position != original.position {
                self.put((self.create)(original.position, 0, false, ""))?;
            }
            self.put(record.build(self.create))?;
            migrated += 1;
        }
        self.flush_all()?;
        if migrated > 0 {
            tracing::info!("Migrated {} light sources in region {}", migrated, self.region);
        }
        Ok(migrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_engine::migrate::Migration;
    use lumen_engine::world::BasicLightSource;

    fn cache() -> RegionCache<BasicLightSource> {
        let store = VariableRegionStore::create("unused.vldb2", RegionPos::new(0, 0), false, BasicLightSource::create)
            .unwrap();
        RegionCache::new(store, BasicLightSource::create)
    }

    fn lamp(x: i32, y: i32, z: i32, luminance: u8) -> BasicLightSource {
        BasicLightSource::new(BlockPos::new(x, y, z), luminance, false, "SAND")
    }

    #[test]
    fn get_auto_loads() {
        let cache = cache();
        let chunk = ChunkPos::new(0, 0);
        assert!(!cache.is_chunk_loaded(chunk));
        assert_eq!(cache.get(BlockPos::new(1, 10, 1)).unwrap(), None);
        assert!(cache.is_chunk_loaded(chunk));
        assert!(!cache.is_dirty(chunk));
    }

    #[test]
    fn put_then_get_returns_equal_value() {
        let cache = cache();
        let source = lamp(1, 10, 1, 7);
        cache.put(source.clone()).unwrap();
        assert_eq!(cache.get(BlockPos::new(1, 10, 1)).unwrap(), Some(source));
        assert!(cache.is_dirty(ChunkPos::new(0, 0)));
    }

    #[test]
    fn zero_put_on_empty_position_stays_clean() {
        let cache = cache();
        cache.put(lamp(1, 10, 1, 0)).unwrap();
        assert_eq!(cache.dirty_count(), 0);
        assert_eq!(cache.flush_all().unwrap(), 0);
        assert_eq!(cache.store().chunk_count(), 0);
    }

    #[test]
    fn identical_put_stays_clean() {
        let cache = cache();
        cache.put(lamp(1, 10, 1, 7)).unwrap();
        cache.flush_all().unwrap();
        cache.put(lamp(1, 10, 1, 7)).unwrap();
        assert!(!cache.is_dirty(ChunkPos::new(0, 0)));
    }

    #[test]
    fn flush_inserts_edits_and_removes() {
        let cache = cache();
        let chunk = ChunkPos::new(0, 0);

        cache.put(lamp(1, 10, 1, 7)).unwrap();
        cache.flush(chunk).unwrap();
        assert!(cache.store().has_chunk_data(chunk));
        assert!(!cache.is_dirty(chunk));

        cache.put(lamp(2, 10, 1, 3)).unwrap();
        cache.flush(chunk).unwrap();
        assert_eq!(cache.store().read_chunk(chunk).unwrap().len(), 2);

        cache.put(lamp(1, 10, 1, 0)).unwrap();
        cache.put(lamp(2, 10, 1, 0)).unwrap();
        cache.flush(chunk).unwrap();
        assert!(!cache.store().has_chunk_data(chunk));
    }

    #[test]
    fn unload_chunk_flushes_first() {
        let cache = cache();
        let chunk = ChunkPos::new(3, 4);
        cache.put(lamp(50, 1, 70, 9)).unwrap();
        cache.unload_chunk(chunk).unwrap();
        assert!(!cache.is_chunk_loaded(chunk));
        assert!(cache.store().has_chunk_data(chunk));
        assert_eq!(cache.get(BlockPos::new(50, 1, 70)).unwrap().map(|s| s.luminance), Some(9));
    }

    #[test]
    fn unload_discards_dirty_state() {
        let cache = cache();
        cache.put(lamp(1, 10, 1, 7)).unwrap();
        cache.unload();
        assert_eq!(cache.dirty_count(), 0);
        assert_eq!(cache.get(BlockPos::new(1, 10, 1)).unwrap(), None);
    }

    #[test]
    fn close_writes_everything_then_refuses_access() {
        let dir = tempfile::tempdir().unwrap();
        let region = RegionPos::new(0, 0);
        let cache = RegionCache::<BasicLightSource>::open(dir.path(), region, false, BasicLightSource::create).unwrap();
        cache.put(lamp(1, 10, 1, 7)).unwrap();

        assert!(cache.close().unwrap());
        assert!(cache.is_closed());
        assert_eq!(cache.dirty_count(), 0);
        assert!(!cache.is_chunk_loaded(ChunkPos::new(0, 0)));
        assert!(matches!(cache.put(lamp(2, 10, 1, 3)), Err(StoreError::RegionClosed(r)) if r == region));
        assert!(matches!(cache.get(BlockPos::new(1, 10, 1)), Err(StoreError::RegionClosed(_))));
        assert!(!cache.close().unwrap());

        let reopened = RegionCache::<BasicLightSource>::open(dir.path(), region, false, BasicLightSource::create).unwrap();
        assert_eq!(reopened.get(BlockPos::new(1, 10, 1)).unwrap().map(|s| s.luminance), Some(7));
    }

    #[test]
    fn open_rejects_a_file_for_another_region() {
        let dir = tempfile::tempdir().unwrap();
        let misplaced = dir.path().join(RegionPos::new(0, 0).file_name(VLDB_EXTENSION));
        let store =
            VariableRegionStore::create(&misplaced, RegionPos::new(1, 0), false, BasicLightSource::create).unwrap();
        store.insert_chunk(&[lamp(520, 10, 1, 7)]).unwrap();
        store.save().unwrap();

        let err = RegionCache::<BasicLightSource>::open(dir.path(), RegionPos::new(0, 0), false, BasicLightSource::create)
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Corrupt(_)));
        assert!(!err.is_invalid_argument());
    }

    #[test]
    fn load_all_flushes_first() {
        let cache = cache();
        cache.put(lamp(1, 10, 1, 7)).unwrap();
        cache.put(lamp(100, 10, 1, 2)).unwrap();
        assert_eq!(cache.load_all().unwrap().len(), 2);
        assert_eq!(cache.dirty_count(), 0);
        assert_eq!(cache.affected_chunks(), vec![ChunkPos::new(0, 0), ChunkPos::new(6, 0)]);
    }

    #[test]
    fn outside_region_is_rejected() {
        let cache = cache();
        assert!(cache.get(BlockPos::new(-1, 0, 0)).unwrap_err().is_invalid_argument());
        assert!(cache.put(lamp(0, 0, 600, 3)).unwrap_err().is_invalid_argument());
        assert!(cache.cached(ChunkPos::new(-1, 0)).is_none());
    }

    #[test]
    fn unencodable_put_is_rejected_early() {
        let cache = cache();
        let err = cache.put(lamp(0, 300, 0, 3)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }));
        assert_eq!(cache.dirty_count(), 0);
    }

    struct Rename;

    impl Migration<LightRecord> for Rename {
        fn migrate(&self, target: &mut LightRecord) -> bool {
            if target.material == "SAND" {
                target.material = "RED_SAND".to_owned();
                true
            } else {
                false
            }
        }
    }

    #[test]
    fn migrations_mark_sources_migrated() {
        let cache = cache();
        cache.put(lamp(1, 10, 1, 7)).unwrap();
        cache
            .put(BasicLightSource::new(BlockPos::new(2, 10, 1), 4, false, "TORCH"))
            .unwrap();

        let mut set = MigrationSet::new();
        set.add(Rename);
        assert_eq!(cache.run_migrations(&set).unwrap(), 1);

        let sand = cache.get(BlockPos::new(1, 10, 1)).unwrap().unwrap();
        assert_eq!(sand.material, "RED_SAND");
        assert!(sand.migrated);
        let torch = cache.get(BlockPos::new(2, 10, 1)).unwrap().unwrap();
        assert!(!torch.migrated);

        assert_eq!(cache.run_migrations(&set).unwrap(), 0);
        assert_eq!(cache.dirty_count(), 0);
    }
}
