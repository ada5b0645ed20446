//! Chunk-granular access shared by both region formats.
//!
//! The variable format stores full light sources; the fixed format stores
//! luminance only. Anything written through the fixed backend loses its
//! material and migrated flag, and reads back with an empty material.

use lumen_engine::world::{ChunkPos, CreateFn, LightSource, RegionPos};

use crate::error::{Result, StoreError};
use crate::nls::FixedRegionStore;
use crate::vldb::VariableRegionStore;

/// One region's persisted light sources, addressed by chunk.
pub trait RegionBackend<L: LightSource> {
    fn region(&self) -> RegionPos;

    fn has_chunk(&self, chunk: ChunkPos) -> bool;

    /// Chunks that hold data, in ascending order.
    fn chunks(&self) -> Vec<ChunkPos>;

    /// Light sources of `chunk`; empty if it holds none.
    fn read_chunk(&self, chunk: ChunkPos) -> Result<Vec<L>>;

    /// Replace the content of `chunk`. An empty `sources` removes it.
    fn write_chunk(&mut self, chunk: ChunkPos, sources: &[L]) -> Result<()>;

    /// Drop `chunk`. Fails if it holds no data.
    fn remove_chunk(&mut self, chunk: ChunkPos) -> Result<()>;

    /// Persist pending changes. Returns whether a write happened.
    fn save(&mut self) -> Result<bool>;
}

fn check_sources<L: LightSource>(chunk: ChunkPos, sources: &[L]) -> Result<()> {
    match sources.iter().map(|s| s.position().chunk()).find(|c| *c != chunk) {
        Some(other) => Err(StoreError::MixedChunks { first: chunk, other }),
        None => Ok(()),
    }
}

// ── Variable format ─────────────────────────────────────────────────────────

impl<L: LightSource> RegionBackend<L> for VariableRegionStore<L> {
    fn region(&self) -> RegionPos {
        VariableRegionStore::region(self)
    }

    fn has_chunk(&self, chunk: ChunkPos) -> bool {
        self.has_chunk_data(chunk)
    }

    fn chunks(&self) -> Vec<ChunkPos> {
        let mut chunks: Vec<ChunkPos> = self.offset_table().into_keys().collect();
        chunks.sort();
        chunks
    }

    fn read_chunk(&self, chunk: ChunkPos) -> Result<Vec<L>> {
        VariableRegionStore::read_chunk(self, chunk)
    }

    fn write_chunk(&mut self, chunk: ChunkPos, sources: &[L]) -> Result<()> {
        check_sources(chunk, sources)?;
        match (self.has_chunk_data(chunk), sources.is_empty()) {
            (true, _) => self.edit_chunk(chunk, sources),
            (false, false) => self.insert_chunk(sources),
            (false, true) => Ok(()),
        }
    }

    fn remove_chunk(&mut self, chunk: ChunkPos) -> Result<()> {
        VariableRegionStore::remove_chunk(self, chunk)
    }

    fn save(&mut self) -> Result<bool> {
        VariableRegionStore::save(self)
    }
}

// ── Fixed format ────────────────────────────────────────────────────────────

/// [`FixedRegionStore`] viewed as a store of light sources.
pub struct FixedBackend<L> {
    store: FixedRegionStore,
    create: CreateFn<L>,
}

impl<L: LightSource> FixedBackend<L> {
    pub fn new(store: FixedRegionStore, create: CreateFn<L>) -> Self {
        Self { store, create }
    }

    pub fn store(&self) -> &FixedRegionStore {
        &self.store
    }
}

impl<L: LightSource> RegionBackend<L> for FixedBackend<L> {
    fn region(&self) -> RegionPos {
        self.store.region()
    }

    fn has_chunk(&self, chunk: ChunkPos) -> bool {
        self.store.mask(chunk).is_ok_and(|mask| mask != 0)
    }

    fn chunks(&self) -> Vec<ChunkPos> {
        let mut chunks = self.store.affected_chunks();
        chunks.sort();
        chunks
    }

    fn read_chunk(&self, chunk: ChunkPos) -> Result<Vec<L>> {
        Ok(self
            .store
            .light_sources(chunk)?
            .into_iter()
            .map(|(pos, luminance)| (self.create)(pos, luminance, false, ""))
            .collect())
    }

    fn write_chunk(&mut self, chunk: ChunkPos, sources: &[L]) -> Result<()> {
        check_sources(chunk, sources)?;
        self.store.clear_chunk(chunk)?;
        for source in sources {
            self.store.set_custom_luminance(source.position(), source.luminance())?;
        }
        Ok(())
    }

    fn remove_chunk(&mut self, chunk: ChunkPos) -> Result<()> {
        if !self.store.clear_chunk(chunk)? {
            return Err(StoreError::ChunkAbsent(chunk));
        }
        Ok(())
    }

    fn save(&mut self) -> Result<bool> {
        self.store.save()
    }
}

/// Copy every chunk of `src` into `dst`. Returns how many chunks were copied.
pub fn copy_region<L, S, D>(src: &S, dst: &mut D) -> Result<usize>
where
    L: LightSource,
    S: RegionBackend<L> + ?Sized,
    D: RegionBackend<L> + ?Sized,
{
    let mut copied = 0;
    for chunk in src.chunks() {
        let sources = src.read_chunk(chunk)?;
        if sources.is_empty() {
            continue;
        }
        dst.write_chunk(chunk, &sources)?;
        copied += 1;
    }
    tracing::info!("Copied {} chunks of region {}", copied, src.region());
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_engine::world::{BasicLightSource, BlockPos};

    fn lamp(x: i32, y: i32, z: i32, luminance: u8) -> BasicLightSource {
        BasicLightSource::new(BlockPos::new(x, y, z), luminance, true, "GLOWSTONE")
    }

    #[test]
    fn vldb_write_chunk_maps_to_insert_edit_remove() {
        let mut store: VariableRegionStore<BasicLightSource> =
            VariableRegionStore::create("unused.vldb2", RegionPos::new(0, 0), false, BasicLightSource::create).unwrap();
        let chunk = ChunkPos::new(0, 0);
        let backend: &mut dyn RegionBackend<BasicLightSource> = &mut store;

        backend.write_chunk(chunk, &[lamp(1, 1, 1, 5)]).unwrap();
        backend.write_chunk(chunk, &[lamp(1, 1, 1, 5), lamp(2, 2, 2, 6)]).unwrap();
        assert_eq!(backend.read_chunk(chunk).unwrap().len(), 2);
        backend.write_chunk(chunk, &[]).unwrap();
        assert!(!backend.has_chunk(chunk));
        backend.write_chunk(chunk, &[]).unwrap();
        assert!(backend.remove_chunk(chunk).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn fixed_backend_drops_material() {
        let dir = tempfile::tempdir().unwrap();
        let store = FixedRegionStore::create(dir.path().join("r.0.0.nls"), RegionPos::new(0, 0), false).unwrap();
        let mut backend = FixedBackend::new(store, BasicLightSource::create);
        let chunk = ChunkPos::new(1, 0);

        backend.write_chunk(chunk, &[lamp(17, 3, 4, 11)]).unwrap();
        assert!(backend.has_chunk(chunk));
        let read = backend.read_chunk(chunk).unwrap();
        assert_eq!(read, vec![BasicLightSource::new(BlockPos::new(17, 3, 4), 11, false, "")]);

        backend.write_chunk(chunk, &[lamp(18, 3, 4, 2)]).unwrap();
        assert_eq!(backend.read_chunk(chunk).unwrap().len(), 1);

        backend.remove_chunk(chunk).unwrap();
        assert!(matches!(backend.remove_chunk(chunk), Err(StoreError::ChunkAbsent(_))));
    }

    #[test]
    fn copy_between_formats() {
        let dir = tempfile::tempdir().unwrap();
        let region = RegionPos::new(0, 0);
        let src: VariableRegionStore<BasicLightSource> =
            VariableRegionStore::create("unused.vldb2", region, false, BasicLightSource::create).unwrap();
        src.insert_chunk(&[lamp(1, 1, 1, 5), lamp(3, 70, 3, 15)]).unwrap();
        src.insert_chunk(&[lamp(500, 255, 500, 1)]).unwrap();

        let fixed = FixedRegionStore::create(dir.path().join("r.0.0.nls"), region, false).unwrap();
        let mut dst = FixedBackend::new(fixed, BasicLightSource::create);
        assert_eq!(copy_region(&src, &mut dst).unwrap(), 2);
        assert_eq!(dst.store().get_custom_luminance(BlockPos::new(3, 70, 3)).unwrap(), 15);
        assert_eq!(dst.store().get_custom_luminance(BlockPos::new(500, 255, 500)).unwrap(), 1);

        let mut back: VariableRegionStore<BasicLightSource> =
            VariableRegionStore::create("unused.vldb2", region, false, BasicLightSource::create).unwrap();
        assert_eq!(copy_region(&dst, &mut back).unwrap(), 2);
        assert_eq!(back.read_all().unwrap().len(), 3);
    }
}
