//! Fixed-layout light storage: one `.nls` file per region holding a dense
//! 32x32 grid of per-chunk nibble sections.
//!
//! ## Layout (all integers big-endian)
//!
//! | Size | Field |
//! |------|-------|
//! | 4 | Magic `[0x4E, 0x41, 0x4C, 0x53]` ("NALS") |
//! | 4 | Version (`i32`), currently 1 |
//! | 4 | Region x (`i32`) |
//! | 4 | Region z (`i32`) |
//! | ... | Chunk records until end of stream |
//!
//! A chunk record is the region-local chunk index (`u16`, `z << 5 | x`), the
//! section mask (`u16`), then 2048 bytes for each set mask bit, ascending.
//!
//! The whole file is rewritten on save; there are no incremental writes.

use std::collections::HashSet;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use lumen_engine::LightError;
use lumen_engine::world::{BlockPos, ChunkLightStorage, ChunkPos, RegionPos, position::REGION_CHUNKS};

use crate::container;
use crate::error::{Result, StoreError};

/// "NALS".
pub const NLS_MAGIC: u32 = 0x4E41_4C53;
pub const NLS_VERSION: i32 = 1;
/// File extension for fixed-format region files.
pub const NLS_EXTENSION: &str = "nls";

pub struct FixedRegionStore {
    path: PathBuf,
    region: RegionPos,
    deflate: bool,
    /// Indexed by [`ChunkPos::region_index`]. Only non-empty chunks are kept.
    chunks: Vec<Option<ChunkLightStorage>>,
    non_empty: usize,
    modified: bool,
}

impl FixedRegionStore {
    /// A new, empty store for a file that must not exist yet.
    pub fn create(path: impl Into<PathBuf>, region: RegionPos, deflate: bool) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            return Err(StoreError::FileExists(path));
        }
        Ok(Self {
            path,
            region,
            deflate,
            chunks: vec![None; REGION_CHUNKS],
            non_empty: 0,
            modified: true,
        })
    }

    /// Load an existing file, raw or gzip'd.
    pub fn open(path: impl Into<PathBuf>, deflate: bool) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(StoreError::FileMissing(path));
        }
        let bytes = container::read_file(&path)?;
        let store = Self::parse(path, &bytes, deflate)?;
        tracing::info!(
            "Loaded region {} from {} ({} chunks)",
            store.region,
            store.path.display(),
            store.non_empty
        );
        Ok(store)
    }

    fn parse(path: PathBuf, bytes: &[u8], deflate: bool) -> Result<Self> {
        let mut input = Cursor::new(bytes);

        let magic = input.read_u32::<BigEndian>().map_err(truncated)?;
        if magic != NLS_MAGIC {
            return Err(StoreError::BadMagic {
                expected: NLS_MAGIC,
                found: magic,
            });
        }
        let version = input.read_i32::<BigEndian>().map_err(truncated)?;
        if version != NLS_VERSION {
            return Err(StoreError::UnsupportedVersion {
                expected: NLS_VERSION,
                found: version,
            });
        }
        let region = RegionPos::new(
            input.read_i32::<BigEndian>().map_err(truncated)?,
            input.read_i32::<BigEndian>().map_err(truncated)?,
        );

        let mut chunks = vec![None; REGION_CHUNKS];
        let mut seen = HashSet::new();
        let mut non_empty = 0;
        // End of stream is only legal between records.
        while (input.position() as usize) < bytes.len() {
            let index = usize::from(input.read_u16::<BigEndian>().map_err(truncated)?);
            if index >= REGION_CHUNKS {
                return Err(StoreError::Corrupt(format!("chunk index {index} out of range")));
            }
            let chunk = region.chunk_at(index);
            if !seen.insert(index) {
                return Err(StoreError::DuplicateChunk { chunk, path });
            }
            let storage = ChunkLightStorage::read_from(chunk, &mut input).map_err(truncated)?;
            if !storage.is_empty() {
                chunks[index] = Some(storage);
                non_empty += 1;
            }
        }

        Ok(Self {
            path,
            region,
            deflate,
            chunks,
            non_empty,
            modified: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn region(&self) -> RegionPos {
        self.region
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    fn slot(&self, chunk: ChunkPos) -> Result<usize> {
        if !self.region.contains(chunk) {
            return Err(StoreError::OutsideRegion {
                chunk,
                region: self.region,
            });
        }
        Ok(chunk.region_index())
    }

    // ── Light values ────────────────────────────────────────────────────

    pub fn get_custom_luminance(&self, pos: BlockPos) -> Result<u8> {
        let slot = self.slot(pos.chunk())?;
        match &self.chunks[slot] {
            Some(storage) => Ok(storage.get_custom_luminance(pos)?),
            None => Ok(0),
        }
    }

    /// Set one value. A chunk whose last value drops to zero is released.
    pub fn set_custom_luminance(&mut self, pos: BlockPos, value: u8) -> Result<()> {
        let chunk = pos.chunk();
        let slot = self.slot(chunk)?;
        if value > 15 {
            return Err(LightError::NibbleOutOfRange(i32::from(value)).into());
        }
        if self.get_custom_luminance(pos)? == value {
            return Ok(());
        }

        let entry = &mut self.chunks[slot];
        if entry.is_none() {
            *entry = Some(ChunkLightStorage::new(chunk));
            self.non_empty += 1;
        }
        if let Some(storage) = entry {
            storage.set_custom_luminance(pos, value)?;
            if storage.is_empty() {
                *entry = None;
                self.non_empty -= 1;
            }
        }
        self.modified = true;
        Ok(())
    }

    /// Drop every value in `chunk`. Returns whether it held any.
    pub fn clear_chunk(&mut self, chunk: ChunkPos) -> Result<bool> {
        let slot = self.slot(chunk)?;
        if self.chunks[slot].take().is_none() {
            return Ok(false);
        }
        self.non_empty -= 1;
        self.modified = true;
        Ok(true)
    }

    pub fn mask(&self, chunk: ChunkPos) -> Result<u16> {
        let slot = self.slot(chunk)?;
        Ok(self.chunks[slot].as_ref().map_or(0, ChunkLightStorage::mask))
    }

    pub fn non_empty_chunks(&self) -> usize {
        self.non_empty
    }

    /// Chunks holding at least one non-zero value, in index order.
    pub fn affected_chunks(&self) -> Vec<ChunkPos> {
        self.chunks.iter().flatten().map(ChunkLightStorage::chunk).collect()
    }

    pub fn light_sources(&self, chunk: ChunkPos) -> Result<Vec<(BlockPos, u8)>> {
        let slot = self.slot(chunk)?;
        Ok(self.chunks[slot]
            .as_ref()
            .map(ChunkLightStorage::light_sources)
            .unwrap_or_default())
    }

    pub fn all_light_sources(&self) -> Vec<(BlockPos, u8)> {
        self.chunks
            .iter()
            .flatten()
            .flat_map(ChunkLightStorage::light_sources)
            .collect()
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Serialize the whole region, uncompressed.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        out.write_u32::<BigEndian>(NLS_MAGIC)?;
        out.write_i32::<BigEndian>(NLS_VERSION)?;
        out.write_i32::<BigEndian>(self.region.x)?;
        out.write_i32::<BigEndian>(self.region.z)?;
        for (index, storage) in self.chunks.iter().enumerate() {
            let Some(storage) = storage else {
                continue;
            };
            out.write_u16::<BigEndian>(index as u16)?;
            storage.write_to(&mut out)?;
        }
        Ok(out)
    }

    /// Rewrite the file if anything changed. Returns whether a write happened.
    pub fn save(&mut self) -> Result<bool> {
        if !self.modified {
            return Ok(false);
        }
        let bytes = self.to_bytes()?;
        container::write_file(&self.path, &bytes, self.deflate)?;
        self.modified = false;
        tracing::info!(
            "Saved region {} to {} ({} chunks)",
            self.region,
            self.path.display(),
            self.non_empty
        );
        Ok(true)
    }

    pub fn save_and_unload(mut self) -> Result<()> {
        self.save()?;
        self.unload();
        Ok(())
    }

    /// Release the in-memory grid. Unsaved changes are lost.
    pub fn unload(self) {
        if self.modified {
            tracing::warn!(
                "Unloading region {} with unsaved changes ({})",
                self.region,
                self.path.display()
            );
        }
    }
}

fn truncated(e: io::Error) -> StoreError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        StoreError::Corrupt("record truncated".into())
    } else {
        StoreError::Io(e)
    }
}
