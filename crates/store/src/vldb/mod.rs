//! Variable-length light source database: one `.vldb2` file per region.
//!
//! The whole file lives in memory as a single blob. Every structural edit
//! builds a complete replacement blob (new header, copied spans, new record)
//! and swaps it in under the store lock, so the buffer is always parseable and
//! a failed edit leaves both memory and disk untouched.

pub mod codec;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use lumen_engine::world::{ChunkPos, CreateFn, LightSource, RegionPos};

use crate::container;
use crate::error::{Result, StoreError};
use codec::OFFSET_TABLE_ENTRY_SIZE;

/// File extension for variable-format region files.
pub const VLDB_EXTENSION: &str = "vldb2";

struct RegionBlob {
    bytes: Vec<u8>,
    /// Derived from the header; rebuilt on every structural edit.
    offsets: HashMap<ChunkPos, u32>,
    modified: bool,
}

impl RegionBlob {
    fn replace(&mut self, bytes: Vec<u8>, offsets: HashMap<ChunkPos, u32>) {
        self.bytes = bytes;
        self.offsets = offsets;
        self.modified = true;
    }
}

pub struct VariableRegionStore<L> {
    path: PathBuf,
    region: RegionPos,
    deflate: bool,
    create: CreateFn<L>,
    blob: Mutex<RegionBlob>,
}

impl<L: LightSource> VariableRegionStore<L> {
    /// A new, header-only store. Nothing touches the disk until [`save`](Self::save).
    pub fn create(path: impl Into<PathBuf>, region: RegionPos, deflate: bool, create: CreateFn<L>) -> Result<Self> {
        let offsets = HashMap::new();
        let mut bytes = Vec::with_capacity(codec::header_size(0));
        codec::write_header(&mut bytes, region, &offsets)?;
        Ok(Self {
            path: path.into(),
            region,
            deflate,
            create,
            blob: Mutex::new(RegionBlob {
                bytes,
                offsets,
                modified: true,
            }),
        })
    }

    /// Load an existing file, raw or gzip'd.
    pub fn open(path: impl Into<PathBuf>, deflate: bool, create: CreateFn<L>) -> Result<Self> {
        let path = path.into();
        let bytes = container::read_file(&path)?;
        let header = codec::read_header(&bytes)?;
        tracing::info!(
            "Loaded region {} from {} ({} chunks, {} bytes)",
            header.region,
            path.display(),
            header.offsets.len(),
            bytes.len()
        );
        Ok(Self {
            path,
            region: header.region,
            deflate,
            create,
            blob: Mutex::new(RegionBlob {
                bytes,
                offsets: header.offsets,
                modified: false,
            }),
        })
    }

    fn blob(&self) -> MutexGuard<'_, RegionBlob> {
        self.blob.lock().expect("region blob lock poisoned")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn region(&self) -> RegionPos {
        self.region
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

    /// Validate `sources` as one chunk's record set and encode it.
    fn encode_record(&self, chunk: ChunkPos, sources: &[L]) -> Result<Vec<u8>> {
        self.check_region(chunk)?;
        if let Some(other) = sources
            .iter()
            .map(|s| s.position().chunk())
            .find(|c| *c != chunk)
        {
            return Err(StoreError::MixedChunks { first: chunk, other });
        }
        codec::validate(sources)?;

        let mut record = Vec::with_capacity(codec::chunk_size(sources));
        codec::write_chunk(&mut record, chunk, sources)?;
        Ok(record)
    }

    // ── Structural edits ────────────────────────────────────────────────

    /// Add the record for a chunk that has none yet. All sources must share one
    /// chunk inside this region.
    pub fn insert_chunk(&self, sources: &[L]) -> Result<()> {
        let Some(first) = sources.first() else {
            return Err(StoreError::EmptyBatch);
        };
        let chunk = first.position().chunk();
        let record = self.encode_record(chunk, sources)?;

        let mut blob = self.blob();
        if blob.offsets.contains_key(&chunk) {
            return Err(StoreError::ChunkPresent(chunk));
        }

        // The header grows by one entry, pushing every record back.
        let mut offsets: HashMap<ChunkPos, u32> = blob
            .offsets
            .iter()
            .map(|(c, offset)| (*c, offset + OFFSET_TABLE_ENTRY_SIZE as u32))
            .collect();
        offsets.insert(chunk, (blob.bytes.len() + OFFSET_TABLE_ENTRY_SIZE) as u32);

        let old_header = codec::header_size(blob.offsets.len());
        let mut bytes = Vec::with_capacity(blob.bytes.len() + OFFSET_TABLE_ENTRY_SIZE + record.len());
        codec::write_header(&mut bytes, self.region, &offsets)?;
        bytes.extend_from_slice(&blob.bytes[old_header..]);
        bytes.extend_from_slice(&record);

        tracing::debug!("Inserted chunk {} ({} sources, {} bytes)", chunk, sources.len(), record.len());
        blob.replace(bytes, offsets);
        Ok(())
    }

    /// Replace the record of a chunk that already has one. An empty `sources`
    /// removes the chunk.
    pub fn edit_chunk(&self, chunk: ChunkPos, sources: &[L]) -> Result<()> {
        if sources.is_empty() {
            return self.remove_chunk(chunk);
        }
        let record = self.encode_record(chunk, sources)?;

        let mut blob = self.blob();
        let Some(&offset) = blob.offsets.get(&chunk) else {
            return Err(StoreError::ChunkAbsent(chunk));
        };
        let start = offset as usize;
        let old_len = codec::record_len(&blob.bytes, start)?;
        let end = start + old_len;

        if record.len() == old_len {
            let mut bytes = blob.bytes.clone();
            bytes[start..end].copy_from_slice(&record);
            let offsets = std::mem::take(&mut blob.offsets);
            tracing::debug!("Edited chunk {} in place ({} bytes)", chunk, old_len);
            blob.replace(bytes, offsets);
            return Ok(());
        }

        let delta = record.len() as i64 - old_len as i64;
        let offsets: HashMap<ChunkPos, u32> = blob
            .offsets
            .iter()
            .map(|(c, o)| {
                if *o <= offset {
                    (*c, *o)
                } else {
                    (*c, (i64::from(*o) + delta) as u32)
                }
            })
            .collect();

        let header = codec::header_size(offsets.len());
        let mut bytes = Vec::with_capacity((blob.bytes.len() as i64 + delta) as usize);
        codec::write_header(&mut bytes, self.region, &offsets)?;
        bytes.extend_from_slice(&blob.bytes[header..start]);
        bytes.extend_from_slice(&record);
        bytes.extend_from_slice(&blob.bytes[end..]);

        tracing::debug!("Edited chunk {} ({} -> {} bytes)", chunk, old_len, record.len());
        blob.replace(bytes, offsets);
        Ok(())
    }

    /// Drop a chunk's record. Fails if it has none.
    pub fn remove_chunk(&self, chunk: ChunkPos) -> Result<()> {
        self.check_region(chunk)?;

        let mut blob = self.blob();
        let Some(&offset) = blob.offsets.get(&chunk) else {
            return Err(StoreError::ChunkAbsent(chunk));
        };
        let start = offset as usize;
        let len = codec::record_len(&blob.bytes, start)?;
        let end = start + len;

        // Everything loses one header entry; records after the removed one
        // also lose its bytes.
        let offsets: HashMap<ChunkPos, u32> = blob
            .offsets
            .iter()
            .filter(|(c, _)| **c != chunk)
            .map(|(c, o)| {
                let shift = if *o < offset {
                    OFFSET_TABLE_ENTRY_SIZE
                } else {
                    OFFSET_TABLE_ENTRY_SIZE + len
                };
                o.checked_sub(shift as u32)
                    .map(|moved| (*c, moved))
                    .ok_or_else(|| StoreError::Corrupt(format!("chunk {c} overlaps the record of {chunk}")))
            })
            .collect::<Result<_>>()?;

        let old_header = codec::header_size(blob.offsets.len());
        let mut bytes = Vec::with_capacity(blob.bytes.len() - OFFSET_TABLE_ENTRY_SIZE - len);
        codec::write_header(&mut bytes, self.region, &offsets)?;
        bytes.extend_from_slice(&blob.bytes[old_header..start]);
        bytes.extend_from_slice(&blob.bytes[end..]);

        tracing::debug!("Removed chunk {} ({} bytes)", chunk, len);
        blob.replace(bytes, offsets);
        Ok(())
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Light sources stored for `chunk`; empty if it has no record.
    pub fn read_chunk(&self, chunk: ChunkPos) -> Result<Vec<L>> {
        self.check_region(chunk)?;
        let blob = self.blob();
        let Some(&offset) = blob.offsets.get(&chunk) else {
            return Ok(Vec::new());
        };
        let (found, sources, _) = codec::read_chunk_at(&blob.bytes, offset as usize, self.region, self.create)?;
        if found != chunk {
            return Err(StoreError::Corrupt(format!(
                "offset table points chunk {chunk} at the record of {found}"
            )));
        }
        Ok(sources)
    }

    /// Every light source in the file, scanning records in file order.
    pub fn read_all(&self) -> Result<Vec<L>> {
        let blob = self.blob();
        codec::read_all(&blob.bytes, self.create)
    }

    pub fn has_chunk_data(&self, chunk: ChunkPos) -> bool {
        self.blob().offsets.contains_key(&chunk)
    }

    /// Snapshot of the offset table.
    pub fn offset_table(&self) -> HashMap<ChunkPos, u32> {
        self.blob().offsets.clone()
    }

    pub fn chunk_count(&self) -> usize {
        self.blob().offsets.len()
    }

    /// Size of the uncompressed blob.
    pub fn byte_len(&self) -> usize {
        self.blob().bytes.len()
    }

    /// Copy of the uncompressed blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.blob().bytes.clone()
    }

    pub fn is_modified(&self) -> bool {
        self.blob().modified
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Write the blob to disk if it changed since the last load or save.
    /// Returns whether a write happened.
    pub fn save(&self) -> Result<bool> {
        let mut blob = self.blob();
        if !blob.modified {
            return Ok(false);
        }
        container::write_file(&self.path, &blob.bytes, self.deflate)?;
        blob.modified = false;
        tracing::info!(
            "Saved region {} to {} ({} chunks, {} bytes)",
            self.region,
            self.path.display(),
            blob.offsets.len(),
            blob.bytes.len()
        );
        Ok(true)
    }
}
