//! Error type shared by every persistence component.

use std::io;
use std::path::PathBuf;

use lumen_engine::LightError;
use lumen_engine::world::{ChunkPos, RegionPos};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Nibble or section misuse in the in-memory light grid.
    #[error(transparent)]
    Light(#[from] LightError),

    /// Underlying byte stream failure, propagated unchanged.
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("\"{}\" is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("could not create directory \"{}\": {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("light sources span more than one chunk ({first} and {other})")]
    MixedChunks { first: ChunkPos, other: ChunkPos },

    #[error("chunk {chunk} is not in region {region}")]
    OutsideRegion { chunk: ChunkPos, region: RegionPos },

    #[error("chunk {0} has no record in this file")]
    ChunkAbsent(ChunkPos),

    #[error("chunk {0} already has a record in this file")]
    ChunkPresent(ChunkPos),

    #[error("cannot insert an empty chunk")]
    EmptyBatch,

    /// The region was closed by [`LightWorld::unload_region`](crate::world::LightWorld::unload_region).
    #[error("region {0} is closed")]
    RegionClosed(RegionPos),

    /// A light source that the variable format cannot encode.
    #[error("light source at ({}, {}, {}) cannot be stored: {reason}", .pos.0, .pos.1, .pos.2)]
    InvalidRecord {
        pos: (i32, i32, i32),
        reason: &'static str,
    },

    /// The file is not of the expected format at all.
    #[error("bad magic number: expected {expected:#010X}, found {found:#010X}")]
    BadMagic { expected: u32, found: u32 },

    /// The file is of the expected format but a version this build cannot read.
    #[error("unsupported format version: expected {expected}, found {found}")]
    UnsupportedVersion { expected: i32, found: i32 },

    #[error("duplicate data for chunk {chunk} in \"{}\"", .path.display())]
    DuplicateChunk { chunk: ChunkPos, path: PathBuf },

    /// Structurally invalid bytes (truncated record, non-ASCII material, ...).
    #[error("corrupt region data: {0}")]
    Corrupt(String),

    #[error("\"{}\" already exists", .0.display())]
    FileExists(PathBuf),

    #[error("\"{}\" does not exist", .0.display())]
    FileMissing(PathBuf),

    #[error("invalid config file \"{}\": {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// True for local misuse (bad arguments, wrong file state), false for I/O
    /// and on-disk data failures.
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            StoreError::Light(_)
            | StoreError::NotADirectory(_)
            | StoreError::CreateDir { .. }
            | StoreError::MixedChunks { .. }
            | StoreError::OutsideRegion { .. }
            | StoreError::ChunkAbsent(_)
            | StoreError::ChunkPresent(_)
            | StoreError::EmptyBatch
            | StoreError::RegionClosed(_)
            | StoreError::InvalidRecord { .. }
            | StoreError::FileExists(_)
            | StoreError::FileMissing(_)
            | StoreError::Config { .. } => true,
            StoreError::Io(_)
            | StoreError::BadMagic { .. }
            | StoreError::UnsupportedVersion { .. }
            | StoreError::DuplicateChunk { .. }
            | StoreError::Corrupt(_) => false,
        }
    }

    pub(crate) fn invalid_record(pos: lumen_engine::world::BlockPos, reason: &'static str) -> Self {
        StoreError::InvalidRecord {
            pos: (pos.x, pos.y, pos.z),
            reason,
        }
    }
}
