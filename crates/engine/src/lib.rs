//! Game-agnostic storage primitives for per-voxel custom light levels.
//!
//! Positions and the chunk/region grid, packed 4-bit arrays, sparse per-chunk
//! light grids, the [`LightSource`](world::LightSource) abstraction the
//! persistence layer is generic over, and data migrations. Nothing here
//! touches the file system.

pub mod error;
pub mod migrate;
pub mod world;

pub use error::LightError;
