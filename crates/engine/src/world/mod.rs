pub mod chunk;
pub mod nibble;
pub mod position;
pub mod source;

pub use chunk::ChunkLightStorage;
pub use nibble::NibbleArray;
pub use position::{BlockPos, ChunkPos, LocalBlockPos, RegionPos};
pub use source::{BasicLightSource, CreateFn, LightRecord, LightSource};
