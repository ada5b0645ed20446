/// Number of blocks along each horizontal axis of a chunk.
pub const CHUNK_WIDTH: i32 = 16;
/// Number of chunks along each axis of a region.
pub const REGION_WIDTH: i32 = 32;
/// Chunk slots in one region (32x32).
pub const REGION_CHUNKS: usize = (REGION_WIDTH * REGION_WIDTH) as usize;

/// Absolute block position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk this block belongs to.
    pub const fn chunk(&self) -> ChunkPos {
        ChunkPos {
            x: self.x >> 4,
            z: self.z >> 4,
        }
    }

    /// The region this block belongs to.
    pub const fn region(&self) -> RegionPos {
        self.chunk().region()
    }

    /// Position within the chunk (0..16 for x and z, y unchanged).
    pub const fn local(&self) -> LocalBlockPos {
        LocalBlockPos {
            x: (self.x & 0xF) as u8,
            y: self.y,
            z: (self.z & 0xF) as u8,
        }
    }
}

/// Chunk column position (each chunk is 16x16 blocks horizontally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn region(&self) -> RegionPos {
        RegionPos {
            x: self.x >> 5,
            z: self.z >> 5,
        }
    }

    /// X offset inside the owning region, always in 0..32.
    pub const fn region_local_x(&self) -> u8 {
        self.x.rem_euclid(REGION_WIDTH) as u8
    }

    /// Z offset inside the owning region, always in 0..32.
    pub const fn region_local_z(&self) -> u8 {
        self.z.rem_euclid(REGION_WIDTH) as u8
    }

    /// Dense slot index inside the owning region: `z << 5 | x`.
    pub const fn region_index(&self) -> usize {
        ((self.region_local_z() as usize) << 5) | self.region_local_x() as usize
    }

    /// Absolute position of a block given chunk-relative coordinates.
    pub const fn relative(&self, x: u8, y: i32, z: u8) -> BlockPos {
        BlockPos::new((self.x << 4) + x as i32, y, (self.z << 4) + z as i32)
    }
}

impl std::fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Region position: a 32x32 group of chunks persisted as one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn contains(&self, chunk: ChunkPos) -> bool {
        let region = chunk.region();
        region.x == self.x && region.z == self.z
    }

    /// The chunk at the given region-local slot (`z << 5 | x`).
    pub const fn chunk_at(&self, index: usize) -> ChunkPos {
        ChunkPos::new(
            self.x * REGION_WIDTH + (index & 0x1F) as i32,
            self.z * REGION_WIDTH + ((index >> 5) & 0x1F) as i32,
        )
    }

    /// Conventional file name for this region: `r.<x>.<z>.<extension>`.
    pub fn file_name(&self, extension: &str) -> String {
        format!("r.{}.{}.{}", self.x, self.z, extension)
    }
}

impl std::fmt::Display for RegionPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r.{}.{}", self.x, self.z)
    }
}

/// Block position local to a chunk (x, z in 0..16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalBlockPos {
    pub x: u8,
    pub y: i32,
    pub z: u8,
}

impl LocalBlockPos {
    pub const fn section_index(&self) -> i32 {
        self.y >> 4
    }

    pub const fn section_local_y(&self) -> u8 {
        self.y.rem_euclid(16) as u8
    }
}
