use super::position::BlockPos;

/// A voxel with a custom light level override.
///
/// The storage layers are generic over the concrete type; they read it through
/// this trait and build new instances through an injected [`CreateFn`].
///
/// A luminance of 0 means "no override". Such sources are never persisted.
pub trait LightSource: Clone + PartialEq + Send + Sync + 'static {
    fn position(&self) -> BlockPos;
    /// Short ASCII identifier of the block type that carries the light.
    fn material(&self) -> &str;
    fn luminance(&self) -> u8;
    fn is_migrated(&self) -> bool;
}

/// Builds one concrete light source from its decoded parts:
/// `(position, luminance, migrated, material)`.
pub type CreateFn<L> = fn(BlockPos, u8, bool, &str) -> L;

/// Plain owned light source, usable directly as `L` when the caller has no
/// richer type of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BasicLightSource {
    pub position: BlockPos,
    pub material: String,
    pub luminance: u8,
    pub migrated: bool,
}

impl BasicLightSource {
    pub fn new(position: BlockPos, luminance: u8, migrated: bool, material: impl Into<String>) -> Self {
        Self {
            position,
            material: material.into(),
            luminance,
            migrated,
        }
    }

    /// [`CreateFn`] for this type.
    pub fn create(position: BlockPos, luminance: u8, migrated: bool, material: &str) -> Self {
        Self::new(position, luminance, migrated, material)
    }
}

impl LightSource for BasicLightSource {
    fn position(&self) -> BlockPos {
        self.position
    }

    fn material(&self) -> &str {
        &self.material
    }

    fn luminance(&self) -> u8 {
        self.luminance
    }

    fn is_migrated(&self) -> bool {
        self.migrated
    }
}

/// Owned, mutable view of any light source, used as the target of migrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightRecord {
    pub position: BlockPos,
    pub luminance: u8,
    pub migrated: bool,
    pub material: String,
}

impl LightRecord {
    pub fn of<L: LightSource>(source: &L) -> Self {
        Self {
            position: source.position(),
            luminance: source.luminance(),
            migrated: source.is_migrated(),
            material: source.material().to_owned(),
        }
    }

    pub fn build<L>(&self, create: CreateFn<L>) -> L {
        create(self.position, self.luminance, self.migrated, &self.material)
    }
}
