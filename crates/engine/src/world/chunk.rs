use std::io::{self, Read, Write};

use super::nibble::NibbleArray;
use super::position::{BlockPos, ChunkPos};
use crate::error::LightError;

/// Number of blocks along each axis of a chunk section.
pub const SECTION_SIZE: usize = 16;
/// Light values in one section.
pub const SECTION_VOLUME: usize = SECTION_SIZE * SECTION_SIZE * SECTION_SIZE;
/// Packed size of one section on disk.
pub const SECTION_BYTES: usize = SECTION_VOLUME / 2;
/// Vertical sections per chunk column.
pub const SECTION_COUNT: usize = 16;

/// Custom light levels for one chunk column.
///
/// Sixteen 16x16x16 sections, each allocated only while it holds a non-zero
/// value. Writing the last non-zero value of a section back to zero frees it,
/// so [`mask`](Self::mask) always reflects the minimal set of sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLightStorage {
    chunk: ChunkPos,
    sections: [Option<NibbleArray>; SECTION_COUNT],
}

impl ChunkLightStorage {
    pub fn new(chunk: ChunkPos) -> Self {
        Self {
            chunk,
            sections: Default::default(),
        }
    }

    pub fn chunk(&self) -> ChunkPos {
        self.chunk
    }

    pub fn get_custom_luminance(&self, pos: BlockPos) -> Result<u8, LightError> {
        let section_idx = section_index(pos.y)?;
        match &self.sections[section_idx] {
            Some(section) => Ok(section.get(value_index(pos))),
            None => Ok(0),
        }
    }

    pub fn set_custom_luminance(&mut self, pos: BlockPos, value: u8) -> Result<(), LightError> {
        let section_idx = section_index(pos.y)?;
        let slot = &mut self.sections[section_idx];

        if slot.is_none() {
            if value == 0 {
                return Ok(());
            }
            *slot = Some(NibbleArray::new(SECTION_VOLUME)?);
        }

        if let Some(section) = slot {
            section.set(value_index(pos), i32::from(value))?;
            if value == 0 && section.is_zero() {
                *slot = None;
            }
        }
        Ok(())
    }

    /// Bit `i` is set iff section `i` holds at least one non-zero value.
    pub fn mask(&self) -> u16 {
        let mut mask = 0u16;
        for (y, section) in self.sections.iter().enumerate() {
            if section.as_ref().is_some_and(|s| !s.is_zero()) {
                mask |= 1 << y;
            }
        }
        mask
    }

    pub fn is_empty(&self) -> bool {
        self.mask() == 0
    }

    pub fn section(&self, index: usize) -> Option<&NibbleArray> {
        self.sections.get(index).and_then(Option::as_ref)
    }

    /// Every position holding a non-zero value, with its luminance.
    pub fn light_sources(&self) -> Vec<(BlockPos, u8)> {
        let mut out = Vec::new();
        for (section_y, section) in self.sections.iter().enumerate() {
            let Some(section) = section else {
                continue;
            };
            for index in 0..SECTION_VOLUME {
                let value = section.get(index);
                if value == 0 {
                    continue;
                }
                let x = (index & 0xF) as u8;
                let z = ((index >> 4) & 0xF) as u8;
                let y = (section_y * SECTION_SIZE + (index >> 8)) as i32;
                out.push((self.chunk.relative(x, y, z), value));
            }
        }
        out
    }

    /// Write the 16-bit section mask followed by each present section's bytes.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mask = self.mask();
        out.write_all(&mask.to_be_bytes())?;
        for (y, section) in self.sections.iter().enumerate() {
            if mask & (1 << y) == 0 {
                continue;
            }
            if let Some(section) = section {
                out.write_all(section.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Inverse of [`write_to`](Self::write_to).
    pub fn read_from<R: Read>(chunk: ChunkPos, input: &mut R) -> io::Result<Self> {
        let mut mask_bytes = [0u8; 2];
        input.read_exact(&mut mask_bytes)?;
        let mask = u16::from_be_bytes(mask_bytes);

        let mut storage = Self::new(chunk);
        for y in 0..SECTION_COUNT {
            if mask & (1 << y) == 0 {
                continue;
            }
            let mut bytes = vec![0u8; SECTION_BYTES];
            input.read_exact(&mut bytes)?;
            storage.sections[y] = Some(NibbleArray::from_bytes(bytes));
        }
        Ok(storage)
    }
}

fn section_index(y: i32) -> Result<usize, LightError> {
    let index = y >> 4;
    if !(0..SECTION_COUNT as i32).contains(&index) {
        return Err(LightError::SectionOutOfRange(index));
    }
    Ok(index as usize)
}

/// Index inside a section: `y << 8 | z << 4 | x` (YZX order).
#[inline]
fn value_index(pos: BlockPos) -> usize {
    let local = pos.local();
    ((local.section_local_y() as usize) << 8) | ((local.z as usize) << 4) | local.x as usize
}
