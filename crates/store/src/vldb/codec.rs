//! Byte-level encoding of the variable-length region format.
//!
//! ## Layout (all integers big-endian)
//!
//! | Size | Field |
//! |------|-------|
//! | 4 | Magic `[0x56, 0x4C, 0x44, 0x42]` ("VLDB") |
//! | 4 | Region x (`i32`) |
//! | 4 | Region z (`i32`) |
//! | 2 | Chunk count N (`u16`) |
//! | N×6 | Offset table: encoded chunk coords (`u16`) + record offset (`i32`) |
//! | ... | Chunk records |
//!
//! A chunk record is the encoded chunk coords (`u16`, `x << 8 | z` region-local),
//! a light source count (`u24`), then per light source:
//!
//! | Size | Field |
//! |------|-------|
//! | 2 | Chunk-relative position `x << 12 \| y << 4 \| z` |
//! | 1 | `luminance << 4 \| migrated` |
//! | 2 | Material length L |
//! | L | Material, ASCII |
//!
//! Every offset in the table points at the first byte of its chunk record.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use lumen_engine::world::{ChunkPos, CreateFn, LightSource, RegionPos};

use crate::error::{Result, StoreError};

/// "VLDB".
pub const VLDB_MAGIC: u32 = 0x564C_4442;
/// One offset table entry: encoded chunk coords + `i32` offset.
pub const OFFSET_TABLE_ENTRY_SIZE: usize = 2 + 4;
/// Magic + region x + region z + chunk count.
const HEADER_BASE_SIZE: usize = 4 + 4 + 4 + 2;
/// Encoded chunk coords + `u24` light source count.
const CHUNK_BASE_SIZE: usize = 2 + 3;
/// Packed position + data byte + material length.
const SOURCE_BASE_SIZE: usize = 2 + 1 + 2;
/// The packed relative position keeps 8 bits of y.
const MAX_Y: i32 = 255;

/// Size in bytes of a header holding `chunk_count` offset table entries.
pub const fn header_size(chunk_count: usize) -> usize {
    HEADER_BASE_SIZE + chunk_count * OFFSET_TABLE_ENTRY_SIZE
}

/// Size in bytes of the chunk record for `sources`.
pub fn chunk_size<L: LightSource>(sources: &[L]) -> usize {
    CHUNK_BASE_SIZE
        + sources
            .iter()
            .map(|s| SOURCE_BASE_SIZE + s.material().len())
            .sum::<usize>()
}

/// True if `bytes` start with the VLDB magic.
pub fn is_vldb(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == VLDB_MAGIC.to_be_bytes()
}

pub fn encode_chunk_coords(chunk: ChunkPos) -> u16 {
    (u16::from(chunk.region_local_x()) << 8) | u16::from(chunk.region_local_z())
}

fn decode_chunk_coords(encoded: u16, region: RegionPos) -> ChunkPos {
    ChunkPos::new(
        region.x * 32 + i32::from(encoded >> 8),
        region.z * 32 + i32::from(encoded & 0xFF),
    )
}

/// Reject light sources the format cannot represent.
pub fn validate<L: LightSource>(sources: &[L]) -> Result<()> {
    for source in sources {
        let pos = source.position();
        if !(0..=MAX_Y).contains(&pos.y) {
            return Err(StoreError::invalid_record(pos, "y must be within 0..=255"));
        }
        if !(1..=15).contains(&source.luminance()) {
            return Err(StoreError::invalid_record(pos, "luminance must be within 1..=15"));
        }
        let material = source.material();
        if !material.is_ascii() {
            return Err(StoreError::invalid_record(pos, "material must be ASCII"));
        }
        if material.len() > usize::from(u16::MAX) {
            return Err(StoreError::invalid_record(pos, "material is too long"));
        }
    }
    Ok(())
}

// ── Writing ─────────────────────────────────────────────────────────────────

/// Append a header for `offsets`, entries ordered by ascending offset.
pub fn write_header(out: &mut Vec<u8>, region: RegionPos, offsets: &HashMap<ChunkPos, u32>) -> Result<()> {
    let mut entries: Vec<(ChunkPos, u32)> = offsets.iter().map(|(c, o)| (*c, *o)).collect();
    entries.sort_by_key(|(_, offset)| *offset);

    let count = u16::try_from(entries.len())
        .map_err(|_| StoreError::Corrupt(format!("{} chunks do not fit a u16 count", entries.len())))?;

    out.write_u32::<BigEndian>(VLDB_MAGIC)?;
    out.write_i32::<BigEndian>(region.x)?;
    out.write_i32::<BigEndian>(region.z)?;
    out.write_u16::<BigEndian>(count)?;
    for (chunk, offset) in entries {
        out.write_u16::<BigEndian>(encode_chunk_coords(chunk))?;
        out.write_u32::<BigEndian>(offset)?;
    }
    Ok(())
}

/// Append the chunk record for `sources`, which must already be validated.
pub fn write_chunk<L: LightSource>(out: &mut Vec<u8>, chunk: ChunkPos, sources: &[L]) -> Result<()> {
    out.write_u16::<BigEndian>(encode_chunk_coords(chunk))?;
    out.write_u24::<BigEndian>(sources.len() as u32)?;
    for source in sources {
        let local = source.position().local();
        let packed = (u16::from(local.x) << 12) | ((local.y as u16) << 4) | u16::from(local.z);
        out.write_u16::<BigEndian>(packed)?;
        out.write_u8((source.luminance() << 4) | u8::from(source.is_migrated()))?;
        let material = source.material().as_bytes();
        out.write_u16::<BigEndian>(material.len() as u16)?;
        out.extend_from_slice(material);
    }
    Ok(())
}

/// Build a complete blob for `sources`, grouped into one record per chunk.
///
/// Every source must lie in `region`.
pub fn encode_region<L: LightSource>(region: RegionPos, sources: &[L]) -> Result<Vec<u8>> {
    validate(sources)?;

    let mut by_chunk: HashMap<ChunkPos, Vec<L>> = HashMap::new();
    for source in sources {
        let chunk = source.position().chunk();
        if !region.contains(chunk) {
            return Err(StoreError::OutsideRegion { chunk, region });
        }
        by_chunk.entry(chunk).or_default().push(source.clone());
    }
    let mut chunks: Vec<(ChunkPos, Vec<L>)> = by_chunk.into_iter().collect();
    chunks.sort_by_key(|(chunk, _)| *chunk);

    let mut offsets = HashMap::with_capacity(chunks.len());
    let mut offset = header_size(chunks.len());
    for (chunk, records) in &chunks {
        offsets.insert(*chunk, offset as u32);
        offset += chunk_size(records);
    }

    let mut out = Vec::with_capacity(offset);
    write_header(&mut out, region, &offsets)?;
    for (chunk, records) in &chunks {
        write_chunk(&mut out, *chunk, records)?;
    }
    Ok(out)
}

// ── Reading ─────────────────────────────────────────────────────────────────

/// Parsed header of a VLDB blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub region: RegionPos,
    pub offsets: HashMap<ChunkPos, u32>,
}

/// Cursor over a blob that reports running off the end as corruption.
struct BlobReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> BlobReader<'a> {
    fn at(bytes: &'a [u8], offset: usize) -> Self {
        let mut cursor = Cursor::new(bytes);
        cursor.set_position(offset as u64);
        Self { cursor }
    }

    fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    fn u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.truncated())
    }

    fn u16(&mut self) -> Result<u16> {
        self.cursor.read_u16::<BigEndian>().map_err(|_| self.truncated())
    }

    fn u24(&mut self) -> Result<u32> {
        self.cursor.read_u24::<BigEndian>().map_err(|_| self.truncated())
    }

    fn u32(&mut self) -> Result<u32> {
        self.cursor.read_u32::<BigEndian>().map_err(|_| self.truncated())
    }

    fn i32(&mut self) -> Result<i32> {
        self.cursor.read_i32::<BigEndian>().map_err(|_| self.truncated())
    }

    fn ascii(&mut self) -> Result<String> {
        let len = usize::from(self.u16()?);
        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf).map_err(|_| self.truncated())?;
        if !buf.is_ascii() {
            return Err(StoreError::Corrupt(format!(
                "non-ASCII material at byte {}",
                self.position() - len
            )));
        }
        // ASCII is valid UTF-8.
        String::from_utf8(buf).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn skip(&mut self, n: usize) {
        self.cursor.set_position(self.cursor.position() + n as u64);
    }

    fn truncated(&self) -> StoreError {
        StoreError::Corrupt(format!("record truncated at byte {}", self.position()))
    }
}

fn read_magic(reader: &mut BlobReader<'_>) -> Result<()> {
    let found = reader.u32()?;
    if found != VLDB_MAGIC {
        return Err(StoreError::BadMagic {
            expected: VLDB_MAGIC,
            found,
        });
    }
    Ok(())
}

/// Parse magic, region coordinates and the offset table.
pub fn read_header(bytes: &[u8]) -> Result<Header> {
    let mut reader = BlobReader::at(bytes, 0);
    read_magic(&mut reader)?;
    let region = RegionPos::new(reader.i32()?, reader.i32()?);
    let count = reader.u16()?;

    // Every record lies after the offset table and inside the blob.
    let header = header_size(usize::from(count));
    let mut offsets = HashMap::with_capacity(usize::from(count));
    let mut starts = HashSet::with_capacity(usize::from(count));
    for _ in 0..count {
        let chunk = decode_chunk_coords(reader.u16()?, region);
        let offset = reader.u32()?;
        if (offset as usize) < header || offset as usize >= bytes.len() {
            return Err(StoreError::Corrupt(format!(
                "chunk {chunk} offset {offset} outside records {header}..{}",
                bytes.len()
            )));
        }
        if !starts.insert(offset) {
            return Err(StoreError::Corrupt(format!("offset {offset} shared by more than one chunk")));
        }
        if offsets.insert(chunk, offset).is_some() {
            return Err(StoreError::Corrupt(format!("chunk {chunk} listed twice in offset table")));
        }
    }
    Ok(Header { region, offsets })
}

/// Decode the chunk record starting at `offset`.
///
/// Returns the record's chunk, its light sources, and the offset one past its
/// last byte.
pub fn read_chunk_at<L>(
    bytes: &[u8],
    offset: usize,
    region: RegionPos,
    create: CreateFn<L>,
) -> Result<(ChunkPos, Vec<L>, usize)> {
    let mut reader = BlobReader::at(bytes, offset);
    let chunk = decode_chunk_coords(reader.u16()?, region);
    let count = reader.u24()? as usize;

    let mut sources = Vec::with_capacity(count);
    for _ in 0..count {
        let packed = reader.u16()?;
        let data = reader.u8()?;
        let material = reader.ascii()?;

        let x = ((packed & 0xF000) >> 12) as u8;
        let y = i32::from((packed & 0x0FF0) >> 4);
        let z = (packed & 0x000F) as u8;
        let luminance = (data & 0xF0) >> 4;
        let migrated = data & 0x0F != 0;

        sources.push(create(chunk.relative(x, y, z), luminance, migrated, &material));
    }
    Ok((chunk, sources, reader.position()))
}

/// Byte length of the chunk record starting at `offset`.
pub fn record_len(bytes: &[u8], offset: usize) -> Result<usize> {
    let mut reader = BlobReader::at(bytes, offset);
    reader.u16()?;
    let count = reader.u24()?;
    for _ in 0..count {
        reader.u16()?;
        reader.u8()?;
        let len = usize::from(reader.u16()?);
        reader.skip(len);
    }
    let end = reader.position();
    if end > bytes.len() {
        return Err(StoreError::Corrupt(format!("record at byte {offset} runs past the end of the file")));
    }
    Ok(end - offset)
}

/// Decode every chunk record in order, ignoring the offset table.
pub fn read_all<L>(bytes: &[u8], create: CreateFn<L>) -> Result<Vec<L>> {
    let mut reader = BlobReader::at(bytes, 0);
    read_magic(&mut reader)?;
    let region = RegionPos::new(reader.i32()?, reader.i32()?);
    let count = usize::from(reader.u16()?);
    reader.skip(count * OFFSET_TABLE_ENTRY_SIZE);

    let mut offset = reader.position();
    let mut sources = Vec::new();
    for _ in 0..count {
        let (_, chunk_sources, end) = read_chunk_at(bytes, offset, region, create)?;
        sources.extend(chunk_sources);
        offset = end;
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_engine::world::{BasicLightSource, BlockPos};

    fn source(x: i32, y: i32, z: i32, luminance: u8, migrated: bool, material: &str) -> BasicLightSource {
        BasicLightSource::new(BlockPos::new(x, y, z), luminance, migrated, material)
    }

    #[test]
    fn sizes() {
        assert_eq!(header_size(0), 14);
        assert_eq!(header_size(3), 32);
        let sources = [source(1, 10, 1, 7, false, "SAND"), source(2, 0, 2, 1, true, "")];
        assert_eq!(chunk_size(&sources), 5 + (5 + 4) + 5);
    }

    #[test]
    fn chunk_record_bytes() {
        let sources = [source(1, 10, 1, 7, true, "AB")];
        let mut out = Vec::new();
        write_chunk(&mut out, ChunkPos::new(0, 0), &sources).unwrap();
        assert_eq!(
            out,
            vec![
                0x00, 0x00, // chunk coords
                0x00, 0x00, 0x01, // count
                0x10, 0xA1, // x=1, y=10, z=1
                0x71, // luminance 7, migrated
                0x00, 0x02, b'A', b'B',
            ]
        );
    }

    #[test]
    fn chunk_coords_are_region_local() {
        let chunk = ChunkPos::new(-1, 33);
        let encoded = encode_chunk_coords(chunk);
        assert_eq!(encoded, (31 << 8) | 1);
        assert_eq!(decode_chunk_coords(encoded, chunk.region()), chunk);
    }

    #[test]
    fn empty_header_bytes() {
        let mut out = Vec::new();
        write_header(&mut out, RegionPos::new(-1, 2), &HashMap::new()).unwrap();
        assert_eq!(
            out,
            vec![0x56, 0x4C, 0x44, 0x42, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00]
        );
        assert!(is_vldb(&out));
    }

    #[test]
    fn encode_region_then_read_back() {
        let region = RegionPos::new(-1, 0);
        let sources = vec![
            source(-1, 64, 3, 15, false, "GLOWSTONE"),
            source(-20, 255, 0, 3, true, "SEA_LANTERN"),
            source(-17, 0, 5, 1, false, "TORCH"),
        ];
        let blob = encode_region(region, &sources).unwrap();

        let header = read_header(&blob).unwrap();
        assert_eq!(header.region, region);
        assert_eq!(header.offsets.len(), 2);

        let mut all: Vec<BasicLightSource> = read_all(&blob, BasicLightSource::create).unwrap();
        let mut expected = sources.clone();
        all.sort_by_key(|s| s.position);
        expected.sort_by_key(|s| s.position);
        assert_eq!(all, expected);

        for (chunk, offset) in header.offsets {
            let (found, records, end) =
                read_chunk_at(&blob, offset as usize, region, BasicLightSource::create).unwrap();
            assert_eq!(found, chunk);
            assert_eq!(end - offset as usize, chunk_size(&records));
            assert_eq!(record_len(&blob, offset as usize).unwrap(), chunk_size(&records));
        }
    }

    #[test]
    fn validation_rejects_unencodable_sources() {
        assert!(validate(&[source(0, 256, 0, 1, false, "X")]).is_err());
        assert!(validate(&[source(0, -1, 0, 1, false, "X")]).is_err());
        assert!(validate(&[source(0, 0, 0, 0, false, "X")]).is_err());
        assert!(validate(&[source(0, 0, 0, 16, false, "X")]).is_err());
        assert!(validate(&[source(0, 0, 0, 1, false, "LAMPE_Ä")]).is_err());
        assert!(validate(&[source(0, 0, 0, 1, false, "LAMP")]).is_ok());
    }

    #[test]
    fn bad_magic_and_truncation() {
        let err = read_header(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]).unwrap_err();
        assert!(matches!(err, StoreError::BadMagic { .. }));

        let blob = encode_region(RegionPos::new(0, 0), &[source(1, 1, 1, 1, false, "SAND")]).unwrap();
        let cut = &blob[..blob.len() - 2];
        let err = read_all::<BasicLightSource>(cut, BasicLightSource::create).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    fn one_entry_blob(offset: u32, records: &[u8]) -> Vec<u8> {
        let mut blob = Vec::new();
        blob.extend_from_slice(&VLDB_MAGIC.to_be_bytes());
        blob.extend_from_slice(&0i32.to_be_bytes());
        blob.extend_from_slice(&0i32.to_be_bytes());
        blob.extend_from_slice(&1u16.to_be_bytes());
        blob.extend_from_slice(&0u16.to_be_bytes());
        blob.extend_from_slice(&offset.to_be_bytes());
        blob.extend_from_slice(records);
        blob
    }

    #[test]
    fn offsets_outside_the_records_are_corrupt() {
        // Points back into the header.
        let err = read_header(&one_entry_blob(8, &[])).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));

        // Points past the end.
        let err = read_header(&one_entry_blob(20, &[])).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));

        // An empty record right after the table is fine.
        let header = read_header(&one_entry_blob(20, &[0, 0, 0, 0, 0])).unwrap();
        assert_eq!(header.offsets.get(&ChunkPos::new(0, 0)), Some(&20));
    }

    #[test]
    fn shared_offsets_are_corrupt() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&VLDB_MAGIC.to_be_bytes());
        blob.extend_from_slice(&0i32.to_be_bytes());
        blob.extend_from_slice(&0i32.to_be_bytes());
        blob.extend_from_slice(&2u16.to_be_bytes());
        for coords in [0x0000u16, 0x0101] {
            blob.extend_from_slice(&coords.to_be_bytes());
            blob.extend_from_slice(&26u32.to_be_bytes());
        }
        blob.extend_from_slice(&[0, 0, 0, 0, 0]);
        let err = read_header(&blob).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
