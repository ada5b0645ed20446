//! Optional gzip container around region files.
//!
//! Both region formats may be stored raw or gzip-compressed. Reads sniff the
//! first three bytes (`1F 8B` gzip magic + `08` deflate method) and inflate
//! transparently; writes compress only when asked to.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Gzip magic followed by the deflate compression method byte.
const GZIP_HEADER: [u8; 3] = [0x1F, 0x8B, 0x08];

/// True if `bytes` starts with a gzip member using deflate.
pub fn is_gzipped(bytes: &[u8]) -> bool {
    bytes.len() >= GZIP_HEADER.len() && bytes[..GZIP_HEADER.len()] == GZIP_HEADER
}

/// Inflate `bytes` if they are gzip'd, otherwise return them unchanged.
pub fn inflate(bytes: Vec<u8>) -> std::io::Result<Vec<u8>> {
    if !is_gzipped(&bytes) {
        return Ok(bytes);
    }
    let mut out = Vec::with_capacity(bytes.len() * 4);
    GzDecoder::new(bytes.as_slice()).read_to_end(&mut out)?;
    Ok(out)
}

/// Read a whole file, inflating it if it is gzip'd.
pub fn read_file(path: &Path) -> std::io::Result<Vec<u8>> {
    inflate(fs::read(path)?)
}

/// Replace `path` with `bytes`, gzip'd when `deflate` is set.
///
/// The file is written in one go from a complete buffer.
pub fn write_file(path: &Path, bytes: &[u8], deflate: bool) -> std::io::Result<()> {
    if deflate {
        let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
        encoder.write_all(bytes)?;
        fs::write(path, encoder.finish()?)
    } else {
        fs::write(path, bytes)
    }
}
