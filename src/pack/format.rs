//! Chunk-level layout of the pack container
//!
//! ```text
//! header: "SPAK" | version:u32
//! chunk:  length:u32 | tag:[u8; 4] | payload[length] | checksum:u32
//! ```
//! All integers are little-endian.

use std::fmt;

use crate::core::{Error, Result};

/// File magic
pub const MAGIC: [u8; 4] = *b"SPAK";
/// Container version understood by the reader
pub const VERSION: u32 = 1;
/// Size of the magic + version header
pub const HEADER_SIZE: u64 = 8;
/// Bytes preceding a chunk payload (length + tag)
pub const CHUNK_PREFIX: u64 = 8;
/// Bytes following a chunk payload (checksum)
pub const CHUNK_SUFFIX: u64 = 4;

/// Four-character chunk type tag
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkTag(pub [u8; 4]);

impl ChunkTag {
    pub const ASSET: ChunkTag = ChunkTag(*b"ASET");
    pub const TEXT: ChunkTag = ChunkTag(*b"TEXT");
    pub const IMAGE: ChunkTag = ChunkTag(*b"IMAG");
    pub const MESH: ChunkTag = ChunkTag(*b"MESH");
    pub const MATERIAL: ChunkTag = ChunkTag(*b"MATL");
    pub const FONT: ChunkTag = ChunkTag(*b"FONT");
    pub const MODEL: ChunkTag = ChunkTag(*b"MODL");
    pub const CATALOG: ChunkTag = ChunkTag(*b"CATL");
    pub const DATA: ChunkTag = ChunkTag(*b"DATA");
    pub const COMPRESSED_DATA: ChunkTag = ChunkTag(*b"CDAT");
    pub const ASSET_END: ChunkTag = ChunkTag(*b"AEND");
    pub const PACK_END: ChunkTag = ChunkTag(*b"HEND");
}

impl fmt::Display for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkTag({self})")
    }
}

/// Payload checksum: each byte is XORed into the lane selected by its
/// position modulo 4.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .enumerate()
        .fold(0u32, |sum, (i, &b)| sum ^ ((b as u32) << (8 * (i % 4))))
}

/// Little-endian field cursor over a chunk payload
pub(crate) struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    tag: ChunkTag,
}

impl<'a> FieldReader<'a> {
    pub fn new(tag: ChunkTag, bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0, tag }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let field = self
            .bytes
            .get(self.pos..self.pos + N)
            .and_then(|s| <[u8; N]>::try_from(s).ok())
            .ok_or_else(|| {
                Error::Corrupt(format!("{} chunk too short ({} bytes)", self.tag, self.bytes.len()))
            })?;
        self.pos += N;
        Ok(field)
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    pub fn vec3(&mut self) -> Result<glam::Vec3> {
        Ok(glam::Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }
}

/// Little-endian field writer, the inverse of [`FieldReader`]
#[derive(Default)]
pub(crate) struct FieldWriter {
    pub bytes: Vec<u8>,
}

impl FieldWriter {
    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn vec3(&mut self, v: glam::Vec3) -> &mut Self {
        self.f32(v.x).f32(v.y).f32(v.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_lanes() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x11]), 0x0000_0011);
        assert_eq!(checksum(&[0x11, 0x22, 0x33, 0x44]), 0x4433_2211);
        // Fifth byte wraps back to lane 0
        assert_eq!(checksum(&[0x11, 0x22, 0x33, 0x44, 0x01]), 0x4433_2210);
    }

    #[test]
    fn test_checksum_detects_position() {
        assert_ne!(checksum(&[1, 2]), checksum(&[2, 1]));
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(ChunkTag::ASSET.to_string(), "ASET");
        assert_eq!(ChunkTag([b'A', 0, b'B', 0xff]).to_string(), "A?B?");
    }

    #[test]
    fn test_field_reader_short_chunk() {
        let bytes = 7u32.to_le_bytes();
        let mut reader = FieldReader::new(ChunkTag::IMAGE, &bytes);
        assert_eq!(reader.u32().unwrap(), 7);
        assert!(matches!(reader.u32(), Err(Error::Corrupt(_))));
    }
}
