//! Pack container reader
//!
//! Walks the chunk stream once, verifying every checksum, and produces a
//! table of descriptors with payload byte ranges. Payload bytes are not kept.

use std::collections::HashSet;

use super::descriptor::{AssetInfo, Compression, DataRange};
use super::format::{
    checksum, ChunkTag, FieldReader, CHUNK_PREFIX, CHUNK_SUFFIX, HEADER_SIZE, MAGIC, VERSION,
};
use crate::core::{Error, Result};
use crate::io::PackFile;

/// One asset record from a pack, before id assignment
#[derive(Clone, Debug, PartialEq)]
pub struct PackEntry {
    pub local_id: u32,
    pub info: AssetInfo,
    pub data: DataRange,
}

/// Descriptor table of a parsed pack
#[derive(Clone, Debug, Default)]
pub struct PackTable {
    pub entries: Vec<PackEntry>,
}

impl PackTable {
    /// Width of the id range the pack needs (largest local id + 1)
    ///
    /// # Returns
    /// `Error::Corrupt` if the span does not fit the 32-bit id space
    pub fn id_span(&self) -> Result<u32> {
        let Some(max) = self.entries.iter().map(|e| e.local_id).max() else {
            return Ok(0);
        };
        max.checked_add(1)
            .ok_or_else(|| Error::Corrupt(format!("asset id {max} leaves no room in the id space")))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Chunk {
    tag: ChunkTag,
    /// File offset of the chunk's length field
    offset: u64,
    payload: Vec<u8>,
}

/// Asset record being assembled between `ASET` and `AEND`
struct OpenAsset {
    local_id: u32,
    info: Option<AssetInfo>,
    data: Option<DataRange>,
}

/// Sequential chunk parser over a positional file
pub struct PackReader<'a> {
    file: &'a dyn PackFile,
    pos: u64,
}

impl<'a> PackReader<'a> {
    /// Parse the full descriptor table of `file`.
    ///
    /// Any structural problem (bad magic, version, checksum, truncation,
    /// malformed records) is an error; the pack was built wrong.
    pub fn parse(file: &'a dyn PackFile) -> Result<PackTable> {
        let mut reader = PackReader { file, pos: 0 };
        reader.read_header()?;

        let mut table = PackTable::default();
        let mut seen = HashSet::new();
        let mut open: Option<OpenAsset> = None;

        loop {
            let chunk = reader.next_chunk()?;
            match chunk.tag {
                ChunkTag::PACK_END => {
                    if let Some(asset) = open {
                        return Err(Error::Corrupt(format!("asset {} has no AEND", asset.local_id)));
                    }
                    break;
                }
                ChunkTag::ASSET => {
                    if let Some(asset) = &open {
                        return Err(Error::Corrupt(format!("ASET inside asset {}", asset.local_id)));
                    }
                    let local_id = FieldReader::new(chunk.tag, &chunk.payload).u32()?;
                    if !seen.insert(local_id) {
                        return Err(Error::Corrupt(format!("duplicate asset id {local_id}")));
                    }
                    open = Some(OpenAsset { local_id, info: None, data: None });
                }
                ChunkTag::DATA | ChunkTag::COMPRESSED_DATA => {
                    let asset = Self::expect_open(&mut open, chunk.tag)?;
                    if asset.data.is_some() {
                        return Err(Error::Corrupt(format!("asset {} has two payloads", asset.local_id)));
                    }
                    asset.data = Some(Self::data_range(&chunk)?);
                }
                ChunkTag::ASSET_END => {
                    let asset = open
                        .take()
                        .ok_or_else(|| Error::Corrupt("AEND outside asset".into()))?;
                    let (Some(info), Some(data)) = (asset.info, asset.data) else {
                        return Err(Error::Corrupt(format!(
                            "asset {} is missing its header or payload",
                            asset.local_id
                        )));
                    };
                    Self::check_payload(asset.local_id, &info, &data)?;
                    table.entries.push(PackEntry { local_id: asset.local_id, info, data });
                }
                tag => match AssetInfo::decode(tag, &chunk.payload)? {
                    Some(info) => {
                        let asset = Self::expect_open(&mut open, tag)?;
                        if asset.info.is_some() {
                            return Err(Error::Corrupt(format!("asset {} has two headers", asset.local_id)));
                        }
                        asset.info = Some(info);
                    }
                    None => {
                        log::debug!("Skipping unknown {} chunk at offset {}", tag, chunk.offset);
                    }
                },
            }
        }

        Ok(table)
    }

    fn expect_open(open: &mut Option<OpenAsset>, tag: ChunkTag) -> Result<&mut OpenAsset> {
        open.as_mut()
            .ok_or_else(|| Error::Corrupt(format!("{tag} chunk outside asset")))
    }

    /// The kind header and the payload must agree on the payload size.
    fn check_payload(local_id: u32, info: &AssetInfo, data: &DataRange) -> Result<()> {
        match info.payload_size()? {
            Some(expected) if expected != data.size => Err(Error::Corrupt(format!(
                "asset {local_id}: {:?} header describes {expected} payload bytes, found {}",
                info.kind(),
                data.size
            ))),
            _ => Ok(()),
        }
    }

    fn data_range(chunk: &Chunk) -> Result<DataRange> {
        let stored_size = chunk.payload.len();
        let (size, compression) = if chunk.tag == ChunkTag::COMPRESSED_DATA {
            let size = FieldReader::new(chunk.tag, &chunk.payload).u32()? as usize;
            (size, Compression::Lz4)
        } else {
            (stored_size, Compression::None)
        };
        Ok(DataRange {
            offset: chunk.offset + CHUNK_PREFIX,
            stored_size,
            size,
            compression,
            checksum: checksum(&chunk.payload),
        })
    }

    fn read_header(&mut self) -> Result<()> {
        if self.file.len() < HEADER_SIZE {
            return Err(Error::Corrupt("file shorter than pack header".into()));
        }
        let mut header = [0u8; HEADER_SIZE as usize];
        self.file.read_at(0, &mut header)?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[..4]);
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = FieldReader::new(ChunkTag(MAGIC), &header[4..]).u32()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion { found: version, expected: VERSION });
        }

        self.pos = HEADER_SIZE;
        Ok(())
    }

    fn next_chunk(&mut self) -> Result<Chunk> {
        let offset = self.pos;
        let len = self.file.len();
        if offset + CHUNK_PREFIX > len {
            return Err(Error::Corrupt(format!("truncated at offset {offset}: missing HEND")));
        }

        let mut prefix = [0u8; CHUNK_PREFIX as usize];
        self.file.read_at(offset, &mut prefix)?;
        let length = FieldReader::new(ChunkTag::PACK_END, &prefix).u32()? as u64;
        let tag = ChunkTag([prefix[4], prefix[5], prefix[6], prefix[7]]);

        let end = offset + CHUNK_PREFIX + length + CHUNK_SUFFIX;
        if end > len {
            return Err(Error::Corrupt(format!("{tag} chunk at offset {offset} runs past end of file")));
        }

        let mut body = vec![0u8; (length + CHUNK_SUFFIX) as usize];
        self.file.read_at(offset + CHUNK_PREFIX, &mut body)?;
        let split = length as usize;
        let mut stored = [0u8; 4];
        stored.copy_from_slice(&body[split..]);
        body.truncate(split);

        if checksum(&body) != u32::from_le_bytes(stored) {
            return Err(Error::ChecksumMismatch { tag, offset });
        }

        self.pos = end;
        Ok(Chunk { tag, offset, payload: body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{FileSystem, MemoryFileSystem};
    use crate::pack::{ImageInfo, MeshInfo, PackWriter, PixelFormat, TextInfo};
    use glam::Vec3;
    use std::sync::Arc;

    fn text_info(len: usize) -> AssetInfo {
        AssetInfo::Text(TextInfo { length: len as u32, encoding: 0 })
    }

    fn parse_bytes(bytes: Vec<u8>) -> Result<PackTable> {
        let fs = MemoryFileSystem::new();
        fs.insert("test.pak", bytes);
        let file: Arc<dyn PackFile> = fs.open("test.pak")?;
        PackReader::parse(file.as_ref())
    }

    #[test]
    fn test_parse_two_assets() {
        let mut writer = PackWriter::new();
        writer.add_asset(0, &text_info(5), b"hello");
        let image = AssetInfo::Image(ImageInfo { width: 2, height: 2, mip_levels: 1, format: PixelFormat::R8 });
        writer.add_asset(3, &image, &[1, 2, 3, 4]);
        let table = parse_bytes(writer.finish()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.id_span().unwrap(), 4);
        assert_eq!(table.entries[0].local_id, 0);
        assert_eq!(table.entries[0].data.size, 5);
        assert_eq!(table.entries[0].data.compression, Compression::None);
        assert_eq!(table.entries[1].info, image);
    }

    #[test]
    fn test_data_offset_points_at_payload() {
        let mut writer = PackWriter::new();
        writer.add_asset(0, &text_info(5), b"hello");
        let bytes = writer.finish();
        let table = parse_bytes(bytes.clone()).unwrap();

        let range = table.entries[0].data;
        let start = range.offset as usize;
        assert_eq!(&bytes[start..start + range.stored_size], b"hello");
        assert_eq!(range.checksum, checksum(b"hello"));
    }

    #[test]
    fn test_compressed_payload_size() {
        let payload = vec![7u8; 10_000];
        let mut writer = PackWriter::new();
        writer.add_compressed_asset(1, &text_info(payload.len()), &payload);
        let table = parse_bytes(writer.finish()).unwrap();

        let range = table.entries[0].data;
        assert_eq!(range.compression, Compression::Lz4);
        assert_eq!(range.size, 10_000);
        assert!(range.stored_size < range.size);
    }

    #[test]
    fn test_empty_pack() {
        let table = parse_bytes(PackWriter::new().finish()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.id_span().unwrap(), 0);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = PackWriter::new().finish();
        bytes[0] = b'X';
        assert!(matches!(parse_bytes(bytes), Err(Error::BadMagic(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = PackWriter::new().finish();
        bytes[4] = 9;
        assert!(matches!(
            parse_bytes(bytes),
            Err(Error::UnsupportedVersion { found: 9, expected: VERSION })
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut writer = PackWriter::new();
        writer.add_asset(0, &text_info(5), b"hello");
        let mut bytes = writer.finish();
        let pos = bytes.windows(5).position(|w| w == b"hello").unwrap();
        bytes[pos] = b'j';

        let err = parse_bytes(bytes).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { tag: ChunkTag::DATA, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_truncated_pack() {
        let mut writer = PackWriter::new();
        writer.add_asset(0, &text_info(5), b"hello");
        let mut bytes = writer.finish();
        bytes.truncate(bytes.len() - 12); // drop HEND
        assert!(matches!(parse_bytes(bytes), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_unknown_chunks_are_skipped() {
        let mut writer = PackWriter::new();
        writer.chunk(ChunkTag(*b"XTRA"), b"future");
        writer.chunk(ChunkTag::ASSET, &4u32.to_le_bytes());
        writer.chunk(ChunkTag(*b"NOTE"), b"comment");
        let (tag, header) = text_info(2).encode();
        writer.chunk(tag, &header);
        writer.chunk(ChunkTag::DATA, b"hi");
        writer.chunk(ChunkTag::ASSET_END, &[]);
        let table = parse_bytes(writer.finish()).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.entries[0].local_id, 4);
    }

    #[test]
    fn test_nested_asset_is_corrupt() {
        let mut writer = PackWriter::new();
        writer.chunk(ChunkTag::ASSET, &0u32.to_le_bytes());
        writer.chunk(ChunkTag::ASSET, &1u32.to_le_bytes());
        assert!(matches!(parse_bytes(writer.finish()), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_missing_payload_is_corrupt() {
        let mut writer = PackWriter::new();
        writer.chunk(ChunkTag::ASSET, &0u32.to_le_bytes());
        let (tag, header) = text_info(0).encode();
        writer.chunk(tag, &header);
        writer.chunk(ChunkTag::ASSET_END, &[]);
        assert!(matches!(parse_bytes(writer.finish()), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_duplicate_id_is_corrupt() {
        let mut writer = PackWriter::new();
        writer.add_asset(2, &text_info(1), b"a");
        writer.add_asset(2, &text_info(1), b"b");
        assert!(matches!(parse_bytes(writer.finish()), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_data_outside_asset_is_corrupt() {
        let mut writer = PackWriter::new();
        writer.chunk(ChunkTag::DATA, b"orphan");
        assert!(matches!(parse_bytes(writer.finish()), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_image_header_must_match_payload() {
        let image = AssetInfo::Image(ImageInfo { width: 4, height: 4, mip_levels: 1, format: PixelFormat::R8 });
        let mut writer = PackWriter::new();
        writer.add_asset(0, &image, &[0u8; 12]);
        assert!(matches!(parse_bytes(writer.finish()), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_excess_mip_levels_is_corrupt() {
        let image = AssetInfo::Image(ImageInfo { width: 4, height: 4, mip_levels: 40, format: PixelFormat::R8 });
        let mut writer = PackWriter::new();
        writer.add_asset(0, &image, &[0u8; 21]);
        assert!(matches!(parse_bytes(writer.finish()), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_mesh_counts_must_match_payload() {
        let mesh = AssetInfo::Mesh(MeshInfo {
            vertex_count: u32::MAX,
            index_count: 0,
            vertex_stride: u32::MAX,
            index_size: 2,
            bounds_min: Vec3::ZERO,
            bounds_max: Vec3::ONE,
        });
        let mut writer = PackWriter::new();
        writer.add_asset(0, &mesh, &[0u8; 12]);
        assert!(matches!(parse_bytes(writer.finish()), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_compressed_payload_checked_against_header() {
        let image = AssetInfo::Image(ImageInfo { width: 8, height: 8, mip_levels: 1, format: PixelFormat::R8 });
        let mut writer = PackWriter::new();
        writer.add_compressed_asset(0, &image, &[1u8; 64]);
        assert_eq!(parse_bytes(writer.finish()).unwrap().len(), 1);

        let mut writer = PackWriter::new();
        writer.add_compressed_asset(0, &image, &[1u8; 63]);
        assert!(matches!(parse_bytes(writer.finish()), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_id_span_at_top_of_id_space() {
        let mut writer = PackWriter::new();
        writer.add_asset(u32::MAX, &text_info(1), b"x");
        let table = parse_bytes(writer.finish()).unwrap();
        assert!(matches!(table.id_span(), Err(Error::Corrupt(_))));
    }
}
