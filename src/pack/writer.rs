//! Pack container writer
//!
//! Produces the layout [`PackReader`](super::PackReader) parses. Compressed
//! payloads use the same LZ4 framing as the loader's decompression path.

use super::descriptor::AssetInfo;
use super::format::{checksum, ChunkTag, MAGIC, VERSION};

/// Builds a pack file in memory
pub struct PackWriter {
    bytes: Vec<u8>,
    assets: usize,
}

impl Default for PackWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PackWriter {
    pub fn new() -> Self {
        let mut bytes = Vec::with_capacity(4096);
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        Self { bytes, assets: 0 }
    }

    /// Append an asset with a raw `DATA` payload.
    pub fn add_asset(&mut self, local_id: u32, info: &AssetInfo, payload: &[u8]) -> &mut Self {
        self.asset_chunks(local_id, info, ChunkTag::DATA, payload)
    }

    /// Append an asset whose payload is stored LZ4-compressed in a `CDAT` chunk.
    pub fn add_compressed_asset(&mut self, local_id: u32, info: &AssetInfo, payload: &[u8]) -> &mut Self {
        let compressed = lz4_flex::compress_prepend_size(payload);
        self.asset_chunks(local_id, info, ChunkTag::COMPRESSED_DATA, &compressed)
    }

    fn asset_chunks(&mut self, local_id: u32, info: &AssetInfo, data_tag: ChunkTag, data: &[u8]) -> &mut Self {
        let (header_tag, header) = info.encode();
        self.chunk(ChunkTag::ASSET, &local_id.to_le_bytes())
            .chunk(header_tag, &header)
            .chunk(data_tag, data)
            .chunk(ChunkTag::ASSET_END, &[]);
        self.assets += 1;
        self
    }

    /// Append a single chunk with a valid checksum.
    pub fn chunk(&mut self, tag: ChunkTag, payload: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(&tag.0);
        self.bytes.extend_from_slice(payload);
        self.bytes.extend_from_slice(&checksum(payload).to_le_bytes());
        self
    }

    /// Number of assets written so far
    pub fn asset_count(&self) -> usize {
        self.assets
    }

    /// Terminate the pack with `HEND` and return its bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.chunk(ChunkTag::PACK_END, &[]);
        self.bytes
    }
}
