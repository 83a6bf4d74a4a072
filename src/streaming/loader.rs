//! Background load job
//!
//! Runs on a work queue, outside the cache lock: reads the stored bytes,
//! verifies and decompresses them, then takes the lock only to publish.

use parking_lot::Mutex;
use std::sync::Arc;

use super::slab::{Slab, SlotRef};
use crate::core::{Error, Result};
use crate::pack::format::CHUNK_PREFIX;
use crate::pack::{checksum, AssetDescriptor, ChunkTag, Compression};

pub(crate) struct LoadJob {
    slab: Arc<Mutex<Slab>>,
    slot: SlotRef,
    asset: Arc<AssetDescriptor>,
}

impl LoadJob {
    pub fn new(slab: Arc<Mutex<Slab>>, slot: SlotRef, asset: Arc<AssetDescriptor>) -> Self {
        Self { slab, slot, asset }
    }

    pub fn run(self) {
        let result = read_payload(&self.asset);

        let mut slab = self.slab.lock();
        match result {
            Ok(payload) => {
                if slab.complete_load(self.slot, payload) {
                    slab.stats.loads_completed += 1;
                    log::trace!("Loaded asset {} ({} bytes)", self.asset.id(), self.asset.size());
                } else {
                    log::debug!("Discarding stale load of asset {}", self.asset.id());
                }
            }
            Err(e) => {
                slab.abort_load(self.slot);
                slab.stats.loads_failed += 1;
                log::error!(
                    "Failed to load asset {} from '{}': {}",
                    self.asset.id(),
                    self.asset.source().name,
                    e
                );
            }
        }
    }
}

/// Read an asset's payload from its pack, verified and decompressed.
pub fn read_payload(asset: &AssetDescriptor) -> Result<Arc<[u8]>> {
    let range = asset.data();
    let mut stored = vec![0u8; range.stored_size];
    asset.source().file.read_at(range.offset, &mut stored)?;

    if checksum(&stored) != range.checksum {
        let tag = match range.compression {
            Compression::None => ChunkTag::DATA,
            Compression::Lz4 => ChunkTag::COMPRESSED_DATA,
        };
        return Err(Error::ChecksumMismatch { tag, offset: range.offset - CHUNK_PREFIX });
    }

    let bytes = match range.compression {
        Compression::None => stored,
        Compression::Lz4 => lz4_flex::decompress_size_prepended(&stored)
            .map_err(|e| Error::Corrupt(format!("LZ4 decompression failed: {e}")))?,
    };

    if bytes.len() != range.size {
        return Err(Error::Corrupt(format!(
            "asset {} decoded to {} bytes, expected {}",
            asset.id(),
            bytes.len(),
            range.size
        )));
    }

    Ok(bytes.into())
}
