//! Asset manager: pack catalog plus the streaming cache

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use super::loader::LoadJob;
use super::slab::{CacheStats, Slab, SlotRef, SlotState};
use crate::core::{Error, Result, StreamingConfig};
use crate::io::{FileSystem, WorkQueue};
use crate::pack::{AssetDescriptor, AssetId, PackId, PackReader, PackSource};

/// A loaded pack and the id range it serves
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackHandle {
    id: PackId,
    name: String,
    ids: Range<u32>,
    asset_count: usize,
}

impl PackHandle {
    pub fn id(&self) -> PackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Manager-wide ids reserved for this pack
    pub fn ids(&self) -> Range<u32> {
        self.ids.clone()
    }

    pub fn asset_count(&self) -> usize {
        self.asset_count
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.ids.contains(&id.0)
    }

    /// Manager-wide id of a pack-local asset id
    pub fn asset_id(&self, local_id: u32) -> AssetId {
        AssetId(self.ids.start + local_id)
    }
}

/// Pin on the cache returned by [`AssetManager::acquire_barrier`]
#[must_use = "a barrier stays in place until released"]
#[derive(Debug, PartialEq, Eq)]
pub struct BarrierToken {
    slot: SlotRef,
}

/// Scoped barrier, released on drop
pub struct BarrierGuard<'a> {
    manager: &'a AssetManager,
    token: Option<BarrierToken>,
}

impl Drop for BarrierGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.manager.release_barrier(token);
        }
    }
}

#[derive(Default)]
struct Catalog {
    packs: Vec<PackHandle>,
    descriptors: HashMap<AssetId, Arc<AssetDescriptor>>,
    next_id: u32,
}

/// Streaming cache over one or more packs
///
/// `request` is a non-blocking poll that is safe to call every tick from any
/// number of threads. The slab lock is held only for list manipulation; file
/// reads happen in background jobs.
pub struct AssetManager {
    slab: Arc<Mutex<Slab>>,
    catalog: RwLock<Catalog>,
    fs: Arc<dyn FileSystem>,
    queue: Arc<dyn WorkQueue>,
}

impl AssetManager {
    /// Create an asset manager sized by `config.cache_capacity`
    ///
    /// # Arguments
    /// * `config` - Streaming configuration
    /// * `fs` - Source of pack files
    /// * `queue` - Runs background loads
    pub fn new(config: &StreamingConfig, fs: Arc<dyn FileSystem>, queue: Arc<dyn WorkQueue>) -> Self {
        Self::with_capacity(config.cache_capacity, fs, queue)
    }

    /// Create an asset manager with an explicit cache budget
    ///
    /// # Arguments
    /// * `capacity` - Cache budget in bytes
    /// * `fs` - Source of pack files
    /// * `queue` - Runs background loads
    pub fn with_capacity(capacity: usize, fs: Arc<dyn FileSystem>, queue: Arc<dyn WorkQueue>) -> Self {
        log::info!("Created asset cache: {}KB", capacity / 1024);
        Self {
            slab: Arc::new(Mutex::new(Slab::new(capacity))),
            catalog: RwLock::new(Catalog::default()),
            fs,
            queue,
        }
    }

    /// Open a pack and register its descriptors
    ///
    /// Assets get manager-wide ids starting after the previous pack's range.
    ///
    /// # Arguments
    /// * `identifier` - Pack name passed to the file system
    ///
    /// # Returns
    /// The pack's handle, or `Ok(None)` if it cannot be opened (absent
    /// content). Structural corruption, a header that disagrees with its
    /// payload, or an asset larger than the whole cache is an error and
    /// registers nothing.
    pub fn load(&self, identifier: &str) -> Result<Option<PackHandle>> {
        let file = match self.fs.open(identifier) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Could not open pack '{}': {}", identifier, e);
                return Ok(None);
            }
        };

        let table = PackReader::parse(file.as_ref())?;

        let capacity = self.capacity();
        if let Some(entry) = table.entries.iter().find(|e| e.data.size > capacity) {
            return Err(Error::AssetTooLarge { id: entry.local_id, size: entry.data.size, capacity });
        }

        let mut catalog = self.catalog.write();
        let base = catalog.next_id;
        let end = base
            .checked_add(table.id_span()?)
            .ok_or_else(|| Error::Corrupt(format!("pack '{identifier}' overflows the asset id space")))?;

        let pack_id = PackId(catalog.packs.len() as u32);
        let source = Arc::new(PackSource { id: pack_id, name: identifier.to_string(), file });
        let asset_count = table.len();
        for entry in table.entries {
            let id = AssetId(base + entry.local_id);
            let descriptor = AssetDescriptor::new(id, entry.info, entry.data, source.clone());
            catalog.descriptors.insert(id, Arc::new(descriptor));
        }
        catalog.next_id = end;

        let handle = PackHandle { id: pack_id, name: identifier.to_string(), ids: base..end, asset_count };
        catalog.packs.push(handle.clone());

        log::info!("Loaded pack '{}': {} assets, ids {}..{}", identifier, asset_count, base, end);
        Ok(Some(handle))
    }

    /// Metadata lookup; no I/O
    ///
    /// # Arguments
    /// * `id` - Manager-wide asset id
    ///
    /// # Returns
    /// Descriptor if a loaded pack serves `id`
    pub fn find(&self, id: AssetId) -> Option<Arc<AssetDescriptor>> {
        self.catalog.read().descriptors.get(&id).cloned()
    }

    pub fn packs(&self) -> Vec<PackHandle> {
        self.catalog.read().packs.clone()
    }

    /// Poll for an asset's bytes
    ///
    /// Marks the asset most recently used. On a miss, reserves a slot and
    /// queues a background load. Callers retry on a later tick.
    ///
    /// # Arguments
    /// * `asset` - Descriptor from [`find`](Self::find)
    ///
    /// # Returns
    /// The payload if resident. `None` while a load is in flight, when one
    /// was just started, or when no space could be freed right now.
    pub fn request(&self, asset: &Arc<AssetDescriptor>) -> Option<Arc<[u8]>> {
        let job = {
            let mut slab = self.slab.lock();
            if let Some(index) = slab.find(asset.id()) {
                slab.touch(index);
                return match slab.state(index) {
                    SlotState::Loaded => {
                        slab.stats.hits += 1;
                        slab.payload(index)
                    }
                    _ => None,
                };
            }

            slab.stats.misses += 1;
            let Some(index) = slab.acquire_slot(asset.size()) else {
                log::trace!("No cache space for asset {} ({} bytes)", asset.id(), asset.size());
                return None;
            };
            let slot = slab.begin_load(index, asset.clone());
            LoadJob::new(self.slab.clone(), slot, asset.clone())
        };

        log::trace!("Queued load of asset {}", asset.id());
        self.queue.submit(Box::new(move || job.run()));
        None
    }

    /// State of the slot holding `id`
    ///
    /// # Returns
    /// `None` if no slot holds the asset
    pub fn status(&self, id: AssetId) -> Option<SlotState> {
        let slab = self.slab.lock();
        slab.find(id).map(|index| slab.state(index))
    }

    /// Pin every slot touched from now until the barrier is released
    ///
    /// # Returns
    /// Token to hand back to [`release_barrier`](Self::release_barrier)
    pub fn acquire_barrier(&self) -> BarrierToken {
        BarrierToken { slot: self.slab.lock().acquire_barrier() }
    }

    /// Remove a barrier
    ///
    /// Its slots become evictable unless an older barrier still covers them.
    ///
    /// # Arguments
    /// * `token` - Token from [`acquire_barrier`](Self::acquire_barrier)
    ///
    /// # Returns
    /// `false` for a token that was already released
    pub fn release_barrier(&self, token: BarrierToken) -> bool {
        let released = self.slab.lock().release_barrier(token.slot);
        if !released {
            log::warn!("Ignoring release of stale barrier {:?}", token);
        }
        released
    }

    /// Scoped barrier
    ///
    /// # Returns
    /// Guard that releases the barrier when dropped
    pub fn barrier(&self) -> BarrierGuard<'_> {
        BarrierGuard { manager: self, token: Some(self.acquire_barrier()) }
    }

    pub fn stats(&self) -> CacheStats {
        self.slab.lock().stats
    }

    pub fn capacity(&self) -> usize {
        self.slab.lock().capacity()
    }

    /// Bytes currently reserved by slots
    pub fn used(&self) -> usize {
        self.slab.lock().used()
    }
}
