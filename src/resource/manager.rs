//! Resource manager: fixed-capacity pool of materialized resources

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::sync::Arc;

use super::deferred::{DeferredQueue, Token};
use super::device::UploadDevice;
use super::font::Font;
use super::handle::{Handle, ResourceId, ResourceKind};
use super::material::Material;
use super::mesh::Mesh;
use super::staging::StagingPool;
use super::state::{ErasedResource, Resource, ResourceCell, ResourceState};
use super::texture::Texture;
use crate::core::{Error, Result, StreamingConfig};
use crate::pack::AssetDescriptor;
use crate::streaming::AssetManager;

struct PoolSlot {
    generation: u32,
    resource: Option<Arc<dyn ErasedResource>>,
    released: bool,
}

struct Retired {
    id: ResourceId,
    resource: Arc<dyn ErasedResource>,
}

struct ResourcePool {
    slots: Vec<PoolSlot>,
    free: Vec<u32>,
    capacity: usize,
    deferred: DeferredQueue<Retired>,
    exhaustion_reported: bool,
}

impl ResourcePool {
    fn live(&self, id: ResourceId) -> Option<&PoolSlot> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.resource.is_some())
    }

    fn allocate(&mut self, resource: Arc<dyn ErasedResource>) -> Option<ResourceId> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.slots.len() < self.capacity => {
                self.slots.push(PoolSlot {
                    generation: 0,
                    resource: None,
                    released: false,
                });
                (self.slots.len() - 1) as u32
            }
            None => return None,
        };
        let slot = &mut self.slots[index as usize];
        slot.resource = Some(resource);
        slot.released = false;
        Some(ResourceId {
            index,
            generation: slot.generation,
        })
    }

    fn free_slot(&mut self, id: ResourceId) {
        let slot = &mut self.slots[id.index as usize];
        slot.resource = None;
        slot.released = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
    }
}

/// Borrowed view of a live resource
pub struct ResourceRef<T> {
    id: ResourceId,
    cell: Arc<ResourceCell<T>>,
}

impl<T: Resource> ResourceRef<T> {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn state(&self) -> ResourceState {
        ErasedResource::state(&*self.cell)
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ResourceState::Ready
    }

    /// Backing asset; `None` for synthetic resources
    pub fn asset(&self) -> Option<&Arc<AssetDescriptor>> {
        self.cell.asset()
    }

    /// Lock the resource data
    ///
    /// Blocks while a caller is materializing it. While the guard is held,
    /// [`ResourceManager::request`] on this resource (or on anything that
    /// depends on it) reports `Empty` or `Waiting` without advancing. Do not
    /// call [`ResourceManager::release_token`] while holding it.
    ///
    /// # Returns
    /// Guard over the kind-specific resource data
    pub fn read(&self) -> MappedMutexGuard<'_, T> {
        MutexGuard::map(self.cell.inner.lock(), |inner| &mut inner.value)
    }
}

/// Owns every materialized resource and drives their lifecycles
///
/// Resources are created against asset descriptors, then polled with
/// [`request`](Self::request) until `Ready`. Releasing a handle only queues
/// the resource; it is destroyed once the host hands back a [`Token`]
/// captured after the release, i.e. once the device can no longer be
/// reading it.
pub struct ResourceManager {
    assets: Arc<AssetManager>,
    device: Arc<dyn UploadDevice>,
    staging: StagingPool,
    pool: Mutex<ResourcePool>,
}

impl ResourceManager {
    /// Create a resource manager over an asset cache
    ///
    /// # Arguments
    /// * `config` - Pool size, staging leases and deferred-destroy bound
    /// * `assets` - Cache the resources fetch their payloads from
    /// * `device` - Receives uploads and releases
    pub fn new(
        config: &StreamingConfig,
        assets: Arc<AssetManager>,
        device: Arc<dyn UploadDevice>,
    ) -> Self {
        log::info!(
            "Resource manager: {} slots, {} staging leases of {} KB",
            config.max_resources,
            config.staging_leases,
            config.staging_buffer_size / 1024
        );
        Self {
            assets,
            device,
            staging: StagingPool::new(config.staging_leases, config.staging_buffer_size),
            pool: Mutex::new(ResourcePool {
                slots: Vec::with_capacity(config.max_resources),
                free: Vec::new(),
                capacity: config.max_resources,
                deferred: DeferredQueue::new(config.deferred_capacity),
                exhaustion_reported: false,
            }),
        }
    }

    pub fn assets(&self) -> &Arc<AssetManager> {
        &self.assets
    }

    pub(crate) fn device(&self) -> &dyn UploadDevice {
        &*self.device
    }

    pub(crate) fn staging(&self) -> &StagingPool {
        &self.staging
    }

    /// Register a resource
    ///
    /// Synthetic resources skip loading and become ready once their
    /// dependencies are.
    ///
    /// # Arguments
    /// * `asset` - Backing asset, or `None` for a synthetic resource
    /// * `value` - Initial kind-specific data
    ///
    /// # Returns
    /// Handle to the new resource, or `Error::PoolExhausted` when every slot
    /// is in use
    pub fn create<T: Resource>(
        &self,
        asset: Option<Arc<AssetDescriptor>>,
        value: T,
    ) -> Result<Handle<T>> {
        let cell: Arc<dyn ErasedResource> = Arc::new(ResourceCell::new(asset, value));
        let mut pool = self.pool.lock();
        match pool.allocate(cell) {
            Some(id) => Ok(Handle::new(id)),
            None => {
                if !pool.exhaustion_reported {
                    pool.exhaustion_reported = true;
                    log::error!(
                        "Resource pool exhausted ({} slots); raise max_resources",
                        pool.capacity
                    );
                }
                Err(Error::PoolExhausted {
                    capacity: pool.capacity,
                })
            }
        }
    }

    pub fn create_texture(&self, asset: &Arc<AssetDescriptor>) -> Result<Handle<Texture>> {
        self.create(Some(asset.clone()), Texture::from_asset(asset)?)
    }

    pub fn create_mesh(&self, asset: &Arc<AssetDescriptor>) -> Result<Handle<Mesh>> {
        self.create(Some(asset.clone()), Mesh::from_asset(asset)?)
    }

    /// Font glyph tables are only ready once their atlas texture is.
    pub fn create_font(
        &self,
        asset: &Arc<AssetDescriptor>,
        atlas: Handle<Texture>,
    ) -> Result<Handle<Font>> {
        self.create(Some(asset.clone()), Font::from_asset(asset, atlas)?)
    }

    pub fn create_material(
        &self,
        asset: &Arc<AssetDescriptor>,
        textures: &[Handle<Texture>],
    ) -> Result<Handle<Material>> {
        self.create(Some(asset.clone()), Material::from_asset(asset, textures)?)
    }

    /// Advance a resource's lifecycle and report where it ended up
    ///
    /// Never blocks on I/O or the device. Cheap once `Ready`.
    ///
    /// # Arguments
    /// * `handle` - Resource to drive
    ///
    /// # Returns
    /// State after this poll; `Empty` for stale handles
    pub fn request<T: Resource>(&self, handle: Handle<T>) -> ResourceState {
        self.drive(handle.id())
    }

    pub(crate) fn drive(&self, id: ResourceId) -> ResourceState {
        match self.lookup(id) {
            Some(resource) => resource.drive(id, self),
            None => ResourceState::Empty,
        }
    }

    /// Current state without advancing it
    pub fn state(&self, id: impl Into<ResourceId>) -> ResourceState {
        self.lookup(id.into())
            .map_or(ResourceState::Empty, |resource| resource.state())
    }

    pub fn kind(&self, id: impl Into<ResourceId>) -> Option<ResourceKind> {
        self.lookup(id.into()).map(|resource| resource.kind())
    }

    /// Borrow a live resource
    ///
    /// # Arguments
    /// * `handle` - Resource to look up
    ///
    /// # Returns
    /// `None` if the handle is stale or names a resource of another type
    pub fn get<T: Resource>(&self, handle: Handle<T>) -> Option<ResourceRef<T>> {
        let resource = self.lookup(handle.id())?;
        let cell = resource.into_any().downcast::<ResourceCell<T>>().ok()?;
        Some(ResourceRef {
            id: handle.id(),
            cell,
        })
    }

    fn lookup(&self, id: ResourceId) -> Option<Arc<dyn ErasedResource>> {
        self.pool.lock().live(id)?.resource.clone()
    }

    /// Queue a resource for destruction
    ///
    /// The resource stays reachable until a token captured after this call is
    /// passed to [`release_token`](Self::release_token).
    ///
    /// # Arguments
    /// * `handle` - Resource to release
    ///
    /// # Returns
    /// `false` for stale or already released handles
    pub fn release<T>(&self, handle: Handle<T>) -> bool {
        let id = handle.id();
        let mut pool = self.pool.lock();
        let Some(slot) = pool.slots.get_mut(id.index as usize) else {
            return false;
        };
        if slot.generation != id.generation || slot.released {
            return false;
        }
        let Some(resource) = slot.resource.clone() else {
            return false;
        };
        slot.released = true;
        pool.deferred.push(Retired { id, resource });
        true
    }

    /// Mark the current point in the release stream.
    pub fn token(&self) -> Token {
        self.pool.lock().deferred.token()
    }

    /// Destroy everything released before `token` was captured
    ///
    /// # Arguments
    /// * `token` - Token from [`token`](Self::token), handed back once the
    ///   device is done with everything released before it
    ///
    /// # Returns
    /// Number of resources destroyed
    pub fn release_token(&self, token: Token) -> usize {
        let retired = {
            let mut pool = self.pool.lock();
            let retired = pool.deferred.drain_until(token);
            for entry in &retired {
                pool.free_slot(entry.id);
            }
            retired
        };

        for entry in &retired {
            entry.resource.destroy(entry.id, self);
        }
        if !retired.is_empty() {
            log::debug!(
                "Destroyed {} resources up to generation {}",
                retired.len(),
                token.generation()
            );
        }
        retired.len()
    }

    /// Resources allocated in the pool, released ones included
    pub fn live_count(&self) -> usize {
        let pool = self.pool.lock();
        pool.slots.len() - pool.free.len()
    }

    /// Released resources awaiting a token
    pub fn pending_destroy(&self) -> usize {
        self.pool.lock().deferred.len()
    }

    pub fn capacity(&self) -> usize {
        self.pool.lock().capacity
    }
}
