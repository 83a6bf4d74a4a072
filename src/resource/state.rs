//! Resource lifecycle state machine
//!
//! Every resource moves `Empty -> Loading -> Waiting -> Testing -> Ready`.
//! Transitions out of `Empty` and `Waiting` are claimed with a
//! compare-and-swap, so concurrent callers never run the same step twice:
//! the loser just reports the state it observed. No lock is held while a
//! step calls into the cache, the device, or a dependency.
//!
//! Steps only `try_lock` the resource data. A caller holding a
//! [`ResourceRef::read`](super::manager::ResourceRef::read) guard stalls that
//! resource (it reports `Empty` or `Waiting`) instead of deadlocking.

use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::device::UploadRequest;
use super::handle::{ResourceId, ResourceKind};
use super::manager::ResourceManager;
use super::staging::StagingLease;
use crate::pack::AssetDescriptor;

/// Lifecycle state of a resource
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Nothing materialized; the next request starts a load
    Empty = 0,
    /// Claimed by a caller that is decoding the cached bytes
    Loading = 1,
    /// Upload submitted or dependencies outstanding
    Waiting = 2,
    /// Claimed by a caller checking completion
    Testing = 3,
    /// Usable
    Ready = 4,
}

impl ResourceState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ResourceState::Loading,
            2 => ResourceState::Waiting,
            3 => ResourceState::Testing,
            4 => ResourceState::Ready,
            _ => ResourceState::Empty,
        }
    }
}

/// Failure to decode a cached payload into a resource
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("payload is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// Per-kind hooks driven by the lifecycle state machine
pub trait Resource: Send + Sync + 'static {
    const KIND: ResourceKind;

    /// Staging bytes needed to upload this resource. Zero skips the upload.
    fn staging_size(&self, asset: &AssetDescriptor) -> usize;

    /// Decode the cached `bytes` into `self` and fill `staging`, which is
    /// exactly [`staging_size`](Resource::staging_size) bytes long.
    fn materialize(
        &mut self,
        asset: &AssetDescriptor,
        bytes: &[u8],
        staging: &mut [u8],
    ) -> Result<(), MaterializeError>;

    /// Resources that must be `Ready` before this one can be.
    fn dependencies(&self) -> Vec<ResourceId> {
        Vec::new()
    }

    /// Release CPU-side data on physical destruction.
    fn destroy(&mut self) {}
}

pub(crate) struct CellInner<T> {
    pub(crate) value: T,
    lease: Option<StagingLease>,
    failure_reported: bool,
}

impl<T> CellInner<T> {
    /// Log a decode failure once per resource.
    fn report_failure(&mut self, kind: ResourceKind, asset: &AssetDescriptor, error: &MaterializeError) {
        if !self.failure_reported {
            self.failure_reported = true;
            log::error!("Failed to materialize {:?} from asset {}: {}", kind, asset.id(), error);
        }
    }
}

/// Shared storage of one resource
pub(crate) struct ResourceCell<T> {
    state: AtomicU8,
    asset: Option<Arc<AssetDescriptor>>,
    pub(crate) inner: Mutex<CellInner<T>>,
}

impl<T: Resource> ResourceCell<T> {
    pub(crate) fn new(asset: Option<Arc<AssetDescriptor>>, value: T) -> Self {
        Self {
            state: AtomicU8::new(ResourceState::Empty as u8),
            asset,
            inner: Mutex::new(CellInner {
                value,
                lease: None,
                failure_reported: false,
            }),
        }
    }

    pub(crate) fn asset(&self) -> Option<&Arc<AssetDescriptor>> {
        self.asset.as_ref()
    }

    fn load_state(&self) -> ResourceState {
        ResourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn store(&self, state: ResourceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn claim(&self, from: ResourceState, to: ResourceState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Loading step: fetch bytes, decode, stage and submit the upload.
    /// Returns the state to publish.
    fn load(&self, id: ResourceId, manager: &ResourceManager) -> ResourceState {
        // Synthetic resources have nothing to fetch
        let Some(asset) = &self.asset else {
            return ResourceState::Waiting;
        };
        let Some(bytes) = manager.assets().request(asset) else {
            return ResourceState::Empty;
        };

        // Held by a reader; retry on a later poll
        let Some(mut inner) = self.inner.try_lock() else {
            return ResourceState::Empty;
        };
        let size = inner.value.staging_size(asset);
        if size > bytes.len() {
            inner.report_failure(T::KIND, asset, &MaterializeError::SizeMismatch {
                expected: size,
                actual: bytes.len(),
            });
            return ResourceState::Empty;
        }
        let mut lease = if size > 0 {
            match manager.staging().lease(size) {
                Some(lease) => Some(lease),
                None => {
                    log::trace!("No staging lease for {:?} {}", T::KIND, asset.id());
                    return ResourceState::Empty;
                }
            }
        } else {
            None
        };

        let staging: &mut [u8] = match lease.as_mut() {
            Some(lease) => lease.bytes_mut(),
            None => &mut [],
        };
        if let Err(e) = inner.value.materialize(asset, &bytes, staging) {
            inner.report_failure(T::KIND, asset, &e);
            return ResourceState::Empty;
        }
        drop(inner);

        if let Some(lease) = &lease {
            manager.device().upload(UploadRequest {
                resource: id,
                kind: T::KIND,
                bytes: lease.bytes(),
                signal: lease.signal().clone(),
            });
        }
        self.inner.lock().lease = lease;
        log::debug!("Materialized {:?} from asset {} ({} staged bytes)", T::KIND, asset.id(), size);
        ResourceState::Waiting
    }

    /// Testing step: upload finished and every dependency ready.
    fn test(&self, manager: &ResourceManager) -> ResourceState {
        let dependencies = {
            let Some(inner) = self.inner.try_lock() else {
                return ResourceState::Waiting;
            };
            if inner.lease.as_ref().is_some_and(|lease| !lease.is_complete()) {
                return ResourceState::Waiting;
            }
            inner.value.dependencies()
        };

        // Drive all of them, not just the first pending one
        let mut ready = true;
        for dependency in dependencies {
            if manager.drive(dependency) != ResourceState::Ready {
                ready = false;
            }
        }
        if !ready {
            return ResourceState::Waiting;
        }

        // Returns the staging buffer to the pool
        self.inner.lock().lease = None;
        ResourceState::Ready
    }
}

/// Object-safe view of a [`ResourceCell`] for the manager's pool
pub(crate) trait ErasedResource: Send + Sync {
    fn kind(&self) -> ResourceKind;
    fn state(&self) -> ResourceState;
    /// Advance the state machine as far as it can go right now.
    fn drive(&self, id: ResourceId, manager: &ResourceManager) -> ResourceState;
    fn destroy(&self, id: ResourceId, manager: &ResourceManager);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Resource> ErasedResource for ResourceCell<T> {
    fn kind(&self) -> ResourceKind {
        T::KIND
    }

    fn state(&self) -> ResourceState {
        self.load_state()
    }

    fn drive(&self, id: ResourceId, manager: &ResourceManager) -> ResourceState {
        match self.load_state() {
            ResourceState::Ready => return ResourceState::Ready,
            ResourceState::Empty => {
                if !self.claim(ResourceState::Empty, ResourceState::Loading) {
                    return self.load_state();
                }
                let next = self.load(id, manager);
                self.store(next);
                if next != ResourceState::Waiting {
                    return next;
                }
            }
            ResourceState::Waiting => {}
            // Another caller owns the current step
            busy => return busy,
        }

        if !self.claim(ResourceState::Waiting, ResourceState::Testing) {
            return self.load_state();
        }
        let next = self.test(manager);
        self.store(next);
        next
    }

    fn destroy(&self, id: ResourceId, manager: &ResourceManager) {
        {
            let mut inner = self.inner.lock();
            inner.lease = None;
            inner.value.destroy();
        }
        self.store(ResourceState::Empty);
        manager.device().release(id, T::KIND);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
