//! Upload device seam
//!
//! The materializer hands staged bytes to an external device (usually a GPU
//! queue) and polls a completion signal. Everything past this trait is
//! rendering-specific and lives outside the crate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::handle::{ResourceId, ResourceKind};

/// Completion flag shared between a staging lease and the device
#[derive(Clone, Debug, Default)]
pub struct UploadSignal(Arc<AtomicBool>);

impl UploadSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the upload finished. Called by the device.
    pub fn complete(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One staged upload
pub struct UploadRequest<'a> {
    pub resource: ResourceId,
    pub kind: ResourceKind,
    /// Staged bytes; the borrow ends when `upload` returns
    pub bytes: &'a [u8],
    /// Complete this once the device no longer needs the staging slot
    pub signal: UploadSignal,
}

/// Consumption device for staged resource bytes
pub trait UploadDevice: Send + Sync {
    /// Begin an upload. Must not block on completion.
    fn upload(&self, request: UploadRequest<'_>);

    /// Free device storage of a physically destroyed resource.
    fn release(&self, _resource: ResourceId, _kind: ResourceKind) {}
}

/// Device that accepts every upload and completes it at once
///
/// For headless tools and tests; counts what passed through it.
#[derive(Debug, Default)]
pub struct ImmediateUpload {
    uploads: AtomicU64,
    bytes: AtomicU64,
}

impl ImmediateUpload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl UploadDevice for ImmediateUpload {
    fn upload(&self, request: UploadRequest<'_>) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(request.bytes.len() as u64, Ordering::Relaxed);
        request.signal.complete();
    }
}
