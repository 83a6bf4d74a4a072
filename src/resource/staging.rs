//! Staging leases
//!
//! A small fixed set of scratch buffers carries bytes from the cache to the
//! upload device. A lease is held until its upload completes, so the pool
//! size bounds the uploads in flight. Dropping a lease returns its buffer.

use parking_lot::Mutex;
use std::sync::Arc;

use super::device::UploadSignal;

struct StagingShared {
    free: Mutex<Vec<Vec<u8>>>,
    /// Bytes a returned buffer may keep allocated
    retain: usize,
}

/// Fixed pool of staging buffers
pub struct StagingPool {
    shared: Arc<StagingShared>,
    leases: usize,
}

impl StagingPool {
    pub fn new(leases: usize, retain: usize) -> Self {
        let free = (0..leases).map(|_| Vec::new()).collect();
        Self {
            shared: Arc::new(StagingShared { free: Mutex::new(free), retain }),
            leases,
        }
    }

    /// Take a zeroed buffer of `size` bytes, or `None` if every lease is out.
    pub fn lease(&self, size: usize) -> Option<StagingLease> {
        let mut buffer = self.shared.free.lock().pop()?;
        buffer.clear();
        buffer.resize(size, 0);
        Some(StagingLease {
            buffer,
            signal: UploadSignal::new(),
            pool: self.shared.clone(),
        })
    }

    /// Leases currently available
    pub fn available(&self) -> usize {
        self.shared.free.lock().len()
    }

    /// Total leases
    pub fn capacity(&self) -> usize {
        self.leases
    }
}

/// A leased scratch buffer plus the completion signal of its upload
pub struct StagingLease {
    buffer: Vec<u8>,
    signal: UploadSignal,
    pool: Arc<StagingShared>,
}

impl StagingLease {
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn signal(&self) -> &UploadSignal {
        &self.signal
    }

    pub fn is_complete(&self) -> bool {
        self.signal.is_complete()
    }
}

impl Drop for StagingLease {
    fn drop(&mut self) {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();
        if buffer.capacity() > self.pool.retain {
            buffer.shrink_to(self.pool.retain);
        }
        self.pool.free.lock().push(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_is_zeroed_and_sized() {
        let pool = StagingPool::new(1, 1024);
        let mut lease = pool.lease(16).unwrap();
        assert_eq!(lease.len(), 16);
        assert!(lease.bytes().iter().all(|&b| b == 0));
        lease.bytes_mut()[0] = 9;
        drop(lease);

        // Reused buffer comes back zeroed
        let lease = pool.lease(4).unwrap();
        assert_eq!(lease.bytes(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_pool_exhaustion_and_return() {
        let pool = StagingPool::new(2, 1024);
        let a = pool.lease(8).unwrap();
        let b = pool.lease(8).unwrap();
        assert!(pool.lease(8).is_none());
        assert_eq!(pool.available(), 0);

        drop(a);
        assert_eq!(pool.available(), 1);
        assert!(pool.lease(8).is_some());
        drop(b);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn test_large_buffers_shrink_on_return() {
        let pool = StagingPool::new(1, 64);
        drop(pool.lease(1 << 20).unwrap());
        let buffer = pool.shared.free.lock().pop().unwrap();
        assert!(buffer.capacity() < 1 << 20);
    }

    #[test]
    fn test_fresh_signal_per_lease() {
        let pool = StagingPool::new(1, 64);
        let lease = pool.lease(1).unwrap();
        lease.signal().complete();
        assert!(lease.is_complete());
        drop(lease);
        assert!(!pool.lease(1).unwrap().is_complete());
    }
}
