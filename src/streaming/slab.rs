//! Cache slab: a byte-budgeted arena of slots threaded on an LRU list
//!
//! Slots live in a flat `Vec` and link to each other by index, so growing the
//! arena never invalidates a link. The list runs from `head` (most recently
//! touched) to `tail` (least recently touched). Barriers are zero-sized slots
//! placed in the same list: eviction walks from the tail toward the head and
//! stops at the first barrier, so everything touched after a live barrier was
//! acquired sits head-ward of it and cannot be reclaimed.
//!
//! All state changes happen under the cache lock; a thread that observes
//! `Loaded` therefore also observes the published payload.

use std::collections::HashMap;
use std::sync::Arc;

use crate::pack::{AssetDescriptor, AssetId};

/// List terminator
pub(crate) const NIL: u32 = u32::MAX;

/// State of a cache slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Unallocated, or allocated with no load started
    Empty,
    /// Pin marker, holds no data
    Barrier,
    /// A background job is filling the slot
    Loading,
    /// Payload available
    Loaded,
}

/// Cache counters, accumulated since creation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served from a loaded slot
    pub hits: u64,
    /// Requests for assets with no slot
    pub misses: u64,
    /// Slots reclaimed to make room
    pub evictions: u64,
    /// Allocations refused for lack of evictable space
    pub stalls: u64,
    pub loads_completed: u64,
    pub loads_failed: u64,
}

/// Index plus generation; goes stale once the slot is freed and reused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SlotRef {
    pub index: u32,
    pub generation: u32,
}

pub(crate) struct CacheSlot {
    state: SlotState,
    size: usize,
    asset: Option<Arc<AssetDescriptor>>,
    payload: Option<Arc<[u8]>>,
    /// Neighbour toward the head
    prev: u32,
    /// Neighbour toward the tail
    next: u32,
    /// For barriers: the barrier that was live when this one was acquired
    after: u32,
    generation: u32,
}

impl CacheSlot {
    fn vacant() -> Self {
        Self {
            state: SlotState::Empty,
            size: 0,
            asset: None,
            payload: None,
            prev: NIL,
            next: NIL,
            after: NIL,
            generation: 0,
        }
    }
}

pub(crate) struct Slab {
    slots: Vec<CacheSlot>,
    free: Vec<u32>,
    lookup: HashMap<AssetId, u32>,
    head: u32,
    tail: u32,
    capacity: usize,
    used: usize,
    /// Most recently acquired live barrier
    top_barrier: u32,
    barriers: usize,
    pub stats: CacheStats,
}

impl Slab {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            lookup: HashMap::new(),
            head: NIL,
            tail: NIL,
            capacity,
            used: 0,
            top_barrier: NIL,
            barriers: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn available(&self) -> usize {
        self.capacity - self.used
    }

    pub fn barrier_count(&self) -> usize {
        self.barriers
    }

    pub fn find(&self, id: AssetId) -> Option<u32> {
        self.lookup.get(&id).copied()
    }

    pub fn state(&self, index: u32) -> SlotState {
        self.slots[index as usize].state
    }

    pub fn payload(&self, index: u32) -> Option<Arc<[u8]>> {
        self.slots[index as usize].payload.clone()
    }

    /// Slot indices from most to least recently touched, barriers included
    pub fn lru_order(&self) -> Vec<u32> {
        let mut order = Vec::new();
        let mut cursor = self.head;
        while cursor != NIL {
            order.push(cursor);
            cursor = self.slots[cursor as usize].next;
        }
        order
    }

    /// Move a slot to the head of the LRU list.
    pub fn touch(&mut self, index: u32) {
        if self.head == index {
            return;
        }
        self.unlink(index);
        self.link_head(index);
    }

    /// Reserve `size` bytes for a new slot, evicting from the tail if needed.
    ///
    /// The walk reclaims `Empty` and `Loaded` slots, skips `Loading` ones and
    /// never passes a barrier. If it cannot free enough space nothing is
    /// evicted and `None` is returned; the caller retries on a later tick.
    pub fn acquire_slot(&mut self, size: usize) -> Option<u32> {
        if size > self.capacity {
            self.stats.stalls += 1;
            return None;
        }

        if self.available() < size {
            let mut reclaim = Vec::new();
            let mut freed = 0;
            let mut cursor = self.tail;
            while cursor != NIL && self.available() + freed < size {
                let slot = &self.slots[cursor as usize];
                match slot.state {
                    SlotState::Barrier => break,
                    SlotState::Loading => {}
                    SlotState::Empty | SlotState::Loaded => {
                        reclaim.push(cursor);
                        freed += slot.size;
                    }
                }
                cursor = slot.prev;
            }

            if self.available() + freed < size {
                self.stats.stalls += 1;
                return None;
            }
            for index in reclaim {
                self.evict(index);
            }
        }

        let index = self.alloc(SlotState::Empty, size);
        self.used += size;
        self.link_head(index);
        Some(index)
    }

    /// Bind a freshly acquired slot to `asset` and mark it `Loading`.
    pub fn begin_load(&mut self, index: u32, asset: Arc<AssetDescriptor>) -> SlotRef {
        let slot = &mut self.slots[index as usize];
        debug_assert_eq!(slot.state, SlotState::Empty);
        slot.state = SlotState::Loading;
        self.lookup.insert(asset.id(), index);
        slot.asset = Some(asset);
        SlotRef { index, generation: slot.generation }
    }

    /// Publish a finished load. Returns false if the slot no longer belongs
    /// to that load.
    pub fn complete_load(&mut self, slot: SlotRef, payload: Arc<[u8]>) -> bool {
        if !self.is_current(slot, SlotState::Loading) {
            return false;
        }
        let entry = &mut self.slots[slot.index as usize];
        entry.payload = Some(payload);
        entry.state = SlotState::Loaded;
        true
    }

    /// Drop a failed load so the asset can be requested again.
    pub fn abort_load(&mut self, slot: SlotRef) -> bool {
        if !self.is_current(slot, SlotState::Loading) {
            return false;
        }
        self.evict(slot.index);
        true
    }

    /// Place a barrier at the head of the LRU list.
    pub fn acquire_barrier(&mut self) -> SlotRef {
        let index = self.alloc(SlotState::Barrier, 0);
        self.slots[index as usize].after = self.top_barrier;
        self.top_barrier = index;
        self.barriers += 1;
        self.link_head(index);
        SlotRef { index, generation: self.slots[index as usize].generation }
    }

    /// Remove a barrier. Returns false for a stale or foreign token.
    pub fn release_barrier(&mut self, barrier: SlotRef) -> bool {
        if !self.is_current(barrier, SlotState::Barrier) {
            return false;
        }

        let outer = self.slots[barrier.index as usize].after;
        if self.top_barrier == barrier.index {
            self.top_barrier = outer;
        } else {
            log::warn!("Barrier {} released out of nesting order", barrier.index);
            let mut cursor = self.top_barrier;
            while cursor != NIL {
                let inner = &mut self.slots[cursor as usize];
                if inner.after == barrier.index {
                    inner.after = outer;
                    break;
                }
                cursor = inner.after;
            }
        }

        self.barriers -= 1;
        self.unlink(barrier.index);
        self.release(barrier.index);
        true
    }

    fn is_current(&self, slot: SlotRef, state: SlotState) -> bool {
        self.slots
            .get(slot.index as usize)
            .is_some_and(|s| s.generation == slot.generation && s.state == state)
    }

    fn evict(&mut self, index: u32) {
        let slot = &self.slots[index as usize];
        if let Some(asset) = &slot.asset {
            self.lookup.remove(&asset.id());
            log::trace!("Evicting asset {} ({} bytes)", asset.id(), slot.size);
        }
        self.used -= slot.size;
        self.stats.evictions += 1;
        self.unlink(index);
        self.release(index);
    }

    fn alloc(&mut self, state: SlotState, size: usize) -> u32 {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(CacheSlot::vacant());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.state = state;
        slot.size = size;
        index
    }

    /// Return an unlinked slot to the free list.
    fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        let generation = slot.generation.wrapping_add(1);
        *slot = CacheSlot::vacant();
        slot.generation = generation;
        self.free.push(index);
    }

    fn link_head(&mut self, index: u32) {
        let old_head = self.head;
        {
            let slot = &mut self.slots[index as usize];
            slot.prev = NIL;
            slot.next = old_head;
        }
        if old_head != NIL {
            self.slots[old_head as usize].prev = index;
        } else {
            self.tail = index;
        }
        self.head = index;
    }

    fn unlink(&mut self, index: u32) {
        let (prev, next) = {
            let slot = &self.slots[index as usize];
            (slot.prev, slot.next)
        };
        if prev != NIL {
            self.slots[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
        let slot = &mut self.slots[index as usize];
        slot.prev = NIL;
        slot.next = NIL;
    }
}
