//! Fixed-slot arena with typed, generation-checked handles.
//!
//! Every slot is reserved when the pool is built; allocation and release
//! only move slot indices through a [`RingQueue`] free list. A handle names
//! the pool it came from, the slot index and the slot generation at the
//! time of allocation, so a stale or foreign handle is caught on use.

use crate::ring::RingQueue;
use crate::PoolStats;
use cef_core::{CefResult, ErrorCode, FatalError};
use core::fmt;
use core::marker::PhantomData;
use core::mem::{align_of, size_of};

/// Identifier of one pool instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PoolId(pub u8);

/// Typed reference to an occupied slot of a [`MemoryPool<T, N>`].
pub struct SlotHandle<T> {
    pool: PoolId,
    index: u16,
    generation: u16,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SlotHandle<T> {
    const fn new(pool: PoolId, index: u16, generation: u16) -> Self {
        Self {
            pool,
            index,
            generation,
            _marker: PhantomData,
        }
    }

    pub const fn pool(&self) -> PoolId {
        self.pool
    }

    pub const fn index(&self) -> u16 {
        self.index
    }

    pub const fn generation(&self) -> u16 {
        self.generation
    }
}

impl<T> Clone for SlotHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SlotHandle<T> {}

impl<T> PartialEq for SlotHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.pool == other.pool && self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for SlotHandle<T> {}

impl<T> fmt::Debug for SlotHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotHandle({}:{}#{})", self.pool.0, self.index, self.generation)
    }
}

#[cfg(feature = "defmt")]
impl<T> defmt::Format for SlotHandle<T> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "SlotHandle({=u8}:{=u16}#{=u16})", self.pool.0, self.index, self.generation);
    }
}

/// Round `size` up to pointer alignment
pub const fn slot_size_for(size: usize) -> usize {
    let align = align_of::<usize>();
    (size + align - 1) / align * align
}

/// Pool of `N` uniformly sized slots holding values of type `T`
pub struct MemoryPool<T, const N: usize> {
    id: PoolId,
    slot_size: usize,
    slots: [Option<T>; N],
    generations: [u16; N],
    free: RingQueue<u16, N>,
    stats: PoolStats,
}

impl<T, const N: usize> MemoryPool<T, N> {
    const INDEX_FITS: () = assert!(N <= u16::MAX as usize, "pool index must fit in 16 bits");

    /// Build a pool whose free list holds every slot
    pub fn new(id: PoolId) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::INDEX_FITS;

        let mut free = RingQueue::new();
        for index in 0..N {
            // the free list has exactly N entries of room
            let _ = free.put(index as u16);
        }
        Self {
            id,
            slot_size: slot_size_for(size_of::<T>()),
            slots: core::array::from_fn(|_| None),
            generations: [0; N],
            free,
            stats: PoolStats::new(N),
        }
    }

    /// Place `value` in a free slot.
    ///
    /// `requested_size` is the size of the concrete object the caller needs
    /// room for. Returns `None` when it exceeds the slot size or when no slot
    /// is free; both are ordinary runtime conditions.
    pub fn allocate(&mut self, requested_size: usize, value: T) -> Option<SlotHandle<T>> {
        if requested_size > self.slot_size {
            self.stats.on_alloc_failure();
            return None;
        }
        let Some(index) = self.free.get() else {
            self.stats.on_alloc_failure();
            return None;
        };
        let slot = usize::from(index);
        self.slots[slot] = Some(value);
        self.stats.on_alloc();
        Some(SlotHandle::new(self.id, index, self.generations[slot]))
    }

    /// Return the slot behind `handle` to the free list and hand back its value.
    ///
    /// Fatal when the handle belongs to another pool, names a slot that is
    /// not currently allocated under that generation, or when the free list
    /// refuses the slot.
    pub fn free(&mut self, handle: SlotHandle<T>) -> CefResult<T> {
        let slot = self.checked_slot(handle)?;
        let Some(value) = self.slots[slot].take() else {
            return Err(FatalError::new(ErrorCode::ForeignPoolHandle, "slot already free"));
        };
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        if self.free.put(handle.index).is_err() {
            return Err(FatalError::new(
                ErrorCode::PoolAccountingBroken,
                "free list rejected a released slot",
            ));
        }
        self.stats.on_dealloc();
        Ok(value)
    }

    pub fn get(&self, handle: SlotHandle<T>) -> Option<&T> {
        let slot = self.checked_slot(handle).ok()?;
        self.slots[slot].as_ref()
    }

    pub fn get_mut(&mut self, handle: SlotHandle<T>) -> Option<&mut T> {
        let slot = self.checked_slot(handle).ok()?;
        self.slots[slot].as_mut()
    }

    /// True while `handle` names a live allocation of this pool
    pub fn is_live(&self, handle: SlotHandle<T>) -> bool {
        self.get(handle).is_some()
    }

    pub const fn id(&self) -> PoolId {
        self.id
    }

    /// Bytes available per slot
    pub const fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Number of slots
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of free slots
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    fn checked_slot(&self, handle: SlotHandle<T>) -> CefResult<usize> {
        if handle.pool != self.id {
            return Err(FatalError::new(ErrorCode::ForeignPoolHandle, "handle from another pool"));
        }
        let slot = usize::from(handle.index);
        if slot >= N {
            return Err(FatalError::new(ErrorCode::ForeignPoolHandle, "slot index out of range"));
        }
        if self.generations[slot] != handle.generation {
            return Err(FatalError::new(ErrorCode::ForeignPoolHandle, "stale handle"));
        }
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_size_is_pointer_aligned() {
        let pool: MemoryPool<[u8; 13], 2> = MemoryPool::new(PoolId(0));
        assert_eq!(pool.slot_size() % align_of::<usize>(), 0);
        assert!(pool.slot_size() >= 13);
        assert_eq!(slot_size_for(0), 0);
    }

    #[test]
    fn test_oversized_request_is_refused() {
        let mut pool: MemoryPool<[u8; 16], 2> = MemoryPool::new(PoolId(0));
        assert!(pool.allocate(pool.slot_size() + 1, [0; 16]).is_none());
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.stats().alloc_failures, 1);
    }

    #[test]
    fn test_exhaustion_and_reuse() {
        let mut pool: MemoryPool<u32, 2> = MemoryPool::new(PoolId(3));
        let a = pool.allocate(4, 1).unwrap();
        let b = pool.allocate(4, 2).unwrap();
        assert!(pool.allocate(4, 3).is_none());

        assert_eq!(pool.free(a).unwrap(), 1);
        let c = pool.allocate(4, 4).unwrap();
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);

        assert_eq!(pool.get(b), Some(&2));
        assert_eq!(pool.get(c), Some(&4));
        assert_eq!(pool.get(a), None);
    }

    #[test]
    fn test_double_free_is_fatal() {
        let mut pool: MemoryPool<u8, 1> = MemoryPool::new(PoolId(0));
        let handle = pool.allocate(1, 7).unwrap();
        pool.free(handle).unwrap();
        let err = pool.free(handle).unwrap_err();
        assert_eq!(err.code, ErrorCode::ForeignPoolHandle);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_foreign_handle_is_fatal() {
        let mut first: MemoryPool<u8, 1> = MemoryPool::new(PoolId(1));
        let mut second: MemoryPool<u8, 1> = MemoryPool::new(PoolId(2));
        let handle = first.allocate(1, 0).unwrap();
        assert_eq!(second.free(handle).unwrap_err().code, ErrorCode::ForeignPoolHandle);
        assert!(first.is_live(handle));
    }
}
