//! Memory pools specialised for commands

use crate::command::Command;
use cef_core::CefResult;
use cef_mem::{MemoryPool, PoolId, PoolStats, SlotHandle};

/// Object-safe view of a command pool, so a table can hand out pools of
/// different capacities behind one type.
pub trait CommandArena<C> {
    fn id(&self) -> PoolId;

    /// Place `command` in a free slot. `size` is the size of the concrete
    /// command type; requests larger than a slot are refused.
    fn allocate(&mut self, command: C, size: usize) -> Option<SlotHandle<C>>;

    fn free(&mut self, handle: SlotHandle<C>) -> CefResult<C>;

    fn get(&self, handle: SlotHandle<C>) -> Option<&C>;

    fn get_mut(&mut self, handle: SlotHandle<C>) -> Option<&mut C>;

    fn capacity(&self) -> usize;

    fn available(&self) -> usize;

    fn stats(&self) -> PoolStats;
}

/// A [`MemoryPool`] whose slots hold commands of family `C`.
///
/// Every command placed in the pool is stamped with the pool id so it can
/// be released without knowing its concrete type.
pub struct CommandPool<C, const N: usize> {
    pool: MemoryPool<C, N>,
}

impl<C: Command<C>, const N: usize> CommandPool<C, N> {
    pub fn new(id: PoolId) -> Self {
        Self {
            pool: MemoryPool::new(id),
        }
    }
}

impl<C: Command<C>, const N: usize> CommandArena<C> for CommandPool<C, N> {
    fn id(&self) -> PoolId {
        self.pool.id()
    }

    fn allocate(&mut self, mut command: C, size: usize) -> Option<SlotHandle<C>> {
        if size > self.pool.slot_size() {
            log::warn!(
                "command of {} bytes does not fit pool {} ({} byte slots)",
                size,
                self.pool.id().0,
                self.pool.slot_size()
            );
        }
        command.core_mut().stamp_pool(self.pool.id());
        let handle = self.pool.allocate(size, command);
        if handle.is_none() {
            log::debug!("command pool {} exhausted", self.pool.id().0);
        }
        handle
    }

    fn free(&mut self, handle: SlotHandle<C>) -> CefResult<C> {
        self.pool.free(handle)
    }

    fn get(&self, handle: SlotHandle<C>) -> Option<&C> {
        self.pool.get(handle)
    }

    fn get_mut(&mut self, handle: SlotHandle<C>) -> Option<&mut C> {
        self.pool.get_mut(handle)
    }

    fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    fn available(&self) -> usize {
        self.pool.available()
    }

    fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
