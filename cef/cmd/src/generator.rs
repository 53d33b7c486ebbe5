//! Opcode driven command allocation.
//!
//! The opcode to pool mapping is fixed when the application is built: a
//! [`CommandTable`] names the pool for each opcode and constructs the
//! concrete command. [`CommandGenerator`] drives the table and owns the
//! rolling local sequence number.

use crate::command::{Command, CommandCore};
use crate::handle::CommandHandle;
use crate::pool::CommandArena;
use cef_core::{CefResult, ErrorCode, FatalError, OpCode};
use cef_mem::PoolId;
use core::marker::PhantomData;

/// Build-time registry of pooled commands for family `C`
pub trait CommandTable<C> {
    /// Pool registered for `opcode`, if any
    fn pool_for(&self, opcode: OpCode) -> Option<PoolId>;

    fn arena(&self, id: PoolId) -> Option<&dyn CommandArena<C>>;

    fn arena_mut(&mut self, id: PoolId) -> Option<&mut dyn CommandArena<C>>;

    /// Build the concrete command for `opcode` around `core`, together with
    /// the size of its concrete type
    fn construct(&self, opcode: OpCode, core: CommandCore<C>) -> Option<(C, usize)>;
}

pub struct CommandGenerator<T, C> {
    table: T,
    next_sequence: u16,
    _family: PhantomData<fn() -> C>,
}

impl<T: CommandTable<C>, C: Command<C>> CommandGenerator<T, C> {
    pub const fn new(table: T) -> Self {
        Self {
            table,
            next_sequence: 0,
            _family: PhantomData,
        }
    }

    pub fn is_registered(&self, opcode: OpCode) -> bool {
        self.table.pool_for(opcode).is_some()
    }

    /// Allocate and construct the command registered for `opcode`.
    ///
    /// `None` when nothing is registered for the opcode or its pool is
    /// exhausted. Callers treat both as backpressure.
    pub fn allocate(&mut self, opcode: OpCode) -> Option<CommandHandle<C>> {
        let id = self.table.pool_for(opcode)?;
        if self.table.arena(id)?.available() == 0 {
            return None;
        }
        let mut core = CommandCore::new(opcode);
        core.sequence_number = self.next_sequence;
        let (command, size) = self.table.construct(opcode, core)?;
        let slot = self.table.arena_mut(id)?.allocate(command, size)?;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        Some(CommandHandle::Pooled(slot))
    }

    /// Release a pooled command.
    ///
    /// Fatal for singletons, for handles whose pool is unknown and for
    /// handles the pool does not recognise (double free).
    pub fn free(&mut self, handle: CommandHandle<C>) -> CefResult<()> {
        let CommandHandle::Pooled(slot) = handle else {
            return Err(FatalError::new(
                ErrorCode::CommandNotPoolAllocated,
                "free of a command that has no pool",
            ));
        };
        let arena = self
            .table
            .arena_mut(slot.pool())
            .ok_or_else(|| FatalError::new(ErrorCode::ForeignPoolHandle, "no such command pool"))?;
        arena.free(slot).map(drop)
    }

    pub fn get(&self, handle: CommandHandle<C>) -> Option<&C> {
        let slot = handle.slot()?;
        self.table.arena(slot.pool())?.get(slot)
    }

    pub fn get_mut(&mut self, handle: CommandHandle<C>) -> Option<&mut C> {
        let slot = handle.slot()?;
        self.table.arena_mut(slot.pool())?.get_mut(slot)
    }

    pub fn table(&self) -> &T {
        &self.table
    }
}
