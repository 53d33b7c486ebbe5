//! Typed references to live commands

use cef_mem::{PoolId, SlotHandle};
use core::fmt;
use core::hash::{Hash, Hasher};

/// Identifier of a long-lived command that is not pool allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SingletonId(pub u8);

/// Reference to a command known to the executor.
///
/// Singletons live for the whole program and are never released. Pooled
/// commands are addressed through the generation-checked slot handle of
/// the pool that owns their storage.
pub enum CommandHandle<C> {
    Singleton(SingletonId),
    Pooled(SlotHandle<C>),
}

impl<C> CommandHandle<C> {
    pub const fn is_singleton(&self) -> bool {
        matches!(self, CommandHandle::Singleton(_))
    }

    /// Pool holding the command, `None` for singletons
    pub fn pool(&self) -> Option<PoolId> {
        match self {
            CommandHandle::Singleton(_) => None,
            CommandHandle::Pooled(slot) => Some(slot.pool()),
        }
    }

    pub fn slot(&self) -> Option<SlotHandle<C>> {
        match *self {
            CommandHandle::Singleton(_) => None,
            CommandHandle::Pooled(slot) => Some(slot),
        }
    }
}

impl<C> Clone for CommandHandle<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for CommandHandle<C> {}

impl<C> PartialEq for CommandHandle<C> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CommandHandle::Singleton(a), CommandHandle::Singleton(b)) => a == b,
            (CommandHandle::Pooled(a), CommandHandle::Pooled(b)) => a == b,
            _ => false,
        }
    }
}

impl<C> Eq for CommandHandle<C> {}

impl<C> Hash for CommandHandle<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            CommandHandle::Singleton(id) => {
                0u8.hash(state);
                id.hash(state);
            }
            CommandHandle::Pooled(slot) => {
                1u8.hash(state);
                slot.pool().hash(state);
                slot.index().hash(state);
                slot.generation().hash(state);
            }
        }
    }
}

impl<C> fmt::Debug for CommandHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandHandle::Singleton(id) => write!(f, "Singleton({})", id.0),
            CommandHandle::Pooled(slot) => write!(f, "Pooled({slot:?})"),
        }
    }
}

#[cfg(feature = "defmt")]
impl<C> defmt::Format for CommandHandle<C> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            CommandHandle::Singleton(id) => defmt::write!(fmt, "Singleton({=u8})", id.0),
            CommandHandle::Pooled(slot) => defmt::write!(fmt, "Pooled({})", slot),
        }
    }
}
