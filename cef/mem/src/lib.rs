#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]

//! # CEF Memory
//!
//! Deterministic storage for the CEF framework: bounded ring queues of
//! handles and fixed-slot memory pools. Nothing here allocates after
//! construction.

pub mod pool;
pub mod ring;

pub use pool::{MemoryPool, PoolId, SlotHandle};
pub use ring::RingQueue;

/// Memory pool statistics for debugging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of slots in the pool
    pub total_slots: usize,
    /// Number of free slots currently available
    pub free_slots: usize,
    /// Number of slots currently in use
    pub used_slots: usize,
    /// Minimum number of free slots ever reached
    pub min_free_slots: usize,
    /// Allocation requests that were refused
    pub alloc_failures: u32,
}

impl PoolStats {
    pub const fn new(total_slots: usize) -> Self {
        Self {
            total_slots,
            free_slots: total_slots,
            used_slots: 0,
            min_free_slots: total_slots,
            alloc_failures: 0,
        }
    }

    /// Update statistics after allocation
    pub fn on_alloc(&mut self) {
        self.used_slots += 1;
        self.free_slots -= 1;
        if self.free_slots < self.min_free_slots {
            self.min_free_slots = self.free_slots;
        }
    }

    /// Update statistics after deallocation
    pub fn on_dealloc(&mut self) {
        if self.used_slots > 0 {
            self.used_slots -= 1;
            self.free_slots += 1;
        }
    }

    pub fn on_alloc_failure(&mut self) {
        self.alloc_failures = self.alloc_failures.saturating_add(1);
    }

    /// No slot is free
    pub const fn is_exhausted(&self) -> bool {
        self.free_slots == 0
    }

    /// Every slot is free
    pub const fn is_idle(&self) -> bool {
        self.used_slots == 0
    }

    /// Utilization as a percentage (0-100)
    pub fn utilization(&self) -> u8 {
        if self.total_slots == 0 {
            0
        } else {
            ((self.used_slots * 100) / self.total_slots) as u8
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PoolStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "PoolStats{{ total: {}, free: {}, used: {}, min_free: {}, failures: {} }}",
            self.total_slots,
            self.free_slots,
            self.used_slots,
            self.min_free_slots,
            self.alloc_failures
        );
    }
}
