//! Bounded FIFO of opaque handles

use heapless::Deque;

/// Fixed-capacity circular queue of handles.
///
/// Holds at most `N` entries; storage is reserved up front and never grows.
/// Intended for one producer role and one consumer role: nothing here
/// serialises concurrent callers.
pub struct RingQueue<T, const N: usize> {
    queue: Deque<T, N>,
}

impl<T, const N: usize> RingQueue<T, N> {
    /// Create a new empty queue
    pub const fn new() -> Self {
        Self { queue: Deque::new() }
    }

    /// Append `item` at the tail.
    ///
    /// A full queue hands the item back untouched.
    pub fn put(&mut self, item: T) -> Result<(), T> {
        self.queue.push_back(item)
    }

    /// Take the oldest entry
    pub fn get(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    /// Oldest entry, left in place
    pub fn peek(&self) -> Option<&T> {
        self.queue.front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Usable capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.queue.iter()
    }
}

impl<T: PartialEq, const N: usize> RingQueue<T, N> {
    /// Remove the first entry equal to `item`, keeping the order of the rest.
    ///
    /// O(n): every entry is cycled through the queue once.
    pub fn remove(&mut self, item: &T) -> bool {
        let mut removed = false;
        for _ in 0..self.queue.len() {
            let Some(entry) = self.queue.pop_front() else {
                break;
            };
            if !removed && entry == *item {
                removed = true;
                continue;
            }
            // one slot was just vacated, so this cannot fail
            let _ = self.queue.push_back(entry);
        }
        removed
    }

    pub fn contains(&self, item: &T) -> bool {
        self.queue.iter().any(|entry| entry == item)
    }
}

impl<T, const N: usize> Default for RingQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
