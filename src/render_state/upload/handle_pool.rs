//! Free-list of reusable mesh handles.

use std::collections::VecDeque;

use crate::render_state::backend::MeshHandle;

/// A bounded free-list of backend mesh handles waiting to be refilled.
///
/// The pool never holds more than `capacity` handles. A handle offered to a full pool is
/// handed back so the caller can destroy it.
#[derive(Debug)]
pub struct HandlePool {
    free: VecDeque<MeshHandle>,
    capacity: usize,
}

impl HandlePool {
    /// An empty pool holding at most `capacity` handles.
    pub fn new(capacity: usize) -> Self {
        Self {
            free: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Offers `handle` for reuse.
    ///
    /// # Returns
    /// `Err(handle)` if the pool is full; the caller owns the handle again.
    pub fn push(&mut self, handle: MeshHandle) -> Result<(), MeshHandle> {
        if self.free.len() >= self.capacity {
            return Err(handle);
        }
        self.free.push_back(handle);
        Ok(())
    }

    /// Takes the least recently pooled handle.
    pub fn pop(&mut self) -> Option<MeshHandle> {
        self.free.pop_front()
    }

    /// Empties the pool, returning everything that was in it.
    pub fn drain(&mut self) -> impl Iterator<Item = MeshHandle> + '_ {
        self.free.drain(..)
    }

    /// Handles waiting in the pool.
    pub fn len(&self) -> usize {
        self.free.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Most handles the pool will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(raw: u64) -> MeshHandle {
        MeshHandle::new(raw).unwrap()
    }

    #[test]
    fn full_pool_returns_handle() {
        let mut pool = HandlePool::new(2);
        assert!(pool.push(handle(1)).is_ok());
        assert!(pool.push(handle(2)).is_ok());
        assert_eq!(pool.push(handle(3)), Err(handle(3)));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn pop_is_fifo() {
        let mut pool = HandlePool::new(4);
        pool.push(handle(1)).unwrap();
        pool.push(handle(2)).unwrap();
        assert_eq!(pool.pop(), Some(handle(1)));
        assert_eq!(pool.drain().collect::<Vec<_>>(), vec![handle(2)]);
        assert!(pool.is_empty());
    }
}
