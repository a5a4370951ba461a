//! Channel id allocation

use std::collections::BTreeSet;

/// Hands out channel ids `1..=max`, lowest free id first
#[derive(Debug, Clone)]
pub struct ChannelIdAllocator {
    max: u8,
    in_use: BTreeSet<u8>,
}

impl ChannelIdAllocator {
    pub fn new(max: u8) -> Self {
        Self {
            max,
            in_use: BTreeSet::new(),
        }
    }

    /// Reserve the lowest free id, `None` when all are taken
    pub fn acquire(&mut self) -> Option<u8> {
        let id = (1..=self.max).find(|id| !self.in_use.contains(id))?;
        self.in_use.insert(id);
        Some(id)
    }

    /// Return an id to the pool; returns `false` if it was not reserved
    pub fn release(&mut self, id: u8) -> bool {
        self.in_use.remove(&id)
    }

    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }

    pub fn capacity(&self) -> u8 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_exhausted() {
        let mut allocator = ChannelIdAllocator::new(3);
        assert_eq!(allocator.acquire(), Some(1));
        assert_eq!(allocator.acquire(), Some(2));
        assert_eq!(allocator.acquire(), Some(3));
        assert_eq!(allocator.acquire(), None);
        assert_eq!(allocator.in_use(), 3);
    }

    #[test]
    fn test_release_reuses_lowest() {
        let mut allocator = ChannelIdAllocator::new(4);
        for _ in 0..4 {
            allocator.acquire();
        }
        assert!(allocator.release(3));
        assert!(allocator.release(2));
        assert!(!allocator.release(2));
        assert_eq!(allocator.acquire(), Some(2));
        assert_eq!(allocator.acquire(), Some(3));
    }
}
