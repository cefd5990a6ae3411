//! Recently sent cursor shapes.
//!
//! Server and client each keep one ring per connection. Both insert at
//! the front and drop the oldest entry, so as long as the server only
//! inserts when it ships pixels the two rings stay identical.

use std::collections::VecDeque;

/// Entries per cursor ring.
pub const CURSOR_CACHE: usize = 256;

/// Fixed-capacity list of `(hash, value)`, newest first.
///
/// Lookups are a linear scan; hits do not reorder.
#[derive(Debug, Clone)]
pub struct RecentRing<V> {
    entries: VecDeque<(u32, V)>,
    capacity: usize,
}

impl<V> Default for RecentRing<V> {
    fn default() -> Self {
        Self::new(CURSOR_CACHE)
    }
}

impl<V> RecentRing<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of `hash`, 0 being the newest.
    pub fn position(&self, hash: u32) -> Option<usize> {
        self.entries.iter().position(|(h, _)| *h == hash)
    }

    pub fn contains(&self, hash: u32) -> bool {
        self.position(hash).is_some()
    }

    pub fn get(&self, hash: u32) -> Option<&V> {
        self.entries.iter().find(|(h, _)| *h == hash).map(|(_, v)| v)
    }

    /// The newest entry.
    pub fn front_mut(&mut self) -> Option<&mut V> {
        self.entries.front_mut().map(|(_, v)| v)
    }

    /// Insert as newest, evicting the oldest when full.
    pub fn push_front(&mut self, hash: u32, value: V) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front((hash, value));
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_entry_is_evicted() {
        let mut ring = RecentRing::new(3);
        for h in 1..=4 {
            ring.push_front(h, h * 10);
        }
        assert_eq!(ring.len(), 3);
        assert!(!ring.contains(1));
        assert_eq!(ring.position(4), Some(0));
        assert_eq!(ring.get(2), Some(&20));
    }

    #[test]
    fn hits_do_not_reorder() {
        let mut ring = RecentRing::new(2);
        ring.push_front(1, ());
        ring.push_front(2, ());
        assert!(ring.contains(1));
        ring.push_front(3, ());
        // 1 was the oldest despite the lookup
        assert!(!ring.contains(1));
        assert!(ring.contains(2));
    }

    #[test]
    fn default_capacity() {
        let mut ring: RecentRing<()> = RecentRing::default();
        for h in 0..300 {
            ring.push_front(h, ());
        }
        assert_eq!(ring.len(), CURSOR_CACHE);
        assert_eq!(ring.position(299), Some(0));
    }
}
