//! Deferred destruction
//!
//! Released resources may still be referenced by in-flight device work, so
//! they are parked here stamped with the current generation. The host grabs
//! a [`Token`] at a sync point and hands it back once the device has
//! finished everything submitted before it.

use std::collections::VecDeque;

/// Generation marker returned by [`DeferredQueue::token`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(u64);

impl Token {
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// Generation-stamped FIFO of pending destructions
pub struct DeferredQueue<E> {
    entries: VecDeque<(u64, E)>,
    generation: u64,
    capacity: usize,
    overflow_reported: bool,
}

impl<E> DeferredQueue<E> {
    /// `capacity` is a soft bound: exceeding it warns once, the queue keeps growing.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            generation: 0,
            capacity,
            overflow_reported: false,
        }
    }

    pub fn push(&mut self, entry: E) {
        if self.entries.len() >= self.capacity && !self.overflow_reported {
            self.overflow_reported = true;
            log::warn!(
                "Deferred destroy queue exceeded {} entries; release tokens more often",
                self.capacity
            );
        }
        self.entries.push_back((self.generation, entry));
    }

    /// Capture the current generation and start a new one.
    pub fn token(&mut self) -> Token {
        let token = Token(self.generation);
        self.generation += 1;
        token
    }

    /// Remove every entry pushed before `token` was captured.
    pub fn drain_until(&mut self, token: Token) -> Vec<E> {
        let mut drained = Vec::new();
        // Stamps are monotonic, so the eligible entries form a prefix
        while self.entries.front().is_some_and(|(stamp, _)| *stamp <= token.0) {
            if let Some((_, entry)) = self.entries.pop_front() {
                drained.push(entry);
            }
        }
        if self.entries.len() < self.capacity {
            self.overflow_reported = false;
        }
        drained
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_releases_only_earlier_entries() {
        let mut queue = DeferredQueue::new(8);
        queue.push("a");
        let t1 = queue.token();
        queue.push("b");
        let t2 = queue.token();
        queue.push("c");

        assert!(t1 < t2);
        assert_eq!(queue.drain_until(t1), vec!["a"]);
        assert_eq!(queue.drain_until(t1), Vec::<&str>::new());
        assert_eq!(queue.drain_until(t2), vec!["b"]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_out_of_order_token_release() {
        let mut queue = DeferredQueue::new(8);
        queue.push(1);
        let t1 = queue.token();
        queue.push(2);
        let t2 = queue.token();

        // Releasing the later token covers everything before it
        assert_eq!(queue.drain_until(t2), vec![1, 2]);
        assert!(queue.drain_until(t1).is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_soft_capacity_keeps_entries() {
        let mut queue = DeferredQueue::new(2);
        for i in 0..5 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 5);
        let token = queue.token();
        assert_eq!(queue.drain_until(token).len(), 5);
        assert_eq!(queue.generation(), 1);
    }
}
