//! A priority queue which pops the item with the *smallest* priority
//! first, and whose items are identified by a key so that they can
//! be replaced (or withdrawn) after insertion.
//!
//! The disk simulator keys items by unit number and uses the time at
//! which the unit next needs attention as the priority.
use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;

use keyed_priority_queue::KeyedPriorityQueue;

#[derive(Debug)]
struct ReverseOrdered<T> {
    inner: T,
}

impl<T> From<T> for ReverseOrdered<T> {
    fn from(inner: T) -> ReverseOrdered<T> {
        ReverseOrdered { inner }
    }
}

impl<T: Ord> PartialOrd for ReverseOrdered<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Eq> Eq for ReverseOrdered<T> {}

impl<T: Eq> PartialEq for ReverseOrdered<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T: Ord> Ord for ReverseOrdered<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.inner.cmp(&self.inner)
    }
}

pub struct KeyedReversePriorityQueue<K: Hash + Eq + Ord, P: Ord> {
    items: KeyedPriorityQueue<K, ReverseOrdered<P>>,
}

impl<K, P> KeyedReversePriorityQueue<K, P>
where
    K: Hash + Eq + Ord,
    P: Ord,
{
    #[must_use]
    pub fn new() -> KeyedReversePriorityQueue<K, P> {
        KeyedReversePriorityQueue {
            items: KeyedPriorityQueue::<K, ReverseOrdered<P>>::new(),
        }
    }

    /// The item with the smallest priority, if any.
    #[must_use]
    pub fn peek(&self) -> Option<(&K, &P)> {
        self.items.peek().map(|(k, p)| (k, &p.inner))
    }

    pub fn pop(&mut self) -> Option<(K, P)> {
        self.items.pop().map(|(k, p)| (k, p.inner))
    }

    /// Insert an item.  If `key` was already present, its priority
    /// is replaced and the old one returned.
    pub fn push(&mut self, key: K, priority: P) -> Option<P> {
        self.items
            .push(key, ReverseOrdered::from(priority))
            .map(|rd| rd.inner)
    }

    /// Withdraw the item identified by `key`, returning its priority.
    pub fn remove(&mut self, key: &K) -> Option<P> {
        self.items.remove(key).map(|p| p.inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K, P> Default for KeyedReversePriorityQueue<K, P>
where
    K: Hash + Eq + Ord,
    P: Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> Debug for KeyedReversePriorityQueue<K, P>
where
    K: Hash + Eq + Ord + Debug,
    P: Ord + Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedReversePriorityQueue")
            .field("items", &self.items)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn us(n: u64) -> Duration {
        Duration::from_micros(n)
    }

    #[test]
    fn test_reverse_order() {
        assert_eq!(ReverseOrdered::from(1), ReverseOrdered::from(1));
        assert_ne!(ReverseOrdered::from(1), ReverseOrdered::from(0));
        assert!(ReverseOrdered::from(1) < ReverseOrdered::from(0));
        assert!(ReverseOrdered::from(1) <= ReverseOrdered::from(0));
    }

    #[test]
    fn test_empty() {
        let mut q: KeyedReversePriorityQueue<u8, Duration> = KeyedReversePriorityQueue::default();
        assert!(q.is_empty());
        assert_eq!(0, q.len());
        assert_eq!(q.peek(), None);
        assert_eq!(q.pop(), None);
        assert_eq!(q.remove(&3), None);
    }

    #[test]
    fn test_earliest_pops_first() {
        let mut q: KeyedReversePriorityQueue<u8, Duration> = KeyedReversePriorityQueue::new();
        assert_eq!(q.push(7, us(900)), None);
        assert_eq!(q.push(2, us(100)), None);
        assert_eq!(q.push(5, us(400)), None);
        assert_eq!(q.peek(), Some((&2, &us(100))));
        assert_eq!(q.pop(), Some((2, us(100))));
        assert_eq!(q.pop(), Some((5, us(400))));
        assert_eq!(q.pop(), Some((7, us(900))));
        assert!(q.is_empty());
    }

    #[test]
    fn test_repeat_push_replaces() {
        let mut q: KeyedReversePriorityQueue<u8, Duration> = KeyedReversePriorityQueue::new();
        assert_eq!(q.push(0, us(200)), None);
        assert_eq!(q.push(0, us(400)), Some(us(200)));
        assert_eq!(q.len(), 1);
        assert_eq!(q.push(0, us(300)), Some(us(400)));
        assert_eq!(q.pop(), Some((0, us(300))));
        assert!(q.is_empty());
    }

    #[test]
    fn test_remove_withdraws_item() {
        let mut q: KeyedReversePriorityQueue<u8, Duration> = KeyedReversePriorityQueue::new();
        q.push(1, us(10));
        q.push(4, us(20));
        assert_eq!(q.remove(&1), Some(us(10)));
        assert_eq!(q.remove(&1), None);
        assert_eq!(q.peek(), Some((&4, &us(20))));
    }
}
