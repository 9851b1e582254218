//! A collection of orderable values which the caller can efficiently
//! drain in one go.
use std::collections::BTreeSet;

/// Accumulates a set of things (for example the addresses of drives
/// which have raised attention) and then hands back all the members
/// of the set at once.
#[derive(Debug)]
pub(crate) struct ChangeIndex<K: Ord> {
    changes: BTreeSet<K>,
}

impl<K: Ord> Default for ChangeIndex<K> {
    // Cannot use derive for Default because that would require K to
    // implement Default, while in reality it doesn't need to.
    fn default() -> Self {
        Self {
            changes: BTreeSet::new(),
        }
    }
}

impl<K: Ord> ChangeIndex<K> {
    pub(crate) fn add(&mut self, k: K) {
        self.changes.insert(k);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub(crate) fn drain(&mut self) -> BTreeSet<K> {
        std::mem::take(&mut self.changes)
    }
}

#[test]
fn test_drain_empties_the_index() {
    let mut idx: ChangeIndex<u8> = ChangeIndex::default();
    assert!(idx.is_empty());
    idx.add(0x83);
    idx.add(0x81);
    idx.add(0x83);
    let drained: Vec<u8> = idx.drain().into_iter().collect();
    assert_eq!(drained, vec![0x81, 0x83]);
    assert!(idx.is_empty());
}
