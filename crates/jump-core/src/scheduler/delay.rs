//! Keyed delay queue: at most one pending deadline per key.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Deadlines ordered by due time, then by insertion order.
///
/// Inserting under a key that is already pending replaces the old entry.
#[derive(Debug)]
pub struct DelayQueue<K> {
    order: BTreeMap<(u64, u64), K>,
    due: HashMap<K, (u64, u64)>,
    seq: u64,
}

impl<K> Default for DelayQueue<K> {
    fn default() -> Self {
        Self {
            order: BTreeMap::new(),
            due: HashMap::new(),
            seq: 0,
        }
    }
}

impl<K: Clone + Eq + Hash> DelayQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: K, due_at: u64) {
        self.remove(&key);
        let slot = (due_at, self.seq);
        self.seq += 1;
        self.order.insert(slot, key.clone());
        self.due.insert(key, slot);
    }

    /// Returns whether the key was pending.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.due.remove(key) {
            Some(slot) => {
                self.order.remove(&slot);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.due.contains_key(key)
    }

    pub fn due_at(&self, key: &K) -> Option<u64> {
        self.due.get(key).map(|(at, _)| *at)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.order.keys().next().map(|(at, _)| *at)
    }

    /// Remove and return the earliest entry due at or before `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<K> {
        let (&slot, _) = self.order.iter().next().filter(|((at, _), _)| *at <= now)?;
        let key = self.order.remove(&slot)?;
        self.due.remove(&key);
        Some(key)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        let dropped: Vec<K> = self.due.keys().filter(|k| !keep(k)).cloned().collect();
        for key in dropped {
            self.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.due.len()
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_due_order() {
        let mut q = DelayQueue::new();
        q.insert("b", 20);
        q.insert("a", 10);
        q.insert("c", 20);
        assert_eq!(q.next_deadline(), Some(10));
        assert_eq!(q.pop_due(5), None);
        assert_eq!(q.pop_due(25), Some("a"));
        assert_eq!(q.pop_due(25), Some("b"));
        assert_eq!(q.pop_due(25), Some("c"));
        assert!(q.is_empty());
    }

    #[test]
    fn insert_replaces_pending_entry() {
        let mut q = DelayQueue::new();
        q.insert("rule", 100);
        q.insert("rule", 50);
        assert_eq!(q.len(), 1);
        assert_eq!(q.due_at(&"rule"), Some(50));
        assert_eq!(q.pop_due(60), Some("rule"));
        assert_eq!(q.pop_due(200), None);
    }

    #[test]
    fn remove_and_retain() {
        let mut q = DelayQueue::new();
        q.insert(1, 10);
        q.insert(2, 20);
        q.insert(3, 30);
        assert!(q.remove(&1));
        assert!(!q.remove(&1));
        q.retain(|k| *k != 3);
        assert!(q.contains(&2));
        assert!(!q.contains(&3));
        assert_eq!(q.next_deadline(), Some(20));
    }
}
