//! Insertion-ordered hash table with a chained-scatter bucket layout and
//! Brent's variation, modeled on Lua's table internals.
//!
//! Entries live in a packed array in insertion order; a parallel bucket
//! array stores `{occupied, index, next_bucket}` chains. On collision,
//! a mid-chain occupant is relocated to the `last_free` high-water slot
//! and its predecessor rewired, so every chain starts at its own primary
//! bucket. Deletion is O(1): the removed entry is swapped with the last
//! entry and the two affected buckets are patched.
//!
//! Cloning a table shares both arrays; any write clones the shared state
//! first (`Arc::make_mut`), so clones behave as copy-on-write values.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::hashing::sip::Sip24Hasher;

const END_OF_CHAIN: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, Default)]
struct Bucket {
    occupied: bool,
    index: u32,
    next_bucket: u32,
}

#[derive(Clone, Debug)]
struct BucketInfo {
    buckets: Vec<Bucket>,
    last_free: u32,
}

#[derive(Debug)]
pub struct Table<K, V> {
    entries: Arc<Vec<(K, V)>>,
    bucket_info: Option<Arc<BucketInfo>>,
}

impl<K, V> Clone for Table<K, V> {
    fn clone(&self) -> Table<K, V> {
        Table {
            entries: Arc::clone(&self.entries),
            bucket_info: self.bucket_info.clone(),
        }
    }
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Table<K, V> {
        Table {
            entries: Arc::new(Vec::new()),
            bucket_info: None,
        }
    }
}

fn key_hash<K: Hash>(key: &K) -> u64 {
    let mut hasher = Sip24Hasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

impl<K: Hash + Eq + Clone, V: Clone> Table<K, V> {
    pub fn new() -> Table<K, V> {
        Table::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bucket_count(&self) -> usize {
        self.bucket_info.as_ref().map_or(0, |info| info.buckets.len())
    }

    fn primary_bucket(&self, key: &K) -> usize {
        (key_hash(key) % self.bucket_count() as u64) as usize
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let info = self.bucket_info.as_ref()?;
        let mut i = self.primary_bucket(key);
        while info.buckets[i].occupied {
            let (entry_key, entry_value) = &self.entries[info.buckets[i].index as usize];
            if entry_key == key {
                return Some(entry_value);
            }
            if info.buckets[i].next_bucket == END_OF_CHAIN {
                break;
            }
            i = info.buckets[i].next_bucket as usize;
        }
        None
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Insert or update. Returns the previous value when the key was
    /// already present.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        if self.bucket_count() == 0 {
            self.resize_buckets(4);
        } else if let Some(index) = self.entry_index(&key) {
            let entries = Arc::make_mut(&mut self.entries);
            return Some(std::mem::replace(&mut entries[index].1, value));
        }

        if self.entries.len() >= self.bucket_count() {
            let count = self.bucket_count();
            self.resize_buckets(count + count.min(64));
        }

        let entries = Arc::make_mut(&mut self.entries);
        entries.push((key, value));
        let index = entries.len() - 1;
        self.set_bucket(index);
        None
    }

    fn entry_index(&self, key: &K) -> Option<usize> {
        let info = self.bucket_info.as_ref()?;
        let mut i = self.primary_bucket(key);
        while info.buckets[i].occupied {
            let index = info.buckets[i].index as usize;
            if &self.entries[index].0 == key {
                return Some(index);
            }
            if info.buckets[i].next_bucket == END_OF_CHAIN {
                break;
            }
            i = info.buckets[i].next_bucket as usize;
        }
        None
    }

    /// Hook `entries[index]` into the bucket array (Brent's variation).
    fn set_bucket(&mut self, index: usize) {
        let hash = self.primary_bucket(&self.entries[index].0);
        let collided_hash = {
            let info = self.bucket_info.as_ref().expect("buckets must be allocated");
            let bucket = info.buckets[hash];
            if !bucket.occupied {
                let info = Arc::make_mut(self.bucket_info.as_mut().expect("buckets must be allocated"));
                info.buckets[hash] = Bucket {
                    occupied: true,
                    index: index as u32,
                    next_bucket: END_OF_CHAIN,
                };
                return;
            }
            self.primary_bucket(&self.entries[bucket.index as usize].0)
        };

        let info = Arc::make_mut(self.bucket_info.as_mut().expect("buckets must be allocated"));
        while info.buckets[info.last_free as usize].occupied {
            assert!(info.last_free > 0, "no free bucket below the high-water mark");
            info.last_free -= 1;
        }
        let free = info.last_free as usize;

        let target = if collided_hash != hash {
            // Collided with a mid-chain entry: relocate it to the free
            // slot and rewire its predecessor.
            let mut predecessor = collided_hash;
            while info.buckets[predecessor].next_bucket != hash as u32 {
                predecessor = info.buckets[predecessor].next_bucket as usize;
            }
            info.buckets[predecessor].next_bucket = free as u32;
            info.buckets[free] = info.buckets[hash];
            hash
        } else {
            // Collided with the head of its own chain: append at the end.
            let mut end_of_chain = hash;
            while info.buckets[end_of_chain].next_bucket != END_OF_CHAIN {
                end_of_chain = info.buckets[end_of_chain].next_bucket as usize;
            }
            info.buckets[end_of_chain].next_bucket = free as u32;
            free
        };

        info.buckets[target] = Bucket {
            occupied: true,
            index: index as u32,
            next_bucket: END_OF_CHAIN,
        };
    }

    fn resize_buckets(&mut self, new_count: usize) {
        self.bucket_info = Some(Arc::new(BucketInfo {
            buckets: vec![Bucket::default(); new_count],
            last_free: (new_count - 1) as u32,
        }));
        for index in 0..self.entries.len() {
            self.set_bucket(index);
        }
    }

    /// Remove a key. Swaps the removed entry with the last entry in the
    /// packed array, patches the bucket that pointed at the last entry,
    /// and splices the removed bucket out of its chain.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.bucket_info.as_ref()?;
        if self.entries.is_empty() {
            return None;
        }

        // Find the bucket holding the key (and its chain predecessor):
        let (bucket_pos, prev) = {
            let info = self.bucket_info.as_ref().expect("checked above");
            let mut i = self.primary_bucket(key);
            let mut prev = None;
            loop {
                if !info.buckets[i].occupied {
                    return None;
                }
                if &self.entries[info.buckets[i].index as usize].0 == key {
                    break (i, prev);
                }
                if info.buckets[i].next_bucket == END_OF_CHAIN {
                    return None;
                }
                prev = Some(i);
                i = info.buckets[i].next_bucket as usize;
            }
        };

        let removed_index = self.bucket_info.as_ref().expect("checked above").buckets[bucket_pos].index as usize;
        let last_entry = self.entries.len() - 1;

        if removed_index != last_entry {
            // Patch the bucket that points at the last entry, which is
            // about to move into the removed entry's slot:
            let mut i = self.primary_bucket(&self.entries[last_entry].0);
            let info = Arc::make_mut(self.bucket_info.as_mut().expect("checked above"));
            while info.buckets[i].index as usize != last_entry {
                i = info.buckets[i].next_bucket as usize;
            }
            info.buckets[i].index = removed_index as u32;
        }

        let entries = Arc::make_mut(&mut self.entries);
        let (_, value) = entries.swap_remove(removed_index);

        let info = Arc::make_mut(self.bucket_info.as_mut().expect("checked above"));
        let bucket_to_clear = if let Some(prev) = prev {
            // Middle (or end) of a chain:
            info.buckets[prev].next_bucket = info.buckets[bucket_pos].next_bucket;
            bucket_pos
        } else if info.buckets[bucket_pos].next_bucket != END_OF_CHAIN {
            // Start of a chain: pull the second link into the head slot.
            let second = info.buckets[bucket_pos].next_bucket as usize;
            info.buckets[bucket_pos] = info.buckets[second];
            second
        } else {
            bucket_pos
        };

        info.buckets[bucket_to_clear] = Bucket::default();
        if bucket_to_clear as u32 > info.last_free {
            info.last_free = bucket_to_clear as u32;
        }
        Some(value)
    }

    /// Entries in insertion order (disturbed by removals, which swap the
    /// last entry into the removed slot).
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// The nth entry (1-based), in entry-array order.
    pub fn entry(&self, n: usize) -> Option<(&K, &V)> {
        if n < 1 {
            return None;
        }
        self.entries.get(n - 1).map(|(k, v)| (k, v))
    }
}

impl<K: Hash + Eq + Clone, V: Clone + PartialEq> PartialEq for Table<K, V> {
    fn eq(&self, other: &Table<K, V>) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let mut t: Table<String, i64> = Table::new();
        for i in 0..200 {
            t.set(format!("key{i}"), i);
        }
        assert_eq!(t.len(), 200);
        for i in 0..200 {
            assert_eq!(t.get(&format!("key{i}")), Some(&i), "key{i}");
        }
        assert_eq!(t.get(&"missing".to_string()), None);
    }

    #[test]
    fn set_overwrites() {
        let mut t: Table<&'static str, i64> = Table::new();
        assert_eq!(t.set("x", 1), None);
        assert_eq!(t.set("x", 2), Some(1));
        assert_eq!(t.get(&"x"), Some(&2));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn remove_decrements_length_by_one() {
        let mut t: Table<i64, i64> = Table::new();
        for i in 0..100 {
            t.set(i, i * 10);
        }
        assert_eq!(t.remove(&50), Some(500));
        assert_eq!(t.len(), 99);
        assert_eq!(t.get(&50), None);
        assert_eq!(t.remove(&50), None);
        assert_eq!(t.len(), 99);
        for i in (0..100).filter(|i| *i != 50) {
            assert_eq!(t.get(&i), Some(&(i * 10)), "{i}");
        }
    }

    #[test]
    fn remove_all_in_random_order() {
        let mut t: Table<i64, i64> = Table::new();
        for i in 0..64 {
            t.set(i, i);
        }
        // A fixed shuffle-ish order that hits heads, middles, and tails
        // of chains:
        for i in (0..64).rev().step_by(3).chain(0..64) {
            t.remove(&i);
        }
        assert!(t.is_empty());
    }

    #[test]
    fn iteration_yields_every_pair_once() {
        let mut t: Table<i64, i64> = Table::new();
        for i in 0..50 {
            t.set(i, -i);
        }
        let mut seen: Vec<i64> = t.iter().map(|(k, _)| *k).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut t: Table<&'static str, i64> = Table::new();
        t.set("one", 1);
        t.set("two", 2);
        t.set("three", 3);
        let keys: Vec<&str> = t.keys().copied().collect();
        assert_eq!(keys, ["one", "two", "three"]);
        assert_eq!(t.entry(1), Some((&"one", &1)));
    }

    #[test]
    fn clones_are_copy_on_write() {
        let mut a: Table<i64, i64> = Table::new();
        for i in 0..10 {
            a.set(i, i);
        }
        let b = a.clone();
        a.set(99, 99);
        a.remove(&0);
        assert_eq!(b.len(), 10);
        assert_eq!(b.get(&0), Some(&0));
        assert_eq!(b.get(&99), None);
        assert_eq!(a.len(), 10);
        assert_eq!(a.get(&99), Some(&99));
    }

    #[test]
    fn equal_iff_same_contents() {
        let mut a: Table<i64, i64> = Table::new();
        let mut b: Table<i64, i64> = Table::new();
        for i in 0..20 {
            a.set(i, i);
        }
        for i in (0..20).rev() {
            b.set(i, i);
        }
        assert_eq!(a, b);
        b.set(5, 99);
        assert_ne!(a, b);
    }
}
