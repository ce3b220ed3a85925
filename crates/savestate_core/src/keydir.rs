//! In-memory index from key bytes to record locations.
//!
//! The keydir is rebuilt from the log at open and never persisted. It
//! preserves **first-insertion order**: overwriting a key keeps its
//! position, removing and re-inserting moves it to the end. This matches
//! the iteration contract of the store.
//!
//! Implemented as a `HashMap` for lookups paired with a slot vector for
//! ordering. Removals leave holes in the slot vector that are compacted
//! once they outnumber the live slots.

use std::collections::HashMap;

/// Location of the latest live value for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeydirEntry {
    /// Absolute byte offset of the value bytes within the file.
    pub value_offset: u64,
    /// Byte length of the value.
    pub value_size: u32,
    /// The record's stored CRC-32.
    pub checksum: u32,
}

/// Insertion-ordered map from key bytes to [`KeydirEntry`].
#[derive(Debug, Default)]
pub struct Keydir {
    /// Ordered key slots; `None` marks a removed key.
    slots: Vec<Option<Vec<u8>>>,
    /// Lookup table: key -> (slot index, entry).
    index: HashMap<Vec<u8>, (usize, KeydirEntry)>,
    /// Number of `None` slots.
    holes: usize,
}

/// Hole compaction threshold; below this the slot vector is left alone.
const SETTLE_MIN_HOLES: usize = 32;

impl Keydir {
    /// Creates an empty keydir.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key`, if the key is live.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&KeydirEntry> {
        self.index.get(key).map(|(_, entry)| entry)
    }

    /// Whether `key` is live.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no keys are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Inserts or updates the entry for `key`.
    ///
    /// A key seen for the first time is appended to the ordering; an
    /// existing key keeps its position and only the entry is replaced.
    pub fn put(&mut self, key: Vec<u8>, entry: KeydirEntry) {
        if let Some((_, existing)) = self.index.get_mut(&key) {
            *existing = entry;
            return;
        }

        let slot = self.slots.len();
        self.slots.push(Some(key.clone()));
        self.index.insert(key, (slot, entry));
    }

    /// Removes `key`, returning its entry if it was live.
    pub fn remove(&mut self, key: &[u8]) -> Option<KeydirEntry> {
        let (slot, entry) = self.index.remove(key)?;
        self.slots[slot] = None;
        self.holes += 1;
        self.settle();
        Some(entry)
    }

    /// Removes all keys.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.holes = 0;
    }

    /// Iterates over live keys in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &KeydirEntry)> {
        self.slots.iter().filter_map(move |slot| {
            let key = slot.as_deref()?;
            self.index.get(key).map(|(_, entry)| (key, entry))
        })
    }

    /// Iterates over live keys in reverse insertion order.
    pub fn iter_rev(&self) -> impl Iterator<Item = (&[u8], &KeydirEntry)> {
        self.slots.iter().rev().filter_map(move |slot| {
            let key = slot.as_deref()?;
            self.index.get(key).map(|(_, entry)| (key, entry))
        })
    }

    /// Returns the most recently inserted live key and its entry.
    #[must_use]
    pub fn last(&self) -> Option<(&[u8], &KeydirEntry)> {
        self.iter_rev().next()
    }

    /// Drops accumulated holes once they dominate the slot vector.
    fn settle(&mut self) {
        if self.holes < SETTLE_MIN_HOLES || self.holes <= self.slots.len() / 2 {
            return;
        }

        let old_slots = std::mem::take(&mut self.slots);
        self.slots.reserve(self.index.len());
        for slot in old_slots {
            if let Some(key) = slot {
                if let Some((idx, _)) = self.index.get_mut(&key) {
                    *idx = self.slots.len();
                }
                self.slots.push(Some(key));
            }
        }
        self.holes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(offset: u64) -> KeydirEntry {
        KeydirEntry {
            value_offset: offset,
            value_size: 1,
            checksum: 0,
        }
    }

    fn keys(keydir: &Keydir) -> Vec<&[u8]> {
        keydir.iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn put_get_remove() {
        let mut keydir = Keydir::new();
        keydir.put(b"a".to_vec(), entry(10));

        assert!(keydir.contains(b"a"));
        assert_eq!(keydir.get(b"a"), Some(&entry(10)));
        assert_eq!(keydir.len(), 1);

        assert_eq!(keydir.remove(b"a"), Some(entry(10)));
        assert!(!keydir.contains(b"a"));
        assert!(keydir.is_empty());
        assert_eq!(keydir.remove(b"a"), None);
    }

    #[test]
    fn iteration_is_insertion_order() {
        let mut keydir = Keydir::new();
        keydir.put(b"c".to_vec(), entry(1));
        keydir.put(b"a".to_vec(), entry(2));
        keydir.put(b"b".to_vec(), entry(3));

        assert_eq!(keys(&keydir), vec![&b"c"[..], b"a", b"b"]);
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut keydir = Keydir::new();
        keydir.put(b"a".to_vec(), entry(1));
        keydir.put(b"b".to_vec(), entry(2));
        keydir.put(b"a".to_vec(), entry(3));

        assert_eq!(keys(&keydir), vec![&b"a"[..], b"b"]);
        assert_eq!(keydir.get(b"a"), Some(&entry(3)));
    }

    #[test]
    fn reinsert_after_remove_moves_to_end() {
        let mut keydir = Keydir::new();
        keydir.put(b"a".to_vec(), entry(1));
        keydir.put(b"b".to_vec(), entry(2));
        keydir.remove(b"a");
        keydir.put(b"a".to_vec(), entry(3));

        assert_eq!(keys(&keydir), vec![&b"b"[..], b"a"]);
    }

    #[test]
    fn reverse_iteration() {
        let mut keydir = Keydir::new();
        keydir.put(b"a".to_vec(), entry(1));
        keydir.put(b"b".to_vec(), entry(2));
        keydir.put(b"c".to_vec(), entry(3));

        let reversed: Vec<_> = keydir.iter_rev().map(|(k, _)| k).collect();
        assert_eq!(reversed, vec![&b"c"[..], b"b", b"a"]);
        assert_eq!(keydir.last().unwrap().0, b"c");
    }

    #[test]
    fn last_skips_removed() {
        let mut keydir = Keydir::new();
        keydir.put(b"a".to_vec(), entry(1));
        keydir.put(b"b".to_vec(), entry(2));
        keydir.remove(b"b");

        assert_eq!(keydir.last().unwrap().0, b"a");

        keydir.remove(b"a");
        assert!(keydir.last().is_none());
    }

    #[test]
    fn settle_preserves_order() {
        let mut keydir = Keydir::new();
        for i in 0u32..100 {
            keydir.put(i.to_be_bytes().to_vec(), entry(u64::from(i)));
        }
        // Remove enough to trigger hole compaction.
        for i in 0u32..70 {
            keydir.remove(&i.to_be_bytes());
        }

        assert_eq!(keydir.len(), 30);
        let expected: Vec<Vec<u8>> = (70u32..100).map(|i| i.to_be_bytes().to_vec()).collect();
        let actual: Vec<Vec<u8>> = keydir.iter().map(|(k, _)| k.to_vec()).collect();
        assert_eq!(actual, expected);

        // Lookups still resolve after slots moved.
        assert_eq!(keydir.get(&99u32.to_be_bytes()), Some(&entry(99)));
    }

    #[test]
    fn clear_empties() {
        let mut keydir = Keydir::new();
        keydir.put(b"a".to_vec(), entry(1));
        keydir.clear();

        assert!(keydir.is_empty());
        assert_eq!(keydir.iter().count(), 0);
    }
}
