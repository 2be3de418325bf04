//! In-memory key-value storage backing the service.
//!
//! Every STORE/ERASE request lands here first; the persistence layer only
//! ever sees whole snapshots of this map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The complete content of the store at one point in time.
///
/// This is both the in-memory representation and the on-disk schema: a save
/// encodes the whole map, never a delta. Keys are kept ordered so equal
/// content always encodes to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub key_vals: BTreeMap<String, Vec<u8>>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.key_vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_vals.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Snapshot
where
    K: Into<String>,
    V: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            key_vals: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Key-value store owned by the service.
///
/// Owned by the reactor task; no lock guards the map.
#[derive(Debug, Default)]
pub struct Store {
    database: Snapshot,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, overwriting any existing value for `key`.
    pub fn put(&mut self, key: String, value: Vec<u8>) {
        self.database.key_vals.insert(key, value);
    }

    /// Returns the current value for `key`, or `None` if it was never
    /// stored or has been erased.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.database.key_vals.get(key).map(Vec::as_slice)
    }

    /// Removes `key`, returning whether a value existed.
    pub fn erase(&mut self, key: &str) -> bool {
        self.database.key_vals.remove(key).is_some()
    }

    /// Replaces the entire content with a loaded snapshot.
    pub fn replace_all(&mut self, snapshot: Snapshot) {
        self.database = snapshot;
    }

    /// Borrows the current content for persisting.
    pub fn snapshot(&self) -> &Snapshot {
        &self.database
    }

    pub fn len(&self) -> usize {
        self.database.len()
    }

    pub fn is_empty(&self) -> bool {
        self.database.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_returns_value() {
        let mut store = Store::new();
        store.put("alpha".into(), b"1".to_vec());
        assert_eq!(store.get("alpha"), Some(&b"1"[..]));
    }

    #[test]
    fn last_writer_wins() {
        let mut store = Store::new();
        store.put("alpha".into(), b"1".to_vec());
        store.put("alpha".into(), b"2".to_vec());
        assert_eq!(store.get("alpha"), Some(&b"2"[..]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn erase_reports_whether_key_existed() {
        let mut store = Store::new();
        store.put("alpha".into(), b"1".to_vec());

        assert!(store.erase("alpha"));
        assert!(!store.erase("alpha"));
        assert_eq!(store.get("alpha"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn get_on_empty_store_is_none() {
        let store = Store::new();
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn replace_all_discards_previous_content() {
        let mut store = Store::new();
        store.put("old".into(), b"x".to_vec());

        store.replace_all(Snapshot::from_iter([("new", "y")]));

        assert_eq!(store.get("old"), None);
        assert_eq!(store.get("new"), Some(&b"y"[..]));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn empty_values_are_distinct_from_missing_keys() {
        let mut store = Store::new();
        store.put("blank".into(), Vec::new());
        assert_eq!(store.get("blank"), Some(&b""[..]));
    }
}
