//! Keyed registry of named values
//!
//! Each key maps to an ordered list of `(name, value)` entries. Unnamed
//! entries use the empty name; a lookup without a name returns the first
//! entry registered under the key.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

pub struct NamedRegistry<K, V: ?Sized> {
    entries: HashMap<K, Vec<(String, Arc<V>)>>,
}

impl<K, V: ?Sized> Default for NamedRegistry<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: ?Sized> NamedRegistry<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`/`name`.
    ///
    /// Returns `true` if the slot was empty, or already holds this very value.
    /// An existing different value is kept and `false` is returned.
    pub fn set(&mut self, key: K, value: Arc<V>, name: Option<&str>) -> bool {
        let name = name.unwrap_or_default();
        let list = self.entries.entry(key).or_default();
        if let Some((_, existing)) = list.iter().find(|(n, _)| n == name) {
            return Arc::ptr_eq(existing, &value);
        }
        list.push((name.to_string(), value));
        true
    }

    /// Value under `name`, or the first one registered when `name` is `None`
    pub fn get(&self, key: &K, name: Option<&str>) -> Option<Arc<V>> {
        self.entry(key, name).map(|(_, v)| v)
    }

    /// Like `get`, but also returns the entry's registered name
    pub fn entry(&self, key: &K, name: Option<&str>) -> Option<(String, Arc<V>)> {
        let list = self.entries.get(key)?;
        let found = match name {
            None => list.first(),
            Some(name) => list.iter().find(|(n, _)| n == name),
        };
        found.map(|(n, v)| (n.clone(), Arc::clone(v)))
    }

    pub fn has(&self, key: &K, name: Option<&str>) -> bool {
        self.entry(key, name).is_some()
    }

    pub fn names(&self, key: &K) -> Vec<String> {
        self.entries
            .get(key)
            .map(|list| list.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    /// Remove one entry, or every entry of `key` when `name` is `None`
    pub fn remove(&mut self, key: &K, name: Option<&str>) -> bool {
        let Some(list) = self.entries.get_mut(key) else {
            return false;
        };

        let removed = match name {
            None => {
                list.clear();
                true
            }
            Some(name) => {
                let before = list.len();
                list.retain(|(n, _)| n != name);
                before != list.len()
            }
        };

        if list.is_empty() {
            self.entries.remove(key);
        }
        removed
    }

    /// Copy every entry of `other` that does not clash with an existing one
    pub fn merge(&mut self, other: &Self) {
        for (key, list) in &other.entries {
            for (name, value) in list {
                self.set(key.clone(), Arc::clone(value), Some(name));
            }
        }
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.keys().cloned().collect()
    }

    /// Total number of entries across all keys
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
