//! Key/value and key/multi-value maps persisted as single files.
//!
//! A map is loaded eagerly when opened, mutated in memory, and written back
//! on [`flush`](PersistentMap::flush) through the build's transaction. A
//! missing file opens as an empty map; an unreadable one is an error so the
//! engine can fall back to a rebuild rather than run against a partial index.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::envelope::{self, CACHE_MAP_FILE};
use crate::error::CacheError;
use crate::transaction::Transaction;

/// A persistent ordered map.
#[derive(Debug)]
pub struct PersistentMap<K, V> {
    path: PathBuf,
    entries: BTreeMap<K, V>,
    dirty: bool,
}

impl<K, V> PersistentMap<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Opens the map stored at `path`.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let entries: Vec<(K, V)> = envelope::read_file(CACHE_MAP_FILE, path)?.unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            entries: entries.into_iter().collect(),
            dirty: false,
        })
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        self.dirty = true;
        self.entries.insert(key, value)
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Iterates over keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, K, V> {
        self.entries.keys()
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, K, V> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if there are unflushed changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty = true;
        }
    }

    /// Writes pending changes through `tx`. An empty map deletes its file.
    /// With `memory_only` the write skips fsync.
    pub fn flush(&mut self, tx: &mut dyn Transaction, memory_only: bool) -> Result<(), CacheError> {
        if !self.dirty {
            return Ok(());
        }
        if self.entries.is_empty() {
            tx.delete_file(&self.path)?;
        } else {
            let entries: Vec<(&K, &V)> = self.entries.iter().collect();
            let bytes = envelope::to_file_bytes(CACHE_MAP_FILE, &entries)?;
            tx.write_bytes(&self.path, &bytes, !memory_only)?;
        }
        self.dirty = false;
        Ok(())
    }
}

impl<K, V> PersistentMap<K, BTreeSet<V>>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Ord + Clone + Serialize + DeserializeOwned,
{
    /// Adds `value` to the set stored under `key`.
    pub fn add(&mut self, key: K, value: V) {
        if self.entries.entry(key).or_default().insert(value) {
            self.dirty = true;
        }
    }

    /// Removes `value` from the set under `key`, dropping the key when its
    /// set becomes empty.
    pub fn remove_value(&mut self, key: &K, value: &V) {
        if let Some(values) = self.entries.get_mut(key) {
            if values.remove(value) {
                self.dirty = true;
            }
            if values.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// The values under `key`, or an empty iterator.
    pub fn values_of<'a>(&'a self, key: &K) -> impl Iterator<Item = &'a V> + 'a {
        self.entries.get(key).into_iter().flatten()
    }
}
