//! Source file fingerprints and change detection.
//!
//! Stores the content hash of every source seen by the last build and
//! compares it against the current file set to decide which files were
//! modified or removed when the build system does not say.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use delta_common::{ChangedFiles, ContentHash};

use crate::error::CacheError;
use crate::persistent::PersistentMap;
use crate::transaction::Transaction;

/// Persistent map from source path to content hash.
#[derive(Debug)]
pub struct SourceFingerprintMap {
    hashes: PersistentMap<PathBuf, ContentHash>,
}

impl SourceFingerprintMap {
    /// Opens the map stored at `path`.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        Ok(Self {
            hashes: PersistentMap::open(path)?,
        })
    }

    /// Computes the content hash of a single file.
    pub fn hash_file(path: &Path) -> Result<ContentHash, CacheError> {
        let content = std::fs::read(path).map_err(|e| CacheError::io(path, e))?;
        Ok(ContentHash::from_bytes(&content))
    }

    /// Compares `all_sources` against the stored fingerprints, records the
    /// new fingerprints, and returns what changed.
    ///
    /// New and re-hashed files are modified; tracked files that are no
    /// longer listed, or can no longer be read, are removed.
    pub fn compare_and_update(&mut self, all_sources: &[PathBuf]) -> ChangedFiles {
        let mut modified = BTreeSet::new();
        let mut current = BTreeSet::new();

        for path in all_sources {
            let Ok(hash) = Self::hash_file(path) else {
                continue;
            };
            current.insert(path.clone());
            if self.hashes.get(path) != Some(&hash) {
                modified.insert(path.clone());
                self.hashes.put(path.clone(), hash);
            }
        }

        let removed: BTreeSet<PathBuf> = self
            .hashes
            .keys()
            .filter(|p| !current.contains(*p))
            .cloned()
            .collect();
        for path in &removed {
            self.hashes.remove(path);
        }

        ChangedFiles::Known {
            modified,
            removed,
            for_dependencies: false,
        }
    }

    /// Forgets the given files.
    pub fn remove(&mut self, paths: &BTreeSet<PathBuf>) {
        for path in paths {
            self.hashes.remove(path);
        }
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Returns `true` if no file is tracked.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Writes pending changes through `tx`.
    pub fn flush(&mut self, tx: &mut dyn Transaction, memory_only: bool) -> Result<(), CacheError> {
        self.hashes.flush(tx, memory_only)
    }

    /// Forgets every file.
    pub fn clean(&mut self) {
        self.hashes.clear();
    }
}
