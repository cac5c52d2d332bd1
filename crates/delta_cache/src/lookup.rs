//! Lookup index: which files referenced which symbols.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use delta_common::LookupSymbol;

use crate::error::CacheError;
use crate::manager::CacheLifecycle;
use crate::persistent::PersistentMap;
use crate::transaction::Transaction;

const LOOKUPS_FILE: &str = "lookups.bin";
const FILE_LOOKUPS_FILE: &str = "file-lookups.bin";

/// Symbol → referencing files, with the reverse mapping kept alongside so a
/// recompiled file's old references can be dropped.
#[derive(Debug)]
pub struct LookupCache {
    lookups: PersistentMap<LookupSymbol, BTreeSet<PathBuf>>,
    file_lookups: PersistentMap<PathBuf, BTreeSet<LookupSymbol>>,
}

impl LookupCache {
    /// Opens the cache files in `dir`.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        Ok(Self {
            lookups: PersistentMap::open(&dir.join(LOOKUPS_FILE))?,
            file_lookups: PersistentMap::open(&dir.join(FILE_LOOKUPS_FILE))?,
        })
    }

    /// Files that referenced `symbol`.
    pub fn files_for(&self, symbol: &LookupSymbol) -> impl Iterator<Item = &PathBuf> + '_ {
        self.lookups.values_of(symbol)
    }

    /// Every recorded symbol.
    pub fn symbols(&self) -> impl Iterator<Item = &LookupSymbol> + '_ {
        self.lookups.keys()
    }

    /// Replaces the recorded references of every compiled or removed file
    /// with the references reported by the compiler this round.
    pub fn update(
        &mut self,
        lookups: &[(LookupSymbol, PathBuf)],
        compiled: &BTreeSet<PathBuf>,
        removed: &BTreeSet<PathBuf>,
    ) -> Result<(), CacheError> {
        for file in compiled.iter().chain(removed) {
            if let Some(symbols) = self.file_lookups.remove(file) {
                for symbol in symbols {
                    self.lookups.remove_value(&symbol, file);
                }
            }
        }
        for (symbol, file) in lookups {
            if removed.contains(file) {
                return Err(CacheError::Corrupted {
                    reason: format!("lookup {symbol} recorded from removed file {}", file.display()),
                });
            }
            self.lookups.add(symbol.clone(), file.clone());
            self.file_lookups.add(file.clone(), symbol.clone());
        }
        Ok(())
    }
}

impl CacheLifecycle for LookupCache {
    fn name(&self) -> &str {
        "lookups"
    }

    fn flush(&mut self, tx: &mut dyn Transaction, memory_only: bool) -> Result<(), CacheError> {
        self.lookups.flush(tx, memory_only)?;
        self.file_lookups.flush(tx, memory_only)
    }

    fn clean(&mut self) {
        self.lookups.clear();
        self.file_lookups.clear();
    }
}
