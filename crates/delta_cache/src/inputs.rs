//! Inputs cache: source fingerprints and source→output associations.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use delta_common::GeneratedFile;
use tracing::debug;

use crate::error::CacheError;
use crate::fingerprint::SourceFingerprintMap;
use crate::manager::CacheLifecycle;
use crate::persistent::PersistentMap;
use crate::transaction::Transaction;

const FINGERPRINTS_FILE: &str = "source-fingerprints.bin";
const SOURCE_TO_OUTPUT_FILE: &str = "source-to-output.bin";

/// Tracks what the last build saw and what it produced for each source.
#[derive(Debug)]
pub struct InputsCache {
    /// Content hashes of known sources.
    pub fingerprints: SourceFingerprintMap,
    source_to_outputs: PersistentMap<PathBuf, BTreeSet<PathBuf>>,
}

impl InputsCache {
    /// Opens the cache files in `dir`.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        Ok(Self {
            fingerprints: SourceFingerprintMap::open(&dir.join(FINGERPRINTS_FILE))?,
            source_to_outputs: PersistentMap::open(&dir.join(SOURCE_TO_OUTPUT_FILE))?,
        })
    }

    /// Outputs last produced from `source`.
    pub fn outputs_of(&self, source: &Path) -> BTreeSet<PathBuf> {
        self.source_to_outputs
            .values_of(&source.to_path_buf())
            .cloned()
            .collect()
    }

    /// Deletes, through `tx`, every output previously produced from the
    /// given sources, and forgets the associations.
    pub fn remove_outputs_for_sources(
        &mut self,
        tx: &mut dyn Transaction,
        sources: &BTreeSet<PathBuf>,
    ) -> Result<(), CacheError> {
        for source in sources {
            if let Some(outputs) = self.source_to_outputs.remove(source) {
                debug!(source = %source.display(), outputs = outputs.len(), "removing stale outputs");
                for output in outputs {
                    tx.delete_file(&output)?;
                }
            }
        }
        Ok(())
    }

    /// Records which sources produced each generated file.
    pub fn register_outputs(&mut self, generated: &[GeneratedFile]) {
        for file in generated {
            for source in &file.sources {
                self.source_to_outputs.add(source.clone(), file.output.clone());
            }
        }
    }
}

impl CacheLifecycle for InputsCache {
    fn name(&self) -> &str {
        "inputs"
    }

    fn flush(&mut self, tx: &mut dyn Transaction, memory_only: bool) -> Result<(), CacheError> {
        self.fingerprints.flush(tx, memory_only)?;
        self.source_to_outputs.flush(tx, memory_only)
    }

    fn clean(&mut self) {
        self.fingerprints.clean();
        self.source_to_outputs.clear();
    }
}
