//! Bounded, append-only log of each build's invalidation contribution.
//!
//! Downstream modules replay the dirty data of every build newer than their
//! own last build instead of diffing full snapshots. A non-incremental build
//! carries no dirty data and breaks the chain.

use std::path::Path;

use delta_common::{DeclarationId, DirtyData, LookupSymbol};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::envelope::{self, BUILD_HISTORY_FILE};
use crate::error::CacheError;
use crate::transaction::Transaction;

/// One build's contribution to the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDifference {
    /// Start timestamp of the build (ms since the Unix epoch).
    pub ts: i64,
    /// `false` for full rebuilds, whose dirty data is meaningless.
    pub is_incremental: bool,
    /// What the build invalidated.
    pub dirty_data: DirtyData,
}

impl BuildDifference {
    /// An incremental build's difference.
    pub fn incremental(ts: i64, dirty_data: DirtyData) -> Self {
        Self {
            ts,
            is_incremental: true,
            dirty_data,
        }
    }

    /// A full rebuild's difference.
    pub fn rebuild(ts: i64) -> Self {
        Self {
            ts,
            is_incremental: false,
            dirty_data: DirtyData::default(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DifferenceRecord {
    ts: i64,
    is_incremental: bool,
    lookup_symbols: Vec<(String, String)>,
    fq_names: Vec<String>,
}

impl From<&BuildDifference> for DifferenceRecord {
    fn from(diff: &BuildDifference) -> Self {
        Self {
            ts: diff.ts,
            is_incremental: diff.is_incremental,
            lookup_symbols: diff
                .dirty_data
                .dirty_lookup_symbols
                .iter()
                .map(|s| (s.name.clone(), s.scope.clone()))
                .collect(),
            fq_names: diff
                .dirty_data
                .dirty_classes_fq_names
                .iter()
                .map(|id| id.as_str().to_string())
                .collect(),
        }
    }
}

impl From<DifferenceRecord> for BuildDifference {
    fn from(record: DifferenceRecord) -> Self {
        Self {
            ts: record.ts,
            is_incremental: record.is_incremental,
            dirty_data: DirtyData::new(
                record
                    .lookup_symbols
                    .into_iter()
                    .map(|(name, scope)| LookupSymbol::new(name, scope))
                    .collect(),
                record.fq_names.into_iter().map(DeclarationId::new).collect(),
            ),
        }
    }
}

/// Ordered list of recent build differences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildHistory {
    builds: Vec<BuildDifference>,
}

impl BuildHistory {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded builds, oldest first.
    pub fn builds(&self) -> &[BuildDifference] {
        &self.builds
    }

    /// Appends a build.
    pub fn append(&mut self, difference: BuildDifference) {
        self.builds.push(difference);
    }

    /// Reads a history file. Returns `None` ("unusable") when the file is
    /// missing, version-mismatched, or corrupt, so the caller can fall back
    /// to a rebuild instead of trusting part of it.
    pub fn read(path: &Path) -> Option<BuildHistory> {
        match envelope::read_file::<Vec<DifferenceRecord>>(BUILD_HISTORY_FILE, path) {
            Ok(Some(records)) => Some(BuildHistory {
                builds: records.into_iter().map(BuildDifference::from).collect(),
            }),
            Ok(None) => None,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "build history is unusable");
                None
            }
        }
    }

    /// Writes the `retention` most recent builds (by timestamp) through `tx`.
    pub fn write(
        &self,
        tx: &mut dyn Transaction,
        path: &Path,
        retention: usize,
    ) -> Result<(), CacheError> {
        let mut builds: Vec<&BuildDifference> = self.builds.iter().collect();
        builds.sort_by_key(|b| b.ts);
        let skip = builds.len().saturating_sub(retention);
        let records: Vec<DifferenceRecord> = builds[skip..]
            .iter()
            .map(|b| DifferenceRecord::from(*b))
            .collect();
        tx.write_bytes(path, &envelope::to_file_bytes(BUILD_HISTORY_FILE, &records)?, true)
    }

    /// Reads the existing history (or starts empty), appends `difference`,
    /// and writes it back.
    pub fn append_to_file(
        tx: &mut dyn Transaction,
        path: &Path,
        difference: BuildDifference,
        retention: usize,
    ) -> Result<(), CacheError> {
        let mut history = Self::read(path).unwrap_or_default();
        history.append(difference);
        history.write(tx, path, retention)
    }
}
