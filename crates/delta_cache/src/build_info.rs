//! Baseline of the last successful build.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::envelope::{self, BUILD_INFO_FILE};
use crate::error::CacheError;
use crate::snapshot::{AbiSnapshot, SnapshotRecord};
use crate::transaction::Transaction;

/// Start time of the last successful build and the ABI snapshots of its
/// classpath, used to detect classpath drift on the next build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInfo {
    /// Milliseconds since the Unix epoch at which the build started.
    pub start_ts: i64,
    /// Snapshot of each classpath dependency, keyed by dependency id.
    pub classpath_abi_snapshots: BTreeMap<String, Arc<AbiSnapshot>>,
}

#[derive(Serialize, Deserialize)]
struct BuildInfoRecord {
    start_ts: i64,
    dependencies: Vec<(String, Vec<SnapshotRecord>)>,
}

impl BuildInfo {
    /// Creates build info with no classpath snapshots.
    pub fn new(start_ts: i64) -> Self {
        Self {
            start_ts,
            classpath_abi_snapshots: BTreeMap::new(),
        }
    }

    /// Reads build info, returning `None` if the file is missing or cannot
    /// be trusted.
    pub fn read(path: &Path) -> Option<BuildInfo> {
        let record: BuildInfoRecord = match envelope::read_file(BUILD_INFO_FILE, path) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring unreadable build info");
                return None;
            }
        };
        let mut classpath_abi_snapshots = BTreeMap::new();
        for (dependency, records) in record.dependencies {
            match AbiSnapshot::from_records(records) {
                Ok(snapshot) => {
                    classpath_abi_snapshots.insert(dependency, Arc::new(snapshot));
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "ignoring build info with bad snapshot");
                    return None;
                }
            }
        }
        Some(BuildInfo {
            start_ts: record.start_ts,
            classpath_abi_snapshots,
        })
    }

    /// Writes build info through `tx`.
    pub fn write(&self, tx: &mut dyn Transaction, path: &Path) -> Result<(), CacheError> {
        let dependencies = self
            .classpath_abi_snapshots
            .iter()
            .map(|(dep, snapshot)| Ok((dep.clone(), snapshot.to_records()?)))
            .collect::<Result<Vec<_>, CacheError>>()?;
        let record = BuildInfoRecord {
            start_ts: self.start_ts,
            dependencies,
        };
        tx.write_bytes(path, &envelope::to_file_bytes(BUILD_INFO_FILE, &record)?, true)
    }
}
