//! ABI snapshots and their persistence.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::path::Path;

use delta_common::{ContentHash, DeclarationId, ProtoData};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::ProtoCodec;
use crate::envelope::{self, SNAPSHOT_FILE};
use crate::error::CacheError;
use crate::transaction::Transaction;

/// Mapping from declaration to ABI descriptor for one module at one point
/// in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbiSnapshot {
    protos: BTreeMap<DeclarationId, ProtoData>,
}

impl AbiSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor recorded for `id`.
    pub fn get(&self, id: &DeclarationId) -> Option<&ProtoData> {
        self.protos.get(id)
    }

    /// Returns `true` if `id` is recorded.
    pub fn contains(&self, id: &DeclarationId) -> bool {
        self.protos.contains_key(id)
    }

    /// Records (or replaces) the descriptor for `id`.
    pub fn insert(&mut self, id: DeclarationId, proto: ProtoData) -> Option<ProtoData> {
        self.protos.insert(id, proto)
    }

    /// Forgets `id`.
    pub fn remove(&mut self, id: &DeclarationId) -> Option<ProtoData> {
        self.protos.remove(id)
    }

    /// Number of recorded declarations.
    pub fn len(&self) -> usize {
        self.protos.len()
    }

    /// Returns `true` if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.protos.is_empty()
    }

    /// Iterates in declaration-id order.
    pub fn iter(&self) -> btree_map::Iter<'_, DeclarationId, ProtoData> {
        self.protos.iter()
    }

    /// Declaration ids in order.
    pub fn ids(&self) -> btree_map::Keys<'_, DeclarationId, ProtoData> {
        self.protos.keys()
    }

    /// Hash of the snapshot's persisted encoding. Equal snapshots hash
    /// equal no matter how often, or from where, they were read.
    pub fn content_hash(&self) -> Result<ContentHash, CacheError> {
        Ok(ContentHash::from_bytes(&envelope::encode(&self.to_records()?)?))
    }

    pub(crate) fn to_records(&self) -> Result<Vec<SnapshotRecord>, CacheError> {
        self.protos
            .iter()
            .map(|(id, proto)| {
                Ok(SnapshotRecord {
                    id: id.as_str().to_string(),
                    flag: proto.variant_flag(),
                    payload: ProtoCodec::encode(proto)?,
                })
            })
            .collect()
    }

    pub(crate) fn from_records(records: Vec<SnapshotRecord>) -> Result<Self, CacheError> {
        let mut protos = BTreeMap::new();
        for record in records {
            let proto = ProtoCodec::decode(record.flag, &record.payload)?;
            if protos.insert(DeclarationId::new(record.id.clone()), proto).is_some() {
                return Err(CacheError::Serialization {
                    reason: format!("duplicate declaration {}", record.id),
                });
            }
        }
        Ok(Self { protos })
    }
}

impl FromIterator<(DeclarationId, ProtoData)> for AbiSnapshot {
    fn from_iter<I: IntoIterator<Item = (DeclarationId, ProtoData)>>(iter: I) -> Self {
        Self {
            protos: iter.into_iter().collect(),
        }
    }
}

/// One persisted snapshot entry: id, variant flag, self-describing payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SnapshotRecord {
    pub(crate) id: String,
    pub(crate) flag: u8,
    pub(crate) payload: Vec<u8>,
}

/// Reads and writes [`AbiSnapshot`] files.
pub struct SnapshotStore;

impl SnapshotStore {
    /// Reads a snapshot. A missing, truncated, version-mismatched, or
    /// otherwise undecodable file is reported as
    /// [`CacheError::UnreadableSnapshot`]; nothing is partially trusted.
    pub fn read(path: &Path) -> Result<AbiSnapshot, CacheError> {
        let unreadable = |reason: String| CacheError::UnreadableSnapshot {
            path: path.to_path_buf(),
            reason,
        };
        let records: Vec<SnapshotRecord> = envelope::read_file(SNAPSHOT_FILE, path)
            .map_err(|e| unreadable(e.to_string()))?
            .ok_or_else(|| unreadable("file does not exist".to_string()))?;
        let snapshot = AbiSnapshot::from_records(records).map_err(|e| unreadable(e.to_string()))?;
        debug!(path = %path.display(), declarations = snapshot.len(), "read ABI snapshot");
        Ok(snapshot)
    }

    /// Writes a snapshot through `tx`.
    pub fn write(
        tx: &mut dyn Transaction,
        path: &Path,
        snapshot: &AbiSnapshot,
    ) -> Result<(), CacheError> {
        let bytes = envelope::to_file_bytes(SNAPSHOT_FILE, &snapshot.to_records()?)?;
        tx.write_bytes(path, &bytes, true)
    }
}
