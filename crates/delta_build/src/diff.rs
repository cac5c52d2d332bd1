//! ABI snapshot diffing.
//!
//! [`AbiDiffEngine::compare`] turns two snapshots of the same module into
//! the [`DirtyData`] that dependents must react to. Results are memoized per
//! engine instance, keyed by the content hashes of the two snapshots and the
//! scope, so repeated queries against the same pair (one per build of a
//! dependent module in a daemon, for example) are answered once even when
//! each build reads the snapshots afresh.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use delta_cache::{AbiSnapshot, SubtypeIndex};
use delta_common::{ContentHash, DeclarationId, DirtyData, LookupSymbol, ProtoData};
use tracing::debug;

use crate::abi::AbiComparator;
use crate::error::BuildError;

/// Which declarations of the old snapshot are examined.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiffScope {
    /// Every declaration.
    All,
    /// Declarations that are, or live directly in, one of these scopes.
    /// Typically the scopes this module has recorded lookups in.
    Scopes(BTreeSet<String>),
}

impl DiffScope {
    /// Returns `true` if `id` is examined under this scope.
    pub fn contains(&self, id: &DeclarationId) -> bool {
        match self {
            DiffScope::All => true,
            DiffScope::Scopes(scopes) => {
                scopes.contains(id.as_str()) || scopes.contains(id.parent().as_str())
            }
        }
    }
}

#[derive(PartialEq, Eq, Hash)]
struct MemoKey {
    old: ContentHash,
    new: ContentHash,
    scope: DiffScope,
}

/// Compares ABI snapshots and memoizes the results.
///
/// The memo is unbounded; its key space is the set of distinct snapshot
/// contents a process actually compares, which stays small. Entries hold
/// only the resulting dirty data, never the snapshots.
pub struct AbiDiffEngine {
    comparator: Arc<dyn AbiComparator>,
    memo: HashMap<MemoKey, DirtyData>,
}

impl AbiDiffEngine {
    /// Creates an engine that delegates class comparison to `comparator`.
    pub fn new(comparator: Arc<dyn AbiComparator>) -> Self {
        Self {
            comparator,
            memo: HashMap::new(),
        }
    }

    /// Number of memoized results.
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }

    /// Computes what changed between `old` and `new` within `scope`.
    ///
    /// `subtypes` expands changed members to every subtype scope. It is not
    /// part of the memo key: callers comparing the same pair with different
    /// indexes must use separate engines.
    #[tracing::instrument(level = "debug", skip_all, fields(old = old.len(), new = new.len()))]
    pub fn compare(
        &mut self,
        old: &AbiSnapshot,
        new: &AbiSnapshot,
        scope: &DiffScope,
        subtypes: &dyn SubtypeIndex,
    ) -> Result<DirtyData, BuildError> {
        let key = MemoKey {
            old: old.content_hash()?,
            new: new.content_hash()?,
            scope: scope.clone(),
        };
        if let Some(result) = self.memo.get(&key) {
            debug!("diff memo hit");
            return Ok(result.clone());
        }

        let result = self.compute(old, new, scope, subtypes)?;
        self.memo.insert(key, result.clone());
        Ok(result)
    }

    fn compute(
        &self,
        old: &AbiSnapshot,
        new: &AbiSnapshot,
        scope: &DiffScope,
        subtypes: &dyn SubtypeIndex,
    ) -> Result<DirtyData, BuildError> {
        let mut dirty = DirtyData::default();

        for (id, old_proto) in old.iter().filter(|(id, _)| scope.contains(id)) {
            match (old_proto, new.get(id)) {
                (_, None) => add_removed(&mut dirty, id, old_proto),
                (ProtoData::Class(old_class), Some(ProtoData::Class(new_class))) => {
                    let diff = self.comparator.compare_classes(old_class, new_class);
                    if diff.is_class_affected {
                        dirty.dirty_classes_fq_names.insert(id.clone());
                        dirty.dirty_lookup_symbols.insert(id.as_lookup_symbol());
                    }
                    if !diff.changed_members_names.is_empty() {
                        for subtype in subtypes.with_subtypes(id) {
                            for name in &diff.changed_members_names {
                                dirty
                                    .dirty_lookup_symbols
                                    .insert(LookupSymbol::new(name.as_str(), subtype.as_str()));
                            }
                            dirty.dirty_lookup_symbols.insert(LookupSymbol::sam(subtype.as_str()));
                        }
                    }
                }
                (ProtoData::PackagePart(old_part), Some(ProtoData::PackagePart(new_part))) => {
                    let package = id.parent();
                    for name in self.comparator.compare_package_parts(old_part, new_part) {
                        dirty
                            .dirty_lookup_symbols
                            .insert(LookupSymbol::new(name, package.as_str()));
                    }
                }
                (old_proto, Some(new_proto)) => {
                    return Err(BuildError::MismatchedProtoVariants {
                        id: id.clone(),
                        old: old_proto.variant_name(),
                        new: new_proto.variant_name(),
                    });
                }
            }
        }

        // New declarations can change resolution and exhaustiveness elsewhere
        // even though nothing referenced them before.
        for (id, proto) in new.iter().filter(|(id, _)| scope.contains(id)) {
            if old.contains(id) {
                continue;
            }
            dirty.dirty_classes_fq_names.insert(id.clone());
            if let ProtoData::Class(_) = proto {
                dirty.dirty_lookup_symbols.insert(id.as_lookup_symbol());
            }
        }

        debug!(
            lookups = dirty.dirty_lookup_symbols.len(),
            classes = dirty.dirty_classes_fq_names.len(),
            "computed snapshot difference"
        );
        Ok(dirty)
    }
}

fn add_removed(dirty: &mut DirtyData, id: &DeclarationId, proto: &ProtoData) {
    dirty.dirty_classes_fq_names.insert(id.clone());
    match proto {
        ProtoData::Class(class) => {
            dirty.dirty_lookup_symbols.insert(id.as_lookup_symbol());
            for name in class.non_private_member_names() {
                dirty
                    .dirty_lookup_symbols
                    .insert(LookupSymbol::new(name, id.as_str()));
            }
        }
        ProtoData::PackagePart(part) => {
            let package = id.parent();
            for name in part.non_private_member_names() {
                dirty
                    .dirty_lookup_symbols
                    .insert(LookupSymbol::new(name, package.as_str()));
            }
        }
    }
}
