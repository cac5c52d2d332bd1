//! The unit of invalidation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::name::{DeclarationId, LookupSymbol};

/// Symbols and declarations whose dependents must be recompiled.
///
/// Produced by snapshot diffs and by the change collector after each
/// compilation round, consumed by the dirty-set tracker, and recorded per
/// build in the build history so downstream modules can replay it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyData {
    /// Lookups whose referencing files are dirty.
    pub dirty_lookup_symbols: BTreeSet<LookupSymbol>,
    /// Declarations whose owning files (and subtypes' files) are dirty.
    pub dirty_classes_fq_names: BTreeSet<DeclarationId>,
}

impl DirtyData {
    /// Creates dirty data from explicit sets.
    pub fn new(
        dirty_lookup_symbols: BTreeSet<LookupSymbol>,
        dirty_classes_fq_names: BTreeSet<DeclarationId>,
    ) -> Self {
        Self {
            dirty_lookup_symbols,
            dirty_classes_fq_names,
        }
    }

    /// Returns `true` if nothing is dirty.
    pub fn is_empty(&self) -> bool {
        self.dirty_lookup_symbols.is_empty() && self.dirty_classes_fq_names.is_empty()
    }

    /// Folds `other` into `self`.
    pub fn merge(&mut self, other: DirtyData) {
        self.dirty_lookup_symbols.extend(other.dirty_lookup_symbols);
        self.dirty_classes_fq_names.extend(other.dirty_classes_fq_names);
    }
}
