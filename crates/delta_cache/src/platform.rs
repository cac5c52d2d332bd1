//! Per-declaration platform metadata.
//!
//! The platform cache knows, for every declaration the module produced, its
//! ABI descriptor, its supertypes, and the file that owns it. It answers the
//! subtype and ownership queries that turn dirty declarations into dirty
//! files, and it reports the old/new descriptor pairs that drive change
//! collection after each compilation round.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use delta_common::{DeclarationId, ProtoData};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::manager::CacheLifecycle;
use crate::persistent::PersistentMap;
use crate::transaction::Transaction;

const DECLARATIONS_FILE: &str = "declarations.bin";
const SUBTYPES_FILE: &str = "subtypes.bin";
const SOURCE_TO_CLASSES_FILE: &str = "source-to-classes.bin";
const COMPLEMENTARY_FILE: &str = "complementary-files.bin";
const DIRTY_OUTPUTS_FILE: &str = "dirty-outputs.bin";

/// Subtype and ownership queries over a module's declarations.
pub trait SubtypeIndex {
    /// Declarations that list `id` as a direct supertype.
    fn direct_subtypes(&self, id: &DeclarationId) -> Vec<DeclarationId>;

    /// Files that own `id`.
    fn sources_of(&self, id: &DeclarationId) -> Vec<PathBuf>;

    /// `id` and all of its transitive subtypes.
    fn with_subtypes(&self, id: &DeclarationId) -> BTreeSet<DeclarationId> {
        let mut seen = BTreeSet::from([id.clone()]);
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            for subtype in self.direct_subtypes(&current) {
                if seen.insert(subtype.clone()) {
                    queue.push_back(subtype);
                }
            }
        }
        seen
    }
}

/// A declaration produced by the compiler for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationOutput {
    /// The owning source file.
    pub source: PathBuf,
    /// The declaration.
    pub id: DeclarationId,
    /// Its new ABI descriptor.
    pub proto: ProtoData,
}

/// Old and new descriptors of a declaration whose ABI may have changed.
/// `old: None` is an addition, `new: None` a removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoChange {
    /// The declaration.
    pub id: DeclarationId,
    /// Descriptor before this round.
    pub old: Option<ProtoData>,
    /// Descriptor after this round.
    pub new: Option<ProtoData>,
}

/// The per-platform declaration-metadata cache owned by a
/// [`CacheManager`](crate::CacheManager).
pub trait PlatformCache: CacheLifecycle + SubtypeIndex {
    /// Opens the cache files in `dir`.
    fn open(dir: &Path) -> Result<Self, CacheError>
    where
        Self: Sized;

    /// Marks every declaration owned by `files` as a dirty output: it stays
    /// queryable until [`clear_removed`](Self::clear_removed), and is
    /// reported removed unless re-produced by this round.
    fn mark_dirty(&mut self, files: &BTreeSet<PathBuf>);

    /// Files coupled to `files` (directly or transitively) that must be
    /// compiled with them, excluding `files` themselves.
    fn complementary_files_recursive(&self, files: &BTreeSet<PathBuf>) -> BTreeSet<PathBuf>;

    /// Replaces the coupling of `dirty` files with `pairs` reported this round.
    fn update_complementary_files(&mut self, dirty: &BTreeSet<PathBuf>, pairs: &[(PathBuf, PathBuf)]);

    /// Declarations owned by `files`.
    fn classes_by_sources(&self, files: &BTreeSet<PathBuf>) -> BTreeSet<DeclarationId>;

    /// Records this round's declarations and returns those whose descriptor
    /// differs from the cached one.
    fn update(&mut self, outputs: &[DeclarationOutput]) -> Vec<ProtoChange>;

    /// Drops dirty outputs that were not re-produced, returning them as
    /// removals.
    fn clear_removed(&mut self) -> Vec<ProtoChange>;

    /// The cached descriptor of `id`.
    fn proto(&self, id: &DeclarationId) -> Option<&ProtoData>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeclarationEntry {
    source: PathBuf,
    proto: ProtoData,
}

fn supertypes_of(proto: &ProtoData) -> &[DeclarationId] {
    match proto {
        ProtoData::Class(class) => &class.supertypes,
        ProtoData::PackagePart(_) => &[],
    }
}

/// Default [`PlatformCache`]: descriptors, subtype edges, source ownership,
/// and complementary-file coupling, each in its own persistent map.
#[derive(Debug)]
pub struct DeclarationCache {
    declarations: PersistentMap<DeclarationId, DeclarationEntry>,
    subtypes: PersistentMap<DeclarationId, BTreeSet<DeclarationId>>,
    source_to_classes: PersistentMap<PathBuf, BTreeSet<DeclarationId>>,
    complementary: PersistentMap<PathBuf, BTreeSet<PathBuf>>,
    dirty_outputs: PersistentMap<DeclarationId, PathBuf>,
}

impl DeclarationCache {
    fn unlink_supertypes(&mut self, id: &DeclarationId, proto: &ProtoData) {
        for supertype in supertypes_of(proto) {
            self.subtypes.remove_value(supertype, id);
        }
    }

    fn link_supertypes(&mut self, id: &DeclarationId, proto: &ProtoData) {
        for supertype in supertypes_of(proto) {
            self.subtypes.add(supertype.clone(), id.clone());
        }
    }

    /// Number of cached declarations.
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns `true` if no declaration is cached.
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl SubtypeIndex for DeclarationCache {
    fn direct_subtypes(&self, id: &DeclarationId) -> Vec<DeclarationId> {
        self.subtypes.values_of(id).cloned().collect()
    }

    fn sources_of(&self, id: &DeclarationId) -> Vec<PathBuf> {
        self.declarations
            .get(id)
            .map(|entry| vec![entry.source.clone()])
            .unwrap_or_default()
    }
}

impl PlatformCache for DeclarationCache {
    fn open(dir: &Path) -> Result<Self, CacheError> {
        Ok(Self {
            declarations: PersistentMap::open(&dir.join(DECLARATIONS_FILE))?,
            subtypes: PersistentMap::open(&dir.join(SUBTYPES_FILE))?,
            source_to_classes: PersistentMap::open(&dir.join(SOURCE_TO_CLASSES_FILE))?,
            complementary: PersistentMap::open(&dir.join(COMPLEMENTARY_FILE))?,
            dirty_outputs: PersistentMap::open(&dir.join(DIRTY_OUTPUTS_FILE))?,
        })
    }

    fn mark_dirty(&mut self, files: &BTreeSet<PathBuf>) {
        for file in files {
            if let Some(ids) = self.source_to_classes.remove(file) {
                for id in ids {
                    self.dirty_outputs.put(id, file.clone());
                }
            }
        }
    }

    fn complementary_files_recursive(&self, files: &BTreeSet<PathBuf>) -> BTreeSet<PathBuf> {
        let mut seen: BTreeSet<PathBuf> = files.clone();
        let mut queue: VecDeque<PathBuf> = files.iter().cloned().collect();
        while let Some(file) = queue.pop_front() {
            for partner in self.complementary.values_of(&file) {
                if seen.insert(partner.clone()) {
                    queue.push_back(partner.clone());
                }
            }
        }
        seen.retain(|f| !files.contains(f));
        seen
    }

    fn update_complementary_files(&mut self, dirty: &BTreeSet<PathBuf>, pairs: &[(PathBuf, PathBuf)]) {
        for file in dirty {
            if let Some(partners) = self.complementary.remove(file) {
                for partner in partners {
                    self.complementary.remove_value(&partner, file);
                }
            }
        }
        for (a, b) in pairs {
            if a != b {
                self.complementary.add(a.clone(), b.clone());
                self.complementary.add(b.clone(), a.clone());
            }
        }
    }

    fn classes_by_sources(&self, files: &BTreeSet<PathBuf>) -> BTreeSet<DeclarationId> {
        files
            .iter()
            .flat_map(|f| self.source_to_classes.values_of(f).cloned())
            .collect()
    }

    fn update(&mut self, outputs: &[DeclarationOutput]) -> Vec<ProtoChange> {
        let mut changes = Vec::new();
        for output in outputs {
            self.source_to_classes
                .add(output.source.clone(), output.id.clone());
            self.dirty_outputs.remove(&output.id);

            let old = self.declarations.remove(&output.id).map(|entry| entry.proto);
            if let Some(old) = &old {
                self.unlink_supertypes(&output.id, old);
            }
            self.link_supertypes(&output.id, &output.proto);
            self.declarations.put(
                output.id.clone(),
                DeclarationEntry {
                    source: output.source.clone(),
                    proto: output.proto.clone(),
                },
            );

            if old.as_ref() != Some(&output.proto) {
                changes.push(ProtoChange {
                    id: output.id.clone(),
                    old,
                    new: Some(output.proto.clone()),
                });
            }
        }
        changes
    }

    fn clear_removed(&mut self) -> Vec<ProtoChange> {
        let removed: Vec<DeclarationId> = self.dirty_outputs.keys().cloned().collect();
        let mut changes = Vec::new();
        for id in removed {
            self.dirty_outputs.remove(&id);
            if let Some(entry) = self.declarations.remove(&id) {
                self.unlink_supertypes(&id, &entry.proto);
                changes.push(ProtoChange {
                    id,
                    old: Some(entry.proto),
                    new: None,
                });
            }
        }
        changes
    }

    fn proto(&self, id: &DeclarationId) -> Option<&ProtoData> {
        self.declarations.get(id).map(|entry| &entry.proto)
    }
}

impl CacheLifecycle for DeclarationCache {
    fn name(&self) -> &str {
        "platform"
    }

    fn flush(&mut self, tx: &mut dyn Transaction, memory_only: bool) -> Result<(), CacheError> {
        self.declarations.flush(tx, memory_only)?;
        self.subtypes.flush(tx, memory_only)?;
        self.source_to_classes.flush(tx, memory_only)?;
        self.complementary.flush(tx, memory_only)?;
        self.dirty_outputs.flush(tx, memory_only)
    }

    fn clean(&mut self) {
        self.declarations.clear();
        self.subtypes.clear();
        self.source_to_classes.clear();
        self.complementary.clear();
        self.dirty_outputs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delta_common::{ClassKind, ClassProtoData, Member, MemberKind};

    fn class(supertypes: &[&str]) -> ProtoData {
        let mut class = ClassProtoData::new(ClassKind::Class);
        for s in supertypes {
            class = class.with_supertype(*s);
        }
        ProtoData::Class(class)
    }

    fn output(source: &str, id: &str, proto: ProtoData) -> DeclarationOutput {
        DeclarationOutput {
            source: PathBuf::from(source),
            id: DeclarationId::new(id),
            proto,
        }
    }

    fn open() -> (tempfile::TempDir, DeclarationCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = DeclarationCache::open(dir.path()).unwrap();
        (dir, cache)
    }

    #[test]
    fn transitive_subtypes() {
        let (_dir, mut cache) = open();
        cache.update(&[
            output("/a.kt", "p.A", class(&[])),
            output("/b.kt", "p.B", class(&["p.A"])),
            output("/c.kt", "p.C", class(&["p.B"])),
            output("/d.kt", "p.D", class(&[])),
        ]);
        let subtypes = cache.with_subtypes(&DeclarationId::new("p.A"));
        let names: Vec<_> = subtypes.iter().map(|id| id.as_str()).collect();
        assert_eq!(names, vec!["p.A", "p.B", "p.C"]);
        assert_eq!(
            cache.sources_of(&DeclarationId::new("p.C")),
            vec![PathBuf::from("/c.kt")]
        );
    }

    #[test]
    fn update_reports_only_changed_protos() {
        let (_dir, mut cache) = open();
        let first = cache.update(&[output("/a.kt", "p.A", class(&[]))]);
        assert_eq!(first.len(), 1);
        assert!(first[0].old.is_none());

        let same = cache.update(&[output("/a.kt", "p.A", class(&[]))]);
        assert!(same.is_empty());

        let changed_proto = ProtoData::Class(
            ClassProtoData::new(ClassKind::Class)
                .with_member(Member::public("x", MemberKind::Property, "Int")),
        );
        let changed = cache.update(&[output("/a.kt", "p.A", changed_proto.clone())]);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].new, Some(changed_proto));
    }

    #[test]
    fn dirty_outputs_not_reproduced_are_removed() {
        let (_dir, mut cache) = open();
        cache.update(&[
            output("/a.kt", "p.A", class(&[])),
            output("/a.kt", "p.Gone", class(&["p.A"])),
        ]);
        let dirty = BTreeSet::from([PathBuf::from("/a.kt")]);
        cache.mark_dirty(&dirty);
        assert!(cache.classes_by_sources(&dirty).is_empty());
        // Still queryable until cleared.
        assert!(cache.proto(&DeclarationId::new("p.Gone")).is_some());

        cache.update(&[output("/a.kt", "p.A", class(&[]))]);
        let removed = cache.clear_removed();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, DeclarationId::new("p.Gone"));
        assert!(removed[0].new.is_none());
        assert!(cache.direct_subtypes(&DeclarationId::new("p.A")).is_empty());
    }

    #[test]
    fn complementary_files_are_transitive_and_symmetric() {
        let (_dir, mut cache) = open();
        let a = PathBuf::from("/a.kt");
        let b = PathBuf::from("/b.kt");
        let c = PathBuf::from("/c.kt");
        cache.update_complementary_files(
            &BTreeSet::new(),
            &[(a.clone(), b.clone()), (b.clone(), c.clone())],
        );
        assert_eq!(
            cache.complementary_files_recursive(&BTreeSet::from([c.clone()])),
            BTreeSet::from([a.clone(), b.clone()])
        );

        // b recompiled without coupling.
        cache.update_complementary_files(&BTreeSet::from([b.clone()]), &[]);
        assert!(cache
            .complementary_files_recursive(&BTreeSet::from([a]))
            .is_empty());
    }

    #[test]
    fn flush_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = DeclarationCache::open(dir.path()).unwrap();
            cache.update(&[output("/a.kt", "p.A", class(&["p.Base"]))]);
            let mut tx = crate::transaction::NonRecoverableTransaction::new();
            cache.flush(&mut tx, false).unwrap();
        }
        let cache = DeclarationCache::open(dir.path()).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.direct_subtypes(&DeclarationId::new("p.Base")),
            vec![DeclarationId::new("p.A")]
        );
    }
}
