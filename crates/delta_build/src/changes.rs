//! Changes collected from one compilation round.
//!
//! After a round the platform cache reports, per declaration, the
//! descriptor it had before and the one the compiler just produced. The
//! collector turns those pairs into [`ChangeInfo`] entries, and then into
//! the symbols and declarations whose dependents must be recompiled in the
//! next round.

use std::collections::{BTreeMap, BTreeSet};

use delta_cache::{AbiSnapshot, PlatformCache, ProtoChange, SubtypeIndex};
use delta_common::{ClassProtoData, DeclarationId, DirtyData, LookupSymbol, ProtoData};

use crate::abi::AbiComparator;
use crate::error::BuildError;

/// One kind of ABI change to a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeInfo {
    /// The declaration's own shape changed; every reference to it is dirty.
    SignatureChanged {
        /// The declaration.
        id: DeclarationId,
        /// Subtypes must be treated as changed too.
        subclasses_affected: bool,
    },
    /// Some members changed; references to those names are dirty, in the
    /// declaration and in all of its subtypes.
    MembersChanged {
        /// The class, or the package of a file facade.
        id: DeclarationId,
        /// Changed member names.
        names: BTreeSet<String>,
    },
    /// The declaration joined or left the hierarchy of sealed parents, whose
    /// exhaustive users must be recompiled.
    ParentsChanged {
        /// The declaration.
        id: DeclarationId,
        /// The sealed parents involved.
        parents: BTreeSet<DeclarationId>,
    },
}

/// What the next round must invalidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedSymbols {
    /// Lookups whose referencing files are dirty.
    pub lookup_symbols: BTreeSet<LookupSymbol>,
    /// Declarations whose files are dirty.
    pub fq_names: BTreeSet<DeclarationId>,
    /// Declarations whose files must be recompiled even if this build
    /// already compiled them.
    pub force_recompile: BTreeSet<DeclarationId>,
}

impl ChangedSymbols {
    /// The invalidation recorded in the build history.
    pub fn to_dirty_data(&self) -> DirtyData {
        DirtyData::new(self.lookup_symbols.clone(), self.fq_names.clone())
    }
}

/// Accumulates the changes of one round.
#[derive(Debug, Default)]
pub struct ChangesCollector {
    changes: Vec<ChangeInfo>,
    changed_protos: BTreeMap<DeclarationId, ProtoData>,
    removed_protos: BTreeSet<DeclarationId>,
}

impl ChangesCollector {
    /// An empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected changes, in collection order.
    pub fn changes(&self) -> &[ChangeInfo] {
        &self.changes
    }

    /// Returns `true` if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.changed_protos.is_empty() && self.removed_protos.is_empty()
    }

    /// Records that `id`'s own signature changed.
    pub fn signature_changed(&mut self, id: DeclarationId, subclasses_affected: bool) {
        self.changes.push(ChangeInfo::SignatureChanged {
            id,
            subclasses_affected,
        });
    }

    /// Classifies one old/new descriptor pair. `platform` resolves
    /// supertypes to find sealed parents.
    pub fn collect<P>(
        &mut self,
        comparator: &dyn AbiComparator,
        platform: &P,
        change: ProtoChange,
    ) -> Result<(), BuildError>
    where
        P: PlatformCache + ?Sized,
    {
        let ProtoChange { id, old, new } = change;
        match (&old, &new) {
            (None, None) => {}
            (None, Some(proto)) | (Some(proto), None) => self.collect_whole(platform, &id, proto),
            (Some(ProtoData::Class(old_class)), Some(ProtoData::Class(new_class))) => {
                let diff = comparator.compare_classes(old_class, new_class);
                if diff.is_class_affected {
                    self.signature_changed(id.clone(), diff.are_subclasses_affected);
                }
                if !diff.changed_members_names.is_empty() {
                    self.changes.push(ChangeInfo::MembersChanged {
                        id: id.clone(),
                        names: diff.changed_members_names,
                    });
                }
                let before = sealed_parents(platform, old_class);
                let after = sealed_parents(platform, new_class);
                let parents: BTreeSet<DeclarationId> =
                    before.symmetric_difference(&after).cloned().collect();
                if !parents.is_empty() {
                    self.changes.push(ChangeInfo::ParentsChanged {
                        id: id.clone(),
                        parents,
                    });
                }
            }
            (Some(ProtoData::PackagePart(old_part)), Some(ProtoData::PackagePart(new_part))) => {
                let names = comparator.compare_package_parts(old_part, new_part);
                if !names.is_empty() {
                    self.changes.push(ChangeInfo::MembersChanged {
                        id: id.parent(),
                        names,
                    });
                }
            }
            (Some(old_proto), Some(new_proto)) => {
                return Err(BuildError::MismatchedProtoVariants {
                    id,
                    old: old_proto.variant_name(),
                    new: new_proto.variant_name(),
                });
            }
        }

        match new {
            Some(proto) => {
                self.changed_protos.insert(id, proto);
            }
            None => {
                self.removed_protos.insert(id);
            }
        }
        Ok(())
    }

    /// A declaration that appeared or disappeared as a whole.
    fn collect_whole<P>(&mut self, platform: &P, id: &DeclarationId, proto: &ProtoData)
    where
        P: PlatformCache + ?Sized,
    {
        match proto {
            ProtoData::Class(class) => {
                self.signature_changed(id.clone(), true);
                let parents = sealed_parents(platform, class);
                if !parents.is_empty() {
                    self.changes.push(ChangeInfo::ParentsChanged {
                        id: id.clone(),
                        parents,
                    });
                }
            }
            ProtoData::PackagePart(part) => {
                let names: BTreeSet<String> = part
                    .non_private_member_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                if !names.is_empty() {
                    self.changes.push(ChangeInfo::MembersChanged {
                        id: id.parent(),
                        names,
                    });
                }
            }
        }
    }

    /// Expands the collected changes into dirty lookups and declarations.
    pub fn changed_and_impacted_symbols<S>(&self, index: &S) -> ChangedSymbols
    where
        S: SubtypeIndex + ?Sized,
    {
        let mut out = ChangedSymbols::default();
        for change in &self.changes {
            match change {
                ChangeInfo::SignatureChanged {
                    id,
                    subclasses_affected,
                } => {
                    let ids = if *subclasses_affected {
                        index.with_subtypes(id)
                    } else {
                        BTreeSet::from([id.clone()])
                    };
                    for id in ids {
                        out.lookup_symbols.insert(id.as_lookup_symbol());
                        out.fq_names.insert(id);
                    }
                }
                ChangeInfo::MembersChanged { id, names } => {
                    for scope in index.with_subtypes(id) {
                        for name in names {
                            out.lookup_symbols
                                .insert(LookupSymbol::new(name.as_str(), scope.as_str()));
                        }
                        out.lookup_symbols.insert(LookupSymbol::sam(scope.as_str()));
                        out.fq_names.insert(scope);
                    }
                }
                ChangeInfo::ParentsChanged { parents, .. } => {
                    out.force_recompile.extend(parents.iter().cloned());
                }
            }
        }
        out
    }

    /// New or changed descriptors, for the module's ABI snapshot.
    pub fn proto_changes(&self) -> &BTreeMap<DeclarationId, ProtoData> {
        &self.changed_protos
    }

    /// Declarations that no longer exist.
    pub fn proto_removed(&self) -> &BTreeSet<DeclarationId> {
        &self.removed_protos
    }

    /// Merges this round into `snapshot`: removals first, then additions, so
    /// a declaration removed and re-added within the round survives.
    pub fn apply_to(&self, snapshot: &mut AbiSnapshot) {
        for id in &self.removed_protos {
            snapshot.remove(id);
        }
        for (id, proto) in &self.changed_protos {
            snapshot.insert(id.clone(), proto.clone());
        }
    }
}

fn sealed_parents<P>(platform: &P, class: &ClassProtoData) -> BTreeSet<DeclarationId>
where
    P: PlatformCache + ?Sized,
{
    class
        .supertypes
        .iter()
        .filter(|parent| {
            matches!(platform.proto(parent), Some(ProtoData::Class(c)) if c.is_sealed())
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::StructuralAbiComparator;
    use delta_cache::{DeclarationCache, DeclarationOutput};
    use delta_common::{ClassKind, Member, MemberKind, PackagePartProtoData};
    use std::path::PathBuf;

    fn open() -> (tempfile::TempDir, DeclarationCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = DeclarationCache::open(dir.path()).unwrap();
        (dir, cache)
    }

    fn fun(name: &str) -> Member {
        Member::public(name, MemberKind::Function, "(): Unit")
    }

    fn class_with(members: &[&str]) -> ProtoData {
        let mut class = ClassProtoData::new(ClassKind::Class);
        for m in members {
            class = class.with_member(fun(m));
        }
        ProtoData::Class(class)
    }

    fn change(id: &str, old: Option<ProtoData>, new: Option<ProtoData>) -> ProtoChange {
        ProtoChange {
            id: DeclarationId::new(id),
            old,
            new,
        }
    }

    #[test]
    fn member_change_expands_to_subtypes() {
        let (_dir, mut platform) = open();
        platform.update(&[
            DeclarationOutput {
                source: PathBuf::from("/a.kt"),
                id: DeclarationId::new("p.A"),
                proto: class_with(&["f"]),
            },
            DeclarationOutput {
                source: PathBuf::from("/b.kt"),
                id: DeclarationId::new("p.B"),
                proto: ProtoData::Class(ClassProtoData::new(ClassKind::Class).with_supertype("p.A")),
            },
        ]);

        let mut collector = ChangesCollector::new();
        collector
            .collect(
                &StructuralAbiComparator,
                &platform,
                change("p.A", Some(class_with(&["f"])), Some(class_with(&["f", "g"]))),
            )
            .unwrap();

        let symbols = collector.changed_and_impacted_symbols(&platform);
        assert!(symbols.lookup_symbols.contains(&LookupSymbol::new("g", "p.A")));
        assert!(symbols.lookup_symbols.contains(&LookupSymbol::new("g", "p.B")));
        assert!(symbols.lookup_symbols.contains(&LookupSymbol::sam("p.B")));
        assert!(!symbols.lookup_symbols.contains(&LookupSymbol::new("f", "p.A")));
        assert_eq!(
            symbols.fq_names,
            BTreeSet::from([DeclarationId::new("p.A"), DeclarationId::new("p.B")])
        );
    }

    #[test]
    fn removed_class_is_a_signature_change() {
        let (_dir, platform) = open();
        let mut collector = ChangesCollector::new();
        collector
            .collect(&StructuralAbiComparator, &platform, change("p.Gone", Some(class_with(&[])), None))
            .unwrap();
        assert_eq!(
            collector.changes(),
            &[ChangeInfo::SignatureChanged {
                id: DeclarationId::new("p.Gone"),
                subclasses_affected: true
            }]
        );
        assert!(collector.proto_removed().contains(&DeclarationId::new("p.Gone")));
        let symbols = collector.changed_and_impacted_symbols(&platform);
        assert!(symbols.lookup_symbols.contains(&LookupSymbol::new("Gone", "p")));
    }

    #[test]
    fn new_subclass_of_sealed_parent_forces_parent() {
        let (_dir, mut platform) = open();
        platform.update(&[DeclarationOutput {
            source: PathBuf::from("/shape.kt"),
            id: DeclarationId::new("p.Shape"),
            proto: ProtoData::Class(
                ClassProtoData::new(ClassKind::Class).with_flags(ClassProtoData::FLAG_SEALED),
            ),
        }]);
        let circle = ProtoData::Class(ClassProtoData::new(ClassKind::Class).with_supertype("p.Shape"));

        let mut collector = ChangesCollector::new();
        collector
            .collect(&StructuralAbiComparator, &platform, change("p.Circle", None, Some(circle)))
            .unwrap();
        let symbols = collector.changed_and_impacted_symbols(&platform);
        assert_eq!(
            symbols.force_recompile,
            BTreeSet::from([DeclarationId::new("p.Shape")])
        );
    }

    #[test]
    fn package_part_changes_are_package_scoped() {
        let (_dir, platform) = open();
        let old = ProtoData::PackagePart(PackagePartProtoData::new(vec![fun("top")]));
        let new = ProtoData::PackagePart(PackagePartProtoData::new(vec![
            Member::public("top", MemberKind::Function, "(): Int"),
        ]));
        let mut collector = ChangesCollector::new();
        collector
            .collect(&StructuralAbiComparator, &platform, change("p.q.UtilKt", Some(old), Some(new)))
            .unwrap();
        let symbols = collector.changed_and_impacted_symbols(&platform);
        assert!(symbols.lookup_symbols.contains(&LookupSymbol::new("top", "p.q")));
    }

    #[test]
    fn mismatched_variants_are_rejected() {
        let (_dir, platform) = open();
        let mut collector = ChangesCollector::new();
        let err = collector
            .collect(
                &StructuralAbiComparator,
                &platform,
                change(
                    "p.X",
                    Some(class_with(&[])),
                    Some(ProtoData::PackagePart(PackagePartProtoData::new(vec![]))),
                ),
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::MismatchedProtoVariants { .. }));
    }

    #[test]
    fn snapshot_merge_applies_removals_before_additions() {
        let (_dir, platform) = open();
        let mut collector = ChangesCollector::new();
        // Removed from one file and re-declared in another within one round.
        collector
            .collect(&StructuralAbiComparator, &platform, change("p.Moved", Some(class_with(&["a"])), None))
            .unwrap();
        collector
            .collect(&StructuralAbiComparator, &platform, change("p.Moved", None, Some(class_with(&["b"]))))
            .unwrap();

        let mut snapshot: AbiSnapshot =
            [(DeclarationId::new("p.Moved"), class_with(&["a"]))].into_iter().collect();
        collector.apply_to(&mut snapshot);
        assert_eq!(snapshot.get(&DeclarationId::new("p.Moved")), Some(&class_with(&["b"])));
    }

    #[test]
    fn unchanged_protos_produce_nothing() {
        let (_dir, platform) = open();
        let mut collector = ChangesCollector::new();
        collector
            .collect(
                &StructuralAbiComparator,
                &platform,
                change("p.A", Some(class_with(&["f"])), Some(class_with(&["f"]))),
            )
            .unwrap();
        assert!(collector.changes().is_empty());
        assert_eq!(
            collector.changed_and_impacted_symbols(&platform),
            ChangedSymbols::default()
        );
    }
}
