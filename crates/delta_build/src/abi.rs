//! Structural comparison of ABI descriptors.
//!
//! The comparator decides whether a class's own shape changed (so every
//! reference to the class is suspect) and which member names changed (so
//! only references to those names are). Everything that does not reach the
//! ABI, such as private members or the name-table representation a
//! descriptor was produced with, is ignored.

use std::collections::{BTreeMap, BTreeSet};

use delta_common::{ClassProtoData, Member, MemberKind, PackagePartProtoData, Visibility};

/// Result of comparing two versions of one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDifference {
    /// The class header (kind, visibility, modifiers, type parameters,
    /// supertypes) changed.
    pub is_class_affected: bool,
    /// The change is visible to subclasses, which must be treated as
    /// changed too.
    pub are_subclasses_affected: bool,
    /// Names of non-private members that were added, removed, or changed.
    pub changed_members_names: BTreeSet<String>,
}

/// Compares old and new descriptors of the same declaration.
pub trait AbiComparator {
    /// Compares two versions of a class.
    fn compare_classes(&self, old: &ClassProtoData, new: &ClassProtoData) -> ClassDifference;

    /// Names of top-level members that differ between two versions of a
    /// file facade.
    fn compare_package_parts(
        &self,
        old: &PackagePartProtoData,
        new: &PackagePartProtoData,
    ) -> BTreeSet<String> {
        changed_member_names(&old.members, &new.members)
    }
}

/// Compares descriptors field by field.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralAbiComparator;

impl AbiComparator for StructuralAbiComparator {
    fn compare_classes(&self, old: &ClassProtoData, new: &ClassProtoData) -> ClassDifference {
        let hierarchy_changed = old.kind != new.kind
            || old.flags != new.flags
            || supertype_set(old) != supertype_set(new);
        let is_class_affected = hierarchy_changed
            || old.visibility != new.visibility
            || old.type_parameters != new.type_parameters;

        ClassDifference {
            is_class_affected,
            are_subclasses_affected: hierarchy_changed,
            changed_members_names: changed_member_names(&old.members, &new.members),
        }
    }
}

fn supertype_set(class: &ClassProtoData) -> BTreeSet<&str> {
    class.supertypes.iter().map(|s| s.as_str()).collect()
}

type Shape<'a> = (MemberKind, &'a str, Visibility);

/// Groups non-private members by name. Overloads share a name, so a name
/// maps to every shape declared under it.
fn shapes_by_name(members: &[Member]) -> BTreeMap<&str, BTreeSet<Shape<'_>>> {
    let mut by_name: BTreeMap<&str, BTreeSet<Shape<'_>>> = BTreeMap::new();
    for member in members.iter().filter(|m| m.visibility.is_non_private()) {
        by_name
            .entry(member.name.as_str())
            .or_default()
            .insert((member.kind, member.signature.as_str(), member.visibility));
    }
    by_name
}

/// Names whose set of non-private shapes differs between `old` and `new`.
pub fn changed_member_names(old: &[Member], new: &[Member]) -> BTreeSet<String> {
    let old = shapes_by_name(old);
    let new = shapes_by_name(new);
    old.keys()
        .chain(new.keys())
        .filter(|name| old.get(*name) != new.get(*name))
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use delta_common::{ClassKind, NameTableKind};

    fn fun(name: &str, sig: &str) -> Member {
        Member::public(name, MemberKind::Function, sig)
    }

    #[test]
    fn identical_classes_are_unchanged() {
        let class = ClassProtoData::new(ClassKind::Class).with_member(fun("bar", "(): Int"));
        let diff = StructuralAbiComparator.compare_classes(&class, &class.clone());
        assert_eq!(diff, ClassDifference::default());
    }

    #[test]
    fn added_member_is_a_member_change_only() {
        let old = ClassProtoData::new(ClassKind::Class).with_member(fun("bar", "(): Int"));
        let new = old.clone().with_member(fun("baz", "(): Unit"));
        let diff = StructuralAbiComparator.compare_classes(&old, &new);
        assert!(!diff.is_class_affected);
        assert_eq!(diff.changed_members_names, BTreeSet::from(["baz".to_string()]));
    }

    #[test]
    fn private_members_are_ignored() {
        let old = ClassProtoData::new(ClassKind::Class);
        let new = old
            .clone()
            .with_member(Member::private("helper", MemberKind::Function, "(): Unit"));
        let diff = StructuralAbiComparator.compare_classes(&old, &new);
        assert!(diff.changed_members_names.is_empty());
    }

    #[test]
    fn becoming_private_is_a_removal() {
        let old = ClassProtoData::new(ClassKind::Class).with_member(fun("bar", "(): Int"));
        let new = ClassProtoData::new(ClassKind::Class)
            .with_member(Member::private("bar", MemberKind::Function, "(): Int"));
        let diff = StructuralAbiComparator.compare_classes(&old, &new);
        assert_eq!(diff.changed_members_names, BTreeSet::from(["bar".to_string()]));
    }

    #[test]
    fn overload_change_marks_the_name() {
        let old = ClassProtoData::new(ClassKind::Class)
            .with_member(fun("f", "(Int): Unit"))
            .with_member(fun("f", "(String): Unit"));
        let new = ClassProtoData::new(ClassKind::Class).with_member(fun("f", "(Int): Unit"));
        let diff = StructuralAbiComparator.compare_classes(&old, &new);
        assert_eq!(diff.changed_members_names, BTreeSet::from(["f".to_string()]));
    }

    #[test]
    fn supertype_change_affects_subclasses() {
        let old = ClassProtoData::new(ClassKind::Class);
        let new = old.clone().with_supertype("a.Base");
        let diff = StructuralAbiComparator.compare_classes(&old, &new);
        assert!(diff.is_class_affected);
        assert!(diff.are_subclasses_affected);
    }

    #[test]
    fn visibility_change_does_not_affect_subclasses() {
        let old = ClassProtoData::new(ClassKind::Class);
        let mut new = old.clone();
        new.visibility = Visibility::Internal;
        let diff = StructuralAbiComparator.compare_classes(&old, &new);
        assert!(diff.is_class_affected);
        assert!(!diff.are_subclasses_affected);
    }

    #[test]
    fn name_table_representation_is_not_abi() {
        let old = ClassProtoData::new(ClassKind::Class).with_member(fun("bar", "(): Int"));
        let mut new = old.clone();
        new.name_table = NameTableKind::Qualified;
        assert_eq!(
            StructuralAbiComparator.compare_classes(&old, &new),
            ClassDifference::default()
        );
    }

    #[test]
    fn package_part_members() {
        let old = PackagePartProtoData::new(vec![fun("top", "(): Int")]);
        let new = PackagePartProtoData::new(vec![fun("top", "(): Long"), fun("other", "(): Int")]);
        assert_eq!(
            StructuralAbiComparator.compare_package_parts(&old, &new),
            BTreeSet::from(["other".to_string(), "top".to_string()])
        );
    }
}
