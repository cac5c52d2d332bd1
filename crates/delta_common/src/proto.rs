//! Per-declaration ABI descriptors.
//!
//! A `ProtoData` summarizes the externally visible shape of one top-level
//! declaration: the member signatures of a class, or the top-level
//! functions and properties of a file facade. Snapshots map
//! [`DeclarationId`]s to these descriptors, and diffs between two of them
//! decide what must be recompiled.

use serde::{Deserialize, Serialize};

use crate::name::DeclarationId;

/// Which in-memory name representation produced a descriptor.
///
/// Descriptors read from a flat string table and those built from a table of
/// qualified-name segments are semantically identical; the distinction only
/// selects the payload encoding used when the snapshot is written back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameTableKind {
    /// Every string stored once in a flat table.
    #[default]
    Flat,
    /// Qualified names stored as `(parent, segment)` chains.
    Qualified,
}

/// Declared visibility of a class or member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Visible everywhere.
    Public,
    /// Visible to subclasses.
    Protected,
    /// Visible within the module.
    Internal,
    /// Visible only within the declaring scope.
    Private,
}

impl Visibility {
    /// Returns `true` unless the visibility is `Private`.
    pub fn is_non_private(self) -> bool {
        !matches!(self, Visibility::Private)
    }
}

/// The kind of a class-like declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassKind {
    /// A regular, abstract, open, or sealed class.
    Class,
    /// An interface.
    Interface,
    /// An enum class.
    EnumClass,
    /// An annotation class.
    AnnotationClass,
    /// A singleton object.
    Object,
}

/// The kind of a member signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    /// A function.
    Function,
    /// A property.
    Property,
    /// A constructor.
    Constructor,
    /// A type alias.
    TypeAlias,
    /// A nested class.
    NestedClass,
    /// An enum entry.
    EnumEntry,
}

/// One member of a class or file facade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    /// Simple name; lookups are recorded under it.
    pub name: String,
    /// What kind of member this is.
    pub kind: MemberKind,
    /// Rendered signature (parameter and return types, modifiers). Two
    /// members with equal name, kind and signature are ABI-identical.
    pub signature: String,
    /// Declared visibility.
    pub visibility: Visibility,
}

impl Member {
    /// Creates a public member.
    pub fn public(name: impl Into<String>, kind: MemberKind, signature: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            signature: signature.into(),
            visibility: Visibility::Public,
        }
    }

    /// Creates a private member.
    pub fn private(name: impl Into<String>, kind: MemberKind, signature: impl Into<String>) -> Self {
        Self {
            visibility: Visibility::Private,
            ..Self::public(name, kind, signature)
        }
    }
}

/// ABI descriptor of a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassProtoData {
    /// Name representation that produced this descriptor.
    pub name_table: NameTableKind,
    /// Class visibility.
    pub visibility: Visibility,
    /// Class kind.
    pub kind: ClassKind,
    /// Modifier flags as a bitset (see the `FLAG_*` constants).
    pub flags: u32,
    /// Direct supertypes.
    pub supertypes: Vec<DeclarationId>,
    /// Type parameter names and bounds, rendered.
    pub type_parameters: Vec<String>,
    /// Members in declaration order.
    pub members: Vec<Member>,
}

impl ClassProtoData {
    /// The class is `sealed`.
    pub const FLAG_SEALED: u32 = 1 << 0;
    /// The class is `open`.
    pub const FLAG_OPEN: u32 = 1 << 1;
    /// The class is `abstract`.
    pub const FLAG_ABSTRACT: u32 = 1 << 2;
    /// The class is a `data` class.
    pub const FLAG_DATA: u32 = 1 << 3;
    /// The class is `inline`/value.
    pub const FLAG_INLINE: u32 = 1 << 4;
    /// The interface is a functional (`fun`) interface.
    pub const FLAG_FUN_INTERFACE: u32 = 1 << 5;

    /// A public final class with no supertypes or members.
    pub fn new(kind: ClassKind) -> Self {
        Self {
            name_table: NameTableKind::Flat,
            visibility: Visibility::Public,
            kind,
            flags: 0,
            supertypes: Vec::new(),
            type_parameters: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Builder-style member addition.
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    /// Builder-style supertype addition.
    pub fn with_supertype(mut self, supertype: impl Into<DeclarationId>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    /// Builder-style flag addition.
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    /// Returns `true` if the `sealed` flag is set.
    pub fn is_sealed(&self) -> bool {
        self.flags & Self::FLAG_SEALED != 0
    }

    /// Names of non-private members, deduplicated, in declaration order.
    pub fn non_private_member_names(&self) -> Vec<&str> {
        non_private_names(&self.members)
    }
}

/// ABI descriptor of a file facade: its top-level callables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackagePartProtoData {
    /// Name representation that produced this descriptor.
    pub name_table: NameTableKind,
    /// Top-level functions, properties and type aliases.
    pub members: Vec<Member>,
}

impl PackagePartProtoData {
    /// A file facade with the given members.
    pub fn new(members: Vec<Member>) -> Self {
        Self {
            name_table: NameTableKind::Flat,
            members,
        }
    }

    /// Names of non-private top-level members, deduplicated.
    pub fn non_private_member_names(&self) -> Vec<&str> {
        non_private_names(&self.members)
    }
}

fn non_private_names(members: &[Member]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for member in members {
        if member.visibility.is_non_private() && !names.contains(&member.name.as_str()) {
            names.push(&member.name);
        }
    }
    names
}

/// ABI descriptor of one top-level declaration.
///
/// A declaration id maps to exactly one variant within a snapshot. Seeing a
/// class and a file facade under the same id across two snapshots is an
/// inconsistency the diff engine refuses to handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtoData {
    /// A class.
    Class(ClassProtoData),
    /// A file facade.
    PackagePart(PackagePartProtoData),
}

impl ProtoData {
    /// Flag written before the payload in persisted snapshots.
    pub fn variant_flag(&self) -> u8 {
        match self {
            ProtoData::Class(_) => 0,
            ProtoData::PackagePart(_) => 1,
        }
    }

    /// Human-readable variant name for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            ProtoData::Class(_) => "class",
            ProtoData::PackagePart(_) => "package part",
        }
    }

    /// The name representation that produced this descriptor.
    pub fn name_table(&self) -> NameTableKind {
        match self {
            ProtoData::Class(c) => c.name_table,
            ProtoData::PackagePart(p) => p.name_table,
        }
    }
}
