//! Shared vocabulary for the Delta incremental build engine.
//!
//! This crate provides the types every other layer speaks in: declaration
//! identifiers, lookup symbols, the `DirtyData` unit of invalidation, the
//! per-declaration ABI descriptors (`ProtoData`), content hashing, and the
//! description of file-level changes handed in by a build system.

#![warn(missing_docs)]

pub mod dirty;
pub mod files;
pub mod hash;
pub mod name;
pub mod proto;

pub use dirty::DirtyData;
pub use files::{ChangedFiles, GeneratedFile};
pub use hash::ContentHash;
pub use name::{DeclarationId, LookupSymbol, SAM_LOOKUP_NAME};
pub use proto::{
    ClassKind, ClassProtoData, Member, MemberKind, NameTableKind, PackagePartProtoData, ProtoData,
    Visibility,
};
