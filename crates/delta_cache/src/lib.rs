//! Persistent state for incremental compilation.
//!
//! This crate owns everything the engine writes to disk between builds: ABI
//! snapshots, the last-build info, the bounded build history, and the
//! key/multi-value caches (source fingerprints, source→output associations,
//! the lookup index, and per-declaration platform metadata). All durable
//! writes go through a [`Transaction`] so that a failed attempt can leave the
//! previous state untouched.

#![warn(missing_docs)]

pub mod build_history;
pub mod build_info;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod fingerprint;
pub mod inputs;
pub mod lookup;
pub mod manager;
pub mod persistent;
pub mod platform;
pub mod snapshot;
pub mod transaction;

pub use build_history::{BuildDifference, BuildHistory};
pub use build_info::BuildInfo;
pub use error::CacheError;
pub use fingerprint::SourceFingerprintMap;
pub use inputs::InputsCache;
pub use lookup::LookupCache;
pub use manager::{CacheLifecycle, CacheManager, OpenCaches};
pub use persistent::PersistentMap;
pub use platform::{DeclarationCache, DeclarationOutput, PlatformCache, ProtoChange, SubtypeIndex};
pub use snapshot::{AbiSnapshot, SnapshotStore};
pub use transaction::{
    create_transaction, NonRecoverableTransaction, RecoverableTransaction, Transaction,
    TransactionMode,
};
