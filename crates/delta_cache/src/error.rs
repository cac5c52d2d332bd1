//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur while reading, writing, or managing persistent
/// incremental state.
///
/// Reads of snapshots, build info, and build history are fail-safe at their
/// call sites: these errors are turned into "absent" and the engine falls
/// back to a full rebuild. `Closed`, `AlreadyClosed`, and `Corrupted` signal
/// misuse or a broken invariant and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing a cache file.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A persisted file has an invalid or missing header.
    #[error("invalid header in {path}: {reason}")]
    InvalidHeader {
        /// The file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The file path.
        path: PathBuf,
        /// The checksum recorded in the header.
        expected: String,
        /// The checksum computed from the payload.
        actual: String,
    },

    /// The file format version does not match the current version.
    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The file path.
        path: PathBuf,
        /// The expected format version.
        expected: u32,
        /// The version found in the file.
        actual: u32,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },

    /// An ABI snapshot could not be read; it is treated as absent.
    #[error("unreadable ABI snapshot {path}: {reason}")]
    UnreadableSnapshot {
        /// The snapshot file.
        path: PathBuf,
        /// Why it could not be read.
        reason: String,
    },

    /// A cache was accessed after its manager was closed.
    #[error("cache manager is closed; cannot {operation}")]
    Closed {
        /// The attempted operation.
        operation: &'static str,
    },

    /// `close` was called on an already-closed cache manager.
    #[error("cache manager was already closed")]
    AlreadyClosed,

    /// An in-memory cache invariant does not hold.
    #[error("cache corruption: {reason}")]
    Corrupted {
        /// Which invariant failed.
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
