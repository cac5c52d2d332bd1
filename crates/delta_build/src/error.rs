//! Error types and rebuild reasons for the build driver.

use std::fmt;
use std::path::PathBuf;

use delta_cache::CacheError;
use delta_common::DeclarationId;
use delta_config::ConfigError;

/// Why the engine gave up on an incremental build and fell back to a full
/// rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    /// The build system could not say which files changed.
    UnknownChanges,
    /// There is no usable record of a previous successful build.
    NoBuildHistory,
    /// ABI-snapshot mode is on but a snapshot could not be read.
    NoAbiSnapshot,
    /// A classpath entry disappeared.
    ClasspathEntryRemoved,
    /// A modified classpath entry could not be mapped to a build history.
    HistoryNotFound,
    /// A dependency's build history could not be read.
    HistoryUnreadable,
    /// A dependency's build history has no build at or before the last
    /// successful build of this module.
    HistoryNoKnownBuilds,
    /// A dependency was fully rebuilt since the last successful build.
    HistoryDiscontinuity,
    /// The last build recorded no snapshot for this classpath entry.
    MissingClasspathSnapshot(String),
    /// Computing source or classpath changes failed.
    FailedToGetChangedFiles,
    /// Computing the initial dirty set failed.
    FailedToComputeFilesToRecompile,
    /// The incremental compilation rounds failed.
    FailedToCompileIncrementally,
    /// Flushing caches at the end of the attempt failed.
    FailedToCloseCaches,
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildReason::UnknownChanges => f.write_str("unknown changes in inputs"),
            RebuildReason::NoBuildHistory => f.write_str("no previous build history"),
            RebuildReason::NoAbiSnapshot => f.write_str("ABI snapshot is unavailable"),
            RebuildReason::ClasspathEntryRemoved => f.write_str("a classpath entry was removed"),
            RebuildReason::HistoryNotFound => {
                f.write_str("build history of a modified dependency was not found")
            }
            RebuildReason::HistoryUnreadable => {
                f.write_str("build history of a modified dependency is unreadable")
            }
            RebuildReason::HistoryNoKnownBuilds => {
                f.write_str("dependency history has no build known to this module")
            }
            RebuildReason::HistoryDiscontinuity => {
                f.write_str("dependency was rebuilt non-incrementally")
            }
            RebuildReason::MissingClasspathSnapshot(dep) => {
                write!(f, "no recorded ABI snapshot for classpath entry {dep}")
            }
            RebuildReason::FailedToGetChangedFiles => f.write_str("failed to get changed files"),
            RebuildReason::FailedToComputeFilesToRecompile => {
                f.write_str("failed to compute files to recompile")
            }
            RebuildReason::FailedToCompileIncrementally => {
                f.write_str("incremental compilation failed")
            }
            RebuildReason::FailedToCloseCaches => f.write_str("failed to close caches"),
        }
    }
}

/// Errors raised while driving a build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A cache, snapshot, or transaction operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The module configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// One declaration appears as a class in one snapshot and as a package
    /// part in the other.
    #[error("declaration {id} is a {old} in the old snapshot but a {new} in the new one")]
    MismatchedProtoVariants {
        /// The offending declaration.
        id: DeclarationId,
        /// Variant in the old snapshot.
        old: &'static str,
        /// Variant in the new snapshot.
        new: &'static str,
    },

    /// The compiler collaborator failed outright (as opposed to reporting
    /// compilation errors through its exit code).
    #[error("compiler failed: {reason}")]
    Compiler {
        /// What the compiler reported.
        reason: String,
    },

    /// A filesystem operation outside the caches failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if the error reflects misuse or a broken invariant and
    /// must propagate instead of triggering a full rebuild.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BuildError::MismatchedProtoVariants { .. }
                | BuildError::Cache(
                    CacheError::Closed { .. } | CacheError::AlreadyClosed | CacheError::Corrupted { .. }
                )
        )
    }
}
