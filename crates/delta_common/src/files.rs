//! File-level change descriptions exchanged with the build system and the
//! compiler.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Source and classpath changes since the last build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangedFiles {
    /// The exact set of changes is known.
    Known {
        /// Files added or modified.
        modified: BTreeSet<PathBuf>,
        /// Files deleted.
        removed: BTreeSet<PathBuf>,
        /// When set, the lists only describe dependency (classpath) changes
        /// and source changes must still be detected from fingerprints.
        for_dependencies: bool,
    },
    /// The build system could not tell what changed.
    Unknown,
}

impl ChangedFiles {
    /// Known changes with `for_dependencies` unset.
    pub fn known(
        modified: impl IntoIterator<Item = PathBuf>,
        removed: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        ChangedFiles::Known {
            modified: modified.into_iter().collect(),
            removed: removed.into_iter().collect(),
            for_dependencies: false,
        }
    }
}

/// An output produced by the compiler and the sources it was produced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// The output file.
    pub output: PathBuf,
    /// Sources that contributed to the output.
    pub sources: Vec<PathBuf>,
}

impl GeneratedFile {
    /// Creates a generated-file record.
    pub fn new(output: impl Into<PathBuf>, sources: Vec<PathBuf>) -> Self {
        Self {
            output: output.into(),
            sources,
        }
    }
}
