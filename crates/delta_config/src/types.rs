//! Configuration types deserialized from `delta.toml`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default number of builds retained in a module's build history.
pub const DEFAULT_HISTORY_RETENTION: usize = 10;

/// Settings for one incremental compilation unit (a module).
#[derive(Debug, Clone, Deserialize)]
pub struct IncrementalConfig {
    /// Directory holding caches, snapshots, build info and history.
    pub working_dir: PathBuf,
    /// Directory compiled outputs are written to.
    pub destination_dir: PathBuf,
    /// Every directory cleaned before a full rebuild. When absent, the
    /// working and destination directories are cleaned.
    #[serde(default)]
    pub output_dirs: Option<Vec<PathBuf>>,
    /// File extensions recognized as compilable sources.
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
    /// Classpath entries (jars or output directories of other modules).
    #[serde(default)]
    pub classpath: Vec<PathBuf>,
    /// Track classpath changes by diffing ABI snapshots instead of replaying
    /// the producers' build histories, and maintain this module's own
    /// snapshot.
    #[serde(default)]
    pub abi_snapshot: bool,
    /// Back up every file touched during an incremental attempt so a failed
    /// attempt leaves the previous durable state untouched.
    #[serde(default)]
    pub precise_backup: bool,
    /// Skip fsync when flushing caches.
    #[serde(default)]
    pub keep_caches_in_memory: bool,
    /// Number of builds retained in the build history.
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,
}

fn default_source_extensions() -> Vec<String> {
    vec!["kt".to_string(), "kts".to_string()]
}

fn default_history_retention() -> usize {
    DEFAULT_HISTORY_RETENTION
}

impl IncrementalConfig {
    /// A configuration with defaults for everything but the two required
    /// directories.
    pub fn new(working_dir: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            destination_dir: destination_dir.into(),
            output_dirs: None,
            source_extensions: default_source_extensions(),
            classpath: Vec::new(),
            abi_snapshot: false,
            precise_backup: false,
            keep_caches_in_memory: false,
            history_retention: DEFAULT_HISTORY_RETENTION,
        }
    }

    /// Directories to clean before a full rebuild.
    pub fn dirs_to_clean(&self) -> Vec<PathBuf> {
        match &self.output_dirs {
            Some(dirs) => dirs.clone(),
            None => vec![self.destination_dir.clone(), self.working_dir.clone()],
        }
    }

    /// Returns `true` if `path` has one of the recognized source extensions.
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.source_extensions.iter().any(|s| s.eq_ignore_ascii_case(ext)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = IncrementalConfig::new("/w", "/out");
        assert_eq!(cfg.history_retention, 10);
        assert!(!cfg.abi_snapshot);
        assert_eq!(cfg.source_extensions, vec!["kt", "kts"]);
    }

    #[test]
    fn dirs_to_clean_defaults_to_main_dirs() {
        let cfg = IncrementalConfig::new("/w", "/out");
        assert_eq!(
            cfg.dirs_to_clean(),
            vec![PathBuf::from("/out"), PathBuf::from("/w")]
        );
    }

    #[test]
    fn source_file_recognition() {
        let cfg = IncrementalConfig::new("/w", "/out");
        assert!(cfg.is_source_file(Path::new("src/a.kt")));
        assert!(cfg.is_source_file(Path::new("build.KTS")));
        assert!(!cfg.is_source_file(Path::new("src/A.java")));
        assert!(!cfg.is_source_file(Path::new("README")));
    }
}
