//! Transactional durable writes.
//!
//! Every durable change made during a build (snapshots, build info, build
//! history, cache flushes, the recovery marker, deletion of stale outputs)
//! goes through a [`Transaction`]. Files are always replaced atomically by
//! writing a sibling temporary file and renaming it into place. The
//! recoverable discipline additionally backs up the previous contents of
//! every touched path and restores them unless the transaction was marked
//! successful before it finished.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::CacheError;

/// Which transaction discipline to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Back up touched files and roll back on failure.
    Recoverable,
    /// Write in place; a failed attempt keeps whatever was written.
    NonRecoverable,
}

/// How a finished transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The staged changes are now the durable state.
    Committed,
    /// Previous contents were restored.
    RolledBack,
    /// The transaction failed but its discipline cannot roll back.
    Abandoned,
}

/// A scope for durable writes that commits or discards as a unit.
pub trait Transaction {
    /// Atomically replaces `path` with `bytes`, creating parent directories.
    /// With `sync` set, the data is fsynced before the rename.
    fn write_bytes(&mut self, path: &Path, bytes: &[u8], sync: bool) -> Result<(), CacheError>;

    /// Atomically replaces `path` with UTF-8 `text`.
    fn write_text(&mut self, path: &Path, text: &str) -> Result<(), CacheError> {
        self.write_bytes(path, text.as_bytes(), true)
    }

    /// Deletes `path` if it exists.
    fn delete_file(&mut self, path: &Path) -> Result<(), CacheError>;

    /// Records the current state of `path`, which someone other than this
    /// transaction is about to create or overwrite, so that a rollback
    /// restores it.
    fn register_added_or_changed(&mut self, path: &Path) -> Result<(), CacheError>;

    /// Records that `path` was created during this transaction and did not
    /// exist before it, unless its previous state is already recorded.
    fn register_created(&mut self, path: &Path);

    /// Marks the overall attempt as successful; `finish` will commit.
    fn mark_successful(&mut self);

    /// Returns `true` once `mark_successful` has been called.
    fn is_successful(&self) -> bool;

    /// Commits or discards the transaction. Calling it twice is a no-op that
    /// returns the first outcome.
    fn finish(&mut self) -> Result<TransactionOutcome, CacheError>;
}

/// Creates a transaction of the requested discipline.
pub fn create_transaction(mode: TransactionMode) -> Result<Box<dyn Transaction>, CacheError> {
    Ok(match mode {
        TransactionMode::Recoverable => Box::new(RecoverableTransaction::new()?),
        TransactionMode::NonRecoverable => Box::new(NonRecoverableTransaction::new()),
    })
}

fn atomic_write(path: &Path, bytes: &[u8], sync: bool) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    {
        let mut file = fs::File::create(&tmp).map_err(|e| CacheError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| CacheError::io(&tmp, e))?;
        if sync {
            file.sync_all().map_err(|e| CacheError::io(&tmp, e))?;
        }
    }
    fs::rename(&tmp, path).map_err(|e| CacheError::io(path, e))
}

fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

/// Writes directly into place. Cheap, but a failed attempt cannot be undone;
/// used when the next step is a full rebuild from scratch anyway.
#[derive(Debug, Default)]
pub struct NonRecoverableTransaction {
    successful: bool,
    outcome: Option<TransactionOutcome>,
}

impl NonRecoverableTransaction {
    /// Creates a new transaction.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transaction for NonRecoverableTransaction {
    fn write_bytes(&mut self, path: &Path, bytes: &[u8], sync: bool) -> Result<(), CacheError> {
        atomic_write(path, bytes, sync)
    }

    fn delete_file(&mut self, path: &Path) -> Result<(), CacheError> {
        remove_if_exists(path)
    }

    fn register_added_or_changed(&mut self, _path: &Path) -> Result<(), CacheError> {
        Ok(())
    }

    fn register_created(&mut self, _path: &Path) {}

    fn mark_successful(&mut self) {
        self.successful = true;
    }

    fn is_successful(&self) -> bool {
        self.successful
    }

    fn finish(&mut self) -> Result<TransactionOutcome, CacheError> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        let outcome = if self.successful {
            TransactionOutcome::Committed
        } else {
            warn!("non-recoverable transaction failed; partial writes are kept");
            TransactionOutcome::Abandoned
        };
        self.outcome = Some(outcome);
        Ok(outcome)
    }
}

/// Backs up the previous contents of every path before touching it, and
/// restores them on `finish` unless the transaction was marked successful.
pub struct RecoverableTransaction {
    backup_dir: tempfile::TempDir,
    /// Original path → backup copy, or `None` if the path did not exist.
    stashed: BTreeMap<PathBuf, Option<PathBuf>>,
    successful: bool,
    outcome: Option<TransactionOutcome>,
}

impl RecoverableTransaction {
    /// Creates a transaction backed by a fresh temporary directory.
    pub fn new() -> Result<Self, CacheError> {
        let backup_dir = tempfile::Builder::new()
            .prefix("delta-backups")
            .tempdir()
            .map_err(|e| CacheError::io(std::env::temp_dir(), e))?;
        Ok(Self {
            backup_dir,
            stashed: BTreeMap::new(),
            successful: false,
            outcome: None,
        })
    }

    fn stash(&mut self, path: &Path) -> Result<(), CacheError> {
        if self.stashed.contains_key(path) {
            return Ok(());
        }
        let backup = if path.is_file() {
            let backup = self
                .backup_dir
                .path()
                .join(format!("{}.bak", self.stashed.len()));
            fs::copy(path, &backup).map_err(|e| CacheError::io(path, e))?;
            Some(backup)
        } else {
            None
        };
        self.stashed.insert(path.to_path_buf(), backup);
        Ok(())
    }

    fn restore(&self) -> Result<(), CacheError> {
        for (original, backup) in &self.stashed {
            match backup {
                Some(backup) => {
                    if let Some(parent) = original.parent() {
                        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
                    }
                    fs::copy(backup, original).map_err(|e| CacheError::io(original, e))?;
                }
                None => remove_if_exists(original)?,
            }
        }
        Ok(())
    }

    /// Number of distinct paths touched so far.
    pub fn touched_paths(&self) -> usize {
        self.stashed.len()
    }
}

impl Transaction for RecoverableTransaction {
    fn write_bytes(&mut self, path: &Path, bytes: &[u8], sync: bool) -> Result<(), CacheError> {
        self.stash(path)?;
        atomic_write(path, bytes, sync)
    }

    fn delete_file(&mut self, path: &Path) -> Result<(), CacheError> {
        self.stash(path)?;
        remove_if_exists(path)
    }

    fn register_added_or_changed(&mut self, path: &Path) -> Result<(), CacheError> {
        self.stash(path)
    }

    fn register_created(&mut self, path: &Path) {
        self.stashed.entry(path.to_path_buf()).or_insert(None);
    }

    fn mark_successful(&mut self) {
        self.successful = true;
    }

    fn is_successful(&self) -> bool {
        self.successful
    }

    fn finish(&mut self) -> Result<TransactionOutcome, CacheError> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        let outcome = if self.successful {
            TransactionOutcome::Committed
        } else {
            debug!(paths = self.stashed.len(), "restoring files touched by failed attempt");
            self.restore()?;
            TransactionOutcome::RolledBack
        };
        self.outcome = Some(outcome);
        Ok(outcome)
    }
}
