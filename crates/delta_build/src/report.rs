//! Build event reporting.
//!
//! The engine reports what it decided and why through a [`BuildReporter`].
//! [`TracingReporter`] forwards every event to `tracing`; [`RecordingReporter`]
//! keeps them in memory so callers and tests can inspect or render them.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::compiler::ExitCode;
use crate::error::{BuildError, RebuildReason};

/// Receives structured events from the build driver.
pub trait BuildReporter {
    /// `files` were added to the dirty set because of `reason`.
    fn marked_dirty(&self, files: &BTreeSet<PathBuf>, reason: &str);

    /// One compilation round finished.
    fn compile_iteration(&self, incremental: bool, sources: &[PathBuf], exit_code: ExitCode);

    /// The engine is falling back to a full rebuild.
    fn rebuild(&self, reason: &RebuildReason);

    /// An incremental attempt failed with a recoverable error.
    fn incremental_failure(&self, error: &BuildError);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl BuildReporter for TracingReporter {
    fn marked_dirty(&self, files: &BTreeSet<PathBuf>, reason: &str) {
        for file in files {
            debug!(file = %file.display(), reason, "marked dirty");
        }
    }

    fn compile_iteration(&self, incremental: bool, sources: &[PathBuf], exit_code: ExitCode) {
        info!(incremental, sources = sources.len(), ?exit_code, "compile iteration");
    }

    fn rebuild(&self, reason: &RebuildReason) {
        info!(%reason, "non-incremental compilation will be performed");
    }

    fn incremental_failure(&self, error: &BuildError) {
        warn!(%error, "incremental compilation failed");
    }
}

/// A reported event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// Files added to the dirty set.
    MarkedDirty {
        /// The files.
        files: BTreeSet<PathBuf>,
        /// Why.
        reason: String,
    },
    /// A finished compilation round.
    CompileIteration {
        /// Whether the round was part of an incremental build.
        incremental: bool,
        /// Sources handed to the compiler.
        sources: Vec<PathBuf>,
        /// The round's result.
        exit_code: ExitCode,
    },
    /// A fallback to a full rebuild.
    Rebuild(RebuildReason),
    /// A recoverable incremental failure, rendered.
    IncrementalFailure(String),
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: RefCell<Vec<BuildEvent>>,
}

impl RecordingReporter {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every event so far.
    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.borrow().clone()
    }

    /// Drops recorded events.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Rebuild reasons, in order.
    pub fn rebuild_reasons(&self) -> Vec<RebuildReason> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                BuildEvent::Rebuild(reason) => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    /// Sources of each compilation round, in order.
    pub fn compiled_rounds(&self) -> Vec<Vec<PathBuf>> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                BuildEvent::CompileIteration { sources, .. } => Some(sources.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: BuildEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl BuildReporter for RecordingReporter {
    fn marked_dirty(&self, files: &BTreeSet<PathBuf>, reason: &str) {
        self.push(BuildEvent::MarkedDirty {
            files: files.clone(),
            reason: reason.to_string(),
        });
    }

    fn compile_iteration(&self, incremental: bool, sources: &[PathBuf], exit_code: ExitCode) {
        self.push(BuildEvent::CompileIteration {
            incremental,
            sources: sources.to_vec(),
            exit_code,
        });
    }

    fn rebuild(&self, reason: &RebuildReason) {
        self.push(BuildEvent::Rebuild(reason.clone()));
    }

    fn incremental_failure(&self, error: &BuildError) {
        self.push(BuildEvent::IncrementalFailure(error.to_string()));
    }
}
