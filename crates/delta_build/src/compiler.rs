//! The compiler collaborator and what it reports back.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use delta_cache::DeclarationOutput;
use delta_common::{DeclarationId, GeneratedFile, LookupSymbol};

/// Result of one compiler invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitCode {
    /// Compiled without errors.
    #[default]
    Ok,
    /// The sources have errors.
    CompilationError,
    /// The compiler itself failed.
    InternalError,
}

/// Errors a compiler invocation can end with instead of an exit code.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The build was canceled; the engine treats this as a clean no-op.
    #[error("compilation was canceled")]
    Canceled,

    /// The compiler could not run.
    #[error("{reason}")]
    Failed {
        /// What went wrong.
        reason: String,
    },
}

/// Cooperative cancellation, checked by the compiler between units of work.
pub trait CancellationStatus {
    /// Returns `true` once cancellation was requested.
    fn is_canceled(&self) -> bool;

    /// Returns [`CompileError::Canceled`] once cancellation was requested.
    fn check_canceled(&self) -> Result<(), CompileError> {
        if self.is_canceled() {
            Err(CompileError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// A status that is never canceled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCanceled;

impl CancellationStatus for NeverCanceled {
    fn is_canceled(&self) -> bool {
        false
    }
}

/// Receives every output path before the compiler writes it, so that a
/// build attempt that later fails can put the previous file back.
pub trait OutputRegistrar {
    /// Called before `path` is created or overwritten.
    fn register_output(&self, path: &Path) -> Result<(), CompileError>;
}

/// Registrar for callers with nothing to roll back.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreOutputs;

impl OutputRegistrar for IgnoreOutputs {
    fn register_output(&self, _path: &Path) -> Result<(), CompileError> {
        Ok(())
    }
}

/// Context handed to the compiler for one round.
pub struct Services<'a> {
    /// Cancellation status to poll.
    pub cancellation: &'a dyn CancellationStatus,
    /// Where output paths are registered before they are written.
    pub outputs: &'a dyn OutputRegistrar,
    /// Every file considered dirty this round, including removed ones.
    pub dirty_sources: &'a BTreeSet<PathBuf>,
    /// Whether the round belongs to an incremental build.
    pub is_incremental: bool,
}

/// Everything the engine needs from a successful (or failed) round.
#[derive(Debug, Clone, Default)]
pub struct CompilationOutcome {
    /// The round's result. Caches are only updated on [`ExitCode::Ok`].
    pub exit_code: ExitCode,
    /// Files written, with the sources each came from.
    pub generated_files: Vec<GeneratedFile>,
    /// The ABI descriptor of every declaration in the compiled sources.
    pub declarations: Vec<DeclarationOutput>,
    /// Lookups recorded while compiling, with the file they came from.
    pub lookups: Vec<(LookupSymbol, PathBuf)>,
    /// Pairs of files that must always be compiled together.
    pub complementary_files: Vec<(PathBuf, PathBuf)>,
    /// Files an inspection of the generated output found must join this
    /// round. Non-empty requests an extra pass before anything is committed.
    pub extra_dirty_files: BTreeSet<PathBuf>,
}

impl CompilationOutcome {
    /// A failed round.
    pub fn failed(exit_code: ExitCode) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }
}

/// Compiles sources on behalf of the engine.
pub trait Compiler {
    /// Compiles `sources`.
    fn compile(
        &mut self,
        sources: &[PathBuf],
        services: &Services<'_>,
    ) -> Result<CompilationOutcome, CompileError>;

    /// Declarations currently found in `files` by a front-end pass, used to
    /// spot removed classes before the first round. `None` means the
    /// compiler cannot tell; removals are then detected after the round.
    fn declared_classes(&mut self, _files: &BTreeSet<PathBuf>) -> Option<BTreeSet<DeclarationId>> {
        None
    }
}
