//! Incremental recompilation driver for Delta.
//!
//! Given a module's sources, the classpath it compiles against, and a
//! [`Compiler`], [`IncrementalRunner`] decides which files must be
//! recompiled after a change and drives compilation rounds until the dirty
//! set settles:
//!
//! 1. changed sources and the ABI impact of classpath changes seed the
//!    dirty set ([`classpath`], [`diff`]);
//! 2. each round compiles the dirty files and compares the declarations it
//!    produced with the cached ones ([`changes`], [`abi`]);
//! 3. files referencing a changed symbol, or declaring a subtype of a
//!    changed class, become dirty for the next round ([`dirty_set`]).
//!
//! When the engine cannot prove incremental state consistent it reports a
//! [`RebuildReason`] and rebuilds the module from empty caches.

#![warn(missing_docs)]

pub mod abi;
pub mod changes;
pub mod classpath;
pub mod compiler;
pub mod diff;
pub mod dirty_set;
pub mod error;
pub mod report;
pub mod runner;

pub use abi::{AbiComparator, ClassDifference, StructuralAbiComparator};
pub use changes::{ChangeInfo, ChangedSymbols, ChangesCollector};
pub use classpath::{
    dependency_key, ChangesEither, ClasspathChangeResolver, DirectoryModulesApiHistory,
    HistoryLookupError, IncrementalModuleEntry, ModulesApiHistory,
};
pub use compiler::{
    CancellationStatus, CompilationOutcome, CompileError, Compiler, ExitCode, IgnoreOutputs,
    NeverCanceled, OutputRegistrar, Services,
};
pub use diff::{AbiDiffEngine, DiffScope};
pub use dirty_set::DirtySetTracker;
pub use error::{BuildError, RebuildReason};
pub use report::{BuildEvent, BuildReporter, RecordingReporter, TracingReporter};
pub use runner::IncrementalRunner;
