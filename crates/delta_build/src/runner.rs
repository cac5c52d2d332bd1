//! The round-based incremental build driver.
//!
//! [`IncrementalRunner::compile`] first tries to build incrementally: it
//! works out which sources changed, what classpath changes mean for this
//! module, and which files must therefore be recompiled, then runs
//! compilation rounds until a round produces no new dirty files. Whenever
//! the incremental path cannot prove its state consistent, or fails with a
//! recoverable error, it reports why and falls back to a full rebuild from
//! empty caches.
//!
//! Every durable write of an attempt, compiler outputs included, goes
//! through one transaction, so a failed incremental attempt under the
//! recoverable discipline leaves the previous build's state exactly as it
//! was.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use delta_cache::{
    create_transaction, AbiSnapshot, BuildDifference, BuildHistory, BuildInfo, CacheManager,
    DeclarationCache, PlatformCache, SnapshotStore, SubtypeIndex, Transaction, TransactionMode,
};
use delta_common::{ChangedFiles, DirtyData};
use delta_config::{load_config, IncrementalConfig};
use tracing::{debug, info, warn};

use crate::abi::{AbiComparator, StructuralAbiComparator};
use crate::changes::ChangesCollector;
use crate::classpath::{
    ChangesEither, ClasspathChangeResolver, DirectoryModulesApiHistory, ModulesApiHistory,
};
use crate::compiler::{
    CancellationStatus, CompileError, Compiler, ExitCode, NeverCanceled, OutputRegistrar, Services,
};
use crate::diff::{AbiDiffEngine, DiffScope};
use crate::dirty_set::DirtySetTracker;
use crate::error::{BuildError, RebuildReason};
use crate::report::{BuildReporter, TracingReporter};

/// Persistent maps, one subdirectory per cache.
pub const CACHES_DIR: &str = "caches";
/// Baseline of the last successful build.
pub const LAST_BUILD_INFO_FILE: &str = "last-build.bin";
/// This module's ABI snapshot.
pub const ABI_SNAPSHOT_FILE: &str = "abi-snapshot.bin";
/// This module's build history.
pub const BUILD_HISTORY_FILE: &str = "build-history.bin";
/// Files dirtied by an attempt that has not finished a successful round.
pub const DIRTY_SOURCES_FILE: &str = "dirty-sources.txt";

type Caches = CacheManager<DeclarationCache>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompilationMode {
    Incremental,
    Rebuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundsOutcome {
    Finished(ExitCode),
    Canceled,
}

#[derive(Debug)]
enum IncrementalResult {
    Completed(ExitCode),
    Canceled,
    RequiresRebuild(RebuildReason),
}

/// A recoverable-or-fatal error and the rebuild reason of the phase it
/// happened in.
#[derive(Debug)]
struct IncrementalFailure {
    reason: RebuildReason,
    error: BuildError,
}

fn failure<E: Into<BuildError>>(reason: RebuildReason) -> impl FnOnce(E) -> IncrementalFailure {
    move |error| IncrementalFailure {
        reason,
        error: error.into(),
    }
}

/// Shared, read-only state of one attempt's rounds.
struct RoundContext<'a> {
    config: &'a IncrementalConfig,
    reporter: &'a dyn BuildReporter,
    comparator: &'a dyn AbiComparator,
    cancellation: &'a dyn CancellationStatus,
}

/// Drives incremental builds of one module.
pub struct IncrementalRunner<R: BuildReporter = TracingReporter> {
    config: IncrementalConfig,
    reporter: R,
    comparator: Arc<dyn AbiComparator>,
    history: Arc<dyn ModulesApiHistory>,
    resolver: ClasspathChangeResolver,
    cancellation: Box<dyn CancellationStatus>,
}

impl IncrementalRunner<TracingReporter> {
    /// A runner that reports through `tracing`.
    pub fn new(config: IncrementalConfig) -> Self {
        Self::with_reporter(config, TracingReporter)
    }

    /// A runner configured from `<module_dir>/delta.toml`.
    pub fn from_module_dir(module_dir: &Path) -> Result<Self, BuildError> {
        Ok(Self::new(load_config(module_dir)?))
    }
}

impl<R: BuildReporter> IncrementalRunner<R> {
    /// A runner that reports through `reporter`.
    pub fn with_reporter(config: IncrementalConfig, reporter: R) -> Self {
        let comparator: Arc<dyn AbiComparator> = Arc::new(StructuralAbiComparator);
        let history: Arc<dyn ModulesApiHistory> = Arc::new(DirectoryModulesApiHistory::default());
        let resolver = ClasspathChangeResolver::new(
            Arc::clone(&history),
            AbiDiffEngine::new(Arc::clone(&comparator)),
            config.abi_snapshot,
        );
        Self {
            config,
            reporter,
            comparator,
            history,
            resolver,
            cancellation: Box::new(NeverCanceled),
        }
    }

    /// Uses `history` to map classpath entries to their producers.
    pub fn with_modules_history(mut self, history: Arc<dyn ModulesApiHistory>) -> Self {
        self.history = history;
        self.reset_resolver();
        self
    }

    /// Uses `comparator` for every ABI comparison.
    pub fn with_comparator(mut self, comparator: Arc<dyn AbiComparator>) -> Self {
        self.comparator = comparator;
        self.reset_resolver();
        self
    }

    /// Polls `cancellation` during compilation.
    pub fn with_cancellation(mut self, cancellation: Box<dyn CancellationStatus>) -> Self {
        self.cancellation = cancellation;
        self
    }

    fn reset_resolver(&mut self) {
        self.resolver = ClasspathChangeResolver::new(
            Arc::clone(&self.history),
            AbiDiffEngine::new(Arc::clone(&self.comparator)),
            self.config.abi_snapshot,
        );
    }

    /// The module configuration.
    pub fn config(&self) -> &IncrementalConfig {
        &self.config
    }

    /// The reporter.
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    fn working_file(&self, name: &str) -> PathBuf {
        self.config.working_dir.join(name)
    }

    fn round_context(&self) -> RoundContext<'_> {
        RoundContext {
            config: &self.config,
            reporter: &self.reporter,
            comparator: self.comparator.as_ref(),
            cancellation: self.cancellation.as_ref(),
        }
    }

    /// Builds the module.
    ///
    /// `changed_files` is what the build system knows changed; `None` makes
    /// the engine detect source and classpath-file changes from content
    /// fingerprints. Compilation errors are returned as an [`ExitCode`];
    /// `Err` is reserved for fatal errors and for failures of a full rebuild.
    pub fn compile(
        &mut self,
        all_sources: &[PathBuf],
        changed_files: Option<ChangedFiles>,
        compiler: &mut dyn Compiler,
    ) -> Result<ExitCode, BuildError> {
        let start_ts = now_millis();
        match self.try_compile_incrementally(all_sources, changed_files, compiler, start_ts) {
            Ok(IncrementalResult::Completed(exit_code)) => Ok(exit_code),
            Ok(IncrementalResult::Canceled) => Ok(ExitCode::Ok),
            Ok(IncrementalResult::RequiresRebuild(reason)) => {
                self.compile_non_incrementally(reason, all_sources, compiler, start_ts)
            }
            Err(failure) if failure.error.is_fatal() => Err(failure.error),
            Err(failure) => {
                self.reporter.incremental_failure(&failure.error);
                self.compile_non_incrementally(failure.reason, all_sources, compiler, start_ts)
            }
        }
    }

    fn try_compile_incrementally(
        &mut self,
        all_sources: &[PathBuf],
        changed_files: Option<ChangedFiles>,
        compiler: &mut dyn Compiler,
        start_ts: i64,
    ) -> Result<IncrementalResult, IncrementalFailure> {
        if matches!(changed_files, Some(ChangedFiles::Unknown)) {
            return Ok(IncrementalResult::RequiresRebuild(RebuildReason::UnknownChanges));
        }
        let Some(last_build_info) = BuildInfo::read(&self.working_file(LAST_BUILD_INFO_FILE)) else {
            return Ok(IncrementalResult::RequiresRebuild(RebuildReason::NoBuildHistory));
        };
        let module_snapshot = if self.config.abi_snapshot {
            match SnapshotStore::read(&self.working_file(ABI_SNAPSHOT_FILE)) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    debug!(error = %e, "module ABI snapshot is unusable");
                    return Ok(IncrementalResult::RequiresRebuild(RebuildReason::NoAbiSnapshot));
                }
            }
        } else {
            None
        };

        let mode = if self.config.precise_backup {
            TransactionMode::Recoverable
        } else {
            TransactionMode::NonRecoverable
        };
        let mut tx =
            create_transaction(mode).map_err(failure(RebuildReason::FailedToCompileIncrementally))?;
        let mut caches = match Caches::open(
            &self.working_file(CACHES_DIR),
            self.config.keep_caches_in_memory,
        ) {
            Ok(caches) => caches,
            Err(e) => {
                finish_quietly(tx.as_mut());
                return Err(failure(RebuildReason::FailedToGetChangedFiles)(e));
            }
        };

        let result = self.run_incremental(
            &mut caches,
            tx.as_mut(),
            all_sources,
            changed_files,
            &last_build_info,
            module_snapshot,
            compiler,
            start_ts,
        );

        match result {
            Ok(IncrementalResult::Completed(exit_code)) => {
                if let Err(e) = caches.close(tx.as_mut()) {
                    finish_quietly(tx.as_mut());
                    return Err(failure(RebuildReason::FailedToCloseCaches)(e));
                }
                if exit_code == ExitCode::Ok {
                    tx.mark_successful();
                }
                let outcome = tx.finish().map_err(failure(RebuildReason::FailedToCloseCaches))?;
                debug!(?outcome, ?exit_code, "incremental attempt finished");
                Ok(IncrementalResult::Completed(exit_code))
            }
            other => {
                finish_quietly(tx.as_mut());
                other
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_incremental(
        &mut self,
        caches: &mut Caches,
        tx: &mut dyn Transaction,
        all_sources: &[PathBuf],
        changed_files: Option<ChangedFiles>,
        last_build_info: &BuildInfo,
        module_snapshot: Option<AbiSnapshot>,
        compiler: &mut dyn Compiler,
        start_ts: i64,
    ) -> Result<IncrementalResult, IncrementalFailure> {
        let (source_changes, classpath_changes) = {
            let open = caches
                .caches_mut()
                .map_err(failure(RebuildReason::FailedToGetChangedFiles))?;
            let detected = open
                .inputs
                .fingerprints
                .compare_and_update(&fingerprinted_inputs(all_sources, &self.config.classpath));
            match changed_files {
                None => (detected.clone(), detected),
                Some(ChangedFiles::Known {
                    modified,
                    removed,
                    for_dependencies: true,
                }) => (
                    detected,
                    ChangedFiles::Known {
                        modified,
                        removed,
                        for_dependencies: true,
                    },
                ),
                Some(known) => (known.clone(), known),
            }
        };
        let ChangedFiles::Known {
            modified, removed, ..
        } = &source_changes
        else {
            return Ok(IncrementalResult::RequiresRebuild(RebuildReason::UnknownChanges));
        };

        let current_snapshots = if self.config.abi_snapshot {
            self.resolver.current_snapshots(&self.config.classpath)
        } else {
            BTreeMap::new()
        };
        let classpath_dirty = {
            let open = caches
                .caches()
                .map_err(failure(RebuildReason::FailedToGetChangedFiles))?;
            let scope = DiffScope::Scopes(open.lookup.symbols().map(|s| s.scope.clone()).collect());
            let resolved = self
                .resolver
                .resolve(
                    &classpath_changes,
                    &self.config.classpath,
                    Some(last_build_info),
                    &current_snapshots,
                    &scope,
                    &open.platform,
                )
                .map_err(failure(RebuildReason::FailedToGetChangedFiles))?;
            match resolved {
                ChangesEither::Known(dirty) => dirty,
                ChangesEither::Unknown(reason) => {
                    return Ok(IncrementalResult::RequiresRebuild(reason));
                }
            }
        };

        let ctx = self.round_context();
        let mut dirty = DirtySetTracker::new(&self.config.source_extensions, ctx.reporter);
        {
            let open = caches
                .caches()
                .map_err(failure(RebuildReason::FailedToComputeFilesToRecompile))?;
            dirty.add(modified.iter().cloned(), Some("was modified since last time"));
            dirty.add(removed.iter().cloned(), Some("was removed since last time"));
            let not_compiled = read_dirty_sources(&self.working_file(DIRTY_SOURCES_FILE))
                .map_err(failure(RebuildReason::FailedToComputeFilesToRecompile))?;
            dirty.add(not_compiled, Some("was not compiled last time"));

            let removed_classes = removed_classes_changes(
                &self.config,
                modified,
                removed,
                &open.platform,
                compiler,
            );
            dirty.add_by_dirty_symbols(&removed_classes.dirty_lookup_symbols, &open.lookup);
            dirty.add_by_dirty_classes(&removed_classes.dirty_classes_fq_names, &open.platform);

            dirty.add_by_dirty_symbols(&classpath_dirty.dirty_lookup_symbols, &open.lookup);
            dirty.add_by_dirty_classes(&classpath_dirty.dirty_classes_fq_names, &open.platform);
        }
        info!(files = dirty.files().len(), "computed initial dirty set");

        let outcome = run_rounds(
            &ctx,
            caches,
            tx,
            &mut dirty,
            all_sources,
            compiler,
            CompilationMode::Incremental,
            module_snapshot,
            current_snapshots,
            start_ts,
        )
        .map_err(failure(RebuildReason::FailedToCompileIncrementally))?;
        Ok(match outcome {
            RoundsOutcome::Finished(exit_code) => IncrementalResult::Completed(exit_code),
            RoundsOutcome::Canceled => IncrementalResult::Canceled,
        })
    }

    /// Cleans every output directory and compiles all sources from empty
    /// caches.
    fn compile_non_incrementally(
        &mut self,
        reason: RebuildReason,
        all_sources: &[PathBuf],
        compiler: &mut dyn Compiler,
        start_ts: i64,
    ) -> Result<ExitCode, BuildError> {
        self.reporter.rebuild(&reason);
        for dir in self.config.dirs_to_clean() {
            clean_directory(&dir)?;
        }

        let mut tx = create_transaction(TransactionMode::NonRecoverable)?;
        let mut caches = Caches::open(
            &self.working_file(CACHES_DIR),
            self.config.keep_caches_in_memory,
        )?;
        caches
            .caches_mut()?
            .inputs
            .fingerprints
            .compare_and_update(&fingerprinted_inputs(all_sources, &self.config.classpath));
        let current_snapshots = if self.config.abi_snapshot {
            self.resolver.current_snapshots(&self.config.classpath)
        } else {
            BTreeMap::new()
        };
        let module_snapshot = self.config.abi_snapshot.then(AbiSnapshot::new);

        let ctx = self.round_context();
        let mut dirty = DirtySetTracker::new(&self.config.source_extensions, ctx.reporter);
        dirty.add(all_sources.iter().cloned(), None);

        let result = run_rounds(
            &ctx,
            &mut caches,
            tx.as_mut(),
            &mut dirty,
            all_sources,
            compiler,
            CompilationMode::Rebuild,
            module_snapshot,
            current_snapshots,
            start_ts,
        );
        let exit_code = match result {
            Ok(RoundsOutcome::Finished(exit_code)) => {
                caches.close(tx.as_mut())?;
                if exit_code == ExitCode::Ok {
                    tx.mark_successful();
                }
                exit_code
            }
            Ok(RoundsOutcome::Canceled) => ExitCode::Ok,
            Err(e) => {
                finish_quietly(tx.as_mut());
                return Err(e);
            }
        };
        tx.finish()?;
        Ok(exit_code)
    }
}

/// Declarations owned by changed sources that the compiler's front end no
/// longer finds, as dirty data. Empty when the compiler cannot tell.
fn removed_classes_changes(
    config: &IncrementalConfig,
    modified: &BTreeSet<PathBuf>,
    removed: &BTreeSet<PathBuf>,
    platform: &DeclarationCache,
    compiler: &mut dyn Compiler,
) -> DirtyData {
    let changed_sources: BTreeSet<PathBuf> = modified
        .iter()
        .chain(removed)
        .filter(|f| config.is_source_file(f))
        .cloned()
        .collect();
    let existing: BTreeSet<PathBuf> = modified
        .iter()
        .filter(|f| config.is_source_file(f) && f.exists())
        .cloned()
        .collect();

    let Some(declared) = compiler.declared_classes(&existing) else {
        return DirtyData::default();
    };
    let mut collector = ChangesCollector::new();
    for id in platform.classes_by_sources(&changed_sources) {
        if !declared.contains(&id) {
            debug!(%id, "declaration was removed");
            collector.signature_changed(id, true);
        }
    }
    collector.changed_and_impacted_symbols(platform).to_dirty_data()
}

/// Hands compiler output paths to the attempt's transaction.
struct TransactionOutputs<'a, 't> {
    tx: RefCell<&'a mut (dyn Transaction + 't)>,
}

impl OutputRegistrar for TransactionOutputs<'_, '_> {
    fn register_output(&self, path: &Path) -> Result<(), CompileError> {
        self.tx
            .borrow_mut()
            .register_added_or_changed(path)
            .map_err(|e| CompileError::Failed {
                reason: e.to_string(),
            })
    }
}

#[allow(clippy::too_many_arguments)]
#[tracing::instrument(level = "debug", skip_all, fields(mode = ?mode))]
fn run_rounds(
    ctx: &RoundContext<'_>,
    caches: &mut Caches,
    tx: &mut dyn Transaction,
    dirty: &mut DirtySetTracker<'_>,
    all_sources: &[PathBuf],
    compiler: &mut dyn Compiler,
    mode: CompilationMode,
    mut snapshot: Option<AbiSnapshot>,
    classpath_snapshots: BTreeMap<String, Arc<AbiSnapshot>>,
    start_ts: i64,
) -> Result<RoundsOutcome, BuildError> {
    let incremental = mode == CompilationMode::Incremental;
    let declared: BTreeSet<&PathBuf> = all_sources.iter().collect();
    let marker = ctx.config.working_dir.join(DIRTY_SOURCES_FILE);
    let mut compiled_in_build: BTreeSet<PathBuf> = BTreeSet::new();
    let mut build_dirty = DirtyData::default();
    let mut exit_code = ExitCode::Ok;

    loop {
        let open = caches.caches_mut()?;
        let complementary = open.platform.complementary_files_recursive(dirty.files());
        dirty.add(complementary, Some("is complementary to a dirty file"));
        if dirty.is_empty() {
            break;
        }

        let dirty_files = dirty.take();
        open.platform.mark_dirty(&dirty_files);
        open.inputs.remove_outputs_for_sources(tx, &dirty_files)?;

        let (to_compile, removed): (Vec<PathBuf>, Vec<PathBuf>) = dirty_files
            .iter()
            .cloned()
            .partition(|f| f.exists() && declared.contains(f));
        compiled_in_build.extend(dirty_files.iter().cloned());
        write_dirty_sources(tx, &marker, &compiled_in_build)?;

        let result = {
            let outputs = TransactionOutputs {
                tx: RefCell::new(&mut *tx),
            };
            let services = Services {
                cancellation: ctx.cancellation,
                outputs: &outputs,
                dirty_sources: &dirty_files,
                is_incremental: incremental,
            };
            compiler.compile(&to_compile, &services)
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(CompileError::Canceled) => {
                info!("compilation canceled");
                return Ok(RoundsOutcome::Canceled);
            }
            Err(CompileError::Failed { reason }) => return Err(BuildError::Compiler { reason }),
        };

        for generated in &outcome.generated_files {
            tx.register_created(&generated.output);
        }

        if incremental {
            let extra: BTreeSet<PathBuf> = outcome
                .extra_dirty_files
                .iter()
                .filter(|f| ctx.config.is_source_file(f) && !compiled_in_build.contains(*f))
                .cloned()
                .collect();
            if !extra.is_empty() {
                debug!(extra = extra.len(), "restarting round for an extra pass");
                for generated in &outcome.generated_files {
                    tx.delete_file(&generated.output)?;
                }
                dirty.add(dirty_files, None);
                dirty.add(extra, Some("was requested by an extra compilation pass"));
                continue;
            }
        }

        ctx.reporter.compile_iteration(incremental, &to_compile, outcome.exit_code);
        exit_code = outcome.exit_code;
        if exit_code != ExitCode::Ok {
            break;
        }

        tx.delete_file(&marker)?;
        let compiled: BTreeSet<PathBuf> = to_compile.into_iter().collect();
        let removed: BTreeSet<PathBuf> = removed.into_iter().collect();
        open.platform.update_complementary_files(&dirty_files, &outcome.complementary_files);
        open.inputs.register_outputs(&outcome.generated_files);
        open.lookup.update(&outcome.lookups, &compiled, &removed)?;

        let mut proto_changes = open.platform.update(&outcome.declarations);
        proto_changes.extend(open.platform.clear_removed());
        let mut collector = ChangesCollector::new();
        for change in proto_changes {
            collector.collect(ctx.comparator, &open.platform, change)?;
        }
        if let Some(snapshot) = snapshot.as_mut() {
            collector.apply_to(snapshot);
        }

        if mode == CompilationMode::Rebuild {
            break;
        }

        let changed = collector.changed_and_impacted_symbols(&open.platform);
        dirty.add_by_dirty_symbols(&changed.lookup_symbols, &open.lookup);
        dirty.add_by_dirty_classes(&changed.fq_names, &open.platform);
        dirty.exclude(&compiled_in_build);
        let forced: BTreeSet<PathBuf> = changed
            .force_recompile
            .iter()
            .flat_map(|id| open.platform.sources_of(id))
            .collect();
        if !forced.is_subset(&compiled) {
            dirty.add(forced, Some("depends on a changed sealed hierarchy"));
        }
        build_dirty.merge(changed.to_dirty_data());
    }

    if exit_code == ExitCode::Ok {
        let working_dir = &ctx.config.working_dir;
        let mut build_info = BuildInfo::new(start_ts);
        build_info.classpath_abi_snapshots = classpath_snapshots;
        build_info.write(tx, &working_dir.join(LAST_BUILD_INFO_FILE))?;
        if let Some(snapshot) = &snapshot {
            SnapshotStore::write(tx, &working_dir.join(ABI_SNAPSHOT_FILE), snapshot)?;
        }
        let difference = match mode {
            CompilationMode::Incremental => BuildDifference::incremental(start_ts, build_dirty),
            CompilationMode::Rebuild => BuildDifference::rebuild(start_ts),
        };
        BuildHistory::append_to_file(
            tx,
            &working_dir.join(BUILD_HISTORY_FILE),
            difference,
            ctx.config.history_retention,
        )?;
    }
    Ok(RoundsOutcome::Finished(exit_code))
}

fn finish_quietly(tx: &mut dyn Transaction) {
    if let Err(e) = tx.finish() {
        warn!(error = %e, "failed to finish transaction");
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Sources plus classpath entries that are plain files (jars), whose
/// fingerprints stand in for build-system change reports.
fn fingerprinted_inputs(all_sources: &[PathBuf], classpath: &[PathBuf]) -> Vec<PathBuf> {
    all_sources
        .iter()
        .chain(classpath.iter().filter(|entry| entry.is_file()))
        .cloned()
        .collect()
}

fn clean_directory(dir: &Path) -> Result<(), BuildError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
    }
    fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))
}

fn read_dirty_sources(path: &Path) -> Result<Vec<PathBuf>, BuildError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(BuildError::io(path, e)),
    }
}

fn write_dirty_sources(
    tx: &mut dyn Transaction,
    path: &Path,
    files: &BTreeSet<PathBuf>,
) -> Result<(), BuildError> {
    let text: String = files
        .iter()
        .map(|f| format!("{}\n", f.display()))
        .collect();
    tx.write_text(path, &text)?;
    Ok(())
}
