//! Classpath change resolution.
//!
//! Dependencies that changed since the last successful build are explained
//! either by diffing their ABI snapshots against the ones recorded in the
//! last build info, or by replaying the build histories of the modules that
//! produced them. Whenever neither can prove what changed, the answer is
//! [`ChangesEither::Unknown`] and the caller rebuilds.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use delta_cache::{AbiSnapshot, BuildHistory, BuildInfo, SnapshotStore, SubtypeIndex};
use delta_common::{ChangedFiles, DirtyData};
use tracing::{debug, warn};

use crate::diff::{AbiDiffEngine, DiffScope};
use crate::error::{BuildError, RebuildReason};

/// Either the exact invalidation caused by classpath changes, or the reason
/// it cannot be known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangesEither {
    /// The changes are known.
    Known(DirtyData),
    /// The changes cannot be determined; rebuild.
    Unknown(RebuildReason),
}

/// Errors mapping a classpath file to its producer's state.
#[derive(Debug, thiserror::Error)]
pub enum HistoryLookupError {
    /// No known module produced the file.
    #[error("no incremental module produced {path}")]
    UnknownModule {
        /// The classpath file.
        path: PathBuf,
    },
    /// The producing module keeps no ABI snapshot.
    #[error("module {module} has no ABI snapshot")]
    NoSnapshot {
        /// The module.
        module: String,
    },
}

/// Maps classpath files to the build histories and ABI snapshots of the
/// modules that produced them.
pub trait ModulesApiHistory {
    /// History files of the modules that produced `changed`.
    fn history_files_for_changed_files(
        &self,
        changed: &BTreeSet<PathBuf>,
    ) -> Result<BTreeSet<PathBuf>, HistoryLookupError>;

    /// ABI snapshot file of the module that produced `classpath_entry`.
    fn abi_snapshot(&self, classpath_entry: &Path) -> Result<PathBuf, HistoryLookupError>;
}

/// A module known to the build, with where its outputs and state live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalModuleEntry {
    /// Module name, for diagnostics.
    pub module_name: String,
    /// Output directories of the module.
    pub output_dirs: Vec<PathBuf>,
    /// Jars the module is packaged into.
    pub jars: Vec<PathBuf>,
    /// The module's build history file.
    pub build_history_file: PathBuf,
    /// The module's ABI snapshot file, if it keeps one.
    pub abi_snapshot_file: Option<PathBuf>,
}

/// [`ModulesApiHistory`] over a fixed list of modules.
#[derive(Debug, Clone, Default)]
pub struct DirectoryModulesApiHistory {
    modules: Vec<IncrementalModuleEntry>,
}

impl DirectoryModulesApiHistory {
    /// Creates a history over `modules`.
    pub fn new(modules: Vec<IncrementalModuleEntry>) -> Self {
        Self { modules }
    }

    fn module_for(&self, file: &Path) -> Result<&IncrementalModuleEntry, HistoryLookupError> {
        self.modules
            .iter()
            .find(|m| {
                m.jars.iter().any(|jar| jar == file)
                    || m.output_dirs.iter().any(|dir| file.starts_with(dir))
            })
            .ok_or_else(|| HistoryLookupError::UnknownModule {
                path: file.to_path_buf(),
            })
    }
}

impl ModulesApiHistory for DirectoryModulesApiHistory {
    fn history_files_for_changed_files(
        &self,
        changed: &BTreeSet<PathBuf>,
    ) -> Result<BTreeSet<PathBuf>, HistoryLookupError> {
        changed
            .iter()
            .map(|file| self.module_for(file).map(|m| m.build_history_file.clone()))
            .collect()
    }

    fn abi_snapshot(&self, classpath_entry: &Path) -> Result<PathBuf, HistoryLookupError> {
        let module = self.module_for(classpath_entry)?;
        module
            .abi_snapshot_file
            .clone()
            .ok_or_else(|| HistoryLookupError::NoSnapshot {
                module: module.module_name.clone(),
            })
    }
}

/// The key a classpath entry's snapshot is recorded under in build info.
pub fn dependency_key(entry: &Path) -> String {
    entry.to_string_lossy().into_owned()
}

/// Decides what classpath changes mean for this module.
pub struct ClasspathChangeResolver {
    history: Arc<dyn ModulesApiHistory>,
    diff: AbiDiffEngine,
    abi_snapshot_mode: bool,
}

impl ClasspathChangeResolver {
    /// Creates a resolver. With `abi_snapshot_mode` changes are found by
    /// snapshot diff, otherwise by build-history replay.
    pub fn new(
        history: Arc<dyn ModulesApiHistory>,
        diff: AbiDiffEngine,
        abi_snapshot_mode: bool,
    ) -> Self {
        Self {
            history,
            diff,
            abi_snapshot_mode,
        }
    }

    /// Number of snapshot diffs remembered across resolutions.
    pub fn memoized_diffs(&self) -> usize {
        self.diff.memoized()
    }

    /// Reads the current ABI snapshot of every classpath entry whose
    /// producer keeps one. Entries without a readable snapshot are left out.
    pub fn current_snapshots(&self, classpath: &[PathBuf]) -> BTreeMap<String, Arc<AbiSnapshot>> {
        let mut snapshots = BTreeMap::new();
        for entry in classpath {
            let path = match self.history.abi_snapshot(entry) {
                Ok(path) => path,
                Err(e) => {
                    debug!(entry = %entry.display(), error = %e, "no ABI snapshot for classpath entry");
                    continue;
                }
            };
            match SnapshotStore::read(&path) {
                Ok(snapshot) => {
                    snapshots.insert(dependency_key(entry), Arc::new(snapshot));
                }
                Err(e) => debug!(entry = %entry.display(), error = %e, "skipping classpath snapshot"),
            }
        }
        snapshots
    }

    /// Resolves classpath changes.
    ///
    /// `changed` lists modified and removed files; only those on `classpath`
    /// count, unless `for_dependencies` says every listed file is a
    /// dependency. `current` holds the classpath snapshots read for this
    /// build, `scope` limits which dependency declarations are diffed, and
    /// `subtypes` expands member changes to this module's subtypes.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn resolve(
        &mut self,
        changed: &ChangedFiles,
        classpath: &[PathBuf],
        last_build_info: Option<&BuildInfo>,
        current: &BTreeMap<String, Arc<AbiSnapshot>>,
        scope: &DiffScope,
        subtypes: &dyn SubtypeIndex,
    ) -> Result<ChangesEither, BuildError> {
        let ChangedFiles::Known {
            modified,
            removed,
            for_dependencies,
        } = changed
        else {
            return Ok(ChangesEither::Unknown(RebuildReason::UnknownChanges));
        };

        let on_classpath = |file: &&PathBuf| *for_dependencies || classpath.contains(*file);
        if removed.iter().any(|f| on_classpath(&f)) {
            return Ok(ChangesEither::Unknown(RebuildReason::ClasspathEntryRemoved));
        }
        let modified: BTreeSet<PathBuf> = modified.iter().filter(on_classpath).cloned().collect();
        if modified.is_empty() {
            return Ok(ChangesEither::Known(DirtyData::default()));
        }

        let Some(last_build_info) = last_build_info else {
            return Ok(ChangesEither::Unknown(RebuildReason::NoBuildHistory));
        };

        if self.abi_snapshot_mode {
            self.resolve_by_snapshots(&modified, last_build_info, current, scope, subtypes)
        } else {
            Ok(self.resolve_by_history(&modified, last_build_info.start_ts))
        }
    }

    fn resolve_by_snapshots(
        &mut self,
        modified: &BTreeSet<PathBuf>,
        last_build_info: &BuildInfo,
        current: &BTreeMap<String, Arc<AbiSnapshot>>,
        scope: &DiffScope,
        subtypes: &dyn SubtypeIndex,
    ) -> Result<ChangesEither, BuildError> {
        let mut dirty = DirtyData::default();
        for entry in modified {
            let key = dependency_key(entry);
            let Some(old) = last_build_info.classpath_abi_snapshots.get(&key) else {
                return Ok(ChangesEither::Unknown(RebuildReason::MissingClasspathSnapshot(key)));
            };
            let Some(new) = current.get(&key) else {
                warn!(entry = %entry.display(), "modified classpath entry has no readable snapshot");
                return Ok(ChangesEither::Unknown(RebuildReason::NoAbiSnapshot));
            };
            dirty.merge(self.diff.compare(old, new, scope, subtypes)?);
        }
        Ok(ChangesEither::Known(dirty))
    }

    fn resolve_by_history(&self, modified: &BTreeSet<PathBuf>, last_build_ts: i64) -> ChangesEither {
        let history_files = match self.history.history_files_for_changed_files(modified) {
            Ok(files) => files,
            Err(e) => {
                debug!(error = %e, "could not map classpath changes to build histories");
                return ChangesEither::Unknown(RebuildReason::HistoryNotFound);
            }
        };

        let mut dirty = DirtyData::default();
        for file in &history_files {
            let Some(history) = BuildHistory::read(file) else {
                return ChangesEither::Unknown(RebuildReason::HistoryUnreadable);
            };
            let (known, newer): (Vec<_>, Vec<_>) =
                history.builds().iter().partition(|b| b.ts <= last_build_ts);
            if known.is_empty() {
                debug!(history = %file.display(), "no build at or before the last build");
                return ChangesEither::Unknown(RebuildReason::HistoryNoKnownBuilds);
            }
            for build in newer {
                if !build.is_incremental {
                    debug!(history = %file.display(), ts = build.ts, "non-incremental build in chain");
                    return ChangesEither::Unknown(RebuildReason::HistoryDiscontinuity);
                }
                dirty.merge(build.dirty_data.clone());
            }
        }
        ChangesEither::Known(dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::StructuralAbiComparator;
    use delta_cache::{BuildDifference, NonRecoverableTransaction};
    use delta_common::{ClassKind, ClassProtoData, DeclarationId, LookupSymbol, Member, MemberKind, ProtoData};

    struct NoSubtypes;

    impl SubtypeIndex for NoSubtypes {
        fn direct_subtypes(&self, _id: &DeclarationId) -> Vec<DeclarationId> {
            Vec::new()
        }

        fn sources_of(&self, _id: &DeclarationId) -> Vec<PathBuf> {
            Vec::new()
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        jar: PathBuf,
        history_file: PathBuf,
        snapshot_file: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let jar = dir.path().join("libs/dep.jar");
            let history_file = dir.path().join("dep/build-history.bin");
            let snapshot_file = dir.path().join("dep/abi-snapshot.bin");
            Self {
                dir,
                jar,
                history_file,
                snapshot_file,
            }
        }

        fn resolver(&self, abi_snapshot_mode: bool) -> ClasspathChangeResolver {
            let history = DirectoryModulesApiHistory::new(vec![IncrementalModuleEntry {
                module_name: "dep".to_string(),
                output_dirs: vec![self.dir.path().join("dep/classes")],
                jars: vec![self.jar.clone()],
                build_history_file: self.history_file.clone(),
                abi_snapshot_file: Some(self.snapshot_file.clone()),
            }]);
            ClasspathChangeResolver::new(
                Arc::new(history),
                AbiDiffEngine::new(Arc::new(StructuralAbiComparator)),
                abi_snapshot_mode,
            )
        }

        fn write_history(&self, builds: Vec<BuildDifference>) {
            let mut history = BuildHistory::new();
            for b in builds {
                history.append(b);
            }
            let mut tx = NonRecoverableTransaction::new();
            history.write(&mut tx, &self.history_file, 10).unwrap();
        }

        fn resolve(
            &self,
            resolver: &mut ClasspathChangeResolver,
            changed: ChangedFiles,
            info: Option<&BuildInfo>,
            current: &BTreeMap<String, Arc<AbiSnapshot>>,
        ) -> ChangesEither {
            resolver
                .resolve(
                    &changed,
                    std::slice::from_ref(&self.jar),
                    info,
                    current,
                    &DiffScope::All,
                    &NoSubtypes,
                )
                .unwrap()
        }
    }

    fn dirty(name: &str) -> DirtyData {
        let mut data = DirtyData::default();
        data.dirty_lookup_symbols.insert(LookupSymbol::new(name, "dep"));
        data
    }

    fn snapshot(members: &[&str]) -> AbiSnapshot {
        let mut class = ClassProtoData::new(ClassKind::Class);
        for m in members {
            class = class.with_member(Member::public(*m, MemberKind::Function, "(): Unit"));
        }
        [(DeclarationId::new("dep.Api"), ProtoData::Class(class))]
            .into_iter()
            .collect()
    }

    #[test]
    fn removed_entry_is_unknown() {
        let fx = Fixture::new();
        let mut resolver = fx.resolver(false);
        let changes = fx.resolve(
            &mut resolver,
            ChangedFiles::known(Vec::new(), [fx.jar.clone()]),
            Some(&BuildInfo::new(100)),
            &BTreeMap::new(),
        );
        assert_eq!(changes, ChangesEither::Unknown(RebuildReason::ClasspathEntryRemoved));
    }

    #[test]
    fn unchanged_classpath_is_known_and_empty() {
        let fx = Fixture::new();
        let mut resolver = fx.resolver(true);
        let changes = fx.resolve(
            &mut resolver,
            ChangedFiles::known([PathBuf::from("/src/a.kt")], Vec::new()),
            None,
            &BTreeMap::new(),
        );
        assert_eq!(changes, ChangesEither::Known(DirtyData::default()));
    }

    #[test]
    fn missing_build_info_is_unknown() {
        let fx = Fixture::new();
        let mut resolver = fx.resolver(false);
        let changes = fx.resolve(
            &mut resolver,
            ChangedFiles::known([fx.jar.clone()], Vec::new()),
            None,
            &BTreeMap::new(),
        );
        assert_eq!(changes, ChangesEither::Unknown(RebuildReason::NoBuildHistory));
    }

    #[test]
    fn history_replays_newer_incremental_builds() {
        let fx = Fixture::new();
        fx.write_history(vec![
            BuildDifference::incremental(90, dirty("old")),
            BuildDifference::incremental(110, dirty("a")),
            BuildDifference::incremental(120, dirty("b")),
        ]);
        let mut resolver = fx.resolver(false);
        let changes = fx.resolve(
            &mut resolver,
            ChangedFiles::known([fx.jar.clone()], Vec::new()),
            Some(&BuildInfo::new(100)),
            &BTreeMap::new(),
        );
        let mut expected = dirty("a");
        expected.merge(dirty("b"));
        assert_eq!(changes, ChangesEither::Known(expected));
    }

    #[test]
    fn history_discontinuity_is_unknown() {
        let fx = Fixture::new();
        fx.write_history(vec![
            BuildDifference::incremental(90, dirty("old")),
            BuildDifference::rebuild(110),
            BuildDifference::incremental(120, dirty("b")),
        ]);
        let mut resolver = fx.resolver(false);
        let changes = fx.resolve(
            &mut resolver,
            ChangedFiles::known([fx.jar.clone()], Vec::new()),
            Some(&BuildInfo::new(100)),
            &BTreeMap::new(),
        );
        assert_eq!(changes, ChangesEither::Unknown(RebuildReason::HistoryDiscontinuity));
    }

    #[test]
    fn history_without_known_builds_is_unknown() {
        let fx = Fixture::new();
        fx.write_history(vec![BuildDifference::incremental(150, dirty("b"))]);
        let mut resolver = fx.resolver(false);
        let changes = fx.resolve(
            &mut resolver,
            ChangedFiles::known([fx.jar.clone()], Vec::new()),
            Some(&BuildInfo::new(100)),
            &BTreeMap::new(),
        );
        assert_eq!(changes, ChangesEither::Unknown(RebuildReason::HistoryNoKnownBuilds));
    }

    #[test]
    fn unreadable_or_unmapped_history_is_unknown() {
        let fx = Fixture::new();
        let mut resolver = fx.resolver(false);
        let changes = fx.resolve(
            &mut resolver,
            ChangedFiles::known([fx.jar.clone()], Vec::new()),
            Some(&BuildInfo::new(100)),
            &BTreeMap::new(),
        );
        assert_eq!(changes, ChangesEither::Unknown(RebuildReason::HistoryUnreadable));

        let changes = resolver
            .resolve(
                &ChangedFiles::Known {
                    modified: BTreeSet::from([PathBuf::from("/elsewhere/x.jar")]),
                    removed: BTreeSet::new(),
                    for_dependencies: true,
                },
                &[],
                Some(&BuildInfo::new(100)),
                &BTreeMap::new(),
                &DiffScope::All,
                &NoSubtypes,
            )
            .unwrap();
        assert_eq!(changes, ChangesEither::Unknown(RebuildReason::HistoryNotFound));
    }

    #[test]
    fn snapshot_mode_diffs_against_recorded_baseline() {
        let fx = Fixture::new();
        let mut tx = NonRecoverableTransaction::new();
        SnapshotStore::write(&mut tx, &fx.snapshot_file, &snapshot(&["f", "g"])).unwrap();

        let mut resolver = fx.resolver(true);
        let current = resolver.current_snapshots(std::slice::from_ref(&fx.jar));
        assert_eq!(current.len(), 1);

        let mut info = BuildInfo::new(100);
        info.classpath_abi_snapshots
            .insert(dependency_key(&fx.jar), Arc::new(snapshot(&["f"])));
        let changes = fx.resolve(
            &mut resolver,
            ChangedFiles::known([fx.jar.clone()], Vec::new()),
            Some(&info),
            &current,
        );
        let ChangesEither::Known(data) = changes else {
            panic!("expected known changes");
        };
        assert!(data.dirty_lookup_symbols.contains(&LookupSymbol::new("g", "dep.Api")));
    }

    #[test]
    fn snapshot_mode_unchanged_jar_is_empty() {
        let fx = Fixture::new();
        let mut tx = NonRecoverableTransaction::new();
        SnapshotStore::write(&mut tx, &fx.snapshot_file, &snapshot(&["f"])).unwrap();
        let mut resolver = fx.resolver(true);
        let current = resolver.current_snapshots(std::slice::from_ref(&fx.jar));

        let mut info = BuildInfo::new(100);
        info.classpath_abi_snapshots
            .insert(dependency_key(&fx.jar), Arc::new(snapshot(&["f"])));
        let changes = fx.resolve(
            &mut resolver,
            ChangedFiles::known([fx.jar.clone()], Vec::new()),
            Some(&info),
            &current,
        );
        assert_eq!(changes, ChangesEither::Known(DirtyData::default()));
    }

    #[test]
    fn snapshot_diffs_are_reused_across_builds() {
        let fx = Fixture::new();
        let mut tx = NonRecoverableTransaction::new();
        SnapshotStore::write(&mut tx, &fx.snapshot_file, &snapshot(&["f", "g"])).unwrap();
        let info_file = fx.dir.path().join("work/last-build.bin");
        let mut info = BuildInfo::new(100);
        info.classpath_abi_snapshots
            .insert(dependency_key(&fx.jar), Arc::new(snapshot(&["f"])));
        info.write(&mut tx, &info_file).unwrap();

        let mut resolver = fx.resolver(true);
        for _ in 0..3 {
            let info = BuildInfo::read(&info_file).unwrap();
            let current = resolver.current_snapshots(std::slice::from_ref(&fx.jar));
            let changes = fx.resolve(
                &mut resolver,
                ChangedFiles::known([fx.jar.clone()], Vec::new()),
                Some(&info),
                &current,
            );
            assert!(matches!(changes, ChangesEither::Known(ref data) if !data.is_empty()));
        }
        assert_eq!(resolver.memoized_diffs(), 1);
    }

    #[test]
    fn snapshot_mode_missing_baseline_is_unknown() {
        let fx = Fixture::new();
        let mut resolver = fx.resolver(true);
        let changes = fx.resolve(
            &mut resolver,
            ChangedFiles::known([fx.jar.clone()], Vec::new()),
            Some(&BuildInfo::new(100)),
            &BTreeMap::new(),
        );
        assert_eq!(
            changes,
            ChangesEither::Unknown(RebuildReason::MissingClasspathSnapshot(dependency_key(&fx.jar)))
        );
    }
}
