//! The working set of files to recompile.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use delta_cache::{LookupCache, SubtypeIndex};
use delta_common::{DeclarationId, LookupSymbol};

use crate::report::BuildReporter;

/// Grows the set of dirty source files from raw file changes, dirty lookup
/// symbols, and dirty declarations.
///
/// Only files with a recognized source extension are ever added.
pub struct DirtySetTracker<'r> {
    extensions: Vec<String>,
    reporter: &'r dyn BuildReporter,
    files: BTreeSet<PathBuf>,
}

impl<'r> DirtySetTracker<'r> {
    /// An empty tracker accepting files with the given extensions.
    pub fn new(extensions: &[String], reporter: &'r dyn BuildReporter) -> Self {
        Self {
            extensions: extensions.to_vec(),
            reporter,
            files: BTreeSet::new(),
        }
    }

    fn is_source(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|s| s.eq_ignore_ascii_case(ext)))
    }

    /// Adds the source files among `files`. `reason` is reported unless it
    /// is `None`, which callers pass when they reported more precisely.
    pub fn add<I>(&mut self, files: I, reason: Option<&str>)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let added: BTreeSet<PathBuf> = files.into_iter().filter(|f| self.is_source(f)).collect();
        if added.is_empty() {
            return;
        }
        if let Some(reason) = reason {
            self.reporter.marked_dirty(&added, reason);
        }
        self.files.extend(added);
    }

    /// Adds every file that referenced one of `symbols`.
    pub fn add_by_dirty_symbols<'a, I>(&mut self, symbols: I, lookups: &LookupCache)
    where
        I: IntoIterator<Item = &'a LookupSymbol>,
    {
        let files: BTreeSet<PathBuf> = symbols
            .into_iter()
            .flat_map(|symbol| lookups.files_for(symbol).cloned())
            .collect();
        self.add(files, Some("referenced a dirty symbol"));
    }

    /// Adds the files owning each declaration and all of its subtypes.
    pub fn add_by_dirty_classes<'a, I, S>(&mut self, fq_names: I, index: &S)
    where
        I: IntoIterator<Item = &'a DeclarationId>,
        S: SubtypeIndex + ?Sized,
    {
        let files: BTreeSet<PathBuf> = fq_names
            .into_iter()
            .flat_map(|id| index.with_subtypes(id))
            .flat_map(|id| index.sources_of(&id))
            .collect();
        self.add(files, Some("declares a dirty class or its subtype"));
    }

    /// Returns `true` if `file` is dirty.
    pub fn contains(&self, file: &Path) -> bool {
        self.files.contains(file)
    }

    /// The dirty files.
    pub fn files(&self) -> &BTreeSet<PathBuf> {
        &self.files
    }

    /// Returns `true` if nothing is dirty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Drops every file in `files` from the working set.
    pub fn exclude(&mut self, files: &BTreeSet<PathBuf>) {
        self.files.retain(|f| !files.contains(f));
    }

    /// Empties the tracker, returning its files.
    pub fn take(&mut self) -> BTreeSet<PathBuf> {
        std::mem::take(&mut self.files)
    }
}
