//! Cache lifecycle management.
//!
//! A [`CacheManager`] opens the per-module caches under one directory, hands
//! out access to them while it is open, and flushes every one of them
//! through the build's transaction when it is closed. Access after close is
//! an error, and so is closing twice.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::CacheError;
use crate::inputs::InputsCache;
use crate::lookup::LookupCache;
use crate::platform::{DeclarationCache, PlatformCache};
use crate::transaction::Transaction;

const INPUTS_SUBDIR: &str = "inputs";
const LOOKUPS_SUBDIR: &str = "lookups";
const PLATFORM_SUBDIR: &str = "platform";

/// A cache whose durable state is managed by a [`CacheManager`].
pub trait CacheLifecycle {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Writes pending changes through `tx`.
    fn flush(&mut self, tx: &mut dyn Transaction, memory_only: bool) -> Result<(), CacheError>;

    /// Drops all in-memory contents. The next flush erases the files.
    fn clean(&mut self);
}

/// The caches every module has.
#[derive(Debug)]
pub struct OpenCaches<P> {
    /// Source fingerprints and source→output associations.
    pub inputs: InputsCache,
    /// Symbol→file lookup index.
    pub lookup: LookupCache,
    /// Per-declaration platform metadata.
    pub platform: P,
}

/// Owns the caches of one module for the duration of a build.
pub struct CacheManager<P: PlatformCache = DeclarationCache> {
    caches_dir: PathBuf,
    caches: Option<OpenCaches<P>>,
    extra: Vec<Box<dyn CacheLifecycle>>,
    memory_only: bool,
}

impl<P: PlatformCache> CacheManager<P> {
    /// Opens the caches stored under `caches_dir`. With `memory_only`,
    /// flushes skip fsync.
    pub fn open(caches_dir: &Path, memory_only: bool) -> Result<Self, CacheError> {
        let caches = OpenCaches {
            inputs: InputsCache::open(&caches_dir.join(INPUTS_SUBDIR))?,
            lookup: LookupCache::open(&caches_dir.join(LOOKUPS_SUBDIR))?,
            platform: P::open(&caches_dir.join(PLATFORM_SUBDIR))?,
        };
        debug!(dir = %caches_dir.display(), "opened caches");
        Ok(Self {
            caches_dir: caches_dir.to_path_buf(),
            caches: Some(caches),
            extra: Vec::new(),
            memory_only,
        })
    }

    /// The directory holding every cache file.
    pub fn caches_dir(&self) -> &Path {
        &self.caches_dir
    }

    /// Returns `true` once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.caches.is_none()
    }

    /// Shared access to the open caches.
    pub fn caches(&self) -> Result<&OpenCaches<P>, CacheError> {
        self.caches.as_ref().ok_or(CacheError::Closed { operation: "read caches" })
    }

    /// Exclusive access to the open caches.
    pub fn caches_mut(&mut self) -> Result<&mut OpenCaches<P>, CacheError> {
        self.caches.as_mut().ok_or(CacheError::Closed { operation: "update caches" })
    }

    /// Adds a cache to be flushed and cleaned with the built-in ones.
    pub fn register_cache(&mut self, cache: Box<dyn CacheLifecycle>) -> Result<(), CacheError> {
        if self.is_closed() {
            return Err(CacheError::Closed { operation: "register a cache" });
        }
        debug!(cache = cache.name(), "registered cache");
        self.extra.push(cache);
        Ok(())
    }

    /// Drops the contents of every cache.
    pub fn clean(&mut self) -> Result<(), CacheError> {
        let caches = self.caches.as_mut().ok_or(CacheError::Closed { operation: "clean caches" })?;
        caches.inputs.clean();
        caches.lookup.clean();
        caches.platform.clean();
        for cache in &mut self.extra {
            cache.clean();
        }
        Ok(())
    }

    /// Writes every cache through `tx` without closing.
    pub fn flush(&mut self, tx: &mut dyn Transaction) -> Result<(), CacheError> {
        let memory_only = self.memory_only;
        let caches = self.caches.as_mut().ok_or(CacheError::Closed { operation: "flush caches" })?;
        flush_all(caches, &mut self.extra, tx, memory_only)
    }

    /// Flushes every cache through `tx` and closes the manager.
    pub fn close(&mut self, tx: &mut dyn Transaction) -> Result<(), CacheError> {
        let mut caches = self.caches.take().ok_or(CacheError::AlreadyClosed)?;
        flush_all(&mut caches, &mut self.extra, tx, self.memory_only)?;
        self.extra.clear();
        debug!(dir = %self.caches_dir.display(), "closed caches");
        Ok(())
    }
}

fn flush_all<P: PlatformCache>(
    caches: &mut OpenCaches<P>,
    extra: &mut [Box<dyn CacheLifecycle>],
    tx: &mut dyn Transaction,
    memory_only: bool,
) -> Result<(), CacheError> {
    caches.inputs.flush(tx, memory_only)?;
    caches.lookup.flush(tx, memory_only)?;
    caches.platform.flush(tx, memory_only)?;
    for cache in extra {
        debug!(cache = cache.name(), "flushing");
        cache.flush(tx, memory_only)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::NonRecoverableTransaction;
    use delta_common::{GeneratedFile, LookupSymbol};
    use std::cell::Cell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    struct CountingCache {
        flushes: Rc<Cell<usize>>,
    }

    impl CacheLifecycle for CountingCache {
        fn name(&self) -> &str {
            "counting"
        }

        fn flush(&mut self, _tx: &mut dyn Transaction, _memory_only: bool) -> Result<(), CacheError> {
            self.flushes.set(self.flushes.get() + 1);
            Ok(())
        }

        fn clean(&mut self) {}
    }

    #[test]
    fn close_flushes_and_reopen_sees_state() {
        let dir = tempfile::tempdir().unwrap();
        let src = PathBuf::from("/src/a.kt");
        {
            let mut manager: CacheManager = CacheManager::open(dir.path(), false).unwrap();
            let caches = manager.caches_mut().unwrap();
            caches
                .inputs
                .register_outputs(&[GeneratedFile::new("/out/A.class", vec![src.clone()])]);
            caches
                .lookup
                .update(
                    &[(LookupSymbol::new("foo", "p"), src.clone())],
                    &BTreeSet::from([src.clone()]),
                    &BTreeSet::new(),
                )
                .unwrap();
            let mut tx = NonRecoverableTransaction::new();
            manager.close(&mut tx).unwrap();
        }
        let manager: CacheManager = CacheManager::open(dir.path(), false).unwrap();
        let caches = manager.caches().unwrap();
        assert_eq!(caches.inputs.outputs_of(&src).len(), 1);
        assert_eq!(caches.lookup.symbols().count(), 1);
    }

    #[test]
    fn access_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager: CacheManager = CacheManager::open(dir.path(), true).unwrap();
        let mut tx = NonRecoverableTransaction::new();
        manager.close(&mut tx).unwrap();
        assert!(manager.is_closed());
        assert!(matches!(manager.caches(), Err(CacheError::Closed { .. })));
        assert!(matches!(manager.close(&mut tx), Err(CacheError::AlreadyClosed)));
    }

    #[test]
    fn registered_caches_flush_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let flushes = Rc::new(Cell::new(0));
        let mut manager: CacheManager = CacheManager::open(dir.path(), true).unwrap();
        manager
            .register_cache(Box::new(CountingCache { flushes: Rc::clone(&flushes) }))
            .unwrap();
        let mut tx = NonRecoverableTransaction::new();
        manager.flush(&mut tx).unwrap();
        manager.close(&mut tx).unwrap();
        assert_eq!(flushes.get(), 2);
    }
}
