//! Nested archive handling and temporary-file ownership.
//!
//! Archives-within-archives (`outer.jar!inner.jar`) cannot be read in place,
//! so the handler extracts the inner entry to a scoped temporary file and
//! opens that as a fresh archive. The handler memoizes every physical and
//! extracted archive per canonical key, owns the temporary directory, and
//! releases it exactly once on close.
//!
//! An inner chain component that is not an archive entry may still name a
//! directory prefix inside the archive (`outer.jar!BOOT-INF/classes`); the
//! resulting view re-roots all lookups under that prefix.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::errors::OpenError;
use crate::log::ScanLog;
use crate::once_map::SingletonMap;
use crate::path_resolver::inner_chain_components;
use crate::zip::ZipFile;

/// A logical archive view: a physical archive plus an optional root prefix.
///
/// All lookups and enumerations are relative to `root_prefix` (empty for
/// plain archives; `"BOOT-INF/classes/"`-style, always slash-terminated,
/// for re-rooted views).
#[derive(Clone, Debug)]
pub struct ZipView {
    pub zip: Arc<ZipFile>,
    pub root_prefix: String,
}

impl ZipView {
    /// Resolves a logical path to an entry index under this view's root.
    pub fn entry_index(&self, path: &str) -> Option<u32> {
        if self.root_prefix.is_empty() {
            self.zip.entry_index(path)
        } else {
            let mut name = String::with_capacity(self.root_prefix.len() + path.len());
            name.push_str(&self.root_prefix);
            name.push_str(path);
            self.zip.entry_index(&name)
        }
    }
}

/// Owns every archive opened during one scan and the temporary files backing
/// extracted nested archives.
///
/// # Lifetime
///
/// The scan owns the handler; on scan failure (or success with temp-file
/// removal requested) the handler is closed at scan end, otherwise it is
/// handed to the result for later resource access and closed with it.
/// Close is idempotent; archives opened through a closed handler fail.
#[derive(Debug)]
pub struct NestedArchiveHandler {
    archives: SingletonMap<Arc<ZipFile>>,
    temp_dir: Mutex<Option<TempDir>>,
    extract_counter: AtomicUsize,
    closed: AtomicBool,
}

impl NestedArchiveHandler {
    pub fn new() -> Self {
        Self {
            archives: SingletonMap::new(),
            temp_dir: Mutex::new(None),
            extract_counter: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Opens the logical archive view for `base` plus an optional `!` chain.
    ///
    /// Every physical archive and every extracted inner archive is memoized
    /// by its canonical key, so aliases share one parsed central directory
    /// and one extraction.
    pub fn open_view(
        &self,
        base: &str,
        inner: Option<&str>,
        log: &ScanLog,
    ) -> Result<ZipView, Arc<OpenError>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Arc::new(OpenError::HandlerClosed));
        }

        let mut zip = self.open_physical(base, log)?;
        let mut root_prefix = String::new();

        if let Some(inner) = inner {
            let components = inner_chain_components(inner);
            let mut chain_key = base.to_string();
            for (pos, component) in components.iter().enumerate() {
                chain_key.push('!');
                chain_key.push_str(component);

                if let Some(entry_idx) = zip.entry_index(component) {
                    zip = self.open_extracted(&zip, entry_idx, &chain_key, log)?;
                    root_prefix.clear();
                    continue;
                }

                // Not an entry: treat the remaining chain as a package root.
                let rest = components[pos..].join("/");
                let prefix = format!("{rest}/");
                let exists = zip.entries().iter().any(|e| e.name.starts_with(&prefix));
                if !exists {
                    return Err(Arc::new(OpenError::NestedEntryNotFound {
                        archive: zip.display_path().to_string(),
                        entry: (*component).to_string(),
                    }));
                }
                root_prefix = prefix;
                break;
            }
        }

        Ok(ZipView { zip, root_prefix })
    }

    fn open_physical(&self, path: &str, log: &ScanLog) -> Result<Arc<ZipFile>, Arc<OpenError>> {
        self.archives.get(path, log, |key, _| {
            ZipFile::open(Path::new(key), key.to_string()).map(Arc::new)
        })
    }

    fn open_extracted(
        &self,
        outer: &Arc<ZipFile>,
        entry_idx: u32,
        chain_key: &str,
        log: &ScanLog,
    ) -> Result<Arc<ZipFile>, Arc<OpenError>> {
        self.archives.get(chain_key, log, |key, log| {
            let bytes = outer.read_entry(entry_idx).map_err(OpenError::io)?;
            let temp_path = self.allocate_temp_path()?;
            std::fs::write(&temp_path, bytes).map_err(OpenError::io)?;
            log.msg(format!(
                "Extracted nested archive {key} to {}",
                temp_path.display()
            ));
            ZipFile::open(&temp_path, key.to_string()).map(Arc::new)
        })
    }

    fn allocate_temp_path(&self) -> Result<PathBuf, OpenError> {
        let mut guard = self.temp_dir.lock().expect("temp dir poisoned");
        if guard.is_none() {
            let dir = tempfile::Builder::new()
                .prefix("cpscan-")
                .tempdir()
                .map_err(OpenError::io)?;
            *guard = Some(dir);
        }
        let dir = guard.as_ref().expect("temp dir initialized");
        let n = self.extract_counter.fetch_add(1, Ordering::Relaxed);
        Ok(dir.path().join(format!("nested-{n}.zip")))
    }

    /// Releases temporary files. Idempotent; later archive opens fail and
    /// reads against extracted archives report missing files.
    pub fn close(&self, log: &ScanLog) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dir = self.temp_dir.lock().expect("temp dir poisoned").take();
        if let Some(dir) = dir {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => log.msg(format!("Removed temporary files under {}", path.display())),
                Err(err) => log.msg(format!(
                    "Failed to remove temporary files under {}: {err}",
                    path.display()
                )),
            }
        }
    }

    /// Whether close has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for NestedArchiveHandler {
    fn default() -> Self {
        Self::new()
    }
}
