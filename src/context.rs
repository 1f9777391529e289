//! Per-scan shared state.
//!
//! One `ScanContext` is created per scan and threaded explicitly through
//! every call; there is no ambient process-wide state. All fields are safe
//! to share across worker threads.

use std::sync::Arc;

use ahash::AHashMap;

use crate::element::{ElementId, ElementRegistry};
use crate::input::LoaderRef;
use crate::interrupt::InterruptionMonitor;
use crate::nested::NestedArchiveHandler;
use crate::once_map::SingletonMap;
use crate::scan_spec::ScanSpec;

/// Shared state for one scan.
pub struct ScanContext {
    pub spec: ScanSpec,
    pub registry: ElementRegistry,
    /// Canonical-path singleton map: one element per canonical identity.
    pub elements_by_path: SingletonMap<ElementId>,
    /// Shared with the scan result for later resource access.
    pub nested: Arc<NestedArchiveHandler>,
    /// Shared so callers can cancel a running scan from outside.
    pub monitor: Arc<InterruptionMonitor>,
    /// Working directory used to resolve relative raw paths, fixed at scan
    /// start so every worker resolves identically.
    pub work_dir: String,
    /// Raw classpath path to the loader contexts that contributed it.
    pub path_loaders: AHashMap<String, Vec<LoaderRef>>,
}

impl ScanContext {
    pub fn new(
        spec: ScanSpec,
        path_loaders: AHashMap<String, Vec<LoaderRef>>,
        monitor: Arc<InterruptionMonitor>,
    ) -> Self {
        let work_dir = spec.work_dir();
        Self {
            spec,
            registry: ElementRegistry::new(),
            elements_by_path: SingletonMap::new(),
            nested: Arc::new(NestedArchiveHandler::new()),
            monitor,
            work_dir,
            path_loaders,
        }
    }
}
