//! Classpath elements: the polymorphic handle over one scan root.
//!
//! An element is a tagged variant {directory, archive, module} sharing one
//! capability set: `open`, `scan_paths`, `get_resource`, `mask_classfiles`.
//! There is no inheritance hierarchy; per-kind behavior lives in the sibling
//! modules and dispatch happens on the tag.
//!
//! # Mutation discipline
//!
//! Exactly one element exists per canonical identity (the Singleton Map
//! enforces this), and exactly one worker mutates an element during `open`
//! and during `scan_paths` (partitioned by identity and by per-element work
//! unit respectively). Cross-phase reads are separated by the phase
//! boundary, so one-shot cells and short-lived mutexes are all the
//! synchronization an element needs; there is no element-level lock held
//! across I/O.

mod dir;
mod module;
mod zip;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::SystemTime;

use ahash::AHashSet;

use crate::context::ScanContext;
use crate::input::{LoaderRef, ModuleRef};
use crate::log::ScanLog;
use crate::nested::ZipView;
use crate::zip::ZipFile;

/// Stable index of an element in the per-scan registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementId(pub u32);

/// The element variant tag plus per-kind state.
#[derive(Debug)]
pub enum ElementKind {
    /// A directory root (canonical filesystem path).
    Dir { path: PathBuf },
    /// An archive root; the logical view is resolved during `open`.
    Zip { view: OnceLock<ZipView> },
    /// A module root reported by discovery.
    Module { module: ModuleRef },
}

/// A handle to one addressable artifact inside an element.
#[derive(Clone, Debug)]
pub struct Resource {
    pub element: ElementId,
    /// Logical path relative to the element root, forward slashes.
    pub path: String,
    origin: ResourceOrigin,
}

#[derive(Clone, Debug)]
enum ResourceOrigin {
    File(PathBuf),
    ZipEntry { zip: Arc<ZipFile>, index: u32 },
}

impl Resource {
    pub(crate) fn from_file(element: ElementId, path: String, file: PathBuf) -> Self {
        Self {
            element,
            path,
            origin: ResourceOrigin::File(file),
        }
    }

    pub(crate) fn from_zip_entry(
        element: ElementId,
        path: String,
        zip: Arc<ZipFile>,
        index: u32,
    ) -> Self {
        Self {
            element,
            path,
            origin: ResourceOrigin::ZipEntry { zip, index },
        }
    }

    /// Reads the full byte content of this resource.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        match &self.origin {
            ResourceOrigin::File(file) => std::fs::read(file),
            ResourceOrigin::ZipEntry { zip, index } => zip.read_entry(*index),
        }
    }
}

/// Inventory produced by one element's path scan.
#[derive(Debug, Default)]
pub struct PathScanOutput {
    /// Accepted classfile resources, element-natural order.
    pub classfiles: Vec<Resource>,
    /// All accepted resources (classfiles included), element-natural order.
    pub resources: Vec<Resource>,
    /// Files and directories touched, with their modification times.
    pub file_last_modified: Vec<(PathBuf, SystemTime)>,
}

/// One classpath root.
pub struct Element {
    pub id: ElementId,
    pub kind: ElementKind,
    /// Canonical identity: filesystem path, archive chain, or module name.
    identity: String,
    /// Loader contexts that contributed this element (lookup only).
    loaders: Vec<LoaderRef>,

    skip: AtomicBool,
    opened: AtomicBool,

    /// Children discovered from manifest cross-references, with their order
    /// index within this parent; appended concurrently during the opener
    /// phase, sorted into `children_ordered` before ordering.
    children_indexed: Mutex<Vec<(u32, ElementId)>>,
    children_ordered: Mutex<Vec<ElementId>>,

    /// Relative prefixes of elements nested inside this one.
    nested_root_prefixes: Mutex<Vec<String>>,

    scan: OnceLock<PathScanOutput>,
    masked: OnceLock<Vec<Resource>>,
    has_specifically_accepted_resource: AtomicBool,
}

impl Element {
    pub(crate) fn new(
        id: ElementId,
        kind: ElementKind,
        identity: String,
        loaders: Vec<LoaderRef>,
    ) -> Self {
        Self {
            id,
            kind,
            identity,
            loaders,
            skip: AtomicBool::new(false),
            opened: AtomicBool::new(false),
            children_indexed: Mutex::new(Vec::new()),
            children_ordered: Mutex::new(Vec::new()),
            nested_root_prefixes: Mutex::new(Vec::new()),
            scan: OnceLock::new(),
            masked: OnceLock::new(),
            has_specifically_accepted_resource: AtomicBool::new(false),
        }
    }

    /// Canonical identity string.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn loaders(&self) -> &[LoaderRef] {
        &self.loaders
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, ElementKind::Dir { .. })
    }

    pub fn is_zip(&self) -> bool {
        matches!(self.kind, ElementKind::Zip { .. })
    }

    pub fn is_module(&self) -> bool {
        matches!(self.kind, ElementKind::Module { .. })
    }

    /// Whether `open` determined this element is invalid or non-scannable.
    pub fn is_skipped(&self) -> bool {
        self.skip.load(Ordering::Acquire)
    }

    pub(crate) fn set_skip(&self) {
        self.skip.store(true, Ordering::Release);
    }

    /// First-writer-wins open guard: aliases of one canonical element race
    /// here and only the winner runs `open`.
    pub(crate) fn mark_opened(&self) -> bool {
        !self.opened.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn add_child(&self, order: u32, child: ElementId) {
        self.children_indexed
            .lock()
            .expect("children poisoned")
            .push((order, child));
    }

    pub(crate) fn children_indexed(&self) -> Vec<(u32, ElementId)> {
        self.children_indexed
            .lock()
            .expect("children poisoned")
            .clone()
    }

    pub(crate) fn set_children_ordered(&self, ordered: Vec<ElementId>) {
        *self.children_ordered.lock().expect("children poisoned") = ordered;
    }

    pub(crate) fn children_ordered(&self) -> Vec<ElementId> {
        self.children_ordered
            .lock()
            .expect("children poisoned")
            .clone()
    }

    pub(crate) fn add_nested_root_prefix(&self, prefix: String) {
        self.nested_root_prefixes
            .lock()
            .expect("nested roots poisoned")
            .push(prefix);
    }

    pub(crate) fn nested_root_prefixes(&self) -> Vec<String> {
        self.nested_root_prefixes
            .lock()
            .expect("nested roots poisoned")
            .clone()
    }

    /// Path-scan inventory; empty until `scan_paths` has run.
    pub fn scan_output(&self) -> Option<&PathScanOutput> {
        self.scan.get()
    }

    /// Post-masking classfile set; empty until masking has run.
    pub fn masked_classfiles(&self) -> &[Resource] {
        self.masked.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether path scan saw a specifically-accepted element resource path.
    pub fn contains_specifically_accepted_resource(&self) -> bool {
        self.has_specifically_accepted_resource
            .load(Ordering::Acquire)
    }

    // ----------------------------------------------------------------------
    // Capabilities
    // ----------------------------------------------------------------------

    /// Opens the element: validates it, resolves archive views, reads the
    /// manifest, and enqueues manifest cross-references through
    /// `enqueue_child(raw_path, order_index)`.
    ///
    /// Recoverable failures mark the element skipped and log; they never
    /// propagate.
    pub fn open(&self, ctx: &ScanContext, enqueue_child: &dyn Fn(String, u32), log: &ScanLog) {
        match &self.kind {
            ElementKind::Dir { path } => dir::open(self, path, log),
            ElementKind::Zip { .. } => zip::open(self, ctx, enqueue_child, log),
            ElementKind::Module { module } => module::open(self, module, log),
        }
    }

    /// Enumerates resources, classifies them against the scan filters, and
    /// records the element's inventory. Runs at most once, by one worker.
    ///
    /// Cooperatively abandons (leaving a partial or absent inventory) when
    /// the interruption monitor trips; the scan is failing at that point and
    /// the inventory is never observed.
    pub fn scan_paths(&self, ctx: &ScanContext, log: &ScanLog) {
        if self.is_skipped() || self.scan.get().is_some() {
            return;
        }
        let output = match &self.kind {
            ElementKind::Dir { path } => dir::scan_paths(self, ctx, path, log),
            ElementKind::Zip { .. } => zip::scan_paths(self, ctx, log),
            ElementKind::Module { module } => module::scan_paths(self, ctx, module, log),
        };
        if let Some(output) = output {
            let _ = self.scan.set(output);
        }
    }

    /// Looks up a single resource by logical path, ignoring filters.
    pub fn get_resource(&self, path: &str) -> Option<Resource> {
        if self.is_skipped() {
            return None;
        }
        match &self.kind {
            ElementKind::Dir { path: root } => dir::get_resource(self, root, path),
            ElementKind::Zip { view } => {
                let view = view.get()?;
                let index = view.entry_index(path)?;
                Some(Resource::from_zip_entry(
                    self.id,
                    path.to_string(),
                    Arc::clone(&view.zip),
                    index,
                ))
            }
            ElementKind::Module { module } => module::get_resource(self, module, path),
        }
    }

    /// Drops every classfile whose logical path was already claimed by an
    /// earlier element in the final order, and claims the rest.
    pub fn mask_classfiles(&self, seen: &mut AHashSet<String>, log: &ScanLog) {
        let Some(scan) = self.scan.get() else {
            let _ = self.masked.set(Vec::new());
            return;
        };
        let mut kept = Vec::with_capacity(scan.classfiles.len());
        for resource in &scan.classfiles {
            if seen.insert(resource.path.clone()) {
                kept.push(resource.clone());
            } else {
                log.msg(format!(
                    "Masking classfile {} in {}",
                    resource.path, self.identity
                ));
            }
        }
        let _ = self.masked.set(kept);
    }

    /// Classifies one discovered resource into the inventory.
    ///
    /// Shared by the per-kind scanners so directories, archives, and modules
    /// apply identical filter semantics.
    pub(crate) fn classify_resource(
        &self,
        ctx: &ScanContext,
        output: &mut PathScanOutput,
        resource: Resource,
        log: &ScanLog,
    ) {
        let path = resource.path.as_str();
        if ctx
            .spec
            .element_resource_paths
            .specifically_accepted_and_not_rejected(path)
        {
            self.has_specifically_accepted_resource
                .store(true, Ordering::Release);
        }
        if path.ends_with(".class") {
            if ctx.spec.classfile_accepted(path) {
                log.msg(format!("Found classfile {path}"));
                output.classfiles.push(resource.clone());
                output.resources.push(resource);
            }
        } else if ctx.spec.resource_accepted(path) {
            output.resources.push(resource);
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("skip", &self.is_skipped())
            .finish()
    }
}

/// Per-scan arena of elements, addressed by stable [`ElementId`].
///
/// Elements are appended during the opener phase and never removed; child
/// links are id lists, so the element graph (which may be cyclic through
/// manifest cross-references) never forms reference cycles.
#[derive(Debug)]
pub struct ElementRegistry {
    slots: Mutex<Vec<Arc<Element>>>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Creates and registers a new element, assigning the next id.
    pub fn add(
        &self,
        kind: ElementKind,
        identity: String,
        loaders: Vec<LoaderRef>,
    ) -> Arc<Element> {
        let mut slots = self.slots.lock().expect("element registry poisoned");
        assert!(slots.len() < u32::MAX as usize);
        let id = ElementId(slots.len() as u32);
        let element = Arc::new(Element::new(id, kind, identity, loaders));
        slots.push(Arc::clone(&element));
        element
    }

    pub fn get(&self, id: ElementId) -> Arc<Element> {
        let slots = self.slots.lock().expect("element registry poisoned");
        Arc::clone(&slots[id.0 as usize])
    }

    pub fn len(&self) -> usize {
        self.slots.lock().expect("element registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::new()
    }
}
