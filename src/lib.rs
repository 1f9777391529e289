#![allow(dead_code)]
//! Parallel classpath scanner with deterministic ordering and first-wins
//! masking.
//!
//! Given an ordered list of raw classpath entry strings and a scan
//! specification, the engine produces a fully-linked graph of type
//! information records (classes, interfaces, annotations, methods, fields,
//! packages, modules):
//!
//! 1. Opener phase (work queue): raw paths resolve to canonical resource
//!    roots, deduplicated through a singleton map; archive manifests
//!    contribute `Class-Path` children in flight.
//! 2. Ordering (serial): toplevel sort, cycle-safe depth-first flatten,
//!    nested-root detection.
//! 3. Path scan (work queue): per-element resource inventories against the
//!    include/exclude filters.
//! 4. Masking (serial): first occurrence of a logical classfile path in
//!    classpath order wins.
//! 5. Classfile scan (work queue): binary parsing into unlinked records;
//!    upward closure schedules referenced external types in the same phase.
//! 6. Linking (serial): records join into an immutable type graph with
//!    placeholder nodes for unresolved references.
//!
//! Cancellation is cooperative throughout: a single monitor is polled
//! between work units and at I/O boundaries. Per-artifact failures are
//! logged and skipped; only cancellation and unexpected worker failures
//! terminate a scan.

pub mod classfile;
pub mod closure;
pub mod context;
pub mod element;
pub mod errors;
pub mod input;
pub mod interrupt;
pub mod link;
pub mod log;
pub mod mask;
pub mod nested;
pub mod once_map;
pub mod order;
pub mod path_resolver;
pub mod scan_spec;
pub mod scanner;
pub mod stdx;
pub mod work_queue;
pub mod zip;

pub use classfile::{UnlinkedClass, UnlinkedField, UnlinkedMethod};
pub use element::{Element, ElementId, Resource};
pub use errors::{ClassfileError, OpenError, ScanError, ScanErrorKind};
pub use input::{ClasspathInput, LoaderRef, ModuleRef};
pub use interrupt::InterruptionMonitor;
pub use link::{ClassId, ClassInfo, ModuleInfo, PackageInfo, TypeGraph};
pub use log::ScanLog;
pub use scan_spec::{AcceptReject, ScanSpec};
pub use scanner::{ScanResult, Scanner};
