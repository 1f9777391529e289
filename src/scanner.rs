//! Top-level scan orchestration.
//!
//! `Scanner::scan` drives the pipeline: raw paths are opened in parallel
//! through the work queue (registering elements in the singleton map and
//! following manifest cross-references), then the main thread serially
//! orders elements and detects nested roots. When a scan was requested it
//! goes on to run the parallel path-scan phase, filter and mask the
//! inventories, run the parallel classfile phase (re-entered by upward
//! closure), and link the collected records into the type graph.
//!
//! Failure semantics: per-artifact failures are logged inside the phases
//! and never surface here; the first scan-terminal failure closes the
//! nested archive handler, invokes the failure hook if one is registered,
//! and is returned to the caller with later failures attached as
//! suppressed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::SystemTime;

use crossbeam_queue::SegQueue;

use crate::classfile::parse_classfile;
use crate::closure::{self, ClassfileUnit, ScannedNames};
use crate::context::ScanContext;
use crate::element::{Element, ElementId, ElementKind, Resource};
use crate::errors::{OpenError, ScanError};
use crate::input::{ClasspathInput, LoaderRef};
use crate::interrupt::InterruptionMonitor;
use crate::link::{self, TypeGraph};
use crate::log::ScanLog;
use crate::mask;
use crate::nested::NestedArchiveHandler;
use crate::order::{find_classpath_order, find_nested_roots};
use crate::path_resolver::{
    canonicalize_base, classfile_path_to_class_name, has_jar_prefix, is_remote_url, normalize,
    split_archive,
};
use crate::scan_spec::ScanSpec;
use crate::work_queue::run_work_queue;

/// Work unit for the opener phase.
struct OpenUnit {
    raw: String,
    parent: Option<ElementId>,
    order: u32,
}

/// Callback invoked with the finished result on the scan thread.
pub type ResultProcessor = Box<dyn Fn(&ScanResult) -> Result<(), String> + Send + Sync>;
/// Callback invoked with the terminal failure before it is returned.
pub type FailureHook = Box<dyn Fn(&ScanError) -> Result<(), String> + Send + Sync>;

/// The classpath scanner.
pub struct Scanner {
    spec: ScanSpec,
    input: ClasspathInput,
    log: ScanLog,
    monitor: Arc<InterruptionMonitor>,
    result_processor: Option<ResultProcessor>,
    failure_hook: Option<FailureHook>,
}

impl Scanner {
    pub fn new(spec: ScanSpec, input: ClasspathInput) -> Self {
        Self {
            spec,
            input,
            log: ScanLog::disabled(),
            monitor: Arc::new(InterruptionMonitor::new()),
            result_processor: None,
            failure_hook: None,
        }
    }

    pub fn with_log(mut self, log: ScanLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_result_processor(mut self, processor: ResultProcessor) -> Self {
        self.result_processor = Some(processor);
        self
    }

    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.failure_hook = Some(hook);
        self
    }

    /// Handle for cancelling this scan from another thread.
    pub fn cancellation(&self) -> Arc<InterruptionMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Runs the scan to completion.
    pub fn scan(self) -> Result<ScanResult, ScanError> {
        let Self {
            spec,
            input,
            log,
            monitor,
            result_processor,
            failure_hook,
        } = self;
        spec.validate();

        let raw_paths: Vec<String> = spec
            .override_classpath
            .clone()
            .unwrap_or_else(|| input.raw_paths.clone());
        let parallelism = spec.effective_parallelism(raw_paths.len());
        let remove_temps = spec.remove_temporary_files_after_scan;
        let context_loaders = spec
            .override_loaders
            .clone()
            .unwrap_or_else(|| input.context_loaders.clone());

        let ctx = ScanContext::new(spec, input.path_loaders.clone(), monitor);
        let outcome = run_scan(&ctx, &input, &raw_paths, parallelism, &log);

        let ScanContext {
            spec,
            registry,
            nested,
            ..
        } = ctx;

        match outcome {
            Ok(parts) => {
                let result = ScanResult {
                    order: parts.order,
                    order_strings: parts.order_strings,
                    registry,
                    context_loaders,
                    graph: parts.graph,
                    file_last_modified: parts.file_last_modified,
                    module_path_exports: spec.module_path_info.exports(),
                    module_path_opens: spec.module_path_info.opens(),
                    nested: Arc::clone(&nested),
                };

                if let Some(processor) = &result_processor {
                    log.flush();
                    if let Err(detail) = processor(&result) {
                        let err = ScanError::result_processor(detail);
                        return Err(fail(err, &nested, failure_hook.as_ref(), &log));
                    }
                }

                if remove_temps {
                    nested.close(&log);
                }
                log.msg("Completed");
                log.flush();
                Ok(result)
            }
            Err(err) => Err(fail(err, &nested, failure_hook.as_ref(), &log)),
        }
    }
}

/// Terminal-failure path: close the handler, run the hook, attach hook
/// failures to the original.
fn fail(
    err: ScanError,
    nested: &NestedArchiveHandler,
    failure_hook: Option<&FailureHook>,
    log: &ScanLog,
) -> ScanError {
    if err.is_cancelled() {
        log.msg("Scan cancelled");
    } else {
        log.msg(format!("Uncaught exception during scan: {err}"));
    }
    nested.close(log);
    let err = match failure_hook {
        None => err,
        Some(hook) => {
            log.flush();
            match hook(&err) {
                Ok(()) => err,
                Err(detail) => {
                    log.msg(format!("The failure hook failed: {detail}"));
                    ScanError::failure_hook(detail, err)
                }
            }
        }
    };
    log.flush();
    err
}

struct ScanParts {
    order: Vec<ElementId>,
    order_strings: Vec<String>,
    graph: Option<TypeGraph>,
    file_last_modified: Vec<(PathBuf, SystemTime)>,
}

fn run_scan(
    ctx: &ScanContext,
    input: &ClasspathInput,
    raw_paths: &[String],
    parallelism: usize,
    log: &ScanLog,
) -> Result<ScanParts, ScanError> {
    let finder_log = log.child("Finding classpath entries");

    // Modules precede the traditional classpath, in module-finder order,
    // unless an override replaced the classpath or the loader contexts.
    let mut module_order: Vec<ElementId> = Vec::new();
    if ctx.spec.scan_modules
        && ctx.spec.override_classpath.is_none()
        && ctx.spec.override_loaders.is_none()
    {
        let module_refs = input
            .system_modules
            .iter()
            .map(|m| (m, true))
            .chain(input.non_system_modules.iter().map(|m| (m, false)));
        for (module_ref, is_system) in module_refs {
            if !ctx.spec.module_accepted(&module_ref.name, is_system) {
                finder_log.msg(format!(
                    "Skipping non-accepted module: {}",
                    module_ref.name
                ));
                continue;
            }
            let element = ctx.registry.add(
                ElementKind::Module {
                    module: module_ref.clone(),
                },
                module_ref.name.clone(),
                Vec::new(),
            );
            element.mark_opened();
            element.open(ctx, &|_, _| {}, &finder_log);
            if !element.is_skipped() {
                module_order.push(element.id);
            }
        }
    }

    // Opener phase: one unit per raw entry; manifest cross-references are
    // enqueued in flight.
    let open_units: Vec<OpenUnit> = raw_paths
        .iter()
        .enumerate()
        .map(|(index, raw)| OpenUnit {
            raw: raw.clone(),
            parent: None,
            order: index as u32,
        })
        .collect();
    let toplevel: Mutex<Vec<(u32, ElementId)>> = Mutex::new(Vec::new());

    let open_log = finder_log.child("Opening classpath elements");
    run_work_queue(
        open_units,
        parallelism,
        &ctx.monitor,
        &open_log,
        |unit: OpenUnit, queue, log| {
            match open_element(ctx, &unit.raw, log) {
                Err(err) => {
                    log.msg(format!(
                        "Skipping invalid classpath element {}: {err}",
                        unit.raw
                    ));
                }
                Ok(id) => {
                    let element = ctx.registry.get(id);
                    // Aliases converge on one element; only the first open
                    // registers it in the ordering structures.
                    if element.mark_opened() {
                        element.open(
                            ctx,
                            &|raw, order| {
                                queue.add_work_unit(OpenUnit {
                                    raw,
                                    parent: Some(id),
                                    order,
                                })
                            },
                            log,
                        );
                        match unit.parent {
                            Some(parent) => ctx.registry.get(parent).add_child(unit.order, id),
                            None => toplevel
                                .lock()
                                .expect("toplevel order poisoned")
                                .push((unit.order, id)),
                        }
                    }
                }
            }
            Ok(())
        },
    )?;
    open_log.done();

    // Serial ordering over the opened element graph.
    let toplevel = toplevel.into_inner().expect("toplevel order poisoned");
    let traditional_order = find_classpath_order(&ctx.registry, toplevel);
    find_nested_roots(&ctx.registry, &traditional_order, &finder_log);

    let order_log = finder_log.child("Final classpath element order:");
    let mut order = Vec::with_capacity(module_order.len() + traditional_order.len());
    let mut order_strings = Vec::with_capacity(order.capacity());
    for id in module_order.into_iter().chain(traditional_order) {
        let element = ctx.registry.get(id);
        order_log.msg(element.identity().to_string());
        order_strings.push(element.identity().to_string());
        order.push(id);
    }
    finder_log.done();
    ctx.monitor.check()?;

    if !ctx.spec.perform_scan {
        log.msg("Only returning classpath elements (not performing a scan)");
        return Ok(ScanParts {
            order,
            order_strings,
            graph: None,
            file_last_modified: Vec::new(),
        });
    }

    // Path-scan phase: one unit per element, no in-flight enqueues.
    let path_log = log.child("Scanning filenames within classpath elements");
    run_work_queue(
        order.clone(),
        parallelism,
        &ctx.monitor,
        &path_log,
        |id: ElementId, _queue, log| {
            ctx.registry.get(id).scan_paths(ctx, log);
            Ok(())
        },
    )?;
    path_log.done();

    // Keep only elements containing a specifically-accepted resource when
    // the element-resource-path accept list is in force.
    let filtered_order: Vec<ElementId> =
        if ctx.spec.element_resource_paths.accept_is_empty() {
            order.clone()
        } else {
            order
                .iter()
                .copied()
                .filter(|&id| {
                    ctx.registry
                        .get(id)
                        .contains_specifically_accepted_resource()
                })
                .collect()
        };

    mask::mask_classfiles(&ctx.registry, &filtered_order, &log.child("Masking classfiles"));

    let mut file_last_modified: Vec<(PathBuf, SystemTime)> = Vec::new();
    for &id in &filtered_order {
        if let Some(scan) = ctx.registry.get(id).scan_output() {
            file_last_modified.extend(scan.file_last_modified.iter().cloned());
        }
    }

    if !ctx.spec.enable_class_info {
        log.msg("Classfile scanning is disabled");
        return Ok(ScanParts {
            order,
            order_strings,
            graph: Some(TypeGraph::default()),
            file_last_modified,
        });
    }

    // Classfile-scan phase over the masked inventories. The scanned-names
    // set is pre-seeded with every included classfile's type name so upward
    // closure never re-enqueues an included type.
    let scanned = ScannedNames::new();
    let mut classfile_units: Vec<ClassfileUnit> = Vec::new();
    for &id in &filtered_order {
        let element = ctx.registry.get(id);
        for resource in element.masked_classfiles() {
            scanned.add_if_absent(&classfile_path_to_class_name(&resource.path));
            classfile_units.push(ClassfileUnit {
                element: id,
                resource: resource.clone(),
                is_external: false,
            });
        }
    }

    let records: SegQueue<crate::classfile::UnlinkedClass> = SegQueue::new();
    let classfile_log = log.child("Scanning classfiles");
    run_work_queue(
        classfile_units,
        parallelism,
        &ctx.monitor,
        &classfile_log,
        |unit: ClassfileUnit, queue, log| {
            if ctx.monitor.is_tripped() {
                return Ok(());
            }
            let sub = log.child(format!("Parsing classfile {}", unit.resource.path));
            let bytes = match unit.resource.read() {
                Ok(bytes) => bytes,
                Err(err) => {
                    sub.msg(format!(
                        "I/O error while reading classfile {}: {err}",
                        unit.resource.path
                    ));
                    return Ok(());
                }
            };
            match parse_classfile(&bytes, unit.element, unit.is_external) {
                Err(err) => {
                    sub.msg(format!(
                        "Corrupt or unsupported classfile {}: {err}",
                        unit.resource.path
                    ));
                }
                Ok(record) => {
                    if ctx.spec.extend_scanning_upwards {
                        let additional = closure::extend_upwards(
                            &ctx.registry,
                            &filtered_order,
                            unit.element,
                            &record,
                            &scanned,
                            &sub,
                        );
                        queue.add_work_units(additional);
                    }
                    records.push(record);
                }
            }
            sub.done();
            Ok(())
        },
    )?;
    classfile_log.done();

    let mut collected = Vec::with_capacity(records.len());
    while let Some(record) = records.pop() {
        collected.push(record);
    }

    let link_log = log.child("Building class graph");
    let graph = link::link(collected, &ctx.registry, &link_log);
    link_log.done();
    ctx.monitor.check()?;

    Ok(ScanParts {
        order,
        order_strings,
        graph: Some(graph),
        file_last_modified,
    })
}

/// Looks up or constructs the element for one raw classpath path.
fn open_element(
    ctx: &ScanContext,
    raw: &str,
    log: &ScanLog,
) -> Result<ElementId, Arc<OpenError>> {
    ctx.elements_by_path
        .get(raw, log, |key, log| build_element(ctx, key, log))
}

/// Singleton factory: resolves, canonicalizes, validates, and classifies one
/// raw path. A path whose canonical form differs re-enters the singleton map
/// under the canonical key, merging non-canonical aliases into one element;
/// the resolver is idempotent, so this recurses at most once.
fn build_element(ctx: &ScanContext, raw: &str, log: &ScanLog) -> Result<ElementId, OpenError> {
    let loaders: Vec<LoaderRef> = ctx.path_loaders.get(raw).cloned().unwrap_or_default();

    if is_remote_url(raw) {
        // Remote archives keep the URL as canonical identity; open() skips
        // them since fetching is out of scope.
        let element = ctx.registry.add(
            ElementKind::Zip {
                view: OnceLock::new(),
            },
            raw.to_string(),
            loaders,
        );
        return Ok(element.id);
    }

    let normalized = normalize(&ctx.work_dir, raw);
    let (base, inner) = split_archive(&normalized);
    let canonical_base = canonicalize_base(base)?;

    let canonical = match inner {
        None => canonical_base.clone(),
        Some(inner) => format!("{canonical_base}!{inner}"),
    };
    if canonical != raw {
        return ctx
            .elements_by_path
            .get(&canonical, log, |key, log| build_element(ctx, key, log))
            .map_err(OpenError::Canonical);
    }

    let base_path = PathBuf::from(&canonical_base);
    let metadata = std::fs::metadata(&base_path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            OpenError::NotFound {
                path: canonical_base.clone(),
            }
        } else {
            OpenError::Io(err)
        }
    })?;

    let archive_marker = inner.is_some() || has_jar_prefix(raw);
    let element = if metadata.is_file() {
        if std::fs::File::open(&base_path).is_err() {
            return Err(OpenError::NotReadable {
                path: canonical_base,
            });
        }
        ctx.registry.add(
            ElementKind::Zip {
                view: OnceLock::new(),
            },
            canonical,
            loaders,
        )
    } else if metadata.is_dir() {
        if archive_marker {
            return Err(OpenError::ExpectedArchive {
                path: canonical_base,
            });
        }
        if std::fs::read_dir(&base_path).is_err() {
            return Err(OpenError::NotReadable {
                path: canonical_base,
            });
        }
        ctx.registry.add(ElementKind::Dir { path: base_path }, canonical, loaders)
    } else {
        return Err(OpenError::NotAFileOrDirectory {
            path: canonical_base,
        });
    };
    Ok(element.id)
}

/// The immutable outcome of one scan.
///
/// Holds the final element order (and string forms), the loader contexts,
/// the linked type graph (absent when `perform_scan` was off), the merged
/// file-modification record, and the nested archive handler for later
/// resource reads. Dropping the result releases any remaining temporary
/// files.
#[derive(Debug)]
pub struct ScanResult {
    order: Vec<ElementId>,
    order_strings: Vec<String>,
    registry: crate::element::ElementRegistry,
    context_loaders: Vec<LoaderRef>,
    graph: Option<TypeGraph>,
    file_last_modified: Vec<(PathBuf, SystemTime)>,
    module_path_exports: Vec<String>,
    module_path_opens: Vec<String>,
    nested: Arc<NestedArchiveHandler>,
}

impl ScanResult {
    /// Final element order.
    pub fn order(&self) -> &[ElementId] {
        &self.order
    }

    /// String forms of the final element order.
    pub fn order_strings(&self) -> &[String] {
        &self.order_strings
    }

    pub fn element(&self, id: ElementId) -> Arc<Element> {
        self.registry.get(id)
    }

    /// Elements in final order.
    pub fn elements(&self) -> Vec<Arc<Element>> {
        self.order.iter().map(|&id| self.registry.get(id)).collect()
    }

    pub fn context_loaders(&self) -> &[LoaderRef] {
        &self.context_loaders
    }

    /// The linked type graph; `None` when only ordering was requested.
    pub fn type_graph(&self) -> Option<&TypeGraph> {
        self.graph.as_ref()
    }

    pub fn file_last_modified(&self) -> &[(PathBuf, SystemTime)] {
        &self.file_last_modified
    }

    /// `Add-Exports` directives gathered from manifests, `=ALL-UNNAMED`
    /// qualified, deterministically ordered.
    pub fn module_path_exports(&self) -> &[String] {
        &self.module_path_exports
    }

    /// `Add-Opens` directives gathered from manifests.
    pub fn module_path_opens(&self) -> &[String] {
        &self.module_path_opens
    }

    /// Resolves a logical path against the final order (first match wins).
    pub fn get_resource(&self, path: &str) -> Option<Resource> {
        self.order
            .iter()
            .find_map(|&id| self.registry.get(id).get_resource(path))
    }

    /// Releases temporary files held for later resource access. Idempotent;
    /// also runs on drop.
    pub fn close(&self) {
        self.nested.close(&ScanLog::disabled());
    }
}

impl Drop for ScanResult {
    fn drop(&mut self) {
        self.close();
    }
}
