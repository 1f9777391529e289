//! Module classpath elements.
//!
//! Modules are directory-backed roots with a declared package list. Path
//! scan walks the location like a directory element but only admits
//! resources whose package is exported by the module (an empty package list
//! exports everything). Modules never participate in nested-root detection.

use std::path::{Path, PathBuf};

use crate::context::ScanContext;
use crate::input::ModuleRef;
use crate::log::ScanLog;

use super::{Element, PathScanOutput, Resource};

pub(super) fn open(element: &Element, module: &ModuleRef, log: &ScanLog) {
    match &module.location {
        None => {
            log.msg(format!(
                "Skipping module without resolvable location: {}",
                module.name
            ));
            element.set_skip();
        }
        Some(location) => {
            if !location.is_dir() {
                log.msg(format!(
                    "Skipping module {} with missing location {}",
                    module.name,
                    location.display()
                ));
                element.set_skip();
            }
        }
    }
}

pub(super) fn scan_paths(
    element: &Element,
    ctx: &ScanContext,
    module: &ModuleRef,
    log: &ScanLog,
) -> Option<PathScanOutput> {
    let location = module.location.as_ref()?;
    let mut output = PathScanOutput::default();
    if let Ok(metadata) = std::fs::metadata(location) {
        if let Ok(modified) = metadata.modified() {
            output
                .file_last_modified
                .push((location.to_path_buf(), modified));
        }
    }
    if scan_dir(element, ctx, module, location, String::new(), &mut output, log).is_err() {
        return None;
    }
    Some(output)
}

fn package_of(rel: &str) -> String {
    match rel.rfind('/') {
        Some(idx) => rel[..idx].replace('/', "."),
        None => String::new(),
    }
}

fn exported(module: &ModuleRef, rel: &str) -> bool {
    if module.packages.is_empty() {
        return true;
    }
    let package = package_of(rel);
    module.packages.iter().any(|p| *p == package)
}

/// One directory level. Returns `Err(())` when the monitor tripped.
fn scan_dir(
    element: &Element,
    ctx: &ScanContext,
    module: &ModuleRef,
    dir: &Path,
    rel_prefix: String,
    output: &mut PathScanOutput,
    log: &ScanLog,
) -> Result<(), ()> {
    if ctx.monitor.is_tripped() {
        return Err(());
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log.msg(format!("Cannot read module directory {}: {err}", dir.display()));
            return Ok(());
        }
    };
    let mut names: Vec<(String, PathBuf, bool)> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        names.push((name, entry.path(), is_dir));
    }
    names.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, path, is_dir) in names {
        let rel = if rel_prefix.is_empty() {
            name
        } else {
            format!("{rel_prefix}/{name}")
        };
        if is_dir {
            scan_dir(element, ctx, module, &path, rel, output, log)?;
        } else if exported(module, &rel) {
            element.classify_resource(
                ctx,
                output,
                Resource::from_file(element.id, rel, path),
                log,
            );
        }
    }
    Ok(())
}

pub(super) fn get_resource(element: &Element, module: &ModuleRef, path: &str) -> Option<Resource> {
    let location = module.location.as_ref()?;
    let candidate = location.join(path);
    match std::fs::metadata(&candidate) {
        Ok(metadata) if metadata.is_file() => Some(Resource::from_file(
            element.id,
            path.to_string(),
            candidate,
        )),
        _ => None,
    }
}
