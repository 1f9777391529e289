//! Directory classpath elements.
//!
//! Directory scans traverse the filesystem subtree in lexicographic order
//! per level, which makes resource enumeration deterministic regardless of
//! readdir order. Subtrees claimed by a nested classpath root are excluded
//! so the same artifacts are not scanned under two elements.

use std::path::{Path, PathBuf};

use crate::context::ScanContext;
use crate::log::ScanLog;

use super::{Element, PathScanOutput, Resource};

pub(super) fn open(element: &Element, path: &Path, log: &ScanLog) {
    // Readability probe: a directory we cannot enumerate is non-scannable.
    if let Err(err) = std::fs::read_dir(path) {
        log.msg(format!(
            "Skipping unreadable classpath directory {}: {err}",
            element.identity()
        ));
        element.set_skip();
    }
}

pub(super) fn scan_paths(
    element: &Element,
    ctx: &ScanContext,
    root: &Path,
    log: &ScanLog,
) -> Option<PathScanOutput> {
    let mut output = PathScanOutput::default();
    let prefixes = element.nested_root_prefixes();
    if let Ok(metadata) = std::fs::metadata(root) {
        if let Ok(modified) = metadata.modified() {
            output.file_last_modified.push((root.to_path_buf(), modified));
        }
    }
    if scan_dir(element, ctx, root, String::new(), &prefixes, &mut output, log).is_err() {
        // Abandoned at a cooperative checkpoint; the partial inventory is
        // discarded with the failing scan.
        return None;
    }
    Some(output)
}

/// One directory level. Returns `Err(())` when the monitor tripped.
fn scan_dir(
    element: &Element,
    ctx: &ScanContext,
    dir: &Path,
    rel_prefix: String,
    nested_roots: &[String],
    output: &mut PathScanOutput,
    log: &ScanLog,
) -> Result<(), ()> {
    if ctx.monitor.is_tripped() {
        return Err(());
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log.msg(format!("Cannot read directory {}: {err}", dir.display()));
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
            let rel_slash = format!("{rel}/");
            if nested_roots.iter().any(|p| rel_slash.starts_with(p)) {
                log.msg(format!("Not descending into nested classpath root {rel_slash}"));
                continue;
            }
            if let Ok(metadata) = std::fs::metadata(&path) {
                if let Ok(modified) = metadata.modified() {
                    output.file_last_modified.push((path.clone(), modified));
                }
            }
            scan_dir(element, ctx, &path, rel, nested_roots, output, log)?;
        } else {
            // Resources under a nested root belong to the nested element.
            let rel_slash = format!("{rel}/");
            if nested_roots
                .iter()
                .any(|p| rel.starts_with(p.as_str()) || rel_slash == *p)
            {
                continue;
            }
            let accepted_mtime = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok();
            let before = output.resources.len();
            element.classify_resource(
                ctx,
                output,
                Resource::from_file(element.id, rel, path.clone()),
                log,
            );
            if output.resources.len() > before {
                if let Some(modified) = accepted_mtime {
                    output.file_last_modified.push((path, modified));
                }
            }
        }
    }
    Ok(())
}

pub(super) fn get_resource(element: &Element, root: &Path, path: &str) -> Option<Resource> {
    let candidate = root.join(path);
    match std::fs::metadata(&candidate) {
        Ok(metadata) if metadata.is_file() => Some(Resource::from_file(
            element.id,
            path.to_string(),
            candidate,
        )),
        _ => None,
    }
}
