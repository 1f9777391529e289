//! Archive classpath elements.
//!
//! `open` resolves the logical archive view through the nested archive
//! handler (following any `!` chain), then consumes the manifest: every
//! `Class-Path` token becomes a child opener unit with its manifest position
//! as order index, and `Add-Exports`/`Add-Opens` tokens are appended to the
//! scan spec's module-path info. Remote archives are identified by their URL
//! and skipped; they are never fetched.
//!
//! Path scan iterates the central directory in archive order, re-rooted
//! under the view's package prefix when one is present.

use std::sync::Arc;

use crate::context::ScanContext;
use crate::log::ScanLog;
use crate::path_resolver::{is_remote_url, split_archive};
use crate::zip::split_manifest_value;

use super::{Element, ElementKind, PathScanOutput, Resource};

pub(super) fn open(
    element: &Element,
    ctx: &ScanContext,
    enqueue_child: &dyn Fn(String, u32),
    log: &ScanLog,
) {
    let canonical = element.identity();
    if is_remote_url(canonical) {
        log.msg(format!("Skipping remote archive (not fetched): {canonical}"));
        element.set_skip();
        return;
    }

    let (base, inner) = split_archive(canonical);
    let view = match ctx.nested.open_view(base, inner, log) {
        Ok(view) => view,
        Err(err) => {
            log.msg(format!("Skipping invalid archive {canonical}: {err}"));
            element.set_skip();
            return;
        }
    };

    if let Some(manifest) = view.zip.manifest() {
        if let Some(class_path) = &manifest.class_path {
            // Tokens resolve relative to the archive's parent directory.
            let parent_dir = match base.rfind('/') {
                Some(idx) => &base[..idx],
                None => "",
            };
            for (position, token) in split_manifest_value(class_path).iter().enumerate() {
                let child_path = if token.starts_with('/') || token.contains(':') {
                    (*token).to_string()
                } else {
                    format!("{parent_dir}/{token}")
                };
                log.msg(format!("Found Class-Path entry in manifest: {token}"));
                enqueue_child(child_path, position as u32);
            }
        }
        if let Some(add_exports) = &manifest.add_exports {
            for token in split_manifest_value(add_exports) {
                ctx.spec.module_path_info.add_export(token);
            }
        }
        if let Some(add_opens) = &manifest.add_opens {
            for token in split_manifest_value(add_opens) {
                ctx.spec.module_path_info.add_open(token);
            }
        }
    }

    let ElementKind::Zip { view: slot } = &element.kind else {
        unreachable!("zip open on non-zip element");
    };
    let _ = slot.set(view);
}

pub(super) fn scan_paths(
    element: &Element,
    ctx: &ScanContext,
    log: &ScanLog,
) -> Option<PathScanOutput> {
    let ElementKind::Zip { view } = &element.kind else {
        unreachable!("zip scan on non-zip element");
    };
    let view = view.get()?;
    if ctx.monitor.is_tripped() {
        return None;
    }

    let mut output = PathScanOutput::default();
    if let Some(modified) = view.zip.last_modified() {
        output
            .file_last_modified
            .push((view.zip.path().to_path_buf(), modified));
    }

    let prefixes = element.nested_root_prefixes();
    for (index, entry) in view.zip.entries().iter().enumerate() {
        if entry.is_dir {
            continue;
        }
        let rel = if view.root_prefix.is_empty() {
            entry.name.as_str()
        } else {
            match entry.name.strip_prefix(view.root_prefix.as_str()) {
                Some(rel) => rel,
                None => continue,
            }
        };
        if rel.is_empty() {
            continue;
        }
        if prefixes.iter().any(|p| rel.starts_with(p.as_str())) {
            continue;
        }
        element.classify_resource(
            ctx,
            &mut output,
            Resource::from_zip_entry(
                element.id,
                rel.to_string(),
                Arc::clone(&view.zip),
                index as u32,
            ),
            log,
        );
    }
    Some(output)
}
