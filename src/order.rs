//! Classpath ordering and nested-root detection.
//!
//! Ordering runs serially between the opener and path-scan phases:
//! toplevel elements sort by their order index, each element's accumulated
//! children sort likewise, and a depth-first traversal emits each unseen,
//! unskipped element on first visit. The visited bitset breaks cycles, so a
//! manifest `Class-Path` loop terminates with each element emitted exactly
//! once.
//!
//! Nested-root detection then finds elements whose canonical path is a
//! prefix of another's (directories and archives in separate passes) and
//! records the relative prefix on the outer element, so the outer scan does
//! not descend into artifacts owned by the inner element.

use crate::element::{Element, ElementId, ElementRegistry};
use crate::log::ScanLog;
use crate::stdx::VisitedSet;
use std::sync::Arc;

/// Sorts `(order, element)` pairs into a stable ascending order.
fn order_indexed(mut indexed: Vec<(u32, ElementId)>) -> Vec<ElementId> {
    indexed.sort_by_key(|(order, _)| *order);
    indexed.into_iter().map(|(_, id)| id).collect()
}

/// Computes the final order of the traditional classpath.
///
/// Children referenced from manifests are inserted in place after the
/// parent that referenced them, unless an earlier visit already emitted
/// them.
pub fn find_classpath_order(
    registry: &ElementRegistry,
    toplevel_indexed: Vec<(u32, ElementId)>,
) -> Vec<ElementId> {
    let toplevel = order_indexed(toplevel_indexed);
    let element_count = registry.len();
    for idx in 0..element_count {
        let element = registry.get(ElementId(idx as u32));
        element.set_children_ordered(order_indexed(element.children_indexed()));
    }

    let mut visited = VisitedSet::empty(element_count);
    let mut order = Vec::new();
    for id in toplevel {
        visit(registry, id, &mut visited, &mut order);
    }
    order
}

fn visit(
    registry: &ElementRegistry,
    id: ElementId,
    visited: &mut VisitedSet,
    order: &mut Vec<ElementId>,
) {
    if !visited.insert(id.0 as usize) {
        return;
    }
    let element = registry.get(id);
    if !element.is_skipped() {
        order.push(id);
    }
    // A skipped element still forwards to its children.
    for child in element.children_ordered() {
        visit(registry, child, visited, order);
    }
}

/// Records nested-root prefixes for directory and archive elements.
///
/// Each kind is handled in its own pass (modules never nest). Within a
/// pass, elements sort lexicographically by canonical path; any element
/// whose path extends another's through a `/` or `!` separator, with no
/// further `!` in the suffix, registers its relative suffix (plus a
/// trailing `/`) on the outer element. Lexicographic order guarantees that
/// the first non-match ends the forward scan.
pub fn find_nested_roots(registry: &ElementRegistry, order: &[ElementId], log: &ScanLog) {
    let mut dirs: Vec<(String, Arc<Element>)> = Vec::new();
    let mut zips: Vec<(String, Arc<Element>)> = Vec::new();
    for &id in order {
        let element = registry.get(id);
        if element.is_dir() {
            dirs.push((element.identity().to_string(), element));
        } else if element.is_zip() {
            zips.push((element.identity().to_string(), element));
        }
    }
    find_nested_in(&mut dirs, log);
    find_nested_in(&mut zips, log);
}

fn find_nested_in(elements: &mut [(String, Arc<Element>)], log: &ScanLog) {
    elements.sort_by(|a, b| a.0.cmp(&b.0));
    for i in 0..elements.len() {
        let base = elements[i].0.clone();
        for j in i + 1..elements.len() {
            let compare = &elements[j].0;
            let mut found = false;
            if compare.len() > base.len() && compare.starts_with(base.as_str()) {
                let next = compare.as_bytes()[base.len()];
                if next == b'/' || next == b'!' {
                    let suffix = &compare[base.len() + 1..];
                    if !suffix.contains('!') {
                        found = true;
                        elements[i]
                            .1
                            .add_nested_root_prefix(format!("{suffix}/"));
                        log.msg(format!(
                            "{base} is a prefix of the nested element {compare}"
                        ));
                    }
                }
            }
            if !found {
                break;
            }
        }
    }
}
