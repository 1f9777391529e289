//! Classfile masking.
//!
//! The same logical classfile path can occur in several elements; only the
//! first occurrence in final classpath order is visible. Masking walks the
//! ordered elements with one shared set of already-claimed paths; each
//! element drops the classfiles whose path is taken and claims the rest.
//! Non-classfile resources are never masked.

use ahash::AHashSet;

use crate::element::{ElementId, ElementRegistry};
use crate::log::ScanLog;

/// Applies first-wins masking across the final element order.
pub fn mask_classfiles(registry: &ElementRegistry, order: &[ElementId], log: &ScanLog) {
    let mut seen: AHashSet<String> = AHashSet::new();
    for &id in order {
        registry.get(id).mask_classfiles(&mut seen, log);
    }
    log.done();
}
