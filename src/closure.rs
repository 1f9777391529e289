//! Upward-closure scheduling.
//!
//! When an included class references a type outside the include filter (its
//! superclass, an implemented interface, or an annotation at any position),
//! the referenced classfile can be located among the opened elements and
//! scheduled for parsing in the same run, flagged external.
//!
//! Termination is guaranteed: the scanned-names set admits each name once
//! (first-writer-wins), and the candidate universe is bounded by what is on
//! disk. Before the classfile phase starts the set is pre-seeded with every
//! included classfile's type name, so closure never re-enqueues an included
//! type.

use std::sync::Mutex;

use ahash::AHashSet;

use crate::classfile::UnlinkedClass;
use crate::element::{ElementId, ElementRegistry, Resource};
use crate::log::ScanLog;
use crate::path_resolver::class_name_to_classfile_path;

/// Root type whose absence is expected and never logged.
const WELL_KNOWN_ROOT: &str = "java.lang.Object";

/// Work unit for the classfile-scan phase.
pub struct ClassfileUnit {
    pub element: ElementId,
    pub resource: Resource,
    pub is_external: bool,
}

/// Concurrent first-writer-wins set of class names already scheduled.
pub struct ScannedNames {
    set: Mutex<AHashSet<String>>,
}

impl ScannedNames {
    pub fn new() -> Self {
        Self {
            set: Mutex::new(AHashSet::new()),
        }
    }

    /// Atomically adds `name`, returning `true` for the first caller.
    pub fn add_if_absent(&self, name: &str) -> bool {
        let mut set = self.set.lock().expect("scanned names poisoned");
        if set.contains(name) {
            return false;
        }
        set.insert(name.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.set
            .lock()
            .expect("scanned names poisoned")
            .contains(name)
    }

    pub fn len(&self) -> usize {
        self.set.lock().expect("scanned names poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ScannedNames {
    fn default() -> Self {
        Self::new()
    }
}

/// Schedules unscanned referenced types of `record` for parsing.
///
/// Each new name is resolved to a classfile resource by probing the owning
/// element first, then every other element in final order; names found
/// nowhere are logged (except the well-known root type).
pub fn extend_upwards(
    registry: &ElementRegistry,
    order: &[ElementId],
    owner: ElementId,
    record: &UnlinkedClass,
    scanned: &ScannedNames,
    log: &ScanLog,
) -> Vec<ClassfileUnit> {
    let mut additional = Vec::new();
    for name in record.referenced_type_names() {
        if !scanned.add_if_absent(name) {
            continue;
        }
        let classfile_path = class_name_to_classfile_path(name);

        let owner_element = registry.get(owner);
        let mut found: Option<(ElementId, Resource)> = owner_element
            .get_resource(&classfile_path)
            .map(|resource| (owner, resource));
        if found.is_none() {
            for &id in order {
                if id == owner {
                    continue;
                }
                if let Some(resource) = registry.get(id).get_resource(&classfile_path) {
                    found = Some((id, resource));
                    break;
                }
            }
        }

        match found {
            Some((element, resource)) => {
                log.msg(format!(
                    "Scheduling external class for scanning: {name} -- found in {}",
                    registry.get(element).identity()
                ));
                additional.push(ClassfileUnit {
                    element,
                    resource,
                    is_external: true,
                });
            }
            None => {
                if name != WELL_KNOWN_ROOT {
                    log.msg(format!(
                        "External type {name} was not found among classpath elements -- cannot extend scanning to it"
                    ));
                }
            }
        }
    }
    additional
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_if_absent_is_first_writer_wins() {
        let names = ScannedNames::new();
        assert!(names.add_if_absent("com.x.T"));
        assert!(!names.add_if_absent("com.x.T"));
        assert!(names.contains("com.x.T"));
        assert_eq!(names.len(), 1);
    }
}
