//! Linking parsed records into the type graph.
//!
//! The linker runs serially after the classfile phase drains. Records are
//! arena-linked: every class gets a stable [`ClassId`] into one vector,
//! references resolve to ids, and name-to-id maps sit on the side. A
//! referenced name with no parsed record gets a placeholder node so every
//! reference in the graph resolves; placeholders carry no classfile-derived
//! attributes.
//!
//! Package and module info records are materialized from the membership of
//! parsed (non-placeholder) classes.

use std::sync::Arc;

use ahash::AHashMap;

use crate::classfile::UnlinkedClass;
use crate::element::{Element, ElementId, ElementRegistry};
use crate::log::ScanLog;

/// Stable index of a class node in the type graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

/// Stable index of a package node in the type graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PackageId(pub u32);

/// Stable index of a module node in the type graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

/// A linked field: annotation references resolve to class ids.
#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    pub modifiers: u16,
    pub descriptor: String,
    pub annotations: Vec<ClassId>,
}

/// A linked method, with per-parameter annotation references.
#[derive(Clone, Debug)]
pub struct MethodInfo {
    pub name: String,
    pub modifiers: u16,
    pub descriptor: String,
    pub annotations: Vec<ClassId>,
    pub parameter_annotations: Vec<Vec<ClassId>>,
}

/// A linked class node.
#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub name: String,
    pub modifiers: u16,
    /// Scheduled by upward closure rather than the include filters.
    pub is_external: bool,
    /// Referenced by name only; no classfile was parsed for it.
    pub is_placeholder: bool,
    pub superclass: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub annotations: Vec<ClassId>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    /// Element the record came from; placeholders have none.
    pub element: Option<ElementId>,
    pub package: Option<PackageId>,
    pub module: Option<ModuleId>,
}

impl ClassInfo {
    fn placeholder(name: String) -> Self {
        Self {
            name,
            modifiers: 0,
            is_external: false,
            is_placeholder: true,
            superclass: None,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            element: None,
            package: None,
            module: None,
        }
    }
}

/// A linked package node.
#[derive(Clone, Debug)]
pub struct PackageInfo {
    pub name: String,
    pub classes: Vec<ClassId>,
}

/// A linked module node.
#[derive(Clone, Debug)]
pub struct ModuleInfo {
    pub name: String,
    pub classes: Vec<ClassId>,
}

/// The immutable linked graph: classes, packages, and modules, with
/// name-to-id maps for each.
#[derive(Debug, Default)]
pub struct TypeGraph {
    classes: Vec<ClassInfo>,
    by_class_name: AHashMap<String, ClassId>,
    packages: Vec<PackageInfo>,
    by_package_name: AHashMap<String, PackageId>,
    modules: Vec<ModuleInfo>,
    by_module_name: AHashMap<String, ModuleId>,
}

impl TypeGraph {
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.by_class_name.get(name).copied()
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.class_id(name).map(|id| self.class_by_id(id))
    }

    pub fn class_by_id(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.0 as usize]
    }

    pub fn classes(&self) -> &[ClassInfo] {
        &self.classes
    }

    pub fn package(&self, name: &str) -> Option<&PackageInfo> {
        self.by_package_name
            .get(name)
            .map(|id| &self.packages[id.0 as usize])
    }

    pub fn packages(&self) -> &[PackageInfo] {
        &self.packages
    }

    pub fn module(&self, name: &str) -> Option<&ModuleInfo> {
        self.by_module_name
            .get(name)
            .map(|id| &self.modules[id.0 as usize])
    }

    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    fn get_or_create(&mut self, name: &str) -> ClassId {
        if let Some(&id) = self.by_class_name.get(name) {
            return id;
        }
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(ClassInfo::placeholder(name.to_string()));
        self.by_class_name.insert(name.to_string(), id);
        id
    }

    fn get_or_create_package(&mut self, name: String) -> PackageId {
        if let Some(&id) = self.by_package_name.get(&name) {
            return id;
        }
        let id = PackageId(self.packages.len() as u32);
        self.packages.push(PackageInfo {
            name: name.clone(),
            classes: Vec::new(),
        });
        self.by_package_name.insert(name, id);
        id
    }

    fn get_or_create_module(&mut self, name: String) -> ModuleId {
        if let Some(&id) = self.by_module_name.get(&name) {
            return id;
        }
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(ModuleInfo {
            name: name.clone(),
            classes: Vec::new(),
        });
        self.by_module_name.insert(name, id);
        id
    }
}

fn package_name_of(class_name: &str) -> String {
    match class_name.rfind('.') {
        Some(idx) => class_name[..idx].to_string(),
        None => String::new(),
    }
}

fn module_name_of(element: &Element) -> Option<String> {
    if element.is_module() {
        Some(element.identity().to_string())
    } else {
        None
    }
}

/// Links collected records into a [`TypeGraph`].
///
/// Records arrive in nondeterministic queue order; they are sorted by name
/// first so id assignment is stable across runs. If two records carry the
/// same type name (possible only for corrupt inputs, since masking
/// deduplicates by path), the first kept record wins.
pub fn link(
    mut records: Vec<UnlinkedClass>,
    registry: &ElementRegistry,
    log: &ScanLog,
) -> TypeGraph {
    records.sort_by(|a, b| a.name.cmp(&b.name).then(a.is_external.cmp(&b.is_external)));

    let mut graph = TypeGraph::default();
    for record in records {
        let id = graph.get_or_create(&record.name);
        if !graph.classes[id.0 as usize].is_placeholder {
            log.msg(format!(
                "Ignoring duplicate record for class {}",
                record.name
            ));
            continue;
        }

        let superclass = record
            .superclass
            .as_deref()
            .map(|name| graph.get_or_create(name));
        let interfaces = record
            .interfaces
            .iter()
            .map(|name| graph.get_or_create(name))
            .collect();
        let annotations = record
            .annotations
            .iter()
            .map(|name| graph.get_or_create(name))
            .collect();
        let fields = record
            .fields
            .iter()
            .map(|field| FieldInfo {
                name: field.name.clone(),
                modifiers: field.modifiers,
                descriptor: field.descriptor.clone(),
                annotations: field
                    .annotations
                    .iter()
                    .map(|name| graph.get_or_create(name))
                    .collect(),
            })
            .collect();
        let methods = record
            .methods
            .iter()
            .map(|method| MethodInfo {
                name: method.name.clone(),
                modifiers: method.modifiers,
                descriptor: method.descriptor.clone(),
                annotations: method
                    .annotations
                    .iter()
                    .map(|name| graph.get_or_create(name))
                    .collect(),
                parameter_annotations: method
                    .parameter_annotations
                    .iter()
                    .map(|param| param.iter().map(|name| graph.get_or_create(name)).collect())
                    .collect(),
            })
            .collect();

        let element: Arc<Element> = registry.get(record.element);
        let package = graph.get_or_create_package(package_name_of(&record.name));
        let module = module_name_of(&element).map(|name| graph.get_or_create_module(name));

        let node = &mut graph.classes[id.0 as usize];
        node.modifiers = record.modifiers;
        node.is_external = record.is_external;
        node.is_placeholder = false;
        node.superclass = superclass;
        node.interfaces = interfaces;
        node.annotations = annotations;
        node.fields = fields;
        node.methods = methods;
        node.element = Some(record.element);
        node.package = Some(package);
        node.module = module;

        graph.packages[package.0 as usize].classes.push(id);
        if let Some(module) = module {
            graph.modules[module.0 as usize].classes.push(id);
        }
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;
    use std::path::PathBuf;

    fn record(name: &str, superclass: Option<&str>, element: ElementId) -> UnlinkedClass {
        UnlinkedClass {
            name: name.to_string(),
            modifiers: 0x0021,
            superclass: superclass.map(str::to_string),
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            element,
            is_external: false,
        }
    }

    fn test_registry() -> (ElementRegistry, ElementId) {
        let registry = ElementRegistry::new();
        let id = registry
            .add(
                ElementKind::Dir {
                    path: PathBuf::from("/cp"),
                },
                "/cp".to_string(),
                Vec::new(),
            )
            .id;
        (registry, id)
    }

    #[test]
    fn unresolved_references_become_placeholders() {
        let (registry, element) = test_registry();
        let graph = link(
            vec![record("com.x.T", Some("com.x.Missing"), element)],
            &registry,
            &ScanLog::disabled(),
        );
        let t = graph.class("com.x.T").expect("linked");
        assert!(!t.is_placeholder);
        let superclass = graph.class_by_id(t.superclass.expect("superclass id"));
        assert_eq!(superclass.name, "com.x.Missing");
        assert!(superclass.is_placeholder);
        assert_eq!(superclass.element, None);
    }

    #[test]
    fn packages_are_materialized_from_membership() {
        let (registry, element) = test_registry();
        let graph = link(
            vec![
                record("com.x.A", None, element),
                record("com.x.B", None, element),
                record("com.y.C", None, element),
            ],
            &registry,
            &ScanLog::disabled(),
        );
        let package = graph.package("com.x").expect("package exists");
        assert_eq!(package.classes.len(), 2);
        assert!(graph.package("com.y").is_some());
        assert!(graph.package("com.z").is_none());
    }

    #[test]
    fn duplicate_names_keep_first_record() {
        let (registry, element) = test_registry();
        let mut dup = record("com.x.T", None, element);
        dup.modifiers = 0xFFFF;
        let graph = link(
            vec![record("com.x.T", Some("com.x.Base"), element), dup],
            &registry,
            &ScanLog::disabled(),
        );
        let t = graph.class("com.x.T").expect("linked");
        assert!(t.superclass.is_some());
        assert_ne!(t.modifiers, 0xFFFF);
    }
}
