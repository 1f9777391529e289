//! Classfile binary parsing.
//!
//! The parser reads one classfile byte buffer into an [`UnlinkedClass`]: a
//! names-only record with no references to other records. Linking happens
//! later, serially, once every record has been collected. The parser is
//! deterministic for a given byte sequence; format violations surface as
//! [`ClassfileError`](crate::errors::ClassfileError) and drop the resource
//! without affecting the scan.

mod parse;

pub use parse::parse_classfile;

use crate::element::ElementId;

/// Class access flag: interface.
pub const ACC_INTERFACE: u16 = 0x0200;
/// Class access flag: annotation type.
pub const ACC_ANNOTATION: u16 = 0x2000;
/// Class access flag: module descriptor.
pub const ACC_MODULE: u16 = 0x8000;

/// A parsed field: name, modifiers, descriptor, annotation type names.
#[derive(Clone, Debug)]
pub struct UnlinkedField {
    pub name: String,
    pub modifiers: u16,
    pub descriptor: String,
    pub annotations: Vec<String>,
}

/// A parsed method, including per-parameter annotation type names.
#[derive(Clone, Debug)]
pub struct UnlinkedMethod {
    pub name: String,
    pub modifiers: u16,
    pub descriptor: String,
    pub annotations: Vec<String>,
    /// One inner list per declared parameter; empty when the classfile
    /// carries no parameter-annotation attribute.
    pub parameter_annotations: Vec<Vec<String>>,
}

/// The output of parsing one classfile: type name, modifiers, and the names
/// of everything it references. All type names are dotted.
#[derive(Clone, Debug)]
pub struct UnlinkedClass {
    pub name: String,
    pub modifiers: u16,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<String>,
    pub fields: Vec<UnlinkedField>,
    pub methods: Vec<UnlinkedMethod>,
    /// Element the classfile was read from.
    pub element: ElementId,
    /// True when this record was scheduled by upward closure rather than the
    /// include filters.
    pub is_external: bool,
}

impl UnlinkedClass {
    pub fn is_interface(&self) -> bool {
        (self.modifiers & ACC_INTERFACE) != 0
    }

    pub fn is_annotation(&self) -> bool {
        (self.modifiers & ACC_ANNOTATION) != 0
    }

    pub fn is_module_descriptor(&self) -> bool {
        (self.modifiers & ACC_MODULE) != 0
    }

    /// Every type name this record references: superclass, interfaces, and
    /// all annotation positions. Duplicates are not removed here.
    pub fn referenced_type_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if let Some(superclass) = &self.superclass {
            names.push(superclass.as_str());
        }
        names.extend(self.interfaces.iter().map(String::as_str));
        names.extend(self.annotations.iter().map(String::as_str));
        for method in &self.methods {
            names.extend(method.annotations.iter().map(String::as_str));
            for param in &method.parameter_annotations {
                names.extend(param.iter().map(String::as_str));
            }
        }
        for field in &self.fields {
            names.extend(field.annotations.iter().map(String::as_str));
        }
        names
    }
}
