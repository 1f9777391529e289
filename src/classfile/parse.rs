//! Classfile binary reader.
//!
//! # Invariants
//! - Every multi-byte read is bounds-checked against the buffer; a short
//!   buffer produces `Truncated` with the failing offset.
//! - Constant pool indexes are validated on use, not trusted on read.
//! - Attribute payloads are skipped by their declared length, so unknown
//!   attributes never desynchronize the cursor.
//!
//! Only the structures the scan needs are materialized: the constant pool
//! keeps Utf8 and Class entries, annotation element values are skipped
//! structurally (names only), and method bodies are never touched.

use crate::element::ElementId;
use crate::errors::ClassfileError;

use super::{UnlinkedClass, UnlinkedField, UnlinkedMethod};

const MAGIC: u32 = 0xCAFE_BABE;

/// Constant pool entry, trimmed to what name resolution needs.
enum Const {
    Utf8(String),
    Class(u16),
    Other,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn truncated(&self) -> ClassfileError {
        ClassfileError::Truncated { offset: self.pos }
    }

    fn u8(&mut self) -> Result<u8, ClassfileError> {
        let b = *self.buf.get(self.pos).ok_or_else(|| self.truncated())?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16, ClassfileError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + 2)
            .ok_or_else(|| self.truncated())?;
        self.pos += 2;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, ClassfileError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| self.truncated())?;
        self.pos += 4;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], ClassfileError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + len)
            .ok_or_else(|| self.truncated())?;
        self.pos += len;
        Ok(bytes)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassfileError> {
        if self.pos + len > self.buf.len() {
            return Err(self.truncated());
        }
        self.pos += len;
        Ok(())
    }

    fn seek(&mut self, pos: usize) -> Result<(), ClassfileError> {
        if pos > self.buf.len() {
            return Err(self.truncated());
        }
        self.pos = pos;
        Ok(())
    }
}

struct ConstPool {
    entries: Vec<Const>,
}

impl ConstPool {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ClassfileError> {
        let count = reader.u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Const::Other); // index 0 is unused
        let mut index = 1u16;
        while index < count {
            let tag = reader.u8()?;
            match tag {
                1 => {
                    let len = reader.u16()? as usize;
                    let bytes = reader.bytes(len)?;
                    // Modified UTF-8 differs from UTF-8 only for NUL and
                    // supplementary characters; names are read lossily.
                    entries.push(Const::Utf8(String::from_utf8_lossy(bytes).into_owned()));
                }
                7 => {
                    let name_index = reader.u16()?;
                    entries.push(Const::Class(name_index));
                }
                8 | 16 | 19 | 20 => {
                    reader.skip(2)?;
                    entries.push(Const::Other);
                }
                15 => {
                    reader.skip(3)?;
                    entries.push(Const::Other);
                }
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    entries.push(Const::Other);
                }
                5 | 6 => {
                    // Longs and doubles occupy two pool slots.
                    reader.skip(8)?;
                    entries.push(Const::Other);
                    entries.push(Const::Other);
                    index += 1;
                }
                other => {
                    return Err(ClassfileError::BadConstantPoolTag { tag: other, index });
                }
            }
            index += 1;
        }
        Ok(Self { entries })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassfileError> {
        match self.entries.get(index as usize) {
            Some(Const::Utf8(s)) => Ok(s),
            _ => Err(ClassfileError::BadConstantPoolIndex { index }),
        }
    }

    /// Resolves a Class entry to a dotted type name; index 0 yields `None`.
    fn class_name(&self, index: u16) -> Result<Option<String>, ClassfileError> {
        if index == 0 {
            return Ok(None);
        }
        match self.entries.get(index as usize) {
            Some(Const::Class(name_index)) => {
                Ok(Some(self.utf8(*name_index)?.replace('/', ".")))
            }
            _ => Err(ClassfileError::BadConstantPoolIndex { index }),
        }
    }
}

/// Converts an annotation type descriptor (`Lcom/x/A;`) to a dotted name.
fn descriptor_to_class_name(descriptor: &str) -> Result<String, ClassfileError> {
    let inner = descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .ok_or_else(|| ClassfileError::BadDescriptor {
            detail: descriptor.to_string(),
        })?;
    Ok(inner.replace('/', "."))
}

fn read_annotation(
    reader: &mut Reader<'_>,
    pool: &ConstPool,
    out: &mut Vec<String>,
) -> Result<(), ClassfileError> {
    let type_index = reader.u16()?;
    out.push(descriptor_to_class_name(pool.utf8(type_index)?)?);
    let pairs = reader.u16()?;
    for _ in 0..pairs {
        reader.skip(2)?; // element name
        skip_element_value(reader, pool)?;
    }
    Ok(())
}

fn skip_element_value(reader: &mut Reader<'_>, pool: &ConstPool) -> Result<(), ClassfileError> {
    let tag = reader.u8()?;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => reader.skip(2),
        b'e' => reader.skip(4),
        b'@' => {
            let mut nested = Vec::new();
            read_annotation(reader, pool, &mut nested)
        }
        b'[' => {
            let count = reader.u16()?;
            for _ in 0..count {
                skip_element_value(reader, pool)?;
            }
            Ok(())
        }
        other => Err(ClassfileError::Unsupported {
            detail: format!("annotation element value tag {}", other as char),
        }),
    }
}

fn read_annotations(
    reader: &mut Reader<'_>,
    pool: &ConstPool,
    out: &mut Vec<String>,
) -> Result<(), ClassfileError> {
    let count = reader.u16()?;
    for _ in 0..count {
        read_annotation(reader, pool, out)?;
    }
    Ok(())
}

fn read_parameter_annotations(
    reader: &mut Reader<'_>,
    pool: &ConstPool,
    out: &mut Vec<Vec<String>>,
) -> Result<(), ClassfileError> {
    let parameters = reader.u8()? as usize;
    if out.len() < parameters {
        out.resize_with(parameters, Vec::new);
    }
    for param in out.iter_mut().take(parameters) {
        read_annotations(reader, pool, param)?;
    }
    Ok(())
}

/// Walks an attribute table, collecting annotation names and skipping
/// everything else by declared length.
fn read_attributes(
    reader: &mut Reader<'_>,
    pool: &ConstPool,
    annotations: &mut Vec<String>,
    parameter_annotations: Option<&mut Vec<Vec<String>>>,
) -> Result<(), ClassfileError> {
    let mut parameter_annotations = parameter_annotations;
    let count = reader.u16()?;
    for _ in 0..count {
        let name_index = reader.u16()?;
        let length = reader.u32()? as usize;
        let end = reader.pos + length;
        let name = pool.utf8(name_index)?;
        match name {
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                read_annotations(reader, pool, annotations)?;
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                if let Some(params) = parameter_annotations.as_deref_mut() {
                    read_parameter_annotations(reader, pool, params)?;
                }
            }
            _ => {}
        }
        // Trust the declared length for cursor placement even when the
        // payload was parsed, so a padded attribute cannot desynchronize.
        reader.seek(end)?;
    }
    Ok(())
}

/// Parses one classfile buffer into an [`UnlinkedClass`].
pub fn parse_classfile(
    bytes: &[u8],
    element: ElementId,
    is_external: bool,
) -> Result<UnlinkedClass, ClassfileError> {
    let mut reader = Reader::new(bytes);
    let magic = reader.u32()?;
    if magic != MAGIC {
        return Err(ClassfileError::BadMagic { value: magic });
    }
    reader.skip(4)?; // minor and major version

    let pool = ConstPool::read(&mut reader)?;

    let modifiers = reader.u16()?;
    let this_class = reader.u16()?;
    let name = pool
        .class_name(this_class)?
        .ok_or(ClassfileError::BadConstantPoolIndex { index: this_class })?;
    let superclass = pool.class_name(reader.u16()?)?;

    let interface_count = reader.u16()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let index = reader.u16()?;
        let interface = pool
            .class_name(index)?
            .ok_or(ClassfileError::BadConstantPoolIndex { index })?;
        interfaces.push(interface);
    }

    let field_count = reader.u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let field_modifiers = reader.u16()?;
        let field_name = pool.utf8(reader.u16()?)?.to_string();
        let descriptor = pool.utf8(reader.u16()?)?.to_string();
        let mut annotations = Vec::new();
        read_attributes(&mut reader, &pool, &mut annotations, None)?;
        fields.push(UnlinkedField {
            name: field_name,
            modifiers: field_modifiers,
            descriptor,
            annotations,
        });
    }

    let method_count = reader.u16()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        let method_modifiers = reader.u16()?;
        let method_name = pool.utf8(reader.u16()?)?.to_string();
        let descriptor = pool.utf8(reader.u16()?)?.to_string();
        let mut annotations = Vec::new();
        let mut parameter_annotations = Vec::new();
        read_attributes(
            &mut reader,
            &pool,
            &mut annotations,
            Some(&mut parameter_annotations),
        )?;
        methods.push(UnlinkedMethod {
            name: method_name,
            modifiers: method_modifiers,
            descriptor,
            annotations,
            parameter_annotations,
        });
    }

    let mut annotations = Vec::new();
    read_attributes(&mut reader, &pool, &mut annotations, None)?;

    Ok(UnlinkedClass {
        name,
        modifiers,
        superclass,
        interfaces,
        annotations,
        fields,
        methods,
        element,
        is_external,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal classfile builder: enough of the format to exercise the
    /// parser without a compiler.
    struct ClassBytes {
        pool: Vec<Vec<u8>>,
        ann_attr_name: u16,
    }

    impl ClassBytes {
        fn new() -> Self {
            Self {
                pool: Vec::new(),
                ann_attr_name: 0,
            }
        }

        fn prepare_annotation_attr(&mut self) {
            self.ann_attr_name = self.utf8("RuntimeVisibleAnnotations");
        }

        fn utf8(&mut self, s: &str) -> u16 {
            let mut entry = vec![1u8];
            entry.extend_from_slice(&(s.len() as u16).to_be_bytes());
            entry.extend_from_slice(s.as_bytes());
            self.pool.push(entry);
            self.pool.len() as u16
        }

        fn class(&mut self, slashed_name: &str) -> u16 {
            let name_index = self.utf8(slashed_name);
            let mut entry = vec![7u8];
            entry.extend_from_slice(&name_index.to_be_bytes());
            self.pool.push(entry);
            self.pool.len() as u16
        }

        fn build(
            &mut self,
            access: u16,
            this_class: u16,
            super_class: u16,
            interfaces: &[u16],
            class_annotations: &[u16],
        ) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes()); // minor
            out.extend_from_slice(&52u16.to_be_bytes()); // major
            out.extend_from_slice(&((self.pool.len() + 1) as u16).to_be_bytes());
            for entry in &self.pool {
                out.extend_from_slice(entry);
            }
            out.extend_from_slice(&access.to_be_bytes());
            out.extend_from_slice(&this_class.to_be_bytes());
            out.extend_from_slice(&super_class.to_be_bytes());
            out.extend_from_slice(&(interfaces.len() as u16).to_be_bytes());
            for &iface in interfaces {
                out.extend_from_slice(&iface.to_be_bytes());
            }
            out.extend_from_slice(&0u16.to_be_bytes()); // fields
            out.extend_from_slice(&0u16.to_be_bytes()); // methods
            if class_annotations.is_empty() {
                out.extend_from_slice(&0u16.to_be_bytes());
            } else {
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&self.ann_attr_name.to_be_bytes());
                let payload_len = 2 + class_annotations.len() * 4;
                out.extend_from_slice(&(payload_len as u32).to_be_bytes());
                out.extend_from_slice(&(class_annotations.len() as u16).to_be_bytes());
                for &type_index in class_annotations {
                    out.extend_from_slice(&type_index.to_be_bytes());
                    out.extend_from_slice(&0u16.to_be_bytes()); // no pairs
                }
            }
            out
        }
    }

    #[test]
    fn parses_name_super_and_interfaces() {
        let mut b = ClassBytes::new();
        let this = b.class("com/x/T");
        let superc = b.class("com/x/Base");
        let iface = b.class("com/x/Marker");
        let bytes = b.build(0x0021, this, superc, &[iface], &[]);

        let parsed = parse_classfile(&bytes, ElementId(0), false).expect("parses");
        assert_eq!(parsed.name, "com.x.T");
        assert_eq!(parsed.superclass.as_deref(), Some("com.x.Base"));
        assert_eq!(parsed.interfaces, vec!["com.x.Marker"]);
        assert!(!parsed.is_external);
    }

    #[test]
    fn parses_class_annotations() {
        let mut b = ClassBytes::new();
        b.prepare_annotation_attr();
        let this = b.class("com/x/T");
        let superc = b.class("java/lang/Object");
        let ann = b.utf8("Lcom/x/Marked;");
        let bytes = b.build(0x0021, this, superc, &[], &[ann]);

        let parsed = parse_classfile(&bytes, ElementId(0), false).expect("parses");
        assert_eq!(parsed.annotations, vec!["com.x.Marked"]);
        assert_eq!(parsed.referenced_type_names(), vec!["java.lang.Object", "com.x.Marked"]);
    }

    #[test]
    fn zero_super_class_means_no_superclass() {
        let mut b = ClassBytes::new();
        let this = b.class("java/lang/Object");
        let bytes = b.build(0x0021, this, 0, &[], &[]);
        let parsed = parse_classfile(&bytes, ElementId(0), false).expect("parses");
        assert_eq!(parsed.superclass, None);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = parse_classfile(&[0, 1, 2, 3, 4, 5, 6, 7], ElementId(0), false)
            .expect_err("bad magic");
        assert!(matches!(err, ClassfileError::BadMagic { .. }));
    }

    #[test]
    fn truncated_buffer_reports_offset() {
        let err = parse_classfile(&0xCAFE_BABEu32.to_be_bytes(), ElementId(0), false)
            .expect_err("truncated");
        assert!(matches!(err, ClassfileError::Truncated { offset: 4 }));
    }
}
