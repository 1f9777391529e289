#![allow(dead_code)]
//! Shared fixture builders for the integration tests.
//!
//! Archives are written with the `zip` crate into `tempfile` directories;
//! classfile bytes are synthesized directly (minimal constant pool, no
//! compiler involved) with just enough structure for the parser: name,
//! superclass, interfaces, and class-level annotations.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::CompressionMethod;

/// Builds minimal classfile bytes for `name` (slashed form).
pub fn class_bytes(
    name: &str,
    superclass: Option<&str>,
    interfaces: &[&str],
    annotations: &[&str],
) -> Vec<u8> {
    let mut pool: Vec<Vec<u8>> = Vec::new();

    fn utf8(pool: &mut Vec<Vec<u8>>, s: &str) -> u16 {
        let mut entry = vec![1u8];
        entry.extend_from_slice(&(s.len() as u16).to_be_bytes());
        entry.extend_from_slice(s.as_bytes());
        pool.push(entry);
        pool.len() as u16
    }

    fn class(pool: &mut Vec<Vec<u8>>, slashed: &str) -> u16 {
        let name_index = utf8(pool, slashed);
        let mut entry = vec![7u8];
        entry.extend_from_slice(&name_index.to_be_bytes());
        pool.push(entry);
        pool.len() as u16
    }

    let ann_attr_name = if annotations.is_empty() {
        0
    } else {
        utf8(&mut pool, "RuntimeVisibleAnnotations")
    };
    let this_index = class(&mut pool, name);
    let super_index = superclass.map(|s| class(&mut pool, s)).unwrap_or(0);
    let interface_indexes: Vec<u16> = interfaces.iter().map(|i| class(&mut pool, i)).collect();
    let annotation_indexes: Vec<u16> = annotations
        .iter()
        .map(|a| utf8(&mut pool, &format!("L{a};")))
        .collect();

    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // minor version
    out.extend_from_slice(&52u16.to_be_bytes()); // major version
    out.extend_from_slice(&((pool.len() + 1) as u16).to_be_bytes());
    for entry in &pool {
        out.extend_from_slice(entry);
    }
    out.extend_from_slice(&0x0021u16.to_be_bytes()); // ACC_PUBLIC | ACC_SUPER
    out.extend_from_slice(&this_index.to_be_bytes());
    out.extend_from_slice(&super_index.to_be_bytes());
    out.extend_from_slice(&(interface_indexes.len() as u16).to_be_bytes());
    for index in &interface_indexes {
        out.extend_from_slice(&index.to_be_bytes());
    }
    out.extend_from_slice(&0u16.to_be_bytes()); // fields
    out.extend_from_slice(&0u16.to_be_bytes()); // methods
    if annotation_indexes.is_empty() {
        out.extend_from_slice(&0u16.to_be_bytes());
    } else {
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&ann_attr_name.to_be_bytes());
        let payload_len = 2 + annotation_indexes.len() * 4;
        out.extend_from_slice(&(payload_len as u32).to_be_bytes());
        out.extend_from_slice(&(annotation_indexes.len() as u16).to_be_bytes());
        for index in &annotation_indexes {
            out.extend_from_slice(&index.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes()); // no element-value pairs
        }
    }
    out
}

/// Writes a jar at `path` with the given entries and an optional manifest
/// body (main attributes, without the trailing blank line).
pub fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)], manifest: Option<&str>) {
    let file = File::create(path).expect("create jar file");
    let mut writer = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);

    if let Some(manifest) = manifest {
        writer
            .start_file("META-INF/MANIFEST.MF", options)
            .expect("start manifest entry");
        writer
            .write_all(format!("Manifest-Version: 1.0\r\n{manifest}\r\n\r\n").as_bytes())
            .expect("write manifest");
    }
    for (name, bytes) in entries {
        writer.start_file(*name, options).expect("start jar entry");
        writer.write_all(bytes).expect("write jar entry");
    }
    writer.finish().expect("finish jar");
}

/// Reads a jar's raw bytes, for nesting one archive inside another.
pub fn jar_bytes(entries: &[(&str, Vec<u8>)], manifest: Option<&str>) -> Vec<u8> {
    let dir = tempfile::tempdir().expect("scratch dir");
    let path = dir.path().join("scratch.jar");
    write_jar(&path, entries, manifest);
    std::fs::read(&path).expect("read scratch jar")
}

/// Writes a file under `root`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(&path, bytes).expect("write file");
    path
}

/// Canonical forward-slash string for an existing path.
pub fn canonical(path: &Path) -> String {
    std::fs::canonicalize(path)
        .expect("canonicalize fixture path")
        .to_string_lossy()
        .replace('\\', "/")
}
