//! Classpath ordering tests.
//!
//! # Scope
//! These tests exercise raw-path aliasing through the singleton map,
//! manifest `Class-Path` insertion, cycle-safe ordering, order determinism
//! across parallelism levels, the ordering-only mode, and manifest
//! module-path directives.
//!
//! # Assumptions
//! - Fixture archives are Zip32 with stored entries.
//! - Element string forms are canonical forward-slash paths.

mod common;

use common::{canonical, class_bytes, write_jar};
use cpscan::{ClasspathInput, ScanSpec, Scanner};

fn scan(spec: ScanSpec, raw_paths: Vec<String>) -> cpscan::ScanResult {
    Scanner::new(spec, ClasspathInput::from_raw_paths(raw_paths))
        .scan()
        .expect("scan succeeds")
}

#[test]
fn duplicate_path_aliases_collapse_to_one_element() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("a.jar");
    write_jar(&jar, &[("com/x/T.class", class_bytes("com/x/T", None, &[], &[]))], None);
    let jar_canonical = canonical(&jar);

    // The same archive spelled three ways: plain, file: with a dot segment,
    // and jar: with a trailing archive separator.
    let parent = canonical(dir.path());
    let raw_paths = vec![
        jar_canonical.clone(),
        format!("file:{parent}/./a.jar"),
        format!("jar:{jar_canonical}!/"),
    ];
    let result = scan(ScanSpec::new(), raw_paths);

    assert_eq!(result.order().len(), 1);
    assert_eq!(result.order_strings(), &[jar_canonical]);
}

#[test]
fn manifest_class_path_entries_insert_after_parent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = dir.path().join("a.jar");
    let b = dir.path().join("b.jar");
    // c.jar is referenced but never created.
    write_jar(
        &a,
        &[("com/x/A.class", class_bytes("com/x/A", None, &[], &[]))],
        Some("Class-Path: b.jar c.jar"),
    );
    write_jar(&b, &[("com/x/B.class", class_bytes("com/x/B", None, &[], &[]))], None);

    let result = scan(ScanSpec::new(), vec![canonical(&a)]);

    assert_eq!(result.order_strings(), &[canonical(&a), canonical(&b)]);
}

#[test]
fn manifest_class_path_cycle_terminates_with_each_element_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = dir.path().join("a.jar");
    let b = dir.path().join("b.jar");
    write_jar(
        &a,
        &[("com/x/A.class", class_bytes("com/x/A", None, &[], &[]))],
        Some("Class-Path: b.jar"),
    );
    write_jar(
        &b,
        &[("com/x/B.class", class_bytes("com/x/B", None, &[], &[]))],
        Some("Class-Path: a.jar"),
    );

    let result = scan(ScanSpec::new(), vec![canonical(&a)]);

    assert_eq!(result.order_strings(), &[canonical(&a), canonical(&b)]);
}

#[test]
fn final_order_is_identical_across_parallelism_levels() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut raw_paths = Vec::new();
    for i in 0..6 {
        let jar = dir.path().join(format!("lib-{i}.jar"));
        let name = format!("com/x/C{i}");
        let entry = format!("{name}.class");
        write_jar(&jar, &[(entry.as_str(), class_bytes(&name, None, &[], &[]))], None);
        raw_paths.push(canonical(&jar));
    }

    let mut expected: Option<Vec<String>> = None;
    for parallelism in [1usize, 4] {
        let mut spec = ScanSpec::new();
        spec.parallelism = Some(parallelism);
        let result = scan(spec, raw_paths.clone());
        let strings = result.order_strings().to_vec();
        match &expected {
            None => expected = Some(strings),
            Some(expected) => assert_eq!(&strings, expected),
        }
    }
}

#[test]
fn ordering_only_mode_returns_no_type_graph() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("a.jar");
    write_jar(&jar, &[("com/x/T.class", class_bytes("com/x/T", None, &[], &[]))], None);

    let mut spec = ScanSpec::new();
    spec.perform_scan = false;
    let result = scan(spec, vec![canonical(&jar)]);

    assert_eq!(result.order().len(), 1);
    assert!(result.type_graph().is_none());
    assert!(result.file_last_modified().is_empty());
}

#[test]
fn disabled_class_info_returns_empty_type_graph() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("a.jar");
    write_jar(&jar, &[("com/x/T.class", class_bytes("com/x/T", None, &[], &[]))], None);

    let mut spec = ScanSpec::new();
    spec.enable_class_info = false;
    let result = scan(spec, vec![canonical(&jar)]);

    let graph = result.type_graph().expect("graph present");
    assert!(graph.classes().is_empty());
    assert!(!result.file_last_modified().is_empty());
}

#[test]
fn manifest_module_directives_are_collected_with_all_unnamed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("a.jar");
    write_jar(
        &jar,
        &[("com/x/T.class", class_bytes("com/x/T", None, &[], &[]))],
        Some("Add-Exports: b.mod/pkg a.mod/pkg\r\nAdd-Opens: a.mod/open"),
    );

    let result = scan(ScanSpec::new(), vec![canonical(&jar)]);

    assert_eq!(
        result.module_path_exports(),
        &["a.mod/pkg=ALL-UNNAMED", "b.mod/pkg=ALL-UNNAMED"]
    );
    assert_eq!(result.module_path_opens(), &["a.mod/open=ALL-UNNAMED"]);
}

#[test]
fn missing_and_unreadable_elements_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("a.jar");
    write_jar(&jar, &[("com/x/T.class", class_bytes("com/x/T", None, &[], &[]))], None);
    let missing = dir.path().join("missing.jar");

    let result = scan(
        ScanSpec::new(),
        vec![
            missing.to_string_lossy().into_owned(),
            canonical(&jar),
        ],
    );

    assert_eq!(result.order_strings(), &[canonical(&jar)]);
}

#[test]
fn corrupt_archive_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let junk = dir.path().join("junk.jar");
    std::fs::write(&junk, b"this is not a zip archive, nowhere near one").expect("write junk");
    let jar = dir.path().join("a.jar");
    write_jar(&jar, &[("com/x/T.class", class_bytes("com/x/T", None, &[], &[]))], None);

    let result = scan(ScanSpec::new(), vec![canonical(&junk), canonical(&jar)]);

    // The corrupt archive opens with skip set, so only the good jar orders.
    assert_eq!(result.order_strings(), &[canonical(&jar)]);
}

#[test]
fn pre_cancelled_scan_fails_with_cancellation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("a.jar");
    write_jar(&jar, &[("com/x/T.class", class_bytes("com/x/T", None, &[], &[]))], None);

    let scanner = Scanner::new(
        ScanSpec::new(),
        ClasspathInput::from_raw_paths(vec![canonical(&jar)]),
    );
    scanner.cancellation().cancel();
    let err = scanner.scan().expect_err("cancelled");
    assert!(err.is_cancelled());
}
