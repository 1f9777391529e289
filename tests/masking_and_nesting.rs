//! Masking and nested-element tests.
//!
//! # Scope
//! First-wins masking of duplicate logical classfile paths, masker
//! neutrality on non-classfile resources, exclusion of nested classpath
//! roots from the outer element's scan, and archive-in-archive chains
//! through the nested archive handler.
//!
//! # Assumptions
//! - Provenance is asserted through each class's owning element identity.
//! - Nested inner archives are stored (not deflated) inside their outer
//!   archive only for fixture simplicity; extraction handles both.

mod common;

use common::{canonical, class_bytes, jar_bytes, write_file, write_jar};
use cpscan::{ClasspathInput, ScanSpec, Scanner};

fn scan(spec: ScanSpec, raw_paths: Vec<String>) -> cpscan::ScanResult {
    Scanner::new(spec, ClasspathInput::from_raw_paths(raw_paths))
        .scan()
        .expect("scan succeeds")
}

#[test]
fn first_element_in_classpath_order_wins_masking() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path().join("p.jar");
    let q = dir.path().join("q.jar");
    // Both jars define com/x/T.class; the superclass name tells them apart.
    write_jar(
        &p,
        &[("com/x/T.class", class_bytes("com/x/T", Some("com/p/Base"), &[], &[]))],
        None,
    );
    write_jar(
        &q,
        &[("com/x/T.class", class_bytes("com/x/T", Some("com/q/Base"), &[], &[]))],
        None,
    );

    let mut spec = ScanSpec::new();
    spec.extend_scanning_upwards = false;
    let result = scan(spec, vec![canonical(&p), canonical(&q)]);

    let graph = result.type_graph().expect("graph present");
    let t = graph.class("com.x.T").expect("masked winner linked");
    let superclass = graph.class_by_id(t.superclass.expect("superclass"));
    assert_eq!(superclass.name, "com.p.Base");
    let owner = result.element(t.element.expect("owning element"));
    assert_eq!(owner.identity(), canonical(&p));
    // Exactly one record for the masked path survives.
    assert_eq!(
        graph.classes().iter().filter(|c| c.name == "com.x.T").count(),
        1
    );
}

#[test]
fn non_classfile_resources_are_never_masked() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path().join("p.jar");
    let q = dir.path().join("q.jar");
    write_jar(&p, &[("conf/settings.txt", b"from p".to_vec())], None);
    write_jar(&q, &[("conf/settings.txt", b"from q".to_vec())], None);

    let result = scan(ScanSpec::new(), vec![canonical(&p), canonical(&q)]);

    let mut found = 0;
    for element in result.elements() {
        let scan = element.scan_output().expect("path scan ran");
        found += scan
            .resources
            .iter()
            .filter(|r| r.path == "conf/settings.txt")
            .count();
    }
    assert_eq!(found, 2);
}

#[test]
fn nested_dir_element_is_not_scanned_by_the_outer_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lib = dir.path().join("lib");
    std::fs::create_dir_all(&lib).expect("create lib");
    write_file(&lib, "com/a/A.class", &class_bytes("com/a/A", None, &[], &[]));
    let sub = lib.join("sub.jar");
    write_jar(
        &sub,
        &[("com/s/S.class", class_bytes("com/s/S", None, &[], &[]))],
        None,
    );

    let mut spec = ScanSpec::new();
    spec.extend_scanning_upwards = false;
    let result = scan(spec, vec![canonical(&lib), canonical(&sub)]);

    assert_eq!(result.order_strings(), &[canonical(&lib), canonical(&sub)]);

    // The directory scan never descends into the archive: none of the
    // archive's classfiles appear in the directory's inventory.
    let lib_element = result.element(result.order()[0]);
    let lib_scan = lib_element.scan_output().expect("lib scanned");
    assert!(lib_scan.classfiles.iter().any(|r| r.path == "com/a/A.class"));
    assert!(lib_scan.classfiles.iter().all(|r| !r.path.contains("S.class")));

    // The nested archive is scanned as its own element.
    let graph = result.type_graph().expect("graph present");
    let s = graph.class("com.s.S").expect("nested archive class");
    let owner = result.element(s.element.expect("owner"));
    assert_eq!(owner.identity(), canonical(&sub));
}

#[test]
fn nested_dir_subtree_is_excluded_from_the_outer_dir_scan() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lib = dir.path().join("lib");
    std::fs::create_dir_all(&lib).expect("create lib");
    write_file(&lib, "com/a/A.class", &class_bytes("com/a/A", None, &[], &[]));
    write_file(&lib, "sub/com/b/B.class", &class_bytes("com/b/B", None, &[], &[]));
    let sub = lib.join("sub");

    let mut spec = ScanSpec::new();
    spec.extend_scanning_upwards = false;
    let result = scan(spec, vec![canonical(&lib), canonical(&sub)]);

    // Without the exclusion, B would be scanned twice under two different
    // logical paths (sub/com/b/B.class and com/b/B.class), which masking
    // cannot deduplicate.
    let lib_element = result.element(result.order()[0]);
    let lib_scan = lib_element.scan_output().expect("lib scanned");
    assert!(lib_scan
        .classfiles
        .iter()
        .all(|r| !r.path.starts_with("sub/")));

    let graph = result.type_graph().expect("graph present");
    let b = graph.class("com.b.B").expect("nested dir class");
    let owner = result.element(b.element.expect("owner"));
    assert_eq!(owner.identity(), canonical(&sub));
    assert_eq!(
        graph.classes().iter().filter(|c| c.name == "com.b.B").count(),
        1
    );
}

#[test]
fn nested_archive_chain_is_extracted_and_scanned() {
    let dir = tempfile::tempdir().expect("tempdir");
    let inner = jar_bytes(
        &[("com/x/T.class", class_bytes("com/x/T", None, &[], &[]))],
        None,
    );
    let outer = dir.path().join("outer.jar");
    write_jar(&outer, &[("inner.jar", inner)], None);

    let raw = format!("{}!/inner.jar", canonical(&outer));
    let mut spec = ScanSpec::new();
    spec.extend_scanning_upwards = false;
    let result = scan(spec, vec![raw]);

    assert_eq!(
        result.order_strings(),
        &[format!("{}!inner.jar", canonical(&outer))]
    );
    let graph = result.type_graph().expect("graph present");
    assert!(graph.class("com.x.T").is_some());
}

#[test]
fn package_root_chain_re_roots_the_archive_view() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outer = dir.path().join("app.jar");
    write_jar(
        &outer,
        &[(
            "BOOT-INF/classes/com/x/T.class",
            class_bytes("com/x/T", None, &[], &[]),
        )],
        None,
    );

    let raw = format!("{}!/BOOT-INF/classes", canonical(&outer));
    let mut spec = ScanSpec::new();
    spec.extend_scanning_upwards = false;
    let result = scan(spec, vec![raw]);

    let graph = result.type_graph().expect("graph present");
    let t = graph.class("com.x.T").expect("re-rooted class");
    let owner = result.element(t.element.expect("owner"));
    let owner_scan = owner.scan_output().expect("scanned");
    assert!(owner_scan
        .classfiles
        .iter()
        .any(|r| r.path == "com/x/T.class"));
}

#[test]
fn temporary_files_are_released_when_requested() {
    let dir = tempfile::tempdir().expect("tempdir");
    let inner = jar_bytes(
        &[("com/x/T.class", class_bytes("com/x/T", None, &[], &[]))],
        None,
    );
    let outer = dir.path().join("outer.jar");
    write_jar(&outer, &[("inner.jar", inner)], None);

    let mut spec = ScanSpec::new();
    spec.extend_scanning_upwards = false;
    spec.remove_temporary_files_after_scan = true;
    let result = scan(spec, vec![format!("{}!/inner.jar", canonical(&outer))]);

    // The graph was built before release, but later resource reads against
    // the extracted archive fail because its backing file is gone.
    assert!(result.type_graph().expect("graph").class("com.x.T").is_some());
    let resource = result
        .get_resource("com/x/T.class")
        .expect("resource still addressable");
    assert!(resource.read().is_err());
}
