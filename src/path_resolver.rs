//! Raw classpath path normalization.
//!
//! Raw paths arrive in the grammar `[scheme ":"]? base ("!" inner)*` with
//! scheme one of `jar`, `file`, `http`, `https`. This module strips scheme
//! prefixes, canonicalizes separators to forward slashes, resolves relative
//! bases against the working directory, collapses `.`/`..` components with a
//! bounded component stack, and splits the archive chain at `!` boundaries.
//!
//! # Invariants
//! - `normalize` is idempotent: resolving an already-resolved path is a
//!   no-op. The element factory relies on this to bound its canonical-path
//!   retry to a single recursion.
//! - `..` never escapes above the filesystem root.
//! - Remote URLs are detected, never rewritten.

use std::path::Path;

use crate::errors::OpenError;

/// Returns whether the raw path names a remote archive (`http`/`https`).
pub fn is_remote_url(raw: &str) -> bool {
    has_prefix_ignore_case(raw, "http://") || has_prefix_ignore_case(raw, "https://")
}

/// Returns whether the raw path carried an explicit archive scheme marker.
pub fn has_jar_prefix(raw: &str) -> bool {
    has_prefix_ignore_case(raw.trim(), "jar:")
}

/// Splits a normalized path at the first archive separator.
///
/// The left side is the filesystem base; the right side (if any) is the
/// inner chain, itself `!`-separated.
pub fn split_archive(path: &str) -> (&str, Option<&str>) {
    match memchr::memchr(b'!', path.as_bytes()) {
        None => (path, None),
        Some(idx) => {
            let inner = &path[idx + 1..];
            if inner.is_empty() {
                (&path[..idx], None)
            } else {
                (&path[..idx], Some(inner))
            }
        }
    }
}

/// Splits an inner chain into its components, stripping leading slashes.
///
/// `"/a.jar!/b.jar"` yields `["a.jar", "b.jar"]`. Empty components (from
/// trailing separators like `"a.jar!/"`) are dropped.
pub fn inner_chain_components(inner: &str) -> Vec<&str> {
    inner
        .split('!')
        .map(|piece| piece.trim_start_matches('/').trim_end_matches('/'))
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Normalizes a raw classpath path against `work_dir`.
///
/// Strips `jar:`/`file:` prefixes (repeatedly, case-insensitively), converts
/// backslashes to forward slashes, resolves a relative base against
/// `work_dir`, collapses dot components in the base, and re-joins the inner
/// archive chain with single `!` separators.
pub fn normalize(work_dir: &str, raw: &str) -> String {
    let mut path = raw.trim();

    loop {
        if let Some(rest) = strip_prefix_ignore_case(path, "jar:") {
            path = rest;
        } else if let Some(rest) = strip_prefix_ignore_case(path, "file:") {
            path = rest;
        } else {
            break;
        }
    }

    let slashed = path.replace('\\', "/");
    let (base, inner) = split_archive(&slashed);

    // `file://host/...` and `file:///...` both reduce to a single leading slash.
    let mut base = base;
    while base.starts_with("//") {
        base = &base[1..];
    }

    let absolute = if base.starts_with('/') {
        collapse_dots(base)
    } else {
        let mut joined = String::with_capacity(work_dir.len() + base.len() + 1);
        joined.push_str(work_dir.trim_end_matches('/'));
        joined.push('/');
        joined.push_str(base);
        collapse_dots(&joined)
    };

    match inner {
        None => absolute,
        Some(inner) => {
            let components = inner_chain_components(inner);
            if components.is_empty() {
                absolute
            } else {
                let mut out = absolute;
                for component in components {
                    out.push('!');
                    out.push_str(component);
                }
                out
            }
        }
    }
}

/// Collapses `.` and `..` components of an absolute slashed path.
fn collapse_dots(path: &str) -> String {
    debug_assert!(path.starts_with('/'));
    let mut stack: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                // Clamp at the root rather than escaping above it.
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    if stack.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len());
    for component in stack {
        out.push('/');
        out.push_str(component);
    }
    out
}

/// Canonicalizes the filesystem base through the OS, returning a
/// forward-slash string. Fails for missing or unreadable paths.
pub fn canonicalize_base(base: &str) -> Result<String, OpenError> {
    match std::fs::canonicalize(Path::new(base)) {
        Ok(canonical) => Ok(path_to_slashed(&canonical)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(OpenError::NotFound {
            path: base.to_string(),
        }),
        Err(err) => Err(OpenError::canonicalization(err)),
    }
}

/// Renders a filesystem path with forward-slash separators.
pub fn path_to_slashed(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Maps a dotted class name to its classfile resource path.
pub fn class_name_to_classfile_path(class_name: &str) -> String {
    let mut path = class_name.replace('.', "/");
    path.push_str(".class");
    path
}

/// Maps a classfile resource path back to its dotted class name.
pub fn classfile_path_to_class_name(path: &str) -> String {
    path.strip_suffix(".class").unwrap_or(path).replace('/', ".")
}

fn has_prefix_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if has_prefix_ignore_case(s, prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WD: &str = "/work";

    #[test]
    fn strips_scheme_prefixes() {
        assert_eq!(normalize(WD, "jar:/tmp/a.jar"), "/tmp/a.jar");
        assert_eq!(normalize(WD, "file:/tmp/a.jar"), "/tmp/a.jar");
        assert_eq!(normalize(WD, "jar:file:/tmp/a.jar"), "/tmp/a.jar");
        assert_eq!(normalize(WD, "FILE:/tmp/a.jar"), "/tmp/a.jar");
        assert_eq!(normalize(WD, "file:///tmp/a.jar"), "/tmp/a.jar");
    }

    #[test]
    fn collapses_dot_components() {
        assert_eq!(normalize(WD, "/tmp/./a.jar"), "/tmp/a.jar");
        assert_eq!(normalize(WD, "/tmp/x/../a.jar"), "/tmp/a.jar");
        assert_eq!(normalize(WD, "/../../a.jar"), "/a.jar");
    }

    #[test]
    fn resolves_relative_against_work_dir() {
        assert_eq!(normalize(WD, "lib/a.jar"), "/work/lib/a.jar");
        assert_eq!(normalize(WD, "./a.jar"), "/work/a.jar");
        assert_eq!(normalize("/work/", "a.jar"), "/work/a.jar");
    }

    #[test]
    fn archive_chain_is_preserved_and_cleaned() {
        assert_eq!(normalize(WD, "jar:/tmp/a.jar!/"), "/tmp/a.jar");
        assert_eq!(normalize(WD, "/tmp/a.jar!/inner.jar"), "/tmp/a.jar!inner.jar");
        assert_eq!(
            normalize(WD, "/tmp/a.jar!/inner.jar!/BOOT-INF/classes/"),
            "/tmp/a.jar!inner.jar!BOOT-INF/classes"
        );
        assert_eq!(split_archive("/tmp/a.jar!inner.jar"), ("/tmp/a.jar", Some("inner.jar")));
        assert_eq!(split_archive("/tmp/a.jar"), ("/tmp/a.jar", None));
    }

    #[test]
    fn remote_urls_are_detected() {
        assert!(is_remote_url("http://example.com/a.jar"));
        assert!(is_remote_url("HTTPS://example.com/a.jar"));
        assert!(!is_remote_url("file:/tmp/a.jar"));
    }

    #[test]
    fn class_name_mapping_round_trips() {
        assert_eq!(class_name_to_classfile_path("com.x.T"), "com/x/T.class");
        assert_eq!(classfile_path_to_class_name("com/x/T.class"), "com.x.T");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in "[a-z./!]{0,40}") {
            let once = normalize(WD, &raw);
            let twice = normalize(WD, &once);
            prop_assert_eq!(once, twice);
        }
    }
}
