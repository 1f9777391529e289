//! Scan specification: filters, feature toggles, and overrides.
//!
//! All defaults are conservative; `validate` panics on nonsensical values
//! rather than limping through a misconfigured scan.

use std::collections::BTreeSet;
use std::sync::Mutex;

use regex::Regex;

use crate::input::LoaderRef;

/// One accept/reject pattern.
///
/// Patterns with `*` compile to anchored regexes; a trailing `/` or `.`
/// marks a prefix; anything else matches exactly.
#[derive(Debug)]
enum Pattern {
    Exact(String),
    Prefix(String),
    Glob(Regex),
}

impl Pattern {
    fn parse(pat: &str) -> Self {
        if pat.contains('*') {
            let mut re = String::with_capacity(pat.len() + 8);
            re.push('^');
            for ch in pat.chars() {
                match ch {
                    '*' => re.push_str(".*"),
                    c if "\\.+?^$()[]{}|".contains(c) => {
                        re.push('\\');
                        re.push(c);
                    }
                    c => re.push(c),
                }
            }
            re.push('$');
            Self::Glob(Regex::new(&re).expect("glob pattern compiles"))
        } else if pat.ends_with('/') || pat.ends_with('.') {
            Self::Prefix(pat.to_string())
        } else {
            Self::Exact(pat.to_string())
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => name == exact,
            Self::Prefix(prefix) => name.starts_with(prefix),
            Self::Glob(re) => re.is_match(name),
        }
    }
}

/// An include/exclude pattern set.
///
/// Semantics follow the classpath-filter convention: a name is accepted when
/// the accept set is empty or matches it, and it is not rejected; rejection
/// always wins.
#[derive(Debug, Default)]
pub struct AcceptReject {
    accept: Vec<Pattern>,
    reject: Vec<Pattern>,
}

impl AcceptReject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, pat: &str) -> &mut Self {
        self.accept.push(Pattern::parse(pat));
        self
    }

    pub fn reject(&mut self, pat: &str) -> &mut Self {
        self.reject.push(Pattern::parse(pat));
        self
    }

    /// Adds an accept prefix regardless of trailing characters.
    pub fn accept_prefix(&mut self, prefix: &str) -> &mut Self {
        self.accept.push(Pattern::Prefix(prefix.to_string()));
        self
    }

    /// Adds a reject prefix regardless of trailing characters.
    pub fn reject_prefix(&mut self, prefix: &str) -> &mut Self {
        self.reject.push(Pattern::Prefix(prefix.to_string()));
        self
    }

    pub fn accept_is_empty(&self) -> bool {
        self.accept.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.accept.is_empty() && self.reject.is_empty()
    }

    pub fn is_rejected(&self, name: &str) -> bool {
        self.reject.iter().any(|p| p.matches(name))
    }

    fn matches_accept(&self, name: &str) -> bool {
        self.accept.iter().any(|p| p.matches(name))
    }

    /// Accepted under the open-world rule: an empty accept set accepts all.
    pub fn accepted_and_not_rejected(&self, name: &str) -> bool {
        (self.accept.is_empty() || self.matches_accept(name)) && !self.is_rejected(name)
    }

    /// Accepted by an explicit accept entry (empty accept set matches nothing).
    pub fn specifically_accepted_and_not_rejected(&self, name: &str) -> bool {
        !self.accept.is_empty() && self.matches_accept(name) && !self.is_rejected(name)
    }
}

/// Accumulator for module-path directives found in archive manifests.
///
/// `Add-Exports`/`Add-Opens` tokens are appended during the parallel opener
/// phase, so the sets are internally synchronized; `BTreeSet` keeps the
/// final ordering deterministic regardless of open order.
#[derive(Debug, Default)]
pub struct ModulePathInfo {
    add_exports: Mutex<BTreeSet<String>>,
    add_opens: Mutex<BTreeSet<String>>,
}

impl ModulePathInfo {
    pub fn add_export(&self, token: &str) {
        self.add_exports
            .lock()
            .expect("module path info poisoned")
            .insert(format!("{token}=ALL-UNNAMED"));
    }

    pub fn add_open(&self, token: &str) {
        self.add_opens
            .lock()
            .expect("module path info poisoned")
            .insert(format!("{token}=ALL-UNNAMED"));
    }

    pub fn exports(&self) -> Vec<String> {
        self.add_exports
            .lock()
            .expect("module path info poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn opens(&self) -> Vec<String> {
        self.add_opens
            .lock()
            .expect("module path info poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

/// Scan configuration: filters, feature toggles, and overrides.
#[derive(Debug)]
pub struct ScanSpec {
    /// Accept/reject on dotted package and class names.
    pub packages: AcceptReject,
    /// Accept/reject on slashed logical resource paths. Package helpers keep
    /// this in sync with `packages`.
    pub paths: AcceptReject,
    /// Accept/reject on module names.
    pub modules: AcceptReject,
    /// Accept/reject on classpath-element resource paths; a non-empty accept
    /// set drops elements that contain no specifically-accepted resource.
    pub element_resource_paths: AcceptReject,

    /// Scan module roots reported by discovery.
    pub scan_modules: bool,
    /// Scan system modules even without explicit accepts.
    pub enable_system_archives_and_modules: bool,
    /// Parse classfiles and build the type graph.
    pub enable_class_info: bool,
    /// Follow references from included classes to external super types,
    /// interfaces, and annotations, scheduling them in the same run.
    pub extend_scanning_upwards: bool,
    /// When false, only the element ordering is computed and returned.
    pub perform_scan: bool,
    /// Release extracted temporary archives when the scan succeeds.
    pub remove_temporary_files_after_scan: bool,

    /// Replaces the discovered raw classpath entirely.
    pub override_classpath: Option<Vec<String>>,
    /// Replaces the discovered loader contexts entirely.
    pub override_loaders: Option<Vec<LoaderRef>>,

    /// Worker threads per scan; defaults to `min(cpus, entries).max(1)`.
    pub parallelism: Option<usize>,
    /// Working directory for relative raw paths; defaults to the process cwd.
    pub work_dir: Option<String>,

    /// `Add-Exports`/`Add-Opens` manifest directives accumulate here.
    pub module_path_info: ModulePathInfo,
}

impl Default for ScanSpec {
    fn default() -> Self {
        Self {
            packages: AcceptReject::new(),
            paths: AcceptReject::new(),
            modules: AcceptReject::new(),
            element_resource_paths: AcceptReject::new(),
            scan_modules: true,
            enable_system_archives_and_modules: false,
            enable_class_info: true,
            extend_scanning_upwards: true,
            perform_scan: true,
            remove_temporary_files_after_scan: false,
            override_classpath: None,
            override_loaders: None,
            parallelism: None,
            work_dir: None,
            module_path_info: ModulePathInfo::default(),
        }
    }
}

impl ScanSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration. Panics on invalid values.
    pub fn validate(&self) {
        if let Some(parallelism) = self.parallelism {
            assert!(parallelism > 0, "parallelism must be > 0");
        }
        if let Some(work_dir) = &self.work_dir {
            assert!(
                work_dir.starts_with('/'),
                "work_dir must be an absolute path"
            );
        }
    }

    /// Accepts a package and everything beneath it, on both the dotted and
    /// slashed views.
    pub fn accept_package(&mut self, package: &str) -> &mut Self {
        self.packages.accept(package);
        self.packages.accept_prefix(&format!("{package}."));
        self.paths.accept_prefix(&format!("{}/", package.replace('.', "/")));
        self
    }

    /// Rejects a package and everything beneath it.
    pub fn reject_package(&mut self, package: &str) -> &mut Self {
        self.packages.reject(package);
        self.packages.reject_prefix(&format!("{package}."));
        self.paths.reject_prefix(&format!("{}/", package.replace('.', "/")));
        self
    }

    /// Whether a non-classfile logical path survives the path filters.
    pub fn resource_accepted(&self, path: &str) -> bool {
        self.paths.accepted_and_not_rejected(path)
    }

    /// Whether a classfile logical path survives the path filters.
    pub fn classfile_accepted(&self, path: &str) -> bool {
        self.paths.accepted_and_not_rejected(path)
    }

    /// Module scan rules: system modules scan when system scanning is on and
    /// no accepts exist, or when specifically accepted; other modules scan
    /// when accepted and not rejected.
    pub fn module_accepted(&self, name: &str, is_system: bool) -> bool {
        if is_system {
            (self.enable_system_archives_and_modules && self.modules.is_empty())
                || self.modules.specifically_accepted_and_not_rejected(name)
        } else {
            self.modules.accepted_and_not_rejected(name)
        }
    }

    /// Resolves the worker count for this scan.
    pub fn effective_parallelism(&self, entries: usize) -> usize {
        if let Some(parallelism) = self.parallelism {
            return parallelism.max(1);
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cpus.min(entries).max(1)
    }

    /// Working directory used to resolve relative raw paths.
    pub fn work_dir(&self) -> String {
        if let Some(dir) = &self.work_dir {
            return dir.clone();
        }
        std::env::current_dir()
            .map(|dir| crate::path_resolver::path_to_slashed(&dir))
            .unwrap_or_else(|_| "/".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accept_set_accepts_everything() {
        let filter = AcceptReject::new();
        assert!(filter.accepted_and_not_rejected("anything"));
        assert!(!filter.specifically_accepted_and_not_rejected("anything"));
    }

    #[test]
    fn reject_wins_over_accept() {
        let mut filter = AcceptReject::new();
        filter.accept_prefix("com.x.");
        filter.reject_prefix("com.x.internal.");
        assert!(filter.accepted_and_not_rejected("com.x.Api"));
        assert!(!filter.accepted_and_not_rejected("com.x.internal.Impl"));
    }

    #[test]
    fn glob_patterns_anchor_fully() {
        let mut filter = AcceptReject::new();
        filter.accept("com.*.Impl");
        assert!(filter.accepted_and_not_rejected("com.anything.Impl"));
        assert!(!filter.accepted_and_not_rejected("com.anything.Impl2"));
        assert!(!filter.accepted_and_not_rejected("xcom.anything.Impl"));
    }

    #[test]
    fn package_helpers_cover_both_views() {
        let mut spec = ScanSpec::new();
        spec.accept_package("com.x");
        assert!(spec.packages.accepted_and_not_rejected("com.x"));
        assert!(spec.packages.accepted_and_not_rejected("com.x.deep.T"));
        assert!(!spec.packages.accepted_and_not_rejected("com.y.T"));
        assert!(spec.classfile_accepted("com/x/T.class"));
        assert!(!spec.classfile_accepted("com/y/T.class"));
    }

    #[test]
    fn module_rules_follow_system_toggles() {
        let mut spec = ScanSpec::new();
        assert!(!spec.module_accepted("java.base", true));
        spec.enable_system_archives_and_modules = true;
        assert!(spec.module_accepted("java.base", true));
        spec.modules.accept("my.module");
        // Accept list now non-empty: system modules need specific accepts.
        assert!(!spec.module_accepted("java.base", true));
        assert!(spec.module_accepted("my.module", false));
        assert!(spec.module_accepted("my.module", true));
    }

    #[test]
    fn module_path_info_is_deterministic() {
        let info = ModulePathInfo::default();
        info.add_export("b.mod/pkg");
        info.add_export("a.mod/pkg");
        assert_eq!(
            info.exports(),
            vec!["a.mod/pkg=ALL-UNNAMED", "b.mod/pkg=ALL-UNNAMED"]
        );
    }
}
