//! Input contract types supplied by the classpath discovery collaborator.
//!
//! Discovery itself (extracting raw path strings and loader contexts from
//! the host runtime) is outside this crate; callers hand the scanner a
//! [`ClasspathInput`] describing what was discovered. The scanner treats
//! loader references as opaque lookup keys and never owns them.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use ahash::AHashMap;

/// Opaque reference to a class-loading context carried from discovery.
///
/// Elements record which loaders a raw path came from so the final result
/// can report them; the scanner itself never dereferences a loader.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoaderRef(Arc<str>);

impl LoaderRef {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoaderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named module root reported by discovery.
///
/// Modules are directory-backed here: `location` points at the exploded
/// module root (if resolvable) and `packages` lists the exported/open
/// packages visible to scanning. An empty package list means every package
/// under the location is visible.
#[derive(Clone, Debug)]
pub struct ModuleRef {
    pub name: String,
    pub location: Option<PathBuf>,
    pub packages: Vec<String>,
}

impl ModuleRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
            packages: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_packages(mut self, packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.packages = packages.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[module {}]", self.name)
    }
}

/// Everything the discovery collaborator reports for one scan.
#[derive(Clone, Debug, Default)]
pub struct ClasspathInput {
    /// Ordered raw classpath entry strings, as discovered.
    pub raw_paths: Vec<String>,
    /// Raw path string to the loader contexts that contributed it.
    pub path_loaders: AHashMap<String, Vec<LoaderRef>>,
    /// Module references for system modules, in module-finder order.
    pub system_modules: Vec<ModuleRef>,
    /// Module references for non-system modules, in module-finder order.
    pub non_system_modules: Vec<ModuleRef>,
    /// Context loaders, in lookup order.
    pub context_loaders: Vec<LoaderRef>,
}

impl ClasspathInput {
    pub fn from_raw_paths(raw_paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            raw_paths: raw_paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}
