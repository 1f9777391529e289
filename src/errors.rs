//! Error types for the scan stages.
//!
//! Errors are stage-specific to keep diagnostics precise and avoid a single
//! monolithic enum that grows unbounded. All enums are `#[non_exhaustive]` so
//! variants can be added without breaking callers; consumers should include a
//! fallback match arm.
//!
//! Two recovery classes exist:
//! - [`OpenError`] and [`ClassfileError`] are per-artifact: the element or
//!   resource is skipped and the scan continues.
//! - [`ScanError`] is scan-terminal: the current phase fails fast and no
//!   further phases run.

use std::fmt;
use std::io;

/// Errors from resolving, validating, or opening one classpath element.
///
/// These never terminate a scan; the element is marked skipped and the
/// failure is logged. The Singleton Map caches the first failure per
/// canonical key, so aliases of a broken path fail identically.
#[derive(Debug)]
#[non_exhaustive]
pub enum OpenError {
    /// I/O error during file operations.
    Io(io::Error),
    /// Path canonicalization failed (missing file, permission, loop).
    Canonicalization(io::Error),
    /// The base file or directory does not exist.
    NotFound { path: String },
    /// The base file or directory exists but cannot be read.
    NotReadable { path: String },
    /// An archive was required (marker or `jar:` prefix) but a directory was found.
    ExpectedArchive { path: String },
    /// The path is neither a regular file nor a directory.
    NotAFileOrDirectory { path: String },
    /// The archive container is structurally invalid or unsupported.
    MalformedArchive { path: String, detail: String },
    /// A nested-archive chain component was not present in its enclosing archive.
    NestedEntryNotFound { archive: String, entry: String },
    /// Remote archives are identified but never fetched.
    RemoteNotFetched { url: String },
    /// The nested archive handler was already closed.
    HandlerClosed,
    /// Failure recorded against the canonical form of an aliased path.
    Canonical(std::sync::Arc<OpenError>),
}

impl OpenError {
    /// Creates an I/O error variant.
    #[inline]
    pub fn io(err: io::Error) -> Self {
        Self::Io(err)
    }

    /// Creates a canonicalization error variant, preserving the source.
    #[inline]
    pub fn canonicalization(err: io::Error) -> Self {
        Self::Canonicalization(err)
    }
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Canonicalization(err) => write!(f, "path canonicalization failed: {err}"),
            Self::NotFound { path } => write!(f, "file or directory not found: {path}"),
            Self::NotReadable { path } => write!(f, "cannot read file or directory: {path}"),
            Self::ExpectedArchive { path } => write!(f, "expected archive, found directory: {path}"),
            Self::NotAFileOrDirectory { path } => {
                write!(f, "not a normal file or directory: {path}")
            }
            Self::MalformedArchive { path, detail } => {
                write!(f, "malformed archive {path}: {detail}")
            }
            Self::NestedEntryNotFound { archive, entry } => {
                write!(f, "nested entry {entry} not found in archive {archive}")
            }
            Self::RemoteNotFetched { url } => {
                write!(f, "remote archive not fetched: {url}")
            }
            Self::HandlerClosed => write!(f, "nested archive handler already closed"),
            Self::Canonical(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) | Self::Canonicalization(err) => Some(err),
            Self::Canonical(inner) => Some(&**inner),
            _ => None,
        }
    }
}

impl From<io::Error> for OpenError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Errors from parsing one classfile binary.
///
/// These never terminate a scan; the resource is dropped and the failure is
/// logged. Offsets refer to byte positions in the classfile buffer.
#[derive(Debug)]
#[non_exhaustive]
pub enum ClassfileError {
    /// The buffer ended before a required field.
    Truncated { offset: usize },
    /// The leading magic number was not `0xCAFEBABE`.
    BadMagic { value: u32 },
    /// A constant pool entry carried an unknown tag.
    BadConstantPoolTag { tag: u8, index: u16 },
    /// A reference pointed at a missing or wrongly-typed constant pool slot.
    BadConstantPoolIndex { index: u16 },
    /// An annotation type descriptor was not a class reference.
    BadDescriptor { detail: String },
    /// A structurally valid but unsupported construct.
    Unsupported { detail: String },
}

impl fmt::Display for ClassfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { offset } => write!(f, "classfile truncated at offset {offset}"),
            Self::BadMagic { value } => write!(f, "bad classfile magic: {value:#010x}"),
            Self::BadConstantPoolTag { tag, index } => {
                write!(f, "unknown constant pool tag {tag} at index {index}")
            }
            Self::BadConstantPoolIndex { index } => {
                write!(f, "invalid constant pool index {index}")
            }
            Self::BadDescriptor { detail } => write!(f, "bad type descriptor: {detail}"),
            Self::Unsupported { detail } => write!(f, "unsupported classfile construct: {detail}"),
        }
    }
}

impl std::error::Error for ClassfileError {}

/// Terminal scan failure kinds.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum ScanErrorKind {
    /// The scan was cancelled through the interruption monitor.
    Cancelled,
    /// A worker panicked while processing a work unit.
    WorkerPanic { detail: String },
    /// A worker returned an uncaught error.
    Worker { detail: String },
    /// The caller-supplied result processor failed.
    ResultProcessor { detail: String },
    /// The caller-supplied failure hook itself failed; the original terminal
    /// failure is the first suppressed entry.
    FailureHook { detail: String },
}

/// A scan-terminal failure.
///
/// The first terminal failure recorded by the interruption monitor wins;
/// subsequent failures are attached as suppressed strings, mirroring how the
/// work queue captures only the first worker panic.
#[derive(Clone, Debug)]
pub struct ScanError {
    kind: ScanErrorKind,
    suppressed: Vec<String>,
}

impl ScanError {
    pub fn new(kind: ScanErrorKind) -> Self {
        Self {
            kind,
            suppressed: Vec::new(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ScanErrorKind::Cancelled)
    }

    pub fn worker(detail: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::Worker {
            detail: detail.into(),
        })
    }

    pub fn worker_panic(detail: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::WorkerPanic {
            detail: detail.into(),
        })
    }

    pub fn result_processor(detail: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::ResultProcessor {
            detail: detail.into(),
        })
    }

    pub fn failure_hook(detail: impl Into<String>, original: ScanError) -> Self {
        let mut err = Self::new(ScanErrorKind::FailureHook {
            detail: detail.into(),
        });
        err.suppressed.push(original.to_string());
        err.suppressed.extend(original.suppressed);
        err
    }

    pub fn kind(&self) -> &ScanErrorKind {
        &self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ScanErrorKind::Cancelled)
    }

    /// Attaches a later failure as suppressed context.
    pub fn suppress(&mut self, detail: impl Into<String>) {
        self.suppressed.push(detail.into());
    }

    /// Failures recorded after the first, in arrival order.
    pub fn suppressed(&self) -> &[String] {
        &self.suppressed
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ScanErrorKind::Cancelled => write!(f, "scan cancelled")?,
            ScanErrorKind::WorkerPanic { detail } => write!(f, "worker panicked: {detail}")?,
            ScanErrorKind::Worker { detail } => write!(f, "worker failed: {detail}")?,
            ScanErrorKind::ResultProcessor { detail } => {
                write!(f, "result processor failed: {detail}")?
            }
            ScanErrorKind::FailureHook { detail } => write!(f, "failure hook failed: {detail}")?,
        }
        if !self.suppressed.is_empty() {
            write!(f, " ({} suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for ScanError {}
