//! Bounded Zip32 archive reader and jar manifest parser.
//!
//! # Invariants
//! - All sizes/offsets are untrusted and validated against the file length.
//! - Central directory parsing is sequential over one buffered read; entry
//!   payload reads open a fresh file handle so concurrent readers never
//!   share a seek position.
//! - Decompression output is capped at the declared uncompressed size.
//!
//! # Supported
//! - Zip32 (EOCD + central directory).
//! - Entries: stored (method 0) and deflate (method 8).
//!
//! # Not supported
//! - Zip64 (sentinel 0xFFFF/0xFFFFFFFF fields), multi-disk archives,
//!   encrypted entries (flag bit 0). These surface as malformed-archive or
//!   per-entry read failures.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ahash::AHashMap;
use flate2::read::DeflateDecoder;

use crate::errors::OpenError;

const SIG_EOCD: u32 = 0x0605_4b50;
const SIG_CDFH: u32 = 0x0201_4b50;
const SIG_LFH: u32 = 0x0403_4b50;

const EOCD_MIN_LEN: usize = 22;
const EOCD_SEARCH_MAX: usize = 66 * 1024; // 64 KiB comment + header margin

/// Central directory fixed header length.
const CDFH_LEN: usize = 46;
/// Local file header fixed length.
const LFH_LEN: usize = 30;

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Central-directory metadata for one archive entry.
#[derive(Clone, Debug)]
pub struct ZipEntry {
    pub name: String,
    pub flags: u16,
    pub method: u16,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
    pub is_dir: bool,
}

impl ZipEntry {
    #[inline]
    pub fn is_encrypted(&self) -> bool {
        (self.flags & 0x0001) != 0
    }

    #[inline]
    pub fn compression_supported(&self) -> bool {
        self.method == 0 || self.method == 8
    }
}

/// Main-section attributes extracted from `META-INF/MANIFEST.MF`.
#[derive(Clone, Debug, Default)]
pub struct ManifestAttributes {
    pub class_path: Option<String>,
    pub add_exports: Option<String>,
    pub add_opens: Option<String>,
}

/// A parsed archive: central directory index plus manifest attributes.
///
/// Entry payloads are read on demand through [`read_entry`](Self::read_entry);
/// the struct itself holds no open file handle, so it is freely shareable
/// across worker threads.
#[derive(Debug)]
pub struct ZipFile {
    path: PathBuf,
    display_path: String,
    file_len: u64,
    entries: Vec<ZipEntry>,
    by_name: AHashMap<String, u32>,
    manifest: Option<ManifestAttributes>,
    last_modified: Option<SystemTime>,
}

impl ZipFile {
    /// Opens and indexes an archive.
    ///
    /// `display_path` is the canonical identity used in diagnostics (it may
    /// carry a `!` chain for nested archives; `path` is always the physical
    /// file, possibly an extracted temporary).
    pub fn open(path: &Path, display_path: String) -> Result<Self, OpenError> {
        let mut file = File::open(path).map_err(OpenError::io)?;
        let metadata = file.metadata().map_err(OpenError::io)?;
        let file_len = metadata.len();
        let last_modified = metadata.modified().ok();

        let (cd_offset, cd_size, entries_total) =
            read_eocd(&mut file, file_len, &display_path)?;

        let mut cd = vec![0u8; cd_size as usize];
        file.seek(SeekFrom::Start(cd_offset)).map_err(OpenError::io)?;
        file.read_exact(&mut cd).map_err(OpenError::io)?;

        let entries = parse_central_directory(&cd, entries_total, file_len, &display_path)?;
        let mut by_name = AHashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            if !entry.is_dir {
                // First occurrence wins for duplicate names within one archive.
                by_name.entry(entry.name.clone()).or_insert(idx as u32);
            }
        }

        let mut zip = Self {
            path: path.to_path_buf(),
            display_path,
            file_len,
            entries,
            by_name,
            manifest: None,
            last_modified,
        };
        let manifest = zip.read_manifest();
        zip.manifest = manifest;
        Ok(zip)
    }

    /// Canonical identity string for diagnostics.
    pub fn display_path(&self) -> &str {
        &self.display_path
    }

    /// Physical backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn entry(&self, idx: u32) -> &ZipEntry {
        &self.entries[idx as usize]
    }

    /// Index of the non-directory entry with this exact name.
    pub fn entry_index(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn manifest(&self) -> Option<&ManifestAttributes> {
        self.manifest.as_ref()
    }

    /// Reads and (if needed) inflates one entry's payload.
    ///
    /// Opens a fresh handle so concurrent readers never share file position.
    /// Output is capped at the declared uncompressed size; a stream that
    /// exceeds it is reported as corrupt rather than buffered unbounded.
    pub fn read_entry(&self, idx: u32) -> io::Result<Vec<u8>> {
        let entry = &self.entries[idx as usize];
        if entry.is_encrypted() {
            return Err(invalid_data(format!(
                "encrypted entry {} in {}",
                entry.name, self.display_path
            )));
        }
        if !entry.compression_supported() {
            return Err(invalid_data(format!(
                "unsupported compression method {} for {} in {}",
                entry.method, entry.name, self.display_path
            )));
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(entry.local_header_offset))?;
        let mut lfh = [0u8; LFH_LEN];
        file.read_exact(&mut lfh)?;
        if read_u32_le(&lfh, 0) != SIG_LFH {
            return Err(invalid_data(format!(
                "bad local header for {} in {}",
                entry.name, self.display_path
            )));
        }
        let name_len = read_u16_le(&lfh, 26) as u64;
        let extra_len = read_u16_le(&lfh, 28) as u64;
        let data_offset = entry
            .local_header_offset
            .checked_add(LFH_LEN as u64 + name_len + extra_len)
            .filter(|off| off.saturating_add(entry.compressed_size) <= self.file_len)
            .ok_or_else(|| {
                invalid_data(format!(
                    "entry data out of bounds for {} in {}",
                    entry.name, self.display_path
                ))
            })?;
        file.seek(SeekFrom::Start(data_offset))?;

        let mut out = Vec::with_capacity(entry.uncompressed_size.min(1 << 20) as usize);
        match entry.method {
            0 => {
                file.take(entry.compressed_size).read_to_end(&mut out)?;
            }
            8 => {
                let mut decoder = DeflateDecoder::new(file.take(entry.compressed_size));
                decoder
                    .take(entry.uncompressed_size + 1)
                    .read_to_end(&mut out)?;
            }
            _ => unreachable!("method checked above"),
        }
        if out.len() as u64 != entry.uncompressed_size {
            return Err(invalid_data(format!(
                "size mismatch for {} in {}: declared {}, got {}",
                entry.name,
                self.display_path,
                entry.uncompressed_size,
                out.len()
            )));
        }
        Ok(out)
    }

    fn read_manifest(&self) -> Option<ManifestAttributes> {
        let idx = self
            .entries
            .iter()
            .position(|e| !e.is_dir && e.name.eq_ignore_ascii_case(MANIFEST_PATH))?;
        let bytes = self.read_entry(idx as u32).ok()?;
        Some(parse_manifest(&bytes))
    }
}

fn read_eocd(
    file: &mut File,
    file_len: u64,
    display_path: &str,
) -> Result<(u64, u64, u16), OpenError> {
    if file_len < EOCD_MIN_LEN as u64 {
        return Err(malformed(display_path, "too short for end-of-central-directory"));
    }
    let win_len = (file_len as usize).min(EOCD_SEARCH_MAX);
    let win_off = file_len - win_len as u64;
    let mut win = vec![0u8; win_len];
    file.seek(SeekFrom::Start(win_off)).map_err(OpenError::io)?;
    file.read_exact(&mut win).map_err(OpenError::io)?;

    let eocd_rel = rfind_sig_u32_le(&win, SIG_EOCD)
        .ok_or_else(|| malformed(display_path, "end-of-central-directory not found"))?;
    if eocd_rel + EOCD_MIN_LEN > win.len() {
        return Err(malformed(display_path, "truncated end-of-central-directory"));
    }
    let eocd = &win[eocd_rel..];

    let disk_number = read_u16_le(eocd, 4);
    let cd_disk = read_u16_le(eocd, 6);
    if disk_number != 0 || cd_disk != 0 {
        return Err(malformed(display_path, "multi-disk archives unsupported"));
    }
    let entries_this_disk = read_u16_le(eocd, 8);
    let entries_total = read_u16_le(eocd, 10);
    let cd_size = read_u32_le(eocd, 12) as u64;
    let cd_offset = read_u32_le(eocd, 16) as u64;

    if entries_total == u16::MAX || cd_size == u32::MAX as u64 || cd_offset == u32::MAX as u64 {
        return Err(malformed(display_path, "zip64 unsupported"));
    }
    if entries_this_disk != entries_total {
        return Err(malformed(display_path, "inconsistent entry counts"));
    }
    if cd_offset.saturating_add(cd_size) > file_len {
        return Err(malformed(display_path, "central directory out of bounds"));
    }
    Ok((cd_offset, cd_size, entries_total))
}

fn parse_central_directory(
    cd: &[u8],
    entries_total: u16,
    file_len: u64,
    display_path: &str,
) -> Result<Vec<ZipEntry>, OpenError> {
    let mut entries = Vec::with_capacity(entries_total as usize);
    let mut pos = 0usize;
    for _ in 0..entries_total {
        if pos + CDFH_LEN > cd.len() {
            return Err(malformed(display_path, "truncated central directory"));
        }
        let rec = &cd[pos..];
        if read_u32_le(rec, 0) != SIG_CDFH {
            return Err(malformed(display_path, "bad central directory signature"));
        }
        let flags = read_u16_le(rec, 8);
        let method = read_u16_le(rec, 10);
        let compressed_size = read_u32_le(rec, 20) as u64;
        let uncompressed_size = read_u32_le(rec, 24) as u64;
        let name_len = read_u16_le(rec, 28) as usize;
        let extra_len = read_u16_le(rec, 30) as usize;
        let comment_len = read_u16_le(rec, 32) as usize;
        let local_header_offset = read_u32_le(rec, 42) as u64;

        if compressed_size == u32::MAX as u64
            || uncompressed_size == u32::MAX as u64
            || local_header_offset == u32::MAX as u64
        {
            return Err(malformed(display_path, "zip64 unsupported"));
        }
        if local_header_offset.saturating_add(compressed_size) > file_len {
            return Err(malformed(display_path, "entry out of bounds"));
        }
        if pos + CDFH_LEN + name_len > cd.len() {
            return Err(malformed(display_path, "truncated entry name"));
        }

        let raw_name = &cd[pos + CDFH_LEN..pos + CDFH_LEN + name_len];
        let name = String::from_utf8_lossy(raw_name)
            .trim_start_matches('/')
            .to_string();
        let is_dir = name.ends_with('/') || name.is_empty();

        entries.push(ZipEntry {
            name,
            flags,
            method,
            compressed_size,
            uncompressed_size,
            local_header_offset,
            is_dir,
        });

        pos += CDFH_LEN + name_len + extra_len + comment_len;
    }
    Ok(entries)
}

// --------------------------
// Manifest
// --------------------------

/// Parses the main section of a jar manifest.
///
/// Physical lines are CRLF- or LF-terminated and wrap at 72 bytes; a
/// continuation line starts with a single space and appends to the previous
/// logical line. Parsing stops at the first blank line (end of the main
/// section). Attribute names compare case-insensitively.
pub fn parse_manifest(bytes: &[u8]) -> ManifestAttributes {
    let mut attrs = ManifestAttributes::default();
    let text = String::from_utf8_lossy(bytes);

    let mut logical: Vec<String> = Vec::new();
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            // Blank line ends the main section.
            break;
        }
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some(last) = logical.last_mut() {
                last.push_str(continuation);
            }
        } else {
            logical.push(line.to_string());
        }
    }

    for line in logical {
        let Some(colon) = memchr::memchr(b':', line.as_bytes()) else {
            continue;
        };
        let key = line[..colon].trim();
        let value = line[colon + 1..].trim();
        if key.eq_ignore_ascii_case("Class-Path") {
            attrs.class_path = Some(value.to_string());
        } else if key.eq_ignore_ascii_case("Add-Exports") {
            attrs.add_exports = Some(value.to_string());
        } else if key.eq_ignore_ascii_case("Add-Opens") {
            attrs.add_opens = Some(value.to_string());
        }
    }
    attrs
}

/// Splits a manifest attribute value on runs of whitespace.
pub fn split_manifest_value(value: &str) -> Vec<&str> {
    value.split_ascii_whitespace().collect()
}

// --------------------------
// Helpers
// --------------------------

fn malformed(path: &str, detail: &str) -> OpenError {
    OpenError::MalformedArchive {
        path: path.to_string(),
        detail: detail.to_string(),
    }
}

fn invalid_data(detail: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, detail)
}

#[inline]
fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

#[inline]
fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Finds the last occurrence of a little-endian `u32` signature.
fn rfind_sig_u32_le(buf: &[u8], sig: u32) -> Option<usize> {
    let bytes = sig.to_le_bytes();
    if buf.len() < 4 {
        return None;
    }
    let mut i = buf.len() - 4;
    loop {
        if buf[i..i + 4] == bytes {
            return Some(i);
        }
        if i == 0 {
            return None;
        }
        i -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_unwraps_continuation_lines() {
        let bytes = b"Manifest-Version: 1.0\r\nClass-Path: b.jar\r\n  c.jar\r\n\r\nName: ignored\r\nClass-Path: later.jar\r\n";
        let attrs = parse_manifest(bytes);
        // The wrapped value joins without the continuation marker, and the
        // post-blank-line section is never consulted.
        assert_eq!(attrs.class_path.as_deref(), Some("b.jar c.jar"));
    }

    #[test]
    fn manifest_keys_compare_case_insensitively() {
        let attrs = parse_manifest(b"class-path: x.jar\nADD-EXPORTS: m/p\nAdd-Opens: m/q\n");
        assert_eq!(attrs.class_path.as_deref(), Some("x.jar"));
        assert_eq!(attrs.add_exports.as_deref(), Some("m/p"));
        assert_eq!(attrs.add_opens.as_deref(), Some("m/q"));
    }

    #[test]
    fn manifest_values_split_on_whitespace() {
        assert_eq!(
            split_manifest_value("  b.jar   c.jar\td.jar "),
            vec!["b.jar", "c.jar", "d.jar"]
        );
    }

    #[test]
    fn signature_search_finds_last_occurrence() {
        let mut buf = vec![0u8; 64];
        buf[10..14].copy_from_slice(&SIG_EOCD.to_le_bytes());
        buf[40..44].copy_from_slice(&SIG_EOCD.to_le_bytes());
        assert_eq!(rfind_sig_u32_le(&buf, SIG_EOCD), Some(40));
        assert_eq!(rfind_sig_u32_le(&[0u8; 3], SIG_EOCD), None);
    }
}
