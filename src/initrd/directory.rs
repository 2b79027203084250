//! Pack a directory tree into an initramfs archive.
//!
//! The tree is scanned in file-name order so archives are reproducible. A
//! scan index is kept in the shared cache directory, one per architecture,
//! together with the size and SHA-256 of the archive it produced. The
//! archive is reused instead of rewritten only when a new scan matches the
//! cached one and the file at the output path still has that digest.

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::cpio::{CpioWriter, Header};
use super::{sha256_file, write_output, BuildOptions, Builder};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
    Symlink { target: String },
}

/// One scanned filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path relative to the rootfs directory, `/`-separated.
    pub path: String,
    pub kind: EntryKind,
    pub mode: u32,
    pub size: u64,
    pub mtime: u64,
    #[serde(default)]
    pub mtime_nsec: u32,
}

/// Size and SHA-256 of a written archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDigest {
    pub size: u64,
    pub sha256: String,
}

impl ArchiveDigest {
    pub fn of(path: &Path) -> Result<Self> {
        Ok(Self {
            size: fs::metadata(path)?.len(),
            sha256: sha256_file(path)?,
        })
    }
}

/// Everything that determines the bytes of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheIndex {
    pub source: PathBuf,
    pub compress: bool,
    pub entries: Vec<IndexEntry>,
    /// Digest of the archive written from `entries`.
    #[serde(default)]
    pub archive: Option<ArchiveDigest>,
}

impl CacheIndex {
    /// True if both indexes were scanned from the same inputs.
    fn same_inputs(&self, other: &CacheIndex) -> bool {
        self.source == other.source
            && self.compress == other.compress
            && self.entries == other.entries
    }
}

pub struct DirectoryBuilder {
    source: PathBuf,
    opts: BuildOptions,
}

impl DirectoryBuilder {
    pub fn new(source: &Path, opts: BuildOptions) -> Result<Self> {
        if !source.is_dir() {
            return Err(Error::config(format!(
                "rootfs directory not found: {}",
                source.display()
            )));
        }
        Ok(Self {
            source: source.to_path_buf(),
            opts,
        })
    }

    fn index_path(&self) -> PathBuf {
        self.opts
            .cache_dir
            .join(&self.opts.architecture)
            .join(INDEX_FILE)
    }
}

impl Builder for DirectoryBuilder {
    fn build(&mut self, cancel: &CancelToken) -> Result<PathBuf> {
        let arch = self.opts.architecture.as_str();
        let entries = scan(&self.source, cancel, arch)?;
        let mut index = CacheIndex {
            source: self.source.clone(),
            compress: self.opts.compress,
            entries,
            archive: None,
        };

        let index_path = self.index_path();
        if let Some(cached) = load_index(&index_path) {
            if cached.same_inputs(&index) && output_matches(&self.opts.output, &cached)? {
                debug!(
                    "Rootfs for {} unchanged, reusing {}",
                    arch,
                    self.opts.output.display()
                );
                return Ok(self.opts.output.clone());
            }
        }

        info!(
            "Packing {} entries from {} for {}",
            index.entries.len(),
            self.source.display(),
            arch
        );
        write_output(&self.opts.output, self.opts.compress, |w| {
            pack(&self.source, &index.entries, w, cancel, arch)
        })?;

        index.archive = Some(ArchiveDigest::of(&self.opts.output)?);
        save_index(&index_path, &index)?;
        Ok(self.opts.output.clone())
    }

    fn args(&self) -> Vec<String> {
        Vec::new()
    }

    fn env(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Walk `root` and describe every directory, regular file and symlink.
pub fn scan(root: &Path, cancel: &CancelToken, task: &str) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        cancel.check(task)?;
        let entry = entry?;
        let metadata = entry.metadata()?;
        let file_type = entry.file_type();

        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            EntryKind::Symlink {
                target: target.to_string_lossy().into_owned(),
            }
        } else {
            debug!("Skipping special file {}", entry.path().display());
            continue;
        };

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::config(format!("{} escapes the rootfs", entry.path().display())))?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        let size = if matches!(kind, EntryKind::File) {
            metadata.len()
        } else {
            0
        };

        entries.push(IndexEntry {
            path,
            mode: permissions(&metadata, &kind),
            kind,
            size,
            mtime: modified.as_secs(),
            mtime_nsec: modified.subsec_nanos(),
        });
    }

    Ok(entries)
}

fn pack(
    root: &Path,
    entries: &[IndexEntry],
    w: &mut dyn Write,
    cancel: &CancelToken,
    task: &str,
) -> Result<()> {
    let mut archive = CpioWriter::new(w);

    for entry in entries {
        cancel.check(task)?;
        let mtime = u32::try_from(entry.mtime).unwrap_or(u32::MAX);
        let header = Header::new(entry.mode, mtime);

        match &entry.kind {
            EntryKind::Dir => archive.append_dir(&entry.path, header)?,
            EntryKind::File => {
                let mut reader = BufReader::new(File::open(root.join(&entry.path))?);
                archive.append_file(&entry.path, header, entry.size, &mut reader)?;
            }
            EntryKind::Symlink { target } => archive.append_symlink(&entry.path, target, header)?,
        }
    }

    archive.finish()?;
    Ok(())
}

#[cfg(unix)]
fn permissions(metadata: &fs::Metadata, _kind: &EntryKind) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permissions(metadata: &fs::Metadata, kind: &EntryKind) -> u32 {
    match kind {
        EntryKind::Dir => 0o755,
        EntryKind::Symlink { .. } => 0o777,
        EntryKind::File if metadata.permissions().readonly() => 0o444,
        EntryKind::File => 0o644,
    }
}

/// True if `output` is still the archive `cached` describes.
fn output_matches(output: &Path, cached: &CacheIndex) -> Result<bool> {
    let Some(expected) = &cached.archive else {
        return Ok(false);
    };
    if !output.is_file() || fs::metadata(output)?.len() != expected.size {
        return Ok(false);
    }
    Ok(sha256_file(output)? == expected.sha256)
}

fn load_index(path: &Path) -> Option<CacheIndex> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn save_index(path: &Path, index: &CacheIndex) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(index)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initrd::cpio::tests::list;
    use crate::initrd::FileBuilder;
    use tempfile::TempDir;

    fn rootfs(temp: &TempDir) -> PathBuf {
        let root = temp.path().join("rootfs");
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/app"), b"\x7fELF").unwrap();
        fs::write(root.join("etc/hostname"), b"unikernel\n").unwrap();
        root
    }

    fn options(temp: &TempDir, compress: bool) -> BuildOptions {
        BuildOptions {
            output: temp.path().join("build/initramfs-x86_64.cpio"),
            cache_dir: temp.path().join("cache"),
            architecture: "x86_64".to_string(),
            compress,
        }
    }

    #[test]
    fn test_scan_is_sorted_and_relative() {
        let temp = TempDir::new().unwrap();
        let root = rootfs(&temp);

        let entries = scan(&root, &CancelToken::new(), "x86_64").unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["bin", "bin/app", "etc", "etc/hostname"]);
        assert_eq!(entries[1].size, 4);
        assert_eq!(entries[0].size, 0);
    }

    #[test]
    fn test_build_writes_archive_and_index() {
        let temp = TempDir::new().unwrap();
        let root = rootfs(&temp);
        let opts = options(&temp, false);

        let mut builder = DirectoryBuilder::new(&root, opts.clone()).unwrap();
        let output = builder.build(&CancelToken::new()).unwrap();
        assert_eq!(output, opts.output);

        let archive = fs::read(&output).unwrap();
        let names: Vec<_> = list(&archive).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["bin", "bin/app", "etc", "etc/hostname"]);
        assert!(opts.cache_dir.join("x86_64").join(INDEX_FILE).exists());
    }

    #[test]
    fn test_unchanged_tree_reuses_archive() {
        let temp = TempDir::new().unwrap();
        let root = rootfs(&temp);
        let opts = options(&temp, true);

        DirectoryBuilder::new(&root, opts.clone())
            .unwrap()
            .build(&CancelToken::new())
            .unwrap();
        let first = fs::metadata(&opts.output).unwrap().modified().unwrap();

        // A second build must not rewrite the archive.
        DirectoryBuilder::new(&root, opts.clone())
            .unwrap()
            .build(&CancelToken::new())
            .unwrap();
        let second = fs::metadata(&opts.output).unwrap().modified().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_changed_tree_rebuilds() {
        let temp = TempDir::new().unwrap();
        let root = rootfs(&temp);
        let opts = options(&temp, false);

        DirectoryBuilder::new(&root, opts.clone())
            .unwrap()
            .build(&CancelToken::new())
            .unwrap();
        fs::write(root.join("etc/motd"), b"hello").unwrap();
        DirectoryBuilder::new(&root, opts.clone())
            .unwrap()
            .build(&CancelToken::new())
            .unwrap();

        let archive = fs::read(&opts.output).unwrap();
        assert!(list(&archive).iter().any(|(name, _)| name == "etc/motd"));
    }

    #[test]
    fn test_replaced_output_is_rebuilt() {
        let temp = TempDir::new().unwrap();
        let root = rootfs(&temp);
        let opts = options(&temp, false);

        DirectoryBuilder::new(&root, opts.clone())
            .unwrap()
            .build(&CancelToken::new())
            .unwrap();
        let packed = fs::read(&opts.output).unwrap();

        // Another builder overwrites the archive; the index is untouched.
        let foreign = temp.path().join("other.cpio");
        fs::write(&foreign, b"NOT-THE-DIRECTORY-ARCHIVE").unwrap();
        FileBuilder::new(&foreign, opts.clone())
            .build(&CancelToken::new())
            .unwrap();
        assert_eq!(fs::read(&opts.output).unwrap(), b"NOT-THE-DIRECTORY-ARCHIVE");

        DirectoryBuilder::new(&root, opts.clone())
            .unwrap()
            .build(&CancelToken::new())
            .unwrap();
        assert_eq!(fs::read(&opts.output).unwrap(), packed);
    }

    #[test]
    fn test_same_size_replacement_is_rebuilt() {
        let temp = TempDir::new().unwrap();
        let root = rootfs(&temp);
        let opts = options(&temp, false);

        DirectoryBuilder::new(&root, opts.clone())
            .unwrap()
            .build(&CancelToken::new())
            .unwrap();
        let packed = fs::read(&opts.output).unwrap();

        let mut tampered = packed.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;
        fs::write(&opts.output, &tampered).unwrap();

        DirectoryBuilder::new(&root, opts.clone())
            .unwrap()
            .build(&CancelToken::new())
            .unwrap();
        assert_eq!(fs::read(&opts.output).unwrap(), packed);
    }

    #[test]
    fn test_index_records_subsecond_mtime() {
        let temp = TempDir::new().unwrap();
        let root = rootfs(&temp);
        let app = root.join("bin/app");

        let base = UNIX_EPOCH + std::time::Duration::new(1_700_000_000, 0);
        let file = fs::OpenOptions::new().write(true).open(&app).unwrap();
        file.set_modified(base).unwrap();
        let before = scan(&root, &CancelToken::new(), "x86_64").unwrap();

        file.set_modified(base + std::time::Duration::from_millis(250))
            .unwrap();
        let modified = fs::metadata(&app).unwrap().modified().unwrap();
        if modified == base {
            // Filesystem keeps whole seconds only.
            return;
        }
        let after = scan(&root, &CancelToken::new(), "x86_64").unwrap();

        assert_ne!(before, after);
        let entry = after.iter().find(|e| e.path == "bin/app").unwrap();
        assert_eq!(entry.mtime, 1_700_000_000);
        assert_eq!(entry.mtime_nsec, 250_000_000);
    }

    #[test]
    fn test_cancelled_build_leaves_no_output() {
        let temp = TempDir::new().unwrap();
        let root = rootfs(&temp);
        let opts = options(&temp, false);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = DirectoryBuilder::new(&root, opts.clone())
            .unwrap()
            .build(&cancel)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!opts.output.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_archived_not_followed() {
        let temp = TempDir::new().unwrap();
        let root = rootfs(&temp);
        std::os::unix::fs::symlink("bin", root.join("sbin")).unwrap();

        let entries = scan(&root, &CancelToken::new(), "x86_64").unwrap();
        let sbin = entries.iter().find(|e| e.path == "sbin").unwrap();
        assert_eq!(
            sbin.kind,
            EntryKind::Symlink {
                target: "bin".to_string()
            }
        );
    }
}
