//! # Initramfs Builders
//!
//! This module turns a rootfs source into an initramfs archive for one CPU
//! architecture. The orchestrator only talks to the [`Builder`] and
//! [`BuilderFactory`] traits, so the concrete builders can be swapped out,
//! which is how the orchestration tests count invocations without touching
//! the filesystem.
//!
//! ## Rootfs sources
//!
//! [`InitrdFactory`] picks a builder from the shape of the rootfs path:
//!
//! - a **directory** is packed as-is by [`DirectoryBuilder`];
//! - a **`.yaml`/`.yml` file** is a rootfs manifest read by
//!   [`ManifestBuilder`], which packs the directory it names and also
//!   provides the command line and environment of the image;
//! - any **other file** is taken to be a prebuilt cpio archive and copied by
//!   [`FileBuilder`].
//!
//! All builders write `newc` cpio archives, gzip-compressed when requested,
//! and publish the output atomically (write to a `.partial` file, then
//! rename).

pub mod cpio;
pub mod directory;
pub mod file;
pub mod lock;
pub mod manifest;

pub use directory::DirectoryBuilder;
pub use file::FileBuilder;
pub use lock::CacheLock;
pub use manifest::ManifestBuilder;

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

/// Architectures the bundled builders can produce archives for.
pub const SUPPORTED_ARCHITECTURES: &[&str] = &["x86_64", "arm64", "arm"];

/// Options a builder is constructed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Where the finished archive is written.
    pub output: PathBuf,
    /// Cache directory shared by every architecture of one run.
    pub cache_dir: PathBuf,
    pub architecture: String,
    pub compress: bool,
}

/// Builds one initramfs archive.
///
/// `args` and `env` are only meaningful after a successful `build`.
pub trait Builder: Send {
    /// Materialize the archive and return its path.
    fn build(&mut self, cancel: &CancelToken) -> Result<PathBuf>;

    /// Command line of the image's entrypoint.
    fn args(&self) -> Vec<String>;

    /// Environment of the image's entrypoint as `KEY=VALUE` strings.
    fn env(&self) -> Vec<String>;
}

/// Creates builders for a rootfs source.
pub trait BuilderFactory: Send + Sync {
    fn new_builder(&self, rootfs: &Path, opts: BuildOptions) -> Result<Box<dyn Builder>>;
}

/// The default factory, dispatching on the kind of rootfs source.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitrdFactory;

impl BuilderFactory for InitrdFactory {
    fn new_builder(&self, rootfs: &Path, opts: BuildOptions) -> Result<Box<dyn Builder>> {
        validate_architecture(&opts.architecture)?;

        if rootfs.is_dir() {
            return Ok(Box::new(DirectoryBuilder::new(rootfs, opts)?));
        }

        if !rootfs.is_file() {
            return Err(Error::Configuration {
                message: format!("rootfs source not found: {}", rootfs.display()),
                hint: Some(
                    "pass a directory, a rootfs manifest (.yaml) or a cpio archive".to_string(),
                ),
            });
        }

        if is_manifest(rootfs) {
            Ok(Box::new(ManifestBuilder::new(rootfs, opts)?))
        } else {
            Ok(Box::new(FileBuilder::new(rootfs, opts)))
        }
    }
}

/// Reject architectures the bundled builders cannot target.
pub fn validate_architecture(arch: &str) -> Result<()> {
    if SUPPORTED_ARCHITECTURES.contains(&arch) {
        return Ok(());
    }
    Err(Error::Configuration {
        message: format!("unsupported architecture '{}'", arch),
        hint: Some(format!(
            "supported architectures: {}",
            SUPPORTED_ARCHITECTURES.join(", ")
        )),
    })
}

fn is_manifest(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Returns true if `path` starts with the gzip magic bytes.
pub(crate) fn is_gzip(path: &Path) -> Result<bool> {
    use std::io::Read;

    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    let read = file.read(&mut magic)?;
    Ok(read == 2 && magic == [0x1f, 0x8b])
}

/// Hex SHA-256 of a file's contents.
pub(crate) fn sha256_file(path: &Path) -> Result<String> {
    use std::io::Read;

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Write an archive to `output` through `fill`, compressing if requested.
///
/// The data goes to a sibling `.partial` file first and is renamed into
/// place only once `fill` succeeded, so a failed or cancelled build never
/// leaves a truncated archive at `output`.
pub(crate) fn write_output<F>(output: &Path, compress: bool, fill: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut partial = OsString::from(output.as_os_str());
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let result = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&partial)?);
        if compress {
            let mut encoder = GzEncoder::new(&mut writer, Compression::default());
            fill(&mut encoder)?;
            encoder.finish()?;
        } else {
            fill(&mut writer)?;
        }
        writer.flush()?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            fs::rename(&partial, output)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}
