//! Rootfs manifests.
//!
//! A manifest is a small YAML file that names the directory to pack and the
//! entrypoint of the resulting image:
//!
//! ```yaml
//! directory: ./rootfs
//! cmd: ["/usr/bin/server", "--port", "8080"]
//! env:
//!   - PATH=/usr/bin
//!   - RUST_LOG=info
//! ```
//!
//! `directory` is resolved relative to the manifest file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{BuildOptions, Builder, DirectoryBuilder};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootfsManifest {
    pub directory: PathBuf,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
}

impl RootfsManifest {
    pub fn parse(yaml: &str, path: &Path) -> Result<Self> {
        let manifest: RootfsManifest = serde_yaml::from_str(yaml).map_err(|e| invalid(path, e))?;

        for var in &manifest.env {
            match var.split_once('=') {
                Some((key, _)) if !key.is_empty() => {}
                _ => {
                    return Err(Error::Configuration {
                        message: format!(
                            "invalid rootfs manifest {}: environment entry '{}' is not KEY=VALUE",
                            path.display(),
                            var
                        ),
                        hint: None,
                    })
                }
            }
        }

        Ok(manifest)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents, path)
    }
}

fn invalid(path: &Path, e: serde_yaml::Error) -> Error {
    Error::Configuration {
        message: format!("invalid rootfs manifest {}: {}", path.display(), e),
        hint: Some("a manifest needs at least a 'directory:' key".to_string()),
    }
}

/// Packs the directory named by a manifest and reports its entrypoint.
pub struct ManifestBuilder {
    manifest: RootfsManifest,
    inner: DirectoryBuilder,
}

impl ManifestBuilder {
    pub fn new(path: &Path, opts: BuildOptions) -> Result<Self> {
        let manifest = RootfsManifest::from_file(path)?;

        let directory = if manifest.directory.is_absolute() {
            manifest.directory.clone()
        } else {
            path.parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&manifest.directory)
        };
        let inner = DirectoryBuilder::new(&directory, opts)?;

        Ok(Self { manifest, inner })
    }
}

impl Builder for ManifestBuilder {
    fn build(&mut self, cancel: &CancelToken) -> Result<PathBuf> {
        self.inner.build(cancel)
    }

    fn args(&self) -> Vec<String> {
        self.manifest.cmd.clone()
    }

    fn env(&self) -> Vec<String> {
        self.manifest.env.clone()
    }
}
