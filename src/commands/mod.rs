//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `unirootfs` command-line tool. Each subcommand is defined in its own file.
//!
//! ## Structure
//!
//! Each command module typically contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and performs the
//!   command's logic by calling into the `unirootfs` library.
//!
//! `build` and `plan` share the rootfs/target selection in [`RootfsArgs`].

pub mod build;
pub mod completions;
pub mod plan;

use anyhow::{Context, Result};
use clap::Args;
use log::debug;
use std::path::PathBuf;

use unirootfs::config::{self, ProjectConfig};
use unirootfs::defaults;
use unirootfs::target::Target;

/// Selection of the rootfs source and the targets to build it for.
#[derive(Args, Debug, Clone, Default)]
pub struct RootfsArgs {
    /// Rootfs source: a directory, a rootfs manifest (.yaml) or a cpio archive.
    ///
    /// Relative paths are resolved against the working directory. Falls back
    /// to the `rootfs` key of the project file.
    #[arg(value_name = "ROOTFS")]
    pub rootfs: Option<PathBuf>,

    /// Target to build for, as ARCH or NAME:ARCH. Can be repeated.
    #[arg(short, long = "target", value_name = "[NAME:]ARCH")]
    pub targets: Vec<String>,

    /// Working directory (defaults to the current directory)
    #[arg(short = 'C', long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Project file (defaults to unirootfs.yaml in the working directory)
    #[arg(short, long, value_name = "FILE", env = "UNIROOTFS_PROJECT")]
    pub project: Option<PathBuf>,
}

/// Inputs of one orchestration run after flags and project file are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub workdir: PathBuf,
    pub rootfs: PathBuf,
    pub targets: Vec<Target>,
    pub compress: bool,
}

impl RootfsArgs {
    /// Merge command-line flags over the project file. Flags win.
    pub fn resolve(&self) -> Result<Invocation> {
        let workdir = match &self.workdir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to get current directory")?,
        };

        let project = self.load_project(&workdir)?.unwrap_or(ProjectConfig {
            compress: true,
            ..ProjectConfig::default()
        });

        let rootfs = self
            .rootfs
            .clone()
            .or(project.rootfs)
            .unwrap_or_default();

        let targets = if self.targets.is_empty() {
            project.targets
        } else {
            self.targets.iter().map(|t| Target::parse(t)).collect()
        };

        Ok(Invocation {
            workdir,
            rootfs,
            targets,
            compress: project.compress,
        })
    }

    fn load_project(&self, workdir: &std::path::Path) -> Result<Option<ProjectConfig>> {
        let path = match &self.project {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => workdir.join(path),
            None => {
                let default = workdir.join(defaults::PROJECT_FILE);
                if !default.exists() {
                    return Ok(None);
                }
                default
            }
        };

        debug!("Loading project file {}", path.display());
        let project = config::from_file(&path)
            .with_context(|| format!("Failed to load project file {}", path.display()))?;
        Ok(Some(project))
    }
}
