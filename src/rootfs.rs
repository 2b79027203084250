//! # Rootfs Orchestration
//!
//! Builds the rootfs of a project once per distinct target architecture and
//! collects what the boot image needs from each build.
//!
//! ## Flow
//!
//! 1. Collapse the targets to their distinct architectures, first-seen order.
//! 2. Resolve the rootfs source against the working directory, once.
//! 3. Construct one builder per architecture. Any failure here is reported
//!    before a single build runs.
//! 4. Run the builds through a sequential [`TaskTree`] while holding the
//!    rootfs cache lock.
//! 5. Fold the per-architecture outputs into a [`RootfsBuild`].
//!
//! A failed or cancelled run returns only the error; partial results are
//! dropped.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::defaults;
use crate::error::{Error, Result};
use crate::initrd::{BuildOptions, BuilderFactory, CacheLock, InitrdFactory};
use crate::target::{unique_architectures, BuildTarget};
use crate::tasktree::{RendererKind, TaskItem, TaskTree, TaskTreeOptions};

const TASK_NAME: &str = "building rootfs";

/// What one architecture's build produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchOutput {
    pub architecture: String,
    pub rootfs: PathBuf,
    pub command: Vec<String>,
    pub env: Vec<String>,
}

/// Aggregated result of a rootfs run.
///
/// `architectures`, `commands` and `envs` are index-aligned and ordered by
/// the first appearance of each architecture in the target list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RootfsBuild {
    /// Path produced by the last build, `None` if nothing was built.
    pub rootfs: Option<PathBuf>,
    pub architectures: Vec<String>,
    pub commands: Vec<Vec<String>>,
    pub envs: Vec<Vec<String>>,
}

impl RootfsBuild {
    pub fn is_empty(&self) -> bool {
        self.architectures.is_empty()
    }

    /// Fold per-architecture outputs, in execution order.
    pub fn from_outputs(outputs: Vec<ArchOutput>) -> Self {
        outputs
            .into_iter()
            .fold(RootfsBuild::default(), |mut acc, output| {
                acc.rootfs = Some(output.rootfs);
                acc.architectures.push(output.architecture);
                acc.commands.push(output.command);
                acc.envs.push(output.env);
                acc
            })
    }
}

/// The planned build for one architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedBuild {
    pub architecture: String,
    pub rootfs: PathBuf,
    pub output: PathBuf,
    pub cache_dir: PathBuf,
}

/// Resolve `rootfs` against `workdir` and lexically clean the result.
///
/// Absolute paths keep their location, so applying this to its own output
/// returns the same path.
pub fn resolve_rootfs(workdir: &Path, rootfs: &Path) -> PathBuf {
    let joined = if rootfs.is_absolute() {
        rootfs.to_path_buf()
    } else {
        workdir.join(rootfs)
    };

    let mut cleaned = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                // `..` at the root is the root itself.
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                None | Some(Component::ParentDir) | Some(Component::CurDir) => {
                    cleaned.push("..");
                }
            },
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Drives one rootfs build per distinct architecture.
pub struct Orchestrator {
    workdir: PathBuf,
    renderer: RendererKind,
    factory: Arc<dyn BuilderFactory>,
    cancel: CancelToken,
}

impl Orchestrator {
    /// An orchestrator using the bundled initramfs builders, rendering
    /// progress as selected by the configured log type.
    pub fn new(workdir: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            workdir: workdir.into(),
            renderer: RendererKind::from_log_type(config.log.log_type),
            factory: Arc::new(InitrdFactory),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn BuilderFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_renderer(mut self, renderer: RendererKind) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Describe the builds `build_rootfs` would run, without running them.
    pub fn plan<T: BuildTarget>(&self, rootfs: &Path, targets: &[T]) -> Vec<PlannedBuild> {
        if rootfs.as_os_str().is_empty() {
            return Vec::new();
        }

        let resolved = resolve_rootfs(&self.workdir, rootfs);
        let cache_dir = defaults::rootfs_cache_dir(&self.workdir);

        unique_architectures(targets)
            .into_iter()
            .map(|arch| PlannedBuild {
                output: defaults::initramfs_output(&self.workdir, &arch),
                rootfs: resolved.clone(),
                cache_dir: cache_dir.clone(),
                architecture: arch,
            })
            .collect()
    }

    /// Build the rootfs once for every distinct architecture in `targets`.
    pub fn build_rootfs<T: BuildTarget>(
        &self,
        rootfs: &Path,
        compress: bool,
        targets: &[T],
    ) -> Result<RootfsBuild> {
        let plan = self.plan(rootfs, targets);
        if plan.is_empty() {
            debug!("No rootfs to build");
            return Ok(RootfsBuild::default());
        }

        let mut items = Vec::with_capacity(plan.len());
        for planned in plan.iter() {
            let opts = BuildOptions {
                output: planned.output.clone(),
                cache_dir: planned.cache_dir.clone(),
                architecture: planned.architecture.clone(),
                compress,
            };
            let mut builder = self
                .factory
                .new_builder(&planned.rootfs, opts)
                .map_err(|e| builder_init_error(&planned.architecture, e))?;

            let arch = planned.architecture.clone();
            items.push(TaskItem::new(
                TASK_NAME,
                arch.clone(),
                move |cancel: &CancelToken| {
                    let path = builder
                        .build(cancel)
                        .map_err(|e| Error::build(arch.clone(), e))?;
                    Ok(ArchOutput {
                        architecture: arch,
                        rootfs: path,
                        command: builder.args(),
                        env: builder.env(),
                    })
                },
            ));
        }

        // Builds share one cache directory and must not run concurrently.
        let mut tree = TaskTree::new(
            TaskTreeOptions {
                parallel: false,
                renderer: self.renderer,
            },
            items,
        )?;

        let _lock = CacheLock::acquire(&defaults::rootfs_cache_dir(&self.workdir))?;
        info!(
            "Building rootfs {} for {}",
            plan[0].rootfs.display(),
            plan.iter()
                .map(|p| p.architecture.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let outputs = tree.start(&self.cancel)?;
        Ok(RootfsBuild::from_outputs(outputs))
    }
}

/// Name the architecture whose builder could not be constructed, keeping
/// any hint the builder gave.
fn builder_init_error(architecture: &str, err: Error) -> Error {
    let (cause, hint) = match err {
        Error::Configuration { message, hint } => (message, hint),
        other => (other.to_string(), None),
    };
    Error::Configuration {
        message: format!(
            "could not initialize initramfs builder for {}: {}",
            architecture, cause
        ),
        hint,
    }
}

/// Build `rootfs` for every distinct architecture of `targets` with the
/// bundled builders.
pub fn build_rootfs<T: BuildTarget>(
    config: &Config,
    cancel: &CancelToken,
    workdir: &Path,
    rootfs: &Path,
    compress: bool,
    targets: &[T],
) -> Result<RootfsBuild> {
    Orchestrator::new(workdir, config)
        .with_cancel(cancel.clone())
        .build_rootfs(rootfs, compress, targets)
}
