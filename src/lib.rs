//! # unirootfs
//!
//! This library builds the root filesystem of a unikernel project once for
//! every CPU architecture the project targets, and collects the entrypoint
//! command and environment each build reports so they can be embedded into
//! the boot image later. It is used by the `unirootfs` command-line tool but
//! can be driven directly.
//!
//! ## Quick Example
//!
//! ```no_run
//! use std::path::Path;
//! use unirootfs::config::Config;
//! use unirootfs::rootfs::Orchestrator;
//! use unirootfs::target::Target;
//!
//! let targets = vec![
//!     Target::new("qemu", "x86_64"),
//!     Target::new("rpi", "arm64"),
//!     Target::new("firecracker", "x86_64"),
//! ];
//!
//! let result = Orchestrator::new("/work/app", &Config::default())
//!     .build_rootfs(Path::new("rootfs.yaml"), true, &targets)
//!     .unwrap();
//!
//! // Two builds: x86_64 and arm64.
//! assert_eq!(result.commands.len(), 2);
//! ```
//!
//! ## Core Concepts
//!
//! - **Targets (`target`)**: build configurations pinned to an architecture,
//!   and the deduplication of targets into distinct architectures.
//! - **Builders (`initrd`)**: turn a rootfs source (directory, manifest or
//!   archive) into a cpio initramfs for one architecture.
//! - **Task tree (`tasktree`)**: runs the per-architecture builds one at a
//!   time and renders their progress.
//! - **Orchestration (`rootfs`)**: ties the above together and folds the
//!   per-architecture outputs into a single result.
//! - **Configuration (`config`, `defaults`, `output`, `logging`)**: log type,
//!   project file, on-disk layout and terminal output settings.

pub mod cancel;
pub mod config;
pub mod defaults;
pub mod error;
pub mod initrd;
pub mod logging;
pub mod output;
pub mod rootfs;
pub mod target;
pub mod tasktree;

#[cfg(test)]
mod target_proptest;
