//! Default values and on-disk layout conventions.
//!
//! All build artifacts live below the working directory so that a project
//! can be cleaned by removing a single directory.

use std::path::{Path, PathBuf};

/// Build output directory, relative to the working directory.
pub const BUILD_DIR: &str = ".unikraft/build";

/// Vendor directory holding fetched and cached material.
pub const VENDOR_DIR: &str = ".unikraft/vendor";

/// Name of the rootfs cache below [`VENDOR_DIR`].
pub const ROOTFS_CACHE_DIR: &str = "rootfs-cache";

/// Default project file looked up in the working directory.
pub const PROJECT_FILE: &str = "unirootfs.yaml";

/// File name of the initramfs archive built for `arch`.
pub fn initramfs_file_name(arch: &str) -> String {
    format!("initramfs-{}.cpio", arch)
}

/// Output path of the initramfs archive for `arch`.
pub fn initramfs_output(workdir: &Path, arch: &str) -> PathBuf {
    workdir.join(BUILD_DIR).join(initramfs_file_name(arch))
}

/// Shared rootfs cache directory for one working directory.
pub fn rootfs_cache_dir(workdir: &Path) -> PathBuf {
    workdir.join(VENDOR_DIR).join(ROOTFS_CACHE_DIR)
}
