//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures and helper functions to reduce
//! duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_rootfs_dir();
//!     fixture.command().arg("build").arg("rootfs").assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::files;
    pub use super::TestFixture;
}

/// Common file contents for testing.
#[allow(dead_code)]
pub mod files {
    /// Manifest packing `./rootfs` with an entrypoint and environment.
    pub const MANIFEST: &str = r#"
directory: ./rootfs
cmd: ["/bin/app", "--serve"]
env:
  - PATH=/bin
"#;

    /// Project file selecting the manifest for two architectures.
    pub const PROJECT: &str = r#"
rootfs: ./rootfs.yaml
targets:
  - name: qemu
    architecture: x86_64
  - name: firecracker
    architecture: x86_64
  - name: rpi
    arch: arm64
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "invalid: yaml: content:";
}

/// A test fixture that provides a temporary working directory.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a small rootfs directory at `rootfs/`.
    pub fn with_rootfs_dir(self) -> Self {
        self.with_file("rootfs/bin/app", "#!/bin/sh\necho hello\n")
            .with_file("rootfs/etc/hostname", "unikernel\n")
    }

    /// Add the rootfs directory plus a manifest at `rootfs.yaml`.
    #[allow(dead_code)]
    pub fn with_manifest(self) -> Self {
        self.with_rootfs_dir().with_file("rootfs.yaml", files::MANIFEST)
    }

    /// Add a `unirootfs.yaml` project file with the given content.
    #[allow(dead_code)]
    pub fn with_project(self, content: &str) -> Self {
        self.with_file("unirootfs.yaml", content)
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of the archive built for `arch`.
    #[allow(dead_code)]
    pub fn initramfs(&self, arch: &str) -> PathBuf {
        self.path()
            .join(".unikraft/build")
            .join(format!("initramfs-{}.cpio", arch))
    }

    /// Create a command configured to run in this fixture's directory.
    ///
    /// Plain log output is forced so runs do not depend on the terminal.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("unirootfs");
        cmd.current_dir(self.path())
            .env("UNIROOTFS_LOG_TYPE", "basic")
            .env_remove("UNIROOTFS_PROJECT");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_with_rootfs_dir() {
        let fixture = TestFixture::new().with_rootfs_dir();
        assert!(fixture.path().join("rootfs/bin/app").exists());
    }

    #[test]
    fn test_files_are_valid_yaml() {
        for content in [files::MANIFEST, files::PROJECT] {
            let parsed: Result<serde_yaml::Value, _> = serde_yaml::from_str(content);
            assert!(parsed.is_ok(), "invalid fixture yaml: {}", content);
        }
    }
}
