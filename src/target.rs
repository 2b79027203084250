//! Build targets and architecture deduplication.
//!
//! A target is a build configuration pinned to one CPU architecture. Several
//! targets can share an architecture (e.g. a QEMU and a Firecracker target
//! for `x86_64`); the rootfs only needs to be built once for each of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Anything that can be built for a CPU architecture.
pub trait BuildTarget {
    /// Architecture identifier, e.g. `"x86_64"` or `"arm64"`.
    fn architecture(&self) -> &str;
}

/// A named build target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub name: String,
    #[serde(alias = "arch")]
    pub architecture: String,
}

impl Target {
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
        }
    }

    /// Parse `NAME:ARCH` or a bare `ARCH` as given on the command line.
    pub fn parse(value: &str) -> Self {
        match value.split_once(':') {
            Some((name, arch)) => Self::new(name, arch),
            None => Self::new(value, value),
        }
    }
}

impl BuildTarget for Target {
    fn architecture(&self) -> &str {
        &self.architecture
    }
}

impl<T: BuildTarget + ?Sized> BuildTarget for &T {
    fn architecture(&self) -> &str {
        (**self).architecture()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() || self.name == self.architecture {
            write!(f, "{}", self.architecture)
        } else {
            write!(f, "{} ({})", self.name, self.architecture)
        }
    }
}

/// Collapse targets to their distinct architectures, keeping the order in
/// which each architecture was first seen.
pub fn unique_architectures<T: BuildTarget>(targets: &[T]) -> Vec<String> {
    let mut archs: Vec<String> = Vec::new();

    for target in targets {
        let arch = target.architecture();
        if archs.iter().any(|seen| seen == arch) {
            continue;
        }
        archs.push(arch.to_string());
    }

    archs
}
