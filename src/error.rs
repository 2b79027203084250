//! # Error Handling
//!
//! This module defines the centralized error type for `unirootfs`. It uses
//! the `thiserror` library to describe every failure mode of an
//! orchestration run with enough context (phase, architecture, path) to be
//! actionable.
//!
//! ## Taxonomy
//!
//! - **`Configuration`**: a builder could not be constructed, e.g. the
//!   architecture is unsupported or the rootfs path does not exist. Raised
//!   before any task runs.
//! - **`Build`**: an individual architecture's image build failed. Carries
//!   the architecture and the underlying cause.
//! - **`Orchestration`**: the task runner itself failed to initialize or
//!   start, distinct from a build failure.
//! - **`Cancelled`**: the run was cancelled or its deadline passed.
//!
//! The remaining variants wrap lower-level failures (I/O, YAML, JSON,
//! directory walking, cache locking) so they can be propagated with `?`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which part of the runner lifecycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Building the task tree and its renderer.
    Construct,
    /// Running the tasks.
    Execute,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Construct => write!(f, "task tree construction"),
            Phase::Execute => write!(f, "task execution"),
        }
    }
}

/// Main error type for unirootfs operations
#[derive(Error, Debug)]
pub enum Error {
    /// A builder could not be configured for the requested inputs.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Configuration {
        message: String,
        /// Optional hint for how to fix the input
        hint: Option<String>,
    },

    /// The rootfs image build for one architecture failed.
    #[error("Build error for {architecture}: {source}")]
    Build {
        architecture: String,
        #[source]
        source: Box<Error>,
    },

    /// The task runner failed outside of any individual build.
    #[error("Orchestration error during {phase}: {message}")]
    Orchestration { phase: Phase, message: String },

    /// The run was cancelled before the task could complete.
    #[error("Cancelled: {task}")]
    Cancelled { task: String },

    /// The shared rootfs cache is held by another run.
    #[error("Rootfs cache is locked by another process (PID {pid}): {}\n  hint: wait for the other build to finish", path.display())]
    CacheLocked { path: PathBuf, pid: u32 },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A directory traversal error, wrapped from `walkdir::Error`.
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl Error {
    /// Shorthand for a configuration error without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            hint: None,
        }
    }

    /// Wrap an error with the architecture whose build produced it.
    pub fn build(architecture: impl Into<String>, source: Error) -> Self {
        Error::Build {
            architecture: architecture.into(),
            source: Box::new(source),
        }
    }

    /// Returns true if this error, or the build error it wraps, is a
    /// cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled { .. } => true,
            Error::Build { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// The architecture whose build failed, if this is a build error.
    pub fn architecture(&self) -> Option<&str> {
        match self {
            Error::Build { architecture, .. } => Some(architecture),
            _ => None,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
