//! # Configuration
//!
//! This module holds the two configuration layers used by `unirootfs`:
//!
//! - **`Config`**: ambient runtime settings, currently the log level and the
//!   log type. The log type decides how build progress is rendered: `fancy`
//!   selects the interactive spinner view, every other type selects plain
//!   log lines.
//!
//! - **`ProjectConfig`**: the optional `unirootfs.yaml` project file that
//!   names the rootfs source and the targets to build it for.
//!
//! ## Project file format
//!
//! ```yaml
//! rootfs: ./rootfs.yaml
//! compress: true
//! targets:
//!   - name: qemu-x86_64
//!     architecture: x86_64
//!   - name: rpi
//!     arch: arm64
//! ```

use crate::error::{Error, Result};
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How log output and progress are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    /// Interactive, redrawing terminal output.
    Fancy,
    /// Plain line-oriented output.
    #[default]
    Basic,
    /// One JSON object per log record.
    Json,
}

impl LogType {
    /// Lenient parse: unknown values fall back to [`LogType::Basic`].
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl FromStr for LogType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fancy" => Ok(LogType::Fancy),
            "basic" | "plain" => Ok(LogType::Basic),
            "json" => Ok(LogType::Json),
            other => Err(Error::Configuration {
                message: format!("unknown log type '{}'", other),
                hint: Some("expected one of: fancy, basic, json".to_string()),
            }),
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogType::Fancy => "fancy",
            LogType::Basic => "basic",
            LogType::Json => "json",
        };
        write!(f, "{}", name)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: log::LevelFilter,
    pub log_type: LogType,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: log::LevelFilter::Info,
            log_type: LogType::default(),
        }
    }
}

/// Ambient runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub log: LogConfig,
}

impl Config {
    /// Build a configuration from the raw `--log-level` and `--log-type`
    /// values. An unknown level falls back to `info`.
    pub fn from_flags(log_level: &str, log_type: &str) -> Self {
        let level = log_level.parse().unwrap_or(log::LevelFilter::Info);
        Self {
            log: LogConfig {
                level,
                log_type: LogType::from_name(log_type),
            },
        }
    }
}

/// The `unirootfs.yaml` project file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Rootfs source: a directory, a rootfs manifest or a cpio archive.
    #[serde(default)]
    pub rootfs: Option<PathBuf>,

    /// Whether archives are gzip-compressed.
    #[serde(default = "default_compress")]
    pub compress: bool,

    #[serde(default)]
    pub targets: Vec<Target>,
}

fn default_compress() -> bool {
    true
}

/// Parses a YAML string into a `ProjectConfig`.
pub fn parse(yaml_content: &str) -> Result<ProjectConfig> {
    if yaml_content.trim().is_empty() {
        return Ok(ProjectConfig {
            compress: default_compress(),
            ..ProjectConfig::default()
        });
    }

    let project: ProjectConfig = serde_yaml::from_str(yaml_content)?;

    if let Some(target) = project
        .targets
        .iter()
        .find(|target| target.architecture.trim().is_empty())
    {
        return Err(Error::Configuration {
            message: format!("target '{}' has no architecture", target.name),
            hint: Some("add 'architecture:' to the target".to_string()),
        });
    }

    Ok(project)
}

/// Loads and parses a project file from disk.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ProjectConfig> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}
