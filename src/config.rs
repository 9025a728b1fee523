//! Settings from the command line and config files, and their validation
//!
//! Settings are layered: built-in defaults, then an optional JSON file, then
//! command line flags. Nothing is checked until the layers are merged and
//! `Settings::validate` turns them into a `CheckConfig`, which is the only
//! configuration the rest of the crate ever sees.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::filter::{FilterConfig, ScopeFilter};
use crate::tags::{parse_extra_tags, ExtraTags, TagError};
use crate::threshold::{Dimension, ThresholdConfig, Thresholds};

pub const DEFAULT_WARNING: f64 = 85.0;
pub const DEFAULT_CRITICAL: f64 = 95.0;
pub const DEFAULT_INODES_WARNING: f64 = 85.0;
pub const DEFAULT_INODES_CRITICAL: f64 = 95.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Both an include and an exclude list were given for the named dimension
    MutuallyExclusive(&'static str),
    InvalidGlob {
        pattern: String,
        reason: String,
    },
    OutOfRange {
        dimension: Dimension,
        value: f64,
    },
    WarningNotBelowCritical {
        dimension: Dimension,
        warning: f64,
        critical: f64,
    },
    Tags(TagError),
    File {
        path: String,
        reason: String,
    },
}

impl From<TagError> for ConfigError {
    fn from(e: TagError) -> ConfigError {
        ConfigError::Tags(e)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::MutuallyExclusive(dimension) => write!(
                f,
                "include and exclude {} lists are mutually exclusive",
                dimension
            ),
            ConfigError::InvalidGlob { pattern, reason } => {
                write!(f, "invalid path pattern '{}': {}", pattern, reason)
            }
            ConfigError::OutOfRange { dimension, value } => write!(
                f,
                "{} threshold {} is not a percentage between 0 and 100",
                dimension, value
            ),
            ConfigError::WarningNotBelowCritical {
                dimension,
                warning,
                critical,
            } => write!(
                f,
                "{} warning threshold ({}) must be lower than critical threshold ({})",
                dimension, warning, critical
            ),
            ConfigError::Tags(e) => write!(f, "{}", e),
            ConfigError::File { path, reason } => {
                write!(f, "unable to load config file {}: {}", path, reason)
            }
        }
    }
}

/// Every setting, as given by one layer
///
/// Unset thresholds are `None` so that a later layer can tell "not given"
/// apart from "given the default".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    pub include_fs_type: Vec<String>,
    pub exclude_fs_type: Vec<String>,
    pub include_fs_path: Vec<String>,
    pub exclude_fs_path: Vec<String>,
    pub pseudo_fs_type: Vec<String>,
    pub include_pseudo_fs: bool,
    pub include_read_only: bool,
    pub fail_on_error: bool,
    pub metrics: bool,
    pub metrics_status: bool,
    pub human_readable: bool,
    pub info: bool,
    pub warning: Option<f64>,
    pub critical: Option<f64>,
    pub inodes_warning: Option<f64>,
    pub inodes_critical: Option<f64>,
    pub tags: Vec<String>,
}

fn replace_unless_empty(base: Vec<String>, over: Vec<String>) -> Vec<String> {
    if over.is_empty() {
        base
    } else {
        over
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let file_error = |reason: String| ConfigError::File {
            path: path.display().to_string(),
            reason,
        };
        let contents = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        let settings = serde_json::from_str(&contents).map_err(|e| file_error(e.to_string()))?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Layer `over` on top of `self`
    pub fn merge(self, over: Settings) -> Settings {
        Settings {
            include_fs_type: replace_unless_empty(self.include_fs_type, over.include_fs_type),
            exclude_fs_type: replace_unless_empty(self.exclude_fs_type, over.exclude_fs_type),
            include_fs_path: replace_unless_empty(self.include_fs_path, over.include_fs_path),
            exclude_fs_path: replace_unless_empty(self.exclude_fs_path, over.exclude_fs_path),
            pseudo_fs_type: replace_unless_empty(self.pseudo_fs_type, over.pseudo_fs_type),
            include_pseudo_fs: self.include_pseudo_fs || over.include_pseudo_fs,
            include_read_only: self.include_read_only || over.include_read_only,
            fail_on_error: self.fail_on_error || over.fail_on_error,
            metrics: self.metrics || over.metrics,
            metrics_status: self.metrics_status || over.metrics_status,
            human_readable: self.human_readable || over.human_readable,
            info: self.info || over.info,
            warning: over.warning.or(self.warning),
            critical: over.critical.or(self.critical),
            inodes_warning: over.inodes_warning.or(self.inodes_warning),
            inodes_critical: over.inodes_critical.or(self.inodes_critical),
            tags: replace_unless_empty(self.tags, over.tags),
        }
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        ThresholdConfig {
            space: Thresholds::new(
                self.warning.unwrap_or(DEFAULT_WARNING),
                self.critical.unwrap_or(DEFAULT_CRITICAL),
            ),
            inodes: Thresholds::new(
                self.inodes_warning.unwrap_or(DEFAULT_INODES_WARNING),
                self.inodes_critical.unwrap_or(DEFAULT_INODES_CRITICAL),
            ),
        }
    }

    fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            include_type: self.include_fs_type.clone(),
            exclude_type: self.exclude_fs_type.clone(),
            include_path: self.include_fs_path.clone(),
            exclude_path: self.exclude_fs_path.clone(),
            include_pseudo: self.include_pseudo_fs,
            include_read_only: self.include_read_only,
        }
    }

    /// Check everything, returning the first problem found
    pub fn validate(&self) -> Result<CheckConfig, ConfigError> {
        let thresholds = self.thresholds();
        thresholds.validate()?;
        let filter = ScopeFilter::new(&self.filter_config())?;
        let extra_tags = parse_extra_tags(&self.tags)?;
        let mode = if self.metrics {
            Mode::Metrics {
                report_status: self.metrics_status,
            }
        } else {
            Mode::Status
        };
        Ok(CheckConfig {
            filter,
            pseudo_fs_types: self.pseudo_fs_type.clone(),
            thresholds,
            extra_tags,
            fail_on_error: self.fail_on_error,
            mode,
            human_readable: self.human_readable,
            info: self.info,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One status line, exit code from the worst verdict
    Status,
    /// Metrics on stdout, exit code from the worst verdict only if
    /// `report_status`
    Metrics { report_status: bool },
}

/// Validated configuration for a single run
#[derive(Debug)]
pub struct CheckConfig {
    pub filter: ScopeFilter,
    pub pseudo_fs_types: Vec<String>,
    pub thresholds: ThresholdConfig,
    pub extra_tags: ExtraTags,
    pub fail_on_error: bool,
    pub mode: Mode,
    pub human_readable: bool,
    pub info: bool,
}
