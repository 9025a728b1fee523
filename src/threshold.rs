//! Turn usage numbers into verdicts
//!
//! Usage is checked along two dimensions, space and inodes, each with its own
//! warning and critical percentage. A mount is as bad as its worst dimension,
//! and the check is as bad as its worst mount.

use std::fmt;

use crate::config::ConfigError;
use crate::provider::Usage;

/// How bad a usage percentage is
///
/// Ordered by severity, so `max` picks the worse of two verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verdict {
    Ok,
    Warning,
    Critical,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Verdict::Ok => "OK",
            Verdict::Warning => "WARNING",
            Verdict::Critical => "CRITICAL",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Space,
    Inodes,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Dimension::Space => "disk",
            Dimension::Inodes => "inode",
        })
    }
}

/// A warning/critical pair, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Thresholds {
    pub fn new(warning: f64, critical: f64) -> Thresholds {
        Thresholds { warning, critical }
    }

    /// Both values must be percentages, and warning must come strictly
    /// before critical
    pub fn validate(&self, dimension: Dimension) -> Result<(), ConfigError> {
        for &value in &[self.warning, self.critical] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::OutOfRange { dimension, value });
            }
        }
        if self.warning >= self.critical {
            return Err(ConfigError::WarningNotBelowCritical {
                dimension,
                warning: self.warning,
                critical: self.critical,
            });
        }
        Ok(())
    }

    pub fn verdict(&self, percent: f64) -> Verdict {
        if percent >= self.critical {
            Verdict::Critical
        } else if percent >= self.warning {
            Verdict::Warning
        } else {
            Verdict::Ok
        }
    }

    /// The threshold that a verdict means was crossed
    pub fn limit(&self, verdict: Verdict) -> Option<f64> {
        match verdict {
            Verdict::Ok => None,
            Verdict::Warning => Some(self.warning),
            Verdict::Critical => Some(self.critical),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    pub space: Thresholds,
    pub inodes: Thresholds,
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.space.validate(Dimension::Space)?;
        self.inodes.validate(Dimension::Inodes)
    }

    fn for_dimension(&self, dimension: Dimension) -> &Thresholds {
        match dimension {
            Dimension::Space => &self.space,
            Dimension::Inodes => &self.inodes,
        }
    }
}

/// `used` as a percentage of `total`, or `None` if there is no total
pub fn percent(used: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(used as f64 / total as f64 * 100.0)
    }
}

/// The result of checking one dimension of one mount
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub dimension: Dimension,
    pub used: u64,
    pub total: u64,
    pub percent: f64,
    pub verdict: Verdict,
    /// The threshold that was crossed, if any
    pub limit: Option<f64>,
}

/// Verdicts for both dimensions of one mount
///
/// A dimension is `None` when the filesystem reports a total of zero, e.g.
/// filesystems without a fixed inode table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountVerdict {
    pub space: Option<Evaluation>,
    pub inodes: Option<Evaluation>,
}

impl MountVerdict {
    /// The worse of the two dimensions, space winning ties
    pub fn worst(&self) -> Option<&Evaluation> {
        let mut worst = Worst::new();
        for evaluation in self.space.iter().chain(self.inodes.iter()) {
            worst.offer(evaluation.verdict, evaluation);
        }
        worst.into_item()
    }

    pub fn verdict(&self) -> Verdict {
        self.worst().map_or(Verdict::Ok, |e| e.verdict)
    }

    /// The usage percentage for a dimension, 0 when it was not evaluated
    pub fn percent(&self, dimension: Dimension) -> f64 {
        let evaluation = match dimension {
            Dimension::Space => self.space,
            Dimension::Inodes => self.inodes,
        };
        evaluation.map_or(0.0, |e| e.percent)
    }
}

/// Track the first item with the highest verdict seen so far
///
/// Later items only replace the current one when they are strictly worse, so
/// ties go to whatever was offered first.
#[derive(Debug)]
pub struct Worst<T> {
    current: Option<(Verdict, T)>,
}

impl<T> Worst<T> {
    pub fn new() -> Worst<T> {
        Worst { current: None }
    }

    pub fn offer(&mut self, verdict: Verdict, item: T) {
        let replace = match self.current {
            Some((seen, _)) => verdict > seen,
            None => true,
        };
        if replace {
            self.current = Some((verdict, item));
        }
    }

    /// `Verdict::Ok` when nothing was offered
    pub fn verdict(&self) -> Verdict {
        self.current.as_ref().map_or(Verdict::Ok, |(v, _)| *v)
    }

    pub fn item(&self) -> Option<&T> {
        self.current.as_ref().map(|(_, item)| item)
    }

    pub fn into_item(self) -> Option<T> {
        self.current.map(|(_, item)| item)
    }
}

impl<T> Default for Worst<T> {
    fn default() -> Worst<T> {
        Worst::new()
    }
}

/// Applies a `ThresholdConfig` to mount usage
#[derive(Debug, Clone, Copy)]
pub struct ThresholdEvaluator {
    config: ThresholdConfig,
}

impl ThresholdEvaluator {
    pub fn new(config: ThresholdConfig) -> ThresholdEvaluator {
        ThresholdEvaluator { config }
    }

    fn evaluate_dimension(&self, dimension: Dimension, used: u64, total: u64) -> Option<Evaluation> {
        let percent = percent(used, total)?;
        let thresholds = self.config.for_dimension(dimension);
        let verdict = thresholds.verdict(percent);
        Some(Evaluation {
            dimension,
            used,
            total,
            percent,
            verdict,
            limit: thresholds.limit(verdict),
        })
    }

    pub fn evaluate(&self, usage: &Usage) -> MountVerdict {
        MountVerdict {
            space: self.evaluate_dimension(Dimension::Space, usage.bytes_used, usage.bytes_total),
            inodes: self.evaluate_dimension(
                Dimension::Inodes,
                usage.inodes_used,
                usage.inodes_total,
            ),
        }
    }
}
