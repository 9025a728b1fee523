//! Run the whole check: read mounts, filter, evaluate, report

use std::fmt;
use std::io::{self, Write};

use chrono::Utc;
use derive_more::From;
use tracing::{debug, error, trace, warn};

use crate::config::{CheckConfig, Mode};
use crate::filter::Scope;
use crate::linux::{bytes_to_human_size, human_count, human_size};
use crate::metrics;
use crate::provider::{MountProvider, MountRecord, ProviderError};
use crate::threshold::{Dimension, Evaluation, MountVerdict, ThresholdEvaluator, Verdict, Worst};
use crate::Status;

#[derive(Debug, From)]
pub enum CheckError {
    Provider(ProviderError),
    /// stdout went away, or similar
    Emission(io::Error),
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CheckError::Provider(e) => write!(f, "{}", e),
            CheckError::Emission(e) => write!(f, "unable to write output: {}", e),
        }
    }
}

/// One mount that made it through the filter and was read successfully
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub record: MountRecord,
    pub verdict: MountVerdict,
}

/// Everything learned about the host in one run
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    /// In mount table order
    pub evaluated: Vec<Evaluated>,
    /// Mounts that were in scope but whose usage could not be read
    pub skipped: usize,
}

impl Outcome {
    /// The first of the worst mounts
    pub fn worst(&self) -> Worst<&Evaluated> {
        let mut worst = Worst::new();
        for evaluated in &self.evaluated {
            worst.offer(evaluated.verdict.verdict(), evaluated);
        }
        worst
    }

    pub fn verdict(&self) -> Verdict {
        self.worst().verdict()
    }
}

/// Read and evaluate every in-scope mount
///
/// Mounts whose usage cannot be read are skipped, unless `fail_on_error` is
/// set, in which case the first such mount ends the run.
pub fn evaluate<P: MountProvider + ?Sized>(
    provider: &P,
    config: &CheckConfig,
) -> Result<Outcome, CheckError> {
    let evaluator = ThresholdEvaluator::new(config.thresholds);
    let mut outcome = Outcome::default();

    for mount in provider.mounts()? {
        let scope = config.filter.scope(&mount);
        if scope != Scope::Active {
            debug!(mountpoint = %mount.path, fstype = %mount.fs_type, "skipping: {}", scope);
            continue;
        }

        let usage = match provider.usage(&mount) {
            Ok(usage) => usage,
            Err(e) if !config.fail_on_error => {
                warn!("skipping {}: {}", mount.path, e);
                outcome.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let verdict = evaluator.evaluate(&usage);
        debug!(
            mountpoint = %mount.path,
            disk = verdict.percent(Dimension::Space),
            inodes = verdict.percent(Dimension::Inodes),
            "{}",
            verdict.verdict()
        );
        outcome.evaluated.push(Evaluated {
            record: MountRecord { mount, usage },
            verdict,
        });
    }
    Ok(outcome)
}

/// The overall verdict and the line that explains it
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub verdict: Verdict,
    pub summary: String,
}

fn describe(path: &str, evaluation: &Evaluation, human_readable: bool) -> String {
    let total = match (evaluation.dimension, human_readable) {
        (Dimension::Space, false) => format!("{} bytes", evaluation.total),
        (Dimension::Space, true) => human_size(evaluation.total),
        (Dimension::Inodes, false) => format!("{} inodes", evaluation.total),
        (Dimension::Inodes, true) => format!("{} inodes", human_count(evaluation.total)),
    };
    let mut line = format!(
        "{}: {} has {:.1}% of its {} used",
        evaluation.verdict, path, evaluation.percent, total
    );
    if let Some(limit) = evaluation.limit {
        line.push_str(&format!(" (>= {}%)", limit));
    }
    line
}

/// Reduce an outcome to one verdict and one summary line
pub fn report(outcome: &Outcome, config: &CheckConfig) -> Report {
    let worst = outcome.worst();
    let verdict = worst.verdict();
    let cited = worst
        .item()
        .and_then(|e| e.verdict.worst().map(|eval| (e.record.mount.path.as_str(), eval)));

    let summary = match cited {
        Some((path, evaluation)) if verdict != Verdict::Ok => {
            let mut line = describe(path, evaluation, config.human_readable);
            let breaching = outcome
                .evaluated
                .iter()
                .filter(|e| e.verdict.verdict() != Verdict::Ok)
                .count();
            if breaching > 1 {
                line.push_str(&format!(
                    ", {} of {} filesystems over threshold",
                    breaching,
                    outcome.evaluated.len()
                ));
            }
            line
        }
        _ => {
            let mut line = format!(
                "OK: {} filesystems checked, none at or above {}% disk or {}% inode usage",
                outcome.evaluated.len(),
                config.thresholds.space.warning,
                config.thresholds.inodes.warning
            );
            if outcome.skipped > 0 {
                line.push_str(&format!(", {} skipped", outcome.skipped));
            }
            line
        }
    };
    Report { verdict, summary }
}

/// A `df`-like table of every evaluated mount
pub fn info_table(outcome: &Outcome) -> String {
    let mut table = format!(
        "{:<15} {:>7} {:>5}% {:>7} {:>5}% {:<20}\n",
        "Filesystem", "Size", "Use", "INodes", "IUse", "Mounted on"
    );
    for evaluated in &outcome.evaluated {
        let MountRecord { mount, usage } = &evaluated.record;
        table.push_str(&format!(
            "{:<15} {:>7} {:>5.1}% {:>7} {:>5.1}% {:<20}\n",
            mount.device,
            bytes_to_human_size(usage.bytes_total),
            evaluated.verdict.percent(Dimension::Space),
            human_count(usage.inodes_total),
            evaluated.verdict.percent(Dimension::Inodes),
            mount.path
        ));
    }
    table
}

/// Run the check against `provider`, writing everything to `out`
pub fn execute<P, W>(provider: &P, config: &CheckConfig, out: &mut W) -> Result<Status, CheckError>
where
    P: MountProvider + ?Sized,
    W: Write,
{
    run(provider, config, Utc::now().timestamp_millis(), out)
}

/// `execute`, with any failure turned into CRITICAL and one line on `out`
///
/// That line is best effort: when `out` is what failed, it is only logged.
pub fn check_status<P, W>(provider: &P, config: &CheckConfig, out: &mut W) -> Status
where
    P: MountProvider + ?Sized,
    W: Write,
{
    match execute(provider, config, out) {
        Ok(status) => status,
        Err(e) => {
            error!("{}", e);
            let _ = writeln!(out, "{}: {}", Status::Critical, e).and_then(|_| out.flush());
            Status::Critical
        }
    }
}

/// `execute` with a fixed metric timestamp, in milliseconds
pub fn run<P, W>(
    provider: &P,
    config: &CheckConfig,
    timestamp: i64,
    out: &mut W,
) -> Result<Status, CheckError>
where
    P: MountProvider + ?Sized,
    W: Write,
{
    let outcome = evaluate(provider, config)?;
    let report = report(&outcome, config);
    trace!(?outcome, "evaluation finished");

    match config.mode {
        Mode::Status => {
            let mut text = format!("{}\n", report.summary);
            if config.info {
                text.push_str(&info_table(&outcome));
            }
            out.write_all(text.as_bytes())?;
            out.flush()?;
            Ok(report.verdict.into())
        }
        Mode::Metrics { report_status } => {
            let groups = metrics::collect(
                outcome.evaluated.iter().map(|e| (&e.record, &e.verdict)),
                &config.extra_tags,
                timestamp,
            );
            metrics::emit(&groups, out)?;
            if report_status {
                debug!("{}", report.summary);
                Ok(report.verdict.into())
            } else {
                Ok(Status::Ok)
            }
        }
    }
}
