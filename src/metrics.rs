//! Metrics mode: one gauge per measurement, one sample per mount
//!
//! Output is the Prometheus text exposition format, which Sensu's metric
//! extraction understands:
//!
//! ```plain
//! # HELP disk_percent_used Percentage of mounted partition used
//! # TYPE disk_percent_used gauge
//! disk_percent_used{mountpoint="/",fstype="ext4",env="prod"} 45.6 1546300800000
//! ```

use std::fmt::{self, Write as FmtWrite};
use std::io::{self, Write};

use itertools::Itertools;

use crate::provider::MountRecord;
use crate::tags::{sanitize_name, ExtraTags, Tags};
use crate::threshold::{Dimension, MountVerdict, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Gauge,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetricType::Gauge => f.write_str("gauge"),
        }
    }
}

/// One sample
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub tags: Tags,
    pub value: f64,
    /// Milliseconds since the epoch
    pub timestamp: i64,
}

/// A named series of samples
#[derive(Debug, Clone, PartialEq)]
pub struct MetricGroup {
    pub name: String,
    pub kind: MetricType,
    pub comment: String,
    pub metrics: Vec<Metric>,
}

impl MetricGroup {
    pub fn new(name: &str, kind: MetricType, comment: &str) -> MetricGroup {
        MetricGroup {
            name: name.to_owned(),
            kind,
            comment: comment.to_owned(),
            metrics: Vec::new(),
        }
    }

    pub fn add_metric(&mut self, tags: Tags, value: f64, timestamp: i64) {
        self.metrics.push(Metric {
            tags,
            value,
            timestamp,
        });
    }

    /// The name as it is written out, `disk.free.inodes` becomes
    /// `disk_free_inodes`
    pub fn exposition_name(&self) -> String {
        sanitize_name(&self.name)
    }

    /// Append this group, headers first, to `out`
    pub fn render(&self, out: &mut String) -> fmt::Result {
        let name = self.exposition_name();
        writeln!(out, "# HELP {} {}", name, self.comment)?;
        writeln!(out, "# TYPE {} {}", name, self.kind)?;
        for metric in &self.metrics {
            out.push_str(&name);
            if !metric.tags.is_empty() {
                let labels = metric
                    .tags
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
                    .join(",");
                write!(out, "{{{}}}", labels)?;
            }
            writeln!(out, " {} {}", metric.value, metric.timestamp)?;
        }
        Ok(())
    }
}

fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// The measurements emitted for every mount, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Critical,
    Warning,
    PercentUsed,
    TotalBytes,
    UsedBytes,
    FreeBytes,
    InodesPercentUsed,
    InodesTotal,
    InodesUsed,
    InodesFree,
}

pub const MEASURES: [Measure; 10] = [
    Measure::Critical,
    Measure::Warning,
    Measure::PercentUsed,
    Measure::TotalBytes,
    Measure::UsedBytes,
    Measure::FreeBytes,
    Measure::InodesPercentUsed,
    Measure::InodesTotal,
    Measure::InodesUsed,
    Measure::InodesFree,
];

impl Measure {
    pub fn name(self) -> &'static str {
        match self {
            Measure::Critical => "disk.critical",
            Measure::Warning => "disk.warning",
            Measure::PercentUsed => "disk.percent_used",
            Measure::TotalBytes => "disk.total_bytes",
            Measure::UsedBytes => "disk.used_bytes",
            Measure::FreeBytes => "disk.free_bytes",
            Measure::InodesPercentUsed => "disk.inodes.percent_used",
            Measure::InodesTotal => "disk.inodes.total",
            Measure::InodesUsed => "disk.inodes.used",
            Measure::InodesFree => "disk.inodes.free",
        }
    }

    pub fn comment(self) -> &'static str {
        match self {
            Measure::Critical => "Whether the mount is at or above a critical threshold (0 or 1)",
            Measure::Warning => "Whether the mount is at or above a warning threshold (0 or 1)",
            Measure::PercentUsed => "Percentage of mounted partition used",
            Measure::TotalBytes => "Total size of mounted partition in bytes",
            Measure::UsedBytes => "Used space on mounted partition in bytes",
            Measure::FreeBytes => "Space available to unprivileged users in bytes",
            Measure::InodesPercentUsed => "Percentage of inodes used",
            Measure::InodesTotal => "Total number of inodes",
            Measure::InodesUsed => "Number of inodes used",
            Measure::InodesFree => "Number of free inodes",
        }
    }

    pub fn value(self, record: &MountRecord, verdict: &MountVerdict) -> f64 {
        let usage = &record.usage;
        let flag = |at: Verdict| if verdict.verdict() == at { 1.0 } else { 0.0 };
        match self {
            Measure::Critical => flag(Verdict::Critical),
            Measure::Warning => flag(Verdict::Warning),
            Measure::PercentUsed => round2(verdict.percent(Dimension::Space)),
            Measure::TotalBytes => usage.bytes_total as f64,
            Measure::UsedBytes => usage.bytes_used as f64,
            Measure::FreeBytes => usage.bytes_free as f64,
            Measure::InodesPercentUsed => round2(verdict.percent(Dimension::Inodes)),
            Measure::InodesTotal => usage.inodes_total as f64,
            Measure::InodesUsed => usage.inodes_used as f64,
            Measure::InodesFree => usage.inodes_free as f64,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Build every group from the evaluated mounts
///
/// Groups come out in `MEASURES` order and samples in the order of
/// `evaluated`.
pub fn collect<'a, I>(evaluated: I, extra: &ExtraTags, timestamp: i64) -> Vec<MetricGroup>
where
    I: IntoIterator<Item = (&'a MountRecord, &'a MountVerdict)> + Clone,
{
    MEASURES
        .iter()
        .map(|&measure| {
            let mut group = MetricGroup::new(measure.name(), MetricType::Gauge, measure.comment());
            for (record, verdict) in evaluated.clone() {
                let tags = Tags::for_mount(&record.mount.path, &record.mount.fs_type, extra);
                group.add_metric(tags, measure.value(record, verdict), timestamp);
            }
            group
        })
        .collect()
}

/// Write every group in one go
///
/// Everything is rendered before anything is written, a failed write never
/// leaves a truncated group behind.
pub fn emit<W: Write>(groups: &[MetricGroup], out: &mut W) -> io::Result<()> {
    let mut buffer = String::new();
    for group in groups {
        group
            .render(&mut buffer)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    }
    out.write_all(buffer.as_bytes())?;
    out.flush()
}

#[cfg(test)]
mod unit {
    use super::*;
    use crate::provider::{mount_point, usage};
    use crate::tags::parse_extra_tags;
    use crate::threshold::{ThresholdConfig, ThresholdEvaluator, Thresholds};

    fn render(group: &MetricGroup) -> String {
        let mut out = String::new();
        group.render(&mut out).unwrap();
        out
    }

    #[test]
    fn add_metric_appends() {
        let mut mg = MetricGroup::new("test.metric", MetricType::Gauge, "Test metric");
        let tags = Tags::from(&[("env", "test"), ("region", "us")][..]);
        mg.add_metric(tags.clone(), 42.5, 1234567890);

        assert_eq!(mg.metrics.len(), 1);
        assert_eq!(mg.metrics[0].tags, tags);
        assert_eq!(mg.metrics[0].value, 42.5);
        assert_eq!(mg.metrics[0].timestamp, 1234567890);

        mg.add_metric(Tags::from(&[("env", "prod")][..]), 100.0, 9876543210);
        assert_eq!(mg.metrics.len(), 2);
    }

    #[test]
    fn render_without_tags() {
        let mut mg = MetricGroup::new("disk.usage", MetricType::Gauge, "Disk usage metric");
        mg.add_metric(Tags::new(), 50.5, 1234567890);
        assert_eq!(
            render(&mg),
            "# HELP disk_usage Disk usage metric\n\
             # TYPE disk_usage gauge\n\
             disk_usage 50.5 1234567890\n"
        );
    }

    #[test]
    fn render_with_tags() {
        let mut mg = MetricGroup::new("disk.percent_used", MetricType::Gauge, "Percent used");
        let tags = Tags::from(&[("mountpoint", "/home"), ("env", "test"), ("region", "us-west")][..]);
        mg.add_metric(tags, 75.5, 1234567890);
        mg.add_metric(Tags::from(&[("mountpoint", "/")][..]), 1.0, 1234567890);
        assert_eq!(
            render(&mg),
            "# HELP disk_percent_used Percent used\n\
             # TYPE disk_percent_used gauge\n\
             disk_percent_used{mountpoint=\"/home\",env=\"test\",region=\"us-west\"} 75.5 1234567890\n\
             disk_percent_used{mountpoint=\"/\"} 1 1234567890\n"
        );
    }

    #[test]
    fn dots_become_underscores() {
        let mg = MetricGroup::new("disk.free.inodes", MetricType::Gauge, "Free inodes");
        assert_eq!(mg.exposition_name(), "disk_free_inodes");
        assert_eq!(sanitize_name("9lives-and.more"), "_lives_and_more");
    }

    #[test]
    fn extra_tags_never_duplicate_labels() {
        let extra = parse_extra_tags(&["a.b=1", "a-b=2"]).unwrap();
        let mut mg = MetricGroup::new("m", MetricType::Gauge, "c");
        mg.add_metric(Tags::for_mount("/", "ext4", &extra), 0.0, 1);
        assert!(render(&mg).ends_with("m{mountpoint=\"/\",fstype=\"ext4\",a_b=\"2\"} 0 1\n"));
    }

    #[test]
    fn label_values_are_escaped() {
        let mut mg = MetricGroup::new("m", MetricType::Gauge, "c");
        mg.add_metric(Tags::from(&[("mountpoint", "/mnt/\"odd\"\\dir")][..]), 0.0, 1);
        assert!(render(&mg).contains("m{mountpoint=\"/mnt/\\\"odd\\\"\\\\dir\"} 0 1\n"));
    }

    #[test]
    fn collect_follows_measure_and_mount_order() {
        let evaluator = ThresholdEvaluator::new(ThresholdConfig {
            space: Thresholds::new(80.0, 95.0),
            inodes: Thresholds::new(80.0, 95.0),
        });
        let records = vec![
            MountRecord {
                mount: mount_point("/", "ext4", "rw"),
                usage: usage(96, 100, 10, 100),
            },
            MountRecord {
                mount: mount_point("/home", "xfs", "rw"),
                usage: usage(50, 200, 0, 0),
            },
        ];
        let verdicts: Vec<MountVerdict> = records.iter().map(|r| evaluator.evaluate(&r.usage)).collect();
        let extra = parse_extra_tags(&["env=prod"]).unwrap();

        let groups = collect(records.iter().zip(verdicts.iter()), &extra, 1000);

        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        let expected: Vec<&str> = MEASURES.iter().map(|m| m.name()).collect();
        assert_eq!(names, expected);

        let critical = &groups[0];
        assert_eq!(critical.metrics.len(), 2);
        assert_eq!(critical.metrics[0].value, 1.0);
        assert_eq!(critical.metrics[1].value, 0.0);
        assert_eq!(critical.metrics[0].tags.get("mountpoint"), Some("/"));
        assert_eq!(critical.metrics[1].tags.get("fstype"), Some("xfs"));
        assert_eq!(critical.metrics[1].tags.get("env"), Some("prod"));

        let percent = &groups[2];
        assert_eq!(percent.metrics[0].value, 96.0);
        assert_eq!(percent.metrics[1].value, 25.0);

        let inode_percent = &groups[6];
        assert_eq!(inode_percent.metrics[1].value, 0.0);
        assert!(groups.iter().all(|g| g.metrics.iter().all(|m| m.timestamp == 1000)));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn emit_writes_everything_or_fails() {
        let mut mg = MetricGroup::new("a.b", MetricType::Gauge, "c");
        mg.add_metric(Tags::new(), 1.0, 2);
        let groups = vec![mg.clone(), mg];

        let mut out = Vec::new();
        emit(&groups, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("# TYPE a_b gauge").count(), 2);

        assert_eq!(
            emit(&groups, &mut BrokenPipe).unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }
}
