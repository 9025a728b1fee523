use std::io::{self, Write};
use std::path::PathBuf;

use structopt::clap::{AppSettings, ErrorKind};
use structopt::StructOpt;

use tabin_disk_usage::config::Settings;
use tabin_disk_usage::Status;

/// Check all mounted file systems for disk and inode usage.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "check-disk-usage (part of tabin-plugins)",
    setting = AppSettings::ColoredHelp
)]
pub(crate) struct Args {
    #[structopt(
        short = "i",
        long = "include-fs-type",
        use_delimiter = true,
        help = "Only check filesystems of these types, e.g. ext4 or xfs"
    )]
    pub include_fs_type: Vec<String>,
    #[structopt(
        short = "e",
        long = "exclude-fs-type",
        use_delimiter = true,
        help = "Do not check filesystems of these types"
    )]
    pub exclude_fs_type: Vec<String>,
    #[structopt(
        short = "I",
        long = "include-fs-path",
        use_delimiter = true,
        help = "Only check mount points matching these paths or globs"
    )]
    pub include_fs_path: Vec<String>,
    #[structopt(
        short = "E",
        long = "exclude-fs-path",
        use_delimiter = true,
        help = "Do not check mount points matching these paths or globs"
    )]
    pub exclude_fs_path: Vec<String>,
    #[structopt(
        long = "pseudo-fs-type",
        use_delimiter = true,
        help = "Filesystem types to treat as pseudo filesystems"
    )]
    pub pseudo_fs_type: Vec<String>,
    #[structopt(
        short = "p",
        long = "include-pseudo-fs",
        help = "Check pseudo filesystems (tmpfs, proc, ...) as well"
    )]
    pub include_pseudo_fs: bool,
    #[structopt(
        short = "r",
        long = "include-read-only",
        help = "Check read-only mounts as well"
    )]
    pub include_read_only: bool,
    #[structopt(
        short = "f",
        long = "fail-on-error",
        help = "Go critical if the usage of any mount cannot be read"
    )]
    pub fail_on_error: bool,
    #[structopt(
        short = "w",
        long = "warning",
        help = "Percent usage to warn at [default: 85]"
    )]
    pub warning: Option<f64>,
    #[structopt(
        short = "c",
        long = "critical",
        help = "Percent usage to go critical at [default: 95]"
    )]
    pub critical: Option<f64>,
    #[structopt(
        short = "W",
        long = "inodes-warning",
        help = "Percent inode usage to warn at [default: 85]"
    )]
    pub inodes_warning: Option<f64>,
    #[structopt(
        short = "K",
        long = "inodes-critical",
        help = "Percent inode usage to go critical at [default: 95]"
    )]
    pub inodes_critical: Option<f64>,
    #[structopt(
        long = "metrics",
        help = "Emit metrics instead of a status line"
    )]
    pub metrics: bool,
    #[structopt(
        long = "metrics-status",
        help = "In metrics mode, exit with the worst threshold status"
    )]
    pub metrics_status: bool,
    #[structopt(
        long = "tags",
        use_delimiter = true,
        help = "Extra key=value tags added to every metric"
    )]
    pub tags: Vec<String>,
    #[structopt(
        short = "H",
        long = "human-readable",
        help = "Print sizes with unit suffixes (K, M, G, ...)"
    )]
    pub human_readable: bool,
    #[structopt(
        long = "info",
        help = "Print information of all checked filesystems. Similar to df."
    )]
    pub info: bool,
    #[structopt(long = "config", parse(from_os_str), help = "JSON file with default settings")]
    pub config: Option<PathBuf>,
    #[structopt(
        short = "v",
        long = "verbose",
        parse(from_occurrences),
        help = "Log filter decisions to stderr, twice for more"
    )]
    pub verbose: u8,
}

impl Args {
    /// Parse the process arguments, exiting UNKNOWN on usage errors
    ///
    /// Never panics, even when stdout is closed or full.
    pub fn parse() -> Args {
        match Args::from_iter_safe(std::env::args_os()) {
            Ok(args) => args,
            Err(e) => match e.kind {
                ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed => {
                    let _ = writeln!(io::stdout(), "{}", e.message);
                    Status::Ok.exit();
                }
                _ => {
                    let _ = writeln!(io::stdout(), "{}: {}", Status::Unknown, e.message);
                    Status::Unknown.exit();
                }
            },
        }
    }

    /// The settings given on the command line, to layer over any config file
    pub fn settings(&self) -> Settings {
        Settings {
            include_fs_type: self.include_fs_type.clone(),
            exclude_fs_type: self.exclude_fs_type.clone(),
            include_fs_path: self.include_fs_path.clone(),
            exclude_fs_path: self.exclude_fs_path.clone(),
            pseudo_fs_type: self.pseudo_fs_type.clone(),
            include_pseudo_fs: self.include_pseudo_fs,
            include_read_only: self.include_read_only,
            fail_on_error: self.fail_on_error,
            metrics: self.metrics,
            metrics_status: self.metrics_status,
            human_readable: self.human_readable,
            info: self.info,
            warning: self.warning,
            critical: self.critical,
            inodes_warning: self.inodes_warning,
            inodes_critical: self.inodes_critical,
            tags: self.tags.clone(),
        }
    }
}

#[cfg(test)]
mod unit {
    use structopt::StructOpt;

    use super::Args;

    fn build_args(argv: &[&str]) -> Args {
        Args::from_iter_safe(argv).unwrap()
    }

    #[test]
    fn no_flags_means_defaults() {
        let args = build_args(&["check-disk-usage"]);
        assert_eq!(args.warning, None);
        assert!(args.include_fs_type.is_empty());
        assert!(!args.metrics);
        assert_eq!(args.verbose, 0);
        assert!(args.settings().validate().is_ok());
    }

    #[test]
    fn lists_split_on_commas_and_repeat() {
        let args = build_args(&[
            "check-disk-usage",
            "-e",
            "tmpfs,devtmpfs",
            "--exclude-fs-type",
            "squashfs",
            "--tags",
            "env=prod,region=us-west",
        ]);
        assert_eq!(args.exclude_fs_type, vec!["tmpfs", "devtmpfs", "squashfs"]);
        assert_eq!(args.tags, vec!["env=prod", "region=us-west"]);
    }

    #[test]
    fn thresholds_flow_into_settings() {
        let args = build_args(&["check-disk-usage", "-w", "80", "-c", "90", "-K", "99"]);
        let settings = args.settings();
        assert_eq!(settings.warning, Some(80.0));
        assert_eq!(settings.critical, Some(90.0));
        assert_eq!(settings.inodes_critical, Some(99.0));
        assert_eq!(settings.inodes_warning, None);
    }

    #[test]
    fn inverted_thresholds_parse_but_do_not_validate() {
        let args = build_args(&["check-disk-usage", "-w", "80", "-c", "70"]);
        assert!(args.settings().validate().is_err());
    }

    #[test]
    fn bad_numbers_are_usage_errors() {
        assert!(Args::from_iter_safe(&["check-disk-usage", "-w", "lots"]).is_err());
        assert!(Args::from_iter_safe(&["check-disk-usage", "--no-such-flag"]).is_err());
    }

    #[test]
    fn verbosity_counts() {
        let args = build_args(&["check-disk-usage", "-vv", "--metrics", "--metrics-status"]);
        assert_eq!(args.verbose, 2);
        assert!(args.metrics);
        assert!(args.metrics_status);
    }
}
