//! Check mounted filesystems for disk and inode usage
//!
//! Everything in here exists to back the `check-disk-usage` binary, a
//! Sensu/Nagios style check that:
//!
//! * reads the mount table ([`provider`])
//! * decides which mounts are worth looking at ([`filter`])
//! * compares space and inode usage against thresholds ([`threshold`])
//! * and either prints a single status line or emits metrics ([`check`],
//!   [`metrics`])
//!
//! ```plain
//! $ check-disk-usage --help
//! check-disk-usage (part of tabin-plugins) 0.1.0
//! Check all mounted file systems for disk and inode usage.
//!
//! USAGE:
//!     check-disk-usage [FLAGS] [OPTIONS]
//!
//! FLAGS:
//!     -f, --fail-on-error        Go critical if the usage of any mount cannot be read
//!     -h, --help                 Prints help information
//!     -H, --human-readable       Print sizes with unit suffixes (K, M, G, ...)
//!     -p, --include-pseudo-fs    Check pseudo filesystems (tmpfs, proc, ...) as well
//!     -r, --include-read-only    Check read-only mounts as well
//!         --info                 Print information of all checked filesystems. Similar to df.
//!         --metrics              Emit metrics instead of a status line
//!         --metrics-status       In metrics mode, exit with the worst threshold status
//!     -V, --version              Prints version information
//!     -v, --verbose              Log filter decisions to stderr, twice for more
//!
//! OPTIONS:
//!         --config <config>                        JSON file with default settings
//!     -c, --critical <critical>                    Percent usage to go critical at [default: 95]
//!     -E, --exclude-fs-path <exclude-fs-path>...   Do not check mount points matching these paths or globs
//!     -e, --exclude-fs-type <exclude-fs-type>...   Do not check filesystems of these types
//!     -I, --include-fs-path <include-fs-path>...   Only check mount points matching these paths or globs
//!     -i, --include-fs-type <include-fs-type>...   Only check filesystems of these types, e.g. ext4 or xfs
//!     -K, --inodes-critical <inodes-critical>      Percent inode usage to go critical at [default: 95]
//!     -W, --inodes-warning <inodes-warning>        Percent inode usage to warn at [default: 85]
//!         --pseudo-fs-type <pseudo-fs-type>...     Filesystem types to treat as pseudo filesystems
//!         --tags <tags>...                         Extra key=value tags added to every metric
//!     -w, --warning <warning>                      Percent usage to warn at [default: 85]
//! ```

pub mod check;
pub mod config;
pub mod filter;
pub mod linux;
pub mod metrics;
pub mod procfs;
pub mod provider;
pub mod tags;
pub mod threshold;

use std::fmt;
use std::process;

use crate::threshold::Verdict;

/// All possible exit statuses for a check
///
/// The order is the order of severity, so `max` of two statuses is the one
/// that should win.
#[must_use]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Status {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Status {
    /// The process exit code Sensu and Nagios expect for this status
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Warning => 1,
            Status::Critical => 2,
            Status::Unknown => 3,
        }
    }

    #[cfg_attr(test, allow(dead_code))]
    pub fn exit(self) -> ! {
        process::exit(self.code())
    }
}

impl From<Verdict> for Status {
    fn from(verdict: Verdict) -> Status {
        match verdict {
            Verdict::Ok => Status::Ok,
            Verdict::Warning => Status::Warning,
            Verdict::Critical => Status::Critical,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}
