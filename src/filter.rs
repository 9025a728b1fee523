//! Functions related to determining if a mount should be checked at all
//!
//! A mount is in scope when:
//!
//! * its filesystem type passes the include/exclude type lists
//! * its mount point passes the include/exclude path lists
//! * it is not a pseudo filesystem, unless those are included
//! * it is not mounted read-only, unless those are included
//!
//! Types are compared exactly. Paths may also be shell-style globs, where `*`
//! does not match `/`: `/tmp/*` matches `/tmp/foo` but not `/tmp`.

use std::fmt;

use globset::GlobBuilder;

use crate::config::ConfigError;
use crate::provider::MountPoint;

/// Something a candidate string can be tested against
pub trait Matcher: fmt::Debug {
    fn matches(&self, candidate: &str) -> bool;
}

/// Matches only the exact string it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactMatcher(String);

impl ExactMatcher {
    pub fn new(pattern: &str) -> ExactMatcher {
        ExactMatcher(pattern.to_owned())
    }
}

impl Matcher for ExactMatcher {
    fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

/// Matches a shell-style glob, or the pattern taken literally
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    pattern: String,
    glob: globset::GlobMatcher,
}

impl GlobMatcher {
    pub fn new(pattern: &str) -> Result<GlobMatcher, globset::Error> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()?
            .compile_matcher();
        Ok(GlobMatcher {
            pattern: pattern.to_owned(),
            glob,
        })
    }
}

impl Matcher for GlobMatcher {
    fn matches(&self, candidate: &str) -> bool {
        self.pattern == candidate || self.glob.is_match(candidate)
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(|c| matches!(c, '*' | '?' | '[' | '{'))
}

/// Build the right matcher for a path pattern
pub fn path_matcher(pattern: &str) -> Result<Box<dyn Matcher>, ConfigError> {
    if is_glob(pattern) {
        let matcher = GlobMatcher::new(pattern).map_err(|e| ConfigError::InvalidGlob {
            pattern: pattern.to_owned(),
            reason: e.kind().to_string(),
        })?;
        Ok(Box::new(matcher))
    } else {
        Ok(Box::new(ExactMatcher::new(pattern)))
    }
}

/// An include or exclude list for one dimension (type or path)
#[derive(Debug)]
pub enum Rule {
    /// Neither list was given: everything passes
    Unrestricted,
    /// Only candidates matching one of these pass
    Include(Vec<Box<dyn Matcher>>),
    /// Candidates matching any of these are dropped
    Exclude(Vec<Box<dyn Matcher>>),
}

impl Rule {
    /// Combine an include and an exclude list
    ///
    /// Giving both for the same dimension is a configuration error, there is
    /// no sensible precedence between them.
    pub fn new(
        dimension: &'static str,
        include: Vec<Box<dyn Matcher>>,
        exclude: Vec<Box<dyn Matcher>>,
    ) -> Result<Rule, ConfigError> {
        match (include.is_empty(), exclude.is_empty()) {
            (true, true) => Ok(Rule::Unrestricted),
            (false, true) => Ok(Rule::Include(include)),
            (true, false) => Ok(Rule::Exclude(exclude)),
            (false, false) => Err(ConfigError::MutuallyExclusive(dimension)),
        }
    }

    pub fn allows(&self, candidate: &str) -> bool {
        match self {
            Rule::Unrestricted => true,
            Rule::Include(matchers) => matchers.iter().any(|m| m.matches(candidate)),
            Rule::Exclude(matchers) => !matchers.iter().any(|m| m.matches(candidate)),
        }
    }
}

/// Raw filter settings, as given on the command line or in a config file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterConfig {
    pub include_type: Vec<String>,
    pub exclude_type: Vec<String>,
    pub include_path: Vec<String>,
    pub exclude_path: Vec<String>,
    pub include_pseudo: bool,
    pub include_read_only: bool,
}

/// Why a mount was or was not selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Active,
    WrongType,
    WrongPath,
    Pseudo,
    ReadOnly,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = match self {
            Scope::Active => "in scope",
            Scope::WrongType => "filesystem type filtered",
            Scope::WrongPath => "mount point filtered",
            Scope::Pseudo => "pseudo filesystem",
            Scope::ReadOnly => "mounted read-only",
        };
        f.write_str(reason)
    }
}

/// Validated, compiled form of a `FilterConfig`
#[derive(Debug)]
pub struct ScopeFilter {
    types: Rule,
    paths: Rule,
    include_pseudo: bool,
    include_read_only: bool,
}

impl ScopeFilter {
    pub fn new(config: &FilterConfig) -> Result<ScopeFilter, ConfigError> {
        let exact = |patterns: &[String]| -> Vec<Box<dyn Matcher>> {
            patterns
                .iter()
                .map(|p| Box::new(ExactMatcher::new(p)) as Box<dyn Matcher>)
                .collect()
        };
        let globs = |patterns: &[String]| -> Result<Vec<Box<dyn Matcher>>, ConfigError> {
            patterns.iter().map(|p| path_matcher(p)).collect()
        };

        Ok(ScopeFilter {
            types: Rule::new(
                "fs type",
                exact(&config.include_type),
                exact(&config.exclude_type),
            )?,
            paths: Rule::new(
                "fs path",
                globs(&config.include_path)?,
                globs(&config.exclude_path)?,
            )?,
            include_pseudo: config.include_pseudo,
            include_read_only: config.include_read_only,
        })
    }

    pub fn is_valid_fs_type(&self, fs_type: &str) -> bool {
        self.types.allows(fs_type)
    }

    pub fn is_valid_fs_path(&self, path: &str) -> bool {
        self.paths.allows(path)
    }

    /// Run every filter, returning the first reason to drop the mount
    pub fn scope(&self, mount: &MountPoint) -> Scope {
        if !self.is_valid_fs_type(&mount.fs_type) {
            Scope::WrongType
        } else if !self.is_valid_fs_path(&mount.path) {
            Scope::WrongPath
        } else if mount.pseudo && !self.include_pseudo {
            Scope::Pseudo
        } else if !self.include_read_only && is_read_only(&mount.options) {
            Scope::ReadOnly
        } else {
            Scope::Active
        }
    }

    pub fn in_scope(&self, mount: &MountPoint) -> bool {
        self.scope(mount) == Scope::Active
    }
}

/// True if the mount options mark the filesystem read-only
///
/// Options are compared field by field, so `errors=remount-ro` or `rootcontext`
/// do not count.
pub fn is_read_only(options: &str) -> bool {
    options
        .split(',')
        .map(str::trim)
        .any(|opt| opt == "ro" || opt == "read-only")
}

#[cfg(test)]
mod unit {
    use super::*;
    use crate::provider::mount_point;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn filter(config: FilterConfig) -> ScopeFilter {
        ScopeFilter::new(&config).unwrap()
    }

    #[test]
    fn no_type_filters_allow_everything() {
        let f = filter(FilterConfig::default());
        assert!(f.is_valid_fs_type("ext4"));
        assert!(f.is_valid_fs_type("xfs"));
        assert!(f.is_valid_fs_type("tmpfs"));
    }

    #[test]
    fn include_type_allows_only_listed() {
        let f = filter(FilterConfig {
            include_type: strings(&["ext4", "xfs"]),
            ..FilterConfig::default()
        });
        assert!(f.is_valid_fs_type("ext4"));
        assert!(f.is_valid_fs_type("xfs"));
        assert!(!f.is_valid_fs_type("tmpfs"));
        assert!(!f.is_valid_fs_type("btrfs"));
    }

    #[test]
    fn exclude_type_drops_listed() {
        let f = filter(FilterConfig {
            exclude_type: strings(&["tmpfs", "devtmpfs"]),
            ..FilterConfig::default()
        });
        assert!(f.is_valid_fs_type("ext4"));
        assert!(f.is_valid_fs_type("xfs"));
        assert!(!f.is_valid_fs_type("tmpfs"));
        assert!(!f.is_valid_fs_type("devtmpfs"));
    }

    #[test]
    fn types_are_not_globbed() {
        let f = filter(FilterConfig {
            exclude_type: strings(&["ext*"]),
            ..FilterConfig::default()
        });
        assert!(f.is_valid_fs_type("ext4"));
        assert!(!f.is_valid_fs_type("ext*"));
    }

    #[test]
    fn no_path_filters_allow_everything() {
        let f = filter(FilterConfig::default());
        assert!(f.is_valid_fs_path("/"));
        assert!(f.is_valid_fs_path("/home"));
        assert!(f.is_valid_fs_path("/tmp"));
    }

    #[test]
    fn include_path_allows_only_listed() {
        let f = filter(FilterConfig {
            include_path: strings(&["/", "/home"]),
            ..FilterConfig::default()
        });
        assert!(f.is_valid_fs_path("/"));
        assert!(f.is_valid_fs_path("/home"));
        assert!(!f.is_valid_fs_path("/tmp"));
        assert!(!f.is_valid_fs_path("/var"));
    }

    #[test]
    fn exclude_path_drops_listed() {
        let f = filter(FilterConfig {
            exclude_path: strings(&["/tmp", "/var"]),
            ..FilterConfig::default()
        });
        assert!(f.is_valid_fs_path("/"));
        assert!(f.is_valid_fs_path("/home"));
        assert!(!f.is_valid_fs_path("/tmp"));
        assert!(!f.is_valid_fs_path("/var"));
    }

    #[test]
    fn path_globs_do_not_cross_separators() {
        let f = filter(FilterConfig {
            exclude_path: strings(&["/tmp/*", "/var/log*"]),
            ..FilterConfig::default()
        });
        assert!(f.is_valid_fs_path("/"));
        assert!(f.is_valid_fs_path("/tmp"));
        assert!(!f.is_valid_fs_path("/tmp/foo"));
        assert!(f.is_valid_fs_path("/tmp/foo/bar"));
        assert!(!f.is_valid_fs_path("/var/log"));
        assert!(!f.is_valid_fs_path("/var/logs"));
    }

    #[test]
    fn include_path_globs() {
        let f = filter(FilterConfig {
            include_path: strings(&["/srv/**", "/data?"]),
            ..FilterConfig::default()
        });
        assert!(f.is_valid_fs_path("/srv/a/b"));
        assert!(f.is_valid_fs_path("/data1"));
        assert!(!f.is_valid_fs_path("/data"));
        assert!(!f.is_valid_fs_path("/"));
    }

    #[test]
    fn include_and_exclude_conflict() {
        let err = ScopeFilter::new(&FilterConfig {
            include_type: strings(&["ext4", "xfs"]),
            exclude_type: strings(&["tmpfs", "devtmpfs"]),
            ..FilterConfig::default()
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::MutuallyExclusive("fs type"));

        let err = ScopeFilter::new(&FilterConfig {
            include_path: strings(&["/", "/home"]),
            exclude_path: strings(&["/tmp"]),
            ..FilterConfig::default()
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::MutuallyExclusive("fs path"));
    }

    #[test]
    fn bad_glob_is_a_config_error() {
        match ScopeFilter::new(&FilterConfig {
            exclude_path: strings(&["/mnt/[oops"]),
            ..FilterConfig::default()
        }) {
            Err(ConfigError::InvalidGlob { pattern, .. }) => assert_eq!(pattern, "/mnt/[oops"),
            other => panic!("expected an invalid glob, got {:?}", other),
        }
    }

    #[test]
    fn read_only_options() {
        assert!(is_read_only("ro"));
        assert!(is_read_only("ro,noexec,nosuid"));
        assert!(is_read_only("noexec,ro,nosuid"));
        assert!(is_read_only("read-only"));
        assert!(is_read_only("noexec,read-only,nosuid"));
    }

    #[test]
    fn read_write_options() {
        assert!(!is_read_only("rw"));
        assert!(!is_read_only("rw,noexec,nosuid"));
        assert!(!is_read_only(""));
        assert!(!is_read_only("rw,errors=remount-ro"));
        assert!(!is_read_only("rw,rootcontext=foo"));
    }

    #[test]
    fn scope_reports_first_reason() {
        let f = filter(FilterConfig {
            exclude_type: strings(&["squashfs"]),
            exclude_path: strings(&["/snap/*"]),
            ..FilterConfig::default()
        });
        assert_eq!(f.scope(&mount_point("/", "ext4", "rw")), Scope::Active);
        assert_eq!(
            f.scope(&mount_point("/snap/core", "squashfs", "ro")),
            Scope::WrongType
        );
        assert_eq!(f.scope(&mount_point("/snap/core", "ext4", "ro")), Scope::WrongPath);
        assert_eq!(f.scope(&mount_point("/boot", "ext4", "ro,nosuid")), Scope::ReadOnly);

        let mut proc_mount = mount_point("/proc", "proc", "rw");
        proc_mount.pseudo = true;
        assert_eq!(f.scope(&proc_mount), Scope::Pseudo);
        assert!(!f.in_scope(&proc_mount));
    }

    #[test]
    fn pseudo_and_read_only_can_be_included() {
        let f = filter(FilterConfig {
            include_pseudo: true,
            include_read_only: true,
            ..FilterConfig::default()
        });
        let mut tmp = mount_point("/run", "tmpfs", "ro");
        tmp.pseudo = true;
        assert!(f.in_scope(&tmp));
    }
}
