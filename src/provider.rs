//! Where mounts and their usage numbers come from
//!
//! A `MountProvider` lists the mounts on the host and, separately, reads the
//! capacity and inode counts for one of them. The two steps are split so that
//! mounts which are filtered out never get `statvfs`ed: a hung NFS mount that
//! the user excluded should not be able to hang the check.

use std::fmt;
use std::io;
use std::result::Result as StdResult;

use derive_more::From;
use nix::sys::statvfs::{statvfs, Statvfs};
use tracing::{debug, warn};

use crate::procfs::{Filesystems, Mount, ProcFsError};

#[derive(Debug, From)]
pub enum ProviderError {
    /// The mount table itself could not be read, nothing can be checked
    MountTable(ProcFsError),
    /// One mount could not be `statvfs`ed
    Stat(StatError),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProviderError::MountTable(e) => write!(f, "unable to read mount table: {}", e),
            ProviderError::Stat(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug)]
pub struct StatError {
    pub path: String,
    pub source: io::Error,
}

impl fmt::Display for StatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unable to read usage of {}: {}", self.path, self.source)
    }
}

pub type Result<T> = StdResult<T, ProviderError>;

/// A mounted filesystem, before anything has been asked of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub device: String,
    pub path: String,
    pub fs_type: String,
    /// Comma separated, as in `/proc/mounts`
    pub options: String,
    /// Set by the provider for virtual filesystems with no real capacity
    pub pseudo: bool,
}

/// Capacity and inode counts for one filesystem
///
/// `bytes_free` is the space available to unprivileged users, so
/// `bytes_used + bytes_free` can be less than `bytes_total` on filesystems
/// that reserve blocks for root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub bytes_total: u64,
    pub bytes_used: u64,
    pub bytes_free: u64,
    pub inodes_total: u64,
    pub inodes_used: u64,
    pub inodes_free: u64,
}

impl Usage {
    pub fn from_statvfs(stat: &Statvfs) -> Usage {
        let mut block_size = stat.fragment_size() as u64;
        if block_size == 0 {
            block_size = stat.block_size() as u64;
        }
        let blocks = stat.blocks() as u64;
        let files = stat.files() as u64;
        Usage {
            bytes_total: blocks * block_size,
            bytes_used: blocks.saturating_sub(stat.blocks_free() as u64) * block_size,
            bytes_free: stat.blocks_available() as u64 * block_size,
            inodes_total: files,
            inodes_used: files.saturating_sub(stat.files_free() as u64),
            inodes_free: stat.files_free() as u64,
        }
    }
}

/// Snapshot of one mount: what it is and how full it is
#[derive(Debug, Clone, PartialEq)]
pub struct MountRecord {
    pub mount: MountPoint,
    pub usage: Usage,
}

pub trait MountProvider {
    /// Every mount on the host, in mount table order
    fn mounts(&self) -> Result<Vec<MountPoint>>;

    /// Read the usage of a single mount
    fn usage(&self, mount: &MountPoint) -> Result<Usage>;
}

/// `nodev` filesystems that still hold real data
const BACKED_NODEV_TYPES: &[&str] = &["zfs"];

/// The kernel's `nodev` filesystems, minus those that store real data
///
/// ZFS registers itself as `nodev` since datasets are not block devices.
pub fn pseudo_types_from(fses: &Filesystems) -> Vec<String> {
    fses.nodev
        .iter()
        .filter(|fs| !BACKED_NODEV_TYPES.contains(&fs.as_str()))
        .cloned()
        .collect()
}

/// Turn mount table entries into `MountPoint`s, marking the pseudo ones
pub fn classify(mounts: Vec<Mount>, pseudo_types: &[String]) -> Vec<MountPoint> {
    mounts
        .into_iter()
        .map(|mount| {
            let pseudo = pseudo_types.contains(&mount.vfstype);
            MountPoint {
                options: mount.options(),
                device: mount.spec,
                path: mount.file,
                fs_type: mount.vfstype,
                pseudo,
            }
        })
        .collect()
}

/// Reads `/proc/mounts` and `statvfs`es mount points. Linux-only.
#[derive(Debug, Default)]
pub struct ProcMounts {
    pseudo_types: Vec<String>,
}

impl ProcMounts {
    /// `pseudo_types` lists the filesystem types to mark as pseudo. When it is
    /// empty the kernel's own `nodev` list from `/proc/filesystems` is used.
    pub fn new(pseudo_types: Vec<String>) -> ProcMounts {
        ProcMounts { pseudo_types }
    }

    fn pseudo_types(&self) -> Vec<String> {
        if !self.pseudo_types.is_empty() {
            return self.pseudo_types.clone();
        }
        match Filesystems::load() {
            Ok(fses) => {
                let types = pseudo_types_from(&fses);
                debug!(?types, "using nodev filesystems as pseudo filesystems");
                types
            }
            Err(e) => {
                warn!("unable to read /proc/filesystems, no filesystem is pseudo: {}", e);
                Vec::new()
            }
        }
    }
}

impl MountProvider for ProcMounts {
    fn mounts(&self) -> Result<Vec<MountPoint>> {
        let pseudo_types = self.pseudo_types();
        let mounts = Mount::load_all()?;
        Ok(classify(mounts, &pseudo_types))
    }

    fn usage(&self, mount: &MountPoint) -> Result<Usage> {
        let stat = statvfs(mount.path.as_str()).map_err(|errno| StatError {
            path: mount.path.clone(),
            source: io::Error::from(errno),
        })?;
        Ok(Usage::from_statvfs(&stat))
    }
}

/// A fixed snapshot, for exercising the check without touching the host
#[cfg(test)]
#[derive(Debug, Default)]
pub struct StaticProvider {
    pub mounts: Vec<(MountPoint, StdResult<Usage, String>)>,
    pub unreadable_table: bool,
}

#[cfg(test)]
impl StaticProvider {
    pub fn new() -> StaticProvider {
        StaticProvider::default()
    }

    pub fn with(mut self, mount: MountPoint, usage: Usage) -> StaticProvider {
        self.mounts.push((mount, Ok(usage)));
        self
    }

    pub fn with_broken(mut self, mount: MountPoint, error: &str) -> StaticProvider {
        self.mounts.push((mount, Err(error.to_owned())));
        self
    }
}

#[cfg(test)]
impl MountProvider for StaticProvider {
    fn mounts(&self) -> Result<Vec<MountPoint>> {
        if self.unreadable_table {
            let err = io::Error::new(io::ErrorKind::NotFound, "no /proc/mounts");
            return Err(ProcFsError::from(err).into());
        }
        Ok(self.mounts.iter().map(|(mount, _)| mount.clone()).collect())
    }

    fn usage(&self, mount: &MountPoint) -> Result<Usage> {
        let found = self.mounts.iter().find(|(m, _)| m.path == mount.path);
        match found {
            Some((_, Ok(usage))) => Ok(*usage),
            Some((_, Err(msg))) => Err(StatError {
                path: mount.path.clone(),
                source: io::Error::new(io::ErrorKind::Other, msg.clone()),
            }
            .into()),
            None => Err(StatError {
                path: mount.path.clone(),
                source: io::Error::from(io::ErrorKind::NotFound),
            }
            .into()),
        }
    }
}

/// Build a `MountPoint` with the fields tests usually care about
#[cfg(test)]
pub fn mount_point(path: &str, fs_type: &str, options: &str) -> MountPoint {
    MountPoint {
        device: format!("/dev/fake{}", path.replace('/', "_")),
        path: path.to_owned(),
        fs_type: fs_type.to_owned(),
        options: options.to_owned(),
        pseudo: false,
    }
}

/// `Usage` with the given used and total bytes and inodes
#[cfg(test)]
pub fn usage(bytes_used: u64, bytes_total: u64, inodes_used: u64, inodes_total: u64) -> Usage {
    Usage {
        bytes_total,
        bytes_used,
        bytes_free: bytes_total - bytes_used,
        inodes_total,
        inodes_used,
        inodes_free: inodes_total - inodes_used,
    }
}

#[cfg(test)]
mod unit {
    use super::*;

    fn s(st: &str) -> String {
        st.to_owned()
    }

    #[test]
    fn zfs_is_not_pseudo() {
        let fses: Filesystems = "nodev\tsysfs\nnodev\tzfs\nnodev\ttmpfs\n\text4\n"
            .parse()
            .unwrap();
        assert_eq!(pseudo_types_from(&fses), vec![s("sysfs"), s("tmpfs")]);
    }

    #[test]
    fn classify_marks_pseudo_types() {
        let mounts = Mount::parse_str(
            "proc /proc proc rw,nosuid 0 0\n\
             tank/home /home zfs rw,xattr 0 0\n\
             /dev/sda1 / ext4 rw,relatime 0 0\n",
        )
        .unwrap();
        let points = classify(mounts, &[s("proc"), s("sysfs")]);

        let pseudo: Vec<(&str, bool)> = points.iter().map(|m| (m.path.as_str(), m.pseudo)).collect();
        assert_eq!(pseudo, vec![("/proc", true), ("/home", false), ("/", false)]);
        assert_eq!(points[1].device, "tank/home");
        assert_eq!(points[1].options, "rw,xattr");
    }

    #[test]
    fn static_provider_reports_broken_mounts() {
        let provider = StaticProvider::new()
            .with(mount_point("/", "ext4", "rw"), usage(1, 10, 1, 10))
            .with_broken(mount_point("/mnt/nfs", "nfs", "rw"), "stale file handle");
        let mounts = provider.mounts().unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(provider.usage(&mounts[0]).unwrap().bytes_used, 1);
        match provider.usage(&mounts[1]) {
            Err(ProviderError::Stat(e)) => {
                assert_eq!(e.path, "/mnt/nfs");
                assert_eq!(
                    e.to_string(),
                    "unable to read usage of /mnt/nfs: stale file handle"
                );
            }
            other => panic!("expected a stat error, got {:?}", other),
        }
    }
}
