//! Structs and impls for the files from the /proc filesystem that describe
//! mounted filesystems
//!
//! Each file gets a struct to represent its data, with an associated `load`
//! function.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::num;
use std::result::Result as StdResult;
use std::str::Split;

use derive_more::From;

/// ProcFs errors
///
/// Every error from in this module can be converted into a `ProcFsError`
#[derive(Debug, From)]
pub enum ProcFsError {
    /// Errors originating in IO
    Io(io::Error),
    /// Error pulling all required data out of procfs
    InsufficientData(String),
    /// Happens when we try to parse an int from something in procfs
    InvalidInt(num::ParseIntError),
}

impl fmt::Display for ProcFsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        use self::ProcFsError::*;
        match self {
            Io(e) => write!(f, "{}", e),
            InsufficientData(e) => write!(f, "{}", e),
            InvalidInt(e) => write!(f, "{}", e),
        }
    }
}

/// All the results are results with `ProcFsError`s
pub type Result<T> = StdResult<T, ProcFsError>;

fn read_file(path: &str) -> Result<String> {
    let mut fh = File::open(path)?;
    let mut contents = String::new();
    fh.read_to_string(&mut contents)?;
    Ok(contents)
}

// ////////////////////////////////////////////////////////////////////////////
// Disks

/// One line of `/proc/mounts`
///
/// Field names follow `man 5 fstab`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Mount {
    pub spec: String,
    pub file: String,
    pub vfstype: String,
    pub mntops: Vec<String>,
    pub freq: Option<u32>,
    pub passno: Option<u32>,
}

fn next(parts: &mut Split<char>) -> Result<String> {
    if let Some(part) = parts.next() {
        Ok(unescape(part))
    } else {
        Err(ProcFsError::InsufficientData(
            "Missing part from mount".to_owned(),
        ))
    }
}

fn number(part: Option<&str>) -> Result<Option<u32>> {
    match part {
        Some(v) => Ok(Some(v.parse()?)),
        None => Ok(None),
    }
}

/// Undo the octal escaping the kernel applies to whitespace and backslashes
///
/// A mount point of `/mnt/my disk` shows up as `/mnt/my\040disk`.
fn unescape(field: &str) -> String {
    if !field.contains('\\') {
        return field.to_owned();
    }
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let octal = &field[i + 1..i + 4];
                if let Ok(byte) = u8::from_str_radix(octal, 8) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn mount_from_line(line: &str) -> Result<Mount> {
    use self::ProcFsError::InsufficientData;
    let mut parts = line.split(' ');
    Ok(Mount {
        spec: next(&mut parts)?,
        file: next(&mut parts)?,
        vfstype: next(&mut parts)?,
        mntops: parts
            .next()
            .ok_or_else(|| InsufficientData("Missing mnt ops from mount".to_owned()))?
            .split(',')
            .map(unescape)
            .collect::<Vec<_>>(),
        freq: number(parts.next())?,
        passno: number(parts.next())?,
    })
}

impl Mount {
    pub(crate) fn parse_str(mounts: &str) -> Result<Vec<Mount>> {
        mounts
            .lines()
            .filter(|line| !line.is_empty())
            .map(mount_from_line)
            .collect::<Result<Vec<_>>>()
    }

    /// Every mount in `/proc/mounts`, in the order the kernel lists them
    pub fn load_all() -> Result<Vec<Mount>> {
        let mounts = read_file("/proc/mounts")?;
        Mount::parse_str(&mounts)
    }

    /// The mount options joined back into the form `mount(8)` prints
    pub fn options(&self) -> String {
        self.mntops.join(",")
    }
}

/// The filesystem types the running kernel supports, from `/proc/filesystems`
///
/// Types flagged `nodev` are not backed by a block device: proc, sysfs,
/// tmpfs, cgroup and friends.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct Filesystems {
    pub nodev: Vec<String>,
    pub dev: Vec<String>,
}

impl Filesystems {
    pub fn load() -> Result<Filesystems> {
        read_file("/proc/filesystems")?.parse()
    }
}

impl ::std::str::FromStr for Filesystems {
    type Err = ProcFsError;

    fn from_str(contents: &str) -> Result<Filesystems> {
        let mut fses = Filesystems::default();
        for line in contents.lines().filter(|line| !line.trim().is_empty()) {
            let mut parts = line.splitn(2, '\t');
            let flag = parts.next().unwrap_or("").trim();
            let name = match parts.next() {
                Some(name) => name.trim().to_owned(),
                None => {
                    return Err(ProcFsError::InsufficientData(format!(
                        "Missing filesystem name in line '{}'",
                        line
                    )))
                }
            };
            if flag == "nodev" {
                fses.nodev.push(name);
            } else {
                fses.dev.push(name);
            }
        }
        Ok(fses)
    }
}

// ////////////////////////////////////////////////////////////////////////////
// Testing
