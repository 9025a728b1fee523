//! Extra `key=value` tags attached to every metric

use std::collections::BTreeMap;
use std::fmt;

/// Tags from the configuration, sorted by key so output is stable
pub type ExtraTags = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// The entry has no `=` at all
    MissingSeparator(String),
    /// The entry starts with `=`
    EmptyKey(String),
}

impl fmt::Display for TagError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TagError::MissingSeparator(raw) => {
                write!(f, "tag '{}' is not of the form key=value", raw)
            }
            TagError::EmptyKey(raw) => write!(f, "tag '{}' has an empty key", raw),
        }
    }
}

/// Replace everything that cannot appear in a metric or label name with `_`
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .enumerate()
        .map(|(i, c)| {
            if c.is_ascii_alphabetic() || c == '_' || (i > 0 && c.is_ascii_digit()) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Parse `key=value` entries, failing on the first malformed one
///
/// Entries are split at the first `=`, so values may contain `=` and may be
/// empty. Keys are sanitized into label names first, and later duplicates of
/// a key replace earlier ones.
pub fn parse_extra_tags<S: AsRef<str>>(raw: &[S]) -> Result<ExtraTags, TagError> {
    let mut tags = ExtraTags::new();
    for entry in raw {
        let entry = entry.as_ref();
        let (key, value) = match entry.find('=') {
            Some(idx) => (entry[..idx].trim(), entry[idx + 1..].trim()),
            None => return Err(TagError::MissingSeparator(entry.to_owned())),
        };
        if key.is_empty() {
            return Err(TagError::EmptyKey(entry.to_owned()));
        }
        tags.insert(sanitize_name(key), value.to_owned());
    }
    Ok(tags)
}

/// An ordered set of tags for one metric sample
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(Vec<(String, String)>);

impl Tags {
    pub fn new() -> Tags {
        Tags(Vec::new())
    }

    /// The tags every per-mount metric carries, then the extra tags
    ///
    /// `mountpoint` and `fstype` cannot be overridden by extra tags.
    pub fn for_mount(mountpoint: &str, fstype: &str, extra: &ExtraTags) -> Tags {
        let mut tags = Tags::new();
        tags.insert("mountpoint", mountpoint);
        tags.insert("fstype", fstype);
        for (key, value) in extra {
            if tags.get(key).is_none() {
                tags.insert(key, value);
            }
        }
        tags
    }

    /// Add a tag, replacing the value of an existing key in place
    ///
    /// The key is sanitized first, so `a.b` and `a-b` are the same tag.
    pub fn insert(&mut self, key: &str, value: &str) {
        let key = sanitize_name(key);
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value.to_owned(),
            None => self.0.push((key, value.to_owned())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> From<&'a [(&'a str, &'a str)]> for Tags {
    fn from(pairs: &'a [(&'a str, &'a str)]) -> Tags {
        let mut tags = Tags::new();
        for (key, value) in pairs {
            tags.insert(key, value);
        }
        tags
    }
}
