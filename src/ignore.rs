use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use crate::Error;

/// Dotted paths that are left out of a comparison.
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct IgnoreSet {
    keys: BTreeSet<String>,
}

impl IgnoreSet {
    /// An ignore set that excludes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an ignore file: one dotted path per line, surrounding whitespace trimmed.
    /// Blank lines are dropped.
    pub fn parse(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Load the ignore file at `path`. A missing file means nothing is ignored.
    pub fn load(path: &Path) -> Result<Self, Error> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let set = Self::parse(&text);
                tracing::debug!(path = %path.display(), keys = set.len(), "loaded ignore file");
                Ok(set)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::trace!(path = %path.display(), "no ignore file");
                Ok(Self::new())
            }
            Err(source) => Err(Error::Io {
                path: path.to_owned(),
                source,
            }),
        }
    }

    /// Whether `key` is excluded from comparison.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of ignored keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing is ignored.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Add a key to the set.
    pub fn insert(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into());
    }
}

impl<S: Into<String>> FromIterator<S> for IgnoreSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().map(Into::into).collect(),
        }
    }
}
