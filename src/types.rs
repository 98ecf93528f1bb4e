use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// A flattened representation read back from disk: dotted path to stringified value.
pub type FlatMap = BTreeMap<String, String>;

/// Which side of the comparison a diff line comes from.
#[derive(Serialize, Clone, Copy, Eq, PartialEq, Debug)]
pub enum DiffKind {
    /// Present in the expectation but missing from, or changed in, the actual data.
    #[serde(rename = "removal")]
    Removal,
    /// Present in the actual data but missing from, or changed in, the expectation.
    #[serde(rename = "addition")]
    Addition,
}

impl DiffKind {
    /// The marker that prefixes a rendered line.
    pub fn marker(self) -> char {
        match self {
            Self::Removal => '-',
            Self::Addition => '+',
        }
    }
}

/// One line of a diff report.
#[derive(Serialize, Clone, Eq, PartialEq, Debug)]
pub struct DiffLine {
    /// Whether the entry was removed or added.
    pub kind: DiffKind,
    /// Dotted path of the leaf. `"name.first"`, `"scores[0]"`.
    pub key: String,
    /// The stringified value on the side named by `kind`.
    pub value: String,
}

impl fmt::Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} = {}", self.kind.marker(), self.key, self.value)
    }
}

/// The outcome of comparing two flattened representations.
///
/// Lines are kept sorted by their rendered text, so a removal and an addition for the same key
/// are not necessarily adjacent. An empty report means there is no difference outside the
/// ignore set.
#[derive(Serialize, Clone, Default, Eq, PartialEq, Debug)]
pub struct DiffReport {
    lines: Vec<DiffLine>,
}

impl DiffReport {
    pub(crate) fn from_unsorted(lines: Vec<DiffLine>) -> Self {
        let mut rendered: Vec<(String, DiffLine)> =
            lines.into_iter().map(|l| (l.to_string(), l)).collect();
        rendered.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            lines: rendered.into_iter().map(|(_, l)| l).collect(),
        }
    }

    /// Whether both sides matched.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines in the report.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// The lines of the report, in output order.
    pub fn lines(&self) -> &[DiffLine] {
        &self.lines
    }

    /// Write the rendered report to `path`, replacing any previous content.
    ///
    /// The file is written even when the report is empty, so a passing run clears the report
    /// left behind by an earlier failing one.
    pub fn write_to(&self, path: &Path) -> Result<(), Error> {
        std::fs::write(path, self.to_string()).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        tracing::debug!(path = %path.display(), lines = self.len(), "wrote diff report");
        Ok(())
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{line}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a DiffReport {
    type Item = &'a DiffLine;
    type IntoIter = std::slice::Iter<'a, DiffLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}

/// How scalar leaves are turned into strings.
#[derive(Clone, Copy, Default, Eq, PartialEq, Debug)]
pub enum ScalarStyle {
    /// `True`/`False`/`None`, Python float notation and Python `repr()` quoting for multi-line
    /// strings.
    ///
    /// This is the format existing expectation files are stored in.
    #[default]
    Python,
    /// `true`/`false`/`null` and JSON string escaping for multi-line strings.
    Json,
}

/// The errors that can happen in this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to decode a JSON response body.
    #[error("failed to parse JSON")]
    Serde(#[from] serde_json::Error),
    /// Reading or writing one of the harness files failed.
    #[error("failed to access {}", path.display())]
    Io {
        /// The file in question.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The first block of a request file is not `METHOD URL`.
    #[error("invalid request line {line:?}, expected `METHOD URL`")]
    InvalidRequestLine {
        /// The offending line.
        line: String,
    },
    /// A header line has no `:` separator.
    #[error("invalid header line {line:?}, expected `Name: value`")]
    InvalidHeader {
        /// The offending line.
        line: String,
    },
    /// The endpoint answered with a status other than 200, 201 or 202.
    #[error("unexpected status {status} from {method} {url}")]
    UnexpectedStatus {
        /// HTTP method of the request.
        method: String,
        /// URL of the request.
        url: String,
        /// The status the endpoint returned.
        status: u16,
    },
    /// The transport failed to execute a request.
    #[error("request to {url} failed")]
    Transport {
        /// URL of the request.
        url: String,
        /// The transport's own error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
