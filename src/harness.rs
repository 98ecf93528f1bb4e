//! Fixture-driven test runs.
//!
//! A harness root holds four sibling folders:
//!
//! - `inputs/<case>/request_*.txt`: requests to replay, with optional `request_*.ignore` files
//! - `outputs/<case>/response_*.txt`: flattened actual responses, rewritten on every run
//! - `expects/<case>/response_*.txt`: stored expectations
//! - `diff/<case>/response_*.txt`: diff reports, rewritten on every run

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{diff, flatten_to_path, read_flattened, DiffReport, Error, IgnoreSet, ScalarStyle};

/// Prefix of the folders under `inputs/` that hold test cases.
pub const TEST_CASE_PREFIX: &str = "test_case";

/// Statuses accepted from the endpoint.
pub const ACCEPTED_STATUSES: [u16; 3] = [200, 201, 202];

/// Locations of the harness folders.
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// A layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding the requests of `case`.
    pub fn input_dir(&self, case: &str) -> PathBuf {
        self.root.join("inputs").join(case)
    }

    /// Folder receiving the flattened responses of `case`.
    pub fn output_dir(&self, case: &str) -> PathBuf {
        self.root.join("outputs").join(case)
    }

    /// Folder holding the stored expectations of `case`.
    pub fn expect_dir(&self, case: &str) -> PathBuf {
        self.root.join("expects").join(case)
    }

    /// Folder receiving the diff reports of `case`.
    pub fn diff_dir(&self, case: &str) -> PathBuf {
        self.root.join("diff").join(case)
    }
}

/// File name used for the response, expectation and diff of a request file.
pub fn response_file_name(request_file: &str) -> String {
    request_file.replace("request_", "response_")
}

/// File name of the ignore file that belongs to a request file.
pub fn ignore_file_name(request_file: &str) -> String {
    request_file.replace(".txt", ".ignore")
}

/// List the test cases under `inputs/`, sorted by name.
pub fn discover_test_cases(layout: &Layout) -> Result<Vec<String>, Error> {
    let input_root = layout.root.join("inputs");
    let entries = std::fs::read_dir(&input_root).map_err(|source| Error::Io {
        path: input_root.clone(),
        source,
    })?;

    let mut cases = vec![];
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io {
            path: input_root.clone(),
            source,
        })?;
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(TEST_CASE_PREFIX) {
                cases.push(name.to_owned());
            }
        }
    }
    cases.sort();
    tracing::debug!(root = %input_root.display(), count = cases.len(), "discovered test cases");
    Ok(cases)
}

/// An HTTP request read from a request file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSpec {
    /// HTTP method, as written.
    pub method: String,
    /// Target URL.
    pub url: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Request body, if any.
    pub body: Option<String>,
}

impl RequestSpec {
    /// Parse a request file.
    ///
    /// The text is made of up to three blocks separated by an empty line: `METHOD URL`, then
    /// `Name: value` header lines, then the body. Everything after the second separator is body.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut blocks = text.splitn(3, "\n\n");

        let request_line = blocks.next().unwrap_or("");
        let (method, url) = match request_line.split_whitespace().collect::<Vec<_>>()[..] {
            [method, url] => (method.to_owned(), url.to_owned()),
            _ => {
                return Err(Error::InvalidRequestLine {
                    line: request_line.to_owned(),
                })
            }
        };

        let mut headers = BTreeMap::new();
        if let Some(block) = blocks.next() {
            for line in block.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let (name, value) = line.split_once(':').ok_or_else(|| Error::InvalidHeader {
                    line: line.to_owned(),
                })?;
                headers.insert(name.trim().to_owned(), value.trim_start().to_owned());
            }
        }

        let body = blocks
            .next()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_owned);

        Ok(Self {
            method,
            url,
            headers,
            body,
        })
    }

    /// Read and parse the request file at `path`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text)
    }
}

/// What the endpoint answered.
#[derive(Clone, Debug)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body, expected to be JSON.
    pub body: String,
}

/// Sends requests to the system under test.
pub trait Transport {
    /// Execute `request` and return the response.
    fn send(&self, request: &RequestSpec) -> Result<Response, Error>;
}

/// Outcome of one request file.
#[derive(Debug)]
pub struct RequestOutcome {
    /// Name of the request file.
    pub request_file: String,
    /// Where the diff report was written.
    pub diff_path: PathBuf,
    /// The comparison result.
    pub report: DiffReport,
}

impl RequestOutcome {
    /// Whether the response matched its expectation.
    pub fn passed(&self) -> bool {
        self.report.is_empty()
    }
}

/// Replay every request of `case` and compare each response against its expectation.
///
/// Outcomes come back in request file name order. A failed request, an unexpected status or a
/// missing expectation aborts the case.
pub fn run_case(
    layout: &Layout,
    case: &str,
    transport: &dyn Transport,
    style: ScalarStyle,
) -> Result<Vec<RequestOutcome>, Error> {
    let input_dir = layout.input_dir(case);
    let output_dir = layout.output_dir(case);
    let expect_dir = layout.expect_dir(case);
    let diff_dir = layout.diff_dir(case);

    for dir in [&output_dir, &diff_dir] {
        std::fs::create_dir_all(dir).map_err(|source| Error::Io {
            path: dir.clone(),
            source,
        })?;
    }

    let mut outcomes = vec![];
    for request_file in request_files(&input_dir)? {
        let request = RequestSpec::load(&input_dir.join(&request_file))?;
        tracing::info!(case, request = %request_file, method = %request.method, url = %request.url, "sending request");

        let response = transport.send(&request)?;
        if !ACCEPTED_STATUSES.contains(&response.status) {
            return Err(Error::UnexpectedStatus {
                method: request.method,
                url: request.url,
                status: response.status,
            });
        }
        let body: Value = serde_json::from_str(&response.body)?;

        let response_file = response_file_name(&request_file);
        let output_path = output_dir.join(&response_file);
        flatten_to_path(&body, style, &output_path)?;

        let actual = read_flattened(&output_path)?;
        let expected = read_flattened(&expect_dir.join(&response_file))?;
        let ignore = IgnoreSet::load(&input_dir.join(ignore_file_name(&request_file)))?;

        let report = diff(&expected, &actual, &ignore);
        let diff_path = diff_dir.join(&response_file);
        report.write_to(&diff_path)?;

        if report.is_empty() {
            tracing::info!(case, request = %request_file, "response matches expectation");
        } else {
            tracing::warn!(case, request = %request_file, lines = report.len(), diff = %diff_path.display(), "response differs from expectation");
        }

        outcomes.push(RequestOutcome {
            request_file,
            diff_path,
            report,
        });
    }

    Ok(outcomes)
}

/// Result of running one test case.
#[derive(Debug)]
pub struct CaseOutcome {
    /// Name of the test case folder.
    pub case: String,
    /// Per-request outcomes, or the error that aborted the case.
    pub result: Result<Vec<RequestOutcome>, Error>,
}

impl CaseOutcome {
    /// Whether every request of the case matched its expectation.
    pub fn passed(&self) -> bool {
        matches!(&self.result, Ok(outcomes) if outcomes.iter().all(RequestOutcome::passed))
    }
}

/// Run every case in `cases`. An error only aborts the case it happens in.
pub fn run_cases(
    layout: &Layout,
    cases: &[String],
    transport: &dyn Transport,
    style: ScalarStyle,
) -> Vec<CaseOutcome> {
    cases
        .iter()
        .map(|case| {
            let result = run_case(layout, case, transport, style);
            if let Err(err) = &result {
                tracing::error!(case = %case, error = %err, "test case aborted");
            }
            CaseOutcome {
                case: case.clone(),
                result,
            }
        })
        .collect()
}

fn request_files(input_dir: &Path) -> Result<Vec<String>, Error> {
    let io_err = |source: std::io::Error| Error::Io {
        path: input_dir.to_owned(),
        source,
    };

    let mut files = vec![];
    for entry in std::fs::read_dir(input_dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".txt") {
                files.push(name.to_owned());
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_request() {
        let request = RequestSpec::parse(
            "POST https://api.example.com/users\n\nContent-Type: application/json\n  Authorization:   Bearer abc:def  \n\n{\"name\": \"Jo\"}\n\n",
        )
        .unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "https://api.example.com/users");
        assert_eq!(request.headers.len(), 2);
        assert_eq!(request.headers["Content-Type"], "application/json");
        assert_eq!(request.headers["Authorization"], "Bearer abc:def");
        assert_eq!(request.body.as_deref(), Some("{\"name\": \"Jo\"}"));
    }

    #[test]
    fn parse_request_line_only() {
        let request = RequestSpec::parse("GET http://localhost/health\n").unwrap();
        assert_eq!(request.method, "GET");
        assert!(request.headers.is_empty());
        assert_eq!(request.body, None);
    }

    #[test]
    fn body_keeps_inner_blank_lines() {
        let request = RequestSpec::parse("PUT http://h/x\n\n\n\nline1\n\nline2\n").unwrap();
        assert!(request.headers.is_empty());
        assert_eq!(request.body.as_deref(), Some("line1\n\nline2"));
    }

    #[test]
    fn bad_request_line() {
        assert!(matches!(
            RequestSpec::parse("GET\n"),
            Err(Error::InvalidRequestLine { .. })
        ));
        assert!(matches!(
            RequestSpec::parse("GET http://h extra"),
            Err(Error::InvalidRequestLine { .. })
        ));
    }

    #[test]
    fn bad_header() {
        assert!(matches!(
            RequestSpec::parse("GET http://h\n\nno separator here"),
            Err(Error::InvalidHeader { .. })
        ));
    }

    #[test]
    fn file_names() {
        assert_eq!(response_file_name("request_login.txt"), "response_login.txt");
        assert_eq!(ignore_file_name("request_login.txt"), "request_login.ignore");
    }

    #[test]
    fn layout_paths() {
        let layout = Layout::new("/srv/harness");
        assert_eq!(
            layout.input_dir("test_case_1"),
            Path::new("/srv/harness/inputs/test_case_1")
        );
        assert_eq!(
            layout.diff_dir("test_case_1"),
            Path::new("/srv/harness/diff/test_case_1")
        );
    }
}
