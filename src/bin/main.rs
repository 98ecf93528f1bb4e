use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Error};
use json_flat_diff::harness::{self, Layout, RequestSpec, Response, Transport};
use json_flat_diff::{IgnoreSet, ScalarStyle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Flatten JSON into sorted key-value lines and compare against stored expectations
#[derive(Parser)]
#[clap(about, version)]
struct Args {
    /// How scalar values are written
    #[clap(long, value_enum, default_value_t = Style::Python, global = true)]
    style: Style,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Flatten a JSON file
    Flatten {
        /// The JSON document
        input: PathBuf,
        /// Write the flattened text here instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare two flattened files
    Diff {
        /// The stored expectation
        expected: PathBuf,
        /// The actual flattened response
        actual: PathBuf,
        /// File listing keys to leave out, one per line
        #[clap(short, long)]
        ignore: Option<PathBuf>,
        /// Write the report here as well as to stdout
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Replay request fixtures and compare the responses
    Run {
        /// Folder holding inputs/, expects/, outputs/ and diff/
        #[clap(long, default_value = ".")]
        root: PathBuf,
        /// Only run these test cases
        #[clap(long)]
        case: Vec<String>,
        /// Request timeout in seconds
        #[clap(long, default_value_t = 30)]
        timeout: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Style {
    Python,
    Json,
}

impl From<Style> for ScalarStyle {
    fn from(s: Style) -> Self {
        match s {
            Style::Python => ScalarStyle::Python,
            Style::Json => ScalarStyle::Json,
        }
    }
}

struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    fn new(timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &RequestSpec) -> Result<Response, json_flat_diff::Error> {
        let transport_err = |e: Box<dyn std::error::Error + Send + Sync>| {
            json_flat_diff::Error::Transport {
                url: request.url.clone(),
                source: e,
            }
        };

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| transport_err(Box::new(e)))?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().map_err(|e| transport_err(Box::new(e)))?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|e| transport_err(Box::new(e)))?;
        Ok(Response { status, body })
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("json_flat_diff=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn main() -> Result<ExitCode, Error> {
    let args = Args::parse();
    init_logging();
    let style = ScalarStyle::from(args.style);

    match args.command {
        Command::Flatten { input, output } => {
            let value: serde_json::Value = serde_json::from_reader(
                File::open(&input).with_context(|| format!("opening {}", input.display()))?,
            )?;
            match output {
                Some(path) => {
                    json_flat_diff::flatten_to_path(&value, style, &path)?;
                }
                None => println!("{}", json_flat_diff::flatten_with(&value, style)),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Diff {
            expected,
            actual,
            ignore,
            output,
        } => {
            let expected = json_flat_diff::read_flattened(&expected)?;
            let actual = json_flat_diff::read_flattened(&actual)?;
            let ignore = match ignore {
                Some(path) => IgnoreSet::load(&path)?,
                None => IgnoreSet::new(),
            };

            let report = json_flat_diff::diff(&expected, &actual, &ignore);
            if let Some(path) = output {
                report.write_to(&path)?;
            }
            if report.is_empty() {
                return Ok(ExitCode::SUCCESS);
            }
            println!("{report}");
            Ok(ExitCode::FAILURE)
        }
        Command::Run {
            root,
            case,
            timeout,
        } => {
            let layout = Layout::new(root);
            let transport = HttpTransport::new(Duration::from_secs(timeout))?;
            let cases = if case.is_empty() {
                harness::discover_test_cases(&layout)?
            } else {
                case
            };

            let mut failed = 0;
            let mut errored = 0;
            for outcome in harness::run_cases(&layout, &cases, &transport, style) {
                let case = &outcome.case;
                match outcome.result {
                    Ok(requests) => {
                        for request in requests.iter().filter(|r| !r.passed()) {
                            failed += 1;
                            println!("FAIL {case}/{}", request.request_file);
                            println!("{}", request.report);
                        }
                    }
                    Err(err) => {
                        errored += 1;
                        println!("ERROR {case}: {:#}", Error::from(err));
                    }
                }
            }

            if failed == 0 && errored == 0 {
                println!("{} test case(s) passed", cases.len());
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{failed} response(s) did not match, {errored} test case(s) errored");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
