#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod diff;
mod flatten;
pub mod harness;
mod ignore;
mod types;

pub use diff::diff;
pub use flatten::{
    flatten, flatten_to_path, flatten_with, leaves, read_flattened, unflatten, SEPARATOR,
};
pub use ignore::IgnoreSet;
pub use types::*;

/// Flatten the actual response and compare it against a stored expectation.
///
/// `expected` is flattened text as stored on disk. Both sides go through [`unflatten`] before
/// being compared, exactly as they would when read back from files.
pub fn compare(
    expected: &str,
    actual: &serde_json::Value,
    ignore: &IgnoreSet,
    style: ScalarStyle,
) -> DiffReport {
    let actual = unflatten(&flatten_with(actual, style));
    diff(&unflatten(expected), &actual, ignore)
}
