use crate::{DiffKind, DiffLine, DiffReport, FlatMap, IgnoreSet};

/// Compare two flattened maps, skipping every key in `ignore`.
///
/// A key that is only in `expected` yields a removal line. A key that is only in `actual`
/// yields an addition line. A key whose values differ yields one of each.
pub fn diff(expected: &FlatMap, actual: &FlatMap, ignore: &IgnoreSet) -> DiffReport {
    let mut lines = vec![];

    for (key, expected_value) in expected {
        if ignore.contains(key) {
            continue;
        }
        match actual.get(key) {
            None => lines.push(removal(key, expected_value)),
            Some(actual_value) if actual_value != expected_value => {
                lines.push(removal(key, expected_value));
                lines.push(addition(key, actual_value));
            }
            Some(_) => (),
        }
    }

    for (key, actual_value) in actual {
        if !ignore.contains(key) && !expected.contains_key(key) {
            lines.push(addition(key, actual_value));
        }
    }

    let report = DiffReport::from_unsorted(lines);
    tracing::debug!(
        expected = expected.len(),
        actual = actual.len(),
        ignored = ignore.len(),
        lines = report.len(),
        "compared flattened values"
    );
    report
}

fn removal(key: &str, value: &str) -> DiffLine {
    DiffLine {
        kind: DiffKind::Removal,
        key: key.to_owned(),
        value: value.to_owned(),
    }
}

fn addition(key: &str, value: &str) -> DiffLine {
    DiffLine {
        kind: DiffKind::Addition,
        key: key.to_owned(),
        value: value.to_owned(),
    }
}
