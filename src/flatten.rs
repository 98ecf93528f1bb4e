use std::path::Path;

use serde_json::{Number, Value};
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::{Error, FlatMap, ScalarStyle};

/// Separator between the dotted path and the value on every flattened line.
pub const SEPARATOR: &str = " = ";

struct FlattenWalker {
    style: ScalarStyle,
    leaves: Vec<(String, String)>,
}

impl FlattenWalker {
    fn walk(&mut self, json_path: Option<&str>, value: &Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let new_path = match json_path {
                        Some(parent) => format!("{parent}.{key}"),
                        None => key.clone(),
                    };
                    self.walk(Some(&new_path), child);
                }
            }
            Value::Array(items) => {
                let parent = json_path.unwrap_or(self.root_prefix());
                for (i, child) in items.iter().enumerate() {
                    let new_path = format!("{parent}[{i}]");
                    self.walk(Some(&new_path), child);
                }
            }
            scalar => {
                let rendered = render_scalar(scalar, self.style);
                let path = json_path.unwrap_or(self.root_prefix());
                self.leaves.push((path.to_owned(), rendered));
            }
        }
    }

    /// Prefix for arrays and scalars at the root. Root objects use their keys directly.
    fn root_prefix(&self) -> &'static str {
        match self.style {
            ScalarStyle::Python => "None",
            ScalarStyle::Json => "",
        }
    }
}

/// Collect every scalar leaf of `value` as a `(dotted path, rendered value)` pair.
///
/// Pairs come out in traversal order. Empty objects and arrays contribute nothing.
pub fn leaves(value: &Value, style: ScalarStyle) -> Vec<(String, String)> {
    let mut walker = FlattenWalker {
        style,
        leaves: vec![],
    };
    walker.walk(None, value);
    walker.leaves
}

/// Flatten `value` into sorted `path = value` lines using the default [`ScalarStyle`].
pub fn flatten(value: &Value) -> String {
    flatten_with(value, ScalarStyle::default())
}

/// Flatten `value` into sorted `path = value` lines.
///
/// Whole lines are sorted, so two values holding the same leaves always produce byte-identical
/// text whatever the order of their object keys.
pub fn flatten_with(value: &Value, style: ScalarStyle) -> String {
    let mut lines: Vec<String> = leaves(value, style)
        .into_iter()
        .map(|(path, rendered)| format!("{path}{SEPARATOR}{rendered}"))
        .collect();
    lines.sort();
    lines.join("\n")
}

/// Flatten `value` and store the text at `path`. Returns the text that was written.
pub fn flatten_to_path(value: &Value, style: ScalarStyle, path: &Path) -> Result<String, Error> {
    let text = flatten_with(value, style);
    std::fs::write(path, &text).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "wrote flattened value");
    Ok(text)
}

/// Parse flattened text back into a key-value map.
///
/// Every line is split on its first `" = "`. Lines without one are skipped, and when a key
/// repeats the last occurrence wins.
pub fn unflatten(text: &str) -> FlatMap {
    text.lines()
        .filter_map(|line| line.split_once(SEPARATOR))
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

/// Read a stored flattened file and parse it with [`unflatten`].
pub fn read_flattened(path: &Path) -> Result<FlatMap, Error> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    let map = unflatten(&text);
    tracing::trace!(path = %path.display(), keys = map.len(), "read flattened value");
    Ok(map)
}

fn render_scalar(value: &Value, style: ScalarStyle) -> String {
    match (value, style) {
        (Value::String(s), _) if !s.contains('\n') => s.clone(),
        (Value::String(s), ScalarStyle::Python) => python_repr(s),
        (Value::String(_), ScalarStyle::Json) => value.to_string(),
        (Value::Bool(true), ScalarStyle::Python) => "True".to_owned(),
        (Value::Bool(false), ScalarStyle::Python) => "False".to_owned(),
        (Value::Null, ScalarStyle::Python) => "None".to_owned(),
        (Value::Number(n), ScalarStyle::Python) => python_number(n),
        _ => value.to_string(),
    }
}

/// Numbers keep their literal form: integer literals of any width stay integers, everything
/// else goes through float notation.
fn python_number(n: &Number) -> String {
    let literal = n.to_string();
    if literal.contains(['.', 'e', 'E']) {
        return match n.as_f64() {
            Some(f) => python_float(f),
            None => literal,
        };
    }
    match literal.strip_prefix('-') {
        Some(digits) if digits.bytes().all(|b| b == b'0') => digits.to_owned(),
        _ => literal,
    }
}

/// Shortest round-tripping digits, positional for exponents in `-4..16`, scientific with a
/// signed two-digit exponent otherwise.
fn python_float(f: f64) -> String {
    if f.is_infinite() {
        return if f < 0.0 { "-inf" } else { "inf" }.to_owned();
    }
    let sci = format!("{f:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };

    if !(-4..16).contains(&exp) {
        let exp_sign = if exp < 0 { '-' } else { '+' };
        return format!("{sign}{mantissa}e{exp_sign}{:02}", exp.abs());
    }

    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    if exp < 0 {
        let zeros = "0".repeat((-exp - 1) as usize);
        return format!("{sign}0.{zeros}{digits}");
    }

    let point = exp as usize + 1;
    if digits.len() <= point {
        let zeros = "0".repeat(point - digits.len());
        format!("{sign}{digits}{zeros}.0")
    } else {
        format!("{sign}{}.{}", &digits[..point], &digits[point..])
    }
}

/// Single-line quoted form of a string, as Python's `repr()` writes it.
fn python_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if !is_printable(c) => {
                let code = c as u32;
                let escaped = match code {
                    0..=0xff => format!("\\x{code:02x}"),
                    0x100..=0xffff => format!("\\u{code:04x}"),
                    _ => format!("\\U{code:08x}"),
                };
                out.push_str(&escaped);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Everything except the "Other" and "Separator" categories is printable. ASCII space is the
/// one separator that is.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    !matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Surrogate
            | GeneralCategory::PrivateUse
            | GeneralCategory::Unassigned
            | GeneralCategory::LineSeparator
            | GeneralCategory::ParagraphSeparator
            | GeneralCategory::SpaceSeparator
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_object_and_array() {
        let value = json!({"name": {"first": "Jo"}, "scores": [1, 2]});
        assert_eq!(
            flatten(&value),
            "name.first = Jo\nscores[0] = 1\nscores[1] = 2"
        );
    }

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(flatten(&a), flatten(&b));
    }

    #[test]
    fn whole_lines_are_sorted() {
        // '0' < ']', so "a[10]" lands between "a[0]" and "a[1]".
        let items: Vec<Value> = (0..11).map(Value::from).collect();
        let text = flatten(&json!({ "a": items }));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "a[0] = 0");
        assert_eq!(lines[1], "a[10] = 10");
        assert_eq!(lines[2], "a[1] = 1");
        assert_eq!(lines[3], "a[2] = 2");
    }

    #[test]
    fn nested_arrays_and_objects_in_arrays() {
        let value = json!({"m": [[1], {"k": "v"}]});
        assert_eq!(flatten(&value), "m[0][0] = 1\nm[1].k = v");
    }

    #[test]
    fn empty_containers_have_no_leaves() {
        assert_eq!(flatten(&json!({"a": {}, "b": [], "c": 1})), "c = 1");
        assert_eq!(flatten(&json!({})), "");
    }

    #[test]
    fn root_scalar_and_root_array() {
        assert_eq!(flatten(&json!(5)), "None = 5");
        assert_eq!(
            flatten(&json!([{"id": 1}, 2])),
            "None[0].id = 1\nNone[1] = 2"
        );
        assert_eq!(flatten_with(&json!(5), ScalarStyle::Json), " = 5");
        assert_eq!(
            flatten_with(&json!(["x", "y"]), ScalarStyle::Json),
            "[0] = x\n[1] = y"
        );
    }

    #[test]
    fn python_numbers_keep_integer_literals() {
        let value: Value =
            serde_json::from_str(r#"{"big": 123456789012345678901234, "neg0": -0, "f": 1E5}"#)
                .unwrap();
        assert_eq!(
            flatten(&value),
            "big = 123456789012345678901234\nf = 100000.0\nneg0 = 0"
        );
    }

    #[test]
    fn python_scalars() {
        let value = json!({"t": true, "f": false, "n": null, "i": -3, "s": "plain"});
        assert_eq!(
            flatten(&value),
            "f = False\ni = -3\nn = None\ns = plain\nt = True"
        );
    }

    #[test]
    fn json_scalars() {
        let value = json!({"t": true, "n": null, "x": 1.0, "s": "a\nb"});
        assert_eq!(
            flatten_with(&value, ScalarStyle::Json),
            "n = null\ns = \"a\\nb\"\nt = true\nx = 1.0"
        );
    }

    #[test]
    fn python_floats() {
        assert_eq!(python_float(1.0), "1.0");
        assert_eq!(python_float(0.0), "0.0");
        assert_eq!(python_float(-2.5), "-2.5");
        assert_eq!(python_float(123.456), "123.456");
        assert_eq!(python_float(0.5), "0.5");
        assert_eq!(python_float(0.0001), "0.0001");
        assert_eq!(python_float(0.00001), "1e-05");
        assert_eq!(python_float(1.5e-7), "1.5e-07");
        assert_eq!(python_float(1e15), "1000000000000000.0");
        assert_eq!(python_float(1e16), "1e+16");
        assert_eq!(python_float(2.5e20), "2.5e+20");
    }

    #[test]
    fn multi_line_strings_stay_on_one_line() {
        assert_eq!(python_repr("a\nb"), r"'a\nb'");
        assert_eq!(python_repr("it's\n"), r#""it's\n""#);
        assert_eq!(python_repr("'\"\n"), r#"'\'"\n'"#);
        assert_eq!(python_repr("tab\there\n\\"), r"'tab\there\n\\'");
        assert_eq!(python_repr("bell\u{7}\n"), r"'bell\x07\n'");
        assert_eq!(python_repr("a\u{202f}b\nc"), r"'a\u202fb\nc'");
        assert_eq!(python_repr("zero\u{200b}width\n"), r"'zero\u200bwidth\n'");
        assert_eq!(python_repr("nbsp\u{a0}\n"), r"'nbsp\xa0\n'");
        assert_eq!(python_repr("tag\u{e0001}\n"), r"'tag\U000e0001\n'");
        assert_eq!(python_repr("caf\u{e9} \u{1f600}\n"), "'caf\u{e9} \u{1f600}\\n'");

        let text = flatten(&json!({"body": "line one\nline two"}));
        assert_eq!(text, r"body = 'line one\nline two'");
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn unflatten_splits_on_first_separator() {
        let map = unflatten("a = 1\nb = x = y\n\nnot a pair\nc = ");
        assert_eq!(map.len(), 3);
        assert_eq!(map["a"], "1");
        assert_eq!(map["b"], "x = y");
        assert_eq!(map["c"], "");
    }

    #[test]
    fn unflatten_last_duplicate_wins() {
        let map = unflatten("a = 1\na = 2");
        assert_eq!(map["a"], "2");
    }

    #[test]
    fn unflatten_recovers_leaves() {
        let value = json!({"name": {"first": "Jo", "tags": ["a", "b"]}, "age": 42, "ok": true});
        let map = unflatten(&flatten(&value));
        let walked: FlatMap = leaves(&value, ScalarStyle::Python).into_iter().collect();
        assert_eq!(map, walked);
    }

    #[test]
    fn flatten_is_deterministic() {
        let value = json!({"z": [1, {"y": null}], "a": "b"});
        assert_eq!(flatten(&value), flatten(&value));
    }

    #[test]
    fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response_1.txt");
        let value = json!({"a": 1, "b": [true]});

        let written = flatten_to_path(&value, ScalarStyle::Python, &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), written);

        let map = read_flattened(&path).unwrap();
        assert_eq!(map["a"], "1");
        assert_eq!(map["b[0]"], "True");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_flattened(&dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
