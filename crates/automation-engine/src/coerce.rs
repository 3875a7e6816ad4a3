//! Loose value coercions shared by template interpolation and condition evaluation
//!
//! Rule data originates from a dynamically typed host, so comparisons follow its
//! coercion rules: missing values are distinct from `null`, numbers compare by
//! magnitude regardless of integer/float encoding, and strings coerce to numbers
//! leniently.

use serde_json::Value;

/// Stringify a value the way the host renders it into text.
///
/// `None` (a missing path) renders as `"undefined"`.
pub fn stringify(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(value) => stringify_value(value),
    }
}

fn stringify_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format_number(f),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => stringify_value(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Render a float the way the host prints numbers.
///
/// Magnitudes outside `[1e-6, 1e21)` use exponent form with an explicit sign
/// (`1e+21`, `1.5e-7`); everything else is plain decimal.
fn format_number(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if f == 0.0 {
        return "0".to_string();
    }
    if (1e-6..1e21).contains(&f.abs()) {
        return format!("{f}");
    }
    let exponent_form = format!("{f:e}");
    match exponent_form.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => exponent_form,
    }
}

/// Numeric coercion; anything non-numeric becomes NaN
pub fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_number(s),
        Some(Value::Array(items)) => match items.as_slice() {
            [] => 0.0,
            [single] => parse_number(&stringify_value(single)),
            _ => f64::NAN,
        },
        Some(Value::Object(_)) => f64::NAN,
    }
}

fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust accepts "inf"/"nan" spellings the host does not
    if trimmed
        .trim_start_matches(['+', '-'])
        .starts_with(|c: char| c.is_ascii_alphabetic())
    {
        return f64::NAN;
    }
    if let Some(n) = parse_prefixed_integer(trimmed) {
        return n;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Unsigned `0x`/`0o`/`0b` literals; no sign, at least one digit
fn parse_prefixed_integer(s: &str) -> Option<f64> {
    let radix = match s.get(..2)? {
        "0x" | "0X" => 16,
        "0o" | "0O" => 8,
        "0b" | "0B" => 2,
        _ => return None,
    };
    let digits = &s[2..];
    if digits.is_empty() {
        return Some(f64::NAN);
    }
    let value = digits.chars().try_fold(0.0_f64, |acc, c| {
        c.to_digit(radix).map(|d| acc * f64::from(radix) + f64::from(d))
    });
    Some(value.unwrap_or(f64::NAN))
}

/// Truthiness: missing, null, false, 0, NaN and "" are falsy
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Strict equality without type coercion.
///
/// A missing value never equals anything. Numbers compare by value so that `1`
/// and `1.0` are equal; arrays and objects compare structurally.
pub fn strict_equals(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
