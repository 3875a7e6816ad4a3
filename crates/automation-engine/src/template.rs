//! `{{path.to.field}}` template interpolation against a context
//!
//! Only literal path lookup is supported. Tokens that look like function calls
//! (`{{date_add(now, 3, "days")}}`) never resolve and are left in place, as is
//! any token whose path is missing from the context.

use crate::coerce::stringify;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").unwrap());

/// Resolve a dotted path against the context.
///
/// Returns `None` as soon as a segment is missing or the current value is not
/// an object or array. Array elements are addressed by numeric segments.
pub fn get_field_value<'a>(path: &str, context: &'a Value) -> Option<&'a Value> {
    path.split('.').try_fold(context, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Replace every `{{path}}` token in a string.
pub fn interpolate_str(template: &str, context: &Value) -> String {
    TEMPLATE_RE
        .replace_all(template, |caps: &Captures<'_>| {
            match get_field_value(caps[1].trim(), context) {
                Some(value) => stringify(Some(value)),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Interpolate a single value; non-strings are returned unchanged.
pub fn interpolate(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate_str(s, context)),
        other => other.clone(),
    }
}

/// Interpolate every value of a mapping, recursing into nested mappings and arrays.
pub fn interpolate_object(object: &Map<String, Value>, context: &Value) -> Map<String, Value> {
    object
        .iter()
        .map(|(key, value)| (key.clone(), interpolate_nested(value, context)))
        .collect()
}

/// Interpolate a value of any shape, recursing through containers.
pub fn interpolate_nested(value: &Value, context: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(interpolate_object(map, context)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_nested(item, context))
                .collect(),
        ),
        other => interpolate(other, context),
    }
}
