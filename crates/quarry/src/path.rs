//! Dot-path field lookup.
//!
//! Paths are dot-separated segments. Arrays met along the way are broadcast:
//! the remaining path is resolved against every element, so `a.b` over
//! `{a: [{b: 1}, {b: 2}]}` collects `1` and `2`. A numeric segment applied
//! to an array indexes into it instead.

use crate::value::Value;

/// Result of resolving a field path against a record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    /// Nothing at the path.
    Missing,
    /// A single value, reached without passing through an array.
    Value(&'a Value),
    /// Values collected from several array elements.
    Collected(Vec<&'a Value>),
}

impl<'a> FieldValue<'a> {
    /// Returns `true` if nothing was found.
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    /// The values an operator tests, one array level flattened.
    ///
    /// A scalar yields itself; an array yields its elements.
    pub fn elements(&self) -> Vec<&'a Value> {
        let values: Vec<&'a Value> = match self {
            FieldValue::Missing => return Vec::new(),
            FieldValue::Value(value) => vec![*value],
            FieldValue::Collected(values) => values.clone(),
        };
        values
            .into_iter()
            .flat_map(|value| match value {
                Value::List(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect()
    }
}

/// Resolves a dot-separated path against a record.
///
/// # Example
///
/// ```
/// use quarry::{resolve_path, FieldValue, Value};
/// use serde_json::json;
///
/// let record = Value::from(json!({ "works": [{ "bpm": 120 }, { "bpm": 130 }] }));
/// let bpm = resolve_path(&record, "works.bpm");
/// assert_eq!(bpm.elements(), vec![&Value::from(120), &Value::from(130)]);
/// assert_eq!(resolve_path(&record, "works.1.bpm"), FieldValue::Value(&Value::from(130)));
/// ```
pub fn resolve_path<'a>(record: &'a Value, path: &str) -> FieldValue<'a> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut found = Vec::new();
    let broadcast = walk(record, &segments, &mut found);

    match (found.len(), broadcast) {
        (0, _) => FieldValue::Missing,
        (1, false) => FieldValue::Value(found[0]),
        _ => FieldValue::Collected(found),
    }
}

/// Collects values at `segments` below `current`; returns whether any array
/// was broadcast over.
fn walk<'a>(current: &'a Value, segments: &[&str], found: &mut Vec<&'a Value>) -> bool {
    let Some((segment, rest)) = segments.split_first() else {
        found.push(current);
        return false;
    };

    match current {
        Value::Record(map) => map
            .get(*segment)
            .map(|next| walk(next, rest, found))
            .unwrap_or(false),
        Value::List(items) => {
            if let Some(item) = segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                return walk(item, rest, found);
            }
            for item in items {
                walk(item, segments, found);
            }
            true
        }
        _ => false,
    }
}
