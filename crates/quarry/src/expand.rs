//! `$all`/`$nin` expansion inside `$elemMatch`.
//!
//! An `$elemMatch` sub-query is tested against one array element at a time,
//! so `$all` and `$nin` inside it can never look across elements. This pass
//! rewrites
//!
//! ```text
//! { works: { $elemMatch: { bpm: 130, keys: { $all: ["C", "C#"] } } } }
//! ```
//!
//! into
//!
//! ```text
//! { $and: [
//!     { works: { $elemMatch: { bpm: 130, keys: "C" } } },
//!     { works: { $elemMatch: { bpm: 130, keys: "C#" } } }
//! ] }
//! ```
//!
//! and `$nin` likewise into a `$nor`. The rewrite applies at every nesting
//! depth and runs before both backends.

use tracing::debug;

use crate::op::CompoundOperator;
use crate::value::{Map, Value};

const ELEM_MATCH: &str = "$elemMatch";

/// Expands `$all`/`$nin` conditions nested in `$elemMatch`.
///
/// Values that are not query objects are returned unchanged; validation is
/// left to the backends.
///
/// # Example
///
/// ```
/// use quarry::{expand_nested_array_exps, Value};
/// use serde_json::json;
///
/// let query = Value::from(json!({
///     "works": { "$elemMatch": { "bpm": 130, "keys": { "$all": ["C", "C#"] } } }
/// }));
/// let expected = Value::from(json!({
///     "$and": [
///         { "works": { "$elemMatch": { "bpm": 130, "keys": "C" } } },
///         { "works": { "$elemMatch": { "bpm": 130, "keys": "C#" } } }
///     ]
/// }));
/// assert_eq!(expand_nested_array_exps(&query), expected);
/// ```
pub fn expand_nested_array_exps(query: &Value) -> Value {
    let Value::Record(entries) = query else {
        return query.clone();
    };

    let mut out = Map::new();
    for (key, value) in entries {
        if CompoundOperator::from_token(key).is_some() {
            merge(&mut out, key, expand_compound(value));
            continue;
        }

        match expand_field(key, value) {
            Expansion::Unchanged(value) => {
                out.insert(key.clone(), value);
            }
            Expansion::Split { all, nin } => {
                debug!(field = %key, and = all.len(), nor = nin.len(), "expanded $elemMatch array operators");
                if !all.is_empty() {
                    merge(&mut out, "$and", Value::List(all));
                }
                if !nin.is_empty() {
                    merge(&mut out, "$nor", Value::List(nin));
                }
            }
        }
    }

    Value::Record(out)
}

enum Expansion {
    Unchanged(Value),
    Split { all: Vec<Value>, nin: Vec<Value> },
}

fn expand_compound(operand: &Value) -> Value {
    match operand {
        Value::List(queries) => Value::List(queries.iter().map(expand_nested_array_exps).collect()),
        other => expand_nested_array_exps(other),
    }
}

/// Adds compound sub-queries under `key`, appending to any already there.
///
/// An empty list on either side stays empty so the backends still reject it.
fn merge(out: &mut Map, key: &str, addition: Value) {
    let Some(existing) = out.get_mut(key) else {
        out.insert(key.to_string(), addition);
        return;
    };

    if is_empty_list(existing) || is_empty_list(&addition) {
        *existing = Value::List(Vec::new());
        return;
    }

    let mut items = match std::mem::take(existing) {
        Value::List(items) => items,
        single => vec![single],
    };
    match addition {
        Value::List(more) => items.extend(more),
        single => items.push(single),
    }
    *existing = Value::List(items);
}

fn is_empty_list(value: &Value) -> bool {
    value.as_list().is_some_and(<[Value]>::is_empty)
}

fn expand_field(key: &str, condition: &Value) -> Expansion {
    let Some(inner) = condition
        .as_record()
        .and_then(|c| c.get(ELEM_MATCH))
        .filter(|inner| inner.as_record().is_some())
    else {
        return Expansion::Unchanged(condition.clone());
    };

    let inner = expand_nested_array_exps(inner);
    let Value::Record(inner_entries) = &inner else {
        return Expansion::Unchanged(condition.clone());
    };

    let mut all = Vec::new();
    let mut nin = Vec::new();
    for (field, exp) in inner_entries {
        let Some(exp) = exp.as_record() else {
            continue;
        };
        if let Some(values) = exp.get("$all").and_then(Value::as_list) {
            all.extend(values.iter().map(|v| element_query(key, condition, inner_entries, field, v)));
        }
        if let Some(values) = exp.get("$nin").and_then(Value::as_list) {
            nin.extend(values.iter().map(|v| element_query(key, condition, inner_entries, field, v)));
        }
    }

    if all.is_empty() && nin.is_empty() {
        return Expansion::Unchanged(with_elem_match(condition, inner));
    }
    Expansion::Split { all, nin }
}

/// `{key: {$elemMatch: entries}}` with `field` narrowed to one value and
/// every other expanded field dropped.
fn element_query(key: &str, condition: &Value, entries: &Map, field: &str, value: &Value) -> Value {
    let narrowed: Map = entries
        .iter()
        .filter_map(|(name, exp)| {
            if name == field {
                Some((name.clone(), value.clone()))
            } else if is_expanded(exp) {
                None
            } else {
                Some((name.clone(), exp.clone()))
            }
        })
        .collect();

    let mut query = Map::new();
    query.insert(key.to_string(), with_elem_match(condition, Value::Record(narrowed)));
    Value::Record(query)
}

fn is_expanded(exp: &Value) -> bool {
    exp.as_record().is_some_and(|exp| {
        exp.get("$all").and_then(Value::as_list).is_some() || exp.get("$nin").and_then(Value::as_list).is_some()
    })
}

fn with_elem_match(condition: &Value, inner: Value) -> Value {
    let mut condition = condition.as_record().cloned().unwrap_or_default();
    condition.insert(ELEM_MATCH.to_string(), inner);
    Value::Record(condition)
}
