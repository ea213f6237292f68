//! Read-only walk over a query's leaf conditions.

use indexmap::IndexSet;

use crate::op::{is_option_key, CompoundOperator};
use crate::value::Value;

const ELEM_MATCH: &str = "$elemMatch";

/// Which structural nodes [`traverse`] reports besides leaf conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraverseOptions {
    /// Report `$and`/`$or`/`$nor`/`$not` nodes before descending into them.
    pub include_compound: bool,
    /// Report `$elemMatch` nodes before descending into them.
    pub include_nested: bool,
}

impl TraverseOptions {
    /// Leaf conditions only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also report compound nodes.
    pub fn with_compound(mut self) -> Self {
        self.include_compound = true;
        self
    }

    /// Also report `$elemMatch` nodes.
    pub fn with_nested(mut self) -> Self {
        self.include_nested = true;
        self
    }
}

/// One node reported by [`traverse`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visit<'a, 'f> {
    /// Full dot path of the field; empty for top-level compound nodes.
    pub field: &'f str,
    /// Operator token, `$` included. Shorthand values report `$eq`, or
    /// `$regex` for patterns.
    pub op: &'a str,
    /// The operand.
    pub value: &'a Value,
    /// The query object the condition belongs to.
    pub parent: &'a Value,
}

/// Calls `visit` for every leaf condition in `query`, depth first in key
/// order.
///
/// Paths inside `$elemMatch` are reported in full (`works.key`). Option keys
/// such as `$caseInsensitive` are not conditions and are skipped. The query
/// is not validated.
///
/// # Example
///
/// ```
/// use quarry::{traverse, TraverseOptions, Value};
/// use serde_json::json;
///
/// let query = Value::from(json!({
///     "works": { "$elemMatch": { "key": "C", "bpm": { "$gt": 100 } } },
///     "$not": { "year": { "$lt": 1928 } }
/// }));
///
/// let mut seen = Vec::new();
/// traverse(&query, TraverseOptions::new(), |visit| {
///     seen.push(format!("{} {}", visit.field, visit.op));
/// });
/// assert_eq!(seen, ["works.key $eq", "works.bpm $gt", "year $lt"]);
/// ```
pub fn traverse<'a, F>(query: &'a Value, options: TraverseOptions, mut visit: F)
where
    F: FnMut(Visit<'a, '_>),
{
    walk(query, "", query, options, &mut visit);
}

/// Every field path a query tests, in first-seen order without duplicates.
pub fn referenced_fields(query: &Value) -> Vec<String> {
    let mut fields: IndexSet<String> = IndexSet::new();
    traverse(query, TraverseOptions::new(), |visit| {
        fields.insert(visit.field.to_string());
    });
    fields.into_iter().collect()
}

fn walk<'a, F>(query: &'a Value, prefix: &str, parent: &'a Value, options: TraverseOptions, visit: &mut F)
where
    F: FnMut(Visit<'a, '_>),
{
    let Some(entries) = query.as_record() else {
        return;
    };

    for (key, value) in entries {
        if !key.starts_with('$') {
            let field = join(prefix, key);
            match value {
                Value::Record(_) => walk(value, &field, parent, options, visit),
                Value::Pattern(_) => visit(Visit { field: &field, op: "$regex", value, parent }),
                _ => visit(Visit { field: &field, op: "$eq", value, parent }),
            }
            continue;
        }

        if is_option_key(key) {
            continue;
        }

        if CompoundOperator::from_token(key).is_some() {
            if options.include_compound {
                visit(Visit { field: prefix, op: key, value, parent });
            }
            match value {
                Value::List(queries) => {
                    for sub in queries {
                        walk(sub, prefix, sub, options, visit);
                    }
                }
                sub => walk(sub, prefix, sub, options, visit),
            }
        } else if key == ELEM_MATCH {
            if options.include_nested {
                visit(Visit { field: prefix, op: key, value, parent });
            }
            walk(value, &format!("{prefix}."), value, options, visit);
        } else {
            visit(Visit { field: prefix, op: key, value, parent });
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('.') {
        format!("{prefix}{key}")
    } else {
        format!("{prefix}.{key}")
    }
}
