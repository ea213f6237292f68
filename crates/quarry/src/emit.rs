//! Search-engine query emission.
//!
//! Compiles a query into an Elasticsearch-style boolean query document.
//! Sibling keys land in a `bool` wrapper under the clause kind their
//! operator maps to:
//!
//! ```text
//! field condition          -> must      (must_not when negated)
//! $and: [q, ..]            -> must      one entry per sub-query
//! $or:  [q, ..]            -> should    plus minimum_should_match: 1
//! $nor: [q, ..] / $not: q  -> must_not
//! ```
//!
//! A sub-query whose wrapper holds nothing but a single `must` entry is
//! collapsed to that entry when it sits inside another clause, so recursion
//! never produces `{bool: {must: {bool: ..}}}` chains.

use serde_json::{json, Map as JsonMap, Value as Json};
use tracing::{debug, trace};

use crate::condition::{parse_condition, Condition, ConvertConfig, Operator};
use crate::error::{QueryError, Result};
use crate::expand::expand_nested_array_exps;
use crate::filter::{query_entries, sub_queries};
use crate::op::{BasicOperator, ClauseKind, CompoundOperator};
use crate::value::Value;

/// The entries of one clause kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// A single fragment, emitted as an object.
    One(Json),
    /// Several fragments, emitted as an array.
    Many(Vec<Json>),
}

impl Clause {
    fn push(self, fragment: Json) -> Clause {
        match self {
            Clause::One(first) => Clause::Many(vec![first, fragment]),
            Clause::Many(mut fragments) => {
                fragments.push(fragment);
                Clause::Many(fragments)
            }
        }
    }

    fn into_json(self) -> Json {
        match self {
            Clause::One(fragment) => fragment,
            Clause::Many(fragments) => Json::Array(fragments),
        }
    }
}

/// Accumulates fragments into a `bool` query.
///
/// # Example
///
/// ```
/// use quarry::{BoolQuery, ClauseKind};
/// use serde_json::json;
///
/// let mut query = BoolQuery::new();
/// query.push(ClauseKind::Should, json!({ "term": { "name": "Ravel" } }));
/// query.push(ClauseKind::Should, json!({ "term": { "name": "Satie" } }));
/// assert_eq!(
///     query.into_json(),
///     json!({ "bool": {
///         "should": [{ "term": { "name": "Ravel" } }, { "term": { "name": "Satie" } }],
///         "minimum_should_match": 1
///     } })
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    must: Option<Clause>,
    should: Option<Clause>,
    must_not: Option<Clause>,
}

impl BoolQuery {
    /// Creates an empty wrapper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment under `kind`.
    pub fn push(&mut self, kind: ClauseKind, fragment: Json) {
        let slot = match kind {
            ClauseKind::Must => &mut self.must,
            ClauseKind::Should => &mut self.should,
            ClauseKind::MustNot => &mut self.must_not,
        };
        *slot = Some(match slot.take() {
            None => Clause::One(fragment),
            Some(clause) => clause.push(fragment),
        });
    }

    /// Returns `true` if nothing was appended.
    pub fn is_empty(&self) -> bool {
        self.must.is_none() && self.should.is_none() && self.must_not.is_none()
    }

    /// The `{bool: {..}}` document.
    pub fn into_json(self) -> Json {
        let mut body = JsonMap::new();
        if let Some(must) = self.must {
            body.insert(ClauseKind::Must.as_str().to_string(), must.into_json());
        }
        if let Some(should) = self.should {
            body.insert(ClauseKind::Should.as_str().to_string(), should.into_json());
            body.insert("minimum_should_match".to_string(), json!(1));
        }
        if let Some(must_not) = self.must_not {
            body.insert(ClauseKind::MustNot.as_str().to_string(), must_not.into_json());
        }
        json!({ "bool": body })
    }

    /// Like [`into_json`](Self::into_json), collapsing a lone `must` entry
    /// when inside another clause or when the entry is itself a `bool`.
    pub fn finish(self, in_bool: bool) -> Json {
        match self {
            BoolQuery {
                must: Some(Clause::One(inner)),
                should: None,
                must_not: None,
            } if inner.is_object() && (in_bool || inner.get("bool").is_some()) => {
                trace!("collapsed single must clause");
                inner
            }
            query => query.into_json(),
        }
    }
}

/// Compiles a query into a search-engine boolean query document.
///
/// `$all`/`$nin` conditions inside `$elemMatch` are expanded first, exactly
/// as [`Filter::compile`](crate::Filter::compile) does.
///
/// # Example
///
/// ```
/// use quarry::{to_search_query, ConvertConfig, Value};
/// use serde_json::json;
///
/// let query = Value::from(json!({
///     "name": { "$ne": "Debussy" },
///     "year": { "$between": [1900, 1920], "$exclusive": "max" }
/// }));
/// assert_eq!(
///     to_search_query(&query, &ConvertConfig::default()).unwrap(),
///     json!({ "bool": {
///         "must": { "range": { "year": { "gte": 1900, "lt": 1920 } } },
///         "must_not": { "term": { "name": "Debussy" } }
///     } })
/// );
/// ```
pub fn to_search_query(query: &Value, config: &ConvertConfig) -> Result<Json> {
    let expanded = expand_nested_array_exps(query);
    let document = emit(&expanded, config, "", false)?;
    debug!(keys = query.as_record().map_or(0, |q| q.len()), "converted query");
    Ok(document)
}

/// Emits one query object.
///
/// `prefix` is prepended to every field path; `in_bool` marks a sub-query
/// nested in a compound clause, which enables collapsing.
pub fn emit(query: &Value, config: &ConvertConfig, prefix: &str, in_bool: bool) -> Result<Json> {
    let entries = query_entries(query)?;
    let mut bool_query = BoolQuery::new();

    for (key, value) in entries {
        if let Some(compound) = CompoundOperator::from_token(key) {
            for sub in sub_queries(compound, value)? {
                bool_query.push(compound.clause_kind(), emit(sub, config, prefix, true)?);
            }
        } else if key.starts_with('$') {
            return Err(QueryError::MalformedQuery {
                reason: format!("'{key}' is not a compound operator"),
            });
        } else {
            let field = format!("{prefix}{key}");
            let condition = parse_condition(&field, value, config)?;
            let kind = if condition.negated {
                ClauseKind::MustNot
            } else {
                ClauseKind::Must
            };
            bool_query.push(kind, emit_condition(&field, &condition, config)?);
        }
    }

    Ok(bool_query.finish(in_bool))
}

/// The fragment for one parsed condition, ignoring negation.
pub fn emit_condition(field: &str, condition: &Condition, config: &ConvertConfig) -> Result<Json> {
    let op = match &condition.operator {
        Operator::Basic(op) => *op,
        Operator::Custom(name) => {
            let custom = config.operator(name).ok_or_else(|| QueryError::UnknownOperator {
                field: field.to_string(),
                keys: name.clone(),
            })?;
            return Ok(custom.emit(field, &condition.operand, &condition.options));
        }
    };
    let operand = &condition.operand;

    let fragment = match op {
        BasicOperator::Eq => json!({ "term": { field: operand.to_json() } }),
        BasicOperator::Exists => {
            let exists = json!({ "exists": { "field": field } });
            if operand.as_bool() == Some(false) {
                must_not(exists)
            } else {
                exists
            }
        }
        BasicOperator::In => json!({ "terms": { field: operand.to_json() } }),
        BasicOperator::All => json!({
            "terms_set": { field: {
                "terms": operand.to_json(),
                "minimum_should_match_script": { "source": "params.num_terms" }
            } }
        }),
        BasicOperator::Lt | BasicOperator::Lte | BasicOperator::Gt | BasicOperator::Gte => {
            let mut bound = JsonMap::new();
            if let Some(key) = op.range_key() {
                bound.insert(key.to_string(), operand.to_json());
            }
            json!({ "range": { field: bound } })
        }
        BasicOperator::Between => {
            let (min, max) = match operand.as_list() {
                Some([min, max]) => (min.to_json(), max.to_json()),
                _ => {
                    return Err(QueryError::InvalidOperandShape {
                        field: field.to_string(),
                        op: condition.token.clone(),
                        reason: "expected an array of exactly two values".into(),
                    })
                }
            };
            let exclusive = condition.exclusive();
            let min_key = if exclusive.min { "gt" } else { "gte" };
            let max_key = if exclusive.max { "lt" } else { "lte" };
            json!({ "range": { field: { min_key: min, max_key: max } } })
        }
        BasicOperator::Regex => {
            let (source, own_flags) = match operand {
                Value::Pattern(pattern) => (pattern.source.clone(), pattern.flags.as_str()),
                other => (other.to_text().unwrap_or_default(), ""),
            };
            let flags = condition.flags().unwrap_or(own_flags);
            json!({ "regexp": { field: text_query(source, flags.contains('i')) } })
        }
        BasicOperator::Like => {
            let value = operand.to_text().unwrap_or_default().replace('%', "*");
            json!({ "wildcard": { field: text_query(value, condition.case_insensitive()) } })
        }
        BasicOperator::Includes => {
            let value = format!("*{}*", operand.to_text().unwrap_or_default());
            json!({ "wildcard": { field: text_query(value, condition.case_insensitive()) } })
        }
        BasicOperator::Prefix => {
            let value = operand.to_text().unwrap_or_default();
            json!({ "prefix": { field: text_query(value, condition.case_insensitive()) } })
        }
        BasicOperator::Ids => json!({ "ids": { "values": operand.to_json() } }),
        BasicOperator::Empty => {
            let exists = json!({ "exists": { "field": field } });
            let blank = json!({ "term": { field: "" } });
            if operand.as_bool() == Some(false) {
                json!({ "bool": { "must": [exists, must_not(blank)] } })
            } else {
                json!({ "bool": { "should": [must_not(exists), blank] } })
            }
        }
        BasicOperator::Near => {
            let mut body = JsonMap::new();
            body.insert(field.to_string(), location_json(operand));
            body.insert("distance".to_string(), condition.max_distance(field)?.to_json());
            if let Some(kind) = condition.explicit_distance_type() {
                body.insert("distance_type".to_string(), json!(kind.as_str()));
            }
            json!({ "geo_distance": body })
        }
        BasicOperator::ElemMatch => json!({
            "nested": {
                "path": field,
                "query": emit(operand, config, &format!("{field}."), false)?
            }
        }),
    };

    Ok(fragment)
}

fn must_not(fragment: Json) -> Json {
    json!({ "bool": { "must_not": fragment } })
}

fn text_query(value: String, case_insensitive: bool) -> Json {
    if case_insensitive {
        json!({ "value": value, "case_insensitive": true })
    } else {
        json!({ "value": value })
    }
}

/// `[lon, lat]`, keeping the operand's own numbers.
fn location_json(operand: &Value) -> Json {
    match operand {
        Value::Record(map) => {
            let coordinate = |key: &str| map.get(key).map_or(Json::Null, Value::to_json);
            json!([coordinate("lon"), coordinate("lat")])
        }
        other => other.to_json(),
    }
}
