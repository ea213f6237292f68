//! Fluent query builder.
//!
//! The [`Query`] struct builds the same query documents callers would
//! otherwise write by hand, and hands them to either backend.

use crate::condition::ConvertConfig;
use crate::error::Result;
use crate::filter::{Filter, FilterConfig};
use crate::geo::{DistanceType, Location};
use crate::op::{CASE_INSENSITIVE, DISTANCE_TYPE, EXCLUSIVE, MAX_DISTANCE};
use crate::value::{Map, Pattern, Value};

/// A query document under construction.
///
/// Every field method adds one condition; sibling conditions are implicitly
/// combined with `$and`. Adding a second condition on a field that already
/// has one moves both into an explicit `$and`, so neither is lost.
///
/// # Example
///
/// ```
/// use quarry::{Query, Value};
/// use serde_json::json;
///
/// let query = Query::new()
///     .eq("composer", "Ravel")
///     .gte("year", 1900)
///     .lt("year", 1930)
///     .or([Query::new().like_ci("title", "bol%"), Query::new().includes("title", "valse")])
///     .build();
///
/// assert_eq!(
///     query,
///     Value::from(json!({
///         "composer": { "$eq": "Ravel" },
///         "$and": [{ "year": { "$gte": 1900 } }, { "year": { "$lt": 1930 } }],
///         "$or": [
///             { "title": { "$like": "bol%", "$caseInsensitive": true } },
///             { "title": { "$includes": "valse" } }
///         ]
///     }))
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    entries: Map,
}

impl Query {
    /// Creates an empty query.
    ///
    /// An empty query is rejected by both backends; add at least one condition.
    pub fn new() -> Self {
        Query::default()
    }

    // ========================================================================
    // Generic condition builders
    // ========================================================================

    /// Adds `{field: {op: operand}}`.
    pub fn condition(self, field: &str, op: &str, operand: impl Into<Value>) -> Self {
        self.condition_with(field, op, operand, Map::new())
    }

    /// Adds `{field: {op: operand, ..options}}`.
    ///
    /// Option keys keep their `$` prefix, e.g. `$caseInsensitive`.
    pub fn condition_with(mut self, field: &str, op: &str, operand: impl Into<Value>, options: Map) -> Self {
        let mut condition = Map::new();
        condition.insert(op.to_string(), operand.into());
        condition.extend(options);
        self.push_field(field, Value::Record(condition));
        self
    }

    // ========================================================================
    // Equality and membership
    // ========================================================================

    /// `$eq`
    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, "$eq", value)
    }

    /// `$ne`
    pub fn ne(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, "$ne", value)
    }

    /// `$in`: the field equals any of `values`.
    pub fn in_set<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.condition(field, "$in", list(values))
    }

    /// `$nin`: the field equals none of `values`.
    pub fn not_in<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.condition(field, "$nin", list(values))
    }

    /// `$all`: every one of `values` appears in the field.
    pub fn contains_all<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.condition(field, "$all", list(values))
    }

    /// `$ids`
    pub fn ids<I, V>(self, field: &str, ids: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.condition(field, "$ids", list(ids))
    }

    /// `$exists`
    pub fn exists(self, field: &str, exists: bool) -> Self {
        self.condition(field, "$exists", exists)
    }

    /// `$empty`
    pub fn empty(self, field: &str, empty: bool) -> Self {
        self.condition(field, "$empty", empty)
    }

    // ========================================================================
    // Ranges
    // ========================================================================

    /// `$gt`
    pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, "$gt", value)
    }

    /// `$gte`
    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, "$gte", value)
    }

    /// `$lt`
    pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, "$lt", value)
    }

    /// `$lte`
    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, "$lte", value)
    }

    /// `$between`, both bounds inclusive.
    pub fn between(self, field: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        self.condition(field, "$between", Value::List(vec![min.into(), max.into()]))
    }

    /// `$between` with `$exclusive`: `true`, `"min"` or `"max"`.
    pub fn between_exclusive(
        self,
        field: &str,
        min: impl Into<Value>,
        max: impl Into<Value>,
        exclusive: impl Into<Value>,
    ) -> Self {
        let options = Map::from_iter([(EXCLUSIVE.to_string(), exclusive.into())]);
        self.condition_with(field, "$between", Value::List(vec![min.into(), max.into()]), options)
    }

    // ========================================================================
    // Text
    // ========================================================================

    /// `$like`: `*`/`%` match any run, `?` any one character.
    pub fn like(self, field: &str, pattern: &str) -> Self {
        self.condition(field, "$like", pattern)
    }

    /// Case-insensitive `$like`.
    pub fn like_ci(self, field: &str, pattern: &str) -> Self {
        self.condition_with(field, "$like", pattern, case_insensitive())
    }

    /// `$unlike`
    pub fn unlike(self, field: &str, pattern: &str) -> Self {
        self.condition(field, "$unlike", pattern)
    }

    /// `$includes`: substring match.
    pub fn includes(self, field: &str, needle: &str) -> Self {
        self.condition(field, "$includes", needle)
    }

    /// Case-insensitive `$includes`.
    pub fn includes_ci(self, field: &str, needle: &str) -> Self {
        self.condition_with(field, "$includes", needle, case_insensitive())
    }

    /// `$excludes`
    pub fn excludes(self, field: &str, needle: &str) -> Self {
        self.condition(field, "$excludes", needle)
    }

    /// `$prefix`
    pub fn prefix(self, field: &str, prefix: &str) -> Self {
        self.condition(field, "$prefix", prefix)
    }

    /// Case-insensitive `$prefix`.
    pub fn prefix_ci(self, field: &str, prefix: &str) -> Self {
        self.condition_with(field, "$prefix", prefix, case_insensitive())
    }

    /// `$regex`
    pub fn regex(self, field: &str, pattern: Pattern) -> Self {
        self.condition(field, "$regex", pattern)
    }

    // ========================================================================
    // Geo and nested
    // ========================================================================

    /// `$near` with great-circle distance.
    ///
    /// A bare number for `max_distance` is a multiple of the Earth's radius,
    /// not miles; pass `"10mi"` or `"16km"` for a unit distance.
    pub fn near(self, field: &str, location: Location, max_distance: impl Into<Value>) -> Self {
        let options = Map::from_iter([(MAX_DISTANCE.to_string(), max_distance.into())]);
        self.condition_with(field, "$near", location_value(location), options)
    }

    /// `$near` with an explicit `$distanceType`.
    pub fn near_with(
        self,
        field: &str,
        location: Location,
        max_distance: impl Into<Value>,
        distance_type: DistanceType,
    ) -> Self {
        let options = Map::from_iter([
            (MAX_DISTANCE.to_string(), max_distance.into()),
            (DISTANCE_TYPE.to_string(), Value::from(distance_type.as_str())),
        ]);
        self.condition_with(field, "$near", location_value(location), options)
    }

    /// `$elemMatch`: some element of the array field matches `query`.
    pub fn elem_match(self, field: &str, query: Query) -> Self {
        self.condition(field, "$elemMatch", query.build())
    }

    // ========================================================================
    // Compound builders
    // ========================================================================

    /// `$and` over sub-queries.
    pub fn and(mut self, queries: impl IntoIterator<Item = Query>) -> Self {
        self.push_all("$and", queries);
        self
    }

    /// `$or` over sub-queries.
    ///
    /// A second `$or` on the same query is combined with the first through
    /// `$and`.
    pub fn or(mut self, queries: impl IntoIterator<Item = Query>) -> Self {
        let queries = list(queries.into_iter().map(Query::build));
        match self.entries.shift_remove("$or") {
            Some(previous) => {
                let first = record("$or", previous);
                let second = record("$or", queries);
                self.push_all("$and", [first, second]);
            }
            None => {
                self.entries.insert("$or".to_string(), queries);
            }
        }
        self
    }

    /// `$nor` over sub-queries.
    pub fn nor(mut self, queries: impl IntoIterator<Item = Query>) -> Self {
        self.push_all("$nor", queries);
        self
    }

    /// `$not` of a sub-query.
    pub fn not(mut self, query: Query) -> Self {
        if self.entries.contains_key("$not") {
            self.push_all("$nor", [query]);
        } else {
            self.entries.insert("$not".to_string(), query.build());
        }
        self
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Returns `true` if no condition was added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The query document.
    pub fn build(self) -> Value {
        Value::Record(self.entries)
    }

    /// Emits the search-engine query for this document.
    pub fn to_search_query(&self, config: &ConvertConfig) -> Result<serde_json::Value> {
        crate::emit::to_search_query(&self.clone().build(), config)
    }

    /// Compiles this document into an in-memory predicate.
    pub fn to_filter(&self, config: FilterConfig) -> Result<Filter> {
        Filter::compile(&self.clone().build(), config)
    }

    fn push_field(&mut self, field: &str, condition: Value) {
        match self.entries.shift_remove(field) {
            Some(previous) => {
                let first = record(field, previous);
                let second = record(field, condition);
                self.push_all("$and", [first, second]);
            }
            None => {
                self.entries.insert(field.to_string(), condition);
            }
        }
    }

    fn push_all<Q: Into<Value>>(&mut self, key: &str, queries: impl IntoIterator<Item = Q>) {
        let queries = queries.into_iter().map(Into::into);
        match self.entries.get_mut(key) {
            Some(Value::List(existing)) => existing.extend(queries),
            Some(single) => {
                let mut items = vec![std::mem::take(single)];
                items.extend(queries);
                *single = Value::List(items);
            }
            None => {
                self.entries.insert(key.to_string(), Value::List(queries.collect()));
            }
        }
    }
}

impl From<Query> for Value {
    fn from(query: Query) -> Self {
        query.build()
    }
}

fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Value {
    Value::List(values.into_iter().map(Into::into).collect())
}

fn record(key: &str, value: Value) -> Value {
    Value::Record(Map::from_iter([(key.to_string(), value)]))
}

fn case_insensitive() -> Map {
    Map::from_iter([(CASE_INSENSITIVE.to_string(), Value::Bool(true))])
}

fn location_value(location: Location) -> Value {
    Value::List(vec![Value::from(location.lon), Value::from(location.lat)])
}
