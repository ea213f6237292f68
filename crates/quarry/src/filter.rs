//! In-memory predicate evaluation.
//!
//! A query is compiled once into a tree of [`Node`]s, then evaluated against
//! any number of records:
//!
//! ```text
//! $and  -> all children match
//! $or   -> at least one child matches
//! $nor  -> no child matches
//! $not  -> the single child does not match
//! field -> the field's condition matches
//! ```
//!
//! Sibling keys of one query object are implicitly combined with `$and`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::condition::{parse_condition, ConvertConfig};
use crate::date_math::{Clock, SystemClock};
use crate::error::{QueryError, Result};
use crate::expand::expand_nested_array_exps;
use crate::matcher::Matcher;
use crate::op::CompoundOperator;
use crate::value::{Map, Value};

/// Per-call configuration for predicate evaluation.
#[derive(Clone)]
pub struct FilterConfig {
    clock: Arc<dyn Clock + Send + Sync>,
}

impl FilterConfig {
    /// Creates a configuration reading wall-clock time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the clock used to resolve `now` in date math.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The configured clock.
    pub fn clock(&self) -> &(dyn Clock + Send + Sync) {
        self.clock.as_ref()
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for FilterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterConfig")
            .field("now", &self.clock.now())
            .finish()
    }
}

/// A compiled query node.
#[derive(Debug, Clone)]
pub enum Node {
    /// Every child matches.
    And(Vec<Node>),
    /// At least one child matches.
    Or(Vec<Node>),
    /// No child matches.
    Nor(Vec<Node>),
    /// A single field condition.
    Leaf(Matcher),
}

impl Node {
    /// Compiles a query object. `prefix` is prepended to field names in
    /// error messages.
    pub fn compile(query: &Value, prefix: &str) -> Result<Node> {
        let entries = query_entries(query)?;
        let mut children = Vec::with_capacity(entries.len());

        for (key, value) in entries {
            if let Some(compound) = CompoundOperator::from_token(key) {
                let queries = sub_queries(compound, value)?;
                let nodes = queries
                    .into_iter()
                    .map(|q| Node::compile(q, prefix))
                    .collect::<Result<Vec<_>>>()?;
                children.push(match compound {
                    CompoundOperator::And => Node::And(nodes),
                    CompoundOperator::Or => Node::Or(nodes),
                    CompoundOperator::Nor | CompoundOperator::Not => Node::Nor(nodes),
                });
            } else if key.starts_with('$') {
                return Err(QueryError::MalformedQuery {
                    reason: format!("'{key}' is not a compound operator"),
                });
            } else {
                let field = format!("{prefix}{key}");
                let condition = parse_condition(&field, value, &ConvertConfig::default())?;
                children.push(Node::Leaf(Matcher::compile(prefix, key, &condition)?));
            }
        }

        Ok(match children.len() {
            1 => children.remove(0),
            _ => Node::And(children),
        })
    }

    /// Evaluates this node against a record.
    pub fn matches(&self, record: &Value, clock: &dyn Clock) -> Result<bool> {
        match self {
            Node::And(children) => {
                for child in children {
                    if !child.matches(record, clock)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Node::Or(children) => {
                for child in children {
                    if child.matches(record, clock)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Node::Nor(children) => {
                for child in children {
                    if child.matches(record, clock)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Node::Leaf(matcher) => matcher.matches(record, clock),
        }
    }
}

/// The entries of a query object, which must be a non-empty mapping.
pub(crate) fn query_entries(query: &Value) -> Result<&Map> {
    match query {
        Value::Record(entries) if !entries.is_empty() => Ok(entries),
        Value::Record(_) => Err(QueryError::MalformedQuery {
            reason: "query must not be empty".into(),
        }),
        other => Err(QueryError::MalformedQuery {
            reason: format!("query must be an object, got {}", other.type_name()),
        }),
    }
}

/// The sub-queries of a compound operator.
///
/// `$and`, `$or` and `$nor` take a non-empty list of query objects (a single
/// object is accepted too); `$not` takes one query object.
pub(crate) fn sub_queries(compound: CompoundOperator, operand: &Value) -> Result<Vec<&Value>> {
    match (compound, operand) {
        // a list under `$not` negates each entry, like `$nor`
        (_, Value::Record(_)) => Ok(vec![operand]),
        (_, Value::List(items)) if items.is_empty() => Err(QueryError::MalformedQuery {
            reason: format!("'{}' expects a non-empty array of queries", compound.as_str()),
        }),
        (_, Value::List(items)) => {
            if let Some(bad) = items.iter().find(|q| q.as_record().is_none()) {
                return Err(QueryError::MalformedQuery {
                    reason: format!("'{}' expects query objects, got {}", compound.as_str(), bad.type_name()),
                });
            }
            Ok(items.iter().collect())
        }
        (_, other) => Err(QueryError::MalformedQuery {
            reason: format!("'{}' expects an array of queries, got {}", compound.as_str(), other.type_name()),
        }),
    }
}

/// A compiled in-memory predicate.
///
/// # Example
///
/// ```
/// use quarry::{Filter, Value};
/// use serde_json::json;
///
/// let filter = Filter::new(&Value::from(json!({
///     "composer": { "$in": ["Debussy", "Ravel"] },
///     "year": { "$gte": 1900 }
/// })))
/// .unwrap();
///
/// let records: Vec<Value> = vec![
///     json!({ "composer": "Debussy", "year": 1905 }).into(),
///     json!({ "composer": "Ravel", "year": 1899 }).into(),
///     json!({ "composer": "Satie", "year": 1917 }).into(),
/// ];
/// assert_eq!(filter.count(&records).unwrap(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Filter {
    root: Node,
    config: FilterConfig,
}

impl Filter {
    /// Compiles a query with the default configuration.
    pub fn new(query: &Value) -> Result<Filter> {
        Filter::compile(query, FilterConfig::default())
    }

    /// Compiles a query.
    ///
    /// `$all`/`$nin` inside `$elemMatch` are expanded first, so they test
    /// across elements rather than within one.
    pub fn compile(query: &Value, config: FilterConfig) -> Result<Filter> {
        let expanded = expand_nested_array_exps(query);
        let root = Node::compile(&expanded, "")?;
        debug!(keys = query.as_record().map_or(0, |q| q.len()), "compiled filter");
        Ok(Filter { root, config })
    }

    /// The compiled root node.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Tests a single record.
    pub fn matches(&self, record: &Value) -> Result<bool> {
        self.root.matches(record, self.config.clock())
    }

    /// Tests any serializable record, converting it through `serde_json`.
    pub fn matches_serialized<T: Serialize + ?Sized>(&self, record: &T) -> Result<bool> {
        let json = serde_json::to_value(record)?;
        self.matches(&Value::from(json))
    }

    /// Filters a slice, returning references to matching records.
    pub fn filter<'a>(&self, records: &'a [Value]) -> Result<Vec<&'a Value>> {
        let mut results = Vec::new();
        for record in records {
            if self.matches(record)? {
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Counts the number of matching records.
    pub fn count(&self, records: &[Value]) -> Result<usize> {
        Ok(self.filter(records)?.len())
    }

    /// Finds the first matching record.
    pub fn find<'a>(&self, records: &'a [Value]) -> Result<Option<&'a Value>> {
        for record in records {
            if self.matches(record)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Returns `true` if any record matches.
    pub fn any(&self, records: &[Value]) -> Result<bool> {
        Ok(self.find(records)?.is_some())
    }

    /// Returns `true` if all records match.
    pub fn all(&self, records: &[Value]) -> Result<bool> {
        for record in records {
            if !self.matches(record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Borrows this filter as a plain predicate function.
    pub fn as_predicate(&self) -> impl Fn(&Value) -> Result<bool> + '_ {
        move |record| self.matches(record)
    }
}

/// Compiles a query into an in-memory predicate.
///
/// Structural errors (malformed queries, operand shapes, invalid regexes and
/// distances) are reported here; coercion and `$elemMatch` type errors are
/// reported when a record is tested.
pub fn make_filter(query: &Value, config: FilterConfig) -> Result<Filter> {
    Filter::compile(query, config)
}
