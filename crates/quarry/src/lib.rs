//! Quarry - MongoDB-style filter conditions for search engines and in-memory data.
//!
//! Quarry takes one declarative filter document and either:
//!
//! - compiles it into an Elasticsearch-style `bool` query ([`to_search_query`]), or
//! - compiles it into a predicate over in-memory records ([`make_filter`]).
//!
//! Both backends share one condition parser and one operator table, so a
//! query means the same thing in either mode.
//!
//! # Quick Start
//!
//! ```rust
//! use quarry::{make_filter, to_search_query, ConvertConfig, FilterConfig, Value};
//! use serde_json::json;
//!
//! let query = Value::from(json!({
//!     "composer": "Ravel",
//!     "year": { "$gte": 1900 },
//!     "works": { "$elemMatch": { "key": "D", "bpm": { "$lt": 100 } } }
//! }));
//!
//! let document = to_search_query(&query, &ConvertConfig::default()).unwrap();
//! assert_eq!(document["bool"]["must"][0], json!({ "term": { "composer": "Ravel" } }));
//!
//! let filter = make_filter(&query, FilterConfig::default()).unwrap();
//! let record = Value::from(json!({
//!     "composer": "Ravel",
//!     "year": 1905,
//!     "works": [{ "key": "C", "bpm": 80 }, { "key": "D", "bpm": 72 }]
//! }));
//! assert!(filter.matches(&record).unwrap());
//! ```
//!
//! # Query Documents
//!
//! A query maps field paths to conditions; sibling keys are combined with
//! `$and`. Conditions are a primitive (`$eq`), or an object holding one
//! operator plus `$`-prefixed options:
//!
//! | Operators | Meaning |
//! |-----------|---------|
//! | `$eq` `$ne` | equality, any element of an array field |
//! | `$in` `$nin` `$all` | membership |
//! | `$gt` `$gte` `$lt` `$lte` `$between` | ranges over numbers, strings and dates, with date math |
//! | `$like` `$unlike` `$includes` `$excludes` `$prefix` `$regex` | text matching |
//! | `$exists` `$empty` `$nempty` | presence |
//! | `$ids` | document identifiers |
//! | `$near` | geodistance, with `$maxDistance` and `$distanceType` |
//! | `$elemMatch` | a sub-query over the elements of an array |
//!
//! `$and`, `$or`, `$nor` and `$not` combine whole sub-queries.
//!
//! # Recursion
//!
//! Compiling and evaluating recurse once per level of compound or
//! `$elemMatch` nesting. Depth is not bounded here; callers accepting
//! untrusted queries should limit nesting before compiling.

mod coerce;
mod condition;
mod date_math;
mod emit;
mod error;
mod expand;
mod filter;
mod geo;
mod matcher;
mod op;
mod path;
mod query;
mod traverse;
mod value;

// Re-export public API
pub use coerce::{coerce_range_operands, is_date_string, primitive_equals, RangeOperands};
pub use condition::{parse_condition, Condition, ConvertConfig, CustomOperator, Exclusive, Operator};
pub use date_math::{is_date_math, parse_date_literal, parse_date_math, Clock, FixedClock, SystemClock};
pub use emit::{emit, emit_condition, to_search_query, BoolQuery, Clause};
pub use error::{CoercionError, DateMathError, QueryError, Result};
pub use expand::expand_nested_array_exps;
pub use filter::{make_filter, Filter, FilterConfig, Node};
pub use geo::{distance_miles, Distance, DistanceType, Location, EARTH_RADIUS_MILES};
pub use matcher::Matcher;
pub use op::{BasicOperator, ClauseKind, CompoundOperator, NegatedOperator};
pub use path::{resolve_path, FieldValue};
pub use query::Query;
pub use traverse::{referenced_fields, traverse, TraverseOptions, Visit};
pub use value::{Map, Number, Pattern, Timestamp, Value};
