//! Condition parsing.
//!
//! A condition is the value attached to a field in a query. It is either a
//! primitive (shorthand for `$eq`, or `$regex` for a pattern) or an object
//! holding exactly one operator key plus any number of `$`-prefixed option
//! keys:
//!
//! ```text
//! { "name": "Ravel" }
//! { "name": { "$like": "Ra*", "$caseInsensitive": true } }
//! { "year": { "$between": [1900, 1920], "$exclusive": "max" } }
//! ```
//!
//! Parsing validates the operand shape for every built-in operator, so both
//! backends reject the same malformed queries.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{QueryError, Result};
use crate::geo::{Distance, DistanceType, Location};
use crate::op::{
    BasicOperator, NegatedOperator, CASE_INSENSITIVE, DISTANCE_TYPE, EXCLUSIVE, MAX_DISTANCE, OPTIONS,
};
use crate::value::{Map, Value};

/// Emitter for a caller-defined operator.
///
/// Receives the resolved field path, the operand and the condition's option
/// keys (with their `$` prefix), and returns the query fragment verbatim.
/// Implemented for any `Fn(&str, &Value, &Map) -> serde_json::Value`.
pub trait CustomOperator: Send + Sync {
    /// Builds the query fragment for one condition.
    fn emit(&self, field: &str, operand: &Value, options: &Map) -> serde_json::Value;
}

impl<F> CustomOperator for F
where
    F: Fn(&str, &Value, &Map) -> serde_json::Value + Send + Sync,
{
    fn emit(&self, field: &str, operand: &Value, options: &Map) -> serde_json::Value {
        self(field, operand, options)
    }
}

/// Per-call configuration for query emission.
///
/// # Example
///
/// ```
/// use quarry::{to_search_query, ConvertConfig, Value};
/// use serde_json::json;
///
/// let config = ConvertConfig::new()
///     .with_operator("$match", |field: &str, operand: &Value, _: &quarry::Map| {
///         json!({ "match": { field: operand.to_json() } })
///     })
///     .unwrap();
///
/// let query = Value::from(json!({ "title": { "$match": "clair de lune" } }));
/// let doc = to_search_query(&query, &config).unwrap();
/// assert_eq!(doc, json!({ "bool": { "must": { "match": { "title": "clair de lune" } } } }));
/// ```
#[derive(Clone, Default)]
pub struct ConvertConfig {
    operators: IndexMap<String, Arc<dyn CustomOperator>>,
}

impl ConvertConfig {
    /// Creates a configuration with no custom operators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom operator, overriding any built-in of the same name.
    ///
    /// Returns [`QueryError::InvalidOperatorName`] unless `name` starts with `$`.
    pub fn with_operator(mut self, name: impl Into<String>, operator: impl CustomOperator + 'static) -> Result<Self> {
        let name = name.into();
        if !name.starts_with('$') {
            return Err(QueryError::InvalidOperatorName(name));
        }
        self.operators.insert(name, Arc::new(operator));
        Ok(self)
    }

    /// Looks up a custom operator by token.
    pub fn operator(&self, name: &str) -> Option<&dyn CustomOperator> {
        self.operators.get(name).map(|op| op.as_ref())
    }

    /// Returns `true` if a custom operator is registered under `name`.
    pub fn has_operator(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }
}

impl fmt::Debug for ConvertConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertConfig")
            .field("operators", &self.operators.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The operator of a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// A built-in operator.
    Basic(BasicOperator),
    /// A caller-registered operator, by token.
    Custom(String),
}

/// Bound strictness for `$between`, from the `$exclusive` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exclusive {
    /// Lower bound is strict.
    pub min: bool,
    /// Upper bound is strict.
    pub max: bool,
}

/// One field's parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// The resolved operator; negated spellings resolve to their positive form.
    pub operator: Operator,
    /// The operator key as written, e.g. `$ne`.
    pub token: String,
    /// The operand.
    pub operand: Value,
    /// Every other `$` key of the condition object.
    pub options: Map,
    /// Whether the written operator was a negated spelling.
    pub negated: bool,
}

impl Condition {
    /// The built-in operator, if this is not a custom condition.
    pub fn basic(&self) -> Option<BasicOperator> {
        match self.operator {
            Operator::Basic(op) => Some(op),
            Operator::Custom(_) => None,
        }
    }

    /// The `$options` flag string, if any.
    pub fn flags(&self) -> Option<&str> {
        self.options.get(OPTIONS).and_then(Value::as_str)
    }

    /// Case-insensitivity for text operators.
    ///
    /// Enabled by `$caseInsensitive: true` or an `i` in `$options`.
    pub fn case_insensitive(&self) -> bool {
        self.options.get(CASE_INSENSITIVE).and_then(Value::as_bool) == Some(true)
            || self.flags().is_some_and(|flags| flags.contains('i'))
    }

    /// Bound strictness for `$between`.
    pub fn exclusive(&self) -> Exclusive {
        match self.options.get(EXCLUSIVE) {
            Some(Value::Bool(true)) => Exclusive { min: true, max: true },
            Some(Value::Text(s)) if s == "min" => Exclusive { min: true, max: false },
            Some(Value::Text(s)) if s == "max" => Exclusive { min: false, max: true },
            _ => Exclusive::default(),
        }
    }

    /// The `$near` distance computation.
    pub fn distance_type(&self) -> DistanceType {
        self.options
            .get(DISTANCE_TYPE)
            .and_then(Value::as_str)
            .and_then(DistanceType::parse)
            .unwrap_or_default()
    }

    /// The explicit `$distanceType`, when one was given.
    pub fn explicit_distance_type(&self) -> Option<DistanceType> {
        self.options
            .get(DISTANCE_TYPE)
            .and_then(Value::as_str)
            .and_then(DistanceType::parse)
    }

    /// The validated `$maxDistance` for `$near`.
    pub fn max_distance(&self, field: &str) -> Result<Distance> {
        let raw = self.options.get(MAX_DISTANCE).ok_or_else(|| QueryError::InvalidOperandShape {
            field: field.to_string(),
            op: self.token.clone(),
            reason: "'$maxDistance' is required".into(),
        })?;
        Distance::parse(raw)
    }
}

/// Parses one field's condition.
///
/// Operator keys resolve in order: custom operators from `config`, then
/// negated spellings, then built-ins. Any other `$` key is an option.
///
/// # Errors
///
/// - [`QueryError::MalformedCondition`] for lists, empty objects, or keys
///   without a `$`.
/// - [`QueryError::TooManyOperators`] when two operator keys appear.
/// - [`QueryError::UnknownOperator`] when no operator key appears.
/// - [`QueryError::InvalidOperandShape`] when a built-in operand or option is
///   the wrong shape.
pub fn parse_condition(field: &str, raw: &Value, config: &ConvertConfig) -> Result<Condition> {
    let entries = match raw {
        Value::Record(entries) => entries,
        Value::List(_) => {
            return Err(QueryError::MalformedCondition {
                field: field.to_string(),
                reason: "expected a primitive value or a condition object, got an array".into(),
            })
        }
        Value::Pattern(_) => return shorthand(field, BasicOperator::Regex, raw),
        _ => return shorthand(field, BasicOperator::Eq, raw),
    };

    if entries.is_empty() {
        return Err(QueryError::MalformedCondition {
            field: field.to_string(),
            reason: "condition object is empty".into(),
        });
    }

    let mut found: Option<(Operator, &str, &Value, bool)> = None;
    let mut options = Map::new();

    for (key, value) in entries {
        if !key.starts_with('$') {
            return Err(QueryError::MalformedCondition {
                field: field.to_string(),
                reason: format!("unexpected key '{key}', condition keys must start with '$'"),
            });
        }

        let resolved = if config.has_operator(key) {
            Some((Operator::Custom(key.clone()), false))
        } else if let Some(negated) = NegatedOperator::from_token(key) {
            Some((Operator::Basic(negated.positive()), true))
        } else {
            BasicOperator::from_token(key).map(|op| (Operator::Basic(op), false))
        };

        let Some((operator, negated)) = resolved else {
            options.insert(key.clone(), value.clone());
            continue;
        };
        if let Some((_, first, _, _)) = &found {
            return Err(QueryError::TooManyOperators {
                field: field.to_string(),
                first: first.to_string(),
                second: key.clone(),
            });
        }
        found = Some((operator, key.as_str(), value, negated));
    }

    let Some((operator, token, operand, negated)) = found else {
        return Err(QueryError::UnknownOperator {
            field: field.to_string(),
            keys: entries.keys().cloned().collect::<Vec<_>>().join(", "),
        });
    };

    let condition = Condition {
        operator,
        token: token.to_string(),
        operand: operand.clone(),
        options,
        negated,
    };

    if let Some(op) = condition.basic() {
        validate(field, op, &condition)?;
    }

    Ok(condition)
}

fn shorthand(field: &str, op: BasicOperator, raw: &Value) -> Result<Condition> {
    let condition = Condition {
        operator: Operator::Basic(op),
        token: op.as_str().to_string(),
        operand: raw.clone(),
        options: Map::new(),
        negated: false,
    };
    validate(field, op, &condition)?;
    Ok(condition)
}

fn validate(field: &str, op: BasicOperator, condition: &Condition) -> Result<()> {
    let invalid = |reason: String| QueryError::InvalidOperandShape {
        field: field.to_string(),
        op: condition.token.clone(),
        reason,
    };
    let operand = &condition.operand;

    match op {
        BasicOperator::Eq => {
            if let Value::Pattern(_) = operand {
                return Err(invalid("use '$regex' to match a pattern".into()));
            }
        }
        BasicOperator::In | BasicOperator::All => {
            if operand.as_list().is_none() {
                return Err(invalid(format!("expected an array, got {}", operand.type_name())));
            }
        }
        BasicOperator::Ids => {
            let ids = operand
                .as_list()
                .ok_or_else(|| invalid(format!("expected an array, got {}", operand.type_name())))?;
            if let Some(bad) = ids.iter().find(|id| !matches!(id, Value::Text(_) | Value::Number(_))) {
                return Err(invalid(format!("ids must be strings or numbers, got {}", bad.type_name())));
            }
        }
        BasicOperator::Between => {
            let bounds = operand.as_list().filter(|items| items.len() == 2).ok_or_else(|| {
                invalid("expected an array of exactly two values".into())
            })?;
            for bound in bounds {
                require_range_operand(bound, &invalid)?;
            }
        }
        BasicOperator::Lt | BasicOperator::Lte | BasicOperator::Gt | BasicOperator::Gte => {
            require_range_operand(operand, &invalid)?;
        }
        BasicOperator::Exists | BasicOperator::Empty => {
            if operand.as_bool().is_none() {
                return Err(invalid(format!("expected a boolean, got {}", operand.type_name())));
            }
        }
        BasicOperator::Regex => {
            if !matches!(operand, Value::Text(_) | Value::Pattern(_)) {
                return Err(invalid(format!("expected a string or pattern, got {}", operand.type_name())));
            }
        }
        BasicOperator::Like | BasicOperator::Includes | BasicOperator::Prefix => {
            if !matches!(operand, Value::Text(_) | Value::Number(_)) {
                return Err(invalid(format!("expected a string, got {}", operand.type_name())));
            }
        }
        BasicOperator::Near => {
            if Location::from_value(operand).is_none() {
                return Err(invalid("expected a location as [lon, lat] or {lon, lat}".into()));
            }
            condition.max_distance(field)?;
            if let Some(kind) = condition.options.get(DISTANCE_TYPE) {
                if kind.as_str().and_then(DistanceType::parse).is_none() {
                    return Err(invalid("'$distanceType' must be 'arc' or 'plane'".into()));
                }
            }
        }
        BasicOperator::ElemMatch => {
            if !operand.as_record().is_some_and(|query| !query.is_empty()) {
                return Err(invalid("expected a non-empty query object".into()));
            }
        }
    }

    if let Some(exclusive) = condition.options.get(EXCLUSIVE) {
        let valid = match exclusive {
            Value::Bool(_) => true,
            Value::Text(s) => s == "min" || s == "max",
            _ => false,
        };
        if !valid {
            return Err(invalid("'$exclusive' must be true, false, 'min' or 'max'".into()));
        }
    }
    if let Some(flag) = condition.options.get(CASE_INSENSITIVE) {
        if flag.as_bool().is_none() {
            return Err(invalid("'$caseInsensitive' must be a boolean".into()));
        }
    }
    if let Some(flags) = condition.options.get(OPTIONS) {
        if flags.as_str().is_none() {
            return Err(invalid("'$options' must be a string of flags".into()));
        }
    }

    Ok(())
}

fn require_range_operand(value: &Value, invalid: &dyn Fn(String) -> QueryError) -> Result<()> {
    match value {
        Value::Number(_) | Value::Text(_) | Value::Temporal(_) => Ok(()),
        other => Err(invalid(format!("expected a number, string or date, got {}", other.type_name()))),
    }
}
