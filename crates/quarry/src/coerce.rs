//! Operand coercion.
//!
//! Range operators compare a field value with a filter operand only after
//! both have been brought to the same kind, either numbers (dates become
//! epoch milliseconds) or strings. Equality operators use the narrower
//! primitive rule in [`primitive_equals`]. Booleans are never coerced.

use std::cmp::Ordering;

use crate::date_math::{is_date_math, parse_date_literal, parse_date_math, Clock};
use crate::error::CoercionError;
use crate::value::{Number, Value};

/// Field value and filter operand coerced to a common kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeOperands {
    /// Both sides are numbers or epoch milliseconds.
    Numbers(f64, f64),
    /// Both sides are strings, compared lexicographically.
    Texts(String, String),
}

impl RangeOperands {
    /// Orders the field side relative to the filter side.
    ///
    /// Returns `None` when either number is NaN.
    pub fn ordering(&self) -> Option<Ordering> {
        match self {
            RangeOperands::Numbers(a, b) => a.partial_cmp(b),
            RangeOperands::Texts(a, b) => Some(a.cmp(b)),
        }
    }
}

#[derive(Debug)]
enum Side {
    Number(f64),
    Text(String),
}

/// Returns `true` for strings that read as a calendar date.
///
/// The string must contain a `-` after its first character and parse as a
/// date literal, so plain or negative numbers never qualify.
pub fn is_date_string(s: &str) -> bool {
    date_string_millis(s).is_some()
}

fn date_string_millis(s: &str) -> Option<f64> {
    if !s.find('-').is_some_and(|i| i > 0) {
        return None;
    }
    parse_date_literal(s).map(|dt| dt.timestamp_millis() as f64)
}

fn boolean_error(field: &Value, filter: &Value) -> CoercionError {
    CoercionError::Boolean {
        field: field.type_name(),
        operand: filter.type_name(),
    }
}

fn coerce_field(value: &Value) -> Result<Side, CoercionError> {
    match value {
        Value::Number(n) => Ok(Side::Number(n.to_f64())),
        Value::Temporal(t) => Ok(Side::Number(t.as_millis() as f64)),
        Value::Text(s) => Ok(match date_string_millis(s) {
            Some(millis) => Side::Number(millis),
            None => Side::Text(s.clone()),
        }),
        other => Err(CoercionError::Unsupported(other.type_name())),
    }
}

fn coerce_filter(value: &Value, clock: &dyn Clock) -> Result<Side, CoercionError> {
    match value {
        Value::Number(n) => Ok(Side::Number(n.to_f64())),
        Value::Temporal(t) => Ok(Side::Number(t.as_millis() as f64)),
        Value::Text(s) if is_date_math(s) => parse_date_math(s, clock)
            .map(|t| Side::Number(t.as_millis() as f64))
            .map_err(|source| CoercionError::DateMath {
                expr: s.clone(),
                source,
            }),
        Value::Text(s) => Ok(Side::Text(s.clone())),
        other => Err(CoercionError::Unsupported(other.type_name())),
    }
}

/// Coerces a field value and a range filter operand to a common kind.
///
/// - Numbers stay numbers; temporal values become epoch milliseconds.
/// - A field string that reads as a calendar date becomes epoch milliseconds.
/// - A filter string that is date math is evaluated against `clock`.
/// - A numeric field against a text filter promotes the filter: a date
///   string becomes epoch milliseconds, anything else must parse as a number.
/// - A text field against a numeric filter compares as text; temporal and
///   date math filters are written as epoch milliseconds.
///
/// # Example
///
/// ```
/// use quarry::{coerce_range_operands, RangeOperands, SystemClock, Value};
///
/// let pair = coerce_range_operands(&Value::from(10), &Value::from("5"), &SystemClock).unwrap();
/// assert_eq!(pair, RangeOperands::Numbers(10.0, 5.0));
///
/// let pair = coerce_range_operands(&Value::from("10"), &Value::from(5), &SystemClock).unwrap();
/// assert_eq!(pair, RangeOperands::Texts("10".into(), "5".into()));
/// ```
pub fn coerce_range_operands(
    field: &Value,
    filter: &Value,
    clock: &dyn Clock,
) -> Result<RangeOperands, CoercionError> {
    if matches!(field, Value::Bool(_)) || matches!(filter, Value::Bool(_)) {
        return Err(boolean_error(field, filter));
    }

    match (coerce_field(field)?, coerce_filter(filter, clock)?) {
        (Side::Number(a), Side::Number(b)) => Ok(RangeOperands::Numbers(a, b)),
        (Side::Text(a), Side::Text(b)) => Ok(RangeOperands::Texts(a, b)),
        (Side::Number(a), Side::Text(b)) => {
            if let Some(millis) = date_string_millis(&b) {
                return Ok(RangeOperands::Numbers(a, millis));
            }
            match Number::parse(&b) {
                Some(n) => Ok(RangeOperands::Numbers(a, n.to_f64())),
                None => Err(CoercionError::NotANumber(b)),
            }
        }
        (Side::Text(a), Side::Number(_)) => {
            let b = match filter {
                Value::Number(n) => n.to_string(),
                Value::Temporal(t) => t.as_millis().to_string(),
                // date math resolved to milliseconds
                _ => match coerce_filter(filter, clock)? {
                    Side::Number(millis) => Number::F64(millis).to_string(),
                    Side::Text(s) => s,
                },
            };
            Ok(RangeOperands::Texts(a, b))
        }
    }
}

/// Equality under the primitive coercion rule used by `$eq`, `$in` and `$all`.
///
/// - A string field stringifies the operand.
/// - A numeric field numberifies the operand; unparseable strings are unequal.
/// - A boolean field requires a boolean operand, and a boolean operand
///   requires a boolean field.
/// - A null operand equals only a null field value.
/// - Lists and records compare structurally.
pub fn primitive_equals(field: &Value, operand: &Value) -> Result<bool, CoercionError> {
    match (field, operand) {
        (_, Value::Null) | (Value::Null, _) => Ok(field.is_null() && operand.is_null()),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Bool(_), _) | (_, Value::Bool(_)) => Err(boolean_error(field, operand)),
        (Value::Text(s), Value::Text(o)) => Ok(s == o),
        (Value::Text(s), Value::Temporal(t)) => Ok(parse_date_literal(s)
            .map(|dt| dt.timestamp_millis() == t.as_millis())
            .unwrap_or(false)),
        (Value::Text(s), other) => Ok(other.to_text().is_some_and(|o| *s == o)),
        (Value::Number(n), Value::Number(o)) => Ok(n.compare(*o) == Some(Ordering::Equal)),
        (Value::Number(n), Value::Text(o)) => {
            Ok(Number::parse(o).is_some_and(|o| n.compare(o) == Some(Ordering::Equal)))
        }
        (Value::Number(n), Value::Temporal(t)) => Ok(n.to_f64() == t.as_millis() as f64),
        (Value::Temporal(t), Value::Temporal(o)) => Ok(t == o),
        (Value::Temporal(t), Value::Text(o)) => Ok(parse_date_literal(o)
            .map(|dt| dt.timestamp_millis() == t.as_millis())
            .unwrap_or(false)),
        (Value::Temporal(t), Value::Number(o)) => Ok(t.as_millis() as f64 == o.to_f64()),
        _ => Ok(field == operand),
    }
}
