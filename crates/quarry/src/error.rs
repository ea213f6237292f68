//! Error types for the quarry crate.

use thiserror::Error;

/// Errors that can occur when compiling or evaluating queries.
///
/// Every variant that originates from a single leaf condition carries the
/// resolved field path and the operator token so the offending clause can be
/// found in a large query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A query node is not a non-empty mapping, or a compound operand is
    /// not shaped like a list of sub-queries.
    #[error("malformed query: {reason}")]
    MalformedQuery { reason: String },

    /// A field's value is neither a primitive nor a well-formed condition object.
    #[error("malformed condition for field '{field}': {reason}")]
    MalformedCondition { field: String, reason: String },

    /// A condition object names more than one operator.
    #[error("too many operators for field '{field}': '{first}' and '{second}'")]
    TooManyOperators {
        field: String,
        first: String,
        second: String,
    },

    /// A condition object names no recognized operator.
    #[error("unknown operator for field '{field}': {keys}")]
    UnknownOperator { field: String, keys: String },

    /// The operand (or a required option) has the wrong shape for the operator.
    #[error("invalid operand for '{op}' on field '{field}': {reason}")]
    InvalidOperandShape {
        field: String,
        op: String,
        reason: String,
    },

    /// Field and filter values cannot be brought to a comparable type.
    #[error("cannot evaluate '{op}' on field '{field}': {source}")]
    CoercionFailure {
        field: String,
        op: String,
        #[source]
        source: CoercionError,
    },

    /// A date math expression could not be parsed.
    #[error("invalid date math expression '{expr}': {source}")]
    InvalidDateMath {
        expr: String,
        #[source]
        source: DateMathError,
    },

    /// A `$maxDistance` value could not be parsed.
    #[error("invalid distance '{0}', expected a number or '<number><mi|miles|km|kilometers>'")]
    InvalidDistance(String),

    /// `$elemMatch` was applied to a field that is missing or not an array.
    #[error("'$elemMatch' on field '{field}' expects an array, got {actual}")]
    ElemMatchType { field: String, actual: &'static str },

    /// Invalid regular expression pattern.
    #[error("invalid regex pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// Custom operator names must start with `$`.
    #[error("custom operator name '{0}' must start with '$'")]
    InvalidOperatorName(String),

    /// A record could not be converted through `serde_json`.
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reasons a field value and a filter operand could not be compared.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    /// A numeric field was compared with a string that is neither numeric nor a date.
    #[error("unable to coerce '{0}' to a number")]
    NotANumber(String),

    /// Booleans are never coerced to or from other types.
    #[error("cannot compare a {field} field value with a {operand} operand")]
    Boolean {
        field: &'static str,
        operand: &'static str,
    },

    /// The value has a type that range comparison does not support.
    #[error("{0} values cannot be range-compared")]
    Unsupported(&'static str),

    /// A `$near` field value is not a location.
    #[error("expected a location as [lon, lat] or {{lon, lat}}, got {0}")]
    NotALocation(&'static str),

    /// A filter operand looked like date math but failed to parse.
    #[error("invalid date math '{expr}': {source}")]
    DateMath {
        expr: String,
        #[source]
        source: DateMathError,
    },
}

/// Reasons a date math expression is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateMathError {
    /// The expression does not follow `(<date>||)|now` + terms + `/unit`.
    #[error("expected 'now' or '<date>||' followed by [+-]<n><unit> terms and an optional /<unit>")]
    Syntax,

    /// A math or rounding term names a unit outside `y M w d h H m s`.
    #[error("unsupported unit '{0}'")]
    UnsupportedUnit(String),

    /// The literal date before `||` is not a recognized date.
    #[error("invalid date literal '{0}'")]
    InvalidLiteral(String),

    /// Arithmetic moved the date outside the representable range.
    #[error("date out of range")]
    OutOfRange,
}

/// Result type for quarry operations.
pub type Result<T> = std::result::Result<T, QueryError>;
