//! Operator vocabulary for query conditions.
//!
//! The [`BasicOperator`] enum defines every built-in leaf operator. Negated
//! spellings (`$ne`, `$nin`, ...) are not operators of their own; they resolve
//! to a positive operator plus a negation flag. Compound tokens combine whole
//! sub-queries and map onto a boolean [`ClauseKind`].

use std::cmp::Ordering;

/// Built-in leaf operator.
///
/// Operators are grouped by the values they accept:
/// - **Equality**: `Eq`, `In`, `All`, `Ids`
/// - **Range**: `Gt`, `Gte`, `Lt`, `Lte`, `Between`
/// - **Presence**: `Exists`, `Empty`
/// - **Text**: `Regex`, `Like`, `Includes`, `Prefix`
/// - **Geo**: `Near`
/// - **Nested**: `ElemMatch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicOperator {
    /// Equal after primitive coercion.
    Eq,
    /// Field is present and non-null (or absent, with a `false` operand).
    Exists,
    /// Any field element equals any operand element.
    In,
    /// Every operand element equals some field element.
    All,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Within a `[min, max]` pair, inclusivity set by `$exclusive`.
    Between,
    /// Regular expression match.
    Regex,
    /// Glob match with `*`/`%` and `?`.
    Like,
    /// Substring match.
    Includes,
    /// Prefix match.
    Prefix,
    /// Document identifier membership.
    Ids,
    /// Field is blank or absent.
    Empty,
    /// Within a distance of a location.
    Near,
    /// Some array element satisfies a sub-query.
    ElemMatch,
}

impl BasicOperator {
    /// Every built-in operator, in table order.
    pub const ALL: [BasicOperator; 17] = [
        BasicOperator::Eq,
        BasicOperator::Exists,
        BasicOperator::In,
        BasicOperator::All,
        BasicOperator::Lt,
        BasicOperator::Lte,
        BasicOperator::Gt,
        BasicOperator::Gte,
        BasicOperator::Between,
        BasicOperator::Regex,
        BasicOperator::Like,
        BasicOperator::Includes,
        BasicOperator::Prefix,
        BasicOperator::Ids,
        BasicOperator::Empty,
        BasicOperator::Near,
        BasicOperator::ElemMatch,
    ];

    /// Looks up a built-in operator by its `$`-prefixed token.
    pub fn from_token(token: &str) -> Option<BasicOperator> {
        Self::ALL.into_iter().find(|op| op.as_str() == token)
    }

    /// Evaluates a comparison given an ordering result.
    ///
    /// Used by range operators once both operands have been coerced to a
    /// common kind.
    pub fn eval_ordering(self, ordering: Ordering) -> bool {
        match self {
            BasicOperator::Eq => ordering == Ordering::Equal,
            BasicOperator::Gt => ordering == Ordering::Greater,
            BasicOperator::Gte => ordering != Ordering::Less,
            BasicOperator::Lt => ordering == Ordering::Less,
            BasicOperator::Lte => ordering != Ordering::Greater,
            _ => false, // Not an ordering-based operator
        }
    }

    /// Returns the query token of this operator, including the `$`.
    pub fn as_str(self) -> &'static str {
        match self {
            BasicOperator::Eq => "$eq",
            BasicOperator::Exists => "$exists",
            BasicOperator::In => "$in",
            BasicOperator::All => "$all",
            BasicOperator::Lt => "$lt",
            BasicOperator::Lte => "$lte",
            BasicOperator::Gt => "$gt",
            BasicOperator::Gte => "$gte",
            BasicOperator::Between => "$between",
            BasicOperator::Regex => "$regex",
            BasicOperator::Like => "$like",
            BasicOperator::Includes => "$includes",
            BasicOperator::Prefix => "$prefix",
            BasicOperator::Ids => "$ids",
            BasicOperator::Empty => "$empty",
            BasicOperator::Near => "$near",
            BasicOperator::ElemMatch => "$elemMatch",
        }
    }

    /// Range key used in emitted `range` fragments (`gt`, `gte`, `lt`, `lte`).
    pub fn range_key(self) -> Option<&'static str> {
        match self {
            BasicOperator::Gt => Some("gt"),
            BasicOperator::Gte => Some("gte"),
            BasicOperator::Lt => Some("lt"),
            BasicOperator::Lte => Some("lte"),
            _ => None,
        }
    }
}

impl std::fmt::Display for BasicOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Negated spelling of a basic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegatedOperator {
    /// `$ne`, the negation of `$eq`.
    Ne,
    /// `$nin`, the negation of `$in`.
    Nin,
    /// `$unlike`, the negation of `$like`.
    Unlike,
    /// `$nempty`, the negation of `$empty`.
    Nempty,
    /// `$excludes`, the negation of `$includes`.
    Excludes,
}

impl NegatedOperator {
    const ALL: [NegatedOperator; 5] = [
        NegatedOperator::Ne,
        NegatedOperator::Nin,
        NegatedOperator::Unlike,
        NegatedOperator::Nempty,
        NegatedOperator::Excludes,
    ];

    /// Looks up a negated operator by its token.
    pub fn from_token(token: &str) -> Option<NegatedOperator> {
        Self::ALL.into_iter().find(|op| op.as_str() == token)
    }

    /// The positive operator this spelling negates.
    pub fn positive(self) -> BasicOperator {
        match self {
            NegatedOperator::Ne => BasicOperator::Eq,
            NegatedOperator::Nin => BasicOperator::In,
            NegatedOperator::Unlike => BasicOperator::Like,
            NegatedOperator::Nempty => BasicOperator::Empty,
            NegatedOperator::Excludes => BasicOperator::Includes,
        }
    }

    /// Returns the query token, including the `$`.
    pub fn as_str(self) -> &'static str {
        match self {
            NegatedOperator::Ne => "$ne",
            NegatedOperator::Nin => "$nin",
            NegatedOperator::Unlike => "$unlike",
            NegatedOperator::Nempty => "$nempty",
            NegatedOperator::Excludes => "$excludes",
        }
    }
}

/// Boolean clause kind of an emitted `bool` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    /// All sub-queries must match.
    Must,
    /// At least one sub-query must match.
    Should,
    /// No sub-query may match.
    MustNot,
}

impl ClauseKind {
    /// Key of this clause inside a `bool` object.
    pub fn as_str(self) -> &'static str {
        match self {
            ClauseKind::Must => "must",
            ClauseKind::Should => "should",
            ClauseKind::MustNot => "must_not",
        }
    }
}

/// Operator combining whole sub-queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompoundOperator {
    /// `$and`: every sub-query matches.
    And,
    /// `$or`: at least one sub-query matches.
    Or,
    /// `$nor`: no sub-query matches.
    Nor,
    /// `$not`: the single sub-query does not match.
    Not,
}

impl CompoundOperator {
    /// Looks up a compound operator by its token.
    pub fn from_token(token: &str) -> Option<CompoundOperator> {
        match token {
            "$and" => Some(CompoundOperator::And),
            "$or" => Some(CompoundOperator::Or),
            "$nor" => Some(CompoundOperator::Nor),
            "$not" => Some(CompoundOperator::Not),
            _ => None,
        }
    }

    /// Clause kind the sub-queries are placed under when emitted.
    pub fn clause_kind(self) -> ClauseKind {
        match self {
            CompoundOperator::And => ClauseKind::Must,
            CompoundOperator::Or => ClauseKind::Should,
            CompoundOperator::Nor | CompoundOperator::Not => ClauseKind::MustNot,
        }
    }

    /// Returns the query token, including the `$`.
    pub fn as_str(self) -> &'static str {
        match self {
            CompoundOperator::And => "$and",
            CompoundOperator::Or => "$or",
            CompoundOperator::Nor => "$nor",
            CompoundOperator::Not => "$not",
        }
    }
}

/// Option key enabling case-insensitive text matching.
pub const CASE_INSENSITIVE: &str = "$caseInsensitive";
/// Option key carrying regex-style flag letters.
pub const OPTIONS: &str = "$options";
/// Option key selecting strict bounds for `$between`.
pub const EXCLUSIVE: &str = "$exclusive";
/// Option key carrying the `$near` radius.
pub const MAX_DISTANCE: &str = "$maxDistance";
/// Option key selecting the `$near` distance computation.
pub const DISTANCE_TYPE: &str = "$distanceType";

/// Option keys understood by the built-in operators.
pub const OPTION_KEYS: [&str; 5] = [CASE_INSENSITIVE, OPTIONS, EXCLUSIVE, MAX_DISTANCE, DISTANCE_TYPE];

/// Returns `true` if `key` is a built-in option key.
pub fn is_option_key(key: &str) -> bool {
    OPTION_KEYS.contains(&key)
}
