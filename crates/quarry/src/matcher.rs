//! Leaf predicates for in-memory evaluation.
//!
//! A [`Matcher`] is one parsed condition compiled for repeated evaluation:
//! regexes are built once, `$near` distances are converted to miles once,
//! and `$elemMatch` sub-queries are compiled into a nested [`Node`].
//!
//! Every operator sees the field value as a set: scalars are tested
//! directly, arrays pass if any element satisfies the test. Negated
//! spellings invert the positive result.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};

use crate::coerce::{coerce_range_operands, primitive_equals, RangeOperands};
use crate::condition::{Condition, Exclusive};
use crate::date_math::Clock;
use crate::error::{CoercionError, QueryError, Result};
use crate::filter::Node;
use crate::geo::{distance_miles, DistanceType, Location};
use crate::op::BasicOperator;
use crate::path::{resolve_path, FieldValue};
use crate::value::Value;

/// A compiled leaf condition.
#[derive(Debug, Clone)]
pub struct Matcher {
    path: String,
    field: String,
    token: String,
    negated: bool,
    test: Test,
}

#[derive(Debug, Clone)]
enum Test {
    Eq(Value),
    Exists(bool),
    In(Vec<Value>),
    All(Vec<Value>),
    Range(BasicOperator, Value),
    Between {
        min: Value,
        max: Value,
        exclusive: Exclusive,
    },
    Regex(Regex),
    Like(Regex),
    Includes {
        needle: String,
        case_insensitive: bool,
    },
    Prefix {
        prefix: String,
        case_insensitive: bool,
    },
    Ids(Vec<String>),
    Empty(bool),
    Near {
        origin: Location,
        max_miles: f64,
        kind: DistanceType,
    },
    ElemMatch(Box<Node>),
}

impl Matcher {
    /// Compiles a parsed condition on `path`.
    ///
    /// `prefix` is the path of the enclosing `$elemMatch` fields, if any; it
    /// only appears in error messages since lookups are relative to the
    /// element being tested. Custom operators have no in-memory form and are
    /// rejected as unknown.
    pub fn compile(prefix: &str, path: &str, condition: &Condition) -> Result<Matcher> {
        let field = format!("{prefix}{path}");
        let field = field.as_str();
        let op = condition.basic().ok_or_else(|| QueryError::UnknownOperator {
            field: field.to_string(),
            keys: condition.token.clone(),
        })?;
        let operand = &condition.operand;
        let list = || operand.as_list().map(<[Value]>::to_vec).unwrap_or_default();

        let test = match op {
            BasicOperator::Eq => Test::Eq(operand.clone()),
            BasicOperator::Exists => Test::Exists(operand.as_bool().unwrap_or(true)),
            BasicOperator::In => Test::In(list()),
            BasicOperator::All => Test::All(list()),
            BasicOperator::Lt | BasicOperator::Lte | BasicOperator::Gt | BasicOperator::Gte => {
                Test::Range(op, operand.clone())
            }
            BasicOperator::Between => {
                let bounds = list();
                match bounds.as_slice() {
                    [min, max] => Test::Between {
                        min: min.clone(),
                        max: max.clone(),
                        exclusive: condition.exclusive(),
                    },
                    _ => {
                        return Err(QueryError::InvalidOperandShape {
                            field: field.to_string(),
                            op: condition.token.clone(),
                            reason: "expected an array of exactly two values".into(),
                        })
                    }
                }
            }
            BasicOperator::Regex => Test::Regex(compile_regex(operand, condition.flags())?),
            BasicOperator::Like => Test::Like(compile_glob(
                &operand.to_text().unwrap_or_default(),
                condition.case_insensitive(),
            )?),
            BasicOperator::Includes => {
                let case_insensitive = condition.case_insensitive();
                let needle = operand.to_text().unwrap_or_default().trim().to_string();
                Test::Includes {
                    needle: fold(&needle, case_insensitive),
                    case_insensitive,
                }
            }
            BasicOperator::Prefix => {
                let case_insensitive = condition.case_insensitive();
                let prefix = operand.to_text().unwrap_or_default().trim().to_string();
                Test::Prefix {
                    prefix: fold(&prefix, case_insensitive),
                    case_insensitive,
                }
            }
            BasicOperator::Ids => Test::Ids(list().iter().filter_map(Value::to_text).collect()),
            BasicOperator::Empty => Test::Empty(operand.as_bool().unwrap_or(true)),
            BasicOperator::Near => {
                let origin = Location::from_value(operand).ok_or_else(|| QueryError::InvalidOperandShape {
                    field: field.to_string(),
                    op: condition.token.clone(),
                    reason: "expected a location as [lon, lat] or {lon, lat}".into(),
                })?;
                Test::Near {
                    origin,
                    max_miles: condition.max_distance(field)?.miles(),
                    kind: condition.distance_type(),
                }
            }
            BasicOperator::ElemMatch => Test::ElemMatch(Box::new(Node::compile(operand, &format!("{field}."))?)),
        };

        Ok(Matcher {
            path: path.to_string(),
            field: field.to_string(),
            token: condition.token.clone(),
            negated: condition.negated,
            test,
        })
    }

    /// The full field path, including any `$elemMatch` prefix.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Evaluates the condition against a record.
    pub fn matches(&self, record: &Value, clock: &dyn Clock) -> Result<bool> {
        let value = resolve_path(record, &self.path);
        let passed = self.test_value(&value, clock)?;
        Ok(passed != self.negated)
    }

    fn test_value(&self, value: &FieldValue<'_>, clock: &dyn Clock) -> Result<bool> {
        match &self.test {
            Test::Eq(operand) => self.match_eq(value, operand),
            Test::Exists(expected) => Ok(*expected == is_present(value)),
            Test::In(operands) => {
                if operands.is_empty() {
                    return Ok(false);
                }
                self.any_element(value, |v| self.equals_any(v, operands))
            }
            Test::All(operands) => {
                if operands.is_empty() {
                    return Ok(true);
                }
                if value.is_missing() {
                    return Ok(false);
                }
                for operand in operands {
                    if !self.any_element(value, |v| self.equals(v, operand))? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Test::Range(op, operand) => self.any_element(value, |v| {
                if v.is_null() {
                    return Ok(false);
                }
                let ordering = self.compare(v, operand, clock)?;
                Ok(ordering.is_some_and(|o| op.eval_ordering(o)))
            }),
            Test::Between { min, max, exclusive } => self.any_element(value, |v| {
                if v.is_null() {
                    return Ok(false);
                }
                let (Some(low), Some(high)) = (self.compare(v, min, clock)?, self.compare(v, max, clock)?) else {
                    return Ok(false);
                };
                let above = if exclusive.min {
                    low == Ordering::Greater
                } else {
                    low != Ordering::Less
                };
                let below = if exclusive.max {
                    high == Ordering::Less
                } else {
                    high != Ordering::Greater
                };
                Ok(above && below)
            }),
            Test::Regex(regex) => self.any_element(value, |v| Ok(v.to_text().is_some_and(|s| regex.is_match(&s)))),
            Test::Like(regex) => {
                self.any_element(value, |v| Ok(v.to_text().is_some_and(|s| regex.is_match(s.trim()))))
            }
            Test::Includes {
                needle,
                case_insensitive,
            } => self.any_element(value, |v| {
                Ok(v.to_text().is_some_and(|s| fold(&s, *case_insensitive).contains(needle.as_str())))
            }),
            Test::Prefix {
                prefix,
                case_insensitive,
            } => self.any_element(value, |v| {
                Ok(v.to_text()
                    .is_some_and(|s| fold(s.trim(), *case_insensitive).starts_with(prefix.as_str())))
            }),
            Test::Ids(ids) => self.any_element(value, |v| Ok(v.to_text().is_some_and(|s| ids.contains(&s)))),
            Test::Empty(expected) => {
                let blank = value.elements().into_iter().all(is_blank);
                Ok(*expected == blank)
            }
            Test::Near {
                origin,
                max_miles,
                kind,
            } => {
                for location in self.locations(value)? {
                    if distance_miles(location, *origin, *kind) <= *max_miles {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Test::ElemMatch(node) => match value {
                FieldValue::Missing => Err(QueryError::ElemMatchType {
                    field: self.field.clone(),
                    actual: "missing",
                }),
                FieldValue::Value(Value::List(_)) | FieldValue::Collected(_) => {
                    for element in value.elements() {
                        if node.matches(element, clock)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                FieldValue::Value(other) => Err(QueryError::ElemMatchType {
                    field: self.field.clone(),
                    actual: other.type_name(),
                }),
            },
        }
    }

    fn match_eq(&self, value: &FieldValue<'_>, operand: &Value) -> Result<bool> {
        // a whole array equal to an array operand
        if let (FieldValue::Value(whole @ Value::List(_)), Value::List(_)) = (value, operand) {
            if *whole == operand {
                return Ok(true);
            }
        }
        self.any_element(value, |v| self.equals(v, operand))
    }

    fn any_element(&self, value: &FieldValue<'_>, mut test: impl FnMut(&Value) -> Result<bool>) -> Result<bool> {
        for element in value.elements() {
            if test(element)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn equals(&self, field: &Value, operand: &Value) -> Result<bool> {
        primitive_equals(field, operand).map_err(|source| self.coercion_failure(source))
    }

    fn equals_any(&self, field: &Value, operands: &[Value]) -> Result<bool> {
        for operand in operands {
            if self.equals(field, operand)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn compare(&self, field: &Value, operand: &Value, clock: &dyn Clock) -> Result<Option<Ordering>> {
        coerce_range_operands(field, operand, clock)
            .map(|pair: RangeOperands| pair.ordering())
            .map_err(|source| self.coercion_failure(source))
    }

    fn locations(&self, value: &FieldValue<'_>) -> Result<Vec<Location>> {
        let candidates: Vec<&Value> = match value {
            FieldValue::Missing => return Ok(Vec::new()),
            FieldValue::Value(v) if Location::is_pair(v) => vec![*v],
            FieldValue::Value(v) => match v {
                Value::List(items) => items.iter().collect(),
                other => vec![*other],
            },
            FieldValue::Collected(values) => values
                .iter()
                .flat_map(|v| match v {
                    Value::List(items) if !Location::is_pair(v) => items.iter().collect::<Vec<_>>(),
                    other => vec![*other],
                })
                .collect(),
        };

        candidates
            .into_iter()
            .map(|v| {
                Location::from_value(v).ok_or_else(|| self.coercion_failure(CoercionError::NotALocation(v.type_name())))
            })
            .collect()
    }

    fn coercion_failure(&self, source: CoercionError) -> QueryError {
        match source {
            CoercionError::DateMath { expr, source } => QueryError::InvalidDateMath { expr, source },
            source => QueryError::CoercionFailure {
                field: self.field.clone(),
                op: self.token.clone(),
                source,
            },
        }
    }
}

fn is_present(value: &FieldValue<'_>) -> bool {
    match value {
        FieldValue::Missing => false,
        FieldValue::Value(v) => !v.is_null(),
        FieldValue::Collected(values) => values.iter().any(|v| !v.is_null()),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn fold(s: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        s.to_lowercase()
    } else {
        s.to_string()
    }
}

fn compile_regex(operand: &Value, flags: Option<&str>) -> Result<Regex> {
    let (source, own_flags) = match operand {
        Value::Pattern(pattern) => (pattern.source.clone(), pattern.flags.as_str()),
        other => (other.to_text().unwrap_or_default(), ""),
    };
    let flags = flags.unwrap_or(own_flags);
    Ok(RegexBuilder::new(&source)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()?)
}

/// Anchored glob: `*` and `%` match any run, `?` matches one character.
fn compile_glob(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    let mut source = String::from("^");
    for c in pattern.trim().chars() {
        match c {
            '*' | '%' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    Ok(RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()?)
}
