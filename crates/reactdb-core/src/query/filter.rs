//! Row filters evaluated against decoded entity documents.

use std::cmp::Ordering;

use serde_json::Value;

/// Comparison operator of a [`Filter::Compare`] clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ord: Option<Ordering>) -> bool {
        match (self, ord) {
            (CompareOp::Eq, Some(ord)) => ord.is_eq(),
            (CompareOp::Ne, Some(ord)) => ord.is_ne(),
            (CompareOp::Ne, None) => true,
            (CompareOp::Lt, Some(ord)) => ord.is_lt(),
            (CompareOp::Le, Some(ord)) => ord.is_le(),
            (CompareOp::Gt, Some(ord)) => ord.is_gt(),
            (CompareOp::Ge, Some(ord)) => ord.is_ge(),
            (_, None) => false,
        }
    }
}

/// A predicate over the fields of a stored entity.
///
/// Field names may be dotted (`address.city`) to reach into nested objects.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Compare a field against a value.
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// Field is missing or null.
    IsNull(String),
    /// Field is present and not null.
    IsNotNull(String),
    /// All clauses hold.
    And(Vec<Filter>),
    /// At least one clause holds.
    Or(Vec<Filter>),
}

impl Filter {
    /// Build a comparison clause.
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Filter::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Shorthand for an equality clause.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// Combine with another filter using AND.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut clauses) => {
                clauses.push(other);
                Filter::And(clauses)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Combine with another filter using OR.
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut clauses) => {
                clauses.push(other);
                Filter::Or(clauses)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Evaluate the filter against a decoded entity.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Compare { field, op, value } => match field_value(doc, field) {
                Some(Value::Null) | None => false,
                Some(actual) => op.holds(compare_values(actual, value)),
            },
            Filter::IsNull(field) => matches!(field_value(doc, field), None | Some(Value::Null)),
            Filter::IsNotNull(field) => {
                !matches!(field_value(doc, field), None | Some(Value::Null))
            }
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(doc)),
        }
    }
}

fn field_value<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    field.split('.').try_fold(doc, |current, part| current.get(part))
}

/// Order two JSON values.
///
/// Selection arguments arrive as text, so a string operand is coerced to the
/// stored field's type when the stored value is a number or a boolean.
fn compare_values(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Number(a), Value::String(b)) => {
            a.as_f64()?.partial_cmp(&b.trim().parse::<f64>().ok()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::String(b)) => match b.as_str() {
            "true" | "1" => Some(a.cmp(&true)),
            "false" | "0" => Some(a.cmp(&false)),
            _ => None,
        },
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}
