//! Predicate operators over JSON values.
//!
//! Queries are validated once at the operation boundary
//! ([`validate_clause`]) and then evaluated per record with the
//! infallible [`matches_clause`]. Validation walks the whole clause, so
//! an unsupported operator is rejected even when the table is empty and
//! no record would ever be evaluated against it.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::record::Record;

/// Operators every collection accepts.
const CORE_OPERATORS: &[&str] = &[
    "$eq",
    "$ne",
    "$in",
    "$nin",
    "$lt",
    "$lte",
    "$gt",
    "$gte",
    "$exists",
    "$not",
    "$elemMatch",
];

/// Operators that become available through a collection's
/// `extra_operators` whitelist.
const EXTRA_OPERATORS: &[&str] = &["$size", "$all"];

/// True when `operator` can be enabled via `extra_operators`.
pub(crate) fn is_known_extra_operator(operator: &str) -> bool {
    EXTRA_OPERATORS.contains(&operator)
}

fn is_allowed(operator: &str, extras: &[String]) -> bool {
    CORE_OPERATORS.contains(&operator)
        || (is_known_extra_operator(operator) && extras.iter().any(|e| e == operator))
}

/// Orders two JSON values for sorting.
///
/// Within a type, numbers, strings, and booleans use their natural
/// order. Across types the order is numbers, strings, booleans, then
/// composite values. Null and missing sort last in ascending order.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 2,
        _ => 3,
    }
}

/// Structural equality with numeric normalization, so the integer `1`
/// and the float `1.0` compare equal the way they do in loosely typed
/// payloads.
pub fn deep_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equals(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| deep_equals(x, y)))
        }
        _ => a == b,
    }
}

/// True when `value` is a non-empty object whose keys are all operators.
fn is_operator_object(value: &Value) -> bool {
    match value.as_object() {
        Some(object) if !object.is_empty() => object.keys().all(|key| key.starts_with('$')),
        _ => false,
    }
}

/// Resolves a dot-separated field path inside a record.
pub(crate) fn field_value<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Validates every operator and operand shape in a match clause.
pub(crate) fn validate_clause(clause: &Map<String, Value>, extras: &[String]) -> CoreResult<()> {
    for (key, value) in clause {
        if !key.starts_with('$') {
            validate_condition(value, extras)?;
            continue;
        }
        match key.as_str() {
            "$and" | "$or" => {
                let branches = value.as_array().ok_or_else(|| {
                    CoreError::invalid_query(format!("{key} expects an array of clauses"))
                })?;
                for branch in branches {
                    let clause = branch.as_object().ok_or_else(|| {
                        CoreError::invalid_query(format!("{key} branches must be objects"))
                    })?;
                    validate_clause(clause, extras)?;
                }
            }
            "$not" => {
                let clause = value.as_object().ok_or_else(|| {
                    CoreError::invalid_query("$not expects a clause object")
                })?;
                validate_clause(clause, extras)?;
            }
            other => return Err(CoreError::unsupported_operator(other)),
        }
    }
    Ok(())
}

fn validate_condition(condition: &Value, extras: &[String]) -> CoreResult<()> {
    if !is_operator_object(condition) {
        // plain equality needs no validation
        return Ok(());
    }
    let Some(operators) = condition.as_object() else {
        return Ok(());
    };
    for (operator, operand) in operators {
        if !is_allowed(operator, extras) {
            return Err(CoreError::unsupported_operator(operator));
        }
        match operator.as_str() {
            "$in" | "$nin" | "$all" => {
                if !operand.is_array() {
                    return Err(CoreError::invalid_query(format!(
                        "{operator} expects an array"
                    )));
                }
            }
            "$size" => {
                if super::types::coerce_i64(operand).is_none() {
                    return Err(CoreError::invalid_query("$size expects an integer"));
                }
            }
            "$not" => validate_condition(operand, extras)?,
            "$elemMatch" => validate_elem_match(operand, extras)?,
            _ => {}
        }
    }
    Ok(())
}

fn validate_elem_match(operand: &Value, extras: &[String]) -> CoreResult<()> {
    if is_operator_object(operand) {
        return validate_condition(operand, extras);
    }
    match operand.as_object() {
        Some(clause) => validate_clause(clause, extras),
        // scalar operands compare element-wise by equality
        None => Ok(()),
    }
}

/// Evaluates a match clause against a record.
///
/// Evaluation assumes the clause passed [`validate_clause`]; operators
/// outside the supported set simply never match.
pub fn matches_clause(record: &Record, clause: &Map<String, Value>) -> bool {
    clause.iter().all(|(key, value)| match key.as_str() {
        "$and" => value
            .as_array()
            .is_some_and(|branches| branches.iter().all(|b| branch_matches(record, b))),
        "$or" => value
            .as_array()
            .is_some_and(|branches| branches.iter().any(|b| branch_matches(record, b))),
        "$not" => value
            .as_object()
            .is_some_and(|clause| !matches_clause(record, clause)),
        field if !field.starts_with('$') => matches_condition(field_value(record, field), value),
        _ => false,
    })
}

fn branch_matches(record: &Record, branch: &Value) -> bool {
    branch
        .as_object()
        .is_some_and(|clause| matches_clause(record, clause))
}

fn matches_condition(value: Option<&Value>, condition: &Value) -> bool {
    if is_operator_object(condition) {
        match condition.as_object() {
            Some(operators) => operators
                .iter()
                .all(|(operator, operand)| apply_operator(value, operator, operand)),
            None => false,
        }
    } else {
        match value {
            Some(value) => equals_or_contains(value, condition),
            // an equality test against null also matches a missing field
            None => condition.is_null(),
        }
    }
}

/// Equality that also matches array fields containing the expected
/// value.
fn equals_or_contains(value: &Value, expected: &Value) -> bool {
    if deep_equals(value, expected) {
        return true;
    }
    value
        .as_array()
        .is_some_and(|items| items.iter().any(|item| deep_equals(item, expected)))
}

fn apply_operator(value: Option<&Value>, operator: &str, operand: &Value) -> bool {
    match operator {
        "$exists" => operand_truthy(operand) == value.is_some(),
        "$not" => !matches_condition(value, operand),
        _ => match value {
            Some(value) => evaluate_scalar(value, operator, operand),
            None => missing_field_matches(operator, operand),
        },
    }
}

/// Operator semantics against a missing field: `$eq null` and `$in`
/// containing null treat missing as null; negations of equality match.
fn missing_field_matches(operator: &str, operand: &Value) -> bool {
    match operator {
        "$eq" => operand.is_null(),
        "$ne" => !operand.is_null(),
        "$in" => operand
            .as_array()
            .is_some_and(|items| items.iter().any(Value::is_null)),
        "$nin" => operand
            .as_array()
            .is_some_and(|items| !items.iter().any(Value::is_null)),
        _ => false,
    }
}

fn evaluate_scalar(value: &Value, operator: &str, operand: &Value) -> bool {
    match operator {
        "$eq" => equals_or_contains(value, operand),
        "$ne" => !equals_or_contains(value, operand),
        "$gt" => compare_with(value, operand, |o| o == Ordering::Greater),
        "$gte" => compare_with(value, operand, |o| o != Ordering::Less),
        "$lt" => compare_with(value, operand, |o| o == Ordering::Less),
        "$lte" => compare_with(value, operand, |o| o != Ordering::Greater),
        "$in" => operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| equals_or_contains(value, item))),
        "$nin" => operand
            .as_array()
            .is_some_and(|items| !items.iter().any(|item| equals_or_contains(value, item))),
        "$elemMatch" => value
            .as_array()
            .is_some_and(|items| items.iter().any(|item| elem_matches(item, operand))),
        "$size" => value.as_array().is_some_and(|items| {
            super::types::coerce_i64(operand) == Some(items.len() as i64)
        }),
        "$all" => match (value.as_array(), operand.as_array()) {
            (Some(items), Some(targets)) => targets
                .iter()
                .all(|target| items.iter().any(|item| deep_equals(item, target))),
            _ => false,
        },
        _ => false,
    }
}

/// Ordered comparison with array lifting: an array field satisfies the
/// comparison when any element does.
fn compare_with<F>(value: &Value, operand: &Value, accept: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    match value.as_array() {
        Some(items) => items
            .iter()
            .any(|item| ordered_cmp(item, operand).map(&accept).unwrap_or(false)),
        None => ordered_cmp(value, operand).map(accept).unwrap_or(false),
    }
}

/// Comparison defined only within a type; mixed types never satisfy a
/// range operator.
fn ordered_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn elem_matches(element: &Value, operand: &Value) -> bool {
    if is_operator_object(operand) {
        return matches_condition(Some(element), operand);
    }
    match (element.as_object(), operand.as_object()) {
        (Some(element), Some(clause)) => matches_clause(element, clause),
        _ => deep_equals(element, operand),
    }
}

fn operand_truthy(operand: &Value) -> bool {
    match operand {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        _ => true,
    }
}
