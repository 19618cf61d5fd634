//! In-process pipeline evaluator.
//!
//! Executes a [`Pipeline`] over documents held in memory. Both bundled stores
//! run their aggregations through here, so the two agree on every operator.
//!
//! Semantics follow the usual document-store rules:
//!
//! - a missing field evaluates to `null`; arithmetic on `null` yields `null`
//! - arithmetic on non-numeric values and division by zero are errors
//! - match comparisons only succeed between values of the same kind
//! - sorting orders mixed kinds as null < number < string < object < array
//!   < bool < date, and is stable, so ties keep their input order
//! - groups are emitted in the order their first document was seen
//!
//! Dates are represented as `{"$date": <epoch millis>}`.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};
use serde_json::{Map, Number, Value, json};
use thiserror::Error;

use super::expr::{CmpOp, Expr, Filter};
use super::stage::{Accumulator, Pipeline, Projection, SortOrder, Stage};

/// Errors raised while evaluating a pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("{op} only supports numeric types, not {found}")]
    NotNumeric { op: &'static str, found: String },
    #[error("can't $divide by zero")]
    DivideByZero,
    #[error("$arrayElemAt's first argument must be an array, not {found}")]
    NotAnArray { found: String },
    #[error("can't convert {found} to a date")]
    NotADate { found: String },
    #[error("date {millis} ms is outside the supported range")]
    DateOutOfRange { millis: i64 },
    #[error("the limit must be positive")]
    ZeroLimit,
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Run every stage of `pipeline` over `docs`, in order.
pub fn run_pipeline(pipeline: &Pipeline, docs: Vec<Value>) -> EvalResult<Vec<Value>> {
    let mut current = docs;
    for stage in pipeline.stages() {
        current = run_stage(stage, current)?;
    }
    Ok(current)
}

fn run_stage(stage: &Stage, docs: Vec<Value>) -> EvalResult<Vec<Value>> {
    match stage {
        Stage::Match(filter) => {
            let mut kept = Vec::with_capacity(docs.len());
            for doc in docs {
                if matches(filter, &doc)? {
                    kept.push(doc);
                }
            }
            Ok(kept)
        }
        Stage::Group { id, accumulators } => group(id, accumulators, &docs),
        Stage::Sort(keys) => {
            let mut docs = docs;
            docs.sort_by(|a, b| compare_by_keys(keys, a, b));
            Ok(docs)
        }
        Stage::Limit(0) => Err(EvalError::ZeroLimit),
        Stage::Limit(n) => {
            let mut docs = docs;
            docs.truncate(*n);
            Ok(docs)
        }
        Stage::Project(fields) => docs.iter().map(|doc| project(fields, doc)).collect(),
    }
}

// ---------------------------------------------------------------------------
// Field access
// ---------------------------------------------------------------------------

/// Resolve a dotted path through nested objects. `None` means missing.
pub fn resolve<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |cur, segment| cur.get(segment))
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// Whether `doc` satisfies `filter`.
pub fn matches(filter: &Filter, doc: &Value) -> EvalResult<bool> {
    Ok(match filter {
        Filter::Compare { field, op, value } => match (resolve(doc, field), op) {
            // `{field: null}` also matches documents without the field.
            (None, CmpOp::Eq) => value.is_null(),
            (None, CmpOp::Ne) => !value.is_null(),
            (None, _) => false,
            (Some(actual), CmpOp::Eq) => values_equal(actual, value),
            (Some(actual), CmpOp::Ne) => !values_equal(actual, value),
            (Some(actual), op) => {
                same_kind(actual, value) && op.holds(compare_values(actual, value))
            }
        },
        Filter::Exists { field, exists } => resolve(doc, field).is_some() == *exists,
        Filter::Size { field, len } => resolve(doc, field)
            .and_then(Value::as_array)
            .is_some_and(|arr| arr.len() == *len),
        Filter::Expr(expr) => truthy(&eval(expr, doc)?),
        Filter::And(filters) => {
            for f in filters {
                if !matches(f, doc)? {
                    return Ok(false);
                }
            }
            true
        }
    })
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Evaluate an expression against one document.
pub fn eval(expr: &Expr, doc: &Value) -> EvalResult<Value> {
    match expr {
        Expr::Field(path) => Ok(resolve(doc, path).cloned().unwrap_or(Value::Null)),
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Add(items) => arithmetic("$add", items, doc, 0, |a, b| a.checked_add(b), |a, b| a + b),
        Expr::Multiply(items) => {
            arithmetic("$multiply", items, doc, 1, |a, b| a.checked_mul(b), |a, b| a * b)
        }
        Expr::Divide(a, b) => {
            let (a, b) = (eval(a, doc)?, eval(b, doc)?);
            if a.is_null() || b.is_null() {
                return Ok(Value::Null);
            }
            let x = numeric("$divide", &a)?;
            let y = numeric("$divide", &b)?;
            if y == 0.0 {
                return Err(EvalError::DivideByZero);
            }
            Ok(float_value(x / y))
        }
        Expr::ArrayElemAt(array, index) => {
            let array = eval(array, doc)?;
            match array {
                Value::Null => Ok(Value::Null),
                Value::Array(items) => {
                    let len = items.len() as i64;
                    let idx = if *index < 0 { len + index } else { *index };
                    Ok(usize::try_from(idx)
                        .ok()
                        .and_then(|i| items.get(i).cloned())
                        .unwrap_or(Value::Null))
                }
                other => Err(EvalError::NotAnArray {
                    found: kind_name(&other).to_string(),
                }),
            }
        }
        Expr::ToDate(inner) => {
            let v = eval(inner, doc)?;
            if v.is_null() || as_date(&v).is_some() {
                return Ok(v);
            }
            if let Some(n) = v.as_i64() {
                return Ok(date_value(n));
            }
            if let Some(f) = v.as_f64() {
                return Ok(date_value(f.trunc() as i64));
            }
            if let Some(s) = v.as_str()
                && let Ok(dt) = DateTime::parse_from_rfc3339(s)
            {
                return Ok(date_value(dt.timestamp_millis()));
            }
            Err(EvalError::NotADate {
                found: kind_name(&v).to_string(),
            })
        }
        Expr::Year(inner) => {
            let v = eval(inner, doc)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            let millis = as_date(&v).ok_or_else(|| EvalError::NotADate {
                found: kind_name(&v).to_string(),
            })?;
            let dt = DateTime::<Utc>::from_timestamp_millis(millis)
                .ok_or(EvalError::DateOutOfRange { millis })?;
            Ok(json!(dt.year()))
        }
        Expr::Compare(op, a, b) => {
            let (a, b) = (eval(a, doc)?, eval(b, doc)?);
            let ord = if values_equal(&a, &b) {
                Ordering::Equal
            } else {
                compare_values(&a, &b)
            };
            Ok(Value::Bool(op.holds(ord)))
        }
    }
}

/// Shared body of `$add` / `$multiply`: integer arithmetic while every operand
/// is an integer and nothing overflows, floating point otherwise.
fn arithmetic(
    op: &'static str,
    items: &[Expr],
    doc: &Value,
    identity: i64,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> EvalResult<Value> {
    let mut int_acc = Some(identity);
    let mut float_acc = identity as f64;
    let mut saw_null = false;
    for item in items {
        let v = eval(item, doc)?;
        if v.is_null() {
            saw_null = true;
            continue;
        }
        let f = numeric(op, &v)?;
        int_acc = match (int_acc, v.as_i64()) {
            (Some(acc), Some(i)) => int_op(acc, i),
            _ => None,
        };
        float_acc = float_op(float_acc, f);
    }
    if saw_null {
        return Ok(Value::Null);
    }
    Ok(match int_acc {
        Some(i) => json!(i),
        None => float_value(float_acc),
    })
}

fn numeric(op: &'static str, v: &Value) -> EvalResult<f64> {
    v.as_f64().ok_or_else(|| EvalError::NotNumeric {
        op,
        found: kind_name(v).to_string(),
    })
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Build a date value from epoch milliseconds.
pub fn date_value(millis: i64) -> Value {
    json!({ "$date": millis })
}

/// Epoch milliseconds of a date value, if `v` is one.
pub fn as_date(v: &Value) -> Option<i64> {
    let obj = v.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get("$date")?.as_i64()
}

fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) if as_date(v).is_some() => "date",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) if as_date(v).is_some() => 6,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    kind_rank(a) == kind_rank(b)
}

/// Equality with numbers compared by value (`4 == 4.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// Total order across all JSON values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (kind_rank(a), kind_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i.cmp(&j),
            _ => {
                let (fx, fy) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                fx.partial_cmp(&fy).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => match (as_date(a), as_date(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

fn compare_by_keys(keys: &[(String, SortOrder)], a: &Value, b: &Value) -> Ordering {
    for (field, order) in keys {
        let null = Value::Null;
        let va = resolve(a, field).unwrap_or(&null);
        let vb = resolve(b, field).unwrap_or(&null);
        let ord = compare_values(va, vb);
        let ord = match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

enum AccState {
    Avg { sum: f64, count: u64 },
    Sum { int: Option<i64>, float: f64 },
    First(Option<Value>),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Avg(_) => Self::Avg { sum: 0.0, count: 0 },
            Accumulator::Sum(_) => Self::Sum {
                int: Some(0),
                float: 0.0,
            },
            Accumulator::First(_) => Self::First(None),
        }
    }

    fn feed(&mut self, acc: &Accumulator, doc: &Value) -> EvalResult<()> {
        match (self, acc) {
            (Self::Avg { sum, count }, Accumulator::Avg(expr)) => {
                if let Some(f) = eval(expr, doc)?.as_f64() {
                    *sum += f;
                    *count += 1;
                }
            }
            (Self::Sum { int, float }, Accumulator::Sum(expr)) => {
                let v = eval(expr, doc)?;
                if let Some(f) = v.as_f64() {
                    *int = match (*int, v.as_i64()) {
                        (Some(acc), Some(i)) => acc.checked_add(i),
                        _ => None,
                    };
                    *float += f;
                }
            }
            (Self::First(slot), Accumulator::First(expr)) => {
                if slot.is_none() {
                    *slot = Some(eval(expr, doc)?);
                }
            }
            _ => unreachable!("accumulator state built from the same accumulator"),
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self {
            Self::Avg { count: 0, .. } => Value::Null,
            Self::Avg { sum, count } => float_value(sum / count as f64),
            Self::Sum { int: Some(i), .. } => json!(i),
            Self::Sum { float, .. } => float_value(float),
            Self::First(v) => v.unwrap_or(Value::Null),
        }
    }
}

/// Key under which numerically equal ids (`2020` and `2020.0`) collide.
fn group_key(id: &Value) -> String {
    match id {
        Value::Number(n) if n.as_i64().is_none() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn group(
    id: &Expr,
    accumulators: &[(String, Accumulator)],
    docs: &[Value],
) -> EvalResult<Vec<Value>> {
    let mut order: Vec<(Value, Vec<AccState>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for doc in docs {
        let key_value = eval(id, doc)?;
        let key = group_key(&key_value);
        let slot = match index.get(&key) {
            Some(&i) => i,
            None => {
                let states = accumulators.iter().map(|(_, acc)| AccState::new(acc)).collect();
                order.push((key_value, states));
                index.insert(key, order.len() - 1);
                order.len() - 1
            }
        };
        let states = &mut order[slot].1;
        for (state, (_, acc)) in states.iter_mut().zip(accumulators) {
            state.feed(acc, doc)?;
        }
    }

    Ok(order
        .into_iter()
        .map(|(key, states)| {
            let mut out = Map::new();
            out.insert("_id".to_string(), key);
            for (state, (name, _)) in states.into_iter().zip(accumulators) {
                out.insert(name.clone(), state.finish());
            }
            Value::Object(out)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

fn project(fields: &[(String, Projection)], doc: &Value) -> EvalResult<Value> {
    let mut out = Map::new();
    if let Some(id) = doc.get("_id") {
        out.insert("_id".to_string(), id.clone());
    }
    for (name, proj) in fields {
        match proj {
            Projection::Include => {
                if let Some(v) = resolve(doc, name) {
                    out.insert(name.clone(), v.clone());
                }
            }
            Projection::Computed(expr) => {
                out.insert(name.clone(), eval(expr, doc)?);
            }
        }
    }
    Ok(Value::Object(out))
}
