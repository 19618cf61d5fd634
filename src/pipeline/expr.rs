//! Expressions and match filters used inside pipeline stages.
//!
//! Both render to MongoDB-style extended JSON via `to_json`, which is what the
//! loader and query logs print and what tests assert against.

use serde_json::{Map, Value, json};

/// Comparison operator shared by filters and expressions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    /// Operator keyword in extended JSON.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }

    /// Whether an ordering between two operands satisfies this operator.
    pub fn holds(&self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Self::Eq => ord == Equal,
            Self::Ne => ord != Equal,
            Self::Gt => ord == Greater,
            Self::Gte => ord != Less,
            Self::Lt => ord == Less,
            Self::Lte => ord != Greater,
        }
    }
}

impl std::fmt::Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A value-producing expression evaluated against one document.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Dotted field path, rendered as `"$path"`.
    Field(String),
    Literal(Value),
    Add(Vec<Expr>),
    Multiply(Vec<Expr>),
    Divide(Box<Expr>, Box<Expr>),
    /// Array element by index; negative indexes count from the end.
    ArrayElemAt(Box<Expr>, i64),
    /// Epoch milliseconds (or RFC 3339 text) to a date.
    ToDate(Box<Expr>),
    /// Calendar year of a date, in UTC.
    Year(Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn add(operands: impl IntoIterator<Item = Expr>) -> Self {
        Self::Add(operands.into_iter().collect())
    }

    pub fn multiply(operands: impl IntoIterator<Item = Expr>) -> Self {
        Self::Multiply(operands.into_iter().collect())
    }

    pub fn divide(dividend: Expr, divisor: Expr) -> Self {
        Self::Divide(Box::new(dividend), Box::new(divisor))
    }

    pub fn elem_at(array: Expr, index: i64) -> Self {
        Self::ArrayElemAt(Box::new(array), index)
    }

    pub fn to_date(inner: Expr) -> Self {
        Self::ToDate(Box::new(inner))
    }

    pub fn year(inner: Expr) -> Self {
        Self::Year(Box::new(inner))
    }

    pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Compare(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Field(path) => Value::String(format!("${path}")),
            Self::Literal(v) => {
                // A literal string starting with `$` would read back as a field path.
                if v.as_str().is_some_and(|s| s.starts_with('$')) {
                    json!({ "$literal": v })
                } else {
                    v.clone()
                }
            }
            Self::Add(items) => json!({ "$add": items.iter().map(Expr::to_json).collect::<Vec<_>>() }),
            Self::Multiply(items) => {
                json!({ "$multiply": items.iter().map(Expr::to_json).collect::<Vec<_>>() })
            }
            Self::Divide(a, b) => json!({ "$divide": [a.to_json(), b.to_json()] }),
            Self::ArrayElemAt(a, idx) => json!({ "$arrayElemAt": [a.to_json(), idx] }),
            Self::ToDate(inner) => json!({ "$toDate": inner.to_json() }),
            Self::Year(inner) => json!({ "$year": inner.to_json() }),
            Self::Compare(op, a, b) => {
                let mut obj = Map::new();
                obj.insert(op.keyword().to_string(), json!([a.to_json(), b.to_json()]));
                Value::Object(obj)
            }
        }
    }
}

/// Document predicate of a match stage.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Compare {
        field: String,
        op: CmpOp,
        value: Value,
    },
    Exists {
        field: String,
        exists: bool,
    },
    /// Field is an array of exactly `len` elements.
    Size {
        field: String,
        len: usize,
    },
    /// Truthiness of an aggregation expression (`$expr`).
    Expr(Expr),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CmpOp::Eq, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CmpOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CmpOp::Lt, value)
    }

    pub fn compare(field: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists {
            field: field.into(),
            exists: true,
        }
    }

    pub fn size(field: impl Into<String>, len: usize) -> Self {
        Self::Size {
            field: field.into(),
            len,
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Self::Expr(expr)
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    /// Render as a query document. Conditions on the same field are merged
    /// into one operator object (`{"helpful": {"$exists": true, "$size": 2}}`).
    pub fn to_json(&self) -> Value {
        let mut doc = Map::new();
        self.write_into(&mut doc);
        Value::Object(doc)
    }

    fn write_into(&self, doc: &mut Map<String, Value>) {
        match self {
            Self::Compare {
                field,
                op: CmpOp::Eq,
                value,
            } if !doc.contains_key(field) && !value.is_object() => {
                doc.insert(field.clone(), value.clone());
            }
            Self::Compare { field, op, value } => {
                merge_operator(doc, field, op.keyword(), value.clone());
            }
            Self::Exists { field, exists } => {
                merge_operator(doc, field, "$exists", Value::Bool(*exists));
            }
            Self::Size { field, len } => {
                merge_operator(doc, field, "$size", json!(len));
            }
            Self::Expr(expr) => {
                doc.insert("$expr".to_string(), expr.to_json());
            }
            Self::And(filters) => {
                for f in filters {
                    f.write_into(doc);
                }
            }
        }
    }
}

fn merge_operator(doc: &mut Map<String, Value>, field: &str, keyword: &str, value: Value) {
    let slot = doc
        .entry(field.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        // An earlier shorthand equality; spell it out so both conditions fit.
        let prev = std::mem::take(slot);
        *slot = json!({ "$eq": prev });
    }
    if let Value::Object(ops) = slot {
        ops.insert(keyword.to_string(), value);
    }
}
