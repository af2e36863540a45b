//! Row-level evaluation of statement IR: filters, ordering, aggregates.
//!
//! A scope maps result labels to values. Row scopes hold qualified column
//! labels (`m.age`); group scopes additionally hold aggregate labels
//! (`avg(m.age)`), so one evaluator serves both `where` and `having`.

use relq_ir::{
    AggregateCall, AggregateFunction, ColumnRef, CompareOp, FilterExpr, NullOrder, Operand,
    OrderSpec, ScalarExpr, Value,
};
use std::cmp::Ordering;
use std::collections::HashMap;

pub(crate) type Scope = HashMap<String, Value>;

pub(crate) fn column<'a>(scope: &'a Scope, col: &ColumnRef) -> &'a Value {
    scope.get(&col.qualified()).unwrap_or(&Value::Null)
}

fn scalar<'a>(scope: &'a Scope, expr: &ScalarExpr) -> &'a Value {
    scope.get(&expr.label()).unwrap_or(&Value::Null)
}

/// Evaluate a filter against one scope.
///
/// Comparisons involving null are false, as are the negated membership
/// and pattern forms; only the explicit null checks see null rows.
pub(crate) fn eval_filter(expr: &FilterExpr, scope: &Scope) -> bool {
    match expr {
        FilterExpr::Compare { lhs, op, rhs } => {
            let left = scalar(scope, lhs);
            let right = match rhs {
                Operand::Value(v) => v,
                Operand::Column(col) => column(scope, col),
            };
            if left.is_null() || right.is_null() {
                return false;
            }
            match op {
                CompareOp::Eq => left.loose_eq(right),
                CompareOp::Ne => !left.loose_eq(right),
                CompareOp::Lt => matches!(left.compare(right), Some(Ordering::Less)),
                CompareOp::Le => matches!(
                    left.compare(right),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                CompareOp::Gt => matches!(left.compare(right), Some(Ordering::Greater)),
                CompareOp::Ge => matches!(
                    left.compare(right),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
            }
        }
        FilterExpr::Between { column: col, low, high } => {
            let value = column(scope, col);
            if value.is_null() {
                return false;
            }
            matches!(
                value.compare(low),
                Some(Ordering::Greater | Ordering::Equal)
            ) && matches!(value.compare(high), Some(Ordering::Less | Ordering::Equal))
        }
        FilterExpr::In {
            column: col,
            values,
            negated,
        } => {
            let value = column(scope, col);
            if value.is_null() {
                return false;
            }
            let found = values.iter().any(|v| value.loose_eq(v));
            found != *negated
        }
        FilterExpr::IsNull { column: col, negated } => {
            column(scope, col).is_null() != *negated
        }
        FilterExpr::Like { column: col, pattern } => match column(scope, col) {
            Value::String(s) => like_match(s, pattern),
            _ => false,
        },
        FilterExpr::And(parts) => parts.iter().all(|p| eval_filter(p, scope)),
        FilterExpr::Or(parts) => parts.iter().any(|p| eval_filter(p, scope)),
        FilterExpr::Not(inner) => !eval_filter(inner, scope),
    }
}

/// Compare two scopes under a list of sort keys.
pub(crate) fn compare_rows(a: &Scope, b: &Scope, keys: &[OrderSpec]) -> Ordering {
    for key in keys {
        let left = column(a, &key.column);
        let right = column(b, &key.column);
        let ord = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            // Null placement is absolute, independent of direction.
            (true, false) => match key.nulls {
                NullOrder::First => return Ordering::Less,
                NullOrder::Last => return Ordering::Greater,
            },
            (false, true) => match key.nulls {
                NullOrder::First => return Ordering::Greater,
                NullOrder::Last => return Ordering::Less,
            },
            (false, false) => {
                let ord = left.compare(right).unwrap_or(Ordering::Equal);
                match key.direction {
                    relq_ir::OrderDirection::Asc => ord,
                    relq_ir::OrderDirection::Desc => ord.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Compute one aggregate over the rows of a group.
///
/// `count` ignores nulls when given a column; `sum` and `avg` evaluate
/// numerically; `min`/`max` use value ordering. Aggregates over nothing
/// but nulls (or an empty group) are null, except `count`, which is zero.
pub(crate) fn aggregate(call: &AggregateCall, rows: &[Scope]) -> Value {
    let values: Vec<&Value> = match &call.column {
        None => {
            if call.function == AggregateFunction::Count {
                return Value::Int64(rows.len() as i64);
            }
            Vec::new()
        }
        Some(col) => rows
            .iter()
            .map(|r| column(r, col))
            .filter(|v| !v.is_null())
            .collect(),
    };

    match call.function {
        AggregateFunction::Count => Value::Int64(values.len() as i64),
        AggregateFunction::Sum => {
            let nums: Vec<f64> = values.iter().filter_map(|v| v.as_numeric()).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                Value::Float64(nums.iter().sum())
            }
        }
        AggregateFunction::Avg => {
            let nums: Vec<f64> = values.iter().filter_map(|v| v.as_numeric()).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                Value::Float64(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        AggregateFunction::Min => fold_extreme(&values, Ordering::Less),
        AggregateFunction::Max => fold_extreme(&values, Ordering::Greater),
    }
}

fn fold_extreme(values: &[&Value], keep: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for value in values {
        best = match best {
            None => Some(value),
            Some(current) => {
                if value.compare(current) == Some(keep) {
                    Some(value)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.cloned().unwrap_or(Value::Null)
}

/// Match a string against a LIKE pattern.
///
/// `%` matches zero or more characters, `_` exactly one, and `\` makes
/// the next pattern character literal.
pub(crate) fn like_match(value: &str, pattern: &str) -> bool {
    fn rec(v: &[char], p: &[char]) -> bool {
        match p.split_first() {
            None => v.is_empty(),
            Some((&'%', rest)) => (0..=v.len()).any(|skip| rec(&v[skip..], rest)),
            Some((&'_', rest)) => !v.is_empty() && rec(&v[1..], rest),
            Some((&'\\', rest)) => match (rest.split_first(), v.split_first()) {
                (Some((pc, prest)), Some((vc, vrest))) if pc == vc => rec(vrest, prest),
                _ => false,
            },
            Some((&pc, rest)) => match v.split_first() {
                Some((&vc, vrest)) if vc == pc => rec(vrest, rest),
                _ => false,
            },
        }
    }
    let value: Vec<char> = value.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    rec(&value, &pattern)
}
