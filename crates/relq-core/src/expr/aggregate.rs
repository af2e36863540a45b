//! Typed aggregate expressions.

use crate::error::Error;
use crate::expr::{Path, Predicate};
use relq_ir::{
    AggregateCall, AggregateFunction, CompareOp, FilterExpr, Operand, ScalarExpr, Value, ValueKind,
};

/// A typed aggregate computation over a path (or over whole rows).
///
/// Carries the kind the aggregate evaluates to, so `having` comparisons
/// get the same construction-time checking as row predicates.
#[derive(Debug, Clone)]
pub struct Agg {
    pub(crate) call: AggregateCall,
    kind: ValueKind,
}

impl Agg {
    /// `count(*)`, the number of rows.
    pub fn count() -> Agg {
        Agg {
            call: AggregateCall::count_rows(),
            kind: ValueKind::Int64,
        }
    }

    /// `count(path)`, the number of rows with a non-null value.
    pub fn count_path(path: &Path) -> Agg {
        Agg {
            call: AggregateCall::over(AggregateFunction::Count, path.column_ref()),
            kind: ValueKind::Int64,
        }
    }

    /// `sum(path)`. The path must be numeric.
    pub fn sum(path: &Path) -> Result<Agg, Error> {
        Self::numeric(AggregateFunction::Sum, path)
    }

    /// `avg(path)`. The path must be numeric.
    pub fn avg(path: &Path) -> Result<Agg, Error> {
        Self::numeric(AggregateFunction::Avg, path)
    }

    /// `min(path)`, evaluating to the path's own kind.
    pub fn min(path: &Path) -> Agg {
        Agg {
            call: AggregateCall::over(AggregateFunction::Min, path.column_ref()),
            kind: path.kind(),
        }
    }

    /// `max(path)`, evaluating to the path's own kind.
    pub fn max(path: &Path) -> Agg {
        Agg {
            call: AggregateCall::over(AggregateFunction::Max, path.column_ref()),
            kind: path.kind(),
        }
    }

    fn numeric(function: AggregateFunction, path: &Path) -> Result<Agg, Error> {
        if !path.kind().is_numeric() {
            return Err(Error::InvalidQuery(format!(
                "{}({}) requires a numeric field, got {}",
                function.name(),
                path.label(),
                path.kind()
            )));
        }
        Ok(Agg {
            call: AggregateCall::over(function, path.column_ref()),
            kind: ValueKind::Float64,
        })
    }

    /// The label this aggregate projects under, e.g. `avg(m.age)`.
    pub fn label(&self) -> String {
        self.call.label()
    }

    fn compare(&self, op: CompareOp, value: impl Into<Value>) -> Result<Predicate, Error> {
        let value = value.into();
        match value.kind() {
            None => Err(Error::InvalidQuery(format!(
                "cannot compare {} against null",
                self.label()
            ))),
            Some(kind) if self.kind.comparable_with(kind) => {
                Ok(Predicate::new(FilterExpr::Compare {
                    lhs: ScalarExpr::Aggregate(self.call.clone()),
                    op,
                    rhs: Operand::Value(value),
                }))
            }
            Some(kind) => Err(Error::TypeMismatch {
                path: self.label(),
                expected: self.kind,
                actual: kind,
            }),
        }
    }

    /// `self = value`, for `having` clauses.
    pub fn eq(&self, value: impl Into<Value>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Eq, value)
    }

    /// `self <> value`.
    pub fn ne(&self, value: impl Into<Value>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Ne, value)
    }

    /// `self > value`.
    pub fn gt(&self, value: impl Into<Value>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Gt, value)
    }

    /// `self >= value`.
    pub fn ge(&self, value: impl Into<Value>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Ge, value)
    }

    /// `self < value`.
    pub fn lt(&self, value: impl Into<Value>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Lt, value)
    }

    /// `self <= value`.
    pub fn le(&self, value: impl Into<Value>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Le, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, ScalarType};
    use crate::expr::EntityAlias;
    use std::sync::Arc;

    fn member_alias() -> EntityAlias {
        let entity = EntityDef::new("Member", "id")
            .with_field(FieldDef::new("id", ScalarType::Int64))
            .with_field(FieldDef::optional("username", ScalarType::String))
            .with_field(FieldDef::new("age", ScalarType::Int32));
        EntityAlias::new(Arc::new(entity), "m")
    }

    #[test]
    fn test_labels() {
        let m = member_alias();
        let age = m.field("age").unwrap();

        assert_eq!(Agg::count().label(), "count(*)");
        assert_eq!(Agg::count_path(&age).label(), "count(m.age)");
        assert_eq!(Agg::avg(&age).unwrap().label(), "avg(m.age)");
        assert_eq!(Agg::max(&age).label(), "max(m.age)");
    }

    #[test]
    fn test_numeric_requirement() {
        let m = member_alias();
        let username = m.field("username").unwrap();

        assert!(Agg::sum(&username).is_err());
        assert!(Agg::avg(&username).is_err());
        // min/max work on any comparable kind
        assert_eq!(Agg::min(&username).label(), "min(m.username)");
    }

    #[test]
    fn test_having_comparisons() {
        let m = member_alias();
        let age = m.field("age").unwrap();
        let username = m.field("username").unwrap();

        let avg = Agg::avg(&age).unwrap();
        assert!(avg.ge(20).is_ok());
        assert!(avg.gt(19.5f64).is_ok());
        assert!(matches!(avg.eq("twenty"), Err(Error::TypeMismatch { .. })));

        let min = Agg::min(&username);
        assert!(min.eq("member1").is_ok());
        assert!(min.eq(1).is_err());

        assert!(Agg::count().gt(0i64).is_ok());
    }
}
