//! Boolean predicates and the typed comparison surface on paths.

use crate::error::Error;
use crate::expr::Path;
use relq_ir::{CompareOp, FilterExpr, Operand, ScalarExpr, Value};

/// A composable boolean predicate.
///
/// Predicates are built from typed path comparisons, so by the time one
/// exists its operand kinds have already been checked. Combinators consume
/// their inputs and return new predicates.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub(crate) expr: FilterExpr,
}

impl Predicate {
    pub(crate) fn new(expr: FilterExpr) -> Self {
        Self { expr }
    }

    /// Both predicates must hold.
    pub fn and(self, other: Predicate) -> Predicate {
        let mut parts = match self.expr {
            FilterExpr::And(parts) => parts,
            expr => vec![expr],
        };
        match other.expr {
            FilterExpr::And(more) => parts.extend(more),
            expr => parts.push(expr),
        }
        Predicate::new(FilterExpr::And(parts))
    }

    /// At least one predicate must hold.
    pub fn or(self, other: Predicate) -> Predicate {
        let mut parts = match self.expr {
            FilterExpr::Or(parts) => parts,
            expr => vec![expr],
        };
        match other.expr {
            FilterExpr::Or(more) => parts.extend(more),
            expr => parts.push(expr),
        }
        Predicate::new(FilterExpr::Or(parts))
    }

    /// Negate this predicate.
    pub fn not(self) -> Predicate {
        Predicate::new(self.expr.not())
    }

    /// Conjoin optional predicates, skipping the absent ones.
    ///
    /// Returns `None` when every input is absent, which leaves a query
    /// unfiltered. This is the building block for dynamic search forms
    /// where each criterion may or may not be supplied.
    pub fn and_all<I>(predicates: I) -> Option<Predicate>
    where
        I: IntoIterator<Item = Option<Predicate>>,
    {
        predicates
            .into_iter()
            .flatten()
            .reduce(|acc, p| acc.and(p))
    }
}

impl Path {
    fn literal(&self, value: Value) -> Result<Value, Error> {
        match value.kind() {
            None => Err(Error::InvalidQuery(format!(
                "cannot compare {} against null; use is_null or is_not_null",
                self.label()
            ))),
            Some(kind) if self.kind.comparable_with(kind) => Ok(value),
            Some(kind) => Err(Error::TypeMismatch {
                path: self.label(),
                expected: self.kind,
                actual: kind,
            }),
        }
    }

    fn compare(&self, op: CompareOp, value: impl Into<Value>) -> Result<Predicate, Error> {
        let value = self.literal(value.into())?;
        Ok(Predicate::new(FilterExpr::Compare {
            lhs: ScalarExpr::Column(self.column_ref()),
            op,
            rhs: Operand::Value(value),
        }))
    }

    fn compare_path(&self, op: CompareOp, other: &Path) -> Result<Predicate, Error> {
        if !self.kind.comparable_with(other.kind) {
            return Err(Error::TypeMismatch {
                path: self.label(),
                expected: self.kind,
                actual: other.kind,
            });
        }
        Ok(Predicate::new(FilterExpr::Compare {
            lhs: ScalarExpr::Column(self.column_ref()),
            op,
            rhs: Operand::Column(other.column_ref()),
        }))
    }

    /// `self = value`.
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

    /// `self = other`, comparing two paths (theta join predicate).
    pub fn eq_path(&self, other: &Path) -> Result<Predicate, Error> {
        self.compare_path(CompareOp::Eq, other)
    }

    /// `self <> other`.
    pub fn ne_path(&self, other: &Path) -> Result<Predicate, Error> {
        self.compare_path(CompareOp::Ne, other)
    }

    /// `self > other`.
    pub fn gt_path(&self, other: &Path) -> Result<Predicate, Error> {
        self.compare_path(CompareOp::Gt, other)
    }

    /// `self >= other`.
    pub fn ge_path(&self, other: &Path) -> Result<Predicate, Error> {
        self.compare_path(CompareOp::Ge, other)
    }

    /// `self < other`.
    pub fn lt_path(&self, other: &Path) -> Result<Predicate, Error> {
        self.compare_path(CompareOp::Lt, other)
    }

    /// `self <= other`.
    pub fn le_path(&self, other: &Path) -> Result<Predicate, Error> {
        self.compare_path(CompareOp::Le, other)
    }

    /// `low <= self <= high`, both bounds inclusive.
    pub fn between(
        &self,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Result<Predicate, Error> {
        let low = self.literal(low.into())?;
        let high = self.literal(high.into())?;
        Ok(Predicate::new(FilterExpr::Between {
            column: self.column_ref(),
            low,
            high,
        }))
    }

    /// `self IN (values...)`.
    pub fn in_values<I, V>(&self, values: I) -> Result<Predicate, Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.membership(values, false)
    }

    /// `self NOT IN (values...)`.
    pub fn not_in_values<I, V>(&self, values: I) -> Result<Predicate, Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.membership(values, true)
    }

    fn membership<I, V>(&self, values: I, negated: bool) -> Result<Predicate, Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values
            .into_iter()
            .map(|v| self.literal(v.into()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Predicate::new(FilterExpr::In {
            column: self.column_ref(),
            values,
            negated,
        }))
    }

    /// Pattern match with `%` and `_` wildcards; `\` escapes a wildcard.
    pub fn like(&self, pattern: impl Into<String>) -> Result<Predicate, Error> {
        self.string_only()?;
        Ok(Predicate::new(FilterExpr::Like {
            column: self.column_ref(),
            pattern: pattern.into(),
        }))
    }

    /// Substring match; the needle is taken literally.
    pub fn contains(&self, needle: &str) -> Result<Predicate, Error> {
        self.like(format!("%{}%", escape_like(needle)))
    }

    /// Prefix match; the prefix is taken literally.
    pub fn starts_with(&self, prefix: &str) -> Result<Predicate, Error> {
        self.like(format!("{}%", escape_like(prefix)))
    }

    /// Suffix match; the suffix is taken literally.
    pub fn ends_with(&self, suffix: &str) -> Result<Predicate, Error> {
        self.like(format!("%{}", escape_like(suffix)))
    }

    /// `self IS NULL`.
    pub fn is_null(&self) -> Predicate {
        Predicate::new(FilterExpr::IsNull {
            column: self.column_ref(),
            negated: false,
        })
    }

    /// `self IS NOT NULL`.
    pub fn is_not_null(&self) -> Predicate {
        Predicate::new(FilterExpr::IsNull {
            column: self.column_ref(),
            negated: true,
        })
    }

    fn string_only(&self) -> Result<(), Error> {
        if self.kind == relq_ir::ValueKind::String {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                path: self.label(),
                expected: relq_ir::ValueKind::String,
                actual: self.kind,
            })
        }
    }
}

/// Escape LIKE wildcards so a user-supplied fragment matches literally.
fn escape_like(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
