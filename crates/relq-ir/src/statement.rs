//! Statement IR executed by a store connection.
//!
//! The planner translates accumulated builder state into one
//! [`SelectStatement`] (plus, for paged fetches, a companion count
//! statement). A store connection executes statements without seeing any
//! of the typed builder surface.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A qualified column reference (`alias.field`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Source or join alias the column belongs to.
    pub alias: String,
    /// Field name within the aliased entity.
    pub field: String,
}

impl ColumnRef {
    /// Create a new column reference.
    pub fn new(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            field: field.into(),
        }
    }

    /// The qualified `alias.field` name.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.alias, self.field)
    }
}

/// Aggregate function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    /// Count of rows or non-null values.
    Count,
    /// Sum of numeric values.
    Sum,
    /// Average of numeric values.
    Avg,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
}

impl AggregateFunction {
    /// Lower-case name as it appears in labels and rendered SQL.
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

/// A single aggregate computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCall {
    /// The aggregate function to apply.
    pub function: AggregateFunction,
    /// Column to aggregate (`None` for `count(*)`).
    pub column: Option<ColumnRef>,
}

impl AggregateCall {
    /// Create a `count(*)` call.
    pub fn count_rows() -> Self {
        Self {
            function: AggregateFunction::Count,
            column: None,
        }
    }

    /// Create an aggregate over a column.
    pub fn over(function: AggregateFunction, column: ColumnRef) -> Self {
        Self {
            function,
            column: Some(column),
        }
    }

    /// Stable label, e.g. `count(*)` or `avg(m.age)`.
    pub fn label(&self) -> String {
        match &self.column {
            Some(col) => format!("{}({})", self.function.name(), col.qualified()),
            None => format!("{}(*)", self.function.name()),
        }
    }
}

/// A scalar-valued expression within a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarExpr {
    /// A plain column.
    Column(ColumnRef),
    /// An aggregate computation.
    Aggregate(AggregateCall),
}

impl ScalarExpr {
    /// Stable label for result addressing.
    pub fn label(&self) -> String {
        match self {
            ScalarExpr::Column(col) => col.qualified(),
            ScalarExpr::Aggregate(call) => call.label(),
        }
    }

    /// Check if this expression is an aggregate.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, ScalarExpr::Aggregate(_))
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// A bound literal value.
    Value(Value),
    /// Another column (path-vs-path comparison, used by theta joins).
    Column(ColumnRef),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl CompareOp {
    /// SQL operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Boolean filter expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Binary comparison of a scalar expression against an operand.
    Compare {
        /// Left-hand expression.
        lhs: ScalarExpr,
        /// Comparison operator.
        op: CompareOp,
        /// Right-hand operand.
        rhs: Operand,
    },
    /// Inclusive range check.
    Between {
        /// Column under test.
        column: ColumnRef,
        /// Lower bound (inclusive).
        low: Value,
        /// Upper bound (inclusive).
        high: Value,
    },
    /// Set membership check.
    In {
        /// Column under test.
        column: ColumnRef,
        /// Candidate values.
        values: Vec<Value>,
        /// Negate the membership test.
        negated: bool,
    },
    /// Null check.
    IsNull {
        /// Column under test.
        column: ColumnRef,
        /// Negate (IS NOT NULL).
        negated: bool,
    },
    /// SQL LIKE pattern match (`%` and `_` wildcards, `\` escapes).
    Like {
        /// Column under test.
        column: ColumnRef,
        /// Match pattern.
        pattern: String,
    },
    /// All sub-expressions must hold.
    And(Vec<FilterExpr>),
    /// At least one sub-expression must hold.
    Or(Vec<FilterExpr>),
    /// Negation.
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Conjoin expressions, flattening the trivial cases.
    pub fn and(mut exprs: Vec<FilterExpr>) -> Option<FilterExpr> {
        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(FilterExpr::And(exprs)),
        }
    }

    /// Negate this expression.
    pub fn not(self) -> FilterExpr {
        FilterExpr::Not(Box::new(self))
    }

    /// Visit every column referenced anywhere in this expression.
    pub fn for_each_column<F: FnMut(&ColumnRef)>(&self, f: &mut F) {
        match self {
            FilterExpr::Compare { lhs, rhs, .. } => {
                match lhs {
                    ScalarExpr::Column(col) => f(col),
                    ScalarExpr::Aggregate(call) => {
                        if let Some(col) = &call.column {
                            f(col);
                        }
                    }
                }
                if let Operand::Column(col) = rhs {
                    f(col);
                }
            }
            FilterExpr::Between { column, .. }
            | FilterExpr::In { column, .. }
            | FilterExpr::IsNull { column, .. }
            | FilterExpr::Like { column, .. } => f(column),
            FilterExpr::And(exprs) | FilterExpr::Or(exprs) => {
                for e in exprs {
                    e.for_each_column(f);
                }
            }
            FilterExpr::Not(inner) => inner.for_each_column(f),
        }
    }

    /// Check whether any comparison in this tree involves an aggregate.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            FilterExpr::Compare { lhs, .. } => lhs.is_aggregate(),
            FilterExpr::Between { .. }
            | FilterExpr::In { .. }
            | FilterExpr::IsNull { .. }
            | FilterExpr::Like { .. } => false,
            FilterExpr::And(exprs) | FilterExpr::Or(exprs) => {
                exprs.iter().any(FilterExpr::contains_aggregate)
            }
            FilterExpr::Not(inner) => inner.contains_aggregate(),
        }
    }
}

/// A query source (`FROM entity AS alias`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceClause {
    /// Entity name.
    pub entity: String,
    /// Binding alias.
    pub alias: String,
}

impl SourceClause {
    /// Create a new source clause.
    pub fn new(entity: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            alias: alias.into(),
        }
    }
}

/// An inner join clause derived from a declared relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinClause {
    /// Joined entity name.
    pub entity: String,
    /// Alias bound to the joined entity.
    pub alias: String,
    /// Join key on the already-bound side.
    pub left: ColumnRef,
    /// Join key on the newly-bound side.
    pub right: ColumnRef,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Null placement for an ordered key.
///
/// The planner always resolves the builder's default policy before the
/// statement reaches a store, so the IR carries only explicit placements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullOrder {
    /// Nulls sort before all non-null values.
    First,
    /// Nulls sort after all non-null values.
    Last,
}

/// Order specification for one sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Column to order by.
    pub column: ColumnRef,
    /// Sort direction.
    pub direction: OrderDirection,
    /// Explicit null placement.
    pub nulls: NullOrder,
}

impl OrderSpec {
    /// Ascending order with nulls last.
    pub fn asc(column: ColumnRef) -> Self {
        Self {
            column,
            direction: OrderDirection::Asc,
            nulls: NullOrder::Last,
        }
    }

    /// Descending order with nulls last.
    pub fn desc(column: ColumnRef) -> Self {
        Self {
            column,
            direction: OrderDirection::Desc,
            nulls: NullOrder::Last,
        }
    }

    /// Override null placement.
    pub fn with_nulls(mut self, nulls: NullOrder) -> Self {
        self.nulls = nulls;
        self
    }
}

/// A projected output column with its result label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjColumn {
    /// Expression to compute.
    pub expr: ScalarExpr,
    /// Label under which the value appears in result rows.
    pub label: String,
}

impl ProjColumn {
    /// Create a projected column labeled by the expression itself.
    pub fn new(expr: ScalarExpr) -> Self {
        let label = expr.label();
        Self { expr, label }
    }
}

/// A fully translated select statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    /// Query sources; more than one forms a cross product.
    pub sources: Vec<SourceClause>,
    /// Inner joins derived from declared relationships.
    pub joins: Vec<JoinClause>,
    /// Output columns in projection order.
    pub projection: Vec<ProjColumn>,
    /// Row-level filter.
    pub filter: Option<FilterExpr>,
    /// Grouping keys.
    pub group_by: Vec<ColumnRef>,
    /// Post-aggregation filter.
    pub having: Option<FilterExpr>,
    /// Sort keys, applied in order.
    pub order_by: Vec<OrderSpec>,
    /// Rows to skip.
    pub offset: Option<u64>,
    /// Maximum rows to return.
    pub limit: Option<u64>,
}

impl SelectStatement {
    /// Check whether this statement produces grouped/aggregated output.
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || self.projection.iter().any(|p| p.expr.is_aggregate())
    }

    /// Result labels in projection order.
    pub fn labels(&self) -> Vec<String> {
        self.projection.iter().map(|p| p.label.clone()).collect()
    }
}

/// A statement handed to a store connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// A planner-translated select statement.
    Select(SelectStatement),
    /// A raw statement that bypasses the planner entirely.
    Raw {
        /// Statement text in the store's own query language.
        sql: String,
        /// Positional bind parameters.
        params: Vec<Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(alias: &str, field: &str) -> ColumnRef {
        ColumnRef::new(alias, field)
    }

    #[test]
    fn test_labels() {
        assert_eq!(col("m", "age").qualified(), "m.age");
        assert_eq!(AggregateCall::count_rows().label(), "count(*)");
        assert_eq!(
            AggregateCall::over(AggregateFunction::Avg, col("m", "age")).label(),
            "avg(m.age)"
        );
        assert_eq!(ScalarExpr::Column(col("t", "name")).label(), "t.name");
    }

    #[test]
    fn test_filter_and_flattening() {
        assert_eq!(FilterExpr::and(vec![]), None);

        let single = FilterExpr::IsNull {
            column: col("m", "username"),
            negated: false,
        };
        assert_eq!(FilterExpr::and(vec![single.clone()]), Some(single.clone()));

        let both = FilterExpr::and(vec![
            single.clone(),
            FilterExpr::Like {
                column: col("m", "username"),
                pattern: "mem%".into(),
            },
        ]);
        assert!(matches!(both, Some(FilterExpr::And(ref v)) if v.len() == 2));
    }

    #[test]
    fn test_for_each_column_visits_nested() {
        let expr = FilterExpr::And(vec![
            FilterExpr::Compare {
                lhs: ScalarExpr::Column(col("m", "username")),
                op: CompareOp::Eq,
                rhs: Operand::Column(col("t", "name")),
            },
            FilterExpr::Not(Box::new(FilterExpr::IsNull {
                column: col("m", "age"),
                negated: false,
            })),
        ]);

        let mut seen = Vec::new();
        expr.for_each_column(&mut |c| seen.push(c.qualified()));
        assert_eq!(seen, vec!["m.username", "t.name", "m.age"]);
    }

    #[test]
    fn test_contains_aggregate() {
        let plain = FilterExpr::Compare {
            lhs: ScalarExpr::Column(col("m", "age")),
            op: CompareOp::Gt,
            rhs: Operand::Value(Value::Int32(18)),
        };
        assert!(!plain.contains_aggregate());

        let agg = FilterExpr::Compare {
            lhs: ScalarExpr::Aggregate(AggregateCall::over(
                AggregateFunction::Avg,
                col("m", "age"),
            )),
            op: CompareOp::Ge,
            rhs: Operand::Value(Value::Int32(20)),
        };
        assert!(agg.contains_aggregate());
        assert!(FilterExpr::And(vec![plain, agg]).contains_aggregate());
    }

    #[test]
    fn test_grouped_detection() {
        let mut stmt = SelectStatement {
            sources: vec![SourceClause::new("Member", "m")],
            joins: vec![],
            projection: vec![ProjColumn::new(ScalarExpr::Column(col("m", "age")))],
            filter: None,
            group_by: vec![],
            having: None,
            order_by: vec![],
            offset: None,
            limit: None,
        };
        assert!(!stmt.is_grouped());

        stmt.projection = vec![ProjColumn::new(ScalarExpr::Aggregate(
            AggregateCall::count_rows(),
        ))];
        assert!(stmt.is_grouped());
    }

    #[test]
    fn test_statement_serialization_roundtrip() {
        let stmt = Statement::Select(SelectStatement {
            sources: vec![SourceClause::new("Member", "m")],
            joins: vec![JoinClause {
                entity: "Team".into(),
                alias: "t".into(),
                left: col("m", "team_id"),
                right: col("t", "id"),
            }],
            projection: vec![
                ProjColumn::new(ScalarExpr::Column(col("m", "username"))),
                ProjColumn::new(ScalarExpr::Aggregate(AggregateCall::count_rows())),
            ],
            filter: Some(FilterExpr::Between {
                column: col("m", "age"),
                low: Value::Int32(10),
                high: Value::Int32(30),
            }),
            group_by: vec![col("m", "username")],
            having: None,
            order_by: vec![OrderSpec::desc(col("m", "username")).with_nulls(NullOrder::First)],
            offset: Some(1),
            limit: Some(2),
        });

        let json = serde_json::to_string(&stmt).unwrap();
        let back: Statement = serde_json::from_str(&json).unwrap();
        assert_eq!(stmt, back);
    }
}
