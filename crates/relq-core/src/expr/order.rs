//! Sort key specifications.

use relq_ir::{ColumnRef, NullOrder, OrderDirection, OrderSpec};

/// A sort key over one column, with optional explicit null placement.
///
/// When no placement is chosen, the planner applies the default policy:
/// nulls sort after all non-null values in both directions.
#[derive(Debug, Clone)]
pub struct Ordering {
    pub(crate) column: ColumnRef,
    pub(crate) direction: OrderDirection,
    pub(crate) nulls: Option<NullOrder>,
}

impl Ordering {
    /// Ascending order.
    pub fn asc(column: ColumnRef) -> Self {
        Self {
            column,
            direction: OrderDirection::Asc,
            nulls: None,
        }
    }

    /// Descending order.
    pub fn desc(column: ColumnRef) -> Self {
        Self {
            column,
            direction: OrderDirection::Desc,
            nulls: None,
        }
    }

    /// Place null values before all non-null values.
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullOrder::First);
        self
    }

    /// Place null values after all non-null values.
    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullOrder::Last);
        self
    }

    /// Resolve into statement IR, applying the default null placement.
    pub(crate) fn into_spec(self) -> OrderSpec {
        OrderSpec {
            column: self.column,
            direction: self.direction,
            nulls: self.nulls.unwrap_or(NullOrder::Last),
        }
    }
}
