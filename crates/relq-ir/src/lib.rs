//! relq IR - Runtime values, statement IR, and result types.
//!
//! This crate defines the types that cross the store-connection boundary:
//! the [`Value`] runtime type, the translated [`SelectStatement`] produced
//! by the planner, and the [`RowSet`] shape returned by a store.

mod error;
mod row;
mod statement;
mod value;

pub use error::StoreError;
pub use row::RowSet;
pub use statement::{
    AggregateCall, AggregateFunction, ColumnRef, CompareOp, FilterExpr, JoinClause, NullOrder,
    Operand, OrderDirection, OrderSpec, ProjColumn, ScalarExpr, SelectStatement, SourceClause,
    Statement,
};
pub use value::{Value, ValueKind};
