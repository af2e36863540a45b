//! relq core - catalog, typed query construction, planning, and execution.
//!
//! This crate provides the typed query layer: a validated entity catalog,
//! a construction-time-checked expression algebra, a fluent select
//! builder, the planner that translates builders into statement IR, and
//! an executor with the standard fetch modes. An in-memory store backend
//! implements the connection trait for tests and embedded use.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod catalog;
pub mod error;
pub mod exec;
pub mod expr;
pub mod plan;
pub mod query;
pub mod store;

pub use catalog::{Catalog, CatalogBuilder, EntityDef, FieldDef, RelationDef, ScalarType};
pub use error::Error;
pub use exec::{Connection, Executor, QueryResults, Row};
pub use expr::{Agg, EntityAlias, Ordering, Path, Predicate, SelectExpr};
pub use query::{QueryFactory, RawQuery, SelectQuery};
pub use store::MemStore;

/// Re-export statement IR and value types.
pub use relq_ir as ir;
