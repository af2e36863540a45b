//! Entity metamodel: entities, fields, relationships, and the catalog
//! registry that validates and serves them.

mod catalog;
mod entity;
mod field;
mod relation;

pub use catalog::{Catalog, CatalogBuilder};
pub use entity::EntityDef;
pub use field::{FieldDef, ScalarType};
pub use relation::{RelationDef, RelationEdge};
