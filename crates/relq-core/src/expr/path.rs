//! Alias-bound field paths, the typed roots of the expression algebra.

use crate::catalog::EntityDef;
use crate::error::Error;
use crate::expr::Ordering;
use relq_ir::{ColumnRef, ValueKind};
use std::sync::Arc;

/// An entity bound to a query alias.
///
/// Aliases are how one entity participates in a query more than once
/// (self joins) and how every path names its source. Obtained from
/// [`Catalog::alias`](crate::catalog::Catalog::alias).
#[derive(Debug, Clone)]
pub struct EntityAlias {
    entity: Arc<EntityDef>,
    name: String,
}

impl EntityAlias {
    pub(crate) fn new(entity: Arc<EntityDef>, name: impl Into<String>) -> Self {
        Self {
            entity,
            name: name.into(),
        }
    }

    /// The alias name as it appears in statements and result labels.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entity this alias binds.
    pub fn entity(&self) -> &Arc<EntityDef> {
        &self.entity
    }

    /// Resolve a field on this alias into a typed path.
    pub fn field(&self, name: &str) -> Result<Path, Error> {
        let field = self
            .entity
            .field(name)
            .ok_or_else(|| Error::UnknownField {
                entity: self.entity.name.clone(),
                field: name.to_string(),
            })?;
        Ok(Path {
            alias: self.name.clone(),
            field: field.name.clone(),
            kind: field.value_kind(),
            required: field.required,
        })
    }
}

/// A typed reference to one field of an aliased entity.
///
/// Paths carry the field's declared kind, so every comparison built from
/// one is type-checked at construction time.
#[derive(Debug, Clone)]
pub struct Path {
    pub(crate) alias: String,
    pub(crate) field: String,
    pub(crate) kind: ValueKind,
    pub(crate) required: bool,
}

impl Path {
    /// The declared kind of this field.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Whether the field is declared non-nullable.
    pub fn required(&self) -> bool {
        self.required
    }

    /// The qualified `alias.field` label this path projects under.
    pub fn label(&self) -> String {
        self.column_ref().qualified()
    }

    /// The untyped column reference for statement IR.
    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef::new(self.alias.clone(), self.field.clone())
    }

    /// Ascending sort key over this path.
    pub fn asc(&self) -> Ordering {
        Ordering::asc(self.column_ref())
    }

    /// Descending sort key over this path.
    pub fn desc(&self) -> Ordering {
        Ordering::desc(self.column_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, ScalarType};

    fn member_alias(name: &str) -> EntityAlias {
        let entity = EntityDef::new("Member", "id")
            .with_field(FieldDef::new("id", ScalarType::Int64))
            .with_field(FieldDef::optional("username", ScalarType::String))
            .with_field(FieldDef::new("age", ScalarType::Int32));
        EntityAlias::new(Arc::new(entity), name)
    }

    #[test]
    fn test_field_resolution() {
        let m = member_alias("m");

        let age = m.field("age").unwrap();
        assert_eq!(age.kind(), ValueKind::Int32);
        assert!(age.required());
        assert_eq!(age.label(), "m.age");

        let username = m.field("username").unwrap();
        assert!(!username.required());

        assert!(matches!(
            m.field("salary"),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn test_same_entity_two_aliases() {
        let m = member_alias("m");
        let sub = member_alias("sub");
        assert_eq!(m.field("age").unwrap().label(), "m.age");
        assert_eq!(sub.field("age").unwrap().label(), "sub.age");
    }
}
