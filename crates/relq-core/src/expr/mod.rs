//! Typed expression algebra: aliases, paths, predicates, aggregates, and
//! sort keys. Everything here is checked at construction time against the
//! catalog, before any statement exists.

mod aggregate;
mod order;
mod path;
mod predicate;

pub use aggregate::Agg;
pub use order::Ordering;
pub use path::{EntityAlias, Path};
pub use predicate::Predicate;

use relq_ir::{ProjColumn, ScalarExpr};

/// A projectable select expression.
///
/// Built via `From` conversions so `select()` accepts aliases, paths, and
/// aggregates uniformly. An entity alias expands to all of the entity's
/// fields at translation time.
#[derive(Debug, Clone)]
pub enum SelectExpr {
    /// All fields of an aliased entity.
    Entity(EntityAlias),
    /// A single field.
    Path(Path),
    /// An aggregate computation.
    Agg(Agg),
}

impl SelectExpr {
    /// Expand into labeled projection columns.
    pub(crate) fn proj_columns(&self) -> Vec<ProjColumn> {
        match self {
            SelectExpr::Entity(alias) => alias
                .entity()
                .fields
                .iter()
                .map(|f| {
                    let path = relq_ir::ColumnRef::new(alias.name(), f.name.clone());
                    ProjColumn::new(ScalarExpr::Column(path))
                })
                .collect(),
            SelectExpr::Path(path) => {
                vec![ProjColumn::new(ScalarExpr::Column(path.column_ref()))]
            }
            SelectExpr::Agg(agg) => {
                vec![ProjColumn::new(ScalarExpr::Aggregate(agg.call.clone()))]
            }
        }
    }
}

impl From<EntityAlias> for SelectExpr {
    fn from(alias: EntityAlias) -> Self {
        SelectExpr::Entity(alias)
    }
}

impl From<&EntityAlias> for SelectExpr {
    fn from(alias: &EntityAlias) -> Self {
        SelectExpr::Entity(alias.clone())
    }
}

impl From<Path> for SelectExpr {
    fn from(path: Path) -> Self {
        SelectExpr::Path(path)
    }
}

impl From<&Path> for SelectExpr {
    fn from(path: &Path) -> Self {
        SelectExpr::Path(path.clone())
    }
}

impl From<Agg> for SelectExpr {
    fn from(agg: Agg) -> Self {
        SelectExpr::Agg(agg)
    }
}

impl From<&Agg> for SelectExpr {
    fn from(agg: &Agg) -> Self {
        SelectExpr::Agg(agg.clone())
    }
}
