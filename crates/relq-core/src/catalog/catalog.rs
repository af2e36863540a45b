//! Catalog registry for entity and relationship metadata.

use super::{EntityDef, FieldDef, RelationDef, RelationEdge};
use crate::error::Error;
use crate::expr::EntityAlias;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable registry of entity and relationship definitions.
///
/// Built once at startup via [`Catalog::builder`], then shared read-only
/// (typically behind an `Arc`). All query construction resolves names and
/// types against this registry.
#[derive(Debug)]
pub struct Catalog {
    entities: HashMap<String, Arc<EntityDef>>,
    entity_order: Vec<String>,
    relations: Vec<RelationDef>,
}

/// Builder accumulating catalog definitions before validation.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entities: Vec<EntityDef>,
    relations: Vec<RelationDef>,
}

impl CatalogBuilder {
    /// Add an entity definition.
    pub fn entity(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    /// Add a relationship definition.
    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Validate the accumulated definitions and freeze the catalog.
    ///
    /// Checks: entity names unique, each entity declares its identifier
    /// field, relationship endpoints and join-key fields exist, and both
    /// ends of a join key carry the same scalar type.
    pub fn build(self) -> Result<Catalog, Error> {
        let mut entities: HashMap<String, Arc<EntityDef>> = HashMap::new();
        let mut entity_order = Vec::with_capacity(self.entities.len());

        for entity in self.entities {
            if entity.identity().is_none() {
                return Err(Error::InvalidData(format!(
                    "entity '{}' does not declare its identifier field '{}'",
                    entity.name, entity.identity_field
                )));
            }
            if entities.contains_key(&entity.name) {
                return Err(Error::InvalidData(format!(
                    "duplicate entity '{}'",
                    entity.name
                )));
            }
            entity_order.push(entity.name.clone());
            entities.insert(entity.name.clone(), Arc::new(entity));
        }

        for relation in &self.relations {
            let owning = entities
                .get(&relation.owning_entity)
                .ok_or_else(|| Error::UnknownEntity(relation.owning_entity.clone()))?;
            let target = entities
                .get(&relation.target_entity)
                .ok_or_else(|| Error::UnknownEntity(relation.target_entity.clone()))?;

            let fk = owning
                .field(&relation.owning_field)
                .ok_or_else(|| Error::UnknownField {
                    entity: relation.owning_entity.clone(),
                    field: relation.owning_field.clone(),
                })?;
            let key = target
                .field(&relation.target_field)
                .ok_or_else(|| Error::UnknownField {
                    entity: relation.target_entity.clone(),
                    field: relation.target_field.clone(),
                })?;

            if fk.scalar != key.scalar {
                return Err(Error::InvalidData(format!(
                    "relationship '{}' joins {}.{} ({:?}) against {}.{} ({:?})",
                    relation.name,
                    relation.owning_entity,
                    relation.owning_field,
                    fk.scalar,
                    relation.target_entity,
                    relation.target_field,
                    key.scalar,
                )));
            }
        }

        Ok(Catalog {
            entities,
            entity_order,
            relations: self.relations,
        })
    }
}

impl Catalog {
    /// Start building a catalog.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Get an entity definition by name.
    pub fn entity(&self, name: &str) -> Result<&Arc<EntityDef>, Error> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Ordered field descriptors of an entity.
    pub fn fields_of(&self, entity: &str) -> Result<&[FieldDef], Error> {
        Ok(&self.entity(entity)?.fields)
    }

    /// All entity names, in declaration order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entity_order.iter().map(String::as_str)
    }

    /// Look up a relationship declared on its owning side.
    pub fn relation(&self, owning_entity: &str, name: &str) -> Result<&RelationDef, Error> {
        self.relations
            .iter()
            .find(|r| r.owning_entity == owning_entity && r.name == name)
            .ok_or_else(|| Error::UnknownRelation {
                entity: owning_entity.to_string(),
                relation: name.to_string(),
            })
    }

    /// Look up a relationship by the mirror name it exposes on its target.
    pub fn mirror_relation(&self, target_entity: &str, mirror: &str) -> Result<&RelationDef, Error> {
        self.relations
            .iter()
            .find(|r| {
                r.target_entity == target_entity && r.mirror_name.as_deref() == Some(mirror)
            })
            .ok_or_else(|| Error::UnknownRelation {
                entity: target_entity.to_string(),
                relation: mirror.to_string(),
            })
    }

    /// All navigable relationship edges starting from an entity.
    ///
    /// Includes owning edges declared on the entity and mirror edges of
    /// relationships that target it.
    pub fn edges_of(&self, entity: &str) -> Vec<RelationEdge> {
        let mut edges = Vec::new();
        for relation in &self.relations {
            if relation.owning_entity == entity {
                edges.push(relation.owning_edge());
            }
            if relation.target_entity == entity {
                if let Some(mirror) = relation.mirror_edge() {
                    edges.push(mirror);
                }
            }
        }
        edges
    }

    /// Resolve a single navigable edge by name from an entity.
    pub fn edge(&self, entity: &str, name: &str) -> Result<RelationEdge, Error> {
        self.edges_of(entity)
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::UnknownRelation {
                entity: entity.to_string(),
                relation: name.to_string(),
            })
    }

    /// Bind an entity to a query alias.
    pub fn alias(&self, entity: &str, as_name: impl Into<String>) -> Result<EntityAlias, Error> {
        Ok(EntityAlias::new(self.entity(entity)?.clone(), as_name))
    }
}
