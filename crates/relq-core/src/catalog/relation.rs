//! Relationship definitions between entities.

use serde::{Deserialize, Serialize};

/// A declared relationship between two entity types.
///
/// The owning side carries the foreign key (e.g. `Member.team_id` →
/// `Team.id`). The mirror side, when named, is a derived reverse
/// collection view (e.g. `Team.members`) recomputed from owning-side
/// data; it is never independently persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relationship name as seen from the owning side (e.g. `team`).
    pub name: String,
    /// Entity holding the foreign key.
    pub owning_entity: String,
    /// Foreign-key field on the owning entity.
    pub owning_field: String,
    /// Referenced entity.
    pub target_entity: String,
    /// Referenced field on the target entity (usually its identifier).
    pub target_field: String,
    /// Name of the derived reverse view on the target entity, if exposed.
    pub mirror_name: Option<String>,
}

impl RelationDef {
    /// Declare a many-to-one relationship from the FK-bearing side.
    pub fn many_to_one(
        name: impl Into<String>,
        owning_entity: impl Into<String>,
        owning_field: impl Into<String>,
        target_entity: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            owning_entity: owning_entity.into(),
            owning_field: owning_field.into(),
            target_entity: target_entity.into(),
            target_field: target_field.into(),
            mirror_name: None,
        }
    }

    /// Expose the derived reverse collection under the given name.
    pub fn with_mirror(mut self, mirror_name: impl Into<String>) -> Self {
        self.mirror_name = Some(mirror_name.into());
        self
    }
}

/// One navigable direction of a relationship.
///
/// The owning edge follows the foreign key (Member → Team); the mirror
/// edge walks it backwards (Team → members). Both directions join on the
/// same declared key.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationEdge {
    /// Name used to navigate this direction.
    pub name: String,
    /// Entity the edge starts from.
    pub from_entity: String,
    /// Entity the edge reaches.
    pub to_entity: String,
    /// Join key field on the starting side.
    pub from_field: String,
    /// Join key field on the reached side.
    pub to_field: String,
    /// Whether this direction is the owning (FK-bearing) side.
    pub owning: bool,
}

impl RelationDef {
    /// The owning-side edge of this relationship.
    pub fn owning_edge(&self) -> RelationEdge {
        RelationEdge {
            name: self.name.clone(),
            from_entity: self.owning_entity.clone(),
            to_entity: self.target_entity.clone(),
            from_field: self.owning_field.clone(),
            to_field: self.target_field.clone(),
            owning: true,
        }
    }

    /// The mirror-side edge, if a mirror view is declared.
    pub fn mirror_edge(&self) -> Option<RelationEdge> {
        self.mirror_name.as_ref().map(|mirror| RelationEdge {
            name: mirror.clone(),
            from_entity: self.target_entity.clone(),
            to_entity: self.owning_entity.clone(),
            from_field: self.target_field.clone(),
            to_field: self.owning_field.clone(),
            owning: false,
        })
    }
}
