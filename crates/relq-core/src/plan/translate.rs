//! Translation of accumulated builder state into statement IR.

use crate::catalog::Catalog;
use crate::error::Error;
use crate::expr::{Ordering, Predicate, SelectExpr};
use relq_ir::{
    AggregateCall, ColumnRef, FilterExpr, JoinClause, ProjColumn, ScalarExpr, SelectStatement,
    SourceClause,
};
use std::collections::HashMap;
use tracing::debug;

/// Accumulated state of a select builder, before translation.
#[derive(Debug, Clone, Default)]
pub(crate) struct QueryState {
    pub selects: Vec<SelectExpr>,
    pub sources: Vec<(String, String)>,
    pub joins: Vec<JoinSpec>,
    pub filters: Vec<Predicate>,
    pub group_by: Vec<ColumnRef>,
    pub having: Vec<Predicate>,
    pub order_by: Vec<Ordering>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// A relationship join requested on the builder, resolved at translation.
#[derive(Debug, Clone)]
pub(crate) struct JoinSpec {
    pub from_alias: String,
    pub from_entity: String,
    pub relation: String,
    pub target_alias: String,
    pub target_entity: String,
}

/// Translates builder state into validated [`SelectStatement`]s.
///
/// Translation is where alias binding is enforced: every alias a clause
/// references must have been bound by `from` or `join`, and referenced
/// fields must exist on the bound entity. Type checks happened earlier,
/// at predicate construction.
pub(crate) struct Planner<'a> {
    catalog: &'a Catalog,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn translate(&self, state: &QueryState) -> Result<SelectStatement, Error> {
        if state.sources.is_empty() {
            return Err(Error::InvalidQuery("query has no sources".into()));
        }

        // Bind aliases, sources first, then joins in declaration order.
        let mut bound: HashMap<&str, &str> = HashMap::new();
        let mut sources = Vec::with_capacity(state.sources.len());
        for (alias, entity) in &state.sources {
            self.catalog.entity(entity)?;
            if bound.insert(alias, entity).is_some() {
                return Err(Error::DuplicateAlias(alias.clone()));
            }
            sources.push(SourceClause::new(entity.clone(), alias.clone()));
        }

        let mut joins = Vec::with_capacity(state.joins.len());
        for spec in &state.joins {
            match bound.get(spec.from_alias.as_str()) {
                None => return Err(Error::UnboundAlias(spec.from_alias.clone())),
                Some(entity) if *entity != spec.from_entity => {
                    return Err(Error::InvalidQuery(format!(
                        "alias '{}' is bound to '{}', not '{}'",
                        spec.from_alias, entity, spec.from_entity
                    )));
                }
                Some(_) => {}
            }
            let edge = self.catalog.edge(&spec.from_entity, &spec.relation)?;
            if edge.to_entity != spec.target_entity {
                return Err(Error::InvalidQuery(format!(
                    "relationship '{}' reaches '{}', alias '{}' binds '{}'",
                    spec.relation, edge.to_entity, spec.target_alias, spec.target_entity
                )));
            }
            if bound
                .insert(&spec.target_alias, &spec.target_entity)
                .is_some()
            {
                return Err(Error::DuplicateAlias(spec.target_alias.clone()));
            }
            joins.push(JoinClause {
                entity: edge.to_entity.clone(),
                alias: spec.target_alias.clone(),
                left: ColumnRef::new(spec.from_alias.clone(), edge.from_field),
                right: ColumnRef::new(spec.target_alias.clone(), edge.to_field),
            });
        }

        // Empty projection selects all fields of every source, in order.
        let mut projection = Vec::new();
        if state.selects.is_empty() {
            for source in &sources {
                for field in self.catalog.fields_of(&source.entity)? {
                    projection.push(ProjColumn::new(ScalarExpr::Column(ColumnRef::new(
                        source.alias.clone(),
                        field.name.clone(),
                    ))));
                }
            }
        } else {
            for select in &state.selects {
                projection.extend(select.proj_columns());
            }
        }
        for proj in &projection {
            match &proj.expr {
                ScalarExpr::Column(col) => self.check_column(col, &bound)?,
                ScalarExpr::Aggregate(call) => {
                    if let Some(col) = &call.column {
                        self.check_column(col, &bound)?;
                    }
                }
            }
        }

        let filter = self.conjoin(&state.filters, &bound)?;
        if let Some(filter) = &filter {
            if filter.contains_aggregate() {
                return Err(Error::InvalidQuery(
                    "aggregate in row filter; use having".into(),
                ));
            }
        }

        for key in &state.group_by {
            self.check_column(key, &bound)?;
        }
        let having = self.conjoin(&state.having, &bound)?;

        let grouped = !state.group_by.is_empty()
            || projection.iter().any(|p| p.expr.is_aggregate())
            || having.as_ref().is_some_and(FilterExpr::contains_aggregate);
        if grouped {
            for proj in &projection {
                if let ScalarExpr::Column(col) = &proj.expr {
                    if !state.group_by.contains(col) {
                        return Err(Error::InvalidQuery(format!(
                            "projected column {} is not a grouping key",
                            col.qualified()
                        )));
                    }
                }
            }
            if let Some(having) = &having {
                self.check_having_keys(having, &state.group_by)?;
            }
        } else if having.is_some() {
            return Err(Error::InvalidQuery(
                "having requires grouping or an aggregate".into(),
            ));
        }

        let order_by = state
            .order_by
            .iter()
            .map(|o| o.clone().into_spec())
            .collect::<Vec<_>>();
        for spec in &order_by {
            self.check_column(&spec.column, &bound)?;
            if grouped && !state.group_by.contains(&spec.column) {
                return Err(Error::InvalidQuery(format!(
                    "order key {} is not a grouping key",
                    spec.column.qualified()
                )));
            }
        }

        let stmt = SelectStatement {
            sources,
            joins,
            projection,
            filter,
            group_by: state.group_by.clone(),
            having,
            order_by,
            offset: state.offset,
            limit: state.limit,
        };
        let (sql, _) = super::sql::render(&stmt);
        debug!(%sql, "translated select statement");
        Ok(stmt)
    }

    /// Companion count statement for a translated select.
    ///
    /// Keeps sources, joins, filter, and grouping; drops ordering and
    /// paging. For grouped statements it yields one row per group, which
    /// the executor counts.
    pub fn translate_count(&self, stmt: &SelectStatement) -> SelectStatement {
        let projection = if stmt.is_grouped() && !stmt.group_by.is_empty() {
            stmt.group_by
                .iter()
                .map(|c| ProjColumn::new(ScalarExpr::Column(c.clone())))
                .collect()
        } else {
            vec![ProjColumn::new(ScalarExpr::Aggregate(
                AggregateCall::count_rows(),
            ))]
        };
        SelectStatement {
            sources: stmt.sources.clone(),
            joins: stmt.joins.clone(),
            projection,
            filter: stmt.filter.clone(),
            group_by: stmt.group_by.clone(),
            having: stmt.having.clone(),
            order_by: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    fn conjoin(
        &self,
        predicates: &[Predicate],
        bound: &HashMap<&str, &str>,
    ) -> Result<Option<FilterExpr>, Error> {
        let exprs = predicates
            .iter()
            .map(|p| p.expr.clone())
            .collect::<Vec<_>>();
        let filter = FilterExpr::and(exprs);
        if let Some(filter) = &filter {
            let mut result = Ok(());
            filter.for_each_column(&mut |col| {
                if result.is_ok() {
                    result = self.check_column(col, bound);
                }
            });
            result?;
        }
        Ok(filter)
    }

    fn check_column(&self, col: &ColumnRef, bound: &HashMap<&str, &str>) -> Result<(), Error> {
        let entity = bound
            .get(col.alias.as_str())
            .ok_or_else(|| Error::UnboundAlias(col.alias.clone()))?;
        let def = self.catalog.entity(entity)?;
        if def.field(&col.field).is_none() {
            return Err(Error::UnknownField {
                entity: (*entity).to_string(),
                field: col.field.clone(),
            });
        }
        Ok(())
    }

    fn check_having_keys(&self, having: &FilterExpr, group_by: &[ColumnRef]) -> Result<(), Error> {
        match having {
            FilterExpr::Compare { lhs, .. } => {
                if let ScalarExpr::Column(col) = lhs {
                    if !group_by.contains(col) {
                        return Err(Error::InvalidQuery(format!(
                            "having references {} outside the grouping keys",
                            col.qualified()
                        )));
                    }
                }
                Ok(())
            }
            FilterExpr::Between { column, .. }
            | FilterExpr::In { column, .. }
            | FilterExpr::IsNull { column, .. }
            | FilterExpr::Like { column, .. } => {
                if !group_by.contains(column) {
                    return Err(Error::InvalidQuery(format!(
                        "having references {} outside the grouping keys",
                        column.qualified()
                    )));
                }
                Ok(())
            }
            FilterExpr::And(parts) | FilterExpr::Or(parts) => {
                for part in parts {
                    self.check_having_keys(part, group_by)?;
                }
                Ok(())
            }
            FilterExpr::Not(inner) => self.check_having_keys(inner, group_by),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, RelationDef, ScalarType};
    use crate::expr::Agg;

    fn catalog() -> Catalog {
        let member = EntityDef::new("Member", "id")
            .with_field(FieldDef::new("id", ScalarType::Int64))
            .with_field(FieldDef::optional("username", ScalarType::String))
            .with_field(FieldDef::new("age", ScalarType::Int32))
            .with_field(FieldDef::optional("team_id", ScalarType::Int64));
        let team = EntityDef::new("Team", "id")
            .with_field(FieldDef::new("id", ScalarType::Int64))
            .with_field(FieldDef::new("name", ScalarType::String));
        Catalog::builder()
            .entity(member)
            .entity(team)
            .relation(
                RelationDef::many_to_one("team", "Member", "team_id", "Team", "id")
                    .with_mirror("members"),
            )
            .build()
            .unwrap()
    }

    fn member_state(catalog: &Catalog) -> QueryState {
        QueryState {
            sources: vec![("m".into(), "Member".into())],
            selects: vec![SelectExpr::from(
                catalog.alias("Member", "m").unwrap().field("age").unwrap(),
            )],
            ..QueryState::default()
        }
    }

    #[test]
    fn test_translate_simple() {
        let catalog = catalog();
        let planner = Planner::new(&catalog);

        let stmt = planner.translate(&member_state(&catalog)).unwrap();
        assert_eq!(stmt.sources.len(), 1);
        assert_eq!(stmt.labels(), vec!["m.age"]);

        // Statements are plain data; dumping one must round-trip.
        let json = serde_json::to_string(&stmt).unwrap();
        let back: relq_ir::SelectStatement = serde_json::from_str(&json).unwrap();
        assert_eq!(stmt, back);
    }

    #[test]
    fn test_empty_projection_expands_sources() {
        let catalog = catalog();
        let planner = Planner::new(&catalog);

        let mut state = member_state(&catalog);
        state.selects.clear();
        let stmt = planner.translate(&state).unwrap();
        assert_eq!(
            stmt.labels(),
            vec!["m.id", "m.username", "m.age", "m.team_id"]
        );
    }

    #[test]
    fn test_unbound_alias_rejected() {
        let catalog = catalog();
        let planner = Planner::new(&catalog);

        let mut state = member_state(&catalog);
        state.selects = vec![SelectExpr::from(
            catalog.alias("Team", "t").unwrap().field("name").unwrap(),
        )];
        assert!(matches!(
            planner.translate(&state),
            Err(Error::UnboundAlias(alias)) if alias == "t"
        ));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let catalog = catalog();
        let planner = Planner::new(&catalog);

        let mut state = member_state(&catalog);
        state.sources.push(("m".into(), "Team".into()));
        assert!(matches!(
            planner.translate(&state),
            Err(Error::DuplicateAlias(_))
        ));
    }

    #[test]
    fn test_relation_join_resolution() {
        let catalog = catalog();
        let planner = Planner::new(&catalog);

        let mut state = member_state(&catalog);
        state.joins.push(JoinSpec {
            from_alias: "m".into(),
            from_entity: "Member".into(),
            relation: "team".into(),
            target_alias: "t".into(),
            target_entity: "Team".into(),
        });
        let stmt = planner.translate(&state).unwrap();
        assert_eq!(stmt.joins.len(), 1);
        assert_eq!(stmt.joins[0].left.qualified(), "m.team_id");
        assert_eq!(stmt.joins[0].right.qualified(), "t.id");
    }

    #[test]
    fn test_mirror_join_resolution() {
        let catalog = catalog();
        let planner = Planner::new(&catalog);

        let state = QueryState {
            sources: vec![("t".into(), "Team".into())],
            joins: vec![JoinSpec {
                from_alias: "t".into(),
                from_entity: "Team".into(),
                relation: "members".into(),
                target_alias: "m".into(),
                target_entity: "Member".into(),
            }],
            ..QueryState::default()
        };
        let stmt = planner.translate(&state).unwrap();
        assert_eq!(stmt.joins[0].left.qualified(), "t.id");
        assert_eq!(stmt.joins[0].right.qualified(), "m.team_id");
    }

    #[test]
    fn test_aggregate_in_row_filter_rejected() {
        let catalog = catalog();
        let planner = Planner::new(&catalog);

        let m = catalog.alias("Member", "m").unwrap();
        let age = m.field("age").unwrap();
        let mut state = member_state(&catalog);
        state.selects = vec![SelectExpr::from(Agg::avg(&age).unwrap())];
        state.filters = vec![Agg::avg(&age).unwrap().ge(20).unwrap()];
        assert!(matches!(
            planner.translate(&state),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_grouped_projection_validation() {
        let catalog = catalog();
        let planner = Planner::new(&catalog);

        let m = catalog.alias("Member", "m").unwrap();
        let age = m.field("age").unwrap();
        let username = m.field("username").unwrap();

        // Projecting a non-key column under grouping is invalid.
        let mut state = member_state(&catalog);
        state.selects = vec![
            SelectExpr::from(&username),
            SelectExpr::from(Agg::avg(&age).unwrap()),
        ];
        state.group_by = vec![ColumnRef::new("m", "team_id")];
        assert!(matches!(
            planner.translate(&state),
            Err(Error::InvalidQuery(_))
        ));

        // Projecting the key itself is fine.
        let mut state = member_state(&catalog);
        state.selects = vec![
            SelectExpr::from(m.field("team_id").unwrap()),
            SelectExpr::from(Agg::avg(&age).unwrap()),
        ];
        state.group_by = vec![ColumnRef::new("m", "team_id")];
        let stmt = planner.translate(&state).unwrap();
        assert!(stmt.is_grouped());
        assert_eq!(stmt.labels(), vec!["m.team_id", "avg(m.age)"]);
    }

    #[test]
    fn test_having_without_grouping_rejected() {
        let catalog = catalog();
        let planner = Planner::new(&catalog);

        let m = catalog.alias("Member", "m").unwrap();
        let username = m.field("username").unwrap();
        let mut state = member_state(&catalog);
        state.having = vec![username.eq("member1").unwrap()];
        assert!(matches!(
            planner.translate(&state),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_count_statement() {
        let catalog = catalog();
        let planner = Planner::new(&catalog);

        let mut state = member_state(&catalog);
        state.order_by = vec![catalog
            .alias("Member", "m")
            .unwrap()
            .field("age")
            .unwrap()
            .desc()];
        state.offset = Some(1);
        state.limit = Some(2);

        let stmt = planner.translate(&state).unwrap();
        let count = planner.translate_count(&stmt);
        assert_eq!(count.labels(), vec!["count(*)"]);
        assert!(count.order_by.is_empty());
        assert_eq!(count.offset, None);
        assert_eq!(count.limit, None);
    }
}
