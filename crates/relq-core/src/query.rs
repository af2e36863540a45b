//! The fluent query surface: factory, select builder, and raw statements.

use crate::catalog::Catalog;
use crate::error::Error;
use crate::exec::{Connection, Executor, QueryResults, Row};
use crate::expr::{EntityAlias, Ordering, Path, Predicate, SelectExpr};
use crate::plan::{JoinSpec, Planner, QueryState};
use relq_ir::{SelectStatement, Statement, Value};
use std::sync::Arc;
use std::time::Instant;

/// Entry point for building and executing queries.
///
/// A factory pairs a catalog with one store connection and can be shared
/// freely across threads; the executor serializes statement round trips.
pub struct QueryFactory {
    catalog: Arc<Catalog>,
    executor: Arc<Executor>,
}

impl QueryFactory {
    /// Create a factory over a catalog and connection.
    pub fn new(catalog: Arc<Catalog>, conn: Arc<dyn Connection>) -> Self {
        Self {
            catalog,
            executor: Arc::new(Executor::new(conn)),
        }
    }

    /// Create a factory whose statements fail after the given instant.
    pub fn with_deadline(
        catalog: Arc<Catalog>,
        conn: Arc<dyn Connection>,
        deadline: Instant,
    ) -> Self {
        Self {
            catalog,
            executor: Arc::new(Executor::new(conn).with_deadline(deadline)),
        }
    }

    /// The catalog this factory resolves against.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Start an empty select builder.
    pub fn query(&self) -> SelectQuery {
        SelectQuery {
            catalog: Arc::clone(&self.catalog),
            executor: Arc::clone(&self.executor),
            state: QueryState::default(),
        }
    }

    /// Start a select builder with an initial projection.
    pub fn select(&self, expr: impl Into<SelectExpr>) -> SelectQuery {
        self.query().select(expr)
    }

    /// Wrap a raw statement in the store's own query language.
    ///
    /// Raw statements bypass construction-time checking and translation
    /// entirely; they share the executor's fetch-mode contract.
    pub fn raw(&self, sql: impl Into<String>, params: Vec<Value>) -> RawQuery {
        RawQuery {
            executor: Arc::clone(&self.executor),
            statement: Statement::Raw {
                sql: sql.into(),
                params,
            },
        }
    }
}

/// A composable select query.
///
/// Every clause method consumes the builder and returns an extended one;
/// cloning before a clause call branches the query. Nothing executes
/// until a fetch terminal runs.
#[derive(Clone)]
pub struct SelectQuery {
    catalog: Arc<Catalog>,
    executor: Arc<Executor>,
    state: QueryState,
}

impl SelectQuery {
    /// Add a projection: an entity alias (all fields), a path, or an
    /// aggregate. Repeated calls build tuple projections.
    pub fn select(mut self, expr: impl Into<SelectExpr>) -> Self {
        self.state.selects.push(expr.into());
        self
    }

    /// Bind a query source. Additional sources form a cross product.
    pub fn from(mut self, alias: &EntityAlias) -> Self {
        self.state
            .sources
            .push((alias.name().to_string(), alias.entity().name.clone()));
        self
    }

    /// Join along a declared relationship, binding the target alias.
    ///
    /// `relation` names either an owning edge (`"team"` from a Member
    /// alias) or a mirror edge (`"members"` from a Team alias); the join
    /// key comes from the declaration, never from the caller.
    pub fn join(mut self, from: &EntityAlias, relation: &str, target: &EntityAlias) -> Self {
        self.state.joins.push(JoinSpec {
            from_alias: from.name().to_string(),
            from_entity: from.entity().name.clone(),
            relation: relation.to_string(),
            target_alias: target.name().to_string(),
            target_entity: target.entity().name.clone(),
        });
        self
    }

    /// Add a row filter. Repeated calls conjoin.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.state.filters.push(predicate);
        self
    }

    /// Add optional row filters, skipping the absent ones.
    ///
    /// The dynamic-search building block: absent criteria leave the query
    /// unfiltered rather than filtering on null.
    pub fn filter_all<I>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = Option<Predicate>>,
    {
        self.state.filters.extend(predicates.into_iter().flatten());
        self
    }

    /// Add a grouping key.
    pub fn group_by(mut self, path: &Path) -> Self {
        self.state.group_by.push(path.column_ref());
        self
    }

    /// Add a post-aggregation filter. Repeated calls conjoin.
    pub fn having(mut self, predicate: Predicate) -> Self {
        self.state.having.push(predicate);
        self
    }

    /// Add a sort key. Keys apply in call order.
    pub fn order_by(mut self, ordering: Ordering) -> Self {
        self.state.order_by.push(ordering);
        self
    }

    /// Skip the first `n` result rows.
    pub fn offset(mut self, n: u64) -> Self {
        self.state.offset = Some(n);
        self
    }

    /// Return at most `n` result rows.
    pub fn limit(mut self, n: u64) -> Self {
        self.state.limit = Some(n);
        self
    }

    fn translate(&self) -> Result<SelectStatement, Error> {
        Planner::new(&self.catalog).translate(&self.state)
    }

    /// Render the translated statement as SQL text with parameters.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>), Error> {
        Ok(crate::plan::render(&self.translate()?))
    }

    /// Execute and materialize every matching row.
    pub fn fetch(self) -> Result<Vec<Row>, Error> {
        let stmt = self.translate()?;
        self.executor.fetch(&Statement::Select(stmt))
    }

    /// Execute and require at most one row.
    ///
    /// Zero matches is `None`; two or more is [`Error::NonUniqueResult`].
    pub fn fetch_one(self) -> Result<Option<Row>, Error> {
        let stmt = self.translate()?;
        self.executor.fetch_one(&Statement::Select(stmt))
    }

    /// Execute and take the first row, if any.
    ///
    /// The statement is narrowed to a single row before it is issued, so
    /// at most one row crosses the connection.
    pub fn fetch_first(mut self) -> Result<Option<Row>, Error> {
        self.state.limit = Some(1);
        let stmt = self.translate()?;
        self.executor.fetch_first(&Statement::Select(stmt))
    }

    /// Execute the paged statement plus a companion count statement.
    ///
    /// Returns the page along with the total ignoring offset and limit.
    /// Both round trips run back to back on the connection.
    pub fn fetch_results(self) -> Result<QueryResults, Error> {
        let stmt = self.translate()?;
        let count = Planner::new(&self.catalog).translate_count(&stmt);
        let grouped = stmt.is_grouped();
        let (offset, limit) = (stmt.offset, stmt.limit);
        self.executor.fetch_results(
            &Statement::Select(stmt),
            &Statement::Select(count),
            grouped,
            offset,
            limit,
        )
    }

    /// Execute only the companion count statement.
    pub fn fetch_count(self) -> Result<u64, Error> {
        let stmt = self.translate()?;
        let count = Planner::new(&self.catalog).translate_count(&stmt);
        self.executor
            .fetch_count(&Statement::Select(count), stmt.is_grouped())
    }
}

/// A raw statement bound to an executor.
pub struct RawQuery {
    executor: Arc<Executor>,
    statement: Statement,
}

impl RawQuery {
    /// Execute and materialize every row.
    pub fn fetch(self) -> Result<Vec<Row>, Error> {
        self.executor.fetch(&self.statement)
    }

    /// Execute and require at most one row.
    pub fn fetch_one(self) -> Result<Option<Row>, Error> {
        self.executor.fetch_one(&self.statement)
    }

    /// Execute and take the first row, if any.
    pub fn fetch_first(self) -> Result<Option<Row>, Error> {
        self.executor.fetch_first(&self.statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, RelationDef, ScalarType};
    use parking_lot::Mutex;
    use relq_ir::{RowSet, StoreError};

    fn catalog() -> Arc<Catalog> {
        let member = EntityDef::new("Member", "id")
            .with_field(FieldDef::new("id", ScalarType::Int64))
            .with_field(FieldDef::optional("username", ScalarType::String))
            .with_field(FieldDef::new("age", ScalarType::Int32))
            .with_field(FieldDef::optional("team_id", ScalarType::Int64));
        let team = EntityDef::new("Team", "id")
            .with_field(FieldDef::new("id", ScalarType::Int64))
            .with_field(FieldDef::new("name", ScalarType::String));
        Arc::new(
            Catalog::builder()
                .entity(member)
                .entity(team)
                .relation(
                    RelationDef::many_to_one("team", "Member", "team_id", "Team", "id")
                        .with_mirror("members"),
                )
                .build()
                .unwrap(),
        )
    }

    /// Connection that records statements and returns empty row sets.
    #[derive(Default)]
    struct RecordingConn {
        seen: Mutex<Vec<Statement>>,
    }

    impl Connection for RecordingConn {
        fn execute(&self, statement: &Statement) -> Result<RowSet, StoreError> {
            self.seen.lock().push(statement.clone());
            Ok(RowSet::new(vec![]))
        }
    }

    #[test]
    fn test_to_sql() {
        let catalog = catalog();
        let factory = QueryFactory::new(Arc::clone(&catalog), Arc::new(RecordingConn::default()));

        let m = catalog.alias("Member", "m").unwrap();
        let t = catalog.alias("Team", "t").unwrap();
        let age = m.field("age").unwrap();
        let name = t.field("name").unwrap();

        let (sql, params) = factory
            .select(m.field("username").unwrap())
            .from(&m)
            .join(&m, "team", &t)
            .filter(name.eq("teamA").unwrap())
            .order_by(age.desc())
            .limit(2)
            .to_sql()
            .unwrap();

        assert_eq!(
            sql,
            "SELECT m.username FROM Member AS m \
             INNER JOIN Team AS t ON m.team_id = t.id \
             WHERE t.name = ? \
             ORDER BY m.age DESC NULLS LAST LIMIT 2"
        );
        assert_eq!(params, vec![Value::String("teamA".into())]);
    }

    #[test]
    fn test_fetch_first_narrows_to_one_row() {
        let catalog = catalog();
        let conn = Arc::new(RecordingConn::default());
        let factory = QueryFactory::new(Arc::clone(&catalog), conn.clone());

        let m = catalog.alias("Member", "m").unwrap();
        factory.query().from(&m).fetch_first().unwrap();

        let seen = conn.seen.lock();
        match &seen[0] {
            Statement::Select(stmt) => assert_eq!(stmt.limit, Some(1)),
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_clone_branches_builder() {
        let catalog = catalog();
        let factory = QueryFactory::new(Arc::clone(&catalog), Arc::new(RecordingConn::default()));

        let m = catalog.alias("Member", "m").unwrap();
        let age = m.field("age").unwrap();

        let base = factory.select(&age).from(&m);
        let narrowed = base.clone().filter(age.ge(30).unwrap());

        let (base_sql, _) = base.to_sql().unwrap();
        let (narrowed_sql, _) = narrowed.to_sql().unwrap();
        assert!(!base_sql.contains("WHERE"));
        assert!(narrowed_sql.contains("WHERE"));
    }

    #[test]
    fn test_translation_error_surfaces_at_terminal() {
        let catalog = catalog();
        let factory = QueryFactory::new(Arc::clone(&catalog), Arc::new(RecordingConn::default()));

        let t = catalog.alias("Team", "t").unwrap();
        let result = factory.select(t.field("name").unwrap()).fetch();
        assert!(matches!(result, Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_filter_all_skips_absent() {
        let catalog = catalog();
        let factory = QueryFactory::new(Arc::clone(&catalog), Arc::new(RecordingConn::default()));

        let m = catalog.alias("Member", "m").unwrap();
        let age = m.field("age").unwrap();

        let (sql, _) = factory
            .query()
            .from(&m)
            .filter_all([None, Some(age.ge(10).unwrap()), None])
            .to_sql()
            .unwrap();
        assert!(sql.contains("WHERE m.age >= ?"));

        let (sql, _) = factory
            .query()
            .from(&m)
            .filter_all([None, None])
            .to_sql()
            .unwrap();
        assert!(!sql.contains("WHERE"));
    }
}
