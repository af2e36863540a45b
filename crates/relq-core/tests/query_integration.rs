//! Integration tests for the query layer over the in-memory store.

use relq_core::catalog::{Catalog, EntityDef, FieldDef, RelationDef, ScalarType};
use relq_core::ir::Value;
use relq_core::{Agg, Error, MemStore, Predicate, QueryFactory};
use std::sync::Arc;

struct TestContext {
    catalog: Arc<Catalog>,
    store: Arc<MemStore>,
    factory: QueryFactory,
}

impl TestContext {
    fn new() -> Self {
        let member = EntityDef::new("Member", "id")
            .with_field(FieldDef::new("id", ScalarType::Int64))
            .with_field(FieldDef::optional("username", ScalarType::String))
            .with_field(FieldDef::new("age", ScalarType::Int32))
            .with_field(FieldDef::optional("team_id", ScalarType::Int64));

        let team = EntityDef::new("Team", "id")
            .with_field(FieldDef::new("id", ScalarType::Int64))
            .with_field(FieldDef::new("name", ScalarType::String));

        let catalog = Arc::new(
            Catalog::builder()
                .entity(member)
                .entity(team)
                .relation(
                    RelationDef::many_to_one("team", "Member", "team_id", "Team", "id")
                        .with_mirror("members"),
                )
                .build()
                .unwrap(),
        );

        let store = Arc::new(MemStore::new(Arc::clone(&catalog)));
        let factory = QueryFactory::new(Arc::clone(&catalog), store.clone());
        Self {
            catalog,
            store,
            factory,
        }
    }

    fn insert_team(&self, name: &str) -> Value {
        self.store
            .insert("Team", vec![("name", Value::String(name.into()))])
            .unwrap()
    }

    fn insert_member(&self, username: Option<&str>, age: i32, team: Option<&Value>) -> Value {
        let mut fields = vec![("age", Value::Int32(age))];
        if let Some(username) = username {
            fields.push(("username", Value::String(username.into())));
        }
        if let Some(team) = team {
            fields.push(("team_id", team.clone()));
        }
        self.store.insert("Member", fields).unwrap()
    }
}

/// teamA holds member1 (10) and member2 (20); teamB holds member3 (30)
/// and member4 (40).
fn seeded() -> (TestContext, Value, Value) {
    let ctx = TestContext::new();
    let team_a = ctx.insert_team("teamA");
    let team_b = ctx.insert_team("teamB");
    ctx.insert_member(Some("member1"), 10, Some(&team_a));
    ctx.insert_member(Some("member2"), 20, Some(&team_a));
    ctx.insert_member(Some("member3"), 30, Some(&team_b));
    ctx.insert_member(Some("member4"), 40, Some(&team_b));
    (ctx, team_a, team_b)
}

#[test]
fn test_fetch_one_by_username() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let username = m.field("username").unwrap();
    let age = m.field("age").unwrap();

    let row = ctx
        .factory
        .select(&m)
        .from(&m)
        .filter(username.eq("member1").unwrap())
        .fetch_one()
        .unwrap()
        .unwrap();

    assert_eq!(row.get_expr(&username), Some(&Value::String("member1".into())));
    assert_eq!(row.get_expr(&age), Some(&Value::Int32(10)));
}

#[test]
fn test_fetch_one_zero_and_many() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let username = m.field("username").unwrap();
    let age = m.field("age").unwrap();

    let none = ctx
        .factory
        .select(&m)
        .from(&m)
        .filter(username.eq("member99").unwrap())
        .fetch_one()
        .unwrap();
    assert!(none.is_none());

    let result = ctx
        .factory
        .select(&m)
        .from(&m)
        .filter(age.le(20).unwrap())
        .fetch_one();
    assert!(matches!(result, Err(Error::NonUniqueResult { found: 2 })));
}

#[test]
fn test_fetch_first() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let age = m.field("age").unwrap();

    let row = ctx
        .factory
        .select(&age)
        .from(&m)
        .order_by(age.desc())
        .fetch_first()
        .unwrap()
        .unwrap();
    assert_eq!(row.get(0), Some(&Value::Int32(40)));

    let none = ctx
        .factory
        .select(&age)
        .from(&m)
        .filter(age.gt(100).unwrap())
        .fetch_first()
        .unwrap();
    assert!(none.is_none());
}

#[test]
fn test_search_conditions() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let username = m.field("username").unwrap();
    let age = m.field("age").unwrap();

    // and-composition
    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .filter(
            username
                .eq("member1")
                .unwrap()
                .and(age.between(10, 30).unwrap()),
        )
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 1);

    // or-composition
    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .filter(
            username
                .eq("member1")
                .unwrap()
                .or(age.eq(40).unwrap()),
        )
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 2);

    // membership and patterns
    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .filter(age.in_values([10, 30]).unwrap())
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 2);

    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .filter(username.starts_with("member").unwrap())
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 4);

    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .filter(username.like("member_").unwrap())
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 4);
}

#[test]
fn test_dynamic_filters_skip_absent() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let username = m.field("username").unwrap();
    let age = m.field("age").unwrap();

    let search = |name: Option<&str>, min_age: Option<i32>| {
        let by_name = name.map(|n| username.eq(n).unwrap());
        let by_age = min_age.map(|a| age.ge(a).unwrap());
        ctx.factory
            .select(&username)
            .from(&m)
            .filter_all([by_name, by_age])
            .fetch()
            .unwrap()
            .len()
    };

    assert_eq!(search(Some("member1"), Some(10)), 1);
    assert_eq!(search(None, Some(30)), 2);
    // Absent criteria leave the query unfiltered.
    assert_eq!(search(None, None), 4);

    // Equivalent composition through Predicate::and_all.
    let combined = Predicate::and_all([None, Some(age.ge(30).unwrap())]).unwrap();
    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .filter(combined)
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_ordering_with_null_placement() {
    let (ctx, _, team_b) = seeded();
    ctx.insert_member(None, 100, Some(&team_b));
    ctx.insert_member(Some("member5"), 100, Some(&team_b));

    let m = ctx.catalog.alias("Member", "m").unwrap();
    let username = m.field("username").unwrap();
    let age = m.field("age").unwrap();

    // Default placement sorts nulls after every named member.
    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .filter(age.eq(100).unwrap())
        .order_by(age.desc())
        .order_by(username.asc())
        .fetch()
        .unwrap();
    assert_eq!(rows[0].get(0), Some(&Value::String("member5".into())));
    assert_eq!(rows[1].get(0), Some(&Value::Null));

    // Explicit nulls-first flips the pair, in both directions.
    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .filter(age.eq(100).unwrap())
        .order_by(username.asc().nulls_first())
        .fetch()
        .unwrap();
    assert_eq!(rows[0].get(0), Some(&Value::Null));

    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .filter(age.eq(100).unwrap())
        .order_by(username.desc().nulls_first())
        .fetch()
        .unwrap();
    assert_eq!(rows[0].get(0), Some(&Value::Null));
    assert_eq!(rows[1].get(0), Some(&Value::String("member5".into())));
}

#[test]
fn test_paging_and_totals() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let username = m.field("username").unwrap();

    let results = ctx
        .factory
        .select(&username)
        .from(&m)
        .order_by(username.desc())
        .offset(1)
        .limit(2)
        .fetch_results()
        .unwrap();

    assert_eq!(results.total, 4);
    assert_eq!(results.offset, Some(1));
    assert_eq!(results.limit, Some(2));
    assert_eq!(results.rows.len(), 2);
    assert_eq!(
        results.rows[0].get(0),
        Some(&Value::String("member3".into()))
    );
    assert_eq!(
        results.rows[1].get(0),
        Some(&Value::String("member2".into()))
    );
}

#[test]
fn test_count_matches_fetch() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let age = m.field("age").unwrap();

    let base = ctx
        .factory
        .select(&age)
        .from(&m)
        .filter(age.ge(20).unwrap());

    let fetched = base.clone().fetch().unwrap().len() as u64;
    let counted = base.fetch_count().unwrap();
    assert_eq!(fetched, 3);
    assert_eq!(counted, fetched);

    // Count ignores paging.
    let counted = ctx
        .factory
        .select(&age)
        .from(&m)
        .offset(1)
        .limit(2)
        .fetch_count()
        .unwrap();
    assert_eq!(counted, 4);
}

#[test]
fn test_projection_forms() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let username = m.field("username").unwrap();
    let age = m.field("age").unwrap();

    // Entity projection expands to every declared field.
    let rows = ctx.factory.select(&m).from(&m).fetch().unwrap();
    assert_eq!(
        rows[0].labels(),
        ["m.id", "m.username", "m.age", "m.team_id"]
    );

    // Tuple projection addresses by position and by expression.
    let rows = ctx
        .factory
        .select(&username)
        .select(&age)
        .from(&m)
        .filter(username.eq("member3").unwrap())
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), Some(&Value::String("member3".into())));
    assert_eq!(rows[0].get(1), Some(&Value::Int32(30)));
    assert_eq!(rows[0].get_expr(&age), Some(&Value::Int32(30)));

    // Single-field projection yields the same values, row for row, as
    // projecting the entity and extracting the field.
    let single = ctx
        .factory
        .select(&age)
        .from(&m)
        .filter(age.gt(20).unwrap())
        .order_by(age.asc())
        .fetch()
        .unwrap();
    let entity = ctx
        .factory
        .select(&m)
        .from(&m)
        .filter(age.gt(20).unwrap())
        .order_by(age.asc())
        .fetch()
        .unwrap();
    assert_eq!(single.len(), entity.len());
    assert_eq!(single.len(), 2);
    for (narrow, wide) in single.iter().zip(entity.iter()) {
        assert_eq!(narrow.get(0), wide.get_named("m.age"));
        assert_eq!(narrow.get(0), wide.get_expr(&age));
    }
}

#[test]
fn test_relation_join() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let t = ctx.catalog.alias("Team", "t").unwrap();
    let username = m.field("username").unwrap();
    let team_name = t.field("name").unwrap();

    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .join(&m, "team", &t)
        .filter(team_name.eq("teamA").unwrap())
        .order_by(username.asc())
        .fetch()
        .unwrap();

    let names: Vec<_> = rows.iter().map(|r| r.get(0).cloned().unwrap()).collect();
    assert_eq!(
        names,
        vec![
            Value::String("member1".into()),
            Value::String("member2".into())
        ]
    );
}

#[test]
fn test_mirror_join_from_target_side() {
    let (ctx, _, _) = seeded();
    let t = ctx.catalog.alias("Team", "t").unwrap();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let team_name = t.field("name").unwrap();

    let count = ctx
        .factory
        .query()
        .from(&t)
        .join(&t, "members", &m)
        .filter(team_name.eq("teamB").unwrap())
        .fetch_count()
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn test_theta_join_over_cross_product() {
    let (ctx, team_a, _) = seeded();
    ctx.insert_member(Some("teamA"), 50, Some(&team_a));

    let m = ctx.catalog.alias("Member", "m").unwrap();
    let t = ctx.catalog.alias("Team", "t").unwrap();
    let username = m.field("username").unwrap();
    let team_name = t.field("name").unwrap();

    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .from(&t)
        .filter(username.eq_path(&team_name).unwrap())
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), Some(&Value::String("teamA".into())));
}

#[test]
fn test_grouped_aggregates() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let t = ctx.catalog.alias("Team", "t").unwrap();
    let age = m.field("age").unwrap();
    let team_name = t.field("name").unwrap();

    let avg_age = Agg::avg(&age).unwrap();
    let rows = ctx
        .factory
        .select(&team_name)
        .select(&avg_age)
        .from(&m)
        .join(&m, "team", &t)
        .group_by(&team_name)
        .order_by(team_name.asc())
        .fetch()
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get(0), Some(&Value::String("teamA".into())));
    assert_eq!(rows[0].get_expr(&avg_age), Some(&Value::Float64(15.0)));
    assert_eq!(rows[1].get(0), Some(&Value::String("teamB".into())));
    assert_eq!(rows[1].get_expr(&avg_age), Some(&Value::Float64(35.0)));
}

#[test]
fn test_having_filters_groups() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let t = ctx.catalog.alias("Team", "t").unwrap();
    let age = m.field("age").unwrap();
    let team_name = t.field("name").unwrap();

    let avg_age = Agg::avg(&age).unwrap();
    let rows = ctx
        .factory
        .select(&team_name)
        .select(&avg_age)
        .from(&m)
        .join(&m, "team", &t)
        .group_by(&team_name)
        .having(avg_age.gt(20).unwrap())
        .fetch()
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), Some(&Value::String("teamB".into())));
}

#[test]
fn test_whole_table_aggregates() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let age = m.field("age").unwrap();

    let count = Agg::count();
    let sum_age = Agg::sum(&age).unwrap();
    let max_age = Agg::max(&age);
    let min_age = Agg::min(&age);

    let row = ctx
        .factory
        .select(&count)
        .select(&sum_age)
        .select(&max_age)
        .select(&min_age)
        .from(&m)
        .fetch_one()
        .unwrap()
        .unwrap();

    assert_eq!(row.get_expr(&count), Some(&Value::Int64(4)));
    assert_eq!(row.get_expr(&sum_age), Some(&Value::Float64(100.0)));
    assert_eq!(row.get_expr(&max_age), Some(&Value::Int32(40)));
    assert_eq!(row.get_expr(&min_age), Some(&Value::Int32(10)));
}

#[test]
fn test_grouped_count_counts_groups() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let t = ctx.catalog.alias("Team", "t").unwrap();
    let age = m.field("age").unwrap();
    let team_name = t.field("name").unwrap();

    let count = ctx
        .factory
        .select(&team_name)
        .select(&Agg::avg(&age).unwrap())
        .from(&m)
        .join(&m, "team", &t)
        .group_by(&team_name)
        .fetch_count()
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn test_reference_change_maintains_both_sides() {
    let (ctx, team_a, team_b) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let t = ctx.catalog.alias("Team", "t").unwrap();
    let username = m.field("username").unwrap();
    let team_name = t.field("name").unwrap();

    let member1 = ctx
        .factory
        .select(m.field("id").unwrap())
        .from(&m)
        .filter(username.eq("member1").unwrap())
        .fetch_one()
        .unwrap()
        .unwrap()
        .get(0)
        .cloned()
        .unwrap();

    ctx.store
        .set_reference("Member", &member1, "team", team_b.clone())
        .unwrap();

    // Owning side moved...
    let rows = ctx
        .factory
        .select(&username)
        .from(&m)
        .join(&m, "team", &t)
        .filter(team_name.eq("teamB").unwrap())
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 3);

    // ...and the mirror views agree with it.
    let a_members = ctx.store.mirror("Team", &team_a, "members").unwrap();
    let b_members = ctx.store.mirror("Team", &team_b, "members").unwrap();
    assert_eq!(a_members.len(), 1);
    assert_eq!(b_members.len(), 3);
    assert!(b_members.iter().any(|v| v.loose_eq(&member1)));
}

#[test]
fn test_construction_and_translation_errors() {
    let (ctx, _, _) = seeded();
    let m = ctx.catalog.alias("Member", "m").unwrap();
    let t = ctx.catalog.alias("Team", "t").unwrap();
    let age = m.field("age").unwrap();

    // Construction-time type mismatch, before any statement exists.
    assert!(matches!(age.eq("ten"), Err(Error::TypeMismatch { .. })));

    // Translation-time unbound alias, before any round trip.
    let result = ctx
        .factory
        .select(t.field("name").unwrap())
        .from(&m)
        .fetch();
    assert!(matches!(result, Err(Error::UnboundAlias(alias)) if alias == "t"));
}

#[test]
fn test_raw_statement_contract() {
    let (ctx, _, _) = seeded();

    // The in-memory store speaks only statement IR.
    let result = ctx
        .factory
        .raw("SELECT m.age FROM Member AS m", vec![])
        .fetch();
    assert!(matches!(result, Err(Error::Store(_))));
}
