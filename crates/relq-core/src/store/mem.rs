//! In-memory store executing translated statements over catalog entities.

use crate::catalog::{Catalog, FieldDef};
use crate::error::Error;
use crate::exec::Connection;
use crate::store::eval::{self, Scope};
use parking_lot::RwLock;
use relq_ir::{
    AggregateCall, FilterExpr, RowSet, ScalarExpr, SelectStatement, Statement, StoreError, Value,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Hashable, orderable key derived from a value.
///
/// Integer widths collapse so `Int32(1)` and `Int64(1)` key the same
/// slot; floats key by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum RowKey {
    Bool(bool),
    Int(i64),
    Bits(u64),
    Str(String),
    Bytes(Vec<u8>),
    Timestamp(i64),
    Uuid([u8; 16]),
}

impl RowKey {
    fn from_value(value: &Value) -> Option<RowKey> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(RowKey::Bool(*b)),
            Value::Int32(n) => Some(RowKey::Int(*n as i64)),
            Value::Int64(n) => Some(RowKey::Int(*n)),
            Value::Float32(f) => Some(RowKey::Bits((*f as f64).to_bits())),
            Value::Float64(f) => Some(RowKey::Bits(f.to_bits())),
            Value::String(s) => Some(RowKey::Str(s.clone())),
            Value::Bytes(b) => Some(RowKey::Bytes(b.clone())),
            Value::Timestamp(t) => Some(RowKey::Timestamp(*t)),
            Value::Uuid(u) => Some(RowKey::Uuid(*u)),
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<RowKey, HashMap<String, Value>>,
    next_id: i64,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Table>,
    // Derived reverse views, keyed by "owning_entity.relation"; each maps
    // a target identity key to the owning identities referencing it.
    mirrors: HashMap<String, HashMap<RowKey, Vec<Value>>>,
}

/// An in-memory store over a catalog.
///
/// Holds one table per entity and executes translated select statements
/// directly against the IR; raw statements are rejected. Mirror views of
/// relationships are maintained as derived indexes, updated atomically
/// with the owning-side foreign key.
pub struct MemStore {
    catalog: Arc<Catalog>,
    inner: RwLock<Inner>,
}

impl MemStore {
    /// Create an empty store with one table per catalog entity.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let mut inner = Inner::default();
        for name in catalog.entity_names() {
            inner.tables.insert(name.to_string(), Table::default());
        }
        Self {
            catalog,
            inner: RwLock::new(inner),
        }
    }

    /// Insert a record, returning its identity value.
    ///
    /// Field values are validated against the catalog. A missing identity
    /// of 64-bit integer type is assigned automatically; missing optional
    /// fields are stored as null. Foreign keys must reference existing
    /// records.
    pub fn insert(&self, entity: &str, fields: Vec<(&str, Value)>) -> Result<Value, Error> {
        let def = self.catalog.entity(entity)?.clone();
        let mut record: HashMap<String, Value> = HashMap::new();
        for (name, value) in fields {
            let field = def.field(name).ok_or_else(|| Error::UnknownField {
                entity: entity.to_string(),
                field: name.to_string(),
            })?;
            check_kind(entity, field, &value)?;
            record.insert(name.to_string(), value);
        }

        let mut inner = self.inner.write();

        let explicit_id = record
            .get(&def.identity_field)
            .filter(|v| !v.is_null())
            .cloned();
        let id = match explicit_id {
            Some(value) => {
                // Keep the auto-id counter ahead of explicit identities so
                // mixed explicit/auto inserts never collide.
                if let Value::Int64(n) = value {
                    let table = inner
                        .tables
                        .get_mut(entity)
                        .ok_or_else(|| Error::UnknownEntity(entity.to_string()))?;
                    table.next_id = table.next_id.max(n);
                }
                value
            }
            None => {
                let identity = def
                    .identity()
                    .ok_or_else(|| Error::InvalidData(format!("entity '{entity}' has no identity")))?;
                if identity.value_kind() != relq_ir::ValueKind::Int64 {
                    return Err(Error::InvalidData(format!(
                        "{entity}.{} must be supplied explicitly",
                        def.identity_field
                    )));
                }
                let table = inner
                    .tables
                    .get_mut(entity)
                    .ok_or_else(|| Error::UnknownEntity(entity.to_string()))?;
                table.next_id += 1;
                let id = Value::Int64(table.next_id);
                record.insert(def.identity_field.clone(), id.clone());
                id
            }
        };
        let key = RowKey::from_value(&id)
            .ok_or_else(|| Error::InvalidData("identity cannot be null".into()))?;

        for field in &def.fields {
            let present = record.get(&field.name).is_some_and(|v| !v.is_null());
            if present {
                continue;
            }
            if field.required {
                return Err(Error::InvalidData(format!(
                    "missing required field {entity}.{}",
                    field.name
                )));
            }
            record.entry(field.name.clone()).or_insert(Value::Null);
        }

        // Foreign keys must point at existing records; index the mirrors.
        let mut mirror_updates = Vec::new();
        for relation in self.catalog.edges_of(entity).iter().filter(|e| e.owning) {
            let fk = record.get(&relation.from_field).cloned().unwrap_or(Value::Null);
            if fk.is_null() {
                continue;
            }
            let target = inner
                .tables
                .get(&relation.to_entity)
                .and_then(|t| find_row(t, &relation.to_field, &fk));
            let target_key = match target {
                Some(key) => key,
                None => {
                    return Err(Error::InvalidData(format!(
                        "{entity}.{} references missing {} record",
                        relation.from_field, relation.to_entity
                    )));
                }
            };
            mirror_updates.push((
                format!("{entity}.{}", relation.name),
                target_key,
                id.clone(),
            ));
        }

        let table = inner
            .tables
            .get_mut(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))?;
        if table.rows.contains_key(&key) {
            return Err(Error::InvalidData(format!(
                "duplicate {entity}.{} value {id:?}",
                def.identity_field
            )));
        }
        table.rows.insert(key, record);
        for (index, target_key, owner) in mirror_updates {
            inner
                .mirrors
                .entry(index)
                .or_default()
                .entry(target_key)
                .or_default()
                .push(owner);
        }
        debug!(entity, ?id, "inserted record");
        Ok(id)
    }

    /// Fetch a record by identity.
    pub fn get(&self, entity: &str, id: &Value) -> Result<Option<HashMap<String, Value>>, Error> {
        self.catalog.entity(entity)?;
        let key = match RowKey::from_value(id) {
            Some(key) => key,
            None => return Ok(None),
        };
        let inner = self.inner.read();
        Ok(inner
            .tables
            .get(entity)
            .and_then(|t| t.rows.get(&key))
            .cloned())
    }

    /// Update one scalar field of a record.
    ///
    /// Identity fields and relationship foreign keys cannot be set here;
    /// references change through [`MemStore::set_reference`] so the
    /// mirror views stay consistent.
    pub fn set_field(&self, entity: &str, id: &Value, name: &str, value: Value) -> Result<(), Error> {
        let def = self.catalog.entity(entity)?.clone();
        let field = def.field(name).ok_or_else(|| Error::UnknownField {
            entity: entity.to_string(),
            field: name.to_string(),
        })?;
        if name == def.identity_field {
            return Err(Error::InvalidData(format!(
                "cannot reassign identity {entity}.{name}"
            )));
        }
        if self
            .catalog
            .edges_of(entity)
            .iter()
            .any(|e| e.owning && e.from_field == name)
        {
            return Err(Error::InvalidData(format!(
                "{entity}.{name} backs a relationship; use set_reference"
            )));
        }
        check_kind(entity, field, &value)?;

        let key = RowKey::from_value(id)
            .ok_or_else(|| Error::InvalidData("identity cannot be null".into()))?;
        let mut inner = self.inner.write();
        let row = inner
            .tables
            .get_mut(entity)
            .and_then(|t| t.rows.get_mut(&key))
            .ok_or_else(|| Error::InvalidData(format!("no {entity} record with id {id:?}")))?;
        row.insert(name.to_string(), value);
        Ok(())
    }

    /// Point a relationship at a new target (or clear it with null).
    ///
    /// Updates the owning-side foreign key and the target-side mirror
    /// view in one step, so both sides always agree.
    pub fn set_reference(
        &self,
        entity: &str,
        id: &Value,
        relation: &str,
        target_id: Value,
    ) -> Result<(), Error> {
        let rel = self.catalog.relation(entity, relation)?.clone();
        let key = RowKey::from_value(id)
            .ok_or_else(|| Error::InvalidData("identity cannot be null".into()))?;

        let mut inner = self.inner.write();

        let new_target_key = if target_id.is_null() {
            None
        } else {
            let found = inner
                .tables
                .get(&rel.target_entity)
                .and_then(|t| find_row(t, &rel.target_field, &target_id));
            match found {
                Some(key) => Some(key),
                None => {
                    return Err(Error::InvalidData(format!(
                        "no {} record with {} = {target_id:?}",
                        rel.target_entity, rel.target_field
                    )));
                }
            }
        };

        let row = inner
            .tables
            .get_mut(entity)
            .and_then(|t| t.rows.get_mut(&key))
            .ok_or_else(|| Error::InvalidData(format!("no {entity} record with id {id:?}")))?;
        let old_fk = row.get(&rel.owning_field).cloned().unwrap_or(Value::Null);
        row.insert(rel.owning_field.clone(), target_id);

        let index = format!("{entity}.{relation}");
        let buckets = inner.mirrors.entry(index).or_default();
        if let Some(old_key) = RowKey::from_value(&old_fk) {
            if let Some(owners) = buckets.get_mut(&old_key) {
                if let Some(pos) = owners.iter().position(|v| v.loose_eq(id)) {
                    owners.remove(pos);
                }
            }
        }
        if let Some(new_key) = new_target_key {
            buckets.entry(new_key).or_default().push(id.clone());
        }
        debug!(entity, ?id, relation, "reference updated");
        Ok(())
    }

    /// Identities of owning records currently referencing a target, as
    /// seen through the relationship's mirror view.
    pub fn mirror(&self, entity: &str, id: &Value, mirror: &str) -> Result<Vec<Value>, Error> {
        let rel = self.catalog.mirror_relation(entity, mirror)?.clone();
        let key = RowKey::from_value(id)
            .ok_or_else(|| Error::InvalidData("identity cannot be null".into()))?;
        let inner = self.inner.read();
        let index = format!("{}.{}", rel.owning_entity, rel.name);
        Ok(inner
            .mirrors
            .get(&index)
            .and_then(|buckets| buckets.get(&key))
            .cloned()
            .unwrap_or_default())
    }

    fn run_select(&self, stmt: &SelectStatement) -> Result<RowSet, StoreError> {
        let inner = self.inner.read();

        // Sources form a cross product, joins narrow it.
        let mut scopes: Vec<Scope> = vec![Scope::new()];
        for source in &stmt.sources {
            let table = inner
                .tables
                .get(&source.entity)
                .ok_or_else(|| StoreError::Execution(format!("unknown entity '{}'", source.entity)))?;
            let mut next = Vec::new();
            for scope in &scopes {
                for row in table.rows.values() {
                    next.push(extend_scope(scope, &source.alias, row));
                }
            }
            scopes = next;
        }
        for join in &stmt.joins {
            let table = inner
                .tables
                .get(&join.entity)
                .ok_or_else(|| StoreError::Execution(format!("unknown entity '{}'", join.entity)))?;
            let mut next = Vec::new();
            for scope in &scopes {
                let left = eval::column(scope, &join.left);
                if left.is_null() {
                    continue;
                }
                for row in table.rows.values() {
                    let right = row.get(&join.right.field).unwrap_or(&Value::Null);
                    if !right.is_null() && left.loose_eq(right) {
                        next.push(extend_scope(scope, &join.alias, row));
                    }
                }
            }
            scopes = next;
        }

        if let Some(filter) = &stmt.filter {
            scopes.retain(|scope| eval::eval_filter(filter, scope));
        }

        let mut scopes = if stmt.is_grouped() {
            group_scopes(stmt, scopes)
        } else {
            scopes
        };

        scopes.sort_by(|a, b| eval::compare_rows(a, b, &stmt.order_by));

        let offset = stmt.offset.unwrap_or(0) as usize;
        let scopes = scopes.into_iter().skip(offset);
        let scopes: Vec<Scope> = match stmt.limit {
            Some(limit) => scopes.take(limit as usize).collect(),
            None => scopes.collect(),
        };

        let mut rows = RowSet::new(stmt.labels());
        for scope in &scopes {
            let values = stmt
                .projection
                .iter()
                .map(|p| scope.get(&p.expr.label()).cloned().unwrap_or(Value::Null))
                .collect();
            rows.push(values);
        }
        Ok(rows)
    }
}

impl Connection for MemStore {
    fn execute(&self, statement: &Statement) -> Result<RowSet, StoreError> {
        match statement {
            Statement::Select(stmt) => self.run_select(stmt),
            Statement::Raw { .. } => Err(StoreError::Unsupported(
                "in-memory store does not execute raw statements".into(),
            )),
        }
    }
}

fn check_kind(entity: &str, field: &FieldDef, value: &Value) -> Result<(), Error> {
    match value.kind() {
        None => Ok(()),
        Some(kind) if kind == field.value_kind() => Ok(()),
        Some(kind) => Err(Error::TypeMismatch {
            path: format!("{entity}.{}", field.name),
            expected: field.value_kind(),
            actual: kind,
        }),
    }
}

fn find_row(table: &Table, field: &str, value: &Value) -> Option<RowKey> {
    table
        .rows
        .iter()
        .find(|(_, row)| row.get(field).is_some_and(|v| v.loose_eq(value)))
        .map(|(key, _)| key.clone())
}

fn extend_scope(scope: &Scope, alias: &str, row: &HashMap<String, Value>) -> Scope {
    let mut extended = scope.clone();
    for (field, value) in row {
        extended.insert(format!("{alias}.{field}"), value.clone());
    }
    extended
}

/// Collapse filtered row scopes into one scope per group.
///
/// Group scopes carry the grouping key columns plus every aggregate the
/// projection and having clause mention, keyed by label. With no grouping
/// keys there is exactly one group, even over zero rows.
fn group_scopes(stmt: &SelectStatement, scopes: Vec<Scope>) -> Vec<Scope> {
    let mut calls: Vec<AggregateCall> = Vec::new();
    let mut add_call = |call: &AggregateCall| {
        if !calls.iter().any(|c| c.label() == call.label()) {
            calls.push(call.clone());
        }
    };
    for proj in &stmt.projection {
        if let ScalarExpr::Aggregate(call) = &proj.expr {
            add_call(call);
        }
    }
    if let Some(having) = &stmt.having {
        collect_aggregates(having, &mut add_call);
    }

    let groups: Vec<Vec<Scope>> = if stmt.group_by.is_empty() {
        vec![scopes]
    } else {
        let mut buckets: BTreeMap<Vec<Option<RowKey>>, Vec<Scope>> = BTreeMap::new();
        for scope in scopes {
            let key = stmt
                .group_by
                .iter()
                .map(|col| RowKey::from_value(eval::column(&scope, col)))
                .collect();
            buckets.entry(key).or_default().push(scope);
        }
        buckets.into_values().collect()
    };

    let mut out = Vec::with_capacity(groups.len());
    for members in groups {
        let mut scope = Scope::new();
        if let Some(first) = members.first() {
            for col in &stmt.group_by {
                let label = col.qualified();
                scope.insert(label.clone(), eval::column(first, col).clone());
            }
        }
        for call in &calls {
            scope.insert(call.label(), eval::aggregate(call, &members));
        }
        if let Some(having) = &stmt.having {
            if !eval::eval_filter(having, &scope) {
                continue;
            }
        }
        out.push(scope);
    }
    out
}

fn collect_aggregates<F: FnMut(&AggregateCall)>(expr: &FilterExpr, add: &mut F) {
    match expr {
        FilterExpr::Compare { lhs, .. } => {
            if let ScalarExpr::Aggregate(call) = lhs {
                add(call);
            }
        }
        FilterExpr::Between { .. }
        | FilterExpr::In { .. }
        | FilterExpr::IsNull { .. }
        | FilterExpr::Like { .. } => {}
        FilterExpr::And(parts) | FilterExpr::Or(parts) => {
            for part in parts {
                collect_aggregates(part, add);
            }
        }
        FilterExpr::Not(inner) => collect_aggregates(inner, add),
    }
}
