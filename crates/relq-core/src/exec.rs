//! Statement execution: the store connection trait, the executor with its
//! fetch modes, and materialized result rows.

use crate::error::Error;
use crate::expr::{Agg, Path};
use parking_lot::Mutex;
use relq_ir::{RowSet, Statement, StoreError, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A connection to a store that executes translated statements.
///
/// Implementations are not required to be internally synchronized; the
/// executor serializes all statement round trips over one connection.
pub trait Connection: Send + Sync {
    /// Execute one statement and materialize its result rows.
    fn execute(&self, statement: &Statement) -> Result<RowSet, StoreError>;
}

/// One materialized result row.
///
/// Values are addressable by projection position or by result label. The
/// label vector is shared across all rows of a result.
#[derive(Debug, Clone)]
pub struct Row {
    labels: Arc<Vec<String>>,
    values: Vec<Value>,
}

/// A typed key into a result row, produced by the expressions a query
/// projected.
pub trait ResultKey {
    /// The label this key addresses.
    fn result_label(&self) -> String;
}

impl ResultKey for Path {
    fn result_label(&self) -> String {
        self.label()
    }
}

impl ResultKey for Agg {
    fn result_label(&self) -> String {
        self.label()
    }
}

impl Row {
    /// Value at a projection position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value under a result label, e.g. `m.age` or `avg(m.age)`.
    pub fn get_named(&self, label: &str) -> Option<&Value> {
        let index = self.labels.iter().position(|l| l == label)?;
        self.values.get(index)
    }

    /// Value under the label of a projected expression.
    pub fn get_expr<K: ResultKey>(&self, key: &K) -> Option<&Value> {
        self.get_named(&key.result_label())
    }

    /// Result labels, in projection order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// All values, in projection order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// A page of rows together with the unpaged total.
#[derive(Debug)]
pub struct QueryResults {
    /// The page of rows, with offset and limit applied.
    pub rows: Vec<Row>,
    /// Total matching rows, ignoring offset and limit.
    pub total: u64,
    /// Offset that produced this page.
    pub offset: Option<u64>,
    /// Limit that produced this page.
    pub limit: Option<u64>,
}

/// Executes statements over one connection.
///
/// Round trips are serialized through an internal mutex, so a factory and
/// its queries can be shared across threads while the underlying
/// connection sees one statement at a time. An optional deadline is
/// checked before every round trip.
pub struct Executor {
    conn: Arc<dyn Connection>,
    gate: Mutex<()>,
    deadline: Option<Instant>,
}

impl Executor {
    /// Create an executor over a connection.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            gate: Mutex::new(()),
            deadline: None,
        }
    }

    /// Fail statements issued after the given instant.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn check_deadline(&self) -> Result<(), Error> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    fn round_trip(&self, statement: &Statement) -> Result<RowSet, StoreError> {
        debug!(?statement, "executing statement");
        self.conn.execute(statement)
    }

    /// Execute one statement and materialize every row.
    pub(crate) fn fetch(&self, statement: &Statement) -> Result<Vec<Row>, Error> {
        self.check_deadline()?;
        let _gate = self.gate.lock();
        let rows = self.round_trip(statement)?;
        Ok(materialize(rows))
    }

    /// Execute and require at most one row.
    ///
    /// Zero rows is `None`; two or more is [`Error::NonUniqueResult`].
    pub(crate) fn fetch_one(&self, statement: &Statement) -> Result<Option<Row>, Error> {
        let mut rows = self.fetch(statement)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            found => Err(Error::NonUniqueResult { found }),
        }
    }

    /// Execute and take the first row, if any.
    ///
    /// The caller narrows the statement to one row before translation, so
    /// this never transfers more than a single row.
    pub(crate) fn fetch_first(&self, statement: &Statement) -> Result<Option<Row>, Error> {
        let mut rows = self.fetch(statement)?;
        if rows.len() > 1 {
            rows.truncate(1);
        }
        Ok(rows.pop())
    }

    /// Execute a paged statement plus its companion count statement.
    ///
    /// Both round trips run inside one critical section, so no other
    /// statement on this connection interleaves between the page and its
    /// total.
    pub(crate) fn fetch_results(
        &self,
        statement: &Statement,
        count: &Statement,
        grouped: bool,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<QueryResults, Error> {
        self.check_deadline()?;
        let _gate = self.gate.lock();
        let rows = materialize(self.round_trip(statement)?);
        self.check_deadline()?;
        let total = extract_count(&self.round_trip(count)?, grouped)?;
        Ok(QueryResults {
            rows,
            total,
            offset,
            limit,
        })
    }

    /// Execute a count statement and extract the total.
    pub(crate) fn fetch_count(&self, count: &Statement, grouped: bool) -> Result<u64, Error> {
        self.check_deadline()?;
        let _gate = self.gate.lock();
        extract_count(&self.round_trip(count)?, grouped)
    }
}

fn materialize(rows: RowSet) -> Vec<Row> {
    let labels = Arc::new(rows.labels);
    rows.rows
        .into_iter()
        .map(|values| Row {
            labels: Arc::clone(&labels),
            values,
        })
        .collect()
}

/// Extract a total from a count statement's result.
///
/// Grouped statements yield one row per group, so the total is the row
/// count; ungrouped statements yield a single `count(*)` scalar.
fn extract_count(rows: &RowSet, grouped: bool) -> Result<u64, Error> {
    if grouped {
        return Ok(rows.rows.len() as u64);
    }
    let value = rows
        .rows
        .first()
        .and_then(|row| row.first())
        .ok_or_else(|| Error::InvalidData("count statement returned no rows".into()))?;
    value
        .as_i64()
        .map(|n| n.max(0) as u64)
        .ok_or_else(|| Error::InvalidData(format!("count statement returned {value:?}")))
}
