//! Result row shape returned by a store connection.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A labeled block of result rows.
///
/// Labels are stored once for the whole block; every row has exactly one
/// value per label, in label order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    /// Column labels, in projection order.
    pub labels: Vec<String>,
    /// Row values, each the same length as `labels`.
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Create an empty row set with the given labels.
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            labels,
            rows: vec![],
        }
    }

    /// Create a row set with data.
    pub fn with_rows(labels: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { labels, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if this row set has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a label, if present.
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Get the value at a specific row and label.
    pub fn get(&self, row: usize, label: &str) -> Option<&Value> {
        let idx = self.label_index(label)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Append a row. The caller must supply one value per label.
    pub fn push(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.labels.len());
        self.rows.push(row);
    }
}
