//! Core error types.

use relq_ir::{StoreError, ValueKind};
use thiserror::Error;

/// Query layer errors.
///
/// Construction and translation errors (`TypeMismatch`, `UnboundAlias`,
/// `DuplicateAlias`, `InvalidQuery`, the catalog lookup variants) are
/// raised before any I/O. `NonUniqueResult` is an expected execution
/// outcome the caller handles; `Store` wraps connection failures verbatim.
#[derive(Debug, Error)]
pub enum Error {
    /// A comparison was built over incompatible types.
    #[error("type mismatch on {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Qualified path of the offending expression.
        path: String,
        /// Kind required by the path.
        expected: ValueKind,
        /// Kind actually supplied.
        actual: ValueKind,
    },

    /// A clause referenced an alias never bound by `from` or `join`.
    #[error("unbound alias '{0}'")]
    UnboundAlias(String),

    /// The same alias was bound twice.
    #[error("duplicate alias '{0}'")]
    DuplicateAlias(String),

    /// `fetch_one` matched more than one row.
    #[error("expected at most one result, found {found}")]
    NonUniqueResult {
        /// Number of rows the statement produced.
        found: usize,
    },

    /// The store connection failed while executing a statement.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Entity not declared in the catalog.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// Field not declared on an entity.
    #[error("unknown field '{field}' on entity '{entity}'")]
    UnknownField {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
    },

    /// Relationship not declared on an entity.
    #[error("unknown relationship '{relation}' on entity '{entity}'")]
    UnknownRelation {
        /// Entity name.
        entity: String,
        /// Relationship name.
        relation: String,
    },

    /// The accumulated builder state cannot be translated.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Data handed to the store failed validation.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The execution deadline elapsed before a round trip started.
    #[error("query deadline exceeded")]
    DeadlineExceeded,
}
