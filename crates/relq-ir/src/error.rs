//! Store boundary error type.

use thiserror::Error;

/// Errors produced by a store connection while executing a statement.
///
/// The query layer wraps these verbatim; retry policy, if any, belongs to
/// the connection implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store failed while executing a statement.
    #[error("store execution failed: {0}")]
    Execution(String),

    /// The store does not support this statement form.
    #[error("unsupported statement: {0}")]
    Unsupported(String),

    /// The connection to the store is unavailable.
    #[error("connection failure: {0}")]
    Connection(String),
}
