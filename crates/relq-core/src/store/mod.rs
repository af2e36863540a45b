//! In-memory store backend.

mod eval;
mod mem;

pub use mem::MemStore;
