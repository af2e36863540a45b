//! Statement planning: builder-state translation and SQL rendering.

mod sql;
mod translate;

pub use sql::render;
pub(crate) use translate::{JoinSpec, Planner, QueryState};
