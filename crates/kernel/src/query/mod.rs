//! The filter-to-SQL query engine.
//!
//! Criteria and filter trees are validated, hierarchical criteria are
//! expanded through the database, and the result is compiled into a
//! [`plan::QueryPlan`] whose id and count statements run against SQLite.

pub mod clause;
pub mod compiler;
pub mod criterion;
pub mod entity;
pub mod hierarchy;
pub mod hydrate;
pub mod plan;
pub mod relation;
pub mod repository;
pub mod search;
pub mod sort;

pub use compiler::{Criteria, FilterNode, Level};
pub use criterion::Modifier;
pub use entity::{Entity, Filter};
pub use repository::{FindResult, Repository};
pub use sort::{FindFilter, PER_PAGE_ALL};
