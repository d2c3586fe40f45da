//! Column-level data lineage for dbt projects.
//!
//! The engine answers four questions about a compiled dbt project,
//! using only its build artifacts (`manifest.json` and `catalog.json`):
//! which upstream columns a model column derives from, which downstream
//! models consume it, how models depend on each other table-to-table,
//! and how a single model decomposes into its CTEs.

pub mod artifacts;
pub mod constants;
pub mod engine;
pub mod error;
pub mod graph;
pub mod ident;
pub mod listing;
pub mod project;
pub mod sql;

pub use artifacts::ArtifactStore;
pub use engine::{cte_dependency, forward_lineage, reverse_lineage, table_lineage};
pub use error::{Error, Result};
pub use graph::Graph;
pub use listing::{list_columns, list_schemas, list_sources};
pub use sql::Dialect;
