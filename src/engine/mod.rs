//! Lineage engines.
//!
//! Each engine is constructed per request around the shared, read-only
//! [`ArtifactStore`] and owns its own graph accumulator; nothing here
//! mutates the snapshot.

pub mod cte;
pub mod forward;
pub mod reverse;
pub mod table;

use crate::artifacts::{ArtifactStore, DependsOnTable};
use crate::error::Result;
use crate::graph::Graph;
use crate::sql::{Dialect, SchemaMap};

pub use cte::CteDecomposition;

/// Forward (upstream) column lineage. `depth_limit == -1` is unbounded.
pub fn forward_lineage(
    store: &ArtifactStore,
    dialect: Dialect,
    source: &str,
    column: &str,
    depth_limit: i32,
) -> Graph {
    forward::ForwardLineage::new(store, dialect, depth_limit).run(source, column)
}

/// Reverse (downstream) column lineage.
pub fn reverse_lineage(
    store: &ArtifactStore,
    dialect: Dialect,
    source: &str,
    column: &str,
) -> Graph {
    reverse::ReverseLineage::new(store, dialect).run(source, column)
}

/// Model-to-model lineage in either direction. `depth_limit == -1` is
/// unbounded.
pub fn table_lineage(store: &ArtifactStore, source: &str, reverse: bool, depth_limit: i32) -> Graph {
    table::TableLineage::new(store, depth_limit).run(source, reverse)
}

/// CTE decomposition of a single model.
pub fn cte_dependency(
    store: &ArtifactStore,
    dialect: Dialect,
    source: &str,
    columns: &[String],
) -> Result<CteDecomposition> {
    cte::CteDecomposer::new(store, dialect).run(source, columns)
}

/// Build the SQL lineage schema from a model's dependency uids.
pub(crate) fn schema_map_for(store: &ArtifactStore, depends_on: &[String]) -> SchemaMap {
    schema_map_from(&store.depends_on_tables(depends_on))
}

pub(crate) fn schema_map_from(tables: &[DependsOnTable]) -> SchemaMap {
    let mut schema = SchemaMap::new();
    for table in tables {
        schema.add_table(
            &table.table_ref,
            &table.schema,
            &table.name,
            table
                .columns
                .iter()
                .map(|(name, column_type)| (name.as_str(), column_type.as_deref())),
        );
    }
    schema
}

/// Keep only the requested columns that the model declares, preserving
/// request order and casing. A model with no declared columns is
/// unconstrained and passes everything through.
pub(crate) fn filter_columns(declared: &[String], requested: &[String]) -> Vec<String> {
    if declared.is_empty() {
        return requested.to_vec();
    }
    requested
        .iter()
        .filter(|column| declared.iter().any(|d| d.eq_ignore_ascii_case(column)))
        .cloned()
        .collect()
}
