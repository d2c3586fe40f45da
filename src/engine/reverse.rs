//! Reverse (downstream) column lineage.
//!
//! For a source model/column, every child from the manifest's child
//! map is probed: each declared child column is walked through the
//! lineage adapter, and the column is admitted when the walk both
//! terminates at the source's table and references the source column.

use crate::artifacts::ArtifactStore;
use crate::graph::{Edge, Graph, GraphBuilder};
use crate::ident;
use crate::sql::{self, Dialect};
use tracing::{debug, error};

pub struct ReverseLineage<'a> {
    store: &'a ArtifactStore,
    dialect: Dialect,
}

impl<'a> ReverseLineage<'a> {
    pub fn new(store: &'a ArtifactStore, dialect: Dialect) -> Self {
        Self { store, dialect }
    }

    pub fn run(&self, source: &str, column: &str) -> Graph {
        let column_up = column.to_uppercase();
        let mut graph = GraphBuilder::new();

        let Some(node) = self.store.find_node(source) else {
            error!(source, "model not found in manifest");
            return graph.finish();
        };
        let target_id = ident::node_id(source);
        let source_up = source.to_uppercase();

        for child_uid in self.store.children(&node.unique_id) {
            let Some(child) = self.store.manifest.nodes.get(child_uid) else {
                error!(uid = child_uid.as_str(), "child uid not found in manifest");
                continue;
            };
            let Some(code) = &child.compiled_code else {
                debug!(child = %child.name, "no compiled code");
                continue;
            };

            let dep_tables = self.store.depends_on_tables(&child.depends_on.nodes);
            if !dep_tables.iter().any(|t| t.name.eq_ignore_ascii_case(source)) {
                debug!(child = %child.name, "child does not depend on source table");
                continue;
            }
            let schema = super::schema_map_from(&dep_tables);

            let mut admitted = Vec::new();
            for child_column in self.store.declared_columns(&child.name) {
                let child_column_up = child_column.to_uppercase();
                let traces = sql::column_lineage(
                    self.dialect,
                    &child.name,
                    code,
                    &[child_column_up.clone()],
                    &schema,
                    false,
                );
                let Some(trace) = traces.get(&child_column_up) else {
                    continue;
                };
                let derives_from_source = trace.labels.contains(&source_up)
                    && trace
                        .columns
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(&column_up));
                if derives_from_source {
                    debug!(child = %child.name, column = %child_column_up, "admitted");
                    admitted.push(child_column_up);
                }
            }

            if admitted.is_empty() {
                continue;
            }
            graph.upsert_node(
                &child.name,
                &child.schema,
                child.config.materialized.clone(),
                &admitted,
                true,
            );
            let child_id = ident::node_id(&child.name);
            for child_column in &admitted {
                graph.add_edge(Edge {
                    id: format!("{child_id}-{target_id}-{child_column}-{column_up}"),
                    source: child_id.clone(),
                    target: target_id.clone(),
                    source_label: child.name.clone(),
                    target_label: source.to_string(),
                    source_handle: format!("{child_column}__source"),
                    target_handle: format!("{column_up}__target"),
                });
            }
        }

        graph.finish()
    }
}
