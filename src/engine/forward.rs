//! Forward (upstream) column lineage.
//!
//! Depth-first traversal: at each model the compiled SQL is walked via
//! the lineage adapter, the requested columns are filtered against the
//! model's declared columns, node and edges are emitted, and the
//! traversal recurses into every terminal table label the walk
//! surfaced. A node is flagged `last` when an unbounded request reaches
//! it and finds nothing further upstream.

use crate::artifacts::ArtifactStore;
use crate::constants::MAX_TRAVERSAL_DEPTH;
use crate::graph::{Edge, Graph, GraphBuilder};
use crate::ident;
use crate::sql::{self, Dialect};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, error};

pub struct ForwardLineage<'a> {
    store: &'a ArtifactStore,
    dialect: Dialect,
    depth_limit: i32,
    graph: GraphBuilder,
    /// Re-entry guard against cyclic artifacts; keyed on the full step
    /// arguments so diamond-shaped DAGs still revisit shared parents.
    visited: HashSet<(String, String, String, String)>,
}

impl<'a> ForwardLineage<'a> {
    pub fn new(store: &'a ArtifactStore, dialect: Dialect, depth_limit: i32) -> Self {
        Self {
            store,
            dialect,
            depth_limit,
            graph: GraphBuilder::new(),
            visited: HashSet::new(),
        }
    }

    pub fn run(mut self, source: &str, column: &str) -> Graph {
        let column = column.to_uppercase();
        self.step("", source, "", &[column], 0);
        self.graph.finish()
    }

    fn step(
        &mut self,
        base_source: &str,
        next_source: &str,
        base_column: &str,
        next_columns: &[String],
        depth: usize,
    ) {
        if depth > MAX_TRAVERSAL_DEPTH {
            error!(source = next_source, "traversal depth cap reached");
            return;
        }
        let frame = (
            base_source.to_string(),
            next_source.to_lowercase(),
            base_column.to_string(),
            next_columns.join(","),
        );
        if !self.visited.insert(frame) {
            return;
        }

        let Some(node) = self.store.find_node(next_source) else {
            error!(source = next_source, "model not found in manifest");
            return;
        };
        let declared = self.store.declared_columns(next_source);
        let filtered = super::filter_columns(&declared, next_columns);

        let first = self.graph.is_empty();
        self.graph.upsert_node(
            next_source,
            &node.schema,
            node.config.materialized.clone(),
            &filtered,
            first,
        );
        self.add_edges(base_source, next_source, base_column, &filtered);

        let traces = if !node.is_model() {
            debug!(source = next_source, resource_type = %node.resource_type, "skipping sql walk");
            BTreeMap::new()
        } else if let Some(code) = &node.compiled_code {
            let schema = super::schema_map_for(self.store, &node.depends_on.nodes);
            let targets: Vec<String> = filtered.iter().map(|c| c.to_uppercase()).collect();
            sql::column_lineage(self.dialect, next_source, code, &targets, &schema, false)
        } else {
            debug!(source = next_source, "no compiled code");
            BTreeMap::new()
        };

        let next_depth = depth + 1;
        let mut next_found = false;
        for (after_base_column, trace) in &traces {
            let next_columns: Vec<String> = trace.columns.iter().cloned().collect();
            for label in &trace.labels {
                next_found = true;
                if self.depth_limit != -1 && next_depth as i32 > self.depth_limit {
                    continue;
                }
                let after_next_source = label.to_lowercase();
                debug!(
                    base_source = next_source,
                    next_source = %after_next_source,
                    base_column = %after_base_column,
                    depth = next_depth,
                    "descending"
                );
                self.step(
                    next_source,
                    &after_next_source,
                    after_base_column,
                    &next_columns,
                    next_depth,
                );
            }
        }

        if !next_found && self.depth_limit == -1 {
            debug!(source = next_source, "terminal node");
            self.graph.mark_last(next_source);
        }
    }

    fn add_edges(
        &mut self,
        base_source: &str,
        next_source: &str,
        base_column: &str,
        columns: &[String],
    ) {
        if base_source.is_empty() || columns.is_empty() {
            return;
        }
        if base_source.eq_ignore_ascii_case(next_source) {
            return;
        }
        let source_id = ident::node_id(base_source);
        let target_id = ident::node_id(next_source);
        for column in columns {
            self.graph.add_edge(Edge {
                id: format!("{source_id}-{target_id}-{base_column}-{column}"),
                source: source_id.clone(),
                target: target_id.clone(),
                source_label: base_source.to_string(),
                target_label: next_source.to_string(),
                source_handle: format!("{base_column}__source"),
                target_handle: format!("{column}__target"),
            });
        }
    }
}
