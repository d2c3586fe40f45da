//! Table-level lineage: a pure, depth-bounded walk over the manifest's
//! parent/child adjacency. No SQL is parsed; nodes carry no columns.

use crate::artifacts::ArtifactStore;
use crate::graph::{Edge, Graph, GraphBuilder};
use crate::ident;
use std::collections::{HashSet, VecDeque};
use tracing::error;

pub struct TableLineage<'a> {
    store: &'a ArtifactStore,
    depth_limit: i32,
}

struct Resolved<'a> {
    name: &'a str,
    schema: &'a str,
    materialized: Option<String>,
}

impl<'a> TableLineage<'a> {
    pub fn new(store: &'a ArtifactStore, depth_limit: i32) -> Self {
        Self { store, depth_limit }
    }

    /// Walk upstream (`reverse == false`, via the parent map) or
    /// downstream (`reverse == true`, via the child map) from `source`.
    pub fn run(&self, source: &str, reverse: bool) -> Graph {
        let mut graph = GraphBuilder::new();
        let Some(origin) = self.store.find_node(source) else {
            error!(source, "model not found in manifest");
            return graph.finish();
        };

        graph.upsert_node(
            &origin.name,
            &origin.schema,
            origin.config.materialized.clone(),
            &[],
            true,
        );

        let mut queue = VecDeque::from([(origin.unique_id.clone(), 0usize)]);
        let mut seen: HashSet<String> = HashSet::from([origin.unique_id.clone()]);

        while let Some((uid, depth)) = queue.pop_front() {
            let next_depth = depth + 1;
            if self.depth_limit != -1 && next_depth as i32 > self.depth_limit {
                continue;
            }
            let Some(current) = self.resolve(&uid) else {
                continue;
            };
            let current_name = current.name.to_string();

            let neighbors = if reverse {
                self.store.children(&uid)
            } else {
                self.store.parents(&uid)
            };
            for neighbor_uid in neighbors {
                let Some(neighbor) = self.resolve(neighbor_uid) else {
                    error!(uid = neighbor_uid.as_str(), "adjacent uid not found");
                    continue;
                };
                graph.upsert_node(neighbor.name, neighbor.schema, neighbor.materialized, &[], false);

                // Downstream model sits on the source side of the edge,
                // matching the column-level engines.
                let (edge_source, edge_target) = if reverse {
                    (neighbor.name.to_string(), current_name.clone())
                } else {
                    (current_name.clone(), neighbor.name.to_string())
                };
                let source_id = ident::node_id(&edge_source);
                let target_id = ident::node_id(&edge_target);
                graph.add_edge(Edge {
                    id: format!("{source_id}-{target_id}"),
                    source: source_id.clone(),
                    target: target_id.clone(),
                    source_label: edge_source,
                    target_label: edge_target,
                    source_handle: format!("{source_id}__source"),
                    target_handle: format!("{target_id}__target"),
                });

                if seen.insert(neighbor_uid.clone()) {
                    queue.push_back((neighbor_uid.clone(), next_depth));
                }
            }
        }

        graph.finish()
    }

    fn resolve(&self, uid: &str) -> Option<Resolved<'_>> {
        if let Some(node) = self.store.manifest.nodes.get(uid) {
            return Some(Resolved {
                name: &node.name,
                schema: &node.schema,
                materialized: node.config.materialized.clone(),
            });
        }
        self.store.manifest.sources.get(uid).map(|source| Resolved {
            name: &source.name,
            schema: &source.schema,
            materialized: None,
        })
    }
}
