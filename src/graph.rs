//! Response payload shapes and the per-request graph accumulator.
//!
//! Every engine writes nodes and edges into a [`GraphBuilder`] and
//! returns the finished [`Graph`]. De-duplication is keyed by node id
//! (hash of the model name, see [`crate::ident::node_id`]) with the
//! name kept alongside as a collision tie-breaker; duplicate edge ids
//! are no-ops. Insertion order is preserved as observed by traversal.

use crate::ident;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    pub data: NodeData,
    pub position: Position,
    #[serde(rename = "type")]
    pub node_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeData {
    pub name: String,
    pub color: String,
    pub label: String,
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materialized: Option<String>,
    pub columns: Vec<String>,
    pub first: bool,
    pub last: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_label: String,
    pub target_label: String,
    #[serde(rename = "sourceHandle")]
    pub source_handle: String,
    #[serde(rename = "targetHandle")]
    pub target_handle: String,
}

#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    edge_ids: HashSet<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a node for a model, or merge `columns` into the existing
    /// node with the same `(id, name)`. Merging keeps first-seen order
    /// and the first-observed casing of each column.
    pub fn upsert_node(
        &mut self,
        name: &str,
        schema: &str,
        materialized: Option<String>,
        columns: &[String],
        first: bool,
    ) {
        let id = ident::node_id(name);
        if let Some(node) = self
            .nodes
            .iter_mut()
            .find(|n| n.id == id && n.data.name == name)
        {
            for column in columns {
                if !ident::contains_fold(&node.data.columns, column) {
                    node.data.columns.push(column.clone());
                }
            }
            return;
        }

        self.nodes.push(Node {
            id,
            data: NodeData {
                name: name.to_string(),
                color: "black".to_string(),
                label: name.to_string(),
                schema: schema.to_string(),
                materialized,
                columns: columns.to_vec(),
                first,
                last: false,
            },
            position: Position::default(),
            node_type: "eventNode".to_string(),
        });
    }

    /// Append an edge unless one with the same id already exists.
    pub fn add_edge(&mut self, edge: Edge) {
        if self.edge_ids.contains(&edge.id) {
            return;
        }
        self.edge_ids.insert(edge.id.clone());
        self.edges.push(edge);
    }

    /// Flag the node carrying `name` as a traversal terminal.
    pub fn mark_last(&mut self, name: &str) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.data.name == name) {
            node.data.last = true;
        }
    }

    pub fn finish(self) -> Graph {
        Graph {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}
