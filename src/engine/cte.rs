//! CTE decomposition of a single compiled model.
//!
//! Produces the internal CTE dependency graph: one node per CTE (with
//! its clause texts and the per-column lineage metadata whose
//! `reference` names it), one node per fully-qualified table referenced
//! inside a CTE, and edges pointing from each referenced table or CTE
//! into the enclosing CTE.

use crate::artifacts::{ArtifactStore, CatalogColumn};
use crate::error::{Error, Result};
use crate::graph::Position;
use crate::sql::{self, CteMetaEntry, Dialect};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::error;

#[derive(Debug, Serialize)]
pub struct CteDecomposition {
    pub edges: Vec<CteEdge>,
    pub nodes: Vec<CteGraphNode>,
    #[serde(rename = "tableName")]
    pub table_name: String,
    pub materialized: Option<String>,
    pub query: String,
    pub description: Option<String>,
    pub columns: BTreeMap<String, CatalogColumn>,
    #[serde(rename = "entireMeta")]
    pub entire_meta: Vec<CteMetaEntry>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CteGraphNode {
    Cte(CteNode),
    Table(TableNode),
}

#[derive(Debug, Serialize)]
pub struct CteNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: &'static str,
    pub data: CteNodeData,
    pub position: Position,
}

#[derive(Debug, Serialize)]
pub struct CteNodeData {
    pub label: String,
    #[serde(rename = "nodeType")]
    pub node_type: &'static str,
    pub meta: Vec<CteMetaEntry>,
    pub groups: Vec<String>,
    pub havings: Vec<String>,
    pub wheres: Vec<String>,
    pub unions: Vec<String>,
    pub joins: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TableNode {
    pub id: String,
    pub data: TableNodeData,
    pub position: Position,
    pub style: NodeStyle,
    #[serde(rename = "type")]
    pub node_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TableNodeData {
    pub label: String,
    pub db: String,
    pub table: String,
}

#[derive(Debug, Serialize)]
pub struct NodeStyle {
    pub background: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CteEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "markerStart")]
    pub marker_start: Marker,
}

#[derive(Debug, Serialize)]
pub struct Marker {
    #[serde(rename = "type")]
    pub marker_type: &'static str,
    pub width: i32,
    pub height: i32,
}

impl Marker {
    fn arrow() -> Self {
        Marker {
            marker_type: "arrowclosed",
            width: 16,
            height: 16,
        }
    }
}

pub struct CteDecomposer<'a> {
    store: &'a ArtifactStore,
    dialect: Dialect,
}

impl<'a> CteDecomposer<'a> {
    pub fn new(store: &'a ArtifactStore, dialect: Dialect) -> Self {
        Self { store, dialect }
    }

    pub fn run(&self, source: &str, columns: &[String]) -> Result<CteDecomposition> {
        let Some(node) = self.store.find_node(source) else {
            return Err(Error::NotFound(format!("model {source} not found")));
        };
        let Some(code) = node.compiled_code.clone() else {
            return Err(Error::NotFound(format!("model {source} has no compiled code")));
        };

        // Column lineage over the whole statement, used to enrich the
        // CTE nodes and to highlight the tables the traced columns
        // actually flow from.
        let mut entire_meta: Vec<CteMetaEntry> = Vec::new();
        let mut lineage_tables: BTreeSet<String> = BTreeSet::new();
        if !columns.is_empty() {
            let schema = super::schema_map_for(self.store, &node.depends_on.nodes);
            let traces = sql::column_lineage(self.dialect, source, &code, columns, &schema, true);
            for trace in traces.values() {
                for label in &trace.labels {
                    lineage_tables.insert(label.to_lowercase());
                }
                entire_meta.extend(trace.meta.iter().cloned());
            }
        }

        let summaries = match sql::decompose(self.dialect, &code) {
            Ok(summaries) => summaries,
            Err(err) => {
                error!(source, %err, "failed to parse ctes");
                Vec::new()
            }
        };

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut edge_ids: HashSet<String> = HashSet::new();
        let mut table_ids: HashSet<String> = HashSet::new();

        for summary in &summaries {
            let meta = entire_meta
                .iter()
                .filter(|entry| entry.reference == summary.name)
                .cloned()
                .collect();
            nodes.push(CteGraphNode::Cte(CteNode {
                id: summary.name.clone(),
                node_type: "cte",
                data: CteNodeData {
                    label: summary.name.clone(),
                    node_type: "CTE",
                    meta,
                    groups: summary.groups.clone(),
                    havings: summary.havings.clone(),
                    wheres: summary.wheres.clone(),
                    unions: summary.unions.clone(),
                    joins: summary.joins.clone(),
                },
                position: Position::default(),
            }));

            for table in &summary.tables {
                if table.qualified && table_ids.insert(table.name.clone()) {
                    let highlighted = lineage_tables.contains(&table.name.to_lowercase());
                    nodes.push(CteGraphNode::Table(TableNode {
                        id: table.name.clone(),
                        data: TableNodeData {
                            label: table.name.clone(),
                            db: table.db.clone(),
                            table: table.name.clone(),
                        },
                        position: Position::default(),
                        style: NodeStyle {
                            background: if highlighted { "#ffccaa" } else { "#aaccff" },
                        },
                        node_type: "input",
                    }));
                }

                if table.name.is_empty()
                    || summary.name.is_empty()
                    || table.name == summary.name
                {
                    continue;
                }
                let edge_id = format!("{}-{}", summary.name, table.name);
                if !edge_ids.insert(edge_id.clone()) {
                    continue;
                }
                edges.push(CteEdge {
                    id: edge_id,
                    source: table.name.clone(),
                    target: summary.name.clone(),
                    marker_start: Marker::arrow(),
                });
            }
        }

        let columns = self
            .store
            .find_catalog(source)
            .map(|entry| entry.columns.clone())
            .unwrap_or_default();

        Ok(CteDecomposition {
            edges,
            nodes,
            table_name: node.name.clone(),
            materialized: node.config.materialized.clone(),
            query: code,
            description: node.description.clone(),
            columns,
            entire_meta,
        })
    }
}
