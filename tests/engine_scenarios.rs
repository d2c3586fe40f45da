//! End-to-end engine scenarios against the in-memory fixture project.

mod helpers;

use dbt_column_lineage::engine::cte::CteGraphNode;
use dbt_column_lineage::engine::{
    cte_dependency, forward_lineage, reverse_lineage, table_lineage,
};
use dbt_column_lineage::graph::Graph;
use dbt_column_lineage::ident::node_id;
use dbt_column_lineage::sql::Dialect;
use helpers::demo_store;

fn node_names(graph: &Graph) -> Vec<&str> {
    graph.nodes.iter().map(|n| n.data.name.as_str()).collect()
}

#[test]
fn single_hop_forward() {
    let store = demo_store();
    let graph = forward_lineage(&store, Dialect::Snowflake, "c", "X", -1);

    assert_eq!(node_names(&graph), ["c", "leaf"]);
    assert_eq!(graph.edges.len(), 1);

    let edge = &graph.edges[0];
    assert_eq!(edge.id, format!("{}-{}-X-x", node_id("c"), node_id("leaf")));
    assert_eq!(edge.source_handle, "X__source");
    assert_eq!(edge.target_handle, "x__target");

    let c = &graph.nodes[0];
    assert!(c.data.first);
    assert!(!c.data.last);
    assert_eq!(c.data.columns, ["X"]);

    let leaf = &graph.nodes[1];
    assert!(leaf.data.last);
    assert_eq!(leaf.data.columns, ["x"]);
}

#[test]
fn unbounded_forward_walks_the_chain() {
    let store = demo_store();
    let graph = forward_lineage(&store, Dialect::Snowflake, "b", "X", -1);

    assert_eq!(node_names(&graph), ["b", "a", "a0"]);
    assert_eq!(graph.edges.len(), 2);
    // Only the traversal terminal carries `last`.
    let last: Vec<_> = graph
        .nodes
        .iter()
        .filter(|n| n.data.last)
        .map(|n| n.data.name.as_str())
        .collect();
    assert_eq!(last, ["a0"]);
}

#[test]
fn depth_bounded_forward_never_marks_last() {
    let store = demo_store();
    let graph = forward_lineage(&store, Dialect::Snowflake, "b", "X", 1);

    assert_eq!(node_names(&graph), ["b", "a"]);
    assert_eq!(graph.edges.len(), 1);
    assert!(graph.nodes.iter().all(|n| !n.data.last));
}

#[test]
fn node_and_edge_ids_are_unique() {
    let store = demo_store();
    let graph = forward_lineage(&store, Dialect::Snowflake, "b", "X", -1);

    let mut node_ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    node_ids.sort();
    node_ids.dedup();
    assert_eq!(node_ids.len(), graph.nodes.len());

    let mut edge_ids: Vec<_> = graph.edges.iter().map(|e| e.id.as_str()).collect();
    edge_ids.sort();
    edge_ids.dedup();
    assert_eq!(edge_ids.len(), graph.edges.len());
}

#[test]
fn forward_columns_are_declared_or_unconstrained() {
    let store = demo_store();
    let graph = forward_lineage(&store, Dialect::Snowflake, "b", "X", -1);
    for node in &graph.nodes {
        let declared = store.declared_columns(&node.data.name);
        for column in &node.data.columns {
            assert!(
                declared.is_empty()
                    || declared.iter().any(|d| d.eq_ignore_ascii_case(column)),
                "column {column} not declared on {}",
                node.data.name
            );
        }
    }
}

#[test]
fn reverse_lineage_admits_consuming_child() {
    let store = demo_store();
    let graph = reverse_lineage(&store, Dialect::Snowflake, "a", "X");

    assert_eq!(node_names(&graph), ["b"]);
    assert!(graph.nodes[0].data.first);
    assert_eq!(graph.nodes[0].data.columns, ["X"]);

    assert_eq!(graph.edges.len(), 1);
    let edge = &graph.edges[0];
    assert_eq!(edge.source, node_id("b"));
    assert_eq!(edge.target, node_id("a"));
    assert_eq!(edge.source_handle, "X__source");
    assert_eq!(edge.target_handle, "X__target");
}

#[test]
fn reverse_lineage_of_unconsumed_column_is_empty() {
    let store = demo_store();
    // a consumes a0.x but never a0.y, so nothing is admitted.
    let graph = reverse_lineage(&store, Dialect::Snowflake, "a0", "Y");
    assert!(graph.nodes.is_empty());
    assert!(graph.edges.is_empty());
}

#[test]
fn seed_without_compiled_code_terminates_cleanly() {
    let store = demo_store();
    let graph = forward_lineage(&store, Dialect::Snowflake, "seed1", "X", -1);

    assert_eq!(node_names(&graph), ["seed1"]);
    assert!(graph.edges.is_empty());
}

#[test]
fn parse_failure_keeps_the_source_node() {
    let store = demo_store();
    let graph = forward_lineage(&store, Dialect::Snowflake, "bad", "X", -1);

    assert_eq!(node_names(&graph), ["bad"]);
    assert!(graph.edges.is_empty());

    // The store is untouched; other requests keep working.
    let graph = forward_lineage(&store, Dialect::Snowflake, "b", "X", -1);
    assert_eq!(graph.nodes.len(), 3);
}

#[test]
fn unknown_model_yields_empty_graph() {
    let store = demo_store();
    let graph = forward_lineage(&store, Dialect::Snowflake, "nope", "X", -1);
    assert!(graph.nodes.is_empty());
    assert!(graph.edges.is_empty());
}

#[test]
fn table_lineage_upstream() {
    let store = demo_store();
    let graph = table_lineage(&store, "b", false, -1);

    assert_eq!(node_names(&graph), ["b", "a", "a0"]);
    assert!(graph.nodes.iter().all(|n| n.data.columns.is_empty()));
    assert_eq!(graph.edges.len(), 2);

    let edge = &graph.edges[0];
    assert_eq!(edge.id, format!("{}-{}", node_id("b"), node_id("a")));
    assert_eq!(edge.source_handle, format!("{}__source", node_id("b")));
    assert_eq!(edge.target_handle, format!("{}__target", node_id("a")));
}

#[test]
fn table_lineage_respects_depth_bound() {
    let store = demo_store();
    let graph = table_lineage(&store, "b", false, 1);
    assert_eq!(node_names(&graph), ["b", "a"]);
    assert_eq!(graph.edges.len(), 1);
}

#[test]
fn table_lineage_downstream() {
    let store = demo_store();
    let graph = table_lineage(&store, "a0", true, -1);

    assert_eq!(node_names(&graph), ["a0", "a", "b"]);
    // Edges point from the consumer toward the walked-from model.
    assert_eq!(graph.edges[0].source, node_id("a"));
    assert_eq!(graph.edges[0].target, node_id("a0"));
}

#[test]
fn cte_decomposition_builds_the_internal_graph() {
    let store = demo_store();
    let result = cte_dependency(
        &store,
        Dialect::Snowflake,
        "cte_model",
        &["X".to_string()],
    )
    .unwrap();

    assert_eq!(result.table_name, "cte_model");
    assert_eq!(result.materialized.as_deref(), Some("table"));
    assert!(result.query.contains("WITH w AS"));
    assert!(result.columns.contains_key("x"));

    let cte_ids: Vec<_> = result
        .nodes
        .iter()
        .filter_map(|n| match n {
            CteGraphNode::Cte(cte) => Some(cte.id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(cte_ids, ["w", "final"]);

    let table_ids: Vec<_> = result
        .nodes
        .iter()
        .filter_map(|n| match n {
            CteGraphNode::Table(table) => Some(table.id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(table_ids, ["a"]);

    let edge_pairs: Vec<_> = result
        .edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();
    assert_eq!(edge_pairs, [("a", "w"), ("w", "final")]);
    assert!(result.edges.iter().all(|e| e.marker_start.width == 16));

    // Every edge points from a referenced table/CTE into the enclosing CTE.
    for edge in &result.edges {
        assert!(cte_ids.contains(&edge.target.as_str()));
    }

    // Lineage meta landed on the CTE nodes it references.
    let references: Vec<_> = result
        .entire_meta
        .iter()
        .map(|m| m.reference.as_str())
        .collect();
    assert!(references.contains(&"w"));
    assert!(references.contains(&"final"));
}

#[test]
fn cte_decomposition_without_columns_skips_meta() {
    let store = demo_store();
    let result = cte_dependency(&store, Dialect::Snowflake, "cte_model", &[]).unwrap();
    assert!(result.entire_meta.is_empty());
    assert_eq!(result.edges.len(), 2);
}

#[test]
fn cte_decomposition_of_seed_is_not_found() {
    let store = demo_store();
    let err = cte_dependency(&store, Dialect::Snowflake, "seed1", &[]).unwrap_err();
    assert!(matches!(err, dbt_column_lineage::Error::NotFound(_)));

    let err = cte_dependency(&store, Dialect::Snowflake, "missing", &[]).unwrap_err();
    assert!(matches!(err, dbt_column_lineage::Error::NotFound(_)));
}
