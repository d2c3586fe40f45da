//! Schema/model/column listings for the selection UI.

use crate::artifacts::ArtifactStore;
use itertools::Itertools;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceGroup {
    pub label: String,
    pub options: Vec<SelectOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnOption {
    pub value: String,
    pub label: String,
    pub description: String,
}

/// Schemas containing at least one model of the current project with
/// declared columns, sorted.
pub fn list_schemas(store: &ArtifactStore) -> Vec<SelectOption> {
    store
        .manifest
        .nodes
        .values()
        .filter(|node| {
            node.is_model()
                && !node.columns.is_empty()
                && node.package_name == store.project_name()
        })
        .map(|node| node.schema.clone())
        .unique()
        .sorted()
        .map(|schema| SelectOption {
            value: schema.clone(),
            label: schema,
        })
        .collect()
}

/// Models of one schema, grouped by the folder segment of their fqn
/// (`fqn[2..len-1]` joined by `/`); groups and options both sorted.
pub fn list_sources(store: &ArtifactStore, schema: &str) -> Vec<SourceGroup> {
    let grouped = store
        .manifest
        .nodes
        .values()
        .filter(|node| node.is_model() && node.schema == schema)
        .map(|node| (fqn_segment(&node.fqn), node.alias.clone()))
        .into_group_map();

    grouped
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(label, aliases)| SourceGroup {
            label,
            options: aliases
                .into_iter()
                .sorted()
                .map(|alias| SelectOption {
                    value: alias.clone(),
                    label: alias,
                })
                .collect(),
        })
        .collect()
}

/// Columns of one model, identified by alias and optionally pinned to
/// a schema. Without a schema the whole manifest is scanned and the
/// first match (in `unique_id` order) wins.
pub fn list_columns(
    store: &ArtifactStore,
    schema: Option<&str>,
    source: &str,
) -> Vec<ColumnOption> {
    let mut matches = store.manifest.nodes.values().filter(|node| {
        node.alias == source && schema.is_none_or(|s| node.schema == s)
    });

    let Some(node) = matches.next() else {
        return Vec::new();
    };
    if schema.is_none() && matches.next().is_some() {
        warn!(source, "alias exists in multiple schemas; returning first match");
    }

    node.columns
        .iter()
        .map(|(key, column)| ColumnOption {
            value: key.clone(),
            label: column.name.clone(),
            description: column.description.clone(),
        })
        .collect()
}

/// The `xxx/yyy` part of `['proj', 'folder', 'xxx', 'yyy', 'model']`.
fn fqn_segment(fqn: &[String]) -> String {
    if fqn.len() > 3 {
        fqn[2..fqn.len() - 1].join("/")
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactStore, Catalog, Manifest};
    use serde_json::json;

    fn store() -> ArtifactStore {
        let manifest: Manifest = serde_json::from_value(json!({
            "metadata": {"project_name": "proj"},
            "nodes": {
                "model.proj.orders": {
                    "name": "orders", "alias": "orders", "schema": "marts",
                    "database": "db", "resource_type": "model", "package_name": "proj",
                    "fqn": ["proj", "marts", "core", "sales", "orders"],
                    "columns": {"id": {"name": "id", "description": "pk"}}
                },
                "model.proj.customers": {
                    "name": "customers", "alias": "customers", "schema": "marts",
                    "database": "db", "resource_type": "model", "package_name": "proj",
                    "fqn": ["proj", "marts", "core", "sales", "customers"],
                    "columns": {"id": {"name": "id"}}
                },
                "model.proj.stg_orders": {
                    "name": "stg_orders", "alias": "stg_orders", "schema": "staging",
                    "database": "db", "resource_type": "model", "package_name": "proj",
                    "fqn": ["proj", "staging", "stg", "stg_orders"],
                    "columns": {"id": {"name": "id"}}
                },
                "model.other_pkg.ext": {
                    "name": "ext", "alias": "ext", "schema": "vendor",
                    "database": "db", "resource_type": "model", "package_name": "other_pkg",
                    "columns": {"id": {"name": "id"}}
                }
            },
            "sources": {}, "child_map": {}, "parent_map": {}
        }))
        .unwrap();
        ArtifactStore::from_parts(manifest, Catalog::default())
    }

    #[test]
    fn test_list_schemas_filters_and_sorts() {
        let schemas = list_schemas(&store());
        let values: Vec<_> = schemas.iter().map(|s| s.value.as_str()).collect();
        // other_pkg's schema is excluded; result is sorted.
        assert_eq!(values, ["marts", "staging"]);
    }

    #[test]
    fn test_list_sources_groups_by_fqn_segment() {
        let groups = list_sources(&store(), "marts");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].label, "core/sales");
        let aliases: Vec<_> = groups[0].options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(aliases, ["customers", "orders"]);
    }

    #[test]
    fn test_list_columns_two_argument_form() {
        let columns = list_columns(&store(), Some("marts"), "orders");
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].value, "id");
        assert_eq!(columns[0].description, "pk");
    }

    #[test]
    fn test_list_columns_scans_all_schemas_without_one() {
        let columns = list_columns(&store(), None, "stg_orders");
        assert_eq!(columns.len(), 1);
        assert!(list_columns(&store(), None, "nope").is_empty());
    }
}
