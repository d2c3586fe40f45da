//! Artifact store: the process-lifetime snapshot of a dbt project's
//! compiled build artifacts.
//!
//! Two files are loaded from `<project>/target/`: `manifest.json`
//! (model/source definitions and the parent/child adjacency) and
//! `catalog.json` (materialized columns and types). The snapshot is
//! immutable after construction and shared read-only across requests;
//! [`shared`] guards the once-per-process initialization.

use crate::constants::{CATALOG_FILENAME, MANIFEST_FILENAME, TARGET_SUBDIR};
use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Resource types probed, in order, when resolving a bare model name.
const RESOURCE_TYPES: &[&str] = &["model", "seed", "snapshot"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub metadata: ManifestMetadata,
    pub nodes: BTreeMap<String, ManifestNode>,
    pub sources: BTreeMap<String, SourceNode>,
    pub child_map: BTreeMap<String, Vec<String>>,
    pub parent_map: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManifestMetadata {
    pub project_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManifestNode {
    pub unique_id: String,
    pub name: String,
    pub alias: String,
    pub schema: String,
    pub database: String,
    pub resource_type: String,
    pub fqn: Vec<String>,
    pub package_name: String,
    pub config: NodeConfig,
    pub compiled_code: Option<String>,
    pub description: Option<String>,
    pub columns: BTreeMap<String, ColumnInfo>,
    pub depends_on: DependsOn,
}

impl ManifestNode {
    pub fn is_model(&self) -> bool {
        self.resource_type == "model"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub materialized: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ColumnInfo {
    pub name: String,
    pub description: String,
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DependsOn {
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceNode {
    pub unique_id: String,
    pub name: String,
    pub schema: String,
    pub database: String,
    pub columns: BTreeMap<String, ColumnInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub nodes: BTreeMap<String, CatalogEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogEntry {
    pub columns: BTreeMap<String, CatalogColumn>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogColumn {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
}

/// A dependency resolved to a warehouse table, as handed to the SQL
/// lineage adapter: the fully-qualified upper-case reference plus the
/// column/type map (catalog preferred over manifest).
#[derive(Debug, Clone)]
pub struct DependsOnTable {
    /// `<DATABASE>.<SCHEMA>.<NAME>`, upper-cased.
    pub table_ref: String,
    /// Bare table name, upper-cased.
    pub name: String,
    pub schema: String,
    pub database: String,
    /// Column name to declared type; `None` when the artifact carries no type.
    pub columns: BTreeMap<String, Option<String>>,
}

#[derive(Debug)]
pub struct ArtifactStore {
    pub manifest: Manifest,
    pub catalog: Catalog,
}

impl ArtifactStore {
    /// Load `target/manifest.json` and `target/catalog.json` from a
    /// project directory. Missing or unreadable files are fatal.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let target = project_dir.join(TARGET_SUBDIR);
        let manifest: Manifest = read_artifact(&target.join(MANIFEST_FILENAME))?;
        let catalog: Catalog = read_artifact(&target.join(CATALOG_FILENAME))?;
        Ok(Self { manifest, catalog })
    }

    /// Build a store from already-parsed artifacts.
    pub fn from_parts(manifest: Manifest, catalog: Catalog) -> Self {
        Self { manifest, catalog }
    }

    pub fn project_name(&self) -> &str {
        &self.manifest.metadata.project_name
    }

    /// Resolve a bare model name against the manifest, probing
    /// `model.<proj>.<name>`, then `seed.`, then `snapshot.`.
    pub fn find_node(&self, target: &str) -> Option<&ManifestNode> {
        RESOURCE_TYPES.iter().find_map(|resource_type| {
            let uid = format!("{}.{}.{}", resource_type, self.project_name(), target);
            self.manifest.nodes.get(&uid)
        })
    }

    /// Same probe order against the catalog.
    pub fn find_catalog(&self, target: &str) -> Option<&CatalogEntry> {
        RESOURCE_TYPES.iter().find_map(|resource_type| {
            let uid = format!("{}.{}.{}", resource_type, self.project_name(), target);
            self.catalog.nodes.get(&uid)
        })
    }

    pub fn parents(&self, uid: &str) -> &[String] {
        self.manifest
            .parent_map
            .get(uid)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn children(&self, uid: &str) -> &[String] {
        self.manifest
            .child_map
            .get(uid)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Declared column names for a model, catalog preferred over
    /// manifest. Empty when the model declares nothing anywhere.
    pub fn declared_columns(&self, target: &str) -> Vec<String> {
        if let Some(entry) = self.find_catalog(target) {
            if !entry.columns.is_empty() {
                return entry.columns.keys().cloned().collect();
            }
        }
        self.find_node(target)
            .map(|node| node.columns.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Resolve dependency uids into schema information for the SQL
    /// lineage adapter. Unknown uids are skipped.
    pub fn depends_on_tables(&self, uids: &[String]) -> Vec<DependsOnTable> {
        let mut tables = Vec::new();
        for uid in uids {
            let (name, schema, database, manifest_columns) =
                if let Some(node) = self.manifest.nodes.get(uid) {
                    (&node.name, &node.schema, &node.database, &node.columns)
                } else if let Some(source) = self.manifest.sources.get(uid) {
                    (&source.name, &source.schema, &source.database, &source.columns)
                } else {
                    debug!(uid = uid.as_str(), "dependency uid not found in manifest");
                    continue;
                };

            let columns = match self.find_catalog(name) {
                Some(entry) if !entry.columns.is_empty() => entry
                    .columns
                    .iter()
                    .map(|(key, col)| (key.clone(), col.column_type.clone()))
                    .collect(),
                _ => manifest_columns
                    .iter()
                    .map(|(key, col)| (key.clone(), col.data_type.clone()))
                    .collect(),
            };

            let database = database.to_uppercase();
            let schema = schema.to_uppercase();
            let name = name.to_uppercase();
            tables.push(DependsOnTable {
                table_ref: format!("{}.{}.{}", database, schema, name),
                name,
                schema,
                database,
                columns,
            });
        }
        tables
    }
}

fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::config_io(format!("cannot read {}", path.display()), e))?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::config(format!("cannot parse {}: {}", path.display(), e)))
}

static STORE: OnceCell<ArtifactStore> = OnceCell::new();

/// Process-wide artifact snapshot. The first caller loads the files;
/// concurrent first-time callers converge on a single snapshot and
/// every later call is a lock-free read.
pub fn shared(project_dir: &Path) -> Result<&'static ArtifactStore> {
    STORE.get_or_try_init(|| ArtifactStore::load(project_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> ArtifactStore {
        let manifest: Manifest = serde_json::from_value(json!({
            "metadata": {"project_name": "proj"},
            "nodes": {
                "model.proj.orders": {
                    "unique_id": "model.proj.orders",
                    "name": "orders",
                    "alias": "orders",
                    "schema": "sch",
                    "database": "db",
                    "resource_type": "model",
                    "columns": {"id": {"name": "id", "data_type": "NUMBER"}},
                    "depends_on": {"nodes": ["source.proj.raw.payments"]}
                },
                "seed.proj.country_codes": {
                    "unique_id": "seed.proj.country_codes",
                    "name": "country_codes",
                    "schema": "sch",
                    "database": "db",
                    "resource_type": "seed"
                }
            },
            "sources": {
                "source.proj.raw.payments": {
                    "unique_id": "source.proj.raw.payments",
                    "name": "payments",
                    "schema": "raw",
                    "database": "db",
                    "columns": {"amount": {"name": "amount"}}
                }
            },
            "child_map": {"model.proj.orders": ["model.proj.fct_orders"]},
            "parent_map": {"model.proj.orders": ["source.proj.raw.payments"]}
        }))
        .unwrap();
        let catalog: Catalog = serde_json::from_value(json!({
            "nodes": {
                "model.proj.orders": {
                    "columns": {"ID": {"name": "ID", "type": "NUMBER"}}
                }
            }
        }))
        .unwrap();
        ArtifactStore::from_parts(manifest, catalog)
    }

    #[test]
    fn test_find_node_probe_order() {
        let store = store();
        assert!(store.find_node("orders").is_some());
        assert_eq!(store.find_node("country_codes").unwrap().resource_type, "seed");
        assert!(store.find_node("missing").is_none());
    }

    #[test]
    fn test_declared_columns_prefers_catalog() {
        let store = store();
        assert_eq!(store.declared_columns("orders"), vec!["ID".to_string()]);
        // No catalog entry for the seed: empty, no manifest columns either.
        assert!(store.declared_columns("country_codes").is_empty());
    }

    #[test]
    fn test_depends_on_tables_resolves_sources() {
        let store = store();
        let tables = store.depends_on_tables(&["source.proj.raw.payments".to_string()]);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table_ref, "DB.RAW.PAYMENTS");
        assert_eq!(tables[0].name, "PAYMENTS");
        assert_eq!(tables[0].columns.get("amount"), Some(&None));
    }

    #[test]
    fn test_depends_on_tables_skips_unknown_uid() {
        let store = store();
        let tables = store.depends_on_tables(&["model.proj.gone".to_string()]);
        assert!(tables.is_empty());
    }

    #[test]
    fn test_parents_children() {
        let store = store();
        assert_eq!(store.children("model.proj.orders"), ["model.proj.fct_orders"]);
        assert_eq!(store.parents("model.proj.orders"), ["source.proj.raw.payments"]);
        assert!(store.parents("model.proj.unknown").is_empty());
    }

    #[test]
    fn test_load_missing_files_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Config { .. }));
    }
}
