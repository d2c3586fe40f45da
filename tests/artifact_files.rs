//! Artifact loading from a project directory on disk.

use anyhow::Result;
use dbt_column_lineage::artifacts::ArtifactStore;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn write_project(dir: &TempDir) -> Result<()> {
    let target = dir.path().join("target");
    fs::create_dir_all(&target)?;
    fs::write(
        target.join("manifest.json"),
        serde_json::to_string(&json!({
            "metadata": {"project_name": "proj"},
            "nodes": {
                "model.proj.orders": {
                    "unique_id": "model.proj.orders",
                    "name": "orders",
                    "alias": "orders",
                    "schema": "sch",
                    "database": "db",
                    "resource_type": "model",
                    "package_name": "proj",
                    "columns": {"id": {"name": "id"}}
                }
            },
            "sources": {},
            "child_map": {},
            "parent_map": {}
        }))?,
    )?;
    fs::write(
        target.join("catalog.json"),
        serde_json::to_string(&json!({
            "nodes": {
                "model.proj.orders": {
                    "columns": {"ID": {"name": "ID", "type": "NUMBER"}}
                }
            }
        }))?,
    )?;
    Ok(())
}

#[test]
fn load_reads_both_artifacts() -> Result<()> {
    let dir = TempDir::new()?;
    write_project(&dir)?;

    let store = ArtifactStore::load(dir.path())?;
    assert_eq!(store.project_name(), "proj");
    assert!(store.find_node("orders").is_some());
    assert_eq!(store.declared_columns("orders"), vec!["ID".to_string()]);
    Ok(())
}

#[test]
fn load_without_catalog_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let target = dir.path().join("target");
    fs::create_dir_all(&target)?;
    fs::write(target.join("manifest.json"), "{}")?;

    let err = ArtifactStore::load(dir.path()).unwrap_err();
    assert!(err.to_string().contains("catalog.json"));
    Ok(())
}

#[test]
fn load_rejects_malformed_json() -> Result<()> {
    let dir = TempDir::new()?;
    let target = dir.path().join("target");
    fs::create_dir_all(&target)?;
    fs::write(target.join("manifest.json"), "not json")?;
    fs::write(target.join("catalog.json"), "{}")?;

    assert!(ArtifactStore::load(dir.path()).is_err());
    Ok(())
}
