//! Shared in-memory artifact fixtures for the integration tests.
//!
//! The fixture project (`proj`, database `db`, schema `sch`) covers the
//! engine scenarios:
//!
//! ```text
//! c ──> leaf                 (single hop, leaf has no upstream)
//! b ──> a ──> a0             (chain; a0 has no compiled code)
//! seed1                      (seed, no compiled code)
//! bad                        (model with unparsable SQL)
//! cte_model ──> a            (WITH w AS (... a ...), final AS (... w ...))
//! ```

use dbt_column_lineage::artifacts::{ArtifactStore, Catalog, Manifest};
use serde_json::{Value, json};

fn model(name: &str, compiled: Option<&str>, depends_on: Vec<&str>) -> Value {
    json!({
        "unique_id": format!("model.proj.{name}"),
        "name": name,
        "alias": name,
        "schema": "sch",
        "database": "db",
        "resource_type": "model",
        "package_name": "proj",
        "fqn": ["proj", "sch", "core", name],
        "config": {"materialized": "table"},
        "compiled_code": compiled,
        "description": format!("{name} model"),
        "columns": {"x": {"name": "x", "description": "the traced column"}},
        "depends_on": {"nodes": depends_on}
    })
}

pub fn demo_store() -> ArtifactStore {
    let manifest: Manifest = serde_json::from_value(json!({
        "metadata": {"project_name": "proj"},
        "nodes": {
            "model.proj.c": model("c", Some("SELECT leaf.x AS x FROM db.sch.leaf"), vec!["model.proj.leaf"]),
            "model.proj.leaf": model("leaf", Some("SELECT 1 AS x"), vec![]),
            "model.proj.b": model("b", Some("SELECT a.x AS x FROM db.sch.a"), vec!["model.proj.a"]),
            "model.proj.a": model("a", Some("SELECT a0.x AS x FROM db.sch.a0"), vec!["model.proj.a0"]),
            "model.proj.a0": model("a0", None, vec![]),
            "model.proj.bad": model("bad", Some("SELECT FROM WHERE ((("), vec!["model.proj.a"]),
            "model.proj.cte_model": model(
                "cte_model",
                Some(
                    "WITH w AS (SELECT x FROM db.sch.a), final AS (SELECT x FROM w) \
                     SELECT * FROM final",
                ),
                vec!["model.proj.a"],
            ),
            "seed.proj.seed1": {
                "unique_id": "seed.proj.seed1",
                "name": "seed1",
                "alias": "seed1",
                "schema": "sch",
                "database": "db",
                "resource_type": "seed",
                "package_name": "proj",
                "columns": {"x": {"name": "x"}},
                "depends_on": {"nodes": []}
            }
        },
        "sources": {},
        "child_map": {
            "model.proj.a": ["model.proj.b"],
            "model.proj.a0": ["model.proj.a"],
            "model.proj.leaf": ["model.proj.c"]
        },
        "parent_map": {
            "model.proj.b": ["model.proj.a"],
            "model.proj.a": ["model.proj.a0"],
            "model.proj.c": ["model.proj.leaf"]
        }
    }))
    .expect("fixture manifest");

    let catalog: Catalog = serde_json::from_value(json!({
        "nodes": {
            "model.proj.a": {"columns": {"x": {"name": "x", "type": "NUMBER"}}},
            "model.proj.a0": {"columns": {"x": {"name": "x", "type": "NUMBER"}}},
            "model.proj.b": {"columns": {"x": {"name": "x", "type": "NUMBER"}}},
            "model.proj.c": {"columns": {"x": {"name": "x", "type": "NUMBER"}}},
            "model.proj.leaf": {"columns": {"x": {"name": "x", "type": "NUMBER"}}},
            "model.proj.cte_model": {"columns": {"x": {"name": "x", "type": "NUMBER"}}}
        }
    }))
    .expect("fixture catalog");

    ArtifactStore::from_parts(manifest, catalog)
}
