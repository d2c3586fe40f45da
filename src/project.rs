//! dbt project directory resolution.
//!
//! Resolution order: the `DBT_PROJECT_DIR` environment variable, the
//! current working directory (when it holds a `dbt_project.yml`), then
//! a handful of conventional locations under the user's home directory
//! and system paths.

use crate::constants::{PROJECT_DIR_ENV, PROJECT_FILE};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

const HOME_LOCATIONS: &[&str] = &["dbt_projects", "projects/dbt", ".dbt"];
const SYSTEM_LOCATIONS: &[&str] = &["/etc/dbt", "/var/lib/dbt", "/opt/dbt"];

/// Resolve the dbt project directory.
pub fn resolve_project_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }

    if let Ok(dir) = std::env::var(PROJECT_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    if let Some(found) = find_project_dir() {
        return Ok(found);
    }

    Err(Error::config(format!(
        "dbt project directory not found; set {} or run from a directory containing {}",
        PROJECT_DIR_ENV, PROJECT_FILE
    )))
}

fn find_project_dir() -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if cwd.join(PROJECT_FILE).exists() {
            return Some(cwd);
        }
    }

    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        for location in HOME_LOCATIONS {
            let candidate = home.join(location);
            if candidate.join(PROJECT_FILE).exists() {
                return Some(candidate);
            }
        }
    }

    for location in SYSTEM_LOCATIONS {
        let candidate = PathBuf::from(location);
        if candidate.join(PROJECT_FILE).exists() {
            return Some(candidate);
        }
    }

    None
}
