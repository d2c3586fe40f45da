//! SQL lineage adapter.
//!
//! Thin contract over the `sqlparser` crate: given compiled SQL, a
//! dialect, target columns and a schema mapping (table → column →
//! type), produce the walked lineage per column — the terminal table
//! labels, the column identifiers referenced along the way, and
//! (optionally) per-CTE metadata describing each intermediate node.
//!
//! Parse or resolution failures are per-column and non-fatal: the
//! affected column simply yields no result and the caller continues.

mod cte;
mod lineage;

pub use cte::{decompose, CteSummary, CteTable};

use crate::constants::DEFAULT_COLUMN_TYPE;
use serde::Serialize;
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    BigQueryDialect, GenericDialect, PostgreSqlDialect, SnowflakeDialect,
};
use sqlparser::parser::{Parser, ParserError};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::error;

/// SQL dialect the compiled artifacts were rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Snowflake,
    BigQuery,
    Postgres,
    Generic,
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snowflake" => Ok(Dialect::Snowflake),
            "bigquery" => Ok(Dialect::BigQuery),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "generic" => Ok(Dialect::Generic),
            other => Err(format!("unsupported dialect: {other}")),
        }
    }
}

impl Dialect {
    pub fn parse(&self, sql: &str) -> Result<Vec<Statement>, ParserError> {
        match self {
            Dialect::Snowflake => Parser::parse_sql(&SnowflakeDialect {}, sql),
            Dialect::BigQuery => Parser::parse_sql(&BigQueryDialect {}, sql),
            Dialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql),
            Dialect::Generic => Parser::parse_sql(&GenericDialect {}, sql),
        }
    }
}

/// Schema handed to the lineage walk: one entry per upstream table,
/// keyed both by the fully-qualified upper-case reference and by the
/// bare table name.
#[derive(Debug, Clone, Default)]
pub struct SchemaMap {
    tables: Vec<TableSchema>,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    /// `<DATABASE>.<SCHEMA>.<NAME>`, upper-cased.
    pub table_ref: String,
    /// Bare table name, upper-cased.
    pub name: String,
    pub schema: String,
    /// Column name (upper-cased) to type.
    pub columns: BTreeMap<String, String>,
}

impl SchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Types missing from the artifacts default to
    /// `STRING`.
    pub fn add_table<'a, I>(&mut self, table_ref: &str, schema: &str, name: &str, columns: I)
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let columns = columns
            .into_iter()
            .map(|(column, column_type)| {
                (
                    column.to_uppercase(),
                    column_type.unwrap_or(DEFAULT_COLUMN_TYPE).to_string(),
                )
            })
            .collect();
        self.tables.push(TableSchema {
            table_ref: table_ref.to_uppercase(),
            name: name.to_uppercase(),
            schema: schema.to_uppercase(),
            columns,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Match a (possibly partially) qualified table reference from the
    /// SQL against the registered tables: full reference first, bare
    /// name second. Comparison is case-insensitive.
    pub(crate) fn resolve_table(&self, parts: &[String]) -> Option<&TableSchema> {
        let joined = parts
            .iter()
            .map(|p| p.to_uppercase())
            .collect::<Vec<_>>()
            .join(".");
        self.tables
            .iter()
            .find(|t| t.table_ref == joined)
            .or_else(|| {
                let bare = parts.last()?.to_uppercase();
                self.tables.iter().find(|t| t.name == bare)
            })
    }
}

/// Lineage walk result for one target column.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnTrace {
    /// Upper-case bare names of tables that terminate the walk.
    pub labels: BTreeSet<String>,
    /// Column identifiers (as written) referenced by intermediate nodes.
    pub columns: BTreeSet<String>,
    /// Per-node CTE metadata; populated only when requested.
    pub meta: Vec<CteMetaEntry>,
}

/// Metadata for one intermediate lineage node, keyed to its enclosing
/// CTE via `reference`.
#[derive(Debug, Clone, Serialize)]
pub struct CteMetaEntry {
    pub column: String,
    #[serde(rename = "nextColumns")]
    pub next_columns: Vec<String>,
    #[serde(rename = "nextSources")]
    pub next_sources: Vec<NextSource>,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextSource {
    pub schema: String,
    pub table: String,
}

/// Compute column lineage for `target_columns` of `compiled_sql`.
///
/// Targets are upper-cased to form the result keys. A column that
/// cannot be resolved in the outermost projection is absent from the
/// result; an unparsable statement yields an empty map. Both paths log
/// at `ERROR` with the failing context and never abort the caller.
pub fn column_lineage(
    dialect: Dialect,
    source: &str,
    compiled_sql: &str,
    target_columns: &[String],
    schema: &SchemaMap,
    want_meta: bool,
) -> BTreeMap<String, ColumnTrace> {
    let statements = match dialect.parse(compiled_sql) {
        Ok(statements) => statements,
        Err(err) => {
            error!(source, %err, "failed to parse compiled sql");
            return BTreeMap::new();
        }
    };
    let Some(query) = statements.iter().find_map(|statement| match statement {
        Statement::Query(query) => Some(query.as_ref()),
        _ => None,
    }) else {
        error!(source, "compiled sql contains no query statement");
        return BTreeMap::new();
    };

    let mut results = BTreeMap::new();
    for column in target_columns {
        let column = column.to_uppercase();
        match lineage::trace(query, &column, schema, want_meta) {
            Some(trace) => {
                results.insert(column, trace);
            }
            None => {
                error!(source, column = %column, "no lineage found for column");
            }
        }
    }
    results
}
