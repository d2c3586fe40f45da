//! CTE decomposition of a compiled model.
//!
//! Enumerates the `WITH` clauses of a statement in declaration order
//! and, for each CTE, the tables its body references plus the SQL text
//! of its filter/grouping/join/set clauses. Table references include
//! other CTEs (single-part names), which is what lets the caller build
//! the CTE-to-CTE dependency edges.

use super::lineage::object_name_parts;
use super::Dialect;
use sqlparser::ast::{
    GroupByExpr, Query, SetExpr, SetOperator, Statement, TableFactor, TableWithJoins,
};
use sqlparser::parser::ParserError;

/// One CTE of the statement, with its referenced tables and clause texts.
#[derive(Debug, Clone, Default)]
pub struct CteSummary {
    pub name: String,
    pub tables: Vec<CteTable>,
    pub groups: Vec<String>,
    pub havings: Vec<String>,
    pub wheres: Vec<String>,
    pub unions: Vec<String>,
    pub joins: Vec<String>,
}

/// A table reference found inside a CTE body, identifiers as written.
#[derive(Debug, Clone)]
pub struct CteTable {
    pub name: String,
    pub db: String,
    pub catalog: String,
    /// True for fully-qualified (`catalog.db.name`) references, i.e.
    /// real warehouse tables rather than CTE names.
    pub qualified: bool,
}

/// Parse `sql` and summarize its top-level CTEs in declaration order.
pub fn decompose(dialect: Dialect, sql: &str) -> Result<Vec<CteSummary>, ParserError> {
    let statements = dialect.parse(sql)?;
    let Some(query) = statements.iter().find_map(|statement| match statement {
        Statement::Query(query) => Some(query.as_ref()),
        _ => None,
    }) else {
        return Ok(Vec::new());
    };

    let mut summaries = Vec::new();
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            let mut summary = CteSummary {
                name: cte.alias.name.value.clone(),
                ..Default::default()
            };
            scan_query(&cte.query, &mut summary);
            summaries.push(summary);
        }
    }
    Ok(summaries)
}

fn scan_query(query: &Query, summary: &mut CteSummary) {
    scan_set_expr(&query.body, summary);
}

fn scan_set_expr(body: &SetExpr, summary: &mut CteSummary) {
    match body {
        SetExpr::Select(select) => {
            for table_with_joins in &select.from {
                scan_from(table_with_joins, summary);
            }
            if let Some(selection) = &select.selection {
                summary.wheres.push(selection.to_string());
            }
            if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
                for expr in exprs {
                    summary.groups.push(expr.to_string());
                }
            }
            if let Some(having) = &select.having {
                summary.havings.push(having.to_string());
            }
        }
        SetExpr::Query(query) => scan_query(query, summary),
        SetExpr::SetOperation {
            op, left, right, ..
        } => {
            scan_set_expr(left, summary);
            if *op == SetOperator::Union {
                summary.unions.push(right.to_string());
            }
            scan_set_expr(right, summary);
        }
        _ => {}
    }
}

fn scan_from(table_with_joins: &TableWithJoins, summary: &mut CteSummary) {
    scan_factor(&table_with_joins.relation, summary);
    for join in &table_with_joins.joins {
        summary.joins.push(join.to_string().trim().to_string());
        scan_factor(&join.relation, summary);
    }
}

fn scan_factor(factor: &TableFactor, summary: &mut CteSummary) {
    match factor {
        TableFactor::Table { name, .. } => {
            let parts = object_name_parts(name);
            let len = parts.len();
            summary.tables.push(CteTable {
                name: parts.last().cloned().unwrap_or_default(),
                db: if len >= 2 { parts[len - 2].clone() } else { String::new() },
                catalog: if len >= 3 { parts[len - 3].clone() } else { String::new() },
                qualified: len >= 3,
            });
        }
        TableFactor::Derived { subquery, .. } => scan_query(subquery, summary),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => scan_from(table_with_joins, summary),
        _ => {}
    }
}
