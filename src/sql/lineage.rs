//! Column-lineage walk over the `sqlparser` AST.
//!
//! The walk starts at a target column of the outermost projection and
//! follows referenced columns down through CTEs and derived tables
//! until it bottoms out at real table references. The resulting tree
//! is then flattened into the [`ColumnTrace`] contract: tables at the
//! leaves become labels, every intermediate expression contributes its
//! referenced column identifiers, and each intermediate node can be
//! reported as CTE metadata.

use super::{ColumnTrace, CteMetaEntry, NextSource, SchemaMap};
use crate::constants::MAX_TRAVERSAL_DEPTH;
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, ObjectName, ObjectNamePart, Query,
    Select, SelectItem, SelectItemQualifiedWildcardKind, SetExpr, TableFactor, TableWithJoins,
};

/// One node of the walked lineage tree.
#[derive(Debug)]
struct WalkNode {
    /// Column name carried by this node.
    name: String,
    /// Enclosing CTE alias; empty for the outermost select.
    reference: String,
    kind: WalkKind,
    downstream: Vec<WalkNode>,
}

#[derive(Debug)]
enum WalkKind {
    /// Intermediate select expression and the columns it references.
    Expr { columns: Vec<String> },
    /// Terminal table reference; `table` is the upper-case bare name.
    Table { schema: String, table: String },
}

/// A CTE visible at some point of the resolution. `visible` is the
/// number of earlier definitions its own body may reference.
#[derive(Clone)]
struct CteDef<'a> {
    name: String,
    query: &'a Query,
    visible: usize,
}

/// A relation appearing in a FROM/JOIN clause.
struct Relation<'a> {
    alias: Option<String>,
    name: Option<String>,
    kind: RelKind<'a>,
}

enum RelKind<'a> {
    Cte { query: &'a Query, visible: usize },
    Table { parts: Vec<String> },
    Derived(&'a Query),
}

/// Entry point: walk `target` through `query` and flatten the tree.
pub(super) fn trace(
    query: &Query,
    target: &str,
    schema: &SchemaMap,
    want_meta: bool,
) -> Option<ColumnTrace> {
    let resolver = Resolver { schema };
    let mut stack: Vec<(usize, String)> = Vec::new();
    let node = resolver.resolve_query(query, "", target, &[], &mut stack, 0)?;

    let mut trace = ColumnTrace::default();
    flatten(&node, &mut trace, want_meta);
    Some(trace)
}

fn flatten(node: &WalkNode, trace: &mut ColumnTrace, want_meta: bool) {
    match &node.kind {
        WalkKind::Table { table, .. } => {
            if node.downstream.is_empty() {
                trace.labels.insert(table.clone());
            }
        }
        WalkKind::Expr { columns } => {
            if node.name != "*" {
                trace.columns.extend(columns.iter().cloned());
                if want_meta {
                    let next_columns = node
                        .downstream
                        .iter()
                        .filter(|d| matches!(d.kind, WalkKind::Expr { .. }))
                        .map(|d| d.name.clone())
                        .collect();
                    let next_sources = node
                        .downstream
                        .iter()
                        .filter_map(|d| match &d.kind {
                            WalkKind::Table { schema, table } => Some(NextSource {
                                schema: schema.clone(),
                                table: table.clone(),
                            }),
                            _ => None,
                        })
                        .collect();
                    trace.meta.push(CteMetaEntry {
                        column: node.name.clone(),
                        next_columns,
                        next_sources,
                        reference: node.reference.clone(),
                    });
                }
            }
        }
    }
    for child in &node.downstream {
        flatten(child, trace, want_meta);
    }
}

struct Resolver<'a> {
    schema: &'a SchemaMap,
}

impl<'a> Resolver<'a> {
    fn resolve_query(
        &self,
        query: &'a Query,
        scope: &str,
        target: &str,
        env: &[CteDef<'a>],
        stack: &mut Vec<(usize, String)>,
        depth: usize,
    ) -> Option<WalkNode> {
        if depth > MAX_TRAVERSAL_DEPTH {
            return None;
        }
        // Re-entering the same query for the same column on one path is
        // a cycle; sibling visits pop their frame first and are fine.
        let frame = (query as *const Query as usize, target.to_lowercase());
        if stack.contains(&frame) {
            return None;
        }
        stack.push(frame);

        let mut env: Vec<CteDef<'a>> = env.to_vec();
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                env.push(CteDef {
                    name: cte.alias.name.value.clone(),
                    query: &cte.query,
                    visible: env.len(),
                });
            }
        }

        let node = self.resolve_set_expr(&query.body, scope, target, &env, stack, depth);
        stack.pop();
        node
    }

    fn resolve_set_expr(
        &self,
        body: &'a SetExpr,
        scope: &str,
        target: &str,
        env: &[CteDef<'a>],
        stack: &mut Vec<(usize, String)>,
        depth: usize,
    ) -> Option<WalkNode> {
        match body {
            SetExpr::Select(select) => self.resolve_select(select, scope, target, env, stack, depth),
            SetExpr::Query(query) => self.resolve_query(query, scope, target, env, stack, depth),
            SetExpr::SetOperation { left, right, .. } => {
                let left = self.resolve_set_expr(left, scope, target, env, stack, depth);
                let right = self.resolve_set_expr(right, scope, target, env, stack, depth);
                match (left, right) {
                    (Some(mut left), Some(right)) => {
                        // Both arms contribute to the same output column.
                        left.downstream.push(right);
                        Some(left)
                    }
                    (Some(left), None) => Some(left),
                    (None, right) => right,
                }
            }
            _ => None,
        }
    }

    fn resolve_select(
        &self,
        select: &'a Select,
        scope: &str,
        target: &str,
        env: &[CteDef<'a>],
        stack: &mut Vec<(usize, String)>,
        depth: usize,
    ) -> Option<WalkNode> {
        let relations = collect_relations(&select.from, env);

        // Exact projection match wins over wildcard pass-through.
        for item in &select.projection {
            let matched = match item {
                SelectItem::ExprWithAlias { expr, alias }
                    if alias.value.eq_ignore_ascii_case(target) =>
                {
                    Some(expr)
                }
                SelectItem::UnnamedExpr(expr)
                    if output_name(expr).is_some_and(|n| n.eq_ignore_ascii_case(target)) =>
                {
                    Some(expr)
                }
                _ => None,
            };
            let Some(expr) = matched else { continue };

            let mut refs = Vec::new();
            collect_column_refs(expr, &mut refs);
            let columns: Vec<String> = dedup(refs.iter().map(|(_, c)| c.clone()));

            let mut downstream = Vec::new();
            for (qualifier, column) in &refs {
                if let Some(relation) = pick_relation(&relations, qualifier.as_deref(), column, self, env, depth)
                {
                    if let Some(child) =
                        self.descend(relation, column, env, stack, depth)
                    {
                        downstream.push(child);
                    }
                }
            }

            return Some(WalkNode {
                name: target.to_string(),
                reference: scope.to_string(),
                kind: WalkKind::Expr { columns },
                downstream,
            });
        }

        // Wildcard pass-through: the target column flows unchanged from
        // whichever relation declares it.
        for item in &select.projection {
            let candidates: Vec<&Relation<'a>> = match item {
                SelectItem::Wildcard(_) => relations
                    .iter()
                    .filter(|r| self.relation_declares(r, target, env, depth))
                    .collect(),
                SelectItem::QualifiedWildcard(
                    SelectItemQualifiedWildcardKind::ObjectName(name),
                    _,
                ) => {
                    let qualifier = object_name_parts(name).join(".");
                    relations
                        .iter()
                        .filter(|r| relation_answers_to(r, &qualifier))
                        .collect()
                }
                _ => continue,
            };

            // A lone relation is trusted even without declared columns.
            let candidates = if candidates.is_empty() && relations.len() == 1 {
                relations.iter().collect()
            } else {
                candidates
            };
            if candidates.is_empty() {
                continue;
            }

            let mut downstream = Vec::new();
            for relation in candidates {
                if let Some(child) = self.descend(relation, target, env, stack, depth) {
                    downstream.push(child);
                }
            }
            return Some(WalkNode {
                name: target.to_string(),
                reference: scope.to_string(),
                kind: WalkKind::Expr {
                    columns: vec![target.to_string()],
                },
                downstream,
            });
        }

        None
    }

    /// Step from a column reference into the relation providing it.
    fn descend(
        &self,
        relation: &Relation<'a>,
        column: &str,
        env: &[CteDef<'a>],
        stack: &mut Vec<(usize, String)>,
        depth: usize,
    ) -> Option<WalkNode> {
        match &relation.kind {
            RelKind::Table { parts } => {
                let (schema, table) = self.table_identity(parts);
                Some(WalkNode {
                    name: column.to_string(),
                    reference: String::new(),
                    kind: WalkKind::Table { schema, table },
                    downstream: Vec::new(),
                })
            }
            RelKind::Cte { query, visible } => {
                self.resolve_query(query, relation.name.as_deref().unwrap_or(""), column, &env[..*visible], stack, depth + 1)
            }
            RelKind::Derived(query) => self.resolve_query(
                query,
                relation.alias.as_deref().unwrap_or(""),
                column,
                env,
                stack,
                depth + 1,
            ),
        }
    }

    /// Upper-case (schema, table) for a table reference, preferring the
    /// registered schema entry over the literal SQL parts.
    fn table_identity(&self, parts: &[String]) -> (String, String) {
        if let Some(known) = self.schema.resolve_table(parts) {
            return (known.schema.clone(), known.name.clone());
        }
        let table = parts
            .last()
            .map(|p| p.to_uppercase())
            .unwrap_or_default();
        let schema = if parts.len() >= 2 {
            parts[parts.len() - 2].to_uppercase()
        } else {
            String::new()
        };
        (schema, table)
    }

    /// Whether a relation can provide `column`.
    fn relation_declares(
        &self,
        relation: &Relation<'a>,
        column: &str,
        env: &[CteDef<'a>],
        depth: usize,
    ) -> bool {
        if depth > MAX_TRAVERSAL_DEPTH {
            return false;
        }
        match &relation.kind {
            RelKind::Table { parts } => self
                .schema
                .resolve_table(parts)
                .is_some_and(|t| t.columns.contains_key(&column.to_uppercase())),
            RelKind::Cte { query, visible } => {
                self.query_declares(query, column, &env[..*visible], depth + 1)
            }
            RelKind::Derived(query) => self.query_declares(query, column, env, depth + 1),
        }
    }

    fn query_declares(
        &self,
        query: &'a Query,
        column: &str,
        env: &[CteDef<'a>],
        depth: usize,
    ) -> bool {
        let mut env: Vec<CteDef<'a>> = env.to_vec();
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                env.push(CteDef {
                    name: cte.alias.name.value.clone(),
                    query: &cte.query,
                    visible: env.len(),
                });
            }
        }
        self.set_expr_declares(&query.body, column, &env, depth)
    }

    fn set_expr_declares(
        &self,
        body: &'a SetExpr,
        column: &str,
        env: &[CteDef<'a>],
        depth: usize,
    ) -> bool {
        if depth > MAX_TRAVERSAL_DEPTH {
            return false;
        }
        match body {
            SetExpr::Select(select) => {
                let relations = collect_relations(&select.from, env);
                select.projection.iter().any(|item| match item {
                    SelectItem::ExprWithAlias { alias, .. } => {
                        alias.value.eq_ignore_ascii_case(column)
                    }
                    SelectItem::UnnamedExpr(expr) => {
                        output_name(expr).is_some_and(|n| n.eq_ignore_ascii_case(column))
                    }
                    SelectItem::Wildcard(_) => relations.len() == 1
                        || relations
                            .iter()
                            .any(|r| self.relation_declares(r, column, env, depth + 1)),
                    SelectItem::QualifiedWildcard(..) => true,
                })
            }
            SetExpr::Query(query) => self.query_declares(query, column, env, depth + 1),
            SetExpr::SetOperation { left, .. } => self.set_expr_declares(left, column, env, depth + 1),
            _ => false,
        }
    }
}

/// Choose the relation a column reference resolves against.
fn pick_relation<'r, 'a>(
    relations: &'r [Relation<'a>],
    qualifier: Option<&str>,
    column: &str,
    resolver: &Resolver<'_>,
    env: &[CteDef<'a>],
    depth: usize,
) -> Option<&'r Relation<'a>> {
    if let Some(qualifier) = qualifier {
        return relations.iter().find(|r| relation_answers_to(r, qualifier));
    }
    if relations.len() == 1 {
        return relations.first();
    }
    relations
        .iter()
        .find(|r| resolver.relation_declares(r, column, env, depth))
}

fn relation_answers_to(relation: &Relation<'_>, qualifier: &str) -> bool {
    relation
        .alias
        .as_deref()
        .is_some_and(|a| a.eq_ignore_ascii_case(qualifier))
        || relation
            .name
            .as_deref()
            .is_some_and(|n| n.eq_ignore_ascii_case(qualifier))
}

fn collect_relations<'a>(from: &'a [TableWithJoins], env: &[CteDef<'a>]) -> Vec<Relation<'a>> {
    let mut relations = Vec::new();
    for table_with_joins in from {
        push_relation(&table_with_joins.relation, env, &mut relations);
        for join in &table_with_joins.joins {
            push_relation(&join.relation, env, &mut relations);
        }
    }
    relations
}

fn push_relation<'a>(factor: &'a TableFactor, env: &[CteDef<'a>], out: &mut Vec<Relation<'a>>) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let parts = object_name_parts(name);
            let bare = parts.last().cloned();
            let alias = alias.as_ref().map(|a| a.name.value.clone());
            // A bare single-part name may be a CTE declared earlier.
            if parts.len() == 1 {
                if let Some(def) = env
                    .iter()
                    .rev()
                    .find(|def| def.name.eq_ignore_ascii_case(&parts[0]))
                {
                    out.push(Relation {
                        alias,
                        name: Some(def.name.clone()),
                        kind: RelKind::Cte {
                            query: def.query,
                            visible: def.visible,
                        },
                    });
                    return;
                }
            }
            out.push(Relation {
                alias,
                name: bare,
                kind: RelKind::Table { parts },
            });
        }
        TableFactor::Derived { subquery, alias, .. } => {
            out.push(Relation {
                alias: alias.as_ref().map(|a| a.name.value.clone()),
                name: alias.as_ref().map(|a| a.name.value.clone()),
                kind: RelKind::Derived(subquery),
            });
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            push_relation(&table_with_joins.relation, env, out);
            for join in &table_with_joins.joins {
                push_relation(&join.relation, env, out);
            }
        }
        _ => {}
    }
}

/// Output column name of an unaliased projection expression.
fn output_name(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Identifier(ident) => Some(&ident.value),
        Expr::CompoundIdentifier(idents) => idents.last().map(|i| i.value.as_str()),
        _ => None,
    }
}

pub(super) fn object_name_parts(name: &ObjectName) -> Vec<String> {
    name.0
        .iter()
        .map(|part| match part {
            ObjectNamePart::Identifier(ident) => ident.value.clone(),
            other => other.to_string(),
        })
        .collect()
}

fn dedup<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

/// Collect `(qualifier, column)` references inside an expression, in
/// the order written.
fn collect_column_refs(expr: &Expr, out: &mut Vec<(Option<String>, String)>) {
    match expr {
        Expr::Identifier(ident) => out.push((None, ident.value.clone())),
        Expr::CompoundIdentifier(idents) => {
            if let Some((column, qualifier)) = idents.split_last() {
                let qualifier = qualifier
                    .iter()
                    .map(|i| i.value.clone())
                    .collect::<Vec<_>>()
                    .join(".");
                let qualifier = (!qualifier.is_empty()).then_some(qualifier);
                out.push((qualifier, column.value.clone()));
            }
        }
        Expr::Function(function) => match &function.args {
            FunctionArguments::List(list) => {
                for arg in &list.args {
                    match arg {
                        FunctionArg::Unnamed(arg)
                        | FunctionArg::Named { arg, .. }
                        | FunctionArg::ExprNamed { arg, .. } => match arg {
                            FunctionArgExpr::Expr(expr) => collect_column_refs(expr, out),
                            FunctionArgExpr::QualifiedWildcard(name) => {
                                out.push((Some(object_name_parts(name).join(".")), "*".to_string()))
                            }
                            FunctionArgExpr::Wildcard => {}
                        },
                    }
                }
            }
            FunctionArguments::Subquery(query) => collect_query_refs(query, out),
            FunctionArguments::None => {}
        },
        Expr::BinaryOp { left, right, .. } => {
            collect_column_refs(left, out);
            collect_column_refs(right, out);
        }
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::Cast { expr, .. } => collect_column_refs(expr, out),
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                collect_column_refs(operand, out);
            }
            for case_when in conditions {
                collect_column_refs(&case_when.condition, out);
                collect_column_refs(&case_when.result, out);
            }
            if let Some(else_result) = else_result {
                collect_column_refs(else_result, out);
            }
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            collect_column_refs(expr, out);
            collect_column_refs(low, out);
            collect_column_refs(high, out);
        }
        Expr::InList { expr, list, .. } => {
            collect_column_refs(expr, out);
            for item in list {
                collect_column_refs(item, out);
            }
        }
        Expr::InSubquery { expr, .. } => collect_column_refs(expr, out),
        Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
            collect_column_refs(expr, out);
            collect_column_refs(pattern, out);
        }
        Expr::Tuple(items) => {
            for item in items {
                collect_column_refs(item, out);
            }
        }
        Expr::Subquery(query) => collect_query_refs(query, out),
        _ => {}
    }
}

/// Shallow reference collection from a subquery's projection and
/// filter, enough to surface the columns a correlated subquery pulls.
fn collect_query_refs(query: &Query, out: &mut Vec<(Option<String>, String)>) {
    if let SetExpr::Select(select) = query.body.as_ref() {
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    collect_column_refs(expr, out)
                }
                _ => {}
            }
        }
        if let Some(selection) = &select.selection {
            collect_column_refs(selection, out);
        }
    }
}
