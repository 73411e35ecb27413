//! Query planning.
//!
//! `analyse_context` works out what shape the query must take: which measures
//! are distinct, whether window functions force CTE staging, and which join
//! edges connect every touched table to the common table. `plan` then
//! assembles the SQL AST from the resolved query and the analysed context.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, SemaQueryError};
use crate::models::{SemanticModel, Sorting};
use crate::query::context::{QueryContext, QueryError, Stage};
use crate::query::resolved::{
    MeasureKey, MetricExpr, ResolvedOrderBy, ResolvedQuery,
};
use crate::sql_ast::{
    SelectItem, SqlExpr, SqlJoin, SqlOrderBy, SqlPredicate, SqlQuery, SqlSource, CTE_NAME,
};

/// Populate the planning half of the context. Returns caller-correctable
/// errors (an unreachable join path); defects in the pipeline itself surface
/// as `Err`.
pub fn analyse_context(
    resolved: &ResolvedQuery,
    ctx: &mut QueryContext,
    model: &SemanticModel,
) -> Result<Vec<QueryError>> {
    let mut errors = Vec::new();
    ctx.note("analysing planning context");

    // Deduplicate measures by structural identity; the first occurrence keeps
    // its name and becomes the select item everybody else shares.
    let mut seen: BTreeSet<MeasureKey> = BTreeSet::new();
    for measure in &resolved.measures {
        if seen.insert(measure.key()) {
            ctx.unique_measures.push(measure.clone());
        }
    }

    for measure in resolved.measures.iter().filter(|m| m.window.is_some()) {
        ctx.requires_cte = true;
        ctx.window_measures.push(measure.clone());
        let twin = ctx
            .unique_measures
            .iter()
            .find(|unique| unique.key() == measure.key())
            .ok_or_else(|| {
                SemaQueryError::Internal(format!(
                    "windowed measure '{}' has no base aggregation twin",
                    measure.name
                ))
            })?;
        ctx.window_measure_map
            .insert(measure.name.clone(), twin.name.clone());
        ctx.note(format!(
            "measure '{}' is windowed; staging its base aggregation as '{}'",
            measure.name, twin.name
        ));
    }

    if ctx.tables.len() < 2 {
        ctx.note("single-table query, no joins needed");
        return Ok(errors);
    }

    let common = ctx.common_table.clone().ok_or_else(|| {
        SemaQueryError::Internal("common table was not set before planning".to_string())
    })?;
    let graph = model.get_relationship_graph(true);

    for table in ctx.tables.clone() {
        if table == common {
            continue;
        }
        match find_join_path(&table, &common, &graph) {
            Some(path) => {
                // Reversed, so each edge joins a new table onto tables that
                // are already in scope, starting next to the common table.
                for edge in path.into_iter().rev() {
                    if !ctx.joins.contains(&edge) {
                        ctx.note(format!("join edge '{}' -> '{}'", edge.0, edge.1));
                        ctx.joins.push(edge);
                    }
                }
            }
            None => {
                errors.push(
                    QueryError::new(
                        Stage::JoinPathValidation,
                        "no_join_path",
                        format!("no join path from table '{table}' to common table '{common}'"),
                    )
                    .with_hint("declare a relationship chain connecting the two tables"),
                );
            }
        }
    }

    Ok(errors)
}

/// Depth-first search over the directed relationship graph. Returns the first
/// path found, not the shortest; changing this would change generated SQL for
/// ambiguous graphs.
fn find_join_path(
    start: &str,
    target: &str,
    graph: &BTreeMap<String, Vec<String>>,
) -> Option<Vec<(String, String)>> {
    fn walk(
        node: &str,
        target: &str,
        graph: &BTreeMap<String, Vec<String>>,
        visited: &mut BTreeSet<String>,
        path: &mut Vec<(String, String)>,
    ) -> bool {
        if node == target {
            return true;
        }
        visited.insert(node.to_string());
        if let Some(neighbours) = graph.get(node) {
            for next in neighbours {
                if visited.contains(next) {
                    continue;
                }
                path.push((node.to_string(), next.clone()));
                if walk(next, target, graph, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    let mut visited = BTreeSet::new();
    let mut path = Vec::new();
    if walk(start, target, graph, &mut visited, &mut path) {
        Some(path)
    } else {
        None
    }
}

/// Assemble the SQL AST. A flat query unless the context demands CTE staging,
/// in which case the aggregate query is nested and window expressions read
/// its aliases from the outer level.
pub fn plan(
    resolved: &ResolvedQuery,
    ctx: &mut QueryContext,
    model: &SemanticModel,
) -> Result<SqlQuery> {
    let common = ctx.common_table.clone().ok_or_else(|| {
        SemaQueryError::Internal("common table was not set before planning".to_string())
    })?;

    let mut inner = SqlQuery::from_table(common.clone());

    for dim in &resolved.dimensions {
        inner.select.push(SelectItem {
            alias: dim.column.clone(),
            expr: SqlExpr::Column {
                table: Some(dim.table.clone()),
                name: dim.column.clone(),
            },
        });
    }
    for dim in &resolved.time_grained_dimensions {
        inner.select.push(SelectItem {
            alias: dim.column.clone(),
            expr: SqlExpr::TimeGrainColumn {
                grain: dim.time_grain,
                table: dim.table.clone(),
                name: dim.column.clone(),
            },
        });
    }
    for measure in &ctx.unique_measures {
        inner.select.push(SelectItem {
            alias: measure.name.clone(),
            expr: metric_to_sql(&measure.expr),
        });
    }

    for (incoming, outgoing) in &ctx.joins {
        let relationship = model
            .relationships()
            .iter()
            .find(|r| r.incoming == *incoming && r.outgoing == *outgoing)
            .ok_or_else(|| {
                SemaQueryError::Internal(format!(
                    "no relationship found for join edge '{incoming}' -> '{outgoing}'"
                ))
            })?;
        // LEFT keeps every row of the many side even without a match, so
        // partial reference data does not drop groups.
        inner.joins.push(SqlJoin {
            left_table: outgoing.clone(),
            left_keys: relationship.keys_outgoing.clone(),
            right_table: incoming.clone(),
            right_keys: relationship.keys_incoming.clone(),
        });
    }

    let where_predicates: Vec<SqlPredicate> = resolved
        .dimension_filters
        .iter()
        .map(|f| SqlPredicate::Comparison {
            table: f.table.clone(),
            column: f.column.clone(),
            comparator: f.comparator,
            value: f.value.clone(),
        })
        .collect();
    inner.filter = combine_predicates(where_predicates);

    let having_predicates: Vec<SqlPredicate> = resolved
        .measure_filters
        .iter()
        .map(|f| SqlPredicate::MetricComparison {
            metric: Box::new(metric_to_sql(&f.measure.expr)),
            comparator: f.comparator,
            value: f.value.clone(),
        })
        .collect();
    inner.having = combine_predicates(having_predicates);

    if !resolved.measures.is_empty() {
        for dim in &resolved.dimensions {
            inner.group_by.push(SqlExpr::Column {
                table: Some(dim.table.clone()),
                name: dim.column.clone(),
            });
        }
        for dim in &resolved.time_grained_dimensions {
            inner.group_by.push(SqlExpr::TimeGrainColumn {
                grain: dim.time_grain,
                table: dim.table.clone(),
                name: dim.column.clone(),
            });
        }
    }

    if !ctx.requires_cte {
        inner.order_by = resolved
            .order_by
            .iter()
            .map(|order| flat_order_by(order))
            .collect();
        inner.limit = resolved.limit;
        inner.offset = resolved.offset;
        ctx.note(format!("planned flat query over '{common}'"));
        return Ok(inner);
    }

    ctx.note("window measures present, staging aggregation in a CTE");
    plan_staged(resolved, ctx, inner)
}

/// Wrap the aggregate query and attach window expressions at the outer level.
fn plan_staged(
    resolved: &ResolvedQuery,
    ctx: &mut QueryContext,
    inner: SqlQuery,
) -> Result<SqlQuery> {
    let inner_aliases: Vec<String> = inner.select.iter().map(|item| item.alias.clone()).collect();

    let mut outer = SqlQuery {
        from: SqlSource::Query(Box::new(inner)),
        select: Vec::new(),
        joins: Vec::new(),
        filter: None,
        group_by: Vec::new(),
        having: None,
        order_by: Vec::new(),
        limit: resolved.limit,
        offset: resolved.offset,
    };

    for alias in &inner_aliases {
        outer.select.push(SelectItem {
            alias: alias.clone(),
            expr: SqlExpr::Column {
                table: Some(CTE_NAME.to_string()),
                name: alias.clone(),
            },
        });
    }

    let partition_by: Vec<SqlExpr> = resolved
        .dimensions
        .iter()
        .map(|dim| SqlExpr::Column {
            table: Some(CTE_NAME.to_string()),
            name: dim.column.clone(),
        })
        .collect();
    let window_order_by: Vec<SqlOrderBy> = resolved
        .time_grained_dimensions
        .iter()
        .map(|dim| SqlOrderBy {
            expr: SqlExpr::Column {
                table: Some(CTE_NAME.to_string()),
                name: dim.column.clone(),
            },
            direction: Sorting::Asc,
        })
        .collect();

    for measure in &ctx.window_measures {
        let twin = ctx.window_measure_map.get(&measure.name).ok_or_else(|| {
            SemaQueryError::Internal(format!(
                "windowed measure '{}' has no twin mapping",
                measure.name
            ))
        })?;
        let window = measure.window.clone().ok_or_else(|| {
            SemaQueryError::Internal(format!("measure '{}' lost its window", measure.name))
        })?;
        let alias = if inner_aliases.iter().any(|a| a == &measure.name) {
            format!("{}_window", measure.name)
        } else {
            measure.name.clone()
        };
        outer.select.push(SelectItem {
            alias,
            expr: SqlExpr::Window {
                field: twin.clone(),
                partition_by: partition_by.clone(),
                order_by: window_order_by.clone(),
                window,
            },
        });
    }

    outer.order_by = resolved
        .order_by
        .iter()
        .map(|order| staged_order_by(order, &inner_aliases))
        .collect();

    Ok(outer)
}

fn metric_to_sql(expr: &MetricExpr) -> SqlExpr {
    match expr {
        MetricExpr::Aggregate {
            table,
            column,
            aggregation,
        } => SqlExpr::Aggregate {
            aggregation: *aggregation,
            table: table.clone(),
            column: column.clone(),
        },
        MetricExpr::Binary {
            left,
            operator,
            right,
        } => SqlExpr::Binary {
            left: Box::new(metric_to_sql(left)),
            operator: *operator,
            right: Box::new(metric_to_sql(right)),
        },
    }
}

fn combine_predicates(mut predicates: Vec<SqlPredicate>) -> Option<SqlPredicate> {
    match predicates.len() {
        0 => None,
        1 => predicates.pop(),
        _ => Some(SqlPredicate::And(predicates)),
    }
}

/// In a flat query, dimensions order by the raw column and measures by their
/// aggregate expression.
fn flat_order_by(order: &ResolvedOrderBy) -> SqlOrderBy {
    match order {
        ResolvedOrderBy::ByDimension {
            table,
            column,
            direction,
        } => SqlOrderBy {
            expr: SqlExpr::Column {
                table: Some(table.clone()),
                name: column.clone(),
            },
            direction: *direction,
        },
        ResolvedOrderBy::ByMeasure { measure, direction } => SqlOrderBy {
            expr: metric_to_sql(&measure.expr),
            direction: *direction,
        },
    }
}

/// In a staged query the outer level orders by the inner aliases; a measure
/// that only exists as a window output is referenced by its bare alias.
fn staged_order_by(order: &ResolvedOrderBy, inner_aliases: &[String]) -> SqlOrderBy {
    match order {
        ResolvedOrderBy::ByDimension {
            column, direction, ..
        } => SqlOrderBy {
            expr: SqlExpr::Column {
                table: Some(CTE_NAME.to_string()),
                name: column.clone(),
            },
            direction: *direction,
        },
        ResolvedOrderBy::ByMeasure { measure, direction } => {
            let table = if inner_aliases.iter().any(|a| a == &measure.name) {
                Some(CTE_NAME.to_string())
            } else {
                None
            };
            SqlOrderBy {
                expr: SqlExpr::Column {
                    table,
                    name: measure.name.clone(),
                },
                direction: *direction,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Aggregation, DataType, Relationship, RelationshipType, SemanticColumn, SemanticModel,
        Table,
    };
    use crate::query::request::{ChangeMode, Window};
    use crate::query::resolved::ResolvedMeasure;

    fn table(name: &str, columns: &[&str]) -> Table {
        Table {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|c| SemanticColumn {
                    name: c.to_string(),
                    data_type: DataType::String,
                    description: String::new(),
                })
                .collect(),
            description: String::new(),
        }
    }

    fn edge(incoming: &str, key_in: &str, outgoing: &str, key_out: &str) -> Relationship {
        Relationship {
            incoming: incoming.to_string(),
            keys_incoming: vec![key_in.to_string()],
            relationship_type: RelationshipType::OneToMany,
            outgoing: outgoing.to_string(),
            keys_outgoing: vec![key_out.to_string()],
        }
    }

    /// PlantGroup -> Plant -> Order, Customer -> Order.
    fn chain_model() -> SemanticModel {
        SemanticModel::new(
            vec![
                table("Order", &["id", "customer_id", "plant_id"]),
                table("Customer", &["id"]),
                table("Plant", &["id", "plant_group_id"]),
                table("PlantGroup", &["id"]),
            ],
            vec![
                edge("Customer", "id", "Order", "customer_id"),
                edge("Plant", "id", "Order", "plant_id"),
                edge("PlantGroup", "id", "Plant", "plant_group_id"),
            ],
            vec![],
            vec![],
        )
        .unwrap()
    }

    fn sum_measure(name: &str, table: &str, column: &str) -> ResolvedMeasure {
        ResolvedMeasure {
            name: name.to_string(),
            expr: MetricExpr::Aggregate {
                table: table.to_string(),
                column: column.to_string(),
                aggregation: Aggregation::Sum,
            },
            window: None,
        }
    }

    #[test]
    fn finds_single_hop_path() {
        let graph = chain_model().get_relationship_graph(true);
        let path = find_join_path("Customer", "Order", &graph).unwrap();
        assert_eq!(path, vec![("Customer".to_string(), "Order".to_string())]);
    }

    #[test]
    fn finds_multi_hop_path_in_order() {
        let graph = chain_model().get_relationship_graph(true);
        let path = find_join_path("PlantGroup", "Order", &graph).unwrap();
        assert_eq!(
            path,
            vec![
                ("PlantGroup".to_string(), "Plant".to_string()),
                ("Plant".to_string(), "Order".to_string()),
            ]
        );
    }

    #[test]
    fn returns_none_when_direction_blocks_the_path() {
        let graph = chain_model().get_relationship_graph(true);
        assert!(find_join_path("Order", "Customer", &graph).is_none());
    }

    #[test]
    fn multi_hop_edges_are_appended_closest_to_common_first() {
        let model = chain_model();
        let mut ctx = QueryContext::default();
        ctx.tables.insert("PlantGroup".to_string());
        ctx.tables.insert("Order".to_string());
        ctx.common_table = Some("Order".to_string());

        let resolved = ResolvedQuery::default();
        let errors = analyse_context(&resolved, &mut ctx, &model).unwrap();
        assert!(errors.is_empty());
        assert_eq!(
            ctx.joins,
            vec![
                ("Plant".to_string(), "Order".to_string()),
                ("PlantGroup".to_string(), "Plant".to_string()),
            ]
        );
    }

    #[test]
    fn unreachable_common_table_is_a_join_path_error() {
        let model = chain_model();
        let mut ctx = QueryContext::default();
        ctx.tables.insert("Order".to_string());
        ctx.tables.insert("Customer".to_string());
        ctx.common_table = Some("Customer".to_string());

        let resolved = ResolvedQuery::default();
        let errors = analyse_context(&resolved, &mut ctx, &model).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "no_join_path");
        assert_eq!(errors[0].stage, Stage::JoinPathValidation);
    }

    #[test]
    fn window_measure_maps_to_its_twin() {
        let model = chain_model();
        let mut ctx = QueryContext::default();
        ctx.tables.insert("Order".to_string());
        ctx.common_table = Some("Order".to_string());

        let mut windowed = sum_measure("change_in_orders", "Order", "id");
        windowed.window = Some(Window::Change {
            period: 1,
            mode: ChangeMode::Absolute,
        });
        let resolved = ResolvedQuery {
            measures: vec![sum_measure("total_orders", "Order", "id"), windowed],
            ..Default::default()
        };

        let errors = analyse_context(&resolved, &mut ctx, &model).unwrap();
        assert!(errors.is_empty());
        assert!(ctx.requires_cte);
        assert_eq!(ctx.unique_measures.len(), 1);
        assert_eq!(
            ctx.window_measure_map.get("change_in_orders"),
            Some(&"total_orders".to_string())
        );
    }

    #[test]
    fn no_windows_means_no_cte() {
        let model = chain_model();
        let mut ctx = QueryContext::default();
        ctx.tables.insert("Order".to_string());
        ctx.common_table = Some("Order".to_string());

        let resolved = ResolvedQuery {
            measures: vec![sum_measure("total_orders", "Order", "id")],
            ..Default::default()
        };
        let errors = analyse_context(&resolved, &mut ctx, &model).unwrap();
        assert!(errors.is_empty());
        assert!(!ctx.requires_cte);
        assert!(ctx.window_measures.is_empty());
    }
}
