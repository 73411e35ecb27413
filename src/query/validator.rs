//! Query validation.
//!
//! Three passes, each accumulating every failure it finds: structural checks
//! on the request alone, reference checks against the semantic model, and the
//! join-path check once resolution has recorded which tables the query
//! touches. The orchestrator short-circuits between passes, never within one.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::SemaQueryError;
use crate::models::{DataType, SemanticModel};
use crate::query::context::{QueryContext, QueryError, Stage};
use crate::query::request::QueryRequest;

/// Checks that do not need the semantic model: something must be selected,
/// at most one dimension may carry a time grain, windows need a time grain,
/// and inline names must refer to fields the query itself declares.
pub fn validate_structure(request: &QueryRequest, ctx: &mut QueryContext) -> Vec<QueryError> {
    let mut errors = Vec::new();
    ctx.note("validating query structure");

    if request.dimensions.is_empty() && request.measures.is_empty() && request.kpi_refs.is_empty() {
        errors.push(QueryError::new(
            Stage::StructureValidation,
            "empty_selection",
            "query must select at least one dimension, measure or KPI",
        ));
    }

    let time_grained = request
        .dimensions
        .iter()
        .filter(|d| d.time_grain.is_some())
        .count();
    if time_grained > 1 {
        errors.push(QueryError::new(
            Stage::StructureValidation,
            "multiple_time_grains",
            "only one time-grained dimension is allowed per query",
        ));
    }

    if request.measures.iter().any(|m| m.window.is_some()) && time_grained == 0 {
        errors.push(
            QueryError::new(
                Stage::StructureValidation,
                "window_requires_time_grain",
                "windowed measures require a time-grained dimension to order over",
            )
            .with_hint("add a time_grain to one of the query's date dimensions"),
        );
    }

    let mut measure_names: BTreeSet<&str> = BTreeSet::new();
    for measure in &request.measures {
        if !measure_names.insert(measure.name.as_str()) {
            errors.push(QueryError::new(
                Stage::StructureValidation,
                "duplicate_measure_name",
                format!("measure name '{}' is declared more than once", measure.name),
            ));
        }
    }

    let metric_names: BTreeSet<&str> = measure_names
        .iter()
        .copied()
        .chain(request.kpi_refs.iter().map(String::as_str))
        .collect();

    for filter in request.metric_filters() {
        if !metric_names.contains(filter.field.as_str()) {
            errors.push(QueryError::new(
                Stage::StructureValidation,
                "unknown_filter_target",
                format!(
                    "filter field '{}' does not match any measure or KPI in the query",
                    filter.field
                ),
            ));
        }
    }

    for filter in request
        .dimension_filters
        .iter()
        .chain(request.metric_filters())
    {
        if filter.value.is_null() && !filter.comparator.is_unary() {
            errors.push(QueryError::new(
                Stage::StructureValidation,
                "missing_filter_value",
                format!("filter on '{}' must include a value", filter.field),
            ));
        }
    }

    let dimension_refs: BTreeSet<String> =
        request.dimensions.iter().map(|d| d.field_ref()).collect();
    for order in &request.order_by {
        let valid = if order.field.contains('.') {
            dimension_refs.contains(&order.field)
        } else {
            metric_names.contains(order.field.as_str())
        };
        if !valid {
            errors.push(
                QueryError::new(
                    Stage::StructureValidation,
                    "invalid_order_by_field",
                    format!(
                        "order-by field '{}' does not match a selected dimension, measure or KPI",
                        order.field
                    ),
                )
                .with_hint("order-by dimensions use table.column format; metrics use their name"),
            );
        }
    }

    errors
}

/// Checks every name in the request against the semantic model.
pub fn validate_references(
    request: &QueryRequest,
    model: &SemanticModel,
    ctx: &mut QueryContext,
) -> Vec<QueryError> {
    let mut errors = Vec::new();
    ctx.note("validating references against the semantic model");

    for name in &request.kpi_refs {
        ctx.note(format!("checking KPI reference '{name}'"));
        if let Err(err) = model.get_kpi(name) {
            errors.push(entity_error("kpi_not_found", "duplicate_kpi", err));
        }
    }

    for name in &request.filter_refs {
        ctx.note(format!("checking filter reference '{name}'"));
        if let Err(err) = model.get_filter(name) {
            errors.push(entity_error("filter_not_found", "duplicate_filter", err));
        }
    }

    for dim in &request.dimensions {
        ctx.note(format!("checking dimension '{}'", dim.field_ref()));
        if !model.field_exists(&dim.table, &dim.column) {
            errors.push(QueryError::new(
                Stage::ReferenceValidation,
                "dimension_not_found",
                format!(
                    "dimension '{}' references an unknown table or column",
                    dim.field_ref()
                ),
            ));
        } else if dim.time_grain.is_some()
            && model.column_type(&dim.table, &dim.column) != Some(DataType::Date)
        {
            errors.push(QueryError::new(
                Stage::ReferenceValidation,
                "invalid_time_grain",
                format!(
                    "time-grained dimension '{}' must be of type DATE",
                    dim.field_ref()
                ),
            ));
        }
    }

    for measure in &request.measures {
        ctx.note(format!(
            "checking measure '{}' ({}.{})",
            measure.name, measure.table, measure.column
        ));
        if !model.field_exists(&measure.table, &measure.column) {
            errors.push(QueryError::new(
                Stage::ReferenceValidation,
                "measure_not_found",
                format!(
                    "measure '{}' references an unknown table or column",
                    measure.name
                ),
            ));
        }
    }

    for filter in &request.dimension_filters {
        ctx.note(format!("checking dimension filter field '{}'", filter.field));
        match filter.split_field() {
            None => errors.push(
                QueryError::new(
                    Stage::ReferenceValidation,
                    "invalid_filter_field",
                    format!(
                        "dimension filter '{}' is not formatted as table.column",
                        filter.field
                    ),
                )
                .with_hint("use 'table.column', e.g. 'orders.country'"),
            ),
            Some((table, column)) => {
                if !model.field_exists(table, column) {
                    errors.push(QueryError::new(
                        Stage::ReferenceValidation,
                        "filter_field_not_found",
                        format!(
                            "dimension filter '{}' references an unknown table or column",
                            filter.field
                        ),
                    ));
                }
            }
        }
    }

    errors
}

fn entity_error(missing: &'static str, duplicate: &'static str, err: SemaQueryError) -> QueryError {
    let code = match err {
        SemaQueryError::DuplicateEntity { .. } => duplicate,
        _ => missing,
    };
    QueryError::new(Stage::ReferenceValidation, code, err.to_string())
}

/// Finds the common table for all tables the query touches, or fails with
/// `no_common_table`. Reachability is over the undirected relationship graph;
/// with several candidates the one minimising the summed BFS distance wins,
/// ties broken by table name.
pub fn validate_join_path(model: &SemanticModel, ctx: &mut QueryContext) -> Vec<QueryError> {
    let mut errors = Vec::new();
    ctx.note("validating join path");

    if model.relationships().is_empty() {
        ctx.note("no relationships defined in the model");
        if ctx.tables.len() > 1 {
            errors.push(
                QueryError::new(
                    Stage::JoinPathValidation,
                    "no_common_table",
                    "query touches multiple tables but the model defines no relationships",
                )
                .with_hint("declare relationships between the touched tables"),
            );
        } else if let Some(table) = ctx.tables.iter().next().cloned() {
            ctx.note(format!("single table in query, common table is '{table}'"));
            ctx.common_table = Some(table);
        }
        return errors;
    }

    let graph = model.get_relationship_graph(false);

    // BFS from each touched table to everything reachable from it.
    let reachability: BTreeMap<&str, BTreeMap<String, usize>> = ctx
        .tables
        .iter()
        .map(|table| (table.as_str(), bfs_distances(table, &graph)))
        .collect();

    let mut common: Option<BTreeSet<&str>> = None;
    for distances in reachability.values() {
        let reachable: BTreeSet<&str> = distances.keys().map(String::as_str).collect();
        common = Some(match common {
            None => reachable,
            Some(current) => current.intersection(&reachable).copied().collect(),
        });
    }
    let common = common.unwrap_or_default();

    if common.is_empty() {
        ctx.note("no common table found among query tables");
        errors.push(
            QueryError::new(
                Stage::JoinPathValidation,
                "no_common_table",
                "the tables in the query do not share a common table",
            )
            .with_hint("the semantic model does not support this combination of tables"),
        );
        return errors;
    }

    if common.len() == 1 {
        let chosen = common.into_iter().next().unwrap_or_default().to_string();
        ctx.note(format!("single common table found: '{chosen}'"));
        ctx.common_table = Some(chosen);
        return errors;
    }

    // Several candidates. Joins are emitted along relationship direction, so
    // prefer candidates every touched table can reach over the directed
    // graph (the join sink); among those, minimise the summed undirected
    // distance. BTreeSet iteration is sorted, so remaining ties go to the
    // lexicographically smallest name.
    let directed = model.get_relationship_graph(true);
    let directed_reach: Vec<BTreeMap<String, usize>> = ctx
        .tables
        .iter()
        .map(|table| bfs_distances(table, &directed))
        .collect();
    let sinks: BTreeSet<&str> = common
        .iter()
        .copied()
        .filter(|candidate| {
            directed_reach
                .iter()
                .all(|distances| distances.contains_key(*candidate))
        })
        .collect();
    let candidates = if sinks.is_empty() { &common } else { &sinks };

    let chosen = candidates
        .iter()
        .min_by_key(|candidate| {
            reachability
                .values()
                .map(|distances| distances.get(**candidate).copied().unwrap_or(0))
                .sum::<usize>()
        })
        .copied()
        .unwrap_or_default()
        .to_string();

    ctx.note(format!(
        "multiple common tables found, selected '{chosen}' as the closest"
    ));
    ctx.common_table = Some(chosen);

    errors
}

/// Shortest join distance from `start` to every reachable table.
pub(crate) fn bfs_distances(
    start: &str,
    graph: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, usize> {
    let mut distances = BTreeMap::new();
    distances.insert(start.to_string(), 0usize);
    let mut queue = VecDeque::new();
    queue.push_back(start.to_string());

    while let Some(current) = queue.pop_front() {
        let next_distance = distances[&current] + 1;
        if let Some(neighbours) = graph.get(&current) {
            for neighbour in neighbours {
                if !distances.contains_key(neighbour) {
                    distances.insert(neighbour.clone(), next_distance);
                    queue.push_back(neighbour.clone());
                }
            }
        }
    }

    distances
}
