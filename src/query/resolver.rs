//! Reference resolution.
//!
//! Turns a validated request into a `ResolvedQuery`: KPI references become
//! metric expressions, named filters are split into dimension and measure
//! filters, and the context learns every table the query touches. Any name
//! that fails to resolve here slipped past reference validation, which is a
//! pipeline defect, not a caller error.

use serde_json::json;

use crate::error::{Result, SemaQueryError};
use crate::models::{FilterPredicate, KpiExpression, SemanticModel};
use crate::query::context::QueryContext;
use crate::query::request::{QueryFilter, QueryOrderBy, QueryRequest};
use crate::query::resolved::{
    MetricExpr, ResolvedDimension, ResolvedDimensionFilter, ResolvedMeasure,
    ResolvedMeasureFilter, ResolvedOrderBy, ResolvedQuery, ResolvedTimeGrainDimension,
};

pub fn resolve(
    request: &QueryRequest,
    model: &SemanticModel,
    ctx: &mut QueryContext,
) -> Result<ResolvedQuery> {
    ctx.note("resolving query references");

    let mut measures: Vec<ResolvedMeasure> = request
        .measures
        .iter()
        .map(|m| ResolvedMeasure {
            name: m.name.clone(),
            expr: MetricExpr::Aggregate {
                table: m.table.clone(),
                column: m.column.clone(),
                aggregation: m.aggregation,
            },
            window: m.window.clone(),
        })
        .collect();

    for name in &request.kpi_refs {
        let measure = resolve_kpi(name, model, ctx)?;
        measures.push(measure);
    }

    let mut dimension_filters: Vec<ResolvedDimensionFilter> = request
        .dimension_filters
        .iter()
        .map(|f| resolve_dimension_filter(f, ctx))
        .collect::<Result<_>>()?;

    let mut measure_filters: Vec<ResolvedMeasureFilter> = request
        .metric_filters()
        .map(|f| resolve_measure_filter(f, &measures, ctx))
        .collect::<Result<_>>()?;

    for name in &request.filter_refs {
        resolve_named_filter(
            name,
            model,
            ctx,
            &mut dimension_filters,
            &mut measure_filters,
        )?;
    }

    let order_by = request
        .order_by
        .iter()
        .map(|o| resolve_order_by(o, &measures))
        .collect::<Result<_>>()?;

    let mut dimensions = Vec::new();
    let mut time_grained_dimensions = Vec::new();
    for dim in &request.dimensions {
        match dim.time_grain {
            Some(grain) => time_grained_dimensions.push(ResolvedTimeGrainDimension {
                table: dim.table.clone(),
                column: dim.column.clone(),
                time_grain: grain,
            }),
            None => dimensions.push(ResolvedDimension {
                table: dim.table.clone(),
                column: dim.column.clone(),
            }),
        }
    }

    for dim in &request.dimensions {
        ctx.tables.insert(dim.table.clone());
    }
    for measure in &measures {
        measure.expr.collect_tables(&mut ctx.tables);
    }
    for filter in &dimension_filters {
        ctx.tables.insert(filter.table.clone());
    }
    for filter in &measure_filters {
        filter.measure.expr.collect_tables(&mut ctx.tables);
    }
    let touched = ctx
        .tables
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    ctx.note(format!("query touches tables: {touched}"));

    Ok(ResolvedQuery {
        dimensions,
        time_grained_dimensions,
        measures,
        dimension_filters,
        measure_filters,
        order_by,
        limit: request.limit,
        offset: request.offset,
    })
}

/// Dereference a KPI into a self-contained measure. Derived KPIs resolve
/// their operands recursively, so the result may be a binary expression.
fn resolve_kpi(name: &str, model: &SemanticModel, ctx: &mut QueryContext) -> Result<ResolvedMeasure> {
    let expr = resolve_kpi_expr(name, model)?;
    ctx.note(format!("resolved KPI '{name}'"));
    Ok(ResolvedMeasure {
        name: name.to_string(),
        expr,
        window: None,
    })
}

fn resolve_kpi_expr(name: &str, model: &SemanticModel) -> Result<MetricExpr> {
    let kpi = model
        .get_kpi(name)
        .map_err(|err| SemaQueryError::Internal(format!("KPI '{name}' vanished after validation: {err}")))?;
    match &kpi.expression {
        KpiExpression::Metric {
            table,
            column,
            aggregation,
        } => Ok(MetricExpr::Aggregate {
            table: table.clone(),
            column: column.clone(),
            aggregation: *aggregation,
        }),
        KpiExpression::Binary {
            left,
            operator,
            right,
        } => Ok(MetricExpr::Binary {
            left: Box::new(resolve_kpi_expr(left, model)?),
            operator: *operator,
            right: Box::new(resolve_kpi_expr(right, model)?),
        }),
    }
}

/// A named model filter becomes a dimension filter (column predicate) or a
/// measure filter (KPI predicate), depending on what it wraps.
fn resolve_named_filter(
    name: &str,
    model: &SemanticModel,
    ctx: &mut QueryContext,
    dimension_filters: &mut Vec<ResolvedDimensionFilter>,
    measure_filters: &mut Vec<ResolvedMeasureFilter>,
) -> Result<()> {
    let filter = model.get_filter(name).map_err(|err| {
        SemaQueryError::Internal(format!("filter '{name}' vanished after validation: {err}"))
    })?;
    ctx.note(format!("resolving named filter '{name}'"));
    match &filter.predicate {
        FilterPredicate::Column {
            table,
            column,
            comparator,
            value,
        } => dimension_filters.push(ResolvedDimensionFilter {
            table: table.clone(),
            column: column.clone(),
            comparator: *comparator,
            value: value.clone(),
        }),
        FilterPredicate::Kpi {
            kpi,
            comparator,
            value,
        } => {
            let measure = resolve_kpi(kpi, model, ctx)?;
            measure_filters.push(ResolvedMeasureFilter {
                measure,
                comparator: *comparator,
                value: json!(value),
            });
        }
    }
    Ok(())
}

/// Inline measure/KPI filters name one of the query's own metrics.
fn resolve_measure_filter(
    filter: &QueryFilter,
    measures: &[ResolvedMeasure],
    ctx: &mut QueryContext,
) -> Result<ResolvedMeasureFilter> {
    let measure = measures
        .iter()
        .find(|m| m.name == filter.field)
        .ok_or_else(|| {
            SemaQueryError::Internal(format!(
                "measure filter target '{}' was not resolved",
                filter.field
            ))
        })?;
    ctx.note(format!("resolved measure filter on '{}'", filter.field));
    Ok(ResolvedMeasureFilter {
        measure: measure.clone(),
        comparator: filter.comparator,
        value: filter.value.clone(),
    })
}

/// Inline dimension filters already carry their table and column in the
/// field; no model lookup is needed.
fn resolve_dimension_filter(
    filter: &QueryFilter,
    ctx: &mut QueryContext,
) -> Result<ResolvedDimensionFilter> {
    let (table, column) = filter.split_field().ok_or_else(|| {
        SemaQueryError::Internal(format!(
            "dimension filter '{}' passed validation without table.column format",
            filter.field
        ))
    })?;
    ctx.note(format!("resolved dimension filter on '{}'", filter.field));
    Ok(ResolvedDimensionFilter {
        table: table.to_string(),
        column: column.to_string(),
        comparator: filter.comparator,
        value: filter.value.clone(),
    })
}

/// An order-by field is a `table.column` dimension or a metric name.
fn resolve_order_by(order: &QueryOrderBy, measures: &[ResolvedMeasure]) -> Result<ResolvedOrderBy> {
    if let Some((table, column)) = order.field.split_once('.') {
        return Ok(ResolvedOrderBy::ByDimension {
            table: table.to_string(),
            column: column.to_string(),
            direction: order.direction,
        });
    }
    let measure = measures
        .iter()
        .find(|m| m.name == order.field)
        .ok_or_else(|| {
            SemaQueryError::Internal(format!(
                "order-by field '{}' was not resolved to a measure",
                order.field
            ))
        })?;
    Ok(ResolvedOrderBy::ByMeasure {
        measure: measure.clone(),
        direction: order.direction,
    })
}
