//! Fully dereferenced query structures.
//!
//! After resolution no semantic-model lookups remain: KPI references have
//! become metric expressions and named filters have been split into dimension
//! and measure filters. A `ResolvedQuery` is immutable once built.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::models::{Aggregation, Arithmetic, Comparator, Sorting, TimeGrain};
use crate::query::request::Window;

/// Self-contained metric expression. Binary variants come from derived KPIs;
/// their operands never surface as standalone select items.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricExpr {
    Aggregate {
        table: String,
        column: String,
        aggregation: Aggregation,
    },
    Binary {
        left: Box<MetricExpr>,
        operator: Arithmetic,
        right: Box<MetricExpr>,
    },
}

impl MetricExpr {
    /// Collect every table the expression reads.
    pub fn collect_tables(&self, out: &mut BTreeSet<String>) {
        match self {
            MetricExpr::Aggregate { table, .. } => {
                out.insert(table.clone());
            }
            MetricExpr::Binary { left, right, .. } => {
                left.collect_tables(out);
                right.collect_tables(out);
            }
        }
    }
}

/// Structural identity of a measure: the expression alone, ignoring the
/// measure's name and window. A windowed measure and its unwindowed twin
/// share a key, which is what lets them share one base aggregation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeasureKey(MetricExpr);

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMeasure {
    pub name: String,
    pub expr: MetricExpr,
    pub window: Option<Window>,
}

impl ResolvedMeasure {
    pub fn key(&self) -> MeasureKey {
        MeasureKey(self.expr.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDimension {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTimeGrainDimension {
    pub table: String,
    pub column: String,
    pub time_grain: TimeGrain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDimensionFilter {
    pub table: String,
    pub column: String,
    pub comparator: Comparator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMeasureFilter {
    pub measure: ResolvedMeasure,
    pub comparator: Comparator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedOrderBy {
    ByDimension {
        table: String,
        column: String,
        direction: Sorting,
    },
    ByMeasure {
        measure: ResolvedMeasure,
        direction: Sorting,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedQuery {
    pub dimensions: Vec<ResolvedDimension>,
    pub time_grained_dimensions: Vec<ResolvedTimeGrainDimension>,
    pub measures: Vec<ResolvedMeasure>,
    pub dimension_filters: Vec<ResolvedDimensionFilter>,
    pub measure_filters: Vec<ResolvedMeasureFilter>,
    pub order_by: Vec<ResolvedOrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}
