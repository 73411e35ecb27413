//! Agent-facing query request types.
//!
//! This is the structure an automated caller submits; it is deserializable
//! from JSON and compiled into SQL by the pipeline in this module's parent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Aggregation, Comparator, Sorting, TimeGrain};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDimension {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub time_grain: Option<TimeGrain>,
}

impl QueryDimension {
    /// Canonical `table.column` reference.
    pub fn field_ref(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeMode {
    Absolute,
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovingAverageMode {
    Ahead,
    Behind,
    Centered,
}

/// Window transform attached to a measure. Windows read the measure's
/// aggregated value row-over-row, so they force CTE staging during planning.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Window {
    Change { period: u32, mode: ChangeMode },
    MovingAverage { period: u32, mode: MovingAverageMode },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMeasure {
    /// Unique name within the query; filters and ordering refer to it.
    pub name: String,
    pub table: String,
    pub column: String,
    pub aggregation: Aggregation,
    #[serde(default)]
    pub window: Option<Window>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Either `table.column` (dimension filters) or a measure/KPI name.
    pub field: String,
    pub comparator: Comparator,
    #[serde(default)]
    pub value: Value,
}

impl QueryFilter {
    /// Split a `table.column` field; `None` when the field is not qualified.
    pub fn split_field(&self) -> Option<(&str, &str)> {
        let (table, column) = self.field.split_once('.')?;
        if table.is_empty() || column.is_empty() {
            return None;
        }
        Some((table, column))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOrderBy {
    /// A `table.column` dimension reference or a measure/KPI name.
    pub field: String,
    #[serde(default)]
    pub direction: Sorting,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub dimensions: Vec<QueryDimension>,
    #[serde(default)]
    pub measures: Vec<QueryMeasure>,
    #[serde(default)]
    pub kpi_refs: Vec<String>,
    #[serde(default)]
    pub dimension_filters: Vec<QueryFilter>,
    #[serde(default)]
    pub measure_filters: Vec<QueryFilter>,
    #[serde(default)]
    pub kpi_filters: Vec<QueryFilter>,
    #[serde(default)]
    pub filter_refs: Vec<String>,
    #[serde(default)]
    pub order_by: Vec<QueryOrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl QueryRequest {
    /// All inline filters that target a measure or KPI by name.
    pub(crate) fn metric_filters(&self) -> impl Iterator<Item = &QueryFilter> {
        self.measure_filters.iter().chain(self.kpi_filters.iter())
    }
}
