//! SQL dialect abstractions.
//!
//! The compiler walks the expression tree; the dialect only maps logical
//! constructs (identifiers, aggregations, time-grain truncation, literals) to
//! SQL fragments for the target engine.

use serde_json::Value;

use crate::models::{Aggregation, TimeGrain};

pub trait Dialect {
    fn quote_ident(&self, ident: &str) -> String;

    fn render_aggregation(&self, agg: &Aggregation, expr: &str) -> String {
        match agg {
            Aggregation::Sum => format!("SUM({expr})"),
            Aggregation::Avg => format!("AVG({expr})"),
            Aggregation::Count => format!("COUNT({expr})"),
            Aggregation::CountDistinct => format!("COUNT(DISTINCT {expr})"),
            Aggregation::Min => format!("MIN({expr})"),
            Aggregation::Max => format!("MAX({expr})"),
            Aggregation::Median => format!("MEDIAN({expr})"),
        }
    }

    fn render_time_grain(&self, grain: &TimeGrain, expr: &str) -> String;

    fn render_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.render_literal(v)).collect();
                rendered.join(", ")
            }
            Value::Object(_) => format!("'{}'", value.to_string().replace('\'', "''")),
        }
    }
}

/// Lowercase unit name shared by date_trunc-style dialects.
pub(crate) fn grain_to_str(grain: &TimeGrain) -> &'static str {
    match grain {
        TimeGrain::Minute => "minute",
        TimeGrain::Hour => "hour",
        TimeGrain::Day => "day",
        TimeGrain::Week => "week",
        TimeGrain::Month => "month",
        TimeGrain::Quarter => "quarter",
        TimeGrain::Year => "year",
    }
}

mod duckdb;
pub use duckdb::DuckDbDialect;
