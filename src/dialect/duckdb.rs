//! DuckDB dialect implementation.

use crate::models::TimeGrain;

use super::{grain_to_str, Dialect};

#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn render_time_grain(&self, grain: &TimeGrain, expr: &str) -> String {
        let unit = grain_to_str(grain);
        format!("date_trunc('{unit}', {expr})")
    }
}
