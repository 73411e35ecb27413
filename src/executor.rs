//! Execution engine interface.
//!
//! The compiler stops at SQL text; running it belongs to an external engine.
//! This trait pins down the seam without shipping any engine in this crate.

use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub trait QueryExecutor {
    fn execute(&self, sql: &str) -> Result<ResultSet>;
}
