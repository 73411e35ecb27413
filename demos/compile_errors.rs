//! Show how validation failures come back as an error list the calling agent
//! can act on, rather than a single opaque failure.
//!
//! Run with: cargo run --example compile_errors

use semaquery::models::{DataType, SemanticColumn, SemanticModel, Table};
use semaquery::query::request::{QueryDimension, QueryRequest};
use semaquery::QueryCompiler;

fn main() -> semaquery::Result<()> {
    let model = SemanticModel::new(
        vec![Table {
            name: "events".to_string(),
            columns: vec![SemanticColumn {
                name: "event_id".to_string(),
                data_type: DataType::String,
                description: "Event primary key".to_string(),
            }],
            description: "One row per event".to_string(),
        }],
        vec![],
        vec![],
        vec![],
    )?;

    let request = QueryRequest {
        dimensions: vec![QueryDimension {
            table: "events".to_string(),
            column: "event_type".to_string(),
            time_grain: None,
        }],
        kpi_refs: vec!["conversion_rate".to_string()],
        ..Default::default()
    };

    let output = QueryCompiler::new(model).compile(&request)?;
    for error in &output.errors {
        print!("[{}] {}: {}", error.stage, error.code, error.message);
        match &error.hint {
            Some(hint) => println!(" (hint: {hint})"),
            None => println!(),
        }
    }
    Ok(())
}
