//! Compile a query against an in-code semantic model and print the SQL.
//!
//! Run with: cargo run --example print_sql

use semaquery::models::{
    Aggregation, Arithmetic, Comparator, DataType, FilterPredicate, Kpi, KpiExpression,
    NamedFilter, Relationship, RelationshipType, SemanticColumn, SemanticModel, Table,
};
use semaquery::query::request::{QueryDimension, QueryRequest};
use semaquery::QueryCompiler;
use serde_json::json;

fn column(name: &str, data_type: DataType, description: &str) -> SemanticColumn {
    SemanticColumn {
        name: name.to_string(),
        data_type,
        description: description.to_string(),
    }
}

fn main() -> semaquery::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let model = SemanticModel::new(
        vec![
            Table {
                name: "orders".to_string(),
                columns: vec![
                    column("order_id", DataType::String, "Order primary key"),
                    column("customer_id", DataType::String, "FK to customers"),
                    column("revenue", DataType::Numeric, "Order revenue"),
                    column("production_cost", DataType::Numeric, "Cost of goods"),
                    column("order_date", DataType::Date, "Date the order was placed"),
                ],
                description: "One row per order".to_string(),
            },
            Table {
                name: "customers".to_string(),
                columns: vec![
                    column("id", DataType::String, "Customer primary key"),
                    column("customer_name", DataType::String, "Full name"),
                    column("region", DataType::String, "Sales region"),
                ],
                description: "One row per customer".to_string(),
            },
        ],
        vec![Relationship {
            incoming: "customers".to_string(),
            keys_incoming: vec!["id".to_string()],
            relationship_type: RelationshipType::OneToMany,
            outgoing: "orders".to_string(),
            keys_outgoing: vec!["customer_id".to_string()],
        }],
        vec![
            Kpi {
                name: "total_revenue".to_string(),
                expression: KpiExpression::Metric {
                    table: "orders".to_string(),
                    column: "revenue".to_string(),
                    aggregation: Aggregation::Sum,
                },
                description: "Total revenue".to_string(),
                return_type: DataType::Numeric,
            },
            Kpi {
                name: "total_cost".to_string(),
                expression: KpiExpression::Metric {
                    table: "orders".to_string(),
                    column: "production_cost".to_string(),
                    aggregation: Aggregation::Sum,
                },
                description: "Total production cost".to_string(),
                return_type: DataType::Numeric,
            },
            Kpi {
                name: "total_profit".to_string(),
                expression: KpiExpression::Binary {
                    left: "total_revenue".to_string(),
                    operator: Arithmetic::Sub,
                    right: "total_cost".to_string(),
                },
                description: "Revenue minus cost".to_string(),
                return_type: DataType::Numeric,
            },
        ],
        vec![NamedFilter {
            name: "target_regions".to_string(),
            predicate: FilterPredicate::Column {
                table: "customers".to_string(),
                column: "region".to_string(),
                comparator: Comparator::In,
                value: json!(["North", "East"]),
            },
            description: "Regions in scope this quarter".to_string(),
        }],
    )?;

    let request = QueryRequest {
        dimensions: vec![QueryDimension {
            table: "customers".to_string(),
            column: "customer_name".to_string(),
            time_grain: None,
        }],
        kpi_refs: vec!["total_revenue".to_string(), "total_profit".to_string()],
        filter_refs: vec!["target_regions".to_string()],
        limit: Some(20),
        ..Default::default()
    };

    let output = QueryCompiler::new(model).compile(&request)?;
    match output.sql {
        Some(sql) => println!("{sql}"),
        None => {
            for error in &output.errors {
                eprintln!("[{}] {}: {}", error.stage, error.code, error.message);
            }
        }
    }
    println!();
    println!("trace:");
    for line in &output.context.trace {
        println!("  {line}");
    }
    Ok(())
}
