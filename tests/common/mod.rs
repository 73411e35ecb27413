//! Shared semantic-model fixtures for the integration tests.
#![allow(dead_code)]

use semaquery::models::{
    Aggregation, Arithmetic, Comparator, DataType, FilterPredicate, Kpi, KpiExpression,
    NamedFilter, Relationship, RelationshipType, SemanticColumn, SemanticModel, Table,
};
use serde_json::json;

pub fn table(name: &str, columns: &[(&str, DataType)]) -> Table {
    Table {
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|(col, data_type)| SemanticColumn {
                name: col.to_string(),
                data_type: *data_type,
                description: String::new(),
            })
            .collect(),
        description: String::new(),
    }
}

pub fn relationship(
    incoming: &str,
    keys_incoming: &[&str],
    outgoing: &str,
    keys_outgoing: &[&str],
) -> Relationship {
    Relationship {
        incoming: incoming.to_string(),
        keys_incoming: keys_incoming.iter().map(|k| k.to_string()).collect(),
        relationship_type: RelationshipType::OneToMany,
        outgoing: outgoing.to_string(),
        keys_outgoing: keys_outgoing.iter().map(|k| k.to_string()).collect(),
    }
}

pub fn metric_kpi(name: &str, table: &str, column: &str, aggregation: Aggregation) -> Kpi {
    Kpi {
        name: name.to_string(),
        expression: KpiExpression::Metric {
            table: table.to_string(),
            column: column.to_string(),
            aggregation,
        },
        description: String::new(),
        return_type: DataType::Numeric,
    }
}

pub fn binary_kpi(name: &str, left: &str, operator: Arithmetic, right: &str) -> Kpi {
    Kpi {
        name: name.to_string(),
        expression: KpiExpression::Binary {
            left: left.to_string(),
            operator,
            right: right.to_string(),
        },
        description: String::new(),
        return_type: DataType::Numeric,
    }
}

/// Star schema: Sales fact with Customer, Product and Date dimensions.
pub fn star_model() -> SemanticModel {
    SemanticModel::new(
        vec![
            table(
                "Sales",
                &[
                    ("sale_id", DataType::String),
                    ("customer_id", DataType::String),
                    ("product_id", DataType::String),
                    ("date_id", DataType::Date),
                    ("revenue", DataType::Numeric),
                    ("quantity", DataType::Numeric),
                ],
            ),
            table(
                "Customer",
                &[
                    ("customer_id", DataType::String),
                    ("country", DataType::String),
                    ("is_active", DataType::Boolean),
                ],
            ),
            table(
                "Product",
                &[
                    ("product_id", DataType::String),
                    ("category", DataType::String),
                ],
            ),
            table(
                "Date",
                &[
                    ("date_id", DataType::Date),
                    ("year", DataType::Numeric),
                    ("month", DataType::Numeric),
                ],
            ),
        ],
        vec![
            relationship("Customer", &["customer_id"], "Sales", &["customer_id"]),
            relationship("Product", &["product_id"], "Sales", &["product_id"]),
            relationship("Date", &["date_id"], "Sales", &["date_id"]),
        ],
        vec![
            metric_kpi("kpi_total_revenue", "Sales", "revenue", Aggregation::Sum),
            metric_kpi("kpi_total_quantity", "Sales", "quantity", Aggregation::Sum),
            binary_kpi(
                "kpi_average_price",
                "kpi_total_revenue",
                Arithmetic::Div,
                "kpi_total_quantity",
            ),
        ],
        vec![
            NamedFilter {
                name: "filter_active_customers".to_string(),
                predicate: FilterPredicate::Column {
                    table: "Customer".to_string(),
                    column: "is_active".to_string(),
                    comparator: Comparator::Equal,
                    value: json!(true),
                },
                description: String::new(),
            },
            NamedFilter {
                name: "filter_high_revenue".to_string(),
                predicate: FilterPredicate::Kpi {
                    kpi: "kpi_total_revenue".to_string(),
                    comparator: Comparator::GreaterThan,
                    value: 10_000.0,
                },
                description: String::new(),
            },
        ],
    )
    .expect("star fixture must validate")
}

/// Commerce schema: orders fact joined from customers and products.
pub fn commerce_model() -> SemanticModel {
    SemanticModel::new(
        vec![
            table(
                "orders",
                &[
                    ("order_id", DataType::String),
                    ("customer_id", DataType::String),
                    ("product_code", DataType::String),
                    ("price", DataType::Numeric),
                    ("quantity", DataType::Numeric),
                    ("revenue", DataType::Numeric),
                    ("order_date", DataType::Date),
                    ("production_cost", DataType::Numeric),
                ],
            ),
            table(
                "customers",
                &[
                    ("id", DataType::String),
                    ("customer_name", DataType::String),
                    ("region", DataType::String),
                ],
            ),
            table(
                "products",
                &[
                    ("product_code", DataType::String),
                    ("product_name", DataType::String),
                    ("category", DataType::String),
                ],
            ),
        ],
        vec![
            relationship("customers", &["id"], "orders", &["customer_id"]),
            relationship("products", &["product_code"], "orders", &["product_code"]),
        ],
        vec![
            metric_kpi("total_revenue", "orders", "revenue", Aggregation::Sum),
            metric_kpi("total_cost", "orders", "production_cost", Aggregation::Sum),
            binary_kpi("total_profit", "total_revenue", Arithmetic::Sub, "total_cost"),
            binary_kpi("profit_margin", "total_profit", Arithmetic::Div, "total_revenue"),
        ],
        vec![
            NamedFilter {
                name: "high_value_customers".to_string(),
                predicate: FilterPredicate::Column {
                    table: "orders".to_string(),
                    column: "revenue".to_string(),
                    comparator: Comparator::GreaterThan,
                    value: json!(1000),
                },
                description: String::new(),
            },
            NamedFilter {
                name: "target_regions".to_string(),
                predicate: FilterPredicate::Column {
                    table: "customers".to_string(),
                    column: "region".to_string(),
                    comparator: Comparator::In,
                    value: json!(["North", "East", "West"]),
                },
                description: String::new(),
            },
        ],
    )
    .expect("commerce fixture must validate")
}
