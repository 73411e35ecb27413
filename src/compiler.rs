//! SQL text generation.
//!
//! `SqlCompiler` is a pure function from the SQL AST to SQL text for one
//! dialect; compiling the same tree twice yields byte-identical output.

use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::{Result, SemaQueryError};
use crate::models::Comparator;
use crate::query::request::{ChangeMode, MovingAverageMode, Window};
use crate::sql_ast::{
    SelectItem, SqlExpr, SqlJoin, SqlOrderBy, SqlPredicate, SqlQuery, SqlSource, CTE_NAME,
};

pub struct SqlCompiler<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlCompiler<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn compile(&self, query: &SqlQuery) -> Result<String> {
        match &query.from {
            SqlSource::Table(_) => self.render_query(query, None),
            SqlSource::Query(inner) => {
                if inner.is_staged() {
                    return Err(SemaQueryError::Sql(
                        "nested staging queries are not supported".to_string(),
                    ));
                }
                let inner_sql = self.render_query(inner, None)?;
                self.render_query(query, Some(inner_sql))
            }
        }
    }

    /// Render one SELECT. When `cte_body` is set, the query reads from the
    /// staging subquery instead of a table.
    fn render_query(&self, query: &SqlQuery, cte_body: Option<String>) -> Result<String> {
        let select_items: Vec<String> = query
            .select
            .iter()
            .map(|item| self.render_select_item(item))
            .collect();

        let mut sql = match cte_body {
            Some(inner) => format!(
                "WITH {cte} AS ({inner}) SELECT {items} FROM {cte}",
                cte = self.dialect.quote_ident(CTE_NAME),
                items = select_items.join(", ")
            ),
            None => {
                let table = match &query.from {
                    SqlSource::Table(name) => self.dialect.quote_ident(name),
                    SqlSource::Query(_) => {
                        return Err(SemaQueryError::Sql(
                            "staging query rendered without a body".to_string(),
                        ))
                    }
                };
                format!("SELECT {} FROM {table}", select_items.join(", "))
            }
        };

        for join in &query.joins {
            sql.push(' ');
            sql.push_str(&self.render_join(join));
        }

        if let Some(filter) = &query.filter {
            sql.push_str(&format!(" WHERE {}", self.render_predicate(filter)));
        }

        if !query.group_by.is_empty() {
            let groups: Vec<String> = query.group_by.iter().map(|g| self.render_expr(g)).collect();
            sql.push_str(&format!(" GROUP BY {}", groups.join(", ")));
        }

        if let Some(having) = &query.having {
            sql.push_str(&format!(" HAVING {}", self.render_predicate(having)));
        }

        if !query.order_by.is_empty() {
            let orders: Vec<String> = query
                .order_by
                .iter()
                .map(|o| self.render_order_by(o))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok(sql)
    }

    fn render_select_item(&self, item: &SelectItem) -> String {
        format!(
            "{} AS {}",
            self.render_expr(&item.expr),
            self.dialect.quote_ident(&item.alias)
        )
    }

    fn render_join(&self, join: &SqlJoin) -> String {
        let conditions: Vec<String> = join
            .left_keys
            .iter()
            .zip(join.right_keys.iter())
            .map(|(left, right)| {
                format!(
                    "{}.{} = {}.{}",
                    self.dialect.quote_ident(&join.left_table),
                    self.dialect.quote_ident(left),
                    self.dialect.quote_ident(&join.right_table),
                    self.dialect.quote_ident(right)
                )
            })
            .collect();
        format!(
            "LEFT JOIN {} ON {}",
            self.dialect.quote_ident(&join.right_table),
            conditions.join(" AND ")
        )
    }

    fn render_expr(&self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Column { table, name } => self.render_column(table.as_deref(), name),
            SqlExpr::TimeGrainColumn { grain, table, name } => self
                .dialect
                .render_time_grain(grain, &self.render_column(Some(table), name)),
            SqlExpr::Aggregate {
                aggregation,
                table,
                column,
            } => self
                .dialect
                .render_aggregation(aggregation, &self.render_column(Some(table), column)),
            SqlExpr::Binary {
                left,
                operator,
                right,
            } => format!(
                "({} {} {})",
                self.render_expr(left),
                operator.sql(),
                self.render_expr(right)
            ),
            SqlExpr::Window {
                field,
                partition_by,
                order_by,
                window,
            } => self.render_window(field, partition_by, order_by, window),
        }
    }

    fn render_column(&self, table: Option<&str>, name: &str) -> String {
        match table {
            Some(table) => format!(
                "{}.{}",
                self.dialect.quote_ident(table),
                self.dialect.quote_ident(name)
            ),
            None => self.dialect.quote_ident(name),
        }
    }

    fn render_window(
        &self,
        field: &str,
        partition_by: &[SqlExpr],
        order_by: &[SqlOrderBy],
        window: &Window,
    ) -> String {
        let field = self.dialect.quote_ident(field);

        let mut over_parts = Vec::new();
        if !partition_by.is_empty() {
            let parts: Vec<String> = partition_by.iter().map(|e| self.render_expr(e)).collect();
            over_parts.push(format!("PARTITION BY {}", parts.join(", ")));
        }
        if !order_by.is_empty() {
            let parts: Vec<String> = order_by.iter().map(|o| self.render_order_by(o)).collect();
            over_parts.push(format!("ORDER BY {}", parts.join(", ")));
        }
        let over = over_parts.join(" ");

        match window {
            Window::Change { period, mode } => {
                let lag = format!("LAG({field}, {period}) OVER ({over})");
                match mode {
                    ChangeMode::Absolute => format!("({field} - {lag})"),
                    // NULLIF guards the divide when the prior value is zero.
                    ChangeMode::Percentage => {
                        format!("(({field} - {lag}) / NULLIF({lag}, 0) * 100)")
                    }
                }
            }
            Window::MovingAverage { period, mode } => {
                let span = period.saturating_sub(1);
                let frame = match mode {
                    MovingAverageMode::Behind => {
                        format!("ROWS BETWEEN {span} PRECEDING AND CURRENT ROW")
                    }
                    MovingAverageMode::Ahead => {
                        format!("ROWS BETWEEN CURRENT ROW AND {span} FOLLOWING")
                    }
                    MovingAverageMode::Centered => {
                        let before = span / 2;
                        let after = span - before;
                        format!("ROWS BETWEEN {before} PRECEDING AND {after} FOLLOWING")
                    }
                };
                if over.is_empty() {
                    format!("AVG({field}) OVER ({frame})")
                } else {
                    format!("AVG({field}) OVER ({over} {frame})")
                }
            }
        }
    }

    fn render_predicate(&self, predicate: &SqlPredicate) -> String {
        match predicate {
            SqlPredicate::Comparison {
                table,
                column,
                comparator,
                value,
            } => self.render_comparison(&self.render_column(Some(table), column), comparator, value),
            SqlPredicate::ColumnComparison {
                left_table,
                left_column,
                comparator,
                right_table,
                right_column,
            } => format!(
                "{} {} {}",
                self.render_column(Some(left_table), left_column),
                comparator.sql(),
                self.render_column(Some(right_table), right_column)
            ),
            SqlPredicate::MetricComparison {
                metric,
                comparator,
                value,
            } => self.render_comparison(&self.render_expr(metric), comparator, value),
            SqlPredicate::And(predicates) => {
                let parts: Vec<String> =
                    predicates.iter().map(|p| self.render_predicate(p)).collect();
                format!("({})", parts.join(" AND "))
            }
            SqlPredicate::Or(predicates) => {
                let parts: Vec<String> =
                    predicates.iter().map(|p| self.render_predicate(p)).collect();
                format!("({})", parts.join(" OR "))
            }
            SqlPredicate::Not(inner) => format!("NOT ({})", self.render_predicate(inner)),
        }
    }

    fn render_comparison(&self, target: &str, comparator: &Comparator, value: &Value) -> String {
        if comparator.is_unary() {
            return format!("{target} {}", comparator.sql());
        }
        match comparator {
            Comparator::In | Comparator::NotIn => {
                format!("{target} {} ({})", comparator.sql(), self.render_value_list(value))
            }
            _ => format!(
                "{target} {} {}",
                comparator.sql(),
                self.dialect.render_literal(value)
            ),
        }
    }

    fn render_value_list(&self, value: &Value) -> String {
        match value {
            Value::Array(items) => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|v| self.dialect.render_literal(v))
                    .collect();
                rendered.join(", ")
            }
            other => self.dialect.render_literal(other),
        }
    }

    fn render_order_by(&self, order: &SqlOrderBy) -> String {
        format!(
            "{} {}",
            self.render_expr(&order.expr),
            order.direction.sql()
        )
    }
}
