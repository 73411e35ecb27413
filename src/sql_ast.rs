//! SQL abstract syntax tree.
//!
//! The planner assembles these nodes and the compiler renders them. The
//! expression and predicate sets are closed enums so the compiler can match
//! exhaustively; adding a variant is a compile error until every renderer
//! handles it.

use serde_json::Value;

use crate::models::{Aggregation, Arithmetic, Comparator, Sorting, TimeGrain};
use crate::query::request::Window;

/// Alias used for the single staging subquery when a query compiles through a
/// common-table-expression.
pub const CTE_NAME: &str = "cte";

#[derive(Debug, Clone, PartialEq)]
pub enum SqlSource {
    Table(String),
    /// A nested query, rendered as a WITH-clause. At most one level deep.
    Query(Box<SqlQuery>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub alias: String,
    pub expr: SqlExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column {
        table: Option<String>,
        name: String,
    },
    TimeGrainColumn {
        grain: TimeGrain,
        table: String,
        name: String,
    },
    Aggregate {
        aggregation: Aggregation,
        table: String,
        column: String,
    },
    Binary {
        left: Box<SqlExpr>,
        operator: Arithmetic,
        right: Box<SqlExpr>,
    },
    Window {
        /// Name of the already-aggregated column the window reads.
        field: String,
        partition_by: Vec<SqlExpr>,
        order_by: Vec<SqlOrderBy>,
        window: Window,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlPredicate {
    Comparison {
        table: String,
        column: String,
        comparator: Comparator,
        value: Value,
    },
    ColumnComparison {
        left_table: String,
        left_column: String,
        comparator: Comparator,
        right_table: String,
        right_column: String,
    },
    /// Aggregate-valued comparison; only valid in HAVING position.
    MetricComparison {
        metric: Box<SqlExpr>,
        comparator: Comparator,
        value: Value,
    },
    And(Vec<SqlPredicate>),
    Or(Vec<SqlPredicate>),
    Not(Box<SqlPredicate>),
}

/// One LEFT join: `LEFT JOIN right ON left.k = right.k [AND ..]`, with the
/// key lists zipped positionally.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlJoin {
    pub left_table: String,
    pub left_keys: Vec<String>,
    pub right_table: String,
    pub right_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlOrderBy {
    pub expr: SqlExpr,
    pub direction: Sorting,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub from: SqlSource,
    pub select: Vec<SelectItem>,
    pub joins: Vec<SqlJoin>,
    pub filter: Option<SqlPredicate>,
    pub group_by: Vec<SqlExpr>,
    pub having: Option<SqlPredicate>,
    pub order_by: Vec<SqlOrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SqlQuery {
    /// An empty query over a plain table.
    pub fn from_table(table: impl Into<String>) -> Self {
        SqlQuery {
            from: SqlSource::Table(table.into()),
            select: Vec::new(),
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn is_staged(&self) -> bool {
        matches!(self.from, SqlSource::Query(_))
    }
}
