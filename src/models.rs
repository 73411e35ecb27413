//! Semantic model definitions.
//!
//! Tables, relationships, KPIs and named filters are declared up front and
//! validated once when the model is constructed. Query compilation only ever
//! reads the model, so a validated model can be shared across queries.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SemaQueryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Date,
    String,
    Numeric,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeGrain {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
}

impl Comparator {
    pub fn sql(&self) -> &'static str {
        match self {
            Comparator::Equal => "=",
            Comparator::NotEqual => "!=",
            Comparator::LessThan => "<",
            Comparator::GreaterThan => ">",
            Comparator::LessThanOrEqual => "<=",
            Comparator::GreaterThanOrEqual => ">=",
            Comparator::In => "IN",
            Comparator::NotIn => "NOT IN",
            Comparator::IsNull => "IS NULL",
            Comparator::IsNotNull => "IS NOT NULL",
            Comparator::Like => "LIKE",
            Comparator::NotLike => "NOT LIKE",
        }
    }

    /// IS NULL and IS NOT NULL compare against nothing.
    pub fn is_unary(&self) -> bool {
        matches!(self, Comparator::IsNull | Comparator::IsNotNull)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    CountDistinct,
    Min,
    Max,
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Arithmetic {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
}

impl Arithmetic {
    pub fn sql(&self) -> &'static str {
        match self {
            Arithmetic::Add => "+",
            Arithmetic::Sub => "-",
            Arithmetic::Mul => "*",
            Arithmetic::Div => "/",
            Arithmetic::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sorting {
    Asc,
    Desc,
}

impl Default for Sorting {
    fn default() -> Self {
        Sorting::Asc
    }
}

impl Sorting {
    pub fn sql(&self) -> &'static str {
        match self {
            Sorting::Asc => "ASC",
            Sorting::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    OneToMany,
    ManyToMany,
}

impl Default for RelationshipType {
    fn default() -> Self {
        RelationshipType::OneToMany
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<SemanticColumn>,
    #[serde(default)]
    pub description: String,
}

/// Directed edge between two tables. The incoming table is the "one" side of
/// a one-to-many relationship; the join keys are positional pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub incoming: String,
    pub keys_incoming: Vec<String>,
    #[serde(rename = "type", default)]
    pub relationship_type: RelationshipType,
    pub outgoing: String,
    pub keys_outgoing: Vec<String>,
}

/// A KPI is either a direct aggregation or an arithmetic combination of two
/// other KPIs referenced by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KpiExpression {
    Metric {
        table: String,
        column: String,
        aggregation: Aggregation,
    },
    Binary {
        left: String,
        operator: Arithmetic,
        right: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kpi {
    pub name: String,
    pub expression: KpiExpression,
    #[serde(default)]
    pub description: String,
    pub return_type: DataType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterPredicate {
    /// Compares a column against a literal; becomes a WHERE predicate.
    Column {
        table: String,
        column: String,
        comparator: Comparator,
        #[serde(default)]
        value: Value,
    },
    /// Compares a KPI against a numeric threshold; becomes a HAVING predicate.
    Kpi {
        kpi: String,
        comparator: Comparator,
        value: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedFilter {
    pub name: String,
    pub predicate: FilterPredicate,
    #[serde(default)]
    pub description: String,
}

/// The validated semantic model: table registry, relationship graph, KPIs and
/// named filters. Construction runs every structural check, so a
/// `SemanticModel` value is always internally consistent.
#[derive(Debug, Clone)]
pub struct SemanticModel {
    tables: Vec<Table>,
    relationships: Vec<Relationship>,
    kpis: Vec<Kpi>,
    filters: Vec<NamedFilter>,
}

impl SemanticModel {
    /// Build and validate a model. All structural violations are collected and
    /// reported together rather than failing on the first one.
    pub fn new(
        tables: Vec<Table>,
        relationships: Vec<Relationship>,
        kpis: Vec<Kpi>,
        filters: Vec<NamedFilter>,
    ) -> Result<Self> {
        let model = SemanticModel {
            tables,
            relationships,
            kpis,
            filters,
        };
        let issues = model.validate();
        if issues.is_empty() {
            Ok(model)
        } else {
            Err(SemaQueryError::Model { issues })
        }
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn kpis(&self) -> &[Kpi] {
        &self.kpis
    }

    pub fn filters(&self) -> &[NamedFilter] {
        &self.filters
    }

    pub fn get_kpi(&self, name: &str) -> Result<&Kpi> {
        let mut matches = self.kpis.iter().filter(|k| k.name == name);
        match (matches.next(), matches.next()) {
            (Some(kpi), None) => Ok(kpi),
            (Some(_), Some(_)) => Err(SemaQueryError::DuplicateEntity {
                kind: "kpi",
                name: name.to_string(),
            }),
            (None, _) => Err(SemaQueryError::MissingEntity {
                kind: "kpi",
                name: name.to_string(),
            }),
        }
    }

    pub fn get_filter(&self, name: &str) -> Result<&NamedFilter> {
        let mut matches = self.filters.iter().filter(|f| f.name == name);
        match (matches.next(), matches.next()) {
            (Some(filter), None) => Ok(filter),
            (Some(_), Some(_)) => Err(SemaQueryError::DuplicateEntity {
                kind: "filter",
                name: name.to_string(),
            }),
            (None, _) => Err(SemaQueryError::MissingEntity {
                kind: "filter",
                name: name.to_string(),
            }),
        }
    }

    pub fn field_exists(&self, table: &str, column: &str) -> bool {
        self.column_type(table, column).is_some()
    }

    pub fn column_type(&self, table: &str, column: &str) -> Option<DataType> {
        self.tables
            .iter()
            .find(|t| t.name == table)?
            .columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.data_type)
    }

    /// Adjacency map over the relationship list. Every declared table appears
    /// as a key, even with no edges. Directed edges run incoming -> outgoing;
    /// the undirected view adds the reverse edge for reachability walks.
    pub fn get_relationship_graph(&self, directed: bool) -> BTreeMap<String, Vec<String>> {
        let mut graph: BTreeMap<String, Vec<String>> = self
            .tables
            .iter()
            .map(|t| (t.name.clone(), Vec::new()))
            .collect();
        for rel in &self.relationships {
            if let Some(neighbours) = graph.get_mut(&rel.incoming) {
                neighbours.push(rel.outgoing.clone());
            }
            if !directed {
                if let Some(neighbours) = graph.get_mut(&rel.outgoing) {
                    neighbours.push(rel.incoming.clone());
                }
            }
        }
        graph
    }

    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.tables.is_empty() {
            issues.push("model must declare at least one table".to_string());
            return issues;
        }

        let columns_by_table: BTreeMap<&str, BTreeSet<&str>> = self
            .tables
            .iter()
            .map(|t| {
                (
                    t.name.as_str(),
                    t.columns.iter().map(|c| c.name.as_str()).collect(),
                )
            })
            .collect();

        for rel in &self.relationships {
            self.validate_relationship(rel, &columns_by_table, &mut issues);
        }

        // Graph shape checks only make sense once the endpoints are known good.
        if issues.is_empty() {
            if let Some(table) = self.find_cycle() {
                issues.push(format!("relationship cycle detected at table '{table}'"));
            }
            issues.extend(self.check_connectivity());
        }

        self.validate_kpis(&mut issues);
        self.validate_filters(&columns_by_table, &mut issues);

        issues
    }

    fn validate_relationship(
        &self,
        rel: &Relationship,
        columns_by_table: &BTreeMap<&str, BTreeSet<&str>>,
        issues: &mut Vec<String>,
    ) {
        if rel.relationship_type == RelationshipType::ManyToMany {
            issues.push(format!(
                "relationship '{}' -> '{}' is MANY_TO_MANY, which is not supported",
                rel.incoming, rel.outgoing
            ));
        }
        for (table, keys) in [
            (&rel.incoming, &rel.keys_incoming),
            (&rel.outgoing, &rel.keys_outgoing),
        ] {
            match columns_by_table.get(table.as_str()) {
                None => issues.push(format!(
                    "relationship '{}' -> '{}' references unknown table '{table}'",
                    rel.incoming, rel.outgoing
                )),
                Some(columns) => {
                    for key in keys.iter() {
                        if !columns.contains(key.as_str()) {
                            issues.push(format!(
                                "relationship '{}' -> '{}' references unknown column '{table}.{key}'",
                                rel.incoming, rel.outgoing
                            ));
                        }
                    }
                }
            }
        }
        if rel.keys_incoming.is_empty() {
            issues.push(format!(
                "relationship '{}' -> '{}' must declare at least one join key",
                rel.incoming, rel.outgoing
            ));
        } else if rel.keys_incoming.len() != rel.keys_outgoing.len() {
            issues.push(format!(
                "relationship '{}' -> '{}' has mismatched join key lists ({} vs {})",
                rel.incoming,
                rel.outgoing,
                rel.keys_incoming.len(),
                rel.keys_outgoing.len()
            ));
        }
    }

    /// DFS with an explicit recursion stack over the directed graph. Returns
    /// the table at which the first back-edge closes, if any.
    fn find_cycle(&self) -> Option<String> {
        let graph = self.get_relationship_graph(true);
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut on_stack: BTreeSet<&str> = BTreeSet::new();

        fn walk<'a>(
            node: &'a str,
            graph: &'a BTreeMap<String, Vec<String>>,
            visited: &mut BTreeSet<&'a str>,
            on_stack: &mut BTreeSet<&'a str>,
        ) -> Option<String> {
            visited.insert(node);
            on_stack.insert(node);
            if let Some(neighbours) = graph.get(node) {
                for next in neighbours {
                    if on_stack.contains(next.as_str()) {
                        return Some(next.clone());
                    }
                    if !visited.contains(next.as_str()) {
                        if let Some(found) = walk(next, graph, visited, on_stack) {
                            return Some(found);
                        }
                    }
                }
            }
            on_stack.remove(node);
            None
        }

        for table in graph.keys() {
            if !visited.contains(table.as_str()) {
                if let Some(found) = walk(table, &graph, &mut visited, &mut on_stack) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// BFS over the undirected graph from an arbitrary table; every table must
    /// be reached.
    fn check_connectivity(&self) -> Vec<String> {
        if self.tables.len() < 2 {
            return Vec::new();
        }
        let graph = self.get_relationship_graph(false);
        let start = self.tables[0].name.as_str();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue = std::collections::VecDeque::new();
        seen.insert(start);
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            if let Some(neighbours) = graph.get(current) {
                for next in neighbours {
                    if seen.insert(next.as_str()) {
                        queue.push_back(next.as_str());
                    }
                }
            }
        }
        self.tables
            .iter()
            .filter(|t| !seen.contains(t.name.as_str()))
            .map(|t| {
                format!(
                    "table '{}' is not connected to the rest of the model",
                    t.name
                )
            })
            .collect()
    }

    fn validate_kpis(&self, issues: &mut Vec<String>) {
        for kpi in &self.kpis {
            match &kpi.expression {
                KpiExpression::Metric { table, column, .. } => {
                    if !self.field_exists(table, column) {
                        issues.push(format!(
                            "kpi '{}' references unknown column '{table}.{column}'",
                            kpi.name
                        ));
                    }
                }
                KpiExpression::Binary { left, right, .. } => {
                    for operand in [left, right] {
                        if !self.kpis.iter().any(|k| k.name == *operand) {
                            issues.push(format!(
                                "kpi '{}' references unknown kpi '{operand}'",
                                kpi.name
                            ));
                        }
                    }
                }
            }
        }
        // Derived KPIs reference each other by name, so a dependency cycle is
        // possible even though the expressions themselves cannot nest.
        for kpi in &self.kpis {
            let mut trail: Vec<&str> = Vec::new();
            if self.kpi_has_cycle(&kpi.name, &mut trail) {
                issues.push(format!("kpi '{}' has a cyclic dependency", kpi.name));
                break;
            }
        }
    }

    fn kpi_has_cycle<'a>(&'a self, name: &'a str, trail: &mut Vec<&'a str>) -> bool {
        if trail.contains(&name) {
            return true;
        }
        let Some(kpi) = self.kpis.iter().find(|k| k.name == name) else {
            return false;
        };
        if let KpiExpression::Binary { left, right, .. } = &kpi.expression {
            trail.push(name);
            let found = self.kpi_has_cycle(left, trail) || self.kpi_has_cycle(right, trail);
            trail.pop();
            return found;
        }
        false
    }

    fn validate_filters(
        &self,
        columns_by_table: &BTreeMap<&str, BTreeSet<&str>>,
        issues: &mut Vec<String>,
    ) {
        for filter in &self.filters {
            match &filter.predicate {
                FilterPredicate::Column { table, column, .. } => {
                    let known = columns_by_table
                        .get(table.as_str())
                        .is_some_and(|cols| cols.contains(column.as_str()));
                    if !known {
                        issues.push(format!(
                            "filter '{}' references unknown column '{table}.{column}'",
                            filter.name
                        ));
                    }
                }
                FilterPredicate::Kpi { kpi, .. } => {
                    if !self.kpis.iter().any(|k| k.name == *kpi) {
                        issues.push(format!(
                            "filter '{}' references unknown kpi '{kpi}'",
                            filter.name
                        ));
                    }
                }
            }
        }
    }
}
