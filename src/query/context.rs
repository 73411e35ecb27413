//! Per-query pipeline state, errors and outputs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::query::resolved::ResolvedMeasure;
use crate::sql_ast::SqlQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    StructureValidation,
    ReferenceValidation,
    JoinPathValidation,
    Resolution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::StructureValidation => "structure_validation",
            Stage::ReferenceValidation => "reference_validation",
            Stage::JoinPathValidation => "join_path_validation",
            Stage::Resolution => "resolution",
        };
        f.write_str(name)
    }
}

/// A caller-correctable problem with a submitted query. Errors accumulate
/// within a stage so the caller can fix several issues in one round trip.
#[derive(Debug, Clone, Serialize)]
pub struct QueryError {
    pub stage: Stage,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl QueryError {
    pub(crate) fn new(stage: Stage, code: &'static str, message: impl Into<String>) -> Self {
        QueryError {
            stage,
            code,
            message: message.into(),
            hint: None,
        }
    }

    pub(crate) fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Mutable state threaded through one query compilation and discarded after.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// Every table touched by the resolved query.
    pub tables: BTreeSet<String>,
    /// The FROM target all other tables join to.
    pub common_table: Option<String>,
    /// Ordered join edges, incoming -> outgoing, deduplicated.
    pub joins: Vec<(String, String)>,
    pub requires_cte: bool,
    /// Measures deduplicated by structural identity; these become select items.
    pub unique_measures: Vec<ResolvedMeasure>,
    pub window_measures: Vec<ResolvedMeasure>,
    /// Windowed measure name -> inner alias of its unwindowed twin.
    pub window_measure_map: BTreeMap<String, String>,
    pub warnings: Vec<String>,
    pub trace: Vec<String>,
}

impl QueryContext {
    /// Append to the human-readable trace and mirror it to the log.
    pub(crate) fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(target: "semaquery", "{message}");
        self.trace.push(message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: "semaquery", "{message}");
        self.warnings.push(message);
    }
}

/// Outcome of a compilation: SQL plus the context trace on success, an
/// ordered error list and no partial SQL on failure.
#[derive(Debug)]
pub struct CompileOutput {
    pub query: Option<SqlQuery>,
    pub sql: Option<String>,
    pub errors: Vec<QueryError>,
    pub context: QueryContext,
}

impl CompileOutput {
    pub(crate) fn failure(errors: Vec<QueryError>, context: QueryContext) -> Self {
        CompileOutput {
            query: None,
            sql: None,
            errors,
            context,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
