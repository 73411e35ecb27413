//! Query compilation pipeline.
//!
//! `QueryCompiler` sequences validation, resolution, planning and SQL
//! rendering, short-circuiting on the first stage that reports errors. Each
//! run owns its own `QueryContext`; the semantic model is only read, so one
//! compiler can serve many queries.

pub mod context;
pub mod planner;
pub mod request;
pub mod resolved;
pub mod resolver;
pub mod validator;

use crate::compiler::SqlCompiler;
use crate::dialect::{Dialect, DuckDbDialect};
use crate::error::Result;
use crate::models::SemanticModel;

pub use context::{CompileOutput, QueryContext, QueryError, Stage};
pub use request::QueryRequest;

pub struct QueryCompiler {
    model: SemanticModel,
    dialect: Box<dyn Dialect + Send + Sync>,
}

impl QueryCompiler {
    /// Compile against the default DuckDB dialect.
    pub fn new(model: SemanticModel) -> Self {
        Self::with_dialect(model, Box::new(DuckDbDialect))
    }

    pub fn with_dialect(model: SemanticModel, dialect: Box<dyn Dialect + Send + Sync>) -> Self {
        QueryCompiler { model, dialect }
    }

    pub fn model(&self) -> &SemanticModel {
        &self.model
    }

    /// Run the full pipeline. Caller-correctable problems come back in
    /// `CompileOutput::errors`; an `Err` means the pipeline itself misbehaved.
    pub fn compile(&self, request: &QueryRequest) -> Result<CompileOutput> {
        let mut ctx = QueryContext::default();

        let errors = validator::validate_structure(request, &mut ctx);
        if !errors.is_empty() {
            return Ok(CompileOutput::failure(errors, ctx));
        }

        let errors = validator::validate_references(request, &self.model, &mut ctx);
        if !errors.is_empty() {
            return Ok(CompileOutput::failure(errors, ctx));
        }

        let resolved = resolver::resolve(request, &self.model, &mut ctx)?;

        let errors = validator::validate_join_path(&self.model, &mut ctx);
        if !errors.is_empty() {
            return Ok(CompileOutput::failure(errors, ctx));
        }

        let errors = planner::analyse_context(&resolved, &mut ctx, &self.model)?;
        if !errors.is_empty() {
            return Ok(CompileOutput::failure(errors, ctx));
        }

        let query = planner::plan(&resolved, &mut ctx, &self.model)?;
        let sql = SqlCompiler::new(self.dialect.as_ref()).compile(&query)?;
        ctx.note("compiled query to SQL");

        Ok(CompileOutput {
            query: Some(query),
            sql: Some(sql),
            errors: Vec::new(),
            context: ctx,
        })
    }
}
