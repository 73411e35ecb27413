pub mod compiler;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod models;
pub mod query;
pub mod registry;
pub mod sql_ast;

pub use compiler::SqlCompiler;
pub use error::{Result, SemaQueryError};
pub use executor::{QueryExecutor, ResultSet};
pub use models::SemanticModel;
pub use query::{CompileOutput, QueryCompiler, QueryContext, QueryError, QueryRequest, Stage};
pub use registry::ModelRegistry;
