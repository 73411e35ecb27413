use thiserror::Error;

pub type Result<T> = std::result::Result<T, SemaQueryError>;

#[derive(Debug, Error)]
pub enum SemaQueryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid semantic model: {}", issues.join("; "))]
    Model { issues: Vec<String> },
    #[error("no matching {kind} named '{name}' in the semantic model")]
    MissingEntity { kind: &'static str, name: String },
    #[error("more than one {kind} named '{name}' in the semantic model")]
    DuplicateEntity { kind: &'static str, name: String },
    #[error("sql generation error: {0}")]
    Sql(String),
    #[error("internal consistency error: {0}")]
    Internal(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
