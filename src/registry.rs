//! Semantic model loading.
//!
//! Declarative definitions live in a directory of YAML files:
//!
//! ```text
//! model/
//!   tables/*.yml         one table per file
//!   kpis/*.yml           one KPI per file (optional)
//!   filters/*.yml        one named filter per file (optional)
//!   relationships.yml    list of relationships (optional)
//! ```
//!
//! The registry is just the raw definitions; `build` hands them to
//! `SemanticModel::new`, which runs every structural check.

use std::fs;
use std::path::Path;

use glob::glob;
use serde::de::DeserializeOwned;

use crate::error::{Result, SemaQueryError};
use crate::models::{Kpi, NamedFilter, Relationship, SemanticModel, Table};

#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    pub tables: Vec<Table>,
    pub relationships: Vec<Relationship>,
    pub kpis: Vec<Kpi>,
    pub filters: Vec<NamedFilter>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        tables: Vec<Table>,
        relationships: Vec<Relationship>,
        kpis: Vec<Kpi>,
        filters: Vec<NamedFilter>,
    ) -> Self {
        ModelRegistry {
            tables,
            relationships,
            kpis,
            filters,
        }
    }

    pub fn load_from_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let mut registry = ModelRegistry::new();

        let tables_dir = root.join("tables");
        if !tables_dir.exists() {
            return Err(SemaQueryError::Model {
                issues: vec![format!(
                    "tables directory not found: {}",
                    tables_dir.display()
                )],
            });
        }
        registry.tables = load_each(&tables_dir)?;
        registry.kpis = load_each(&root.join("kpis"))?;
        registry.filters = load_each(&root.join("filters"))?;

        for name in ["relationships.yml", "relationships.yaml"] {
            let path = root.join(name);
            if path.exists() {
                let contents = fs::read_to_string(&path)?;
                registry.relationships = serde_yaml::from_str(&contents)?;
                break;
            }
        }

        Ok(registry)
    }

    /// Validate the loaded definitions into a usable model.
    pub fn build(self) -> Result<SemanticModel> {
        SemanticModel::new(self.tables, self.relationships, self.kpis, self.filters)
    }
}

/// Deserialize one value from every `*.yml`/`*.yaml` file in a directory.
fn load_each<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut values = Vec::new();
    if !dir.exists() {
        return Ok(values);
    }
    for pattern in ["yml", "yaml"] {
        for entry in glob(&format!("{}/*.{pattern}", dir.display()))
            .map_err(|e| SemaQueryError::Other(e.into()))?
            .flatten()
        {
            let contents = fs::read_to_string(&entry)?;
            values.push(serde_yaml::from_str(&contents)?);
        }
    }
    Ok(values)
}
