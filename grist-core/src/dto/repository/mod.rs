//! Repository DTOs

use serde::{Deserialize, Serialize};

use crate::domain::repository::Parameter;

/// Request to create a new repository, optionally bulk-loading records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepository {
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub parameters: Vec<Parameter>,
    /// Initial rows to ingest; `data_ready` flips once they are stored.
    #[serde(default)]
    pub records: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Request to update repository metadata
///
/// The parameter schema is immutable after creation; only descriptive
/// fields can change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRepository {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}
