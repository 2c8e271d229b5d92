//! Repository domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A managed dataset with a declared parameter schema
///
/// Structure shared between the orchestrator (persists) and the engine
/// (reads schema and version). `version` increments by 1 on every record
/// create/update/delete; the engine never bumps it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub version: i32,
    pub parameters: Vec<Parameter>,
    pub current_data_size: i64,
    pub original_data_size: i64,
    pub data_ready: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One declared column of a repository's schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
}

/// Declared runtime type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
}

impl std::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterKind::String => write!(f, "string"),
            ParameterKind::Number => write!(f, "number"),
        }
    }
}
