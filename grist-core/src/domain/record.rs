//! Record domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of a repository's data, typed per the schema
///
/// `data` keys are a subset of the owning repository's parameters; each
/// value's runtime type must match the declared parameter type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub repository_id: Uuid,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
