//! Record DTOs

use serde::{Deserialize, Serialize};

/// Request to create a record in a repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecord {
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Request to replace a record's data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub data: serde_json::Map<String, serde_json::Value>,
}
