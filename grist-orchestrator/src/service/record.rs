//! Record Service
//!
//! CRUD rules for dataset rows. Every mutation bumps the owning
//! repository's version; that bump is what makes stale process iterations
//! detectable.

use chrono::Utc;
use grist_core::domain::record::Record;
use grist_core::domain::repository::{Parameter, ParameterKind};
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::{records, repositories};

/// Service error type
#[derive(Debug)]
pub enum RecordError {
    NotFound(Uuid),
    RepositoryNotFound(Uuid),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for RecordError {
    fn from(err: sqlx::Error) -> Self {
        RecordError::DatabaseError(err)
    }
}

/// Create a record and bump the repository version
pub async fn create(
    pool: &PgPool,
    repository_id: Uuid,
    data: serde_json::Map<String, serde_json::Value>,
) -> Result<Record, RecordError> {
    let repository = repositories::find_by_id(pool, repository_id)
        .await?
        .ok_or(RecordError::RepositoryNotFound(repository_id))?;

    validate_record_data(&repository.parameters, &data)
        .map_err(RecordError::ValidationError)?;

    let version = repositories::bump_version(pool, repository_id, 1).await?;

    let now = Utc::now();
    let record = Record {
        id: Uuid::new_v4(),
        repository_id,
        data,
        version,
        created_at: now,
        updated_at: now,
    };
    records::create(pool, &record).await?;

    tracing::info!(
        "Record {} created in repository {} (version {})",
        record.id,
        repository_id,
        version
    );

    Ok(record)
}

/// Get a record by ID
pub async fn get(pool: &PgPool, id: Uuid) -> Result<Record, RecordError> {
    let record = records::find_by_id(pool, id)
        .await?
        .ok_or(RecordError::NotFound(id))?;

    Ok(record)
}

/// List one page of a repository's records
pub async fn list(
    pool: &PgPool,
    repository_id: Uuid,
    offset: i64,
    limit: i64,
) -> Result<(Vec<Record>, i64), RecordError> {
    let _repository = repositories::find_by_id(pool, repository_id)
        .await?
        .ok_or(RecordError::RepositoryNotFound(repository_id))?;

    let page = records::list_page(pool, repository_id, offset, limit).await?;
    let total = records::count_for_repository(pool, repository_id).await?;

    Ok((page, total))
}

/// Replace a record's data and bump the repository version
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    data: serde_json::Map<String, serde_json::Value>,
) -> Result<Record, RecordError> {
    let record = records::find_by_id(pool, id)
        .await?
        .ok_or(RecordError::NotFound(id))?;

    let repository = repositories::find_by_id(pool, record.repository_id)
        .await?
        .ok_or(RecordError::RepositoryNotFound(record.repository_id))?;

    validate_record_data(&repository.parameters, &data)
        .map_err(RecordError::ValidationError)?;

    let version = repositories::bump_version(pool, record.repository_id, 0).await?;
    records::update(pool, id, &data, version).await?;

    let updated = records::find_by_id(pool, id)
        .await?
        .ok_or(RecordError::NotFound(id))?;

    Ok(updated)
}

/// Delete a record and bump the repository version
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), RecordError> {
    let record = records::find_by_id(pool, id)
        .await?
        .ok_or(RecordError::NotFound(id))?;

    records::delete(pool, id).await?;
    repositories::bump_version(pool, record.repository_id, -1).await?;

    tracing::info!(
        "Record {} deleted from repository {}",
        id,
        record.repository_id
    );

    Ok(())
}

// =============================================================================
// Validation
// =============================================================================

/// Check that `data` keys are a subset of the schema and each value's
/// runtime type matches its declared parameter type.
pub(crate) fn validate_record_data(
    schema: &[Parameter],
    data: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), String> {
    for (key, value) in data {
        let parameter = schema
            .iter()
            .find(|p| p.name == *key)
            .ok_or_else(|| format!("Unknown parameter '{}'", key))?;

        if value.is_null() {
            continue;
        }

        let matches = match parameter.kind {
            ParameterKind::String => value.is_string(),
            ParameterKind::Number => value.is_number(),
        };
        if !matches {
            return Err(format!(
                "Value for '{}' does not match declared type {}",
                key, parameter.kind
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<Parameter> {
        vec![
            Parameter {
                name: "status".to_string(),
                kind: ParameterKind::String,
            },
            Parameter {
                name: "amount".to_string(),
                kind: ParameterKind::Number,
            },
        ]
    }

    fn data(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_valid_data_passes() {
        let d = data(&[
            ("status", serde_json::json!("active")),
            ("amount", serde_json::json!(10.5)),
        ]);
        assert!(validate_record_data(&schema(), &d).is_ok());
    }

    #[test]
    fn test_subset_of_parameters_is_allowed() {
        let d = data(&[("status", serde_json::json!("active"))]);
        assert!(validate_record_data(&schema(), &d).is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let d = data(&[("color", serde_json::json!("red"))]);
        assert!(validate_record_data(&schema(), &d).is_err());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let d = data(&[("amount", serde_json::json!("ten"))]);
        assert!(validate_record_data(&schema(), &d).is_err());

        let d = data(&[("status", serde_json::json!(3))]);
        assert!(validate_record_data(&schema(), &d).is_err());
    }

    #[test]
    fn test_null_values_are_permitted() {
        let d = data(&[("amount", serde_json::Value::Null)]);
        assert!(validate_record_data(&schema(), &d).is_ok());
    }
}
