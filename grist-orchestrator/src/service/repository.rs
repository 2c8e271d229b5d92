//! Repository Service
//!
//! CRUD rules for repositories (datasets), including the initial bulk
//! ingestion that flips `data_ready`.

use chrono::Utc;
use grist_core::domain::record::Record;
use grist_core::domain::repository::Repository;
use grist_core::dto::repository::{CreateRepository, UpdateRepository};
use sqlx::PgPool;
use uuid::Uuid;

use crate::service::record::validate_record_data;
use crate::store::{records, repositories};

/// Service error type
#[derive(Debug)]
pub enum RepositoryError {
    NotFound(Uuid),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::DatabaseError(err)
    }
}

/// Create a repository and ingest its initial records
///
/// The repository starts at version 0 with `data_ready = false`; once the
/// bulk load is stored it moves to version 1 and becomes processable.
pub async fn create(
    pool: &PgPool,
    req: CreateRepository,
) -> Result<Repository, RepositoryError> {
    if req.name.trim().is_empty() {
        return Err(RepositoryError::ValidationError(
            "Repository name cannot be empty".to_string(),
        ));
    }
    if req.parameters.is_empty() {
        return Err(RepositoryError::ValidationError(
            "Repository needs at least one parameter".to_string(),
        ));
    }
    let mut names = std::collections::HashSet::new();
    for parameter in &req.parameters {
        if !names.insert(parameter.name.as_str()) {
            return Err(RepositoryError::ValidationError(format!(
                "Duplicate parameter '{}'",
                parameter.name
            )));
        }
    }

    for data in &req.records {
        validate_record_data(&req.parameters, data).map_err(RepositoryError::ValidationError)?;
    }

    let now = Utc::now();
    let repository = Repository {
        id: Uuid::new_v4(),
        name: req.name,
        description: req.description,
        url: req.url,
        version: 0,
        parameters: req.parameters,
        current_data_size: 0,
        original_data_size: 0,
        data_ready: false,
        created_at: now,
        updated_at: now,
    };
    repositories::create(pool, &repository).await?;

    let rows: Vec<Record> = req
        .records
        .into_iter()
        .map(|data| Record {
            id: Uuid::new_v4(),
            repository_id: repository.id,
            data,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .collect();
    records::create_many(pool, &rows).await?;
    repositories::set_ingested(pool, repository.id, rows.len() as i64).await?;

    tracing::info!(
        "Repository {} created with {} records",
        repository.id,
        rows.len()
    );

    let created = repositories::find_by_id(pool, repository.id)
        .await?
        .ok_or(RepositoryError::NotFound(repository.id))?;

    Ok(created)
}

/// Get a repository by ID
pub async fn get(pool: &PgPool, id: Uuid) -> Result<Repository, RepositoryError> {
    let repository = repositories::find_by_id(pool, id)
        .await?
        .ok_or(RepositoryError::NotFound(id))?;

    Ok(repository)
}

/// List one page of repositories
pub async fn list(
    pool: &PgPool,
    offset: i64,
    limit: i64,
) -> Result<(Vec<Repository>, i64), RepositoryError> {
    let page = repositories::list(pool, offset, limit).await?;
    let total = repositories::count(pool).await?;
    Ok((page, total))
}

/// Update descriptive metadata
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    req: UpdateRepository,
) -> Result<Repository, RepositoryError> {
    let _existing = repositories::find_by_id(pool, id)
        .await?
        .ok_or(RepositoryError::NotFound(id))?;

    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "Repository name cannot be empty".to_string(),
            ));
        }
    }

    repositories::update_meta(pool, id, req.name, req.description, req.url).await?;

    let updated = repositories::find_by_id(pool, id)
        .await?
        .ok_or(RepositoryError::NotFound(id))?;

    Ok(updated)
}

/// Delete a repository; records, processes and stored results go with it.
/// In-flight process groups observe the missing repository and fail with a
/// repository-gone error rather than seeing half-deleted state.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), RepositoryError> {
    let deleted = repositories::delete(pool, id).await?;
    if !deleted {
        return Err(RepositoryError::NotFound(id));
    }

    tracing::info!("Repository {} deleted", id);
    Ok(())
}
