//! Repository store
//!
//! Database operations for repositories (datasets). The version counter is
//! only ever bumped here, as a side effect of record-affecting operations.

use grist_core::domain::repository::{Parameter, Repository};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a freshly created repository (version 0, data not ready).
pub async fn create(pool: &PgPool, repository: &Repository) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO repositories
            (id, name, description, url, version, parameters, current_data_size,
             original_data_size, data_ready, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(repository.id)
    .bind(&repository.name)
    .bind(&repository.description)
    .bind(&repository.url)
    .bind(repository.version)
    .bind(serde_json::to_value(&repository.parameters).unwrap_or_default())
    .bind(repository.current_data_size)
    .bind(repository.original_data_size)
    .bind(repository.data_ready)
    .bind(repository.created_at)
    .bind(repository.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a repository by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Repository>, sqlx::Error> {
    let row = sqlx::query_as::<_, RepositoryRow>(
        r#"
        SELECT id, name, description, url, version, parameters, current_data_size,
               original_data_size, data_ready, created_at, updated_at
        FROM repositories
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List one page of repositories, newest first
pub async fn list(
    pool: &PgPool,
    offset: i64,
    limit: i64,
) -> Result<Vec<Repository>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RepositoryRow>(
        r#"
        SELECT id, name, description, url, version, parameters, current_data_size,
               original_data_size, data_ready, created_at, updated_at
        FROM repositories
        ORDER BY created_at DESC
        OFFSET $1 LIMIT $2
        "#,
    )
    .bind(offset)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM repositories")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// List repositories whose data is ready for processing
pub async fn list_data_ready(pool: &PgPool) -> Result<Vec<Repository>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RepositoryRow>(
        r#"
        SELECT id, name, description, url, version, parameters, current_data_size,
               original_data_size, data_ready, created_at, updated_at
        FROM repositories
        WHERE data_ready = TRUE
        ORDER BY created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Update descriptive metadata; the parameter schema is immutable.
pub async fn update_meta(
    pool: &PgPool,
    id: Uuid,
    name: Option<String>,
    description: Option<String>,
    url: Option<String>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE repositories
        SET name = COALESCE($1, name),
            description = COALESCE($2, description),
            url = COALESCE($3, url),
            updated_at = $4
        WHERE id = $5
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(url)
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark initial ingestion complete: sizes set, version 1, data ready.
pub async fn set_ingested(pool: &PgPool, id: Uuid, size: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE repositories
        SET current_data_size = $1, original_data_size = $1, version = 1,
            data_ready = TRUE, updated_at = $2
        WHERE id = $3
        "#,
    )
    .bind(size)
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Bump the version after a record mutation, adjusting the record count by
/// `size_delta` (+1 create, 0 update, -1 delete). Returns the new version.
pub async fn bump_version(
    pool: &PgPool,
    id: Uuid,
    size_delta: i64,
) -> Result<i32, sqlx::Error> {
    let (version,): (i32,) = sqlx::query_as(
        r#"
        UPDATE repositories
        SET version = version + 1,
            current_data_size = current_data_size + $1,
            updated_at = $2
        WHERE id = $3
        RETURNING version
        "#,
    )
    .bind(size_delta)
    .bind(chrono::Utc::now())
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(version)
}

/// Delete a repository; records, processes and results cascade.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM repositories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RepositoryRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    url: Option<String>,
    version: i32,
    parameters: serde_json::Value,
    current_data_size: i64,
    original_data_size: i64,
    data_ready: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<RepositoryRow> for Repository {
    fn from(row: RepositoryRow) -> Self {
        let parameters: Vec<Parameter> =
            serde_json::from_value(row.parameters).unwrap_or_default();

        Repository {
            id: row.id,
            name: row.name,
            description: row.description,
            url: row.url,
            version: row.version,
            parameters,
            current_data_size: row.current_data_size,
            original_data_size: row.original_data_size,
            data_ready: row.data_ready,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
