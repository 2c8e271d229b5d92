//! Record store
//!
//! Database operations for records (dataset rows).

use grist_core::domain::record::Record;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a single record
pub async fn create(pool: &PgPool, record: &Record) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO records (id, repository_id, data, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(record.id)
    .bind(record.repository_id)
    .bind(serde_json::Value::Object(record.data.clone()))
    .bind(record.version)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Bulk-insert records at repository creation
pub async fn create_many(pool: &PgPool, records: &[Record]) -> Result<(), sqlx::Error> {
    for record in records {
        create(pool, record).await?;
    }
    Ok(())
}

/// Find a record by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Record>, sqlx::Error> {
    let row = sqlx::query_as::<_, RecordRow>(
        r#"
        SELECT id, repository_id, data, version, created_at, updated_at
        FROM records
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List one page of a repository's records in insertion order
pub async fn list_page(
    pool: &PgPool,
    repository_id: Uuid,
    offset: i64,
    limit: i64,
) -> Result<Vec<Record>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RecordRow>(
        r#"
        SELECT id, repository_id, data, version, created_at, updated_at
        FROM records
        WHERE repository_id = $1
        ORDER BY created_at ASC, id ASC
        OFFSET $2 LIMIT $3
        "#,
    )
    .bind(repository_id)
    .bind(offset)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Load a repository's full record set in insertion order
///
/// This is the snapshot the engine executes over; `first`/`last` aggregates
/// depend on the ordering.
pub async fn list_all_ordered(
    pool: &PgPool,
    repository_id: Uuid,
) -> Result<Vec<Record>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RecordRow>(
        r#"
        SELECT id, repository_id, data, version, created_at, updated_at
        FROM records
        WHERE repository_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(repository_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

pub async fn count_for_repository(
    pool: &PgPool,
    repository_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM records WHERE repository_id = $1")
            .bind(repository_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Replace a record's data, stamping the repository version it now belongs to
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    data: &serde_json::Map<String, serde_json::Value>,
    version: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE records
        SET data = $1, version = $2, updated_at = $3
        WHERE id = $4
        "#,
    )
    .bind(serde_json::Value::Object(data.clone()))
    .bind(version)
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a record by ID
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM records WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    repository_id: Uuid,
    data: serde_json::Value,
    version: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        let data = match row.data {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        Record {
            id: row.id,
            repository_id: row.repository_id,
            data,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
