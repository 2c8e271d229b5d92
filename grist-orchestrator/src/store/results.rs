//! Process result store
//!
//! Stored stage outputs, one row per process row. The validation sweep reads
//! these back to compare against an independent recomputation.

use grist_core::domain::process::ProcessResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::processes::{stage_to_string, string_to_stage, string_to_trigger, trigger_to_string};

/// Insert a stage output
pub async fn create(pool: &PgPool, result: &ProcessResult) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO process_results
            (id, process_item_id, process_id, task_process, optimized, iteration,
             trigger_type, output, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(result.id)
    .bind(result.process_item_id)
    .bind(result.process_id)
    .bind(stage_to_string(result.task_process))
    .bind(result.optimized)
    .bind(result.iteration)
    .bind(trigger_to_string(result.trigger_type))
    .bind(&result.output)
    .bind(result.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find the stored output of one process row
pub async fn find_for_item(
    pool: &PgPool,
    process_item_id: Uuid,
) -> Result<Option<ProcessResult>, sqlx::Error> {
    let row = sqlx::query_as::<_, ProcessResultRow>(
        r#"
        SELECT id, process_item_id, process_id, task_process, optimized, iteration,
               trigger_type, output, created_at
        FROM process_results
        WHERE process_item_id = $1
        "#,
    )
    .bind(process_item_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProcessResultRow {
    id: Uuid,
    process_item_id: Uuid,
    process_id: Uuid,
    task_process: String,
    optimized: bool,
    iteration: i32,
    trigger_type: String,
    output: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ProcessResultRow> for ProcessResult {
    fn from(row: ProcessResultRow) -> Self {
        ProcessResult {
            id: row.id,
            process_item_id: row.process_item_id,
            process_id: row.process_id,
            task_process: string_to_stage(&row.task_process),
            optimized: row.optimized,
            iteration: row.iteration,
            trigger_type: string_to_trigger(&row.trigger_type),
            output: row.output,
            created_at: row.created_at,
        }
    }
}
