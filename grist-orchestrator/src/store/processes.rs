//! Process store
//!
//! Database operations for process execution records. Status transitions go
//! through the claim/complete/fail functions so rows never move backwards.

use chrono::{DateTime, Utc};
use grist_core::domain::metric::MetricSample;
use grist_core::domain::process::{Process, ProcessStatus, StageKind, TriggerKind};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert the rows of a newly submitted or iterated process group
///
/// The unique index on (process_id, iteration, task_process, optimized,
/// trigger_type) rejects concurrent duplicate iterations; the caller maps
/// that violation to a conflict.
pub async fn create_many(pool: &PgPool, processes: &[Process]) -> Result<(), sqlx::Error> {
    for process in processes {
        sqlx::query(
            r#"
            INSERT INTO processes
                (id, repository_id, repository_version, process_id, iteration,
                 task_process, actions, trigger_type, optimized, status, parameters,
                 validated, valid, metrics, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(process.id)
        .bind(process.repository_id)
        .bind(process.repository_version)
        .bind(process.process_id)
        .bind(process.iteration)
        .bind(stage_to_string(process.task_process))
        .bind(
            process
                .actions
                .iter()
                .map(|a| stage_to_string(*a).to_string())
                .collect::<Vec<_>>(),
        )
        .bind(trigger_to_string(process.trigger_type))
        .bind(process.optimized)
        .bind(status_to_string(process.status))
        .bind(&process.parameters)
        .bind(process.validated)
        .bind(process.valid)
        .bind(serde_json::to_value(&process.metrics).unwrap_or_default())
        .bind(process.created_at)
        .bind(process.updated_at)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Find a process row by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Process>, sqlx::Error> {
    let row = sqlx::query_as::<_, ProcessRow>(&format!(
        "{SELECT_FIELDS} FROM processes WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List one page of a repository's process rows, newest first
pub async fn list_for_repository(
    pool: &PgPool,
    repository_id: Uuid,
    status: Option<ProcessStatus>,
    id_filter: Option<Uuid>,
    offset: i64,
    limit: i64,
) -> Result<Vec<Process>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ProcessRow>(&format!(
        r#"
        {SELECT_FIELDS} FROM processes
        WHERE repository_id = $1
          AND ($2::varchar IS NULL OR status = $2)
          AND ($3::uuid IS NULL OR id = $3)
        ORDER BY created_at DESC, id DESC
        OFFSET $4 LIMIT $5
        "#
    ))
    .bind(repository_id)
    .bind(status.map(status_to_string))
    .bind(id_filter)
    .bind(offset)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

pub async fn count_for_repository(
    pool: &PgPool,
    repository_id: Uuid,
    status: Option<ProcessStatus>,
    id_filter: Option<Uuid>,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM processes
        WHERE repository_id = $1
          AND ($2::varchar IS NULL OR status = $2)
          AND ($3::uuid IS NULL OR id = $3)
        "#,
    )
    .bind(repository_id)
    .bind(status.map(status_to_string))
    .bind(id_filter)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// All rows of one iteration of a process group
pub async fn find_group(
    pool: &PgPool,
    process_id: Uuid,
    iteration: i32,
    trigger: TriggerKind,
) -> Result<Vec<Process>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ProcessRow>(&format!(
        r#"
        {SELECT_FIELDS} FROM processes
        WHERE process_id = $1 AND iteration = $2 AND trigger_type = $3
        ORDER BY optimized ASC, task_process ASC
        "#
    ))
    .bind(process_id)
    .bind(iteration)
    .bind(trigger_to_string(trigger))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Latest iteration number of a process group, 0 when none exist
pub async fn latest_iteration(
    pool: &PgPool,
    process_id: Uuid,
    trigger: TriggerKind,
) -> Result<i32, sqlx::Error> {
    let (max,): (Option<i32>,) = sqlx::query_as(
        "SELECT MAX(iteration) FROM processes WHERE process_id = $1 AND trigger_type = $2",
    )
    .bind(process_id)
    .bind(trigger_to_string(trigger))
    .fetch_one(pool)
    .await?;

    Ok(max.unwrap_or(0))
}

/// Distinct repository versions recorded across a group's user iterations
pub async fn group_versions(pool: &PgPool, process_id: Uuid) -> Result<Vec<i32>, sqlx::Error> {
    let rows: Vec<(i32,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT repository_version FROM processes
        WHERE process_id = $1 AND trigger_type = 'user'
        "#,
    )
    .bind(process_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(v,)| v).collect())
}

/// Pending groups awaiting execution, oldest first
pub async fn find_pending_groups(
    pool: &PgPool,
) -> Result<Vec<(Uuid, i32, TriggerKind)>, sqlx::Error> {
    let rows: Vec<(Uuid, i32, String)> = sqlx::query_as(
        r#"
        SELECT process_id, iteration, trigger_type
        FROM processes
        WHERE status = 'pending'
        GROUP BY process_id, iteration, trigger_type
        ORDER BY MIN(created_at) ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, iteration, trigger)| (id, iteration, string_to_trigger(&trigger)))
        .collect())
}

/// Atomically claim a pending group for execution
///
/// Only rows still `pending` flip to `running`; a second concurrent claim
/// returns an empty set.
pub async fn claim_group(
    pool: &PgPool,
    process_id: Uuid,
    iteration: i32,
    trigger: TriggerKind,
) -> Result<Vec<Process>, sqlx::Error> {
    let now = Utc::now();

    let rows = sqlx::query_as::<_, ProcessRow>(&format!(
        r#"
        UPDATE processes
        SET status = 'running', start_time = $1, updated_at = $1
        WHERE process_id = $2 AND iteration = $3 AND trigger_type = $4
          AND status = 'pending'
        RETURNING {FIELDS}
        "#
    ))
    .bind(now)
    .bind(process_id)
    .bind(iteration)
    .bind(trigger_to_string(trigger))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Record a successful stage execution on its process row
#[allow(clippy::too_many_arguments)]
pub async fn mark_completed(
    pool: &PgPool,
    id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration_ms: i64,
    input_data_size: i64,
    output_data_size: Option<i64>,
    metrics: &[MetricSample],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE processes
        SET status = 'completed', start_time = $1, end_time = $2, duration_ms = $3,
            input_data_size = $4, output_data_size = $5, metrics = $6,
            errors = NULL, updated_at = $7
        WHERE id = $8
        "#,
    )
    .bind(start_time)
    .bind(end_time)
    .bind(duration_ms)
    .bind(input_data_size)
    .bind(output_data_size)
    .bind(serde_json::to_value(metrics).unwrap_or_default())
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a failed stage execution on its process row
pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    input_data_size: Option<i64>,
    metrics: &[MetricSample],
    errors: &str,
) -> Result<(), sqlx::Error> {
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE processes
        SET status = 'failed', end_time = $1,
            duration_ms = (EXTRACT(EPOCH FROM ($1 - start_time)) * 1000)::BIGINT,
            input_data_size = COALESCE($2, input_data_size),
            metrics = $3, errors = $4, updated_at = $1
        WHERE id = $5
        "#,
    )
    .bind(now)
    .bind(input_data_size)
    .bind(serde_json::to_value(metrics).unwrap_or_default())
    .bind(errors)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record validation outcome; the sweep is the only writer of these flags
pub async fn set_validation(pool: &PgPool, id: Uuid, valid: bool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE processes
        SET validated = TRUE, valid = $1, updated_at = $2
        WHERE id = $3
        "#,
    )
    .bind(valid)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Completed rows that have not been through a validation pass yet
pub async fn find_completed_unvalidated(
    pool: &PgPool,
    repository_id: Option<Uuid>,
) -> Result<Vec<Process>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ProcessRow>(&format!(
        r#"
        {SELECT_FIELDS} FROM processes
        WHERE status = 'completed' AND validated = FALSE
          AND ($1::uuid IS NULL OR repository_id = $1)
        ORDER BY process_id, iteration, optimized
        "#
    ))
    .bind(repository_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Whether any process is pending or running
pub async fn any_active(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM processes WHERE status IN ('pending', 'running')",
    )
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Whether a group already has system-triggered comparison runs
pub async fn has_system_runs(pool: &PgPool, process_id: Uuid) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM processes WHERE process_id = $1 AND trigger_type = 'system'",
    )
    .bind(process_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Distinct first-iteration user groups pinned at the given repository version
pub async fn user_groups_at_version(
    pool: &PgPool,
    repository_id: Uuid,
    version: i32,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT process_id FROM processes
        WHERE repository_id = $1 AND trigger_type = 'user'
          AND iteration = 1 AND repository_version = $2
        "#,
    )
    .bind(repository_id)
    .bind(version)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Bulk-delete every process of a repository; results cascade
pub async fn delete_for_repository(
    pool: &PgPool,
    repository_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM processes WHERE repository_id = $1")
        .bind(repository_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Helper Functions
// =============================================================================

const FIELDS: &str = "id, repository_id, repository_version, process_id, iteration, \
     task_process, actions, trigger_type, optimized, status, parameters, \
     start_time, end_time, duration_ms, input_data_size, output_data_size, \
     errors, validated, valid, metrics, created_at, updated_at";

const SELECT_FIELDS: &str = "SELECT id, repository_id, repository_version, process_id, iteration, \
     task_process, actions, trigger_type, optimized, status, parameters, \
     start_time, end_time, duration_ms, input_data_size, output_data_size, \
     errors, validated, valid, metrics, created_at, updated_at";

pub(crate) fn status_to_string(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::Pending => "pending",
        ProcessStatus::Running => "running",
        ProcessStatus::Completed => "completed",
        ProcessStatus::Failed => "failed",
    }
}

pub(crate) fn string_to_status(s: &str) -> ProcessStatus {
    match s {
        "pending" => ProcessStatus::Pending,
        "running" => ProcessStatus::Running,
        "completed" => ProcessStatus::Completed,
        "failed" => ProcessStatus::Failed,
        _ => ProcessStatus::Pending,
    }
}

pub(crate) fn stage_to_string(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Filter => "filter",
        StageKind::Group => "group",
        StageKind::Aggregation => "aggregation",
    }
}

pub(crate) fn string_to_stage(s: &str) -> StageKind {
    match s {
        "group" => StageKind::Group,
        "aggregation" => StageKind::Aggregation,
        _ => StageKind::Filter,
    }
}

pub(crate) fn trigger_to_string(trigger: TriggerKind) -> &'static str {
    match trigger {
        TriggerKind::User => "user",
        TriggerKind::System => "system",
    }
}

pub(crate) fn string_to_trigger(s: &str) -> TriggerKind {
    match s {
        "system" => TriggerKind::System,
        _ => TriggerKind::User,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProcessRow {
    id: Uuid,
    repository_id: Uuid,
    repository_version: i32,
    process_id: Uuid,
    iteration: i32,
    task_process: String,
    actions: Vec<String>,
    trigger_type: String,
    optimized: bool,
    status: String,
    parameters: serde_json::Value,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    input_data_size: Option<i64>,
    output_data_size: Option<i64>,
    errors: Option<String>,
    validated: bool,
    valid: bool,
    metrics: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProcessRow> for Process {
    fn from(row: ProcessRow) -> Self {
        let metrics: Vec<MetricSample> =
            serde_json::from_value(row.metrics).unwrap_or_default();

        Process {
            id: row.id,
            repository_id: row.repository_id,
            repository_version: row.repository_version,
            process_id: row.process_id,
            iteration: row.iteration,
            task_process: string_to_stage(&row.task_process),
            actions: row.actions.iter().map(|a| string_to_stage(a)).collect(),
            trigger_type: string_to_trigger(&row.trigger_type),
            optimized: row.optimized,
            status: string_to_status(&row.status),
            parameters: row.parameters,
            start_time: row.start_time,
            end_time: row.end_time,
            duration_ms: row.duration_ms,
            input_data_size: row.input_data_size,
            output_data_size: row.output_data_size,
            errors: row.errors,
            validated: row.validated,
            valid: row.valid,
            metrics,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ProcessStatus::Pending,
            ProcessStatus::Running,
            ProcessStatus::Completed,
            ProcessStatus::Failed,
        ] {
            assert_eq!(string_to_status(status_to_string(status)), status);
        }
    }

    #[test]
    fn test_stage_round_trip() {
        for stage in [StageKind::Filter, StageKind::Group, StageKind::Aggregation] {
            assert_eq!(string_to_stage(stage_to_string(stage)), stage);
        }
    }
}
