//! Process Service
//!
//! Submission, iteration and lifecycle rules for process groups. A
//! submission that fails validation never creates rows; everything after a
//! successful submission is observed by polling.

use chrono::Utc;
use grist_core::domain::process::{
    Process, ProcessConfig, ProcessStatus, StageKind, TriggerKind,
};
use grist_core::domain::repository::Repository;
use grist_core::dto::process::{ProcessAccepted, VersionMatch};
use grist_engine::error::ValidationError;
use grist_engine::validator::{self, ResolvedConfig};
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::{processes, repositories};

/// Service error type
#[derive(Debug)]
pub enum ProcessError {
    NotFound(Uuid),
    RepositoryNotFound(Uuid),
    /// The repository a group referenced no longer exists.
    RepositoryGone(Uuid),
    Validation(ValidationError),
    InvalidState(String),
    /// A concurrent call already created the same iteration.
    Conflict(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for ProcessError {
    fn from(err: sqlx::Error) -> Self {
        ProcessError::DatabaseError(err)
    }
}

/// Validate a configuration and create the pending rows of a new group
pub async fn submit(
    pool: &PgPool,
    repository_id: Uuid,
    config: ProcessConfig,
) -> Result<ProcessAccepted, ProcessError> {
    let repository = repositories::find_by_id(pool, repository_id)
        .await?
        .ok_or(ProcessError::RepositoryNotFound(repository_id))?;

    if !repository.data_ready {
        return Err(ProcessError::InvalidState(format!(
            "Repository {} is still ingesting data",
            repository_id
        )));
    }

    // Validation failures are returned synchronously; no rows are created.
    let resolved =
        validator::validate(&config, &repository.parameters).map_err(ProcessError::Validation)?;

    let process_id = Uuid::new_v4();
    let rows = build_group_rows(&repository, &resolved, process_id, 1, TriggerKind::User);
    processes::create_many(pool, &rows).await?;

    tracing::info!(
        "Process group {} created for repository {} ({} rows)",
        process_id,
        repository_id,
        rows.len()
    );

    Ok(ProcessAccepted {
        process_id,
        iteration: 1,
    })
}

/// Re-run the latest iteration of a user-triggered group against the
/// repository's current version and data
pub async fn iterate(pool: &PgPool, process_id: Uuid) -> Result<ProcessAccepted, ProcessError> {
    let last = processes::latest_iteration(pool, process_id, TriggerKind::User).await?;
    if last == 0 {
        return Err(ProcessError::NotFound(process_id));
    }

    let rows = processes::find_group(pool, process_id, last, TriggerKind::User).await?;
    if rows.is_empty() {
        return Err(ProcessError::NotFound(process_id));
    }

    ensure_terminal(&rows)?;

    let repository = repositories::find_by_id(pool, rows[0].repository_id)
        .await?
        .ok_or(ProcessError::RepositoryGone(rows[0].repository_id))?;

    let iteration = last + 1;
    let new_rows = clone_rows_for_run(&rows, iteration, TriggerKind::User, repository.version);

    // The unique iteration index turns a concurrent duplicate into a
    // conflict instead of a second row.
    processes::create_many(pool, &new_rows)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ProcessError::Conflict(format!(
                    "Iteration {} of process {} already exists",
                    iteration, process_id
                ))
            } else {
                ProcessError::DatabaseError(e)
            }
        })?;

    tracing::info!(
        "Process group {} iterated to {} at repository version {}",
        process_id,
        iteration,
        repository.version
    );

    Ok(ProcessAccepted {
        process_id,
        iteration,
    })
}

/// Whether every stored user iteration ran against the repository's current
/// version
pub async fn match_versions(
    pool: &PgPool,
    process_id: Uuid,
) -> Result<VersionMatch, ProcessError> {
    let versions = processes::group_versions(pool, process_id).await?;
    if versions.is_empty() {
        return Err(ProcessError::NotFound(process_id));
    }

    let last = processes::latest_iteration(pool, process_id, TriggerKind::User).await?;
    let rows = processes::find_group(pool, process_id, last, TriggerKind::User).await?;
    let repository_id = rows
        .first()
        .map(|r| r.repository_id)
        .ok_or(ProcessError::NotFound(process_id))?;

    let repository = repositories::find_by_id(pool, repository_id)
        .await?
        .ok_or(ProcessError::RepositoryGone(repository_id))?;

    Ok(VersionMatch {
        process_id,
        match_versions: versions.iter().all(|v| *v == repository.version),
        repository_version: repository.version,
    })
}

/// Get a process row by ID
pub async fn get(pool: &PgPool, id: Uuid) -> Result<Process, ProcessError> {
    let process = processes::find_by_id(pool, id)
        .await?
        .ok_or(ProcessError::NotFound(id))?;

    Ok(process)
}

/// List one page of a repository's process rows
pub async fn list(
    pool: &PgPool,
    repository_id: Uuid,
    status: Option<ProcessStatus>,
    id_filter: Option<Uuid>,
    offset: i64,
    limit: i64,
) -> Result<(Vec<Process>, i64), ProcessError> {
    let _repository = repositories::find_by_id(pool, repository_id)
        .await?
        .ok_or(ProcessError::RepositoryNotFound(repository_id))?;

    let rows =
        processes::list_for_repository(pool, repository_id, status, id_filter, offset, limit)
            .await?;
    let total = processes::count_for_repository(pool, repository_id, status, id_filter).await?;

    Ok((rows, total))
}

/// Verify a repository exists before accepting a background operation on it
pub async fn get_repository_guard(
    pool: &PgPool,
    repository_id: Uuid,
) -> Result<(), ProcessError> {
    repositories::find_by_id(pool, repository_id)
        .await?
        .map(|_| ())
        .ok_or(ProcessError::RepositoryNotFound(repository_id))
}

/// Bulk-delete every process of a repository
pub async fn delete_for_repository(
    pool: &PgPool,
    repository_id: Uuid,
) -> Result<u64, ProcessError> {
    let _repository = repositories::find_by_id(pool, repository_id)
        .await?
        .ok_or(ProcessError::RepositoryNotFound(repository_id))?;

    let deleted = processes::delete_for_repository(pool, repository_id).await?;
    tracing::info!(
        "Deleted {} process rows for repository {}",
        deleted,
        repository_id
    );

    Ok(deleted)
}

// =============================================================================
// Row construction
// =============================================================================

/// Build the rows of one group iteration: one row per active stage per
/// execution strategy, so optimized and baseline runs can be compared.
pub(crate) fn build_group_rows(
    repository: &Repository,
    resolved: &ResolvedConfig,
    process_id: Uuid,
    iteration: i32,
    trigger: TriggerKind,
) -> Vec<Process> {
    let now = Utc::now();
    let mut rows = Vec::with_capacity(resolved.actions.len() * 2);

    for &stage in &resolved.actions {
        for optimized in [false, true] {
            rows.push(Process {
                id: Uuid::new_v4(),
                repository_id: repository.id,
                repository_version: repository.version,
                process_id,
                iteration,
                task_process: stage,
                actions: resolved.actions.clone(),
                trigger_type: trigger,
                optimized,
                status: ProcessStatus::Pending,
                parameters: stage_parameters(resolved, stage),
                start_time: None,
                end_time: None,
                duration_ms: None,
                input_data_size: None,
                output_data_size: None,
                errors: None,
                validated: false,
                valid: false,
                metrics: vec![],
                created_at: now,
                updated_at: now,
            });
        }
    }

    rows
}

/// Clone an executed group's rows into a fresh pending iteration
pub(crate) fn clone_rows_for_run(
    rows: &[Process],
    iteration: i32,
    trigger: TriggerKind,
    repository_version: i32,
) -> Vec<Process> {
    let now = Utc::now();
    rows.iter()
        .map(|row| Process {
            id: Uuid::new_v4(),
            repository_id: row.repository_id,
            repository_version,
            process_id: row.process_id,
            iteration,
            task_process: row.task_process,
            actions: row.actions.clone(),
            trigger_type: trigger,
            optimized: row.optimized,
            status: ProcessStatus::Pending,
            parameters: row.parameters.clone(),
            start_time: None,
            end_time: None,
            duration_ms: None,
            input_data_size: None,
            output_data_size: None,
            errors: None,
            validated: false,
            valid: false,
            metrics: vec![],
            created_at: now,
            updated_at: now,
        })
        .collect()
}

fn stage_parameters(resolved: &ResolvedConfig, stage: StageKind) -> serde_json::Value {
    let value = match stage {
        StageKind::Filter => serde_json::to_value(&resolved.filter),
        StageKind::Group => serde_json::to_value(&resolved.group),
        StageKind::Aggregation => serde_json::to_value(&resolved.aggregation),
    };
    value.unwrap_or_default()
}

fn ensure_terminal(rows: &[Process]) -> Result<(), ProcessError> {
    for row in rows {
        if !row.status.is_terminal() {
            return Err(ProcessError::InvalidState(format!(
                "Process {} is still {}; wait for the current iteration to finish",
                row.id, row.status
            )));
        }
    }
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grist_core::domain::repository::{Parameter, ParameterKind};
    use grist_engine::validator::validate;
    use grist_core::domain::process::{FilterCondition, FilterOperator, StageSpec};

    fn repository() -> Repository {
        Repository {
            id: Uuid::new_v4(),
            name: "orders".to_string(),
            description: None,
            url: None,
            version: 3,
            parameters: vec![
                Parameter {
                    name: "status".to_string(),
                    kind: ParameterKind::String,
                },
                Parameter {
                    name: "amount".to_string(),
                    kind: ParameterKind::Number,
                },
            ],
            current_data_size: 10,
            original_data_size: 10,
            data_ready: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn resolved() -> ResolvedConfig {
        let config = ProcessConfig {
            filter: StageSpec {
                active: true,
                parameters: vec![FilterCondition {
                    name: "status".to_string(),
                    operator: FilterOperator::Eq,
                    value: serde_json::json!("active"),
                }],
            },
            group: StageSpec {
                active: true,
                parameters: vec!["status".to_string()],
            },
            ..Default::default()
        };
        validate(&config, &repository().parameters).unwrap()
    }

    #[test]
    fn test_build_group_rows_pairs_strategies_per_stage() {
        let repo = repository();
        let process_id = Uuid::new_v4();
        let rows = build_group_rows(&repo, &resolved(), process_id, 1, TriggerKind::User);

        // Two stages, each run as baseline and optimized.
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.process_id == process_id));
        assert!(rows.iter().all(|r| r.repository_version == 3));
        assert!(rows.iter().all(|r| r.status == ProcessStatus::Pending));
        assert_eq!(rows.iter().filter(|r| r.optimized).count(), 2);

        let filter_rows: Vec<_> = rows
            .iter()
            .filter(|r| r.task_process == StageKind::Filter)
            .collect();
        assert_eq!(filter_rows.len(), 2);
        assert_eq!(filter_rows[0].parameters, filter_rows[1].parameters);
    }

    #[test]
    fn test_clone_rows_resets_execution_state() {
        let repo = repository();
        let mut rows = build_group_rows(&repo, &resolved(), Uuid::new_v4(), 1, TriggerKind::User);
        rows[0].status = ProcessStatus::Completed;
        rows[0].errors = Some("old".to_string());
        rows[0].duration_ms = Some(12);

        let cloned = clone_rows_for_run(&rows, 2, TriggerKind::User, 7);

        assert_eq!(cloned.len(), rows.len());
        for row in &cloned {
            assert_eq!(row.iteration, 2);
            assert_eq!(row.repository_version, 7);
            assert_eq!(row.status, ProcessStatus::Pending);
            assert!(row.errors.is_none());
            assert!(row.duration_ms.is_none());
            assert!(row.metrics.is_empty());
        }
    }

    #[test]
    fn test_ensure_terminal_rejects_active_rows() {
        let repo = repository();
        let mut rows = build_group_rows(&repo, &resolved(), Uuid::new_v4(), 1, TriggerKind::User);

        assert!(ensure_terminal(&rows).is_err());

        for row in &mut rows {
            row.status = ProcessStatus::Completed;
        }
        assert!(ensure_terminal(&rows).is_ok());

        rows[1].status = ProcessStatus::Failed;
        assert!(ensure_terminal(&rows).is_ok());

        rows[1].status = ProcessStatus::Running;
        assert!(ensure_terminal(&rows).is_err());
    }
}
