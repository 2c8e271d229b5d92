//! Process API Handlers
//!
//! HTTP endpoints for pipeline submission, observation, iteration,
//! validation and bulk deletion. Submission and iteration return 202: the
//! worker executes asynchronously and clients poll the list endpoint.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use grist_core::domain::process::ProcessConfig;
use grist_core::dto::page::Page;
use grist_core::dto::process::{ProcessAccepted, VersionMatch};
use uuid::Uuid;

use crate::api::auth::{Role, require_admin};
use crate::api::error::{ApiError, ApiResult};
use crate::api::{AppState, ListQuery, apply_select, page_bounds};
use crate::service::process::{self, ProcessError};
use crate::service::validation;

impl From<ProcessError> for ApiError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::NotFound(id) => {
                ApiError::NotFound(format!("Process {} not found", id))
            }
            ProcessError::RepositoryNotFound(id) => {
                ApiError::NotFound(format!("Repository {} not found", id))
            }
            ProcessError::RepositoryGone(id) => {
                ApiError::Gone(format!("Repository {} no longer exists", id))
            }
            ProcessError::Validation(e) => ApiError::BadRequest(e.to_string()),
            ProcessError::InvalidState(msg) => ApiError::BadRequest(msg),
            ProcessError::Conflict(msg) => ApiError::Conflict(msg),
            ProcessError::DatabaseError(e) => ApiError::DatabaseError(e),
        }
    }
}

/// POST /processes/{repository_id}
/// Validate a pipeline configuration and enqueue a new process group
pub async fn submit_process(
    State(state): State<AppState>,
    Path(repository_id): Path<Uuid>,
    Json(config): Json<ProcessConfig>,
) -> ApiResult<(StatusCode, Json<ProcessAccepted>)> {
    tracing::info!("Submitting process for repository: {}", repository_id);

    let accepted = process::submit(&state.pool, repository_id, config).await?;

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /processes/{repository_id}
/// List a repository's process rows, optionally filtered by status or
/// narrowed to one row, with a field projection
pub async fn list_processes(
    State(state): State<AppState>,
    Path(repository_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<serde_json::Value>>> {
    tracing::debug!("Listing processes for repository: {}", repository_id);

    let (offset, limit) = page_bounds(query.page, query.limit);
    let status = query
        .status
        .as_deref()
        .map(|s| {
            parse_status(s)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown status '{}'", s)))
        })
        .transpose()?;

    let (rows, total) =
        process::list(&state.pool, repository_id, status, query.id, offset, limit).await?;

    let items = rows
        .into_iter()
        .map(|row| {
            let value = serde_json::to_value(&row).unwrap_or_default();
            apply_select(value, query.select.as_deref())
        })
        .collect();

    Ok(Json(Page::new(items, total, limit)))
}

/// POST /processes/iterate/{process_id}
/// Re-run a user-triggered group against the repository's current data
pub async fn iterate_process(
    State(state): State<AppState>,
    Path(process_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<ProcessAccepted>)> {
    tracing::info!("Iterating process group: {}", process_id);

    let accepted = process::iterate(&state.pool, process_id).await?;

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /processes/versions/{process_id}
/// Whether all stored iterations ran against the current repository version
pub async fn match_versions(
    State(state): State<AppState>,
    Path(process_id): Path<Uuid>,
) -> ApiResult<Json<VersionMatch>> {
    tracing::debug!("Checking version match for process group: {}", process_id);

    let result = process::match_versions(&state.pool, process_id).await?;

    Ok(Json(result))
}

fn parse_status(s: &str) -> Option<grist_core::domain::process::ProcessStatus> {
    use grist_core::domain::process::ProcessStatus;
    match s {
        "pending" => Some(ProcessStatus::Pending),
        "running" => Some(ProcessStatus::Running),
        "completed" => Some(ProcessStatus::Completed),
        "failed" => Some(ProcessStatus::Failed),
        _ => None,
    }
}

/// PUT /processes/validate
/// Trigger the asynchronous validation sweep (admin)
pub async fn validate_processes(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
) -> ApiResult<StatusCode> {
    require_admin(role)?;

    tracing::info!("Validation sweep requested");

    let pool = state.pool.clone();
    tokio::spawn(async move {
        if let Err(e) = validation::validate_all(&pool, None).await {
            tracing::error!("Validation sweep failed: {:?}", e);
        }
    });

    Ok(StatusCode::ACCEPTED)
}

/// DELETE /processes/{repository_id}
/// Bulk-delete a repository's processes asynchronously (admin)
pub async fn delete_processes(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(repository_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_admin(role)?;

    tracing::info!("Bulk process deletion for repository: {}", repository_id);

    // Reject unknown repositories synchronously; the deletion itself runs
    // in the background.
    process::get_repository_guard(&state.pool, repository_id).await?;

    let pool = state.pool.clone();
    tokio::spawn(async move {
        if let Err(e) = process::delete_for_repository(&pool, repository_id).await {
            tracing::error!(
                "Bulk deletion for repository {} failed: {:?}",
                repository_id,
                e
            );
        }
    });

    Ok(StatusCode::ACCEPTED)
}
