//! Repository API Handlers
//!
//! HTTP endpoints for repository (dataset) management.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use grist_core::dto::page::Page;
use grist_core::dto::repository::{CreateRepository, UpdateRepository};
use uuid::Uuid;

use crate::api::auth::{Role, require_admin};
use crate::api::error::{ApiError, ApiResult};
use crate::api::{AppState, ListQuery, apply_select, page_bounds};
use crate::service::repository::{self, RepositoryError};

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => {
                ApiError::NotFound(format!("Repository {} not found", id))
            }
            RepositoryError::ValidationError(msg) => ApiError::BadRequest(msg),
            RepositoryError::DatabaseError(e) => ApiError::DatabaseError(e),
        }
    }
}

/// POST /repositories
/// Create a repository and ingest its initial records (admin)
pub async fn create_repository(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Json(req): Json<CreateRepository>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    require_admin(role)?;

    tracing::info!("Creating repository: {}", req.name);

    let created = repository::create(&state.pool, req).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(&created).unwrap_or_default()),
    ))
}

/// GET /repositories
/// List repositories, with optional `_id` narrowing and field projection
pub async fn list_repositories(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<serde_json::Value>>> {
    tracing::debug!("Listing repositories");

    if let Some(id) = query.id {
        let found = repository::get(&state.pool, id).await?;
        let value = serde_json::to_value(&found).unwrap_or_default();
        let items = vec![apply_select(value, query.select.as_deref())];
        return Ok(Json(Page::new(items, 1, 1)));
    }

    let (offset, limit) = page_bounds(query.page, query.limit);
    let (rows, total) = repository::list(&state.pool, offset, limit).await?;

    let items = rows
        .into_iter()
        .map(|row| {
            let value = serde_json::to_value(&row).unwrap_or_default();
            apply_select(value, query.select.as_deref())
        })
        .collect();

    Ok(Json(Page::new(items, total, limit)))
}

/// GET /repositories/{id}
/// Get repository details by ID
pub async fn get_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    tracing::debug!("Getting repository: {}", id);

    let found = repository::get(&state.pool, id).await?;

    Ok(Json(serde_json::to_value(&found).unwrap_or_default()))
}

/// PUT /repositories/{id}
/// Update repository metadata (admin)
pub async fn update_repository(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRepository>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(role)?;

    tracing::info!("Updating repository: {}", id);

    let updated = repository::update(&state.pool, id, req).await?;

    Ok(Json(serde_json::to_value(&updated).unwrap_or_default()))
}

/// DELETE /repositories/{id}
/// Delete a repository and everything that hangs off it (admin)
pub async fn delete_repository(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_admin(role)?;

    tracing::info!("Deleting repository: {}", id);

    repository::delete(&state.pool, id).await?;

    Ok(StatusCode::NO_CONTENT)
}
