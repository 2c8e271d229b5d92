//! Record API Handlers
//!
//! HTTP endpoints for dataset rows. GET/POST address the owning repository,
//! PUT/DELETE address the record itself. All mutations are admin-only and
//! bump the repository version.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use grist_core::dto::page::Page;
use grist_core::dto::record::{CreateRecord, UpdateRecord};
use uuid::Uuid;

use crate::api::auth::{Role, require_admin};
use crate::api::error::{ApiError, ApiResult};
use crate::api::{AppState, ListQuery, apply_select, page_bounds};
use crate::service::record::{self, RecordError};

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::NotFound(id) => ApiError::NotFound(format!("Record {} not found", id)),
            RecordError::RepositoryNotFound(id) => {
                ApiError::NotFound(format!("Repository {} not found", id))
            }
            RecordError::ValidationError(msg) => ApiError::BadRequest(msg),
            RecordError::DatabaseError(e) => ApiError::DatabaseError(e),
        }
    }
}

/// POST /records/{repository_id}
/// Create a record in a repository (admin)
pub async fn create_record(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(repository_id): Path<Uuid>,
    Json(req): Json<CreateRecord>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    require_admin(role)?;

    tracing::info!("Creating record in repository: {}", repository_id);

    let created = record::create(&state.pool, repository_id, req.data).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(&created).unwrap_or_default()),
    ))
}

/// GET /records/{repository_id}
/// List one page of a repository's records
pub async fn list_records(
    State(state): State<AppState>,
    Path(repository_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<serde_json::Value>>> {
    tracing::debug!("Listing records for repository: {}", repository_id);

    let (offset, limit) = page_bounds(query.page, query.limit);
    let (rows, total) = record::list(&state.pool, repository_id, offset, limit).await?;

    let items = rows
        .into_iter()
        .map(|row| {
            let value = serde_json::to_value(&row).unwrap_or_default();
            apply_select(value, query.select.as_deref())
        })
        .collect();

    Ok(Json(Page::new(items, total, limit)))
}

/// PUT /records/{id}
/// Replace a record's data (admin)
pub async fn update_record(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRecord>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(role)?;

    tracing::info!("Updating record: {}", id);

    let updated = record::update(&state.pool, id, req.data).await?;

    Ok(Json(serde_json::to_value(&updated).unwrap_or_default()))
}

/// DELETE /records/{id}
/// Delete a record (admin)
pub async fn delete_record(
    State(state): State<AppState>,
    Extension(role): Extension<Role>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_admin(role)?;

    tracing::info!("Deleting record: {}", id);

    record::delete(&state.pool, id).await?;

    Ok(StatusCode::NO_CONTENT)
}
