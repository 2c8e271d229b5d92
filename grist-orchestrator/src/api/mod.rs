//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod auth;
pub mod error;
pub mod health;
pub mod process;
pub mod record;
pub mod repository;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use serde::Deserialize;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
}

/// Create the main API router with all endpoints
pub fn create_router(pool: PgPool, config: Arc<Config>) -> Router {
    let state = AppState { pool, config };

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Repository endpoints
        .route(
            "/repositories",
            get(repository::list_repositories).post(repository::create_repository),
        )
        .route(
            "/repositories/{id}",
            get(repository::get_repository)
                .put(repository::update_repository)
                .delete(repository::delete_repository),
        )
        // Record endpoints; GET/POST address the owning repository,
        // PUT/DELETE address the record itself
        .route(
            "/records/{id}",
            get(record::list_records)
                .post(record::create_record)
                .put(record::update_record)
                .delete(record::delete_record),
        )
        // Process endpoints
        .route("/processes/validate", put(process::validate_processes))
        .route("/processes/iterate/{process_id}", post(process::iterate_process))
        .route("/processes/versions/{process_id}", get(process::match_versions))
        .route(
            "/processes/{repository_id}",
            get(process::list_processes)
                .post(process::submit_process)
                .delete(process::delete_processes),
        )
        // Add state and middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// =============================================================================
// Shared query handling
// =============================================================================

/// Query parameters accepted by list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// `+`-joined field projection applied to the serialized items.
    pub select: Option<String>,
    pub status: Option<String>,
    /// Narrows the listing to a single document.
    #[serde(rename = "_id")]
    pub id: Option<Uuid>,
}

/// Resolve page/limit into offset and clamped limit. Pages start at 1;
/// limit is clamped to 1–100.
pub(crate) fn page_bounds(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(10).clamp(1, 100);
    ((page - 1) * limit, limit)
}

/// Apply a `+`-joined field projection to a serialized document. `id` is
/// always kept so items stay addressable.
pub(crate) fn apply_select(value: serde_json::Value, select: Option<&str>) -> serde_json::Value {
    let Some(select) = select else {
        return value;
    };
    let serde_json::Value::Object(map) = value else {
        return value;
    };

    let fields: std::collections::HashSet<&str> =
        select.split('+').map(str::trim).filter(|f| !f.is_empty()).collect();

    let projected = map
        .into_iter()
        .filter(|(key, _)| key == "id" || fields.contains(key.as_str()))
        .collect();

    serde_json::Value::Object(projected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds_defaults_and_clamping() {
        assert_eq!(page_bounds(None, None), (0, 10));
        assert_eq!(page_bounds(Some(3), Some(20)), (40, 20));
        assert_eq!(page_bounds(Some(0), Some(500)), (0, 100));
        assert_eq!(page_bounds(Some(-2), Some(0)), (0, 1));
    }

    #[test]
    fn test_apply_select_projects_fields() {
        let value = serde_json::json!({
            "id": "abc",
            "status": "completed",
            "metrics": [1, 2],
            "errors": null
        });

        let projected = apply_select(value, Some("status+errors"));
        let map = projected.as_object().unwrap();
        assert!(map.contains_key("id"));
        assert!(map.contains_key("status"));
        assert!(map.contains_key("errors"));
        assert!(!map.contains_key("metrics"));
    }

    #[test]
    fn test_apply_select_without_projection_is_identity() {
        let value = serde_json::json!({"id": "abc", "status": "pending"});
        assert_eq!(apply_select(value.clone(), None), value);
    }
}
