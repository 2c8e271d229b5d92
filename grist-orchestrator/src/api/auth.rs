//! Bearer-token authentication middleware
//!
//! Two configured tokens map to the `user` and `admin` roles. Credentials
//! are request-scoped; the engine holds no session state. When no token is
//! configured, auth is disabled and every request acts as admin (local
//! development).

use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::AppState;
use crate::api::error::ApiError;

/// Role carried by a validated bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

/// Bearer-token authentication middleware
///
/// Resolves the caller's role and stores it as a request extension;
/// handlers needing elevated rights check it via `require_admin`.
/// `/health` is exempt (for load balancer health checks).
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(api_token) = &state.config.api_token else {
        // No auth configured
        request.extensions_mut().insert(Role::Admin);
        return next.run(request).await;
    };

    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    let Some(token) = header.and_then(parse_bearer) else {
        return json_error(StatusCode::UNAUTHORIZED, "authentication required");
    };

    let role = if state.config.admin_token.as_deref() == Some(token) {
        Role::Admin
    } else if token == api_token {
        Role::User
    } else {
        return json_error(StatusCode::UNAUTHORIZED, "invalid token");
    };

    request.extensions_mut().insert(role);
    next.run(request).await
}

/// Reject non-admin callers with 403.
pub fn require_admin(role: Role) -> Result<(), ApiError> {
    if role != Role::Admin {
        return Err(ApiError::Forbidden(
            "admin role required".to_string(),
        ));
    }
    Ok(())
}

fn parse_bearer(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").filter(|t| !t.is_empty())
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("Basic abc123"), None);
        assert_eq!(parse_bearer("abc123"), None);
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(Role::Admin).is_ok());
        assert!(require_admin(Role::User).is_err());
    }
}
