use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::require_str;
use crate::auth::Claims;
use crate::db::{AuthResponse, LoginRequest, RegisterRequest, UserResponse};
use crate::AppState;

/// Register a new user
///
/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(req) = payload?;

    let mut errors = ValidationErrorBuilder::new();
    let name = require_str(&mut errors, "name", req.name.as_deref());
    let email = require_str(&mut errors, "email", req.email.as_deref());
    let password = require_str(&mut errors, "password", req.password.as_deref());
    errors.finish()?;

    let session = state.auth.register(name, email, password).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Log in with email and password
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = payload?;

    let mut errors = ValidationErrorBuilder::new();
    let email = require_str(&mut errors, "email", req.email.as_deref());
    let password = require_str(&mut errors, "password", req.password.as_deref());
    errors.finish()?;

    let session = state.auth.login(email, password).await?;
    Ok(Json(session))
}

/// Current user for the presented token
///
/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.auth.current_user(&claims).await?;
    Ok(Json(user))
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Auth middleware: verifies the bearer token and stores its claims in the request
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = state.auth.verify_token(bearer_token(request.headers()))?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
