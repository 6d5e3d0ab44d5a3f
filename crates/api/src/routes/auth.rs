//! Account routes: registration, login and the caller's profile.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use courier_accounts::{RegisterParams, UserService};
use courier_common::error::AppError;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

/// Request body for registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// POST /auth/register: Create an account.
async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let Json(req) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Unreadable register body");
        AppError::Validation("Missing fields!".to_string())
    })?;
    let (Some(username), Some(email), Some(password)) = (
        required(req.username),
        required(req.email),
        required(req.password),
    ) else {
        return Err(AppError::Validation("Missing fields!".to_string()));
    };

    let params = RegisterParams {
        username,
        email,
        password,
        phone: req.phone,
    };
    let user = UserService::register(&state.pool, &params).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "User created!",
            "data": user,
        })),
    ))
}

/// POST /auth/login: Exchange credentials for a JWT.
async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(req) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Unreadable login body");
        AppError::Validation("Need email and password!".to_string())
    })?;
    let (Some(email), Some(password)) = (required(req.email), required(req.password)) else {
        return Err(AppError::Validation("Need email and password!".to_string()));
    };

    let session = UserService::login(
        &state.pool,
        &email,
        &password,
        &state.config.jwt_secret,
        state.config.jwt_expiry_hours,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Login ok!",
        "token": session.token,
        "user": {
            "id": session.user.id,
            "username": session.user.username,
            "email": session.user.email,
        },
    })))
}

/// GET /auth/me: The authenticated user's profile.
async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = UserService::get_user(&state.pool, auth.user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": user,
    })))
}
