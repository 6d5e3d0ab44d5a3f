//! Bearer-token authentication extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use courier_accounts::{Claims, decode_jwt};
use courier_common::error::AppError;

use crate::state::AppState;

/// Authenticated user extracted from the JWT.
///
/// Use as an Axum extractor on protected routes:
/// ```ignore
/// async fn handler(auth: AuthUser) -> impl IntoResponse {
///     // auth.user_id is the caller's id
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub claims: Claims,
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let secret = state.config.jwt_secret.clone();

        let token = bearer_token(
            parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok()),
        )
        .map(str::to_string);

        async move {
            let Some(token) = token else {
                return Err(AppError::Auth(
                    "No authentication token, access denied".to_string(),
                ));
            };

            let claims = decode_jwt(&token, &secret).map_err(|e| {
                tracing::debug!(error = %e, "Rejected bearer token");
                AppError::Auth("Token is not valid".to_string())
            })?;

            Ok(AuthUser {
                user_id: claims.id,
                claims,
            })
        }
    }
}
