//! Notification routes. Mounted under both `/notifications` and `/users`.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use courier_common::error::AppError;
use courier_common::types::{Metadata, NotificationSummary, NotificationType};
use courier_notifier::{DispatchError, DispatchRequest, MarkReadOutcome, NotificationContent};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_notification))
        .route("/{user_id}/notifications", get(list_notifications))
        .route("/read/{id}", patch(mark_as_read))
        .route("/retry-emails", post(retry_emails))
}

/// Request body for creating a notification.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    pub user_id: Option<i32>,
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
    pub metadata: Option<Metadata>,
    pub phone: Option<String>,
}

const MISSING_FIELDS: &str = "Missing stuff! Need userId, title & message";

impl CreateNotificationRequest {
    fn into_dispatch(self) -> Result<DispatchRequest, DispatchError> {
        let (Some(user_id), Some(title), Some(message)) = (self.user_id, self.title, self.message)
        else {
            return Err(DispatchError::Validation(MISSING_FIELDS.to_string()));
        };
        if user_id <= 0 {
            return Err(DispatchError::Validation(MISSING_FIELDS.to_string()));
        }

        let content = NotificationContent::new(user_id, title, message, self.metadata)?;
        let notification_type = self
            .notification_type
            .as_deref()
            .unwrap_or(NotificationType::InApp.as_str());

        DispatchRequest::new(notification_type, content, self.phone)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
}

/// POST /{prefix}: Create a notification and attempt delivery.
async fn create_notification(
    State(state): State<AppState>,
    _auth: AuthUser,
    body: Result<Json<CreateNotificationRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Unreadable notification body");
        AppError::Validation(MISSING_FIELDS.to_string())
    })?;
    let request = req.into_dispatch()?;

    tracing::debug!(
        user_id = request.content().user_id,
        notification_type = %request.notification_type(),
        "Notification request received"
    );

    let outcome = state.dispatcher.dispatch(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Sent ok!",
            "data": outcome,
        })),
    )
        .into_response())
}

/// GET /{prefix}/{user_id}/notifications: List a user's notifications.
async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    user_id: Result<Path<i32>, PathRejection>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    // A non-numeric id can never name the caller.
    let user_id = match user_id {
        Ok(Path(user_id)) if user_id == auth.user_id => user_id,
        _ => return Err(AppError::Forbidden("Not your notifications!".to_string())),
    };

    let notification_type = query
        .notification_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<NotificationType>()
                .map_err(|_| DispatchError::InvalidType(t.to_string()))
        })
        .transpose()?;

    let notifications = state
        .dispatcher
        .get_user_notifications(user_id, notification_type)
        .await?;
    let data: Vec<NotificationSummary> = notifications.iter().map(Into::into).collect();

    Ok(Json(json!({
        "success": true,
        "count": data.len(),
        "data": data,
    })))
}

/// PATCH /{prefix}/read/{id}: Mark one of the caller's notifications as read.
async fn mark_as_read(
    State(state): State<AppState>,
    auth: AuthUser,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Response, AppError> {
    let Ok(Path(id)) = id else {
        return Err(AppError::NotFound("Notification not found!".to_string()));
    };
    let outcome = state.dispatcher.mark_as_read(id, auth.user_id).await?;

    let response = match outcome {
        MarkReadOutcome::Read { .. } => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Marked as read",
                "data": outcome,
            })),
        ),
        MarkReadOutcome::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "message": "Notification not found!",
                "data": outcome,
            })),
        ),
    };

    Ok(response.into_response())
}

/// POST /{prefix}/retry-emails: Retry failed email deliveries.
async fn retry_emails(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let summary = state.dispatcher.retry_failed_emails().await?;

    Ok(Json(json!({
        "success": true,
        "message": "Emails retried!",
        "data": summary,
    })))
}
