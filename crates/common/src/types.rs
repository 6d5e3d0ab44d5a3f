use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form key/value payload attached to a notification.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Delivery channel of a notification. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum NotificationType {
    #[serde(rename = "in-app")]
    #[sqlx(rename = "in-app")]
    InApp,
    #[serde(rename = "email")]
    #[sqlx(rename = "email")]
    Email,
    #[serde(rename = "sms")]
    #[sqlx(rename = "sms")]
    Sms,
}

impl NotificationType {
    pub const ALL: [NotificationType; 3] = [
        NotificationType::InApp,
        NotificationType::Email,
        NotificationType::Sms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::InApp => "in-app",
            NotificationType::Email => "email",
            NotificationType::Sms => "sms",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a notification type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Wrong type '{0}'! Use in-app, email, sms")]
pub struct UnknownNotificationType(pub String);

impl FromStr for NotificationType {
    type Err = UnknownNotificationType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownNotificationType(s.to_string()))
    }
}

/// Values written to `notifications.status`.
///
/// The column itself is free-form text; rows are read back as `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Email-channel delivery status (`notifications.email_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One persisted notification and its delivery state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub notification_type: NotificationType,
    pub status: String,
    pub metadata: Option<serde_json::Value>,
    pub is_emailed: bool,
    pub email_status: Option<DeliveryStatus>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Listing projection returned by `GET /{userId}/notifications`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSummary {
    pub id: i32,
    pub title: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub status: String,
}

impl From<&Notification> for NotificationSummary {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            title: n.title.clone(),
            notification_type: n.notification_type,
            status: n.status.clone(),
        }
    }
}
