//! Dispatch inputs and outcomes.

use serde::{Serialize, Serializer};

use courier_common::types::{Metadata, NotificationType};

use crate::error::DispatchError;

/// Fields shared by every notification type.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContent {
    pub user_id: i32,
    pub title: String,
    pub message: String,
    pub metadata: Option<Metadata>,
}

impl NotificationContent {
    /// Build content, rejecting a blank title or message.
    pub fn new(
        user_id: i32,
        title: impl Into<String>,
        message: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> Result<Self, DispatchError> {
        let title = title.into();
        let message = message.into();
        if title.trim().is_empty() || message.trim().is_empty() {
            return Err(DispatchError::Validation(
                "Missing stuff! Need userId, title & message".to_string(),
            ));
        }

        Ok(Self {
            user_id,
            title,
            message,
            metadata,
        })
    }
}

/// A validated notification request, tagged by delivery channel.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchRequest {
    InApp(NotificationContent),
    /// The recipient address is resolved from the user's stored email.
    Email(NotificationContent),
    /// `phone` overrides the user's stored phone when present.
    Sms {
        content: NotificationContent,
        phone: Option<String>,
    },
}

impl DispatchRequest {
    /// Build a request from the wire-level type name.
    pub fn new(
        notification_type: &str,
        content: NotificationContent,
        phone: Option<String>,
    ) -> Result<Self, DispatchError> {
        let notification_type: NotificationType = notification_type
            .parse()
            .map_err(|_| DispatchError::InvalidType(notification_type.to_string()))?;

        Ok(Self::with_type(notification_type, content, phone))
    }

    /// Build a request for an already-parsed type. `phone` is ignored unless
    /// the type is SMS.
    pub fn with_type(
        notification_type: NotificationType,
        content: NotificationContent,
        phone: Option<String>,
    ) -> Self {
        match notification_type {
            NotificationType::InApp => DispatchRequest::InApp(content),
            NotificationType::Email => DispatchRequest::Email(content),
            NotificationType::Sms => DispatchRequest::Sms { content, phone },
        }
    }

    pub fn notification_type(&self) -> NotificationType {
        match self {
            DispatchRequest::InApp(_) => NotificationType::InApp,
            DispatchRequest::Email(_) => NotificationType::Email,
            DispatchRequest::Sms { .. } => NotificationType::Sms,
        }
    }

    pub fn content(&self) -> &NotificationContent {
        match self {
            DispatchRequest::InApp(content) | DispatchRequest::Email(content) => content,
            DispatchRequest::Sms { content, .. } => content,
        }
    }
}

/// Result of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed { reason: String },
}

impl Delivery {
    pub fn status(&self) -> &'static str {
        match self {
            Delivery::Sent => "sent",
            Delivery::Failed { .. } => "failed",
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }
}

/// What `dispatch` returns. Serialises as `{id, type, status, error?}`;
/// callers must branch on `status` to detect a failed delivery. Only SMS
/// failures carry `error`; a failed email is reported by status alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub id: i32,
    pub notification_type: NotificationType,
    pub delivery: Delivery,
}

#[derive(Serialize)]
struct DispatchOutcomeBody<'a> {
    id: i32,
    #[serde(rename = "type")]
    notification_type: NotificationType,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Serialize for DispatchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let error = match (&self.delivery, self.notification_type) {
            (Delivery::Failed { reason }, NotificationType::Sms) => Some(reason.as_str()),
            _ => None,
        };

        DispatchOutcomeBody {
            id: self.id,
            notification_type: self.notification_type,
            status: self.delivery.status(),
            error,
        }
        .serialize(serializer)
    }
}

/// Result of `mark_as_read`. A missing or foreign notification is reported,
/// not raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkReadOutcome {
    Read { id: i32 },
    NotFound { id: i32 },
}

#[derive(Serialize)]
struct MarkReadBody {
    id: i32,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

impl MarkReadOutcome {
    pub fn id(&self) -> i32 {
        match self {
            MarkReadOutcome::Read { id } | MarkReadOutcome::NotFound { id } => *id,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            MarkReadOutcome::Read { .. } => "read",
            MarkReadOutcome::NotFound { .. } => "not_found",
        }
    }
}

impl Serialize for MarkReadOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let message = match self {
            MarkReadOutcome::Read { .. } => None,
            MarkReadOutcome::NotFound { .. } => {
                Some("Notification not found or does not belong to user")
            }
        };

        MarkReadBody {
            id: self.id(),
            status: self.status(),
            message,
        }
        .serialize(serializer)
    }
}

/// Counters returned by the email retry batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrySummary {
    pub success: u32,
    pub failed: u32,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn content() -> NotificationContent {
        NotificationContent::new(1, "Hi", "Test", None).unwrap()
    }

    #[test]
    fn test_new_rejects_unknown_type() {
        let err = DispatchRequest::new("push", content(), None).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidType(t) if t == "push"));
    }

    #[test]
    fn test_new_tags_by_type() {
        let req = DispatchRequest::new("sms", content(), Some("+15551234567".into())).unwrap();
        assert_eq!(req.notification_type(), NotificationType::Sms);
        assert!(matches!(req, DispatchRequest::Sms { phone: Some(_), .. }));

        let req = DispatchRequest::new("in-app", content(), Some("+15551234567".into())).unwrap();
        assert_eq!(req, DispatchRequest::InApp(content()));
    }

    #[test]
    fn test_content_rejects_blank_fields() {
        assert!(NotificationContent::new(1, " ", "Test", None).is_err());
        assert!(NotificationContent::new(1, "Hi", "", None).is_err());
    }

    #[test]
    fn test_outcome_serialization() {
        let sent = DispatchOutcome {
            id: 4,
            notification_type: NotificationType::Email,
            delivery: Delivery::Sent,
        };
        assert_eq!(
            serde_json::to_value(&sent).unwrap(),
            json!({"id": 4, "type": "email", "status": "sent"})
        );

        let failed = DispatchOutcome {
            id: 5,
            notification_type: NotificationType::Sms,
            delivery: Delivery::Failed {
                reason: "Invalid phone number format".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({
                "id": 5,
                "type": "sms",
                "status": "failed",
                "error": "Invalid phone number format"
            })
        );

        let failed_email = DispatchOutcome {
            id: 6,
            notification_type: NotificationType::Email,
            delivery: Delivery::Failed {
                reason: "Resend rejected the message".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&failed_email).unwrap(),
            json!({"id": 6, "type": "email", "status": "failed"})
        );
    }

    #[test]
    fn test_mark_read_serialization() {
        assert_eq!(
            serde_json::to_value(MarkReadOutcome::Read { id: 3 }).unwrap(),
            json!({"id": 3, "status": "read"})
        );
        let not_found = serde_json::to_value(MarkReadOutcome::NotFound { id: 9 }).unwrap();
        assert_eq!(not_found["status"], "not_found");
        assert_eq!(not_found["id"], 9);
    }
}
