//! Notification dispatcher.
//!
//! Routes a request to its delivery channel:
//! 1. Resolve the recipient (email address or phone) where the channel needs one
//! 2. Persist the notification row before any send is attempted
//! 3. Invoke the channel transport under a per-send timeout
//! 4. Record the outcome on the row and report it to the caller
//!
//! Transport failures are recorded, not raised. Only persistence failures and
//! unresolvable recipients surface as [`DispatchError`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use courier_common::config::AppConfig;
use courier_common::types::{
    DeliveryStatus, Notification, NotificationStatus, NotificationType,
};

use crate::channels::{
    DeliveryReceipt, EmailMessage, EmailTransport, SmsMessage, SmsTransport, TransportError,
    email_transport_from_config, is_e164, sms_transport_from_config,
};
use crate::directory::{PgUserDirectory, UserDirectory};
use crate::error::DispatchError;
use crate::request::{
    Delivery, DispatchOutcome, DispatchRequest, MarkReadOutcome, NotificationContent, RetrySummary,
};
use crate::store::{
    NewNotification, NotificationStore, NotificationUpdate, PgNotificationStore, RetryFilter,
};

/// Default upper bound for a single transport call.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates notification records and delivers them through the configured channels.
pub struct Dispatcher {
    store: Arc<dyn NotificationStore>,
    users: Arc<dyn UserDirectory>,
    email: Arc<dyn EmailTransport>,
    sms: Arc<dyn SmsTransport>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        users: Arc<dyn UserDirectory>,
        email: Arc<dyn EmailTransport>,
        sms: Arc<dyn SmsTransport>,
    ) -> Self {
        Self {
            store,
            users,
            email,
            sms,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Build a PostgreSQL-backed dispatcher with transports chosen from `config`.
    pub fn from_config(pool: PgPool, config: &AppConfig) -> Result<Self, TransportError> {
        Ok(Self::new(
            Arc::new(PgNotificationStore::new(pool.clone())),
            Arc::new(PgUserDirectory::new(pool)),
            email_transport_from_config(config)?,
            sms_transport_from_config(config)?,
        )
        .with_send_timeout(Duration::from_secs(config.delivery_timeout_secs)))
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Create a notification record and attempt delivery on its channel.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        match request {
            DispatchRequest::InApp(content) => self.dispatch_in_app(content).await,
            DispatchRequest::Email(content) => self.dispatch_email(content).await,
            DispatchRequest::Sms { content, phone } => self.dispatch_sms(content, phone).await,
        }
    }

    async fn dispatch_in_app(
        &self,
        content: NotificationContent,
    ) -> Result<DispatchOutcome, DispatchError> {
        let metadata = content.metadata.clone().map(Value::Object);
        let row = self
            .store
            .insert(&new_record(&content, NotificationType::InApp, metadata))
            .await?;

        info!(
            notification_id = row.id,
            user_id = content.user_id,
            "In-app notification created"
        );

        Ok(DispatchOutcome {
            id: row.id,
            notification_type: NotificationType::InApp,
            delivery: Delivery::Sent,
        })
    }

    async fn dispatch_email(
        &self,
        content: NotificationContent,
    ) -> Result<DispatchOutcome, DispatchError> {
        let user_id = content.user_id;
        let recipient = self
            .users
            .find_contact(user_id)
            .await?
            .and_then(|c| c.email().map(str::to_string))
            .ok_or(DispatchError::MissingRecipient { user_id })?;

        let metadata = content.metadata.clone().map(Value::Object);
        let row = self
            .store
            .insert(&new_record(&content, NotificationType::Email, metadata))
            .await?;

        let email = EmailMessage::for_notification(&recipient, &content.title, &content.message);

        let delivery = match self.send_email(&email).await {
            Ok(receipt) => {
                self.store
                    .update(
                        row.id,
                        &NotificationUpdate {
                            is_emailed: Some(true),
                            email_status: Some(DeliveryStatus::Sent),
                            ..Default::default()
                        },
                    )
                    .await?;

                info!(
                    notification_id = row.id,
                    user_id,
                    message_id = %receipt.message_id,
                    provider_status = ?receipt.provider_status,
                    "Email notification sent"
                );
                Delivery::Sent
            }
            Err(e) => {
                warn!(
                    notification_id = row.id,
                    user_id,
                    provider = self.email.provider(),
                    error = %e,
                    "Email notification failed; eligible for retry"
                );

                self.store
                    .update(
                        row.id,
                        &NotificationUpdate {
                            is_emailed: Some(false),
                            email_status: Some(DeliveryStatus::Failed),
                            retry_count: Some(1),
                            ..Default::default()
                        },
                    )
                    .await?;

                Delivery::Failed {
                    reason: e.to_string(),
                }
            }
        };

        Ok(DispatchOutcome {
            id: row.id,
            notification_type: NotificationType::Email,
            delivery,
        })
    }

    async fn dispatch_sms(
        &self,
        content: NotificationContent,
        phone: Option<String>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let user_id = content.user_id;
        let phone = match phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
        {
            Some(phone) => phone,
            None => {
                debug!(user_id, "No phone in request, using the stored phone");
                let contact = self
                    .users
                    .find_contact(user_id)
                    .await?
                    .ok_or(DispatchError::UserNotFound { user_id })?;
                contact
                    .phone()
                    .map(str::to_string)
                    .ok_or(DispatchError::MissingPhone { user_id })?
            }
        };

        if !is_e164(&phone) {
            warn!(user_id, phone = %phone, "Phone number may not be in E.164 format");
        }

        let mut metadata = content.metadata.clone().unwrap_or_default();
        metadata.insert("phoneNumber".to_string(), Value::String(phone.clone()));

        let row = self
            .store
            .insert(&new_record(
                &content,
                NotificationType::Sms,
                Some(Value::Object(metadata.clone())),
            ))
            .await?;

        debug!(notification_id = row.id, "SMS notification record created");

        let sms = SmsMessage::new(phone, content.message.clone());

        let (status, delivery) = match self.send_sms(&sms).await {
            Ok(receipt) => {
                info!(
                    notification_id = row.id,
                    user_id,
                    message_id = %receipt.message_id,
                    provider_status = ?receipt.provider_status,
                    "SMS notification sent"
                );
                metadata.insert("smsStatus".to_string(), Value::from("sent"));
                metadata.insert("messageId".to_string(), Value::from(receipt.message_id));
                (NotificationStatus::Sent, Delivery::Sent)
            }
            Err(e) => {
                warn!(
                    notification_id = row.id,
                    user_id,
                    provider = self.sms.provider(),
                    error = %e,
                    "SMS notification failed"
                );
                let reason = e.to_string();
                metadata.insert("smsStatus".to_string(), Value::from("failed"));
                metadata.insert("error".to_string(), Value::from(reason.clone()));
                (NotificationStatus::Failed, Delivery::Failed { reason })
            }
        };

        self.store
            .update(
                row.id,
                &NotificationUpdate {
                    status: Some(status),
                    metadata: Some(Value::Object(metadata)),
                    ..Default::default()
                },
            )
            .await?;

        Ok(DispatchOutcome {
            id: row.id,
            notification_type: NotificationType::Sms,
            delivery,
        })
    }

    /// Re-send failed emails that have been attempted exactly once.
    ///
    /// Candidates are processed one at a time. Each one's retry count goes up by
    /// one whatever happens to it, and a failure on one record never stops the
    /// batch.
    pub async fn retry_failed_emails(&self) -> Result<RetrySummary, DispatchError> {
        let candidates = self
            .store
            .find_retry_candidates(&RetryFilter::failed_emails())
            .await?;

        info!(count = candidates.len(), "Retrying failed emails");

        let mut summary = RetrySummary::default();
        for notification in &candidates {
            match self.retry_email(notification).await {
                Ok(Delivery::Sent) => summary.success += 1,
                Ok(Delivery::Failed { reason }) => {
                    debug!(notification_id = notification.id, reason = %reason, "Email retry failed");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(
                        notification_id = notification.id,
                        error = %e,
                        "Could not record email retry"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            success = summary.success,
            failed = summary.failed,
            "Email retry batch finished"
        );

        Ok(summary)
    }

    async fn retry_email(&self, notification: &Notification) -> Result<Delivery, DispatchError> {
        let next_count = notification.retry_count + 1;

        let recipient = match self.users.find_contact(notification.user_id).await {
            Ok(contact) => contact.and_then(|c| c.email().map(str::to_string)),
            Err(e) => {
                warn!(user_id = notification.user_id, error = %e, "User lookup failed during retry");
                None
            }
        };

        let Some(recipient) = recipient else {
            self.store
                .update(notification.id, &NotificationUpdate::retry_count(next_count))
                .await?;
            return Ok(Delivery::Failed {
                reason: format!("No email found for user {}", notification.user_id),
            });
        };

        let email =
            EmailMessage::for_notification(&recipient, &notification.title, &notification.message);

        match self.send_email(&email).await {
            Ok(receipt) => {
                self.store
                    .update(
                        notification.id,
                        &NotificationUpdate {
                            is_emailed: Some(true),
                            email_status: Some(DeliveryStatus::Sent),
                            retry_count: Some(next_count),
                            ..Default::default()
                        },
                    )
                    .await?;

                info!(
                    notification_id = notification.id,
                    message_id = %receipt.message_id,
                    provider_status = ?receipt.provider_status,
                    "Email retry sent"
                );
                Ok(Delivery::Sent)
            }
            Err(e) => {
                self.store
                    .update(notification.id, &NotificationUpdate::retry_count(next_count))
                    .await?;
                Ok(Delivery::Failed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Mark a notification owned by `user_id` as read.
    pub async fn mark_as_read(
        &self,
        notification_id: i32,
        user_id: i32,
    ) -> Result<MarkReadOutcome, DispatchError> {
        if self
            .store
            .find_owned(notification_id, user_id)
            .await?
            .is_none()
        {
            debug!(notification_id, user_id, "Notification not found or not owned");
            return Ok(MarkReadOutcome::NotFound {
                id: notification_id,
            });
        }

        let updated = self
            .store
            .update(
                notification_id,
                &NotificationUpdate::status(NotificationStatus::Read),
            )
            .await?;

        Ok(match updated {
            Some(row) => MarkReadOutcome::Read { id: row.id },
            None => MarkReadOutcome::NotFound {
                id: notification_id,
            },
        })
    }

    /// All notifications for `user_id`, oldest first.
    pub async fn get_user_notifications(
        &self,
        user_id: i32,
        notification_type: Option<NotificationType>,
    ) -> Result<Vec<Notification>, DispatchError> {
        Ok(self.store.list_for_user(user_id, notification_type).await?)
    }

    async fn send_email(&self, email: &EmailMessage) -> Result<DeliveryReceipt, TransportError> {
        match tokio::time::timeout(self.send_timeout, self.email.send_email(email)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.send_timeout)),
        }
    }

    async fn send_sms(&self, sms: &SmsMessage) -> Result<DeliveryReceipt, TransportError> {
        match tokio::time::timeout(self.send_timeout, self.sms.send_sms(sms)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.send_timeout)),
        }
    }
}

fn new_record(
    content: &NotificationContent,
    notification_type: NotificationType,
    metadata: Option<Value>,
) -> NewNotification {
    NewNotification {
        user_id: content.user_id,
        title: content.title.clone(),
        message: content.message.clone(),
        notification_type,
        metadata,
    }
}
