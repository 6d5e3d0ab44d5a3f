//! Notification record store.
//!
//! One row per notification, carrying its delivery state and retry metadata.
//! Every operation touches a single record; no multi-row transaction is needed.

use async_trait::async_trait;
use sqlx::PgPool;

use courier_common::types::{DeliveryStatus, Notification, NotificationStatus, NotificationType};

/// Fields supplied when a notification row is created.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i32,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub metadata: Option<serde_json::Value>,
}

/// Partial update applied to an existing row. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct NotificationUpdate {
    pub status: Option<NotificationStatus>,
    pub metadata: Option<serde_json::Value>,
    pub is_emailed: Option<bool>,
    pub email_status: Option<DeliveryStatus>,
    pub retry_count: Option<i32>,
}

impl NotificationUpdate {
    pub fn status(status: NotificationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn retry_count(retry_count: i32) -> Self {
        Self {
            retry_count: Some(retry_count),
            ..Default::default()
        }
    }

    /// Apply this update to an in-memory row.
    pub fn apply_to(&self, row: &mut Notification) {
        if let Some(status) = self.status {
            row.status = status.to_string();
        }
        if let Some(metadata) = &self.metadata {
            row.metadata = Some(metadata.clone());
        }
        if let Some(is_emailed) = self.is_emailed {
            row.is_emailed = is_emailed;
        }
        if let Some(email_status) = self.email_status {
            row.email_status = Some(email_status);
        }
        if let Some(retry_count) = self.retry_count {
            row.retry_count = retry_count;
        }
    }
}

/// Selection criteria for the email retry batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryFilter {
    pub notification_type: NotificationType,
    pub email_status: DeliveryStatus,
    pub retry_count: i32,
    pub limit: i64,
}

impl RetryFilter {
    /// Maximum number of records processed by one retry batch.
    pub const BATCH_LIMIT: i64 = 10;

    /// Failed emails that have been attempted exactly once.
    ///
    /// Records whose single retry also failed end up with `retry_count = 2` and
    /// are never selected again.
    pub fn failed_emails() -> Self {
        Self {
            notification_type: NotificationType::Email,
            email_status: DeliveryStatus::Failed,
            retry_count: 1,
            limit: Self::BATCH_LIMIT,
        }
    }

    pub fn matches(&self, row: &Notification) -> bool {
        row.notification_type == self.notification_type
            && row.email_status == Some(self.email_status)
            && row.retry_count == self.retry_count
    }
}

/// Persistence contract consumed by the dispatcher.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a row and return it as persisted (id, defaults, timestamp).
    async fn insert(&self, new: &NewNotification) -> Result<Notification, sqlx::Error>;

    /// Merge `changes` into the row with `id`. Returns `None` if no such row.
    async fn update(
        &self,
        id: i32,
        changes: &NotificationUpdate,
    ) -> Result<Option<Notification>, sqlx::Error>;

    /// All rows for a user, oldest first, optionally restricted to one type.
    async fn list_for_user(
        &self,
        user_id: i32,
        notification_type: Option<NotificationType>,
    ) -> Result<Vec<Notification>, sqlx::Error>;

    /// The row with `id`, only if it belongs to `user_id`.
    async fn find_owned(&self, id: i32, user_id: i32) -> Result<Option<Notification>, sqlx::Error>;

    /// Up to `filter.limit` rows eligible for an email retry.
    async fn find_retry_candidates(
        &self,
        filter: &RetryFilter,
    ) -> Result<Vec<Notification>, sqlx::Error>;
}

/// PostgreSQL-backed notification store.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(&self, new: &NewNotification) -> Result<Notification, sqlx::Error> {
        let row: Notification = sqlx::query_as(
            r#"
            INSERT INTO notifications (user_id, title, message, type, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.message)
        .bind(new.notification_type.as_str())
        .bind(&new.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update(
        &self,
        id: i32,
        changes: &NotificationUpdate,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let row: Option<Notification> = sqlx::query_as(
            r#"
            UPDATE notifications
            SET status = COALESCE($2, status),
                metadata = COALESCE($3, metadata),
                is_emailed = COALESCE($4, is_emailed),
                email_status = COALESCE($5, email_status),
                retry_count = COALESCE($6, retry_count)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.status.map(|s| s.as_str()))
        .bind(&changes.metadata)
        .bind(changes.is_emailed)
        .bind(changes.email_status.map(|s| s.to_string()))
        .bind(changes.retry_count)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_for_user(
        &self,
        user_id: i32,
        notification_type: Option<NotificationType>,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let rows: Vec<Notification> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1
              AND ($2::text IS NULL OR type = $2)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(notification_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_owned(&self, id: i32, user_id: i32) -> Result<Option<Notification>, sqlx::Error> {
        let row: Option<Notification> =
            sqlx::query_as("SELECT * FROM notifications WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row)
    }

    async fn find_retry_candidates(
        &self,
        filter: &RetryFilter,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let rows: Vec<Notification> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE type = $1
              AND email_status = $2
              AND retry_count = $3
            ORDER BY id ASC
            LIMIT $4
            "#,
        )
        .bind(filter.notification_type.as_str())
        .bind(filter.email_status.to_string())
        .bind(filter.retry_count)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
