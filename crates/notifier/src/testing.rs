//! In-memory collaborators for exercising the dispatcher without PostgreSQL or
//! network providers. Enabled for this crate's tests and, through the
//! `test-util` feature, for downstream crates.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use courier_common::types::{DeliveryStatus, Notification, NotificationStatus, NotificationType};

use crate::channels::{
    DeliveryReceipt, EmailMessage, EmailTransport, SmsMessage, SmsTransport, TransportError,
};
use crate::directory::{UserContact, UserDirectory};
use crate::store::{NewNotification, NotificationStore, NotificationUpdate, RetryFilter};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Vec-backed notification store. Ids are assigned sequentially from 1.
#[derive(Default)]
pub struct MemoryNotificationStore {
    rows: Mutex<Vec<Notification>>,
    unavailable: AtomicBool,
    failing_updates: Mutex<HashSet<i32>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make updates to row `id` fail while every other operation keeps working.
    pub fn fail_updates_for(&self, id: i32) {
        lock(&self.failing_updates).insert(id);
    }

    /// Snapshot of all rows in insertion order.
    pub fn rows(&self) -> Vec<Notification> {
        lock(&self.rows).clone()
    }

    pub fn get(&self, id: i32) -> Option<Notification> {
        lock(&self.rows).iter().find(|n| n.id == id).cloned()
    }

    /// Insert a fully-specified row, assigning the next id.
    pub fn seed(&self, mut row: Notification) -> Notification {
        let mut rows = lock(&self.rows);
        row.id = rows.len() as i32 + 1;
        rows.push(row.clone());
        row
    }

    /// Insert an email row in the state a failed first send leaves behind.
    pub fn seed_failed_email(&self, user_id: i32, title: &str) -> Notification {
        let mut row = Self::row(&NewNotification {
            user_id,
            title: title.to_string(),
            message: format!("{} body", title),
            notification_type: NotificationType::Email,
            metadata: None,
        });
        row.email_status = Some(DeliveryStatus::Failed);
        row.retry_count = 1;
        self.seed(row)
    }

    fn row(new: &NewNotification) -> Notification {
        Notification {
            id: 0,
            user_id: new.user_id,
            title: new.title.clone(),
            message: new.message.clone(),
            notification_type: new.notification_type,
            status: NotificationStatus::Unread.to_string(),
            metadata: new.metadata.clone(),
            is_emailed: false,
            email_status: None,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    fn check_available(&self) -> Result<(), sqlx::Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert(&self, new: &NewNotification) -> Result<Notification, sqlx::Error> {
        self.check_available()?;
        Ok(self.seed(Self::row(new)))
    }

    async fn update(
        &self,
        id: i32,
        changes: &NotificationUpdate,
    ) -> Result<Option<Notification>, sqlx::Error> {
        self.check_available()?;
        if lock(&self.failing_updates).contains(&id) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut rows = lock(&self.rows);
        Ok(rows.iter_mut().find(|n| n.id == id).map(|row| {
            changes.apply_to(row);
            row.clone()
        }))
    }

    async fn list_for_user(
        &self,
        user_id: i32,
        notification_type: Option<NotificationType>,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        self.check_available()?;
        let mut matching: Vec<Notification> = lock(&self.rows)
            .iter()
            .filter(|n| n.user_id == user_id)
            .filter(|n| notification_type.is_none_or(|t| n.notification_type == t))
            .cloned()
            .collect();
        matching.sort_by_key(|n| (n.created_at, n.id));
        Ok(matching)
    }

    async fn find_owned(&self, id: i32, user_id: i32) -> Result<Option<Notification>, sqlx::Error> {
        self.check_available()?;
        Ok(lock(&self.rows)
            .iter()
            .find(|n| n.id == id && n.user_id == user_id)
            .cloned())
    }

    async fn find_retry_candidates(
        &self,
        filter: &RetryFilter,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        self.check_available()?;
        Ok(lock(&self.rows)
            .iter()
            .filter(|n| filter.matches(n))
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }
}

/// Map-backed user directory.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: Mutex<HashMap<i32, UserContact>>,
    lookups: Mutex<Vec<i32>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user_id: i32, email: Option<&str>, phone: Option<&str>) -> Self {
        lock(&self.users).insert(
            user_id,
            UserContact {
                email: email.map(str::to_string),
                phone: phone.map(str::to_string),
            },
        );
        self
    }

    /// User ids looked up so far, in order.
    pub fn lookups(&self) -> Vec<i32> {
        lock(&self.lookups).clone()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_contact(&self, user_id: i32) -> Result<Option<UserContact>, sqlx::Error> {
        lock(&self.lookups).push(user_id);
        Ok(lock(&self.users).get(&user_id).cloned())
    }
}

/// Queue of canned outcomes shared by the scripted transports.
struct Script<M> {
    outcomes: Mutex<VecDeque<Result<(), String>>>,
    fallback: Result<(), String>,
    delay: Option<Duration>,
    sent: Mutex<Vec<M>>,
}

impl<M: Clone> Script<M> {
    fn new(fallback: Result<(), String>) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    async fn run(&self, message: &M, prefix: &str) -> Result<DeliveryReceipt, TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut sent = lock(&self.sent);
        sent.push(message.clone());
        let attempt = sent.len();
        drop(sent);

        let outcome = lock(&self.outcomes)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match outcome {
            Ok(()) => Ok(DeliveryReceipt {
                message_id: format!("{}_{}", prefix, attempt),
                provider_status: Some("queued".to_string()),
            }),
            Err(message) => Err(TransportError::Rejected {
                status: 502,
                message,
            }),
        }
    }
}

/// Email transport that replays queued outcomes and records every message.
pub struct ScriptedEmailTransport(Script<EmailMessage>);

impl ScriptedEmailTransport {
    /// Succeeds unless an outcome is queued.
    pub fn succeeding() -> Self {
        Self(Script::new(Ok(())))
    }

    /// Fails with `reason` unless an outcome is queued.
    pub fn failing(reason: &str) -> Self {
        Self(Script::new(Err(reason.to_string())))
    }

    /// Wait `delay` before answering each send.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.0.delay = Some(delay);
        self
    }

    /// Queue the outcome of the next unscripted send.
    pub fn push_outcome(&self, outcome: Result<(), &str>) {
        lock(&self.0.outcomes).push_back(outcome.map_err(str::to_string));
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        lock(&self.0.sent).clone()
    }
}

#[async_trait]
impl EmailTransport for ScriptedEmailTransport {
    fn provider(&self) -> &'static str {
        "scripted"
    }

    async fn send_email(&self, message: &EmailMessage) -> Result<DeliveryReceipt, TransportError> {
        self.0.run(message, "email").await
    }
}

/// SMS transport that replays queued outcomes and records every message.
pub struct ScriptedSmsTransport(Script<SmsMessage>);

impl ScriptedSmsTransport {
    pub fn succeeding() -> Self {
        Self(Script::new(Ok(())))
    }

    pub fn failing(reason: &str) -> Self {
        Self(Script::new(Err(reason.to_string())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.0.delay = Some(delay);
        self
    }

    pub fn push_outcome(&self, outcome: Result<(), &str>) {
        lock(&self.0.outcomes).push_back(outcome.map_err(str::to_string));
    }

    pub fn sent(&self) -> Vec<SmsMessage> {
        lock(&self.0.sent).clone()
    }
}

#[async_trait]
impl SmsTransport for ScriptedSmsTransport {
    fn provider(&self) -> &'static str {
        "scripted"
    }

    async fn send_sms(&self, message: &SmsMessage) -> Result<DeliveryReceipt, TransportError> {
        self.0.run(message, "sms").await
    }
}
