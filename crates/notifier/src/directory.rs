//! User contact lookup used to resolve delivery recipients.

use async_trait::async_trait;
use sqlx::PgPool;

/// Contact details stored for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct UserContact {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl UserContact {
    /// Stored email, if non-blank.
    pub fn email(&self) -> Option<&str> {
        non_blank(self.email.as_deref())
    }

    /// Stored phone, if non-blank.
    pub fn phone(&self) -> Option<&str> {
        non_blank(self.phone.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Contact details for `user_id`, or `None` if the user does not exist.
    async fn find_contact(&self, user_id: i32) -> Result<Option<UserContact>, sqlx::Error>;
}

/// Reads contacts from the `users` table.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_contact(&self, user_id: i32) -> Result<Option<UserContact>, sqlx::Error> {
        let contact: Option<UserContact> =
            sqlx::query_as("SELECT email, phone FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(contact)
    }
}
