use thiserror::Error;

use courier_common::error::AppError;

/// Failures that prevent a dispatch from producing an outcome.
///
/// Delivery failures are not errors: they come back as
/// [`Delivery::Failed`](crate::Delivery::Failed) on a successful dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Wrong type '{0}'! Use in-app, email, sms")]
    InvalidType(String),

    #[error("{0}")]
    Validation(String),

    #[error("No email found for user {user_id}! Check user ID!")]
    MissingRecipient { user_id: i32 },

    #[error("Phone number required for user {user_id}! Provide in request or add to user profile.")]
    MissingPhone { user_id: i32 },

    #[error("User {user_id} not found!")]
    UserNotFound { user_id: i32 },

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Persistence(e) => AppError::Database(e),
            other => AppError::Validation(other.to_string()),
        }
    }
}
