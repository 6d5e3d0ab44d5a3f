//! Notification delivery for Courier.
//!
//! The [`Dispatcher`] persists every notification before attempting delivery
//! over its channel (in-app, email via Resend, SMS via Twilio) and records the
//! outcome on the stored row. Failed emails are picked up again by
//! [`Dispatcher::retry_failed_emails`].

pub mod channels;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod request;
pub mod store;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use dispatcher::{DEFAULT_SEND_TIMEOUT, Dispatcher};
pub use error::DispatchError;
pub use request::{
    Delivery, DispatchOutcome, DispatchRequest, MarkReadOutcome, NotificationContent, RetrySummary,
};
