//! Delivery channels.
//!
//! Each channel wraps a third-party transport behind a small async trait so the
//! dispatcher can be built with real providers in production and scripted
//! transports in tests:
//! - Email via the Resend HTTP API (or an unavailable stand-in)
//! - SMS via the Twilio REST API (or a logging dev-mode stand-in)

mod email;
mod sms;

pub use email::{EmailMessage, ResendEmailTransport, UnavailableEmailTransport};
pub use sms::{
    DevModeSmsTransport, SmsMessage, TwilioSmsTransport, is_e164, normalize_phone,
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use courier_common::config::AppConfig;

/// Provider acknowledgement for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Provider-assigned message identifier.
    pub message_id: String,
    /// Provider-reported status, when it returns one.
    pub provider_status: Option<String>,
}

/// Failure to hand a message to a provider.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0} transport is not configured")]
    Unavailable(&'static str),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Sends email through a third-party provider.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Provider name, for logging.
    fn provider(&self) -> &'static str;

    async fn send_email(&self, message: &EmailMessage) -> Result<DeliveryReceipt, TransportError>;
}

/// Sends SMS through a third-party provider.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// Provider name, for logging.
    fn provider(&self) -> &'static str;

    async fn send_sms(&self, message: &SmsMessage) -> Result<DeliveryReceipt, TransportError>;
}

/// Build the email transport for the given configuration.
///
/// Without an API key every send fails, which leaves the record eligible for
/// a later retry once credentials are in place. Fails only if the HTTP client
/// cannot be built.
pub fn email_transport_from_config(
    config: &AppConfig,
) -> Result<Arc<dyn EmailTransport>, TransportError> {
    match &config.resend_api_key {
        Some(api_key) => {
            tracing::info!(from = %config.email_from, "Email delivery via Resend enabled");
            Ok(Arc::new(ResendEmailTransport::new(
                config.email_api_url.clone(),
                api_key.clone(),
                config.email_from.clone(),
                config.email_from_name.clone(),
                Duration::from_secs(config.delivery_timeout_secs),
            )?))
        }
        None => {
            tracing::warn!("RESEND_API_KEY missing! Email sends will be recorded as failed.");
            Ok(Arc::new(UnavailableEmailTransport))
        }
    }
}

/// Build the SMS transport for the given configuration.
///
/// Missing Twilio credentials select the dev-mode transport, which logs the
/// message and reports success.
pub fn sms_transport_from_config(
    config: &AppConfig,
) -> Result<Arc<dyn SmsTransport>, TransportError> {
    match (&config.twilio_account_sid, &config.twilio_auth_token) {
        (Some(sid), Some(token)) => {
            if config.twilio_phone_number.is_none() {
                tracing::warn!("TWILIO_PHONE_NUMBER missing; Twilio will reject sends");
            }
            tracing::info!("SMS delivery via Twilio enabled");
            Ok(Arc::new(TwilioSmsTransport::new(
                config.twilio_api_url.clone(),
                sid.clone(),
                token.clone(),
                config.twilio_phone_number.clone().unwrap_or_default(),
                Duration::from_secs(config.delivery_timeout_secs),
            )?))
        }
        _ => {
            tracing::warn!("Twilio credentials missing! SMS will be logged but not sent.");
            Ok(Arc::new(DevModeSmsTransport))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            database_url: "unused".to_string(),
            db_max_connections: 1,
            port: 0,
            jwt_secret: "secret".to_string(),
            jwt_expiry_hours: 24,
            resend_api_key: None,
            email_api_url: "http://localhost:1".to_string(),
            email_from: "noreply@example.com".to_string(),
            email_from_name: "Courier".to_string(),
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_phone_number: None,
            twilio_api_url: "http://localhost:1".to_string(),
            delivery_timeout_secs: 5,
        }
    }

    #[test]
    fn test_transports_without_credentials() {
        let config = config();
        assert_eq!(email_transport_from_config(&config).unwrap().provider(), "unavailable");
        assert_eq!(sms_transport_from_config(&config).unwrap().provider(), "dev-mode");
    }

    #[test]
    fn test_transports_with_credentials() {
        let config = AppConfig {
            resend_api_key: Some("re_test".to_string()),
            twilio_account_sid: Some("AC123".to_string()),
            twilio_auth_token: Some("token".to_string()),
            twilio_phone_number: Some("+15550000000".to_string()),
            ..config()
        };
        assert_eq!(email_transport_from_config(&config).unwrap().provider(), "resend");
        assert_eq!(sms_transport_from_config(&config).unwrap().provider(), "twilio");
    }

    #[test]
    fn test_sms_requires_both_credentials() {
        let config = AppConfig {
            twilio_account_sid: Some("AC123".to_string()),
            ..config()
        };
        assert_eq!(sms_transport_from_config(&config).unwrap().provider(), "dev-mode");
    }
}
