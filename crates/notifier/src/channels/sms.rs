//! SMS channel backed by the Twilio REST API.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{DeliveryReceipt, SmsTransport, TransportError};

/// Basic E.164 shape: `+`, a non-zero leading digit, up to 15 digits total.
static E164_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").unwrap());

/// Whether `phone` looks like an E.164 number.
pub fn is_e164(phone: &str) -> bool {
    E164_REGEX.is_match(phone)
}

/// Prefix a bare number with `+`, dropping any non-digit characters.
///
/// Numbers that already start with `+` are returned unchanged.
pub fn normalize_phone(phone: &str) -> String {
    if phone.starts_with('+') {
        return phone.to_string();
    }
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("+{}", digits)
}

/// An SMS ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

impl SmsMessage {
    pub fn new(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            body: body.into(),
        }
    }

    fn validate(&self) -> Result<(), TransportError> {
        if self.to.trim().is_empty() || self.body.is_empty() {
            return Err(TransportError::InvalidInput(
                "Phone number and message are required".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

/// Translate a Twilio error code into a caller-facing message.
fn twilio_error_message(code: Option<i64>, fallback: String) -> String {
    match code {
        Some(21211) => "Invalid phone number format".to_string(),
        Some(21608) => "Unverified phone number (trial account limitation)".to_string(),
        _ => fallback,
    }
}

/// Twilio SMS transport.
pub struct TwilioSmsTransport {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSmsTransport {
    pub fn new(
        base_url: String,
        account_sid: String,
        auth_token: String,
        from_number: String,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
            from_number,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

#[async_trait]
impl SmsTransport for TwilioSmsTransport {
    fn provider(&self) -> &'static str {
        "twilio"
    }

    async fn send_sms(&self, message: &SmsMessage) -> Result<DeliveryReceipt, TransportError> {
        message.validate()?;

        let to = normalize_phone(&message.to);
        if to != message.to {
            debug!(original = %message.to, formatted = %to, "Reformatted phone number");
        }

        let form = [
            ("To", to.as_str()),
            ("From", self.from_number.as_str()),
            ("Body", message.body.as_str()),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<TwilioErrorBody>(&body).ok();
            let code = parsed.as_ref().and_then(|b| b.code);
            let fallback = parsed.and_then(|b| b.message).unwrap_or(body);
            warn!(status = status.as_u16(), ?code, error = %fallback, "Twilio rejected SMS");
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message: twilio_error_message(code, fallback),
            });
        }

        let sent: TwilioMessage = response.json().await?;
        info!(to = %to, sid = %sent.sid, "SMS sent");

        Ok(DeliveryReceipt {
            message_id: sent.sid,
            provider_status: sent.status,
        })
    }
}

/// Stand-in used when Twilio credentials are missing: logs and succeeds.
pub struct DevModeSmsTransport;

#[async_trait]
impl SmsTransport for DevModeSmsTransport {
    fn provider(&self) -> &'static str {
        "dev-mode"
    }

    async fn send_sms(&self, message: &SmsMessage) -> Result<DeliveryReceipt, TransportError> {
        message.validate()?;

        let to = normalize_phone(&message.to);
        info!(
            to = %to,
            body = %message.body,
            "DEVELOPMENT MODE: SMS not sent"
        );

        Ok(DeliveryReceipt {
            message_id: format!("dev_{}", chrono::Utc::now().timestamp_millis()),
            provider_status: Some("dev-mode".to_string()),
        })
    }
}
