//! Email channel backed by the Resend HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{DeliveryReceipt, EmailTransport, TransportError};

/// A rendered email ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl EmailMessage {
    /// Render a notification title/message pair into an email.
    pub fn for_notification(to: &str, title: &str, message: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: title.to_string(),
            text: message.to_string(),
            html: format!(
                "<h1>{}</h1><p>{}</p>",
                html_escape::encode_text(title),
                html_escape::encode_text(message)
            ),
        }
    }

    fn validate(&self) -> Result<(), TransportError> {
        if self.to.trim().is_empty() || self.subject.is_empty() || self.text.is_empty() {
            return Err(TransportError::InvalidInput(
                "Missing required email parameters: to, subject, and text".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResendErrorBody {
    message: Option<String>,
}

/// Resend email transport.
pub struct ResendEmailTransport {
    client: Client,
    base_url: String,
    api_key: String,
    from: String,
}

impl ResendEmailTransport {
    pub fn new(
        base_url: String,
        api_key: String,
        from_address: String,
        from_name: String,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            from: format!("\"{}\" <{}>", from_name, from_address),
        })
    }
}

#[async_trait]
impl EmailTransport for ResendEmailTransport {
    fn provider(&self) -> &'static str {
        "resend"
    }

    async fn send_email(&self, message: &EmailMessage) -> Result<DeliveryReceipt, TransportError> {
        message.validate()?;

        let payload = json!({
            "from": self.from,
            "to": [message.to],
            "subject": message.subject,
            "text": message.text,
            "html": message.html,
        });

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ResendErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(body);
            warn!(status = status.as_u16(), error = %message, "Email provider rejected message");
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let sent: ResendResponse = response.json().await?;
        debug!(to = %message.to, message_id = %sent.id, "Email sent");

        Ok(DeliveryReceipt {
            message_id: sent.id,
            provider_status: None,
        })
    }
}

/// Stand-in used when no email credentials are configured.
pub struct UnavailableEmailTransport;

#[async_trait]
impl EmailTransport for UnavailableEmailTransport {
    fn provider(&self) -> &'static str {
        "unavailable"
    }

    async fn send_email(&self, message: &EmailMessage) -> Result<DeliveryReceipt, TransportError> {
        message.validate()?;
        warn!(to = %message.to, subject = %message.subject, "Email transport unavailable");
        Err(TransportError::Unavailable("email"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_notification_escapes_html() {
        let email = EmailMessage::for_notification("a@b.com", "Hi <b>", "1 & 2");
        assert_eq!(email.subject, "Hi <b>");
        assert_eq!(email.text, "1 & 2");
        assert_eq!(email.html, "<h1>Hi &lt;b&gt;</h1><p>1 &amp; 2</p>");
    }

    #[test]
    fn test_validate_requires_fields() {
        let mut email = EmailMessage::for_notification("a@b.com", "Hi", "Test");
        assert!(email.validate().is_ok());

        email.to = "  ".to_string();
        assert!(matches!(
            email.validate(),
            Err(TransportError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_transport_fails() {
        let email = EmailMessage::for_notification("a@b.com", "Hi", "Test");
        let result = UnavailableEmailTransport.send_email(&email).await;
        assert!(matches!(result, Err(TransportError::Unavailable("email"))));
    }

    #[test]
    fn test_from_header() {
        let transport = ResendEmailTransport::new(
            "https://api.resend.com/".to_string(),
            "key".to_string(),
            "noreply@example.com".to_string(),
            "Notification System".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(transport.from, "\"Notification System\" <noreply@example.com>");
        assert_eq!(transport.base_url, "https://api.resend.com");
    }
}
