//! Delivery channels.
//!
//! The dispatch job hands each rendered message to a [`DeliveryChannel`].
//! Channels make exactly one attempt; a failure surfaces as
//! [`Error::Delivery`] and the dedup record stays unsent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use cohort_core::defaults::DELIVERY_TIMEOUT_SECS;
use cohort_core::{DeliveryChannel, Error, OutboundMessage, Result};

/// Configuration for [`WebhookChannel`].
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoint receiving one JSON `OutboundMessage` per POST.
    pub url: String,
    /// Bearer token (optional).
    pub token: Option<String>,
    pub timeout: Duration,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            timeout: Duration::from_secs(DELIVERY_TIMEOUT_SECS),
        }
    }

    /// Load from environment; `None` when `DELIVERY_WEBHOOK_URL` is unset.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DELIVERY_WEBHOOK_URL` | (none) | Endpoint URL |
    /// | `DELIVERY_WEBHOOK_TOKEN` | (none) | Bearer token |
    /// | `DELIVERY_TIMEOUT_SECS` | `10` | Request timeout |
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("DELIVERY_WEBHOOK_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())?;
        let mut config = Self::new(url.trim());
        config.token = std::env::var("DELIVERY_WEBHOOK_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        if let Some(secs) = std::env::var("DELIVERY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs.max(1));
        }
        Some(config)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Posts each message as JSON to an HTTP endpoint.
pub struct WebhookChannel {
    client: Client,
    config: WebhookConfig,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
        let start = Instant::now();
        let mut req = self.client.post(&self.config.url).json(message);
        if let Some(ref token) = self.config.token {
            req = req.bearer_auth(token);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Delivery(format!(
                "Endpoint returned {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        debug!(
            subsystem = "jobs",
            component = "webhook",
            op = "deliver",
            destination = %message.destination,
            duration_ms = start.elapsed().as_millis() as u64,
            "Message delivered"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Writes each message to the log and reports success.
///
/// Used when no webhook is configured, and for local runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

#[async_trait]
impl DeliveryChannel for LogChannel {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
        info!(
            subsystem = "jobs",
            component = "log_channel",
            op = "deliver",
            destination = %message.destination,
            has_image = message.image_ref.is_some(),
            action_link = message.action_link.as_deref().unwrap_or(""),
            text = %message.text,
            "Notification"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Webhook channel when configured, otherwise [`LogChannel`].
pub fn channel_from_env() -> Result<Arc<dyn DeliveryChannel>> {
    match WebhookConfig::from_env() {
        Some(config) => {
            info!(
                subsystem = "jobs",
                component = "webhook",
                url = %config.url,
                "Using webhook delivery channel"
            );
            Ok(Arc::new(WebhookChannel::new(config)?))
        }
        None => {
            info!(
                subsystem = "jobs",
                component = "log_channel",
                "DELIVERY_WEBHOOK_URL not set, notifications will only be logged"
            );
            Ok(Arc::new(LogChannel))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> OutboundMessage {
        OutboundMessage {
            destination: "42".into(),
            text: "New posting: Logo".into(),
            image_ref: Some("img/1.png".into()),
            action_link: None,
        }
    }

    #[tokio::test]
    async fn test_webhook_posts_json_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(serde_json::json!({
                "destination": "42",
                "text": "New posting: Logo",
                "image_ref": "img/1.png",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(
            WebhookConfig::new(format!("{}/notify", server.uri())).with_token("secret"),
        )
        .unwrap();
        channel.deliver(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_non_success_is_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(WebhookConfig::new(server.uri())).unwrap();
        let err = channel.deliver(&message()).await.unwrap_err();
        assert!(matches!(err, Error::Delivery(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn test_webhook_unreachable_is_delivery_error() {
        let channel = WebhookChannel::new(
            WebhookConfig::new("http://127.0.0.1:9/notify").with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = channel.deliver(&message()).await.unwrap_err();
        assert!(matches!(err, Error::Delivery(_)));
    }

    #[tokio::test]
    async fn test_log_channel_always_succeeds() {
        assert!(LogChannel.deliver(&message()).await.is_ok());
        assert_eq!(LogChannel.name(), "log");
    }
}
