//! Outbound notification events. Delivery is best effort: failures are logged and
//! never reach the operation that produced the event.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    ConfigReady,
    ProvisionFailed,
    Rejected,
    LimitReached,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient_external_id: i64,
    pub kind: NotificationKind,
    pub payload: Value,
}

impl Notification {
    pub fn new(recipient_external_id: i64, kind: NotificationKind, payload: Value) -> Self {
        Self {
            recipient_external_id,
            kind,
            payload,
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notifier answered {0}")]
    Status(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Used when no notifier endpoint is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        log::info!(
            "[Notify] {:?} for {}",
            notification.kind,
            notification.recipient_external_id
        );
        Ok(())
    }
}

/// POSTs every event as JSON to the configured endpoint.
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self.http.post(&self.url).json(notification).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Keeps every event in memory. Backs the tests of the producing crates.
#[cfg(any(test, feature = "test-util"))]
#[derive(Default)]
pub struct RecordingNotifier {
    sent: tokio::sync::Mutex<Vec<Notification>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

/// Delivers `notification`, logging instead of returning a failure.
pub async fn dispatch(notifier: &Arc<dyn Notifier>, notification: Notification) {
    if let Err(e) = notifier.notify(&notification).await {
        log::warn!(
            "[Notify] Dropping {:?} for {}: {}",
            notification.kind,
            notification.recipient_external_id,
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    use super::*;

    #[tokio::test]
    async fn webhook_notifier_posts_event_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .and(body_json(json!({
                "recipientExternalId": 42,
                "kind": "configReady",
                "payload": { "config": "https://x/sub/u7/" },
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/events", server.uri())).unwrap();
        notifier
            .notify(&Notification::new(
                42,
                NotificationKind::ConfigReady,
                json!({ "config": "https://x/sub/u7/" }),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dispatch_swallows_delivery_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(server.uri()).unwrap());
        dispatch(
            &notifier,
            Notification::new(1, NotificationKind::Rejected, json!({})),
        )
        .await;
    }
}
