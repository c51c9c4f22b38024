use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Best-effort push notifications to gallery owners.
///
/// Callers log failures and carry on; a notification never decides the
/// outcome of the operation that triggered it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &str, title: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    message: PushMessage<'a>,
    user_ids: [&'a str; 1],
}

#[derive(Serialize)]
struct PushMessage<'a> {
    title: &'a str,
    body: &'a str,
}

/// Sends notifications through an HTTP push gateway.
pub struct PushNotifier {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl PushNotifier {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(NotifyError::Http)?;
        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl Notifier for PushNotifier {
    async fn notify(&self, user_id: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        let request = SendMessageRequest {
            message: PushMessage { title, body },
            user_ids: [user_id],
        };

        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(NotifyError::Http)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("HTTP {status}: {body}")));
        }
        Ok(())
    }
}

/// Used when no push gateway is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        tracing::info!(user_id, title, body, "Push gateway not configured, notification logged only");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Push request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Push gateway rejected message: {0}")]
    Rejected(String),
}
