use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::http_client::{HttpClient, HttpRequest};
use crate::Report;

const WEBHOOK_TIMEOUT_MS: u64 = 10_000;

/// Delivery failure. Logged by the caller, never escalated.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook transport error: {0}")]
    Transport(String),

    #[error("webhook returned status {status}")]
    Rejected { status: u16 },

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound report delivery boundary.
pub trait Notifier: Send + Sync {
    fn notify<'a>(
        &'a self,
        report: &'a Report,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;
}

/// Notifier that drops every report; used when no webhook is configured.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify<'a>(
        &'a self,
        report: &'a Report,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>> {
        let _ = report;
        Box::pin(async { Ok(()) })
    }
}

/// Posts the report summary to a Slack-compatible webhook as
/// `{"text": "..."}`.
pub struct WebhookNotifier {
    http_client: Arc<dyn HttpClient>,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(http_client: Arc<dyn HttpClient>, webhook_url: impl Into<String>) -> Self {
        Self {
            http_client,
            webhook_url: webhook_url.into(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify<'a>(
        &'a self,
        report: &'a Report,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>> {
        Box::pin(async move {
            let payload = serde_json::to_string(&serde_json::json!({
                "text": report.summary_text(),
            }))?;

            let request = HttpRequest::post(&self.webhook_url)
                .with_header("content-type", "application/json")
                .with_body(payload)
                .with_timeout_ms(WEBHOOK_TIMEOUT_MS);

            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|error| NotifyError::Transport(error.to_string()))?;

            if !response.is_success() {
                return Err(NotifyError::Rejected {
                    status: response.status,
                });
            }

            Ok(())
        })
    }
}
