//! Requester notifications
//!
//! Label outcomes are delivered to whoever submitted the job, identified by
//! an opaque requester reference. The webhook notifier forwards them to a
//! front-end; the log notifier is used when none is configured.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde_json::json;
use tracing::info;

use crate::error::CollaboratorError;

pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CollaboratorError>> + Send + 'a>>;

/// A rendered label ready for delivery.
#[derive(Debug, Clone)]
pub struct LabelDocument {
    pub filename: String,
    pub bytes: Bytes,
    pub caption: String,
}

pub trait Notifier: Send + Sync {
    fn send_text<'a>(&'a self, requester: &'a str, text: &'a str) -> NotifyFuture<'a>;

    fn send_document<'a>(&'a self, requester: &'a str, document: &'a LabelDocument) -> NotifyFuture<'a>;
}

/// Posts notifications as JSON to a webhook.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(http: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            url: url.into(),
            timeout,
        }
    }

    async fn post(&self, body: serde_json::Value) -> Result<(), CollaboratorError> {
        let response = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| CollaboratorError(format!("notification failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError(format!("notification webhook returned {status}")));
        }
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn send_text<'a>(&'a self, requester: &'a str, text: &'a str) -> NotifyFuture<'a> {
        Box::pin(self.post(json!({
            "requester": requester,
            "type": "text",
            "text": text,
        })))
    }

    fn send_document<'a>(&'a self, requester: &'a str, document: &'a LabelDocument) -> NotifyFuture<'a> {
        Box::pin(self.post(json!({
            "requester": requester,
            "type": "document",
            "filename": document.filename,
            "caption": document.caption,
            "content_base64": STANDARD.encode(&document.bytes),
        })))
    }
}

/// Writes notifications to the log only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_text<'a>(&'a self, requester: &'a str, text: &'a str) -> NotifyFuture<'a> {
        Box::pin(async move {
            info!(requester, text, "notification");
            Ok(())
        })
    }

    fn send_document<'a>(&'a self, requester: &'a str, document: &'a LabelDocument) -> NotifyFuture<'a> {
        Box::pin(async move {
            info!(
                requester,
                filename = %document.filename,
                size = document.bytes.len(),
                "label document ready"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    type Received = Arc<Mutex<Vec<Value>>>;

    async fn start_webhook(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route(
                "/notify",
                post(
                    move |State(received): State<Received>, Json(body): Json<Value>| async move {
                        received.lock().await.push(body);
                        status
                    },
                ),
            )
            .with_state(received.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/notify", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (url, received)
    }

    fn notifier(url: &str) -> WebhookNotifier {
        WebhookNotifier::new(reqwest::Client::new(), url, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn text_is_posted_with_requester() {
        let (url, received) = start_webhook(StatusCode::OK).await;
        notifier(&url).send_text("chat-42", "hello").await.unwrap();

        let bodies = received.lock().await;
        assert_eq!(
            bodies[0],
            serde_json::json!({"requester": "chat-42", "type": "text", "text": "hello"})
        );
    }

    #[tokio::test]
    async fn document_is_base64_encoded() {
        let (url, received) = start_webhook(StatusCode::NO_CONTENT).await;
        let document = LabelDocument {
            filename: "Priority-9400.pdf".into(),
            bytes: Bytes::from_static(b"%PDF"),
            caption: "alice-1\nLabel Generated".into(),
        };
        notifier(&url).send_document("chat-42", &document).await.unwrap();

        let bodies = received.lock().await;
        assert_eq!(bodies[0]["type"], "document");
        assert_eq!(bodies[0]["filename"], "Priority-9400.pdf");
        assert_eq!(bodies[0]["content_base64"], "JVBERg==");
    }

    #[tokio::test]
    async fn webhook_error_status_is_reported() {
        let (url, _) = start_webhook(StatusCode::BAD_GATEWAY).await;
        let err = notifier(&url).send_text("chat-42", "hello").await.unwrap_err();
        assert!(err.0.contains("502"), "got: {err}");
    }
}
