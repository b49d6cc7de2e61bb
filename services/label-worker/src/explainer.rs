//! Error explanation collaborator
//!
//! Turns a raw failure message into short text a requester can act on.
//! Explanation never fails: any collaborator error yields
//! [`FALLBACK_EXPLANATION`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::CollaboratorError;

pub const FALLBACK_EXPLANATION: &str = "An error occured";

const SYSTEM_PROMPT: &str = "You're an error descriptor. Convert this programmatic error \
message or code into a human readable error message for end users. Only send the message \
in your response.";

/// Explains failures to requesters.
pub trait ErrorExplainer: Send + Sync {
    fn explain<'a>(&'a self, error: &'a str) -> Pin<Box<dyn Future<Output = String> + Send + 'a>>;
}

/// Returns the failure message unchanged.
pub struct PassthroughExplainer;

impl ErrorExplainer for PassthroughExplainer {
    fn explain<'a>(&'a self, error: &'a str) -> Pin<Box<dyn Future<Output = String> + Send + 'a>> {
        Box::pin(async move {
            if error.trim().is_empty() {
                FALLBACK_EXPLANATION.to_string()
            } else {
                error.to_string()
            }
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions explainer.
pub struct OpenAiExplainer {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<Secret<String>>,
    timeout: Duration,
}

impl OpenAiExplainer {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<Secret<String>>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            timeout,
        }
    }

    async fn complete(&self, error: &str) -> Result<String, CollaboratorError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": format!("{SYSTEM_PROMPT}\nError: {error}")},
            ],
            "temperature": 0.7,
            "max_tokens": 1280,
        });

        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(self.timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| CollaboratorError(format!("explainer request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError(format!("explainer returned {status}")));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| CollaboratorError(format!("invalid explainer response: {e}")))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CollaboratorError("explainer returned no content".into()))
    }
}

impl ErrorExplainer for OpenAiExplainer {
    fn explain<'a>(&'a self, error: &'a str) -> Pin<Box<dyn Future<Output = String> + Send + 'a>> {
        Box::pin(async move {
            match self.complete(error).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "error explanation unavailable, using fallback");
                    FALLBACK_EXPLANATION.to_string()
                }
            }
        })
    }
}
