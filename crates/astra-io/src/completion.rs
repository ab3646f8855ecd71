//! Client for the text-completion service that writes incident reports.
//!
//! One request per shutdown cycle, no retries. Every failure is reported as a
//! [`ReportError`] and the caller substitutes the local fallback report.

use astra_core::ReportDraft;
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const PLACEHOLDER_API_KEY: &str = "YOUR_OPENAI_API_KEY_HERE";

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    /// Request deadline; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: PLACEHOLDER_API_KEY.to_string(),
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl CompletionConfig {
    pub fn has_api_key(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != PLACEHOLDER_API_KEY
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("report service disabled (offline mode)")]
    Offline,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {0} from completion service")]
    Status(u16),

    #[error("malformed completion envelope: {0}")]
    MalformedEnvelope(String),

    #[error("completion content is not a report: {0}")]
    MalformedContent(String),
}

/// Source of incident-report drafts.
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<ReportDraft, ReportError>>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl<'a> ChatRequest<'a> {
    fn new(model: &'a str, prompt: &'a str) -> Self {
        Self {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Extract the report from a chat-completion response body.
///
/// The assistant message must itself be a JSON object with string
/// `summary` and `finance` fields.
pub fn parse_completion(body: &str) -> Result<ReportDraft, ReportError> {
    let envelope: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ReportError::MalformedEnvelope(e.to_string()))?;

    let content = envelope
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ReportError::MalformedEnvelope("no message content".to_string()))?;

    serde_json::from_str(&content).map_err(|e| ReportError::MalformedContent(e.to_string()))
}

/// Chat-completions client over HTTPS.
pub struct HttpCompletionClient {
    client: reqwest::Client,
    config: Arc<CompletionConfig>,
}

impl HttpCompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self, ReportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ReportError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }
}

fn classify(err: reqwest::Error, timeout: Option<Duration>) -> ReportError {
    if err.is_timeout() {
        ReportError::Timeout(timeout.unwrap_or_default())
    } else {
        ReportError::Transport(err.to_string())
    }
}

impl CompletionBackend for HttpCompletionClient {
    fn name(&self) -> &'static str {
        "http"
    }

    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<ReportDraft, ReportError>> {
        let client = self.client.clone();
        let config = Arc::clone(&self.config);

        async move {
            if !config.has_api_key() {
                return Err(ReportError::MissingApiKey);
            }

            let body = ChatRequest::new(&config.model, &prompt);
            debug!(endpoint = %config.endpoint, model = %config.model, "Requesting incident report");

            let response = client
                .post(&config.endpoint)
                .bearer_auth(&config.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| classify(e, config.timeout))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ReportError::Status(status.as_u16()));
            }

            let text = response
                .text()
                .await
                .map_err(|e| classify(e, config.timeout))?;
            parse_completion(&text)
        }
        .boxed()
    }
}

/// Backend that never reaches the network; every report is the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineBackend;

impl CompletionBackend for OfflineBackend {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn generate(&self, _prompt: String) -> BoxFuture<'static, Result<ReportDraft, ReportError>> {
        future::ready(Err(ReportError::Offline)).boxed()
    }
}
