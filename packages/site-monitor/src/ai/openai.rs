//! OpenAI implementation of the `Annotator` trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use site_monitor::ai::{OpenAiAnnotator, OpenAiConfig};
//!
//! let annotator = OpenAiAnnotator::new(OpenAiConfig::new("sk-...").with_model("gpt-4o"))?;
//! let annotation = annotator.annotate("Title: Example\nURL: https://example.com/\n...").await?;
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{MonitorError, Result};
use crate::traits::annotator::{Annotation, Annotator};

const SYSTEM_PROMPT: &str = "You are an expert at categorizing web content and creating \
     summaries optimized for AI/LLM consumption.";

/// Settings for [`OpenAiAnnotator`].
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Retries after the first attempt on 429, 5xx and transport errors
    pub max_retries: u32,
    /// Backoff before the first retry; doubled for each further retry
    pub initial_backoff: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 500,
            temperature: 0.3,
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }

    /// Set the chat model (default: gpt-4o-mini).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Whether a failed call is worth retrying.
enum CallError {
    Retryable(String),
    Fatal(String),
}

/// Annotator backed by the OpenAI chat-completions API.
#[derive(Clone)]
pub struct OpenAiAnnotator {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiAnnotator {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MonitorError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Create from environment variable `OPENAI_API_KEY` (and optional `OPENAI_MODEL`).
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| MonitorError::Config("OPENAI_API_KEY not set".into()))?;
        let mut config = OpenAiConfig::new(api_key);
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config = config.with_model(model);
        }
        Self::new(config)
    }

    /// Get the current model name.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn prompt(text: &str) -> String {
        format!(
            "Analyze this website content and provide:\n\
             1. A single-word category (e.g., \"Technology\", \"Business\", \"Education\", \
             \"Documentation\", \"Tutorial\", \"News\", \"Product\", \"Service\")\n\
             2. A concise, AI-optimized summary (2-3 sentences) that would be useful for an \
             LLM to understand the site's purpose and value. Avoid unexplained jargon.\n\n\
             Website content:\n{}\n\n\
             Respond in this exact format:\n\
             CATEGORY: [single word]\n\
             SUMMARY: [2-3 sentence summary optimized for LLM understanding]",
            text
        )
    }

    async fn call(&self, prompt: &str) -> std::result::Result<String, CallError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| CallError::Retryable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("OpenAI API error {}: {}", status, error_text);
            return Err(if is_retryable(status) {
                CallError::Retryable(message)
            } else {
                CallError::Fatal(message)
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallError::Fatal(format!("invalid response body: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CallError::Fatal("No response from OpenAI".into()))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Parse a `CATEGORY:` / `SUMMARY:` response.
///
/// Missing lines fall back to `Other` and an empty summary; a response with
/// neither line is rejected.
pub fn parse_annotation(response: &str) -> Result<Annotation> {
    let mut category = None;
    let mut summary = None;

    for line in response.lines().map(str::trim) {
        if let Some(value) = strip_label(line, "CATEGORY:") {
            category = Some(value.trim_matches(|c| c == '[' || c == ']' || c == '"').to_string());
        } else if let Some(value) = strip_label(line, "SUMMARY:") {
            summary = Some(value.to_string());
        }
    }

    if category.is_none() && summary.is_none() {
        return Err(MonitorError::Annotator(format!(
            "unparseable annotator response: {:?}",
            response.chars().take(200).collect::<String>()
        )));
    }

    Ok(Annotation {
        category: category
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "Other".to_string()),
        summary: summary.unwrap_or_default(),
    })
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let line = line.trim_start_matches(['*', '#', ' ']);
    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = line[label.len()..].trim_start_matches('*');
    Some(rest.trim().trim_end_matches('*').trim())
}

#[async_trait]
impl Annotator for OpenAiAnnotator {
    async fn annotate(&self, text: &str) -> Result<Annotation> {
        let prompt = Self::prompt(text);
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0;

        loop {
            let start = std::time::Instant::now();
            match self.call(&prompt).await {
                Ok(content) => {
                    debug!(
                        model = %self.config.model,
                        duration_ms = start.elapsed().as_millis(),
                        "OpenAI annotation"
                    );
                    return parse_annotation(&content);
                }
                Err(CallError::Retryable(message)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis(),
                        error = %message,
                        "OpenAI call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(CallError::Retryable(message)) | Err(CallError::Fatal(message)) => {
                    return Err(MonitorError::Annotator(message));
                }
            }
        }
    }
}
