//! Extraction clients: send an [`ExtractionRequest`] and get the reply text.
//!
//! The service is treated as an opaque text generator. Two implementations
//! are provided:
//!
//! * [`AnthropicClient`] talks to the Anthropic Messages API directly with an
//!   API key handed to its constructor. This is the default.
//! * [`ProviderClient`] adapts any `edgequake_llm` provider (OpenAI, Gemini,
//!   Ollama, …) for users who prefer another vision model.
//!
//! Exactly one request is made per statement and nothing is retried: a
//! failed call fails the whole extraction.

use crate::config::ExtractionConfig;
use crate::error::StatementError;
use crate::prompts::ExtractionRequest;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Value of the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Text returned by the service plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Anything that can answer an extraction request with text.
#[allow(async_fn_in_trait)]
pub trait ExtractionClient {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    async fn complete(&self, request: &ExtractionRequest) -> Result<Completion, StatementError>;
}

// ── Anthropic Messages API ───────────────────────────────────────────────

/// Direct client for `POST /v1/messages`.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicClient {
    /// Client for the public endpoint with no request timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self, StatementError> {
        Self::with_options(api_key, crate::config::DEFAULT_API_BASE_URL, None)
    }

    /// Client for `base_url`, optionally bounding each request by `timeout_secs`.
    pub fn with_options(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, StatementError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| StatementError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Instruction first, then every page image, all in one user turn.
fn messages_body(request: &ExtractionRequest) -> MessagesRequest<'_> {
    let mut content = Vec::with_capacity(request.images.len() + 1);
    content.push(ContentBlock::Text {
        text: &request.instruction,
    });
    content.extend(request.images.iter().map(|img| ContentBlock::Image {
        source: ImageSource {
            kind: "base64",
            media_type: &img.media_type,
            data: &img.data,
        },
    }));

    MessagesRequest {
        model: &request.model,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        system: &request.system,
        messages: vec![Message {
            role: "user",
            content,
        }],
    }
}

/// Join the text blocks of a reply; `EmptyReply` when there are none.
fn reply_text(response: MessagesResponse) -> Result<Completion, StatementError> {
    let text: Vec<String> = response
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect();
    if text.is_empty() {
        return Err(StatementError::EmptyReply);
    }
    Ok(Completion {
        text: text.join("\n"),
        input_tokens: response.usage.input_tokens,
        output_tokens: response.usage.output_tokens,
    })
}

/// Map a non-success HTTP status to the matching error.
fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> StatementError {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StatementError::AuthError {
            provider: "anthropic".into(),
            detail,
        },
        StatusCode::TOO_MANY_REQUESTS => StatementError::RateLimitExceeded {
            provider: "anthropic".into(),
            retry_after_secs: retry_after,
        },
        _ => StatementError::LlmApiError {
            message: format!("HTTP {}: {}", status.as_u16(), detail),
        },
    }
}

impl ExtractionClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<Completion, StatementError> {
        let body = messages_body(request);
        debug!(
            "POST {} with {} images, model {}",
            self.endpoint(),
            request.images.len(),
            request.model
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| StatementError::LlmApiError {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, &text));
        }

        let parsed: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| StatementError::LlmApiError {
                    message: format!("unreadable response body: {e}"),
                })?;
        let completion = reply_text(parsed)?;
        info!(
            "Reply: {} chars, {} input / {} output tokens",
            completion.text.len(),
            completion.input_tokens,
            completion.output_tokens
        );
        Ok(completion)
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Adapter over any `edgequake_llm` vision provider.
pub struct ProviderClient {
    name: String,
    provider: Arc<dyn LLMProvider>,
    timeout: Option<Duration>,
}

impl ProviderClient {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout = timeout_secs.map(Duration::from_secs);
        self
    }
}

impl ExtractionClient for ProviderClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<Completion, StatementError> {
        let images: Vec<ImageData> = request
            .images
            .iter()
            .map(|img| ImageData::new(img.data.clone(), img.media_type.as_str()))
            .collect();

        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user_with_images(request.instruction.as_str(), images),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let call = self.provider.chat(&messages, Some(&options));
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                StatementError::LlmApiError {
                    message: format!("{} call timed out after {}s", self.name, limit.as_secs()),
                }
            })?,
            None => call.await,
        };
        let response = result.map_err(|e| StatementError::LlmApiError {
            message: format!("{}: {}", self.name, e),
        })?;

        if response.content.trim().is_empty() {
            return Err(StatementError::EmptyReply);
        }
        Ok(Completion {
            text: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

/// The client chosen for a configuration.
pub enum ResolvedClient {
    Anthropic(AnthropicClient),
    Provider(ProviderClient),
}

impl ExtractionClient for ResolvedClient {
    fn name(&self) -> &str {
        match self {
            ResolvedClient::Anthropic(c) => c.name(),
            ResolvedClient::Provider(c) => c.name(),
        }
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<Completion, StatementError> {
        match self {
            ResolvedClient::Anthropic(c) => c.complete(request).await,
            ResolvedClient::Provider(c) => c.complete(request).await,
        }
    }
}

/// Pick a client, from most specific to least specific:
///
/// 1. a pre-built provider in `config.provider`;
/// 2. a named provider (`config.provider_name`) built by `ProviderFactory`,
///    which reads that provider's own credentials;
/// 3. the Anthropic client with `config.api_key`.
pub fn resolve_client(config: &ExtractionConfig) -> Result<ResolvedClient, StatementError> {
    if let Some(ref provider) = config.provider {
        return Ok(ResolvedClient::Provider(
            ProviderClient::new("custom", Arc::clone(provider))
                .with_timeout(config.api_timeout_secs),
        ));
    }

    if let Some(ref name) = config.provider_name {
        if name != "anthropic" || config.api_key.is_none() {
            let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
                StatementError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!("{e}"),
                }
            })?;
            return Ok(ResolvedClient::Provider(
                ProviderClient::new(name.clone(), provider).with_timeout(config.api_timeout_secs),
            ));
        }
    }

    match config.api_key {
        Some(ref key) => Ok(ResolvedClient::Anthropic(AnthropicClient::with_options(
            key.clone(),
            config.api_base_url.clone(),
            config.api_timeout_secs,
        )?)),
        None => Err(StatementError::ProviderNotConfigured {
            provider: "anthropic".into(),
            hint: "No API key configured.\n\
                   Set ANTHROPIC_API_KEY, pass --api-key, or choose another --provider."
                .into(),
        }),
    }
}
