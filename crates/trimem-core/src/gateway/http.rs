//! OpenAI-compatible HTTP gateway.
//!
//! Talks to any server exposing `POST /chat/completions` and
//! `POST /embeddings`. Timeouts, connection failures, 429 and 5xx responses
//! map to [`Error::Transient`]; everything else is permanent.
//!
//! ```rust,no_run
//! use trimem_core::gateway::{HttpGateway, HttpGatewayConfig, LanguageModelGateway};
//!
//! #[tokio::main]
//! async fn main() -> trimem_core::Result<()> {
//!     let gateway = HttpGateway::new(HttpGatewayConfig::default())?;
//!     let vectors = gateway.embed(&["hello".to_string()]).await?;
//!     assert_eq!(vectors[0].len(), gateway.dimensions());
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use super::LanguageModelGateway;
use crate::error::{Error, Result};

/// Connection settings for [`HttpGateway`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpGatewayConfig {
    /// API base, e.g. `https://api.openai.com/v1`
    pub base_url: String,

    /// Bearer token, if the server needs one
    pub api_key: Option<String>,

    pub chat_model: String,

    pub embedding_model: String,

    /// Embedding dimensionality (default: 1536)
    pub dimensions: usize,

    /// Per-request timeout in seconds (default: 60)
    pub timeout_secs: u64,

    /// Completion token limit (default: 800)
    pub max_tokens: u32,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            timeout_secs: 60,
            max_tokens: 800,
        }
    }
}

/// Gateway backed by an OpenAI-compatible REST API.
#[derive(Clone)]
pub struct HttpGateway {
    config: HttpGatewayConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpGatewayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{} returned {}: {}", path, status, truncate(&body, 200));
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                Error::transient(message)
            } else {
                Error::gateway(message)
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::gateway(format!("invalid {} response: {}", path, e)))
    }
}

#[async_trait]
impl LanguageModelGateway for HttpGateway {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature,
            max_tokens: self.config.max_tokens,
        };

        let response: ChatResponse = self.post("chat/completions", &request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::gateway("completion returned no choices"))?;

        debug!(chars = content.len(), "Completion received");
        Ok(content)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
            dimensions: self.config.dimensions,
        };

        let mut response: EmbeddingResponse = self.post("embeddings", &request).await?;
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}

fn classify_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        Error::transient(err.to_string())
    } else {
        Error::gateway(err.to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}…", head)
    }
}
