//! Language model gateway.
//!
//! The engine reaches the generation and embedding models only through
//! [`LanguageModelGateway`]. Network backends return
//! [`Error::Transient`](crate::Error::Transient) for failures worth retrying;
//! [`ResilientGateway`] adds bounded retry with backoff and input chunking on
//! top of any backend.
//!
//! ```text
//!   Extractor ─┐
//!   Retriever ─┼─► ResilientGateway ──retry/chunk──► HttpGateway ──► model API
//!   Synthesizer┘
//! ```

mod resilient;
mod retry;

#[cfg(feature = "client")]
pub mod http;

pub use resilient::ResilientGateway;
pub use retry::RetryPolicy;

#[cfg(feature = "client")]
pub use http::{HttpGateway, HttpGatewayConfig};

use async_trait::async_trait;

use crate::error::Result;

/// Narrow interface to the generation and embedding models.
#[async_trait]
pub trait LanguageModelGateway: Send + Sync {
    /// Generate text for a system/user prompt pair.
    async fn complete(&self, system_prompt: &str, user_prompt: &str, temperature: f32)
    -> Result<String>;

    /// Embed each text; the result has one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the vectors returned by `embed`.
    fn dimensions(&self) -> usize;
}
