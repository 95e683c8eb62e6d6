//! Retrying, chunking decorator over any gateway backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{LanguageModelGateway, RetryPolicy};
use crate::error::{Error, Result};

/// Default number of texts per embedding request.
pub const DEFAULT_EMBED_CHUNK_SIZE: usize = 32;

/// Wraps a backend with [`RetryPolicy`] and splits embedding batches into
/// chunks of at most `chunk_size` texts.
#[derive(Clone)]
pub struct ResilientGateway {
    inner: Arc<dyn LanguageModelGateway>,
    policy: RetryPolicy,
    chunk_size: usize,
}

impl ResilientGateway {
    pub fn new(inner: Arc<dyn LanguageModelGateway>) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
            chunk_size: DEFAULT_EMBED_CHUNK_SIZE,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

#[async_trait]
impl LanguageModelGateway for ResilientGateway {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        let inner = &self.inner;
        self.policy
            .run("complete", move || inner.complete(system_prompt, user_prompt, temperature))
            .await
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        let inner = &self.inner;

        for (index, chunk) in texts.chunks(self.chunk_size).enumerate() {
            let embedded = self.policy.run("embed", move || inner.embed(chunk)).await?;
            if embedded.len() != chunk.len() {
                return Err(Error::gateway(format!(
                    "embedding chunk {} returned {} vectors for {} inputs",
                    index,
                    embedded.len(),
                    chunk.len()
                )));
            }
            debug!(chunk = index, size = chunk.len(), "Embedded chunk");
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Embeds `"t{n}"` as `[n]` and records each batch size.
    #[derive(Default)]
    struct IndexGateway {
        batches: Mutex<Vec<usize>>,
        short_by_one: bool,
    }

    #[async_trait]
    impl LanguageModelGateway for IndexGateway {
        async fn complete(&self, _: &str, _: &str, _: f32) -> Result<String> {
            Ok("ok".into())
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            let mut out: Vec<Vec<f32>> = texts
                .iter()
                .map(|t| vec![t.trim_start_matches('t').parse::<f32>().unwrap()])
                .collect();
            if self.short_by_one {
                out.pop();
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            1
        }
    }

    /// Fails transiently a fixed number of times before answering.
    struct FlakyGateway {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl LanguageModelGateway for FlakyGateway {
        async fn complete(&self, _: &str, user: &str, _: f32) -> Result<String> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::transient("429 too many requests"));
            }
            Ok(format!("echo: {}", user))
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_embed_chunks_preserve_order() {
        let backend = Arc::new(IndexGateway::default());
        let gateway = ResilientGateway::new(backend.clone()).with_chunk_size(32);

        let texts: Vec<String> = (0..70).map(|i| format!("t{}", i)).collect();
        let vectors = gateway.embed(&texts).await.unwrap();

        assert_eq!(vectors.len(), 70);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], i as f32);
        }
        assert_eq!(*backend.batches.lock().unwrap(), vec![32, 32, 6]);
    }

    #[tokio::test]
    async fn test_embed_empty_input_makes_no_calls() {
        let backend = Arc::new(IndexGateway::default());
        let gateway = ResilientGateway::new(backend.clone());

        let vectors = gateway.embed(&[]).await.unwrap();
        assert!(vectors.is_empty());
        assert!(backend.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embed_count_mismatch_is_error() {
        let backend = Arc::new(IndexGateway {
            short_by_one: true,
            ..Default::default()
        });
        let gateway = ResilientGateway::new(backend);

        let texts = vec!["t1".to_string(), "t2".to_string()];
        let err = gateway.embed(&texts).await.unwrap_err();
        assert!(err.to_string().contains("returned 1 vectors for 2 inputs"));
    }

    #[tokio::test]
    async fn test_complete_retries_transient_failures() {
        let backend = Arc::new(FlakyGateway {
            failures_left: AtomicU32::new(2),
        });
        let gateway = ResilientGateway::new(backend)
            .with_policy(RetryPolicy::default().with_base_delay_ms(1));

        let text = gateway.complete("sys", "hello", 0.0).await.unwrap();
        assert_eq!(text, "echo: hello");
    }

    #[tokio::test]
    async fn test_complete_gives_up_after_budget() {
        let backend = Arc::new(FlakyGateway {
            failures_left: AtomicU32::new(5),
        });
        let gateway = ResilientGateway::new(backend)
            .with_policy(RetryPolicy::default().with_base_delay_ms(1));

        let err = gateway.complete("sys", "hello", 0.0).await.unwrap_err();
        assert!(err.is_transient());
    }
}
