//! Engine Configuration
//!
//! Thresholds, scoring weights and limits for the memory engine. The config
//! is passed into each component at construction; nothing reads it from
//! global state.

use serde::{Deserialize, Serialize};
use trimem_core::RetryPolicy;

/// Memory engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum confidence/importance for persisted memories (default: 0.6)
    pub confidence_threshold: f64,

    /// Recency decay constant in days (default: 7)
    pub recency_half_life_days: f64,

    /// Fused score weights
    pub weights: ScoringWeights,

    /// Episodes returned when the caller gives no `k` (default: 8)
    pub default_k: usize,

    /// Episode window when the caller gives no `since_days` (default: 30)
    pub default_since_days: u32,

    /// Texts per embedding request (default: 32)
    pub embedding_chunk_size: usize,

    /// Gateway retry policy
    pub retry: RetryPolicy,

    /// Context card limits
    pub context: ContextCardConfig,

    /// Graph paths fetched per topic entity (default: 3)
    pub paths_per_topic: usize,

    /// Window for the recent-memory summary (default: 7)
    pub summary_window_days: u32,

    /// Sampling temperature for extraction calls (default: 0.0)
    pub extraction_temperature: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            recency_half_life_days: 7.0,
            weights: ScoringWeights::default(),
            default_k: 8,
            default_since_days: 30,
            embedding_chunk_size: 32,
            retry: RetryPolicy::default(),
            context: ContextCardConfig::default(),
            paths_per_topic: 3,
            summary_window_days: 7,
            extraction_temperature: 0.0,
        }
    }
}

/// Weights of the fused episode relevance score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Clamped cosine similarity (default: 0.55)
    pub similarity: f64,

    /// Exponential recency decay (default: 0.20)
    pub recency: f64,

    /// Stored episode importance (default: 0.15)
    pub importance: f64,

    /// Graph proximity of the episode's topic entities (default: 0.10)
    pub graph: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            similarity: 0.55,
            recency: 0.20,
            importance: 0.15,
            graph: 0.10,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.similarity + self.recency + self.importance + self.graph
    }
}

/// Context card configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextCardConfig {
    /// Facts given to the synthesizer (default: 5)
    pub max_facts: usize,

    /// Episodes given to the synthesizer (default: 3)
    pub max_episodes: usize,

    /// Graph paths given to the synthesizer (default: 2)
    pub max_paths: usize,

    /// Word cap on the card (default: 120)
    pub max_words: usize,

    /// Sampling temperature for card and summary calls (default: 0.2)
    pub temperature: f32,
}

impl Default for ContextCardConfig {
    fn default() -> Self {
        Self {
            max_facts: 5,
            max_episodes: 3,
            max_paths: 2,
            max_words: 120,
            temperature: 0.2,
        }
    }
}

impl EngineConfig {
    /// Set the confidence threshold
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the scoring weights
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the default retrieval window
    pub fn with_default_since_days(mut self, days: u32) -> Self {
        self.default_since_days = days;
        self
    }

    /// Set context card limits
    pub fn with_context(mut self, context: ContextCardConfig) -> Self {
        self.context = context;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid("confidence_threshold", "must be between 0 and 1"));
        }

        if !self.recency_half_life_days.is_finite() || self.recency_half_life_days <= 0.0 {
            return Err(invalid("recency_half_life_days", "must be greater than 0"));
        }

        let weights = [
            ("weights.similarity", self.weights.similarity),
            ("weights.recency", self.weights.recency),
            ("weights.importance", self.weights.importance),
            ("weights.graph", self.weights.graph),
        ];
        for (field, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, "must be a non-negative number"));
            }
        }
        if self.weights.sum() <= 0.0 {
            return Err(invalid("weights", "at least one weight must be positive"));
        }

        if self.default_k == 0 {
            return Err(invalid("default_k", "must be greater than 0"));
        }

        if self.embedding_chunk_size == 0 {
            return Err(invalid("embedding_chunk_size", "must be greater than 0"));
        }

        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be greater than 0"));
        }

        if self.context.max_words == 0 {
            return Err(invalid("context.max_words", "must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.context.temperature) {
            return Err(invalid("context.temperature", "must be between 0 and 2"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigValidationError {
    ConfigValidationError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
