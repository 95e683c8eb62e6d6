//! Memory orchestration engine
//!
//! Turns free text into durable, owner-scoped memory across three stores and
//! answers queries with a fused ranking and a short context card.
//!
//! # Modules
//!
//! - **extraction** - model-driven extraction of facts, episodes, entities and triples
//! - **writer** - per-store persistence with partial-failure reporting
//! - **retrieval** - concurrent reads, fused episode scoring and graph paths
//! - **synthesis** - context cards and recent-memory summaries
//! - **forget** - soft (redact) and hard (delete) removal
//! - **engine** - the [`MemoryEngine`] facade tying them together
//!
//! Stores and the language-model gateway come from `trimem-core`, which is
//! re-exported as [`core`].

/// Core types, store contracts and gateway (re-exported from trimem-core)
pub use trimem_core as core;

pub mod config;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod forget;
pub mod retrieval;
pub mod synthesis;
pub mod utils;
pub mod writer;

#[cfg(test)]
mod testing;

pub use config::{ConfigValidationError, ContextCardConfig, EngineConfig, ScoringWeights};
pub use engine::{MemoryEngine, OwnerStats, RecentSummary, StoreSet, WriteOutcome, WriteRequest};
pub use error::{EngineError, EngineResult};
pub use extraction::{Extraction, ExtractionDiagnostics, Extractor};
pub use forget::{ForgetReport, ForgetRequest, Forgetter};
pub use retrieval::{RankedResult, RetrieveRequest, Retriever, ScoreBreakdown, ScoredEpisode};
pub use synthesis::{ContextSynthesizer, NO_MEMORY_CARD};
pub use writer::{StoreFailure, WriteContext, WriteCoordinator, WriteReport};
