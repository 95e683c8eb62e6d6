//! Main Engine Entry Point
//!
//! Ties extraction, writing, retrieval and forgetting together over one set
//! of stores and one language-model gateway.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use trimem_core::db::{Database, SqliteEpisodeStore, SqliteFactStore, SqliteGraphStore};
use trimem_core::types::{Fact, GraphNode, GraphPath};
use trimem_core::{
    EpisodeStore, FactStore, GraphStore, LanguageModelGateway, ResilientGateway,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::extraction::{ExtractionDiagnostics, Extractor};
use crate::forget::{ForgetReport, ForgetRequest, Forgetter};
use crate::retrieval::{RankedResult, RetrieveRequest, Retriever};
use crate::utils::{validate_k, validate_non_empty, validate_owner_id, validate_unit_interval};
use crate::writer::{WriteContext, WriteCoordinator, WriteReport};

/// File names of the three SQLite stores inside a data directory
pub const FACTS_DB: &str = "facts.db";
pub const EPISODES_DB: &str = "episodes.db";
pub const GRAPH_DB: &str = "graph.db";

/// Episodes listed by [`MemoryEngine::summarize_recent`]
const RECENT_LIST_LIMIT: usize = 20;

/// The three stores the engine writes to
#[derive(Clone)]
pub struct StoreSet {
    pub facts: Arc<dyn FactStore>,
    pub episodes: Arc<dyn EpisodeStore>,
    pub graph: Arc<dyn GraphStore>,
}

impl StoreSet {
    /// SQLite stores in separate files under `dir`
    pub fn sqlite_at(dir: impl AsRef<Path>) -> EngineResult<Self> {
        let dir = dir.as_ref();
        Ok(Self {
            facts: Arc::new(SqliteFactStore::new(Database::open_path(dir.join(FACTS_DB))?)?),
            episodes: Arc::new(SqliteEpisodeStore::new(Database::open_path(
                dir.join(EPISODES_DB),
            )?)?),
            graph: Arc::new(SqliteGraphStore::new(Database::open_path(dir.join(GRAPH_DB))?)?),
        })
    }

    /// Private in-memory SQLite stores
    pub fn sqlite_in_memory() -> EngineResult<Self> {
        Ok(Self {
            facts: Arc::new(SqliteFactStore::in_memory()?),
            episodes: Arc::new(SqliteEpisodeStore::in_memory()?),
            graph: Arc::new(SqliteGraphStore::in_memory()?),
        })
    }
}

/// A text to remember
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub owner_id: String,
    pub text: String,
    pub channel: String,
    /// Defaults to now
    pub observed_at: Option<DateTime<Utc>>,
    pub thread_id: Option<String>,
}

impl WriteRequest {
    pub fn new(
        owner_id: impl Into<String>,
        text: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            text: text.into(),
            channel: channel.into(),
            observed_at: None,
            thread_id: None,
        }
    }

    pub fn with_observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = Some(observed_at);
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

/// Result of [`MemoryEngine::write`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub report: WriteReport,
    pub diagnostics: ExtractionDiagnostics,
}

/// Bullet summary of recent memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentSummary {
    pub owner_id: String,
    pub since_days: u32,
    pub episode_count: usize,
    pub summary: String,
}

/// Per-owner totals across the three stores
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerStats {
    pub owner_id: String,
    pub facts: usize,
    pub episodes: usize,
    /// Episodes with distinct text; repeated writes of one text count once
    pub distinct_episode_texts: usize,
    pub graph_nodes: usize,
    pub graph_edges: usize,
}

/// Memory orchestration engine
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use trimem_sdk::core::LanguageModelGateway;
/// use trimem_sdk::{EngineConfig, EngineResult, MemoryEngine, RetrieveRequest, StoreSet, WriteRequest};
///
/// async fn example(gateway: Arc<dyn LanguageModelGateway>) -> EngineResult<()> {
///     let engine = MemoryEngine::new(
///         EngineConfig::default(),
///         StoreSet::sqlite_at("./memory")?,
///         gateway,
///     )?;
///
///     engine
///         .write(WriteRequest::new("acme", "Our 401k match is 100% of first 3%", "slack"))
///         .await?;
///
///     let result = engine.retrieve(&RetrieveRequest::new("acme", "401k match")).await?;
///     println!("{}", result.context_card);
///     Ok(())
/// }
/// ```
pub struct MemoryEngine {
    config: EngineConfig,
    stores: StoreSet,
    gateway: Arc<dyn LanguageModelGateway>,
    extractor: Extractor,
    writer: WriteCoordinator,
    retriever: Retriever,
    forgetter: Forgetter,
}

impl MemoryEngine {
    /// Create an engine
    ///
    /// The gateway is wrapped with retry and embedding batching from the
    /// config.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(
        config: EngineConfig,
        stores: StoreSet,
        gateway: Arc<dyn LanguageModelGateway>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let gateway: Arc<dyn LanguageModelGateway> = Arc::new(
            ResilientGateway::new(gateway)
                .with_policy(config.retry.clone())
                .with_chunk_size(config.embedding_chunk_size),
        );

        let extractor = Extractor::new(
            gateway.clone(),
            config.confidence_threshold,
            config.extraction_temperature,
        );
        let writer = WriteCoordinator::new(
            stores.facts.clone(),
            stores.episodes.clone(),
            stores.graph.clone(),
            gateway.clone(),
            config.confidence_threshold,
        );
        let retriever = Retriever::new(
            stores.facts.clone(),
            stores.episodes.clone(),
            stores.graph.clone(),
            gateway.clone(),
            config.clone(),
        );
        let forgetter = Forgetter::new(
            stores.facts.clone(),
            stores.episodes.clone(),
            stores.graph.clone(),
        );

        debug!(
            threshold = config.confidence_threshold,
            dimensions = gateway.dimensions(),
            "Memory engine ready"
        );

        Ok(Self {
            config,
            stores,
            gateway,
            extractor,
            writer,
            retriever,
            forgetter,
        })
    }

    /// Get the engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the underlying stores
    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    /// Extract memory from a text and persist it.
    ///
    /// Extraction and store problems are reported in the outcome, not as
    /// errors; only invalid input fails.
    pub async fn write(&self, request: WriteRequest) -> EngineResult<WriteOutcome> {
        validate_owner_id(&request.owner_id)?;
        validate_non_empty("text", &request.text)?;
        validate_non_empty("channel", &request.channel)?;

        let observed_at = request.observed_at.unwrap_or_else(Utc::now);
        let extraction = self
            .extractor
            .extract(&request.owner_id, &request.text, &request.channel, observed_at)
            .await;

        let mut context = WriteContext::new(request.channel.clone(), observed_at);
        context.thread_id = request.thread_id.clone();

        let report = self
            .writer
            .persist(&request.owner_id, &extraction, &context)
            .await;

        Ok(WriteOutcome {
            report,
            diagnostics: extraction.diagnostics,
        })
    }

    /// Retrieve ranked memory and a context card for a query
    pub async fn retrieve(&self, request: &RetrieveRequest) -> EngineResult<RankedResult> {
        self.retriever.retrieve(request).await
    }

    /// Forget memory by fact key, entity name or predicate
    pub async fn forget(
        &self,
        owner_id: &str,
        request: &ForgetRequest,
        hard_delete: bool,
    ) -> EngineResult<ForgetReport> {
        self.forgetter.forget(owner_id, request, hard_delete).await
    }

    /// List an owner's facts at or above `min_confidence` (default: the
    /// configured threshold)
    pub async fn facts(&self, owner_id: &str, min_confidence: Option<f64>) -> EngineResult<Vec<Fact>> {
        validate_owner_id(owner_id)?;
        let min_confidence = min_confidence.unwrap_or(self.config.confidence_threshold);
        validate_unit_interval("min_confidence", min_confidence)?;
        Ok(self.stores.facts.get(owner_id, min_confidence).await?)
    }

    /// Summarize recent episodes as bullet points
    pub async fn summarize_recent(
        &self,
        owner_id: &str,
        since_days: Option<u32>,
    ) -> EngineResult<RecentSummary> {
        validate_owner_id(owner_id)?;
        let since_days = since_days.unwrap_or(self.config.summary_window_days);

        let episodes = self
            .stores
            .episodes
            .list_recent(owner_id, since_days, RECENT_LIST_LIMIT)
            .await?;
        let summary = self.retriever.synthesizer().summarize_recent(&episodes).await;

        Ok(RecentSummary {
            owner_id: owner_id.to_string(),
            since_days,
            episode_count: episodes.len(),
            summary,
        })
    }

    /// Paths from the owner to a named entity, shortest first
    pub async fn explain(&self, owner_id: &str, entity_name: &str, k: usize) -> EngineResult<Vec<GraphPath>> {
        validate_owner_id(owner_id)?;
        validate_non_empty("entity name", entity_name)?;
        validate_k(k)?;
        Ok(self.stores.graph.find_paths(owner_id, entity_name.trim(), k).await?)
    }

    /// Nodes around the owner, optionally limited to the last `since_days` days
    pub async fn subgraph(&self, owner_id: &str, since_days: Option<u32>) -> EngineResult<Vec<GraphNode>> {
        validate_owner_id(owner_id)?;
        Ok(self.stores.graph.subgraph(owner_id, since_days).await?)
    }

    /// Count what each store holds for an owner
    pub async fn stats(&self, owner_id: &str) -> EngineResult<OwnerStats> {
        validate_owner_id(owner_id)?;
        let (facts, episodes, graph) = tokio::join!(
            self.stores.facts.count(owner_id),
            self.stores.episodes.count(owner_id),
            self.stores.graph.counts(owner_id),
        );
        let (episodes, graph) = (episodes?, graph?);

        let stats = OwnerStats {
            owner_id: owner_id.to_string(),
            facts: facts?,
            episodes: episodes.total,
            distinct_episode_texts: episodes.distinct_texts,
            graph_nodes: graph.nodes,
            graph_edges: graph.edges,
        };
        debug!(owner_id, ?stats, "Counted owner memory");
        Ok(stats)
    }

    /// Probe the gateway with a one-text embedding.
    ///
    /// Returns the embedding dimension.
    pub async fn health_check(&self) -> EngineResult<usize> {
        let vectors = self
            .gateway
            .embed(&["health check".to_string()])
            .await
            .map_err(|e| EngineError::initialization(format!("gateway unreachable: {e}")))?;

        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        let expected = self.gateway.dimensions();
        if dimensions == 0 || (expected > 0 && dimensions != expected) {
            return Err(EngineError::initialization(format!(
                "embedding dimension mismatch: expected {expected}, got {dimensions}"
            )));
        }

        info!(dimensions, "Gateway health check passed");
        Ok(dimensions)
    }
}
