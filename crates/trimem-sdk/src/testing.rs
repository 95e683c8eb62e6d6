//! Test doubles shared by the engine test suites.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use trimem_core::db::{SqliteEpisodeStore, SqliteFactStore, SqliteGraphStore};
use trimem_core::store::{EpisodeCount, GraphCounts, RemovalCount};
use trimem_core::types::{
    Entity, EntityRef, Episode, EpisodeMatch, Fact, GraphNode, GraphPath, Predicate, StoreKind,
    Triple,
};
use trimem_core::{
    EpisodeStore, Error, GraphStore, LanguageModelGateway, Removal, Result, RetryPolicy,
};

use crate::config::EngineConfig;
use crate::engine::{MemoryEngine, StoreSet};
use crate::extraction::{FACTS_SYSTEM_PROMPT, GRAPH_SYSTEM_PROMPT};

pub(crate) const DIMENSIONS: usize = 64;

/// Gateway with canned completions and bag-of-words embeddings.
///
/// Texts sharing words get similar vectors, so similarity ranking in tests
/// follows word overlap.
pub(crate) struct ScriptedGateway {
    facts_reply: String,
    graph_reply: String,
    card_reply: Option<String>,
    fail_completions: bool,
    fail_embeddings: bool,
    pub completions: AtomicUsize,
    pub embeds: AtomicUsize,
    last_temperature: AtomicU32,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            facts_reply: r#"{"facts": [], "episodes": []}"#.into(),
            graph_reply: r#"{"entities": [], "triples": []}"#.into(),
            card_reply: None,
            fail_completions: false,
            fail_embeddings: false,
            completions: AtomicUsize::new(0),
            embeds: AtomicUsize::new(0),
            last_temperature: AtomicU32::new(f32::NAN.to_bits()),
        }
    }

    /// Temperature passed to the most recent completion
    pub fn last_temperature(&self) -> f32 {
        f32::from_bits(self.last_temperature.load(Ordering::SeqCst))
    }

    pub fn with_replies(mut self, facts: &str, graph: &str) -> Self {
        self.facts_reply = facts.into();
        self.graph_reply = graph.into();
        self
    }

    /// Reply for every prompt other than the two extraction prompts
    pub fn with_card(mut self, card: &str) -> Self {
        self.card_reply = Some(card.into());
        self
    }

    pub fn failing_completions(mut self) -> Self {
        self.fail_completions = true;
        self
    }

    pub fn failing_embeddings(mut self) -> Self {
        self.fail_embeddings = true;
        self
    }

    pub fn completion_count(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

/// Hash every lowercase word into one of `DIMENSIONS` buckets.
pub(crate) fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSIONS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.to_lowercase().bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        vector[(hash % DIMENSIONS as u64) as usize] += 1.0;
    }
    vector
}

#[async_trait]
impl LanguageModelGateway for ScriptedGateway {
    async fn complete(&self, system_prompt: &str, _user_prompt: &str, temperature: f32) -> Result<String> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        self.last_temperature.store(temperature.to_bits(), Ordering::SeqCst);
        if self.fail_completions {
            return Err(Error::gateway("scripted completion failure"));
        }
        match system_prompt {
            FACTS_SYSTEM_PROMPT => Ok(self.facts_reply.clone()),
            GRAPH_SYSTEM_PROMPT => Ok(self.graph_reply.clone()),
            _ => self
                .card_reply
                .clone()
                .ok_or_else(|| Error::gateway("no scripted reply")),
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embeds.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings {
            return Err(Error::gateway("scripted embedding failure"));
        }
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

/// Concrete SQLite stores, kept for row-level assertions
pub(crate) struct SqliteHandles {
    pub facts: Arc<SqliteFactStore>,
    pub episodes: Arc<SqliteEpisodeStore>,
    pub graph: Arc<SqliteGraphStore>,
}

impl SqliteHandles {
    pub fn in_memory() -> Self {
        Self {
            facts: Arc::new(SqliteFactStore::in_memory().unwrap()),
            episodes: Arc::new(SqliteEpisodeStore::in_memory().unwrap()),
            graph: Arc::new(SqliteGraphStore::in_memory().unwrap()),
        }
    }

    pub fn store_set(&self) -> StoreSet {
        StoreSet {
            facts: self.facts.clone(),
            episodes: self.episodes.clone(),
            graph: self.graph.clone(),
        }
    }
}

/// Engine over the given stores with retries disabled
pub(crate) fn test_engine(gateway: Arc<ScriptedGateway>, stores: StoreSet) -> MemoryEngine {
    let config = EngineConfig::default().with_retry(RetryPolicy::none());
    MemoryEngine::new(config, stores, gateway).unwrap()
}

/// Episode store that rejects combined owner + time filters
pub(crate) struct FilterRejectingEpisodeStore {
    pub inner: Arc<SqliteEpisodeStore>,
}

#[async_trait]
impl EpisodeStore for FilterRejectingEpisodeStore {
    async fn upsert(&self, episode: &Episode) -> Result<()> {
        self.inner.upsert(episode).await
    }

    async fn query_similar(
        &self,
        owner_id: &str,
        embedding: &[f32],
        k: usize,
        since_days: Option<u32>,
    ) -> Result<Vec<EpisodeMatch>> {
        if since_days.is_some() {
            return Err(Error::store_unavailable(
                StoreKind::Episode,
                "combined owner and time filter not supported",
            ));
        }
        self.inner.query_similar(owner_id, embedding, k, None).await
    }

    async fn list_recent(&self, owner_id: &str, since_days: u32, limit: usize) -> Result<Vec<Episode>> {
        self.inner.list_recent(owner_id, since_days, limit).await
    }

    async fn find(&self, id: &str) -> Result<Option<Episode>> {
        self.inner.find(id).await
    }

    async fn ids_for_fact_key(&self, owner_id: &str, key: &str) -> Result<Vec<String>> {
        self.inner.ids_for_fact_key(owner_id, key).await
    }

    async fn remove(&self, id: &str, mode: Removal) -> Result<bool> {
        self.inner.remove(id, mode).await
    }

    async fn count(&self, owner_id: &str) -> Result<EpisodeCount> {
        self.inner.count(owner_id).await
    }
}

/// Graph store whose every call fails
pub(crate) struct FailingGraphStore;

fn graph_offline<T>() -> Result<T> {
    Err(Error::store_unavailable(StoreKind::Graph, "graph offline"))
}

#[async_trait]
impl GraphStore for FailingGraphStore {
    async fn upsert_owner(&self, _owner_id: &str) -> Result<()> {
        graph_offline()
    }

    async fn upsert_entity(&self, _entity: &Entity) -> Result<()> {
        graph_offline()
    }

    async fn upsert_fact_node(&self, _fact: &Fact) -> Result<()> {
        graph_offline()
    }

    async fn upsert_episode_node(
        &self,
        _owner_id: &str,
        _episode_id: &str,
        _observed_at: DateTime<Utc>,
        _entities: &[EntityRef],
    ) -> Result<()> {
        graph_offline()
    }

    async fn upsert_triple(
        &self,
        _triple: &Triple,
        _properties: &Map<String, Value>,
        _observed_at: DateTime<Utc>,
    ) -> Result<()> {
        graph_offline()
    }

    async fn shortest_path_length(&self, _owner_id: &str, _entity_name: &str) -> Result<Option<u32>> {
        graph_offline()
    }

    async fn subgraph(&self, _owner_id: &str, _since_days: Option<u32>) -> Result<Vec<GraphNode>> {
        graph_offline()
    }

    async fn entity_names(&self, _owner_id: &str) -> Result<Vec<String>> {
        graph_offline()
    }

    async fn counts(&self, _owner_id: &str) -> Result<GraphCounts> {
        graph_offline()
    }

    async fn find_paths(&self, _owner_id: &str, _entity_name: &str, _k: usize) -> Result<Vec<GraphPath>> {
        graph_offline()
    }

    async fn remove_fact_node(&self, _owner_id: &str, _key: &str, _mode: Removal) -> Result<RemovalCount> {
        graph_offline()
    }

    async fn remove_episode_node(&self, _episode_id: &str, _mode: Removal) -> Result<RemovalCount> {
        graph_offline()
    }

    async fn remove_entity(&self, _name: &str, _mode: Removal) -> Result<RemovalCount> {
        graph_offline()
    }

    async fn remove_predicate_edges(
        &self,
        _owner_id: &str,
        _predicate: Predicate,
        _mode: Removal,
    ) -> Result<RemovalCount> {
        graph_offline()
    }
}
