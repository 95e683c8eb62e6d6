//! Store contracts consumed by the engine.
//!
//! Each store is independent: the engine never holds a lock across stores
//! and never expects a cross-store transaction. Any backend satisfying these
//! traits can be plugged in; `crate::db` ships SQLite adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::{
    Entity, EntityRef, Episode, EpisodeMatch, Fact, GraphNode, GraphPath, Predicate, Triple,
};

/// Soft or hard variant of a removal.
///
/// `Redact` keeps the row for audit but hides it from every read path;
/// `Delete` removes it physically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Removal {
    Redact,
    Delete,
}

impl Removal {
    pub fn from_hard_delete(hard_delete: bool) -> Self {
        if hard_delete { Removal::Delete } else { Removal::Redact }
    }
}

/// Nodes and edges touched by a graph removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalCount {
    pub nodes: usize,
    pub edges: usize,
}

impl RemovalCount {
    pub fn total(&self) -> usize {
        self.nodes + self.edges
    }
}

/// Live episodes for an owner, and how many distinct texts they hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeCount {
    pub total: usize,
    pub distinct_texts: usize,
}

/// Live nodes and edges in an owner's partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
    pub nodes: usize,
    pub edges: usize,
}

/// Key-value store of facts, keyed by `(owner_id, key)`.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Insert or overwrite; the last write to arrive wins.
    async fn upsert(&self, fact: &Fact) -> Result<()>;

    /// Non-redacted facts with `confidence >= min_confidence`, most confident
    /// then freshest first.
    async fn get(&self, owner_id: &str, min_confidence: f64) -> Result<Vec<Fact>>;

    /// Look up a single fact, including redacted rows.
    async fn find(&self, owner_id: &str, key: &str) -> Result<Option<Fact>>;

    /// Returns whether a row was affected.
    async fn remove(&self, owner_id: &str, key: &str, mode: Removal) -> Result<bool>;

    /// Live facts held for the owner.
    async fn count(&self, owner_id: &str) -> Result<usize>;
}

/// Vector store of episodes.
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    async fn upsert(&self, episode: &Episode) -> Result<()>;

    /// The `k` nearest non-redacted episodes of an owner, nearest first.
    /// `since_days` restricts to `observed_at >= now - since_days`.
    async fn query_similar(
        &self,
        owner_id: &str,
        embedding: &[f32],
        k: usize,
        since_days: Option<u32>,
    ) -> Result<Vec<EpisodeMatch>>;

    /// Non-redacted episodes observed within the window, newest first.
    async fn list_recent(&self, owner_id: &str, since_days: u32, limit: usize)
    -> Result<Vec<Episode>>;

    /// Look up a single episode, including redacted rows.
    async fn find(&self, id: &str) -> Result<Option<Episode>>;

    /// Ids of episodes written alongside the fact `key`.
    async fn ids_for_fact_key(&self, owner_id: &str, key: &str) -> Result<Vec<String>>;

    async fn remove(&self, id: &str, mode: Removal) -> Result<bool>;

    /// Live episodes held for the owner; duplicates are told apart by content hash.
    async fn count(&self, owner_id: &str) -> Result<EpisodeCount>;
}

/// Graph projection of owners, facts, episodes, entities and triples.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_owner(&self, owner_id: &str) -> Result<()>;

    /// Merge by `(name, type)`; aliases are unioned.
    async fn upsert_entity(&self, entity: &Entity) -> Result<()>;

    /// Mirror a fact and link it from the owner with `HAS_FACT`.
    async fn upsert_fact_node(&self, fact: &Fact) -> Result<()>;

    /// Link an episode from the owner with `HAS_EPISODE` and to each named
    /// entity with `MENTIONS`.
    async fn upsert_episode_node(
        &self,
        owner_id: &str,
        episode_id: &str,
        observed_at: DateTime<Utc>,
        entities: &[EntityRef],
    ) -> Result<()>;

    /// Merge by `(subject, predicate, object)`; properties are shallow-merged
    /// with new keys winning. The edge is stamped with `observed_at`.
    async fn upsert_triple(
        &self,
        triple: &Triple,
        properties: &Map<String, Value>,
        observed_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Hops from the owner node to the named entity; `None` when unreachable.
    async fn shortest_path_length(&self, owner_id: &str, entity_name: &str) -> Result<Option<u32>>;

    /// Nodes reachable from the owner, optionally restricted to recent ones.
    async fn subgraph(&self, owner_id: &str, since_days: Option<u32>) -> Result<Vec<GraphNode>>;

    /// Names of every live entity reachable from the owner, without a node cap.
    async fn entity_names(&self, owner_id: &str) -> Result<Vec<String>>;

    /// Live nodes reachable from the owner and the edges touching them.
    async fn counts(&self, owner_id: &str) -> Result<GraphCounts>;

    /// Up to `k` shortest paths from the owner to the named entity.
    async fn find_paths(&self, owner_id: &str, entity_name: &str, k: usize)
    -> Result<Vec<GraphPath>>;

    async fn remove_fact_node(&self, owner_id: &str, key: &str, mode: Removal) -> Result<RemovalCount>;

    async fn remove_episode_node(&self, episode_id: &str, mode: Removal) -> Result<RemovalCount>;

    /// Remove every entity node with this name plus its incident edges.
    async fn remove_entity(&self, name: &str, mode: Removal) -> Result<RemovalCount>;

    /// Remove triple edges carrying `predicate` inside the owner's reachable
    /// subgraph.
    async fn remove_predicate_edges(
        &self,
        owner_id: &str,
        predicate: Predicate,
        mode: Removal,
    ) -> Result<RemovalCount>;
}
