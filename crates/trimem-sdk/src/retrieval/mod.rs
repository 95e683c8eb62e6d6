//! Retrieval
//!
//! Answers a query for one owner by reading the three stores concurrently,
//! ranking episodes with the fused score and condensing the result into a
//! context card. Store and gateway failures degrade to empty sections and
//! are named in the rationale; only invalid input is an error.
//!
//! ```text
//!              ┌──────────── facts.get(owner, threshold) ───────────┐
//!  request ──▶ ├── embed(query) ─▶ episodes.query_similar(k, since) ├──▶ score ─▶ card
//!              └── graph topics ─▶ path lengths + find_paths ───────┘
//! ```

pub mod scoring;

pub use scoring::ScoreBreakdown;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use trimem_core::types::{Episode, EpisodeMatch, Fact, GraphPath};
use trimem_core::vector::cosine_similarity;
use trimem_core::{EpisodeStore, FactStore, GraphStore, LanguageModelGateway};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::synthesis::ContextSynthesizer;
use crate::utils::{days_between, validate_k, validate_non_empty, validate_owner_id};

/// Shortest query token matched against entity names
const MIN_TOPIC_TOKEN_LEN: usize = 3;

/// A retrieval query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub owner_id: String,
    pub query: String,
    /// Episodes to return; the configured default when absent
    pub k: Option<usize>,
    /// Episode window in days; the configured default when absent
    pub since_days: Option<u32>,
    pub include_graph: bool,
}

impl RetrieveRequest {
    pub fn new(owner_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            query: query.into(),
            k: None,
            since_days: None,
            include_graph: true,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    pub fn with_since_days(mut self, days: u32) -> Self {
        self.since_days = Some(days);
        self
    }

    pub fn without_graph(mut self) -> Self {
        self.include_graph = false;
        self
    }
}

/// An episode with its fused score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEpisode {
    pub episode: Episode,
    pub distance: f64,
    pub score: ScoreBreakdown,
}

/// Retrieval result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub facts: Vec<Fact>,
    pub episodes: Vec<ScoredEpisode>,
    pub graph_hits: Vec<GraphPath>,
    pub context_card: String,
    pub rationale: String,
}

impl RankedResult {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.episodes.is_empty() && self.graph_hits.is_empty()
    }
}

/// Episode candidates plus what went wrong fetching them
#[derive(Default)]
struct EpisodeFetch {
    matches: Vec<EpisodeMatch>,
    query_embedding: Vec<f32>,
    notes: Vec<String>,
}

/// Topic proximities and paths for a query
#[derive(Default)]
struct GraphContext {
    /// Lowercased entity name to proximity
    proximity: HashMap<String, f64>,
    topics: Vec<String>,
    hits: Vec<GraphPath>,
    notes: Vec<String>,
}

pub struct Retriever {
    facts: Arc<dyn FactStore>,
    episodes: Arc<dyn EpisodeStore>,
    graph: Arc<dyn GraphStore>,
    gateway: Arc<dyn LanguageModelGateway>,
    synthesizer: ContextSynthesizer,
    config: EngineConfig,
}

impl Retriever {
    pub fn new(
        facts: Arc<dyn FactStore>,
        episodes: Arc<dyn EpisodeStore>,
        graph: Arc<dyn GraphStore>,
        gateway: Arc<dyn LanguageModelGateway>,
        config: EngineConfig,
    ) -> Self {
        let synthesizer = ContextSynthesizer::new(gateway.clone(), config.context.clone());
        Self {
            facts,
            episodes,
            graph,
            gateway,
            synthesizer,
            config,
        }
    }

    pub fn synthesizer(&self) -> &ContextSynthesizer {
        &self.synthesizer
    }

    /// Retrieve ranked memory for a query
    pub async fn retrieve(&self, request: &RetrieveRequest) -> EngineResult<RankedResult> {
        validate_owner_id(&request.owner_id)?;
        validate_non_empty("query", &request.query)?;
        let k = request.k.unwrap_or(self.config.default_k);
        validate_k(k)?;
        let since_days = request.since_days.unwrap_or(self.config.default_since_days);
        let owner_id = request.owner_id.as_str();

        let (facts, fetch, graph) = tokio::join!(
            self.facts.get(owner_id, self.config.confidence_threshold),
            self.fetch_episodes(owner_id, &request.query, k, since_days),
            self.graph_context(owner_id, &request.query, request.include_graph),
        );

        let mut notes = Vec::new();
        let facts = facts.unwrap_or_else(|err| {
            warn!(owner_id, error = %err, "Fact store read failed");
            notes.push("fact store unavailable".to_string());
            Vec::new()
        });
        notes.extend(fetch.notes.iter().cloned());
        notes.extend(graph.notes.iter().cloned());

        let episodes = self.rank(fetch, &graph.proximity);

        let top: Vec<&Episode> = episodes.iter().map(|s| &s.episode).collect();
        let card = self
            .synthesizer
            .summarize(&request.query, &facts, &top, &graph.hits)
            .await;

        let rationale = self.rationale(owner_id, &facts, &episodes, &graph, &notes);
        info!(
            owner_id,
            facts = facts.len(),
            episodes = episodes.len(),
            graph_hits = graph.hits.len(),
            "Retrieved memory"
        );

        Ok(RankedResult {
            facts,
            episodes,
            graph_hits: graph.hits,
            context_card: card,
            rationale,
        })
    }

    async fn fetch_episodes(&self, owner_id: &str, query: &str, k: usize, since_days: u32) -> EpisodeFetch {
        let mut fetch = EpisodeFetch::default();

        let query_embedding = match self.gateway.embed(&[query.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.swap_remove(0),
            Ok(_) => {
                fetch.notes.push("query embedding was empty".into());
                return fetch;
            }
            Err(err) => {
                warn!(owner_id, error = %err, "Query embedding failed");
                fetch.notes.push("query embedding unavailable, episodes skipped".into());
                return fetch;
            }
        };

        match self
            .episodes
            .query_similar(owner_id, &query_embedding, k, Some(since_days))
            .await
        {
            Ok(matches) => fetch.matches = matches,
            Err(err) => {
                warn!(owner_id, error = %err, "Combined episode filter failed, retrying with owner filter");
                match self.episodes.query_similar(owner_id, &query_embedding, k, None).await {
                    Ok(matches) => {
                        let now = Utc::now();
                        fetch.matches = matches
                            .into_iter()
                            .filter(|m| days_between(m.episode.observed_at, now) <= f64::from(since_days))
                            .collect();
                        fetch
                            .notes
                            .push("episode time filter applied client-side".into());
                    }
                    Err(err) => {
                        warn!(owner_id, error = %err, "Episode store read failed");
                        fetch.notes.push("episode store unavailable".into());
                    }
                }
            }
        }

        fetch.query_embedding = query_embedding;
        fetch
    }

    async fn graph_context(&self, owner_id: &str, query: &str, include_graph: bool) -> GraphContext {
        let mut context = GraphContext::default();
        if !include_graph {
            return context;
        }

        let names = match self.graph.entity_names(owner_id).await {
            Ok(names) => names,
            Err(err) => {
                warn!(owner_id, error = %err, "Graph store read failed");
                context.notes.push("graph store unavailable".into());
                return context;
            }
        };

        let topics = topic_entities(query, names.iter().map(String::as_str));
        debug!(owner_id, ?topics, "Matched topic entities");

        let mut seen = HashSet::new();
        for topic in &topics {
            match self.graph.shortest_path_length(owner_id, topic).await {
                Ok(len) => {
                    let proximity = scoring::graph_proximity(len);
                    let entry = context.proximity.entry(topic.to_lowercase()).or_insert(0.0);
                    *entry = entry.max(proximity);
                }
                Err(err) => {
                    warn!(owner_id, topic = %topic, error = %err, "Path length lookup failed");
                    context.notes.push(format!("graph distance to {topic} unavailable"));
                }
            }

            match self.graph.find_paths(owner_id, topic, self.config.paths_per_topic).await {
                Ok(paths) => {
                    for path in paths {
                        if seen.insert(path.describe()) {
                            context.hits.push(path);
                        }
                    }
                }
                Err(err) => {
                    warn!(owner_id, topic = %topic, error = %err, "Path lookup failed");
                    context.notes.push(format!("graph paths to {topic} unavailable"));
                }
            }
        }

        context.hits.sort_by_key(GraphPath::len);
        context.topics = topics;
        context
    }

    fn rank(&self, fetch: EpisodeFetch, proximity: &HashMap<String, f64>) -> Vec<ScoredEpisode> {
        let now = Utc::now();
        let mut scored: Vec<ScoredEpisode> = fetch
            .matches
            .into_iter()
            .filter(|m| !m.episode.redacted)
            .map(|m| {
                let cosine = if m.episode.embedding.is_empty() {
                    1.0 - m.distance
                } else {
                    f64::from(cosine_similarity(&fetch.query_embedding, &m.episode.embedding))
                };
                let graph = m
                    .episode
                    .entities
                    .iter()
                    .filter_map(|name| proximity.get(&name.to_lowercase()))
                    .fold(0.0f64, |acc, p| acc.max(*p));
                let score = scoring::fuse(
                    &self.config.weights,
                    cosine,
                    days_between(m.episode.observed_at, now),
                    self.config.recency_half_life_days,
                    m.episode.importance,
                    graph,
                );
                ScoredEpisode {
                    episode: m.episode,
                    distance: m.distance,
                    score,
                }
            })
            .collect();

        sort_ranked(&mut scored);
        scored
    }

    fn rationale(
        &self,
        owner_id: &str,
        facts: &[Fact],
        episodes: &[ScoredEpisode],
        graph: &GraphContext,
        notes: &[String],
    ) -> String {
        let mut parts = Vec::new();

        if facts.is_empty() && episodes.is_empty() && graph.hits.is_empty() {
            parts.push(format!("No prior memory found for owner {owner_id}."));
        } else {
            parts.push(format!(
                "{} fact(s) at confidence >= {:.2}.",
                facts.len(),
                self.config.confidence_threshold
            ));
            match episodes.first() {
                Some(top) => parts.push(format!(
                    "{} episode(s) ranked by similarity, recency, importance and graph proximity; top score {:.3}.",
                    episodes.len(),
                    top.score.total
                )),
                None => parts.push("No episodes matched.".to_string()),
            }
            if !graph.topics.is_empty() {
                parts.push(format!(
                    "{} graph path(s) via {}.",
                    graph.hits.len(),
                    graph.topics.join(", ")
                ));
            }
        }

        if !notes.is_empty() {
            parts.push(format!("Degraded: {}.", notes.join("; ")));
        }
        parts.join(" ")
    }
}

/// Sort by score descending; ties go to the more recent episode.
pub(crate) fn sort_ranked(scored: &mut [ScoredEpisode]) {
    scored.sort_by(|a, b| {
        b.score
            .total
            .total_cmp(&a.score.total)
            .then_with(|| b.episode.observed_at.cmp(&a.episode.observed_at))
    });
}

/// Entity names the query refers to.
///
/// A name matches when it occurs in the query, or equals a query word of at
/// least three characters, ignoring case.
pub(crate) fn topic_entities<'a>(query: &str, names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let lowered = query.to_lowercase();
    let tokens: HashSet<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOPIC_TOKEN_LEN)
        .collect();

    let mut topics: Vec<String> = Vec::new();
    for name in names {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let matched = lowered.contains(&needle) || tokens.contains(needle.as_str());
        if matched && !topics.iter().any(|t| t.to_lowercase() == needle) {
            topics.push(name.to_string());
        }
    }
    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::NO_MEMORY_CARD;
    use crate::testing::{
        FailingGraphStore, FilterRejectingEpisodeStore, ScriptedGateway, SqliteHandles, bag_of_words,
    };
    use chrono::{DateTime, Duration};
    use trimem_core::RetryPolicy;
    use trimem_core::types::{EntityRef, EntityType};

    fn config() -> EngineConfig {
        EngineConfig::default().with_retry(RetryPolicy::none())
    }

    fn episode(owner_id: &str, text: &str, importance: f64, observed_at: DateTime<Utc>) -> Episode {
        Episode {
            id: Episode::new_id(),
            owner_id: owner_id.into(),
            text: text.into(),
            embedding: bag_of_words(text),
            importance,
            tags: Default::default(),
            channel: "slack".into(),
            thread_id: None,
            content_hash: crate::utils::content_hash(text),
            fact_keys: Vec::new(),
            entities: Vec::new(),
            observed_at,
            redacted: false,
        }
    }

    fn retriever(handles: &SqliteHandles, gateway: Arc<ScriptedGateway>) -> Retriever {
        let stores = handles.store_set();
        Retriever::new(stores.facts, stores.episodes, stores.graph, gateway, config())
    }

    #[test]
    fn test_topic_entities() {
        let names = ["401k", "ACME", "HR", "Benefits Policy"];
        let topics = topic_entities("What is acme's 401K match under the benefits policy?", names.into_iter());
        assert_eq!(topics, vec!["401k", "ACME", "Benefits Policy"]);

        // Short names still match as substrings
        let topics = topic_entities("ping hr about it", names.into_iter());
        assert_eq!(topics, vec!["HR"]);
    }

    #[test]
    fn test_sort_ties_prefer_recent() {
        let now = Utc::now();
        let score = ScoreBreakdown {
            total: 0.5,
            ..Default::default()
        };
        let mut ranked = vec![
            ScoredEpisode {
                episode: episode("acme", "old", 0.5, now - Duration::days(3)),
                distance: 0.1,
                score,
            },
            ScoredEpisode {
                episode: episode("acme", "new", 0.5, now),
                distance: 0.1,
                score,
            },
        ];
        sort_ranked(&mut ranked);
        assert_eq!(ranked[0].episode.text, "new");
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let handles = SqliteHandles::in_memory();
        let retriever = retriever(&handles, Arc::new(ScriptedGateway::new()));

        let err = retriever
            .retrieve(&RetrieveRequest::new("acme", "401k").with_k(0))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        assert!(retriever.retrieve(&RetrieveRequest::new("", "401k")).await.is_err());
        assert!(retriever.retrieve(&RetrieveRequest::new("acme", "  ")).await.is_err());
    }

    #[tokio::test]
    async fn test_equal_similarity_prefers_recent() {
        let handles = SqliteHandles::in_memory();
        let now = Utc::now();
        let mut older = episode("acme", "benefits enrollment", 0.9, now - Duration::days(30));
        older.id = "older".into();
        let mut newer = episode("acme", "benefits enrollment", 0.9, now);
        newer.id = "newer".into();
        handles.episodes.upsert(&older).await.unwrap();
        handles.episodes.upsert(&newer).await.unwrap();

        let result = retriever(&handles, Arc::new(ScriptedGateway::new()))
            .retrieve(&RetrieveRequest::new("acme", "benefits enrollment").with_since_days(60))
            .await
            .unwrap();

        assert_eq!(result.episodes.len(), 2);
        assert_eq!(result.episodes[0].episode.id, "newer");
        assert!(result.episodes[0].score.total > result.episodes[1].score.total);
        assert!((result.episodes[0].score.similarity - result.episodes[1].score.similarity).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_since_days_excludes_old_episodes() {
        let handles = SqliteHandles::in_memory();
        let now = Utc::now();
        handles
            .episodes
            .upsert(&episode("acme", "benefits enrollment", 0.9, now - Duration::days(45)))
            .await
            .unwrap();

        let result = retriever(&handles, Arc::new(ScriptedGateway::new()))
            .retrieve(&RetrieveRequest::new("acme", "benefits enrollment"))
            .await
            .unwrap();

        assert!(result.episodes.is_empty());
        assert_eq!(result.context_card, NO_MEMORY_CARD);
    }

    #[tokio::test]
    async fn test_unbounded_window_keeps_retrieval_available() {
        let handles = SqliteHandles::in_memory();
        let now = Utc::now();
        handles
            .episodes
            .upsert(&episode("acme", "benefits enrollment", 0.9, now - Duration::days(400)))
            .await
            .unwrap();
        let retriever = retriever(&handles, Arc::new(ScriptedGateway::new()));

        let all = retriever
            .retrieve(&RetrieveRequest::new("acme", "benefits enrollment").with_since_days(u32::MAX))
            .await
            .unwrap();
        assert_eq!(all.episodes.len(), 1);
        assert!(!all.rationale.contains("Degraded"));

        let after = retriever
            .retrieve(&RetrieveRequest::new("acme", "benefits enrollment").with_since_days(30))
            .await
            .unwrap();
        assert!(after.episodes.is_empty());
        assert!(!after.rationale.contains("episode store unavailable"));
    }

    #[tokio::test]
    async fn test_filter_fallback_applies_window_client_side() {
        let handles = SqliteHandles::in_memory();
        let now = Utc::now();
        handles
            .episodes
            .upsert(&episode("acme", "benefits enrollment opens", 0.8, now - Duration::days(2)))
            .await
            .unwrap();
        handles
            .episodes
            .upsert(&episode("acme", "benefits enrollment closed", 0.8, now - Duration::days(90)))
            .await
            .unwrap();

        let retriever = Retriever::new(
            handles.facts.clone(),
            Arc::new(FilterRejectingEpisodeStore {
                inner: handles.episodes.clone(),
            }),
            handles.graph.clone(),
            Arc::new(ScriptedGateway::new()),
            config(),
        );

        let result = retriever
            .retrieve(&RetrieveRequest::new("acme", "benefits enrollment"))
            .await
            .unwrap();

        assert_eq!(result.episodes.len(), 1);
        assert_eq!(result.episodes[0].episode.text, "benefits enrollment opens");
        assert!(result.rationale.contains("client-side"));
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_facts_only() {
        let handles = SqliteHandles::in_memory();
        handles
            .facts
            .upsert(&Fact::new("acme", "match_formula", "100% of first 3%", 0.9))
            .await
            .unwrap();

        let result = retriever(&handles, Arc::new(ScriptedGateway::new().failing_embeddings()))
            .retrieve(&RetrieveRequest::new("acme", "match formula"))
            .await
            .unwrap();

        assert_eq!(result.facts.len(), 1);
        assert!(result.episodes.is_empty());
        assert!(result.rationale.contains("query embedding unavailable"));
        assert!(result.context_card.contains("100% of first 3%"));
    }

    #[tokio::test]
    async fn test_graph_outage_degrades() {
        let handles = SqliteHandles::in_memory();
        handles
            .facts
            .upsert(&Fact::new("acme", "match_formula", "100% of first 3%", 0.9))
            .await
            .unwrap();

        let retriever = Retriever::new(
            handles.facts.clone(),
            handles.episodes.clone(),
            Arc::new(FailingGraphStore),
            Arc::new(ScriptedGateway::new()),
            config(),
        );
        let result = retriever
            .retrieve(&RetrieveRequest::new("acme", "401k match"))
            .await
            .unwrap();

        assert_eq!(result.facts.len(), 1);
        assert!(result.graph_hits.is_empty());
        assert!(result.rationale.contains("graph store unavailable"));
    }

    #[tokio::test]
    async fn test_graph_proximity_boosts_mentioning_episode() {
        let handles = SqliteHandles::in_memory();
        let now = Utc::now();

        let mut mentions = episode("acme", "plan update", 0.7, now);
        mentions.entities = vec!["401k".into()];
        let plain = episode("acme", "plan update", 0.7, now);
        handles.episodes.upsert(&mentions).await.unwrap();
        handles.episodes.upsert(&plain).await.unwrap();

        handles.graph.upsert_owner("acme").await.unwrap();
        handles
            .graph
            .upsert_episode_node(
                "acme",
                &mentions.id,
                now,
                &[EntityRef::typed("401k", EntityType::Plan)],
            )
            .await
            .unwrap();

        let result = retriever(&handles, Arc::new(ScriptedGateway::new()))
            .retrieve(&RetrieveRequest::new("acme", "401k plan update"))
            .await
            .unwrap();

        assert_eq!(result.episodes[0].episode.id, mentions.id);
        assert_eq!(result.episodes[0].score.graph_proximity, 1.0 / 3.0);
        assert_eq!(result.episodes[1].score.graph_proximity, 0.0);
        assert!(!result.graph_hits.is_empty());
        assert!(result.rationale.contains("401k"));

        let without = retriever(&handles, Arc::new(ScriptedGateway::new()))
            .retrieve(&RetrieveRequest::new("acme", "401k plan update").without_graph())
            .await
            .unwrap();
        assert!(without.graph_hits.is_empty());
        assert_eq!(without.episodes[0].score.graph_proximity, 0.0);
    }

    #[tokio::test]
    async fn test_graph_proximity_for_owner_with_many_facts() {
        let handles = SqliteHandles::in_memory();
        let now = Utc::now();

        for i in 0..150 {
            let fact = Fact::new("acme", format!("policy_{i:03}"), "on file", 0.9);
            handles.facts.upsert(&fact).await.unwrap();
            handles.graph.upsert_fact_node(&fact).await.unwrap();
        }

        let mut mentions = episode("acme", "plan update", 0.7, now);
        mentions.entities = vec!["401k".into()];
        handles.episodes.upsert(&mentions).await.unwrap();
        handles
            .graph
            .upsert_episode_node(
                "acme",
                &mentions.id,
                now,
                &[EntityRef::typed("401k", EntityType::Plan)],
            )
            .await
            .unwrap();

        let result = retriever(&handles, Arc::new(ScriptedGateway::new()))
            .retrieve(&RetrieveRequest::new("acme", "401k plan update"))
            .await
            .unwrap();

        let score = &result.episodes[0].score;
        assert!(score.graph_proximity > 0.0 && score.graph_proximity <= 1.0);
        assert!(!result.graph_hits.is_empty());
        assert!(result.rationale.contains("via 401k"));
        assert!(!result.rationale.contains("Degraded"));
    }
}
