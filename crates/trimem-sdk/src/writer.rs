//! Write coordination
//!
//! Persists one [`Extraction`] across the three stores in a fixed order:
//! owner node, facts, entities, triples, then episodes. Stores are written
//! independently. A failure in one store is recorded and the rest still run,
//! so a write may be partial; the caller sees exactly which items failed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use trimem_core::types::{EntityRef, Episode, StoreKind};
use trimem_core::{EpisodeStore, FactStore, GraphStore, LanguageModelGateway};

use crate::extraction::{EXTRACTION_SOURCE, Extraction};
use crate::utils::content_hash;

/// Where and when the extracted text was observed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteContext {
    pub channel: String,
    pub observed_at: DateTime<Utc>,
    pub thread_id: Option<String>,
}

impl WriteContext {
    pub fn new(channel: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            channel: channel.into(),
            observed_at,
            thread_id: None,
        }
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

/// One item a store did not accept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreFailure {
    pub store: StoreKind,
    pub item: String,
    pub error: String,
}

/// Per-store outcome of a write
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteReport {
    pub facts_written: usize,
    pub episodes_written: usize,
    pub entities_written: usize,
    pub triples_written: usize,
    pub episode_ids: Vec<String>,
    pub failures: Vec<StoreFailure>,
}

impl WriteReport {
    pub fn total_written(&self) -> usize {
        self.facts_written + self.episodes_written + self.entities_written + self.triples_written
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Some items were written and some were not
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty() && self.total_written() > 0
    }

    pub fn failures_for(&self, store: StoreKind) -> impl Iterator<Item = &StoreFailure> {
        self.failures.iter().filter(move |f| f.store == store)
    }

    fn fail(&mut self, store: StoreKind, item: impl Into<String>, error: impl ToString) {
        let failure = StoreFailure {
            store,
            item: item.into(),
            error: error.to_string(),
        };
        warn!(store = %failure.store, item = %failure.item, error = %failure.error, "Store write failed");
        self.failures.push(failure);
    }
}

/// Writes extractions to the fact, episode and graph stores
pub struct WriteCoordinator {
    facts: Arc<dyn FactStore>,
    episodes: Arc<dyn EpisodeStore>,
    graph: Arc<dyn GraphStore>,
    gateway: Arc<dyn LanguageModelGateway>,
    threshold: f64,
}

impl WriteCoordinator {
    pub fn new(
        facts: Arc<dyn FactStore>,
        episodes: Arc<dyn EpisodeStore>,
        graph: Arc<dyn GraphStore>,
        gateway: Arc<dyn LanguageModelGateway>,
        threshold: f64,
    ) -> Self {
        Self {
            facts,
            episodes,
            graph,
            gateway,
            threshold,
        }
    }

    /// Persist an extraction for `owner_id`.
    ///
    /// Never fails as a whole; per-item failures land in the report.
    pub async fn persist(
        &self,
        owner_id: &str,
        extraction: &Extraction,
        context: &WriteContext,
    ) -> WriteReport {
        let mut report = WriteReport::default();
        if extraction.is_empty() {
            return report;
        }

        if let Err(err) = self.graph.upsert_owner(owner_id).await {
            report.fail(StoreKind::Graph, format!("owner:{owner_id}"), err);
        }

        self.write_facts(owner_id, extraction, &mut report).await;
        self.write_entities(extraction, &mut report).await;
        self.write_triples(extraction, context, &mut report).await;
        self.write_episodes(owner_id, extraction, context, &mut report).await;

        info!(
            owner_id,
            facts = report.facts_written,
            episodes = report.episodes_written,
            entities = report.entities_written,
            triples = report.triples_written,
            failures = report.failures.len(),
            "Persisted extraction"
        );
        report
    }

    async fn write_facts(&self, owner_id: &str, extraction: &Extraction, report: &mut WriteReport) {
        for fact in &extraction.facts {
            let item = format!("fact:{}", fact.key);
            if fact.owner_id != owner_id {
                report.fail(StoreKind::Fact, item, "fact belongs to another owner");
                continue;
            }
            if !(0.0..=1.0).contains(&fact.confidence) || fact.confidence < self.threshold {
                report.fail(
                    StoreKind::Fact,
                    item,
                    format!("confidence {} below threshold {}", fact.confidence, self.threshold),
                );
                continue;
            }

            match self.facts.upsert(fact).await {
                Ok(()) => report.facts_written += 1,
                Err(err) => {
                    report.fail(StoreKind::Fact, item, err);
                    continue;
                }
            }

            if let Err(err) = self.graph.upsert_fact_node(fact).await {
                report.fail(StoreKind::Graph, item, err);
            }
        }
    }

    async fn write_entities(&self, extraction: &Extraction, report: &mut WriteReport) {
        for entity in &extraction.entities {
            match self.graph.upsert_entity(entity).await {
                Ok(()) => report.entities_written += 1,
                Err(err) => report.fail(
                    StoreKind::Graph,
                    format!("entity:{} ({})", entity.name, entity.entity_type),
                    err,
                ),
            }
        }
    }

    async fn write_triples(
        &self,
        extraction: &Extraction,
        context: &WriteContext,
        report: &mut WriteReport,
    ) {
        let mut properties = Map::new();
        properties.insert("channel".into(), Value::from(context.channel.clone()));
        properties.insert(
            "observed_at".into(),
            Value::from(context.observed_at.to_rfc3339()),
        );
        properties.insert("source".into(), Value::from(EXTRACTION_SOURCE));

        for triple in &extraction.triples {
            match self
                .graph
                .upsert_triple(triple, &properties, context.observed_at)
                .await
            {
                Ok(()) => report.triples_written += 1,
                Err(err) => report.fail(
                    StoreKind::Graph,
                    format!(
                        "triple:{} {} {}",
                        triple.subject.name, triple.predicate, triple.object.name
                    ),
                    err,
                ),
            }
        }
    }

    async fn write_episodes(
        &self,
        owner_id: &str,
        extraction: &Extraction,
        context: &WriteContext,
        report: &mut WriteReport,
    ) {
        if extraction.episodes.is_empty() {
            return;
        }

        let texts: Vec<String> = extraction.episodes.iter().map(|e| e.text.clone()).collect();
        let embeddings = match self.gateway.embed(&texts).await {
            Ok(vectors) if vectors.len() == texts.len() => vectors,
            Ok(vectors) => {
                let message = format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    vectors.len()
                );
                for text in &texts {
                    report.fail(StoreKind::Episode, episode_item(text), &message);
                }
                return;
            }
            Err(err) => {
                for text in &texts {
                    report.fail(StoreKind::Episode, episode_item(text), format!("embedding failed: {err}"));
                }
                return;
            }
        };

        let fact_keys = extraction.fact_keys();
        let entity_names: Vec<String> = extraction.entities.iter().map(|e| e.name.clone()).collect();
        let mentions: Vec<EntityRef> = extraction
            .entities
            .iter()
            .map(|e| EntityRef::typed(e.name.clone(), e.entity_type))
            .collect();

        for (candidate, embedding) in extraction.episodes.iter().zip(embeddings) {
            let episode = Episode {
                id: Episode::new_id(),
                owner_id: owner_id.to_string(),
                text: candidate.text.clone(),
                embedding,
                importance: candidate.importance,
                tags: candidate.tags.clone(),
                channel: context.channel.clone(),
                thread_id: context.thread_id.clone(),
                content_hash: content_hash(&candidate.text),
                fact_keys: fact_keys.clone(),
                entities: entity_names.clone(),
                observed_at: context.observed_at,
                redacted: false,
            };

            if let Err(err) = self.episodes.upsert(&episode).await {
                report.fail(StoreKind::Episode, episode_item(&episode.text), err);
                continue;
            }
            report.episodes_written += 1;
            report.episode_ids.push(episode.id.clone());

            if let Err(err) = self
                .graph
                .upsert_episode_node(owner_id, &episode.id, episode.observed_at, &mentions)
                .await
            {
                report.fail(StoreKind::Graph, format!("episode:{}", episode.id), err);
            }
        }
    }
}

fn episode_item(text: &str) -> String {
    let preview: String = text.chars().take(40).collect();
    format!("episode:{preview}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractedEpisode;
    use crate::testing::{FailingGraphStore, ScriptedGateway, SqliteHandles};
    use trimem_core::types::{Entity, EntityType, Fact, Predicate, Triple};

    fn sample_extraction(owner_id: &str, observed_at: DateTime<Utc>) -> Extraction {
        Extraction {
            facts: vec![
                Fact::new(owner_id, "match_formula", "100% of first 3%", 0.92)
                    .with_source(EXTRACTION_SOURCE)
                    .with_observed_at(observed_at),
            ],
            episodes: vec![ExtractedEpisode {
                text: "Our 401k match is 100% of first 3%".into(),
                importance: 0.8,
                tags: ["benefits".to_string()].into(),
            }],
            entities: vec![
                Entity::new("401k", EntityType::Plan),
                Entity::new("100% of first 3%", EntityType::Formula),
            ],
            triples: vec![Triple {
                subject: EntityRef::typed("401k", EntityType::Plan),
                predicate: Predicate::HasFormula,
                object: EntityRef::typed("100% of first 3%", EntityType::Formula),
                confidence: 0.9,
                properties: Map::new(),
            }],
            diagnostics: Default::default(),
        }
    }

    fn coordinator(handles: &SqliteHandles, gateway: Arc<ScriptedGateway>) -> WriteCoordinator {
        let stores = handles.store_set();
        WriteCoordinator::new(stores.facts, stores.episodes, stores.graph, gateway, 0.6)
    }

    #[tokio::test]
    async fn test_persist_writes_all_stores() {
        let handles = SqliteHandles::in_memory();
        let writer = coordinator(&handles, Arc::new(ScriptedGateway::new()));
        let now = Utc::now();

        let report = writer
            .persist("acme", &sample_extraction("acme", now), &WriteContext::new("slack", now))
            .await;

        assert!(report.is_complete(), "failures: {:?}", report.failures);
        assert_eq!(report.facts_written, 1);
        assert_eq!(report.episodes_written, 1);
        assert_eq!(report.entities_written, 2);
        assert_eq!(report.triples_written, 1);

        let episode = handles
            .episodes
            .find(&report.episode_ids[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(episode.fact_keys, vec!["match_formula".to_string()]);
        assert_eq!(episode.entities.len(), 2);
        assert_eq!(episode.channel, "slack");
        assert_eq!(episode.content_hash, content_hash(&episode.text));
        assert!(!episode.embedding.is_empty());

        let hops = handles.graph.shortest_path_length("acme", "401k").await.unwrap();
        assert_eq!(hops, Some(2));
    }

    #[tokio::test]
    async fn test_facts_idempotent_episodes_not() {
        let handles = SqliteHandles::in_memory();
        let writer = coordinator(&handles, Arc::new(ScriptedGateway::new()));
        let now = Utc::now();
        let extraction = sample_extraction("acme", now);
        let context = WriteContext::new("slack", now);

        writer.persist("acme", &extraction, &context).await;
        writer.persist("acme", &extraction, &context).await;

        assert_eq!(handles.facts.count_rows("acme").unwrap(), 1);
        assert_eq!(handles.episodes.count_rows("acme").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_backfilled_triples_keep_their_observed_at() {
        let handles = SqliteHandles::in_memory();
        let writer = coordinator(&handles, Arc::new(ScriptedGateway::new()));
        let now = Utc::now();
        let backfilled = now - chrono::Duration::days(60);

        let report = writer
            .persist(
                "acme",
                &sample_extraction("acme", backfilled),
                &WriteContext::new("email", backfilled),
            )
            .await;
        assert!(report.is_complete(), "failures: {:?}", report.failures);

        handles
            .graph
            .upsert_episode_node("acme", "fresh", now, &[EntityRef::typed("401k", EntityType::Plan)])
            .await
            .unwrap();

        let recent = handles.graph.subgraph("acme", Some(30)).await.unwrap();
        assert!(recent.iter().any(|n| n.label == "401k"));
        assert!(!recent.iter().any(|n| n.label == "100% of first 3%"));

        let all = handles.graph.subgraph("acme", None).await.unwrap();
        assert!(all.iter().any(|n| n.label == "100% of first 3%"));
    }

    #[tokio::test]
    async fn test_graph_outage_is_partial() {
        let handles = SqliteHandles::in_memory();
        let writer = WriteCoordinator::new(
            handles.facts.clone(),
            handles.episodes.clone(),
            Arc::new(FailingGraphStore),
            Arc::new(ScriptedGateway::new()),
            0.6,
        );
        let now = Utc::now();

        let report = writer
            .persist("acme", &sample_extraction("acme", now), &WriteContext::new("email", now))
            .await;

        assert!(report.is_partial());
        assert_eq!(report.facts_written, 1);
        assert_eq!(report.episodes_written, 1);
        assert_eq!(report.entities_written, 0);
        assert_eq!(report.triples_written, 0);
        // owner + fact node + 2 entities + triple + episode node
        assert_eq!(report.failures_for(StoreKind::Graph).count(), 6);
        assert_eq!(report.failures_for(StoreKind::Fact).count(), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_skips_episodes_only() {
        let handles = SqliteHandles::in_memory();
        let writer = coordinator(&handles, Arc::new(ScriptedGateway::new().failing_embeddings()));
        let now = Utc::now();

        let report = writer
            .persist("acme", &sample_extraction("acme", now), &WriteContext::new("chat", now))
            .await;

        assert_eq!(report.facts_written, 1);
        assert_eq!(report.episodes_written, 0);
        let failure = report.failures_for(StoreKind::Episode).next().unwrap();
        assert!(failure.error.contains("embedding failed"));
        assert_eq!(handles.episodes.count_rows("acme").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_low_confidence_fact_rejected_at_boundary() {
        let handles = SqliteHandles::in_memory();
        let writer = coordinator(&handles, Arc::new(ScriptedGateway::new()));
        let now = Utc::now();
        let mut extraction = sample_extraction("acme", now);
        extraction.facts[0].confidence = 0.3;

        let report = writer
            .persist("acme", &extraction, &WriteContext::new("chat", now))
            .await;

        assert_eq!(report.facts_written, 0);
        assert_eq!(report.failures_for(StoreKind::Fact).count(), 1);
        assert_eq!(handles.facts.count_rows("acme").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_extraction_writes_nothing() {
        let handles = SqliteHandles::in_memory();
        let writer = coordinator(&handles, Arc::new(ScriptedGateway::new()));

        let report = writer
            .persist("acme", &Extraction::default(), &WriteContext::new("chat", Utc::now()))
            .await;

        assert_eq!(report.total_written(), 0);
        assert!(report.is_complete());
        assert!(handles.graph.subgraph("acme", None).await.unwrap().is_empty());
    }
}
