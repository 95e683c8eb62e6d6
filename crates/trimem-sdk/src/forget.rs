//! Forgetting
//!
//! Removes memory by fact key, entity name or predicate. The soft variant
//! redacts (rows stay for audit but disappear from every read path); the
//! hard variant deletes. A fact key also removes the episodes written in the
//! same extraction, and the graph nodes mirroring both.
//!
//! Entities are global, so forgetting an entity name affects every owner
//! whose graph reaches it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use trimem_core::store::RemovalCount;
use trimem_core::types::{Predicate, StoreKind};
use trimem_core::{EpisodeStore, FactStore, GraphStore, Removal};

use crate::error::{EngineError, EngineResult};
use crate::utils::validate_owner_id;
use crate::writer::StoreFailure;

/// What to forget
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgetRequest {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub entity_names: Vec<String>,
    #[serde(default)]
    pub predicates: Vec<String>,
}

impl ForgetRequest {
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, name: impl Into<String>) -> Self {
        self.entity_names.push(name.into());
        self
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicates.push(predicate.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.entity_names.is_empty() && self.predicates.is_empty()
    }

    /// Check the request and parse its predicates.
    fn validate(&self) -> EngineResult<Vec<Predicate>> {
        if self.is_empty() {
            return Err(EngineError::validation(
                "nothing to forget: give at least one key, entity name or predicate",
            ));
        }
        if self.keys.iter().any(|k| k.trim().is_empty()) {
            return Err(EngineError::validation("fact keys cannot be empty"));
        }
        if self.entity_names.iter().any(|n| n.trim().is_empty()) {
            return Err(EngineError::validation("entity names cannot be empty"));
        }
        self.predicates
            .iter()
            .map(|p| {
                p.trim()
                    .parse::<Predicate>()
                    .map_err(|_| EngineError::validation(format!("unknown predicate: {p}")))
            })
            .collect()
    }
}

/// Outcome of a forget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetReport {
    pub success: bool,
    pub mode: Removal,
    pub facts_removed: usize,
    pub episodes_removed: usize,
    pub graph_nodes_removed: usize,
    pub graph_edges_removed: usize,
    pub failures: Vec<StoreFailure>,
}

impl ForgetReport {
    fn new(mode: Removal) -> Self {
        Self {
            success: false,
            mode,
            facts_removed: 0,
            episodes_removed: 0,
            graph_nodes_removed: 0,
            graph_edges_removed: 0,
            failures: Vec::new(),
        }
    }

    pub fn total_removed(&self) -> usize {
        self.facts_removed + self.episodes_removed + self.graph_nodes_removed + self.graph_edges_removed
    }

    fn graph(&mut self, count: RemovalCount) {
        self.graph_nodes_removed += count.nodes;
        self.graph_edges_removed += count.edges;
    }

    fn fail(&mut self, store: StoreKind, item: impl Into<String>, error: impl ToString) {
        self.failures.push(StoreFailure {
            store,
            item: item.into(),
            error: error.to_string(),
        });
    }
}

pub struct Forgetter {
    facts: Arc<dyn FactStore>,
    episodes: Arc<dyn EpisodeStore>,
    graph: Arc<dyn GraphStore>,
}

impl Forgetter {
    pub fn new(
        facts: Arc<dyn FactStore>,
        episodes: Arc<dyn EpisodeStore>,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            facts,
            episodes,
            graph,
        }
    }

    /// Forget the requested memory for `owner_id`.
    ///
    /// Fails only on invalid input. Store failures are listed in the report
    /// and clear its `success` flag.
    pub async fn forget(
        &self,
        owner_id: &str,
        request: &ForgetRequest,
        hard_delete: bool,
    ) -> EngineResult<ForgetReport> {
        validate_owner_id(owner_id)?;
        let predicates = request.validate()?;
        let mode = Removal::from_hard_delete(hard_delete);
        let mut report = ForgetReport::new(mode);

        for key in &request.keys {
            let key = key.trim();
            self.forget_key(owner_id, key, mode, &mut report).await;
        }

        for name in &request.entity_names {
            let name = name.trim();
            match self.graph.remove_entity(name, mode).await {
                Ok(count) => report.graph(count),
                Err(err) => report.fail(StoreKind::Graph, format!("entity:{name}"), err),
            }
        }

        for predicate in predicates {
            match self.graph.remove_predicate_edges(owner_id, predicate, mode).await {
                Ok(count) => report.graph(count),
                Err(err) => report.fail(StoreKind::Graph, format!("predicate:{predicate}"), err),
            }
        }

        report.success = report.failures.is_empty();
        info!(
            owner_id,
            mode = ?mode,
            facts = report.facts_removed,
            episodes = report.episodes_removed,
            graph_nodes = report.graph_nodes_removed,
            graph_edges = report.graph_edges_removed,
            failures = report.failures.len(),
            "Forgot memory"
        );
        Ok(report)
    }

    async fn forget_key(&self, owner_id: &str, key: &str, mode: Removal, report: &mut ForgetReport) {
        match self.facts.remove(owner_id, key, mode).await {
            Ok(true) => report.facts_removed += 1,
            Ok(false) => {}
            Err(err) => report.fail(StoreKind::Fact, format!("fact:{key}"), err),
        }

        match self.graph.remove_fact_node(owner_id, key, mode).await {
            Ok(count) => report.graph(count),
            Err(err) => report.fail(StoreKind::Graph, format!("fact:{key}"), err),
        }

        let episode_ids = match self.episodes.ids_for_fact_key(owner_id, key).await {
            Ok(ids) => ids,
            Err(err) => {
                report.fail(StoreKind::Episode, format!("episodes for fact:{key}"), err);
                return;
            }
        };

        for id in episode_ids {
            match self.episodes.remove(&id, mode).await {
                Ok(true) => report.episodes_removed += 1,
                Ok(false) => {}
                Err(err) => report.fail(StoreKind::Episode, format!("episode:{id}"), err),
            }
            match self.graph.remove_episode_node(&id, mode).await {
                Ok(count) => report.graph(count),
                Err(err) => report.fail(StoreKind::Graph, format!("episode:{id}"), err),
            }
        }
    }
}
