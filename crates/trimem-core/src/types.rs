//! Shared types for trimem-core.
//!
//! These types are used by the store contracts, the SQLite adapters and the
//! engine SDK.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Store Identification
// ─────────────────────────────────────────────────────────────────────────────

/// The three independent stores memory fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Fact,
    Episode,
    Graph,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Fact => "fact",
            StoreKind::Episode => "episode",
            StoreKind::Graph => "graph",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Units
// ─────────────────────────────────────────────────────────────────────────────

/// A confidence-scored key/value memory, unique per `(owner_id, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub owner_id: String,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub source: String,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub redacted: bool,
}

impl Fact {
    pub fn new(
        owner_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            key: key.into(),
            value: value.into(),
            confidence,
            source: String::new(),
            observed_at: Utc::now(),
            redacted: false,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }
}

/// A free-text memory stored with its embedding.
///
/// `fact_keys` and `entities` record what the same extraction produced, so
/// the episode can be resolved against the Fact and Graph stores later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub owner_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    pub importance: f64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub channel: String,
    pub thread_id: Option<String>,
    pub content_hash: String,
    #[serde(default)]
    pub fact_keys: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub redacted: bool,
}

impl Episode {
    /// Generate a fresh episode id.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// An episode returned by a similarity query, with its cosine distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeMatch {
    pub episode: Episode,
    pub distance: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge Graph
// ─────────────────────────────────────────────────────────────────────────────

/// Closed set of entity types accepted into the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Person,
    Place,
    DateRange,
    Preference,
    Task,
    Product,
    Org,
    Event,
    Policy,
    Process,
    Formula,
    Rate,
    Date,
    Plan,
}

impl EntityType {
    pub const ALL: [EntityType; 14] = [
        EntityType::Person,
        EntityType::Place,
        EntityType::DateRange,
        EntityType::Preference,
        EntityType::Task,
        EntityType::Product,
        EntityType::Org,
        EntityType::Event,
        EntityType::Policy,
        EntityType::Process,
        EntityType::Formula,
        EntityType::Rate,
        EntityType::Date,
        EntityType::Plan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "Person",
            EntityType::Place => "Place",
            EntityType::DateRange => "DateRange",
            EntityType::Preference => "Preference",
            EntityType::Task => "Task",
            EntityType::Product => "Product",
            EntityType::Org => "Org",
            EntityType::Event => "Event",
            EntityType::Policy => "Policy",
            EntityType::Process => "Process",
            EntityType::Formula => "Formula",
            EntityType::Rate => "Rate",
            EntityType::Date => "Date",
            EntityType::Plan => "Plan",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    /// Exact match only; unknown spellings are rejected rather than coerced.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown entity type: {}", s))
    }
}

/// Closed set of relationship predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Predicate {
    Prefers,
    Plans,
    OccursOn,
    HasSize,
    HasRole,
    Mentions,
    RelatedTo,
    HasFormula,
    HasRate,
    ScheduledFor,
    AppliesTo,
}

impl Predicate {
    pub const ALL: [Predicate; 11] = [
        Predicate::Prefers,
        Predicate::Plans,
        Predicate::OccursOn,
        Predicate::HasSize,
        Predicate::HasRole,
        Predicate::Mentions,
        Predicate::RelatedTo,
        Predicate::HasFormula,
        Predicate::HasRate,
        Predicate::ScheduledFor,
        Predicate::AppliesTo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Predicate::Prefers => "PREFERS",
            Predicate::Plans => "PLANS",
            Predicate::OccursOn => "OCCURS_ON",
            Predicate::HasSize => "HAS_SIZE",
            Predicate::HasRole => "HAS_ROLE",
            Predicate::Mentions => "MENTIONS",
            Predicate::RelatedTo => "RELATED_TO",
            Predicate::HasFormula => "HAS_FORMULA",
            Predicate::HasRate => "HAS_RATE",
            Predicate::ScheduledFor => "SCHEDULED_FOR",
            Predicate::AppliesTo => "APPLIES_TO",
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Predicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Predicate::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown predicate: {}", s))
    }
}

/// A typed entity. Identity is `(name, entity_type)` and is global, not
/// scoped to an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            name: name.into(),
            entity_type,
            aliases: BTreeSet::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }
}

/// Reference to an entity from a triple endpoint.
///
/// When the type is unknown the graph resolves the name against existing
/// entities and falls back to an untyped node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    pub entity_type: Option<EntityType>,
}

impl EntityRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: None,
        }
    }

    pub fn typed(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            name: name.into(),
            entity_type: Some(entity_type),
        }
    }
}

/// A relationship edge, unique per `(subject, predicate, object)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: EntityRef,
    pub predicate: Predicate,
    pub object: EntityRef,
    pub confidence: f64,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph Projection
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Owner,
    Fact,
    Episode,
    Entity,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Owner => "owner",
            NodeKind::Fact => "fact",
            NodeKind::Episode => "episode",
            NodeKind::Entity => "entity",
        }
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(NodeKind::Owner),
            "fact" => Ok(NodeKind::Fact),
            "episode" => Ok(NodeKind::Episode),
            "entity" => Ok(NodeKind::Entity),
            other => Err(format!("unknown node kind: {}", other)),
        }
    }
}

/// Deterministic graph node ids shared by writers and readers.
pub mod node_id {
    use super::EntityType;

    pub fn owner(owner_id: &str) -> String {
        format!("owner:{}", owner_id)
    }

    pub fn fact(owner_id: &str, key: &str) -> String {
        format!("fact:{}:{}", owner_id, key)
    }

    pub fn episode(episode_id: &str) -> String {
        format!("episode:{}", episode_id)
    }

    pub fn entity(name: &str, entity_type: Option<EntityType>) -> String {
        match entity_type {
            Some(t) => format!("entity:{}:{}", t, name),
            None => format!("entity:_:{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    /// Owner id, fact key, episode id or entity name.
    pub label: String,
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: String,
    pub target_id: String,
    /// `HAS_FACT`, `HAS_EPISODE`, `MENTIONS` or a triple predicate.
    pub label: String,
}

/// A path through the graph, starting at the owner node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphPath {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn target(&self) -> Option<&GraphNode> {
        self.nodes.last()
    }

    /// Render as `owner:acme -HAS_EPISODE-> episode:… -MENTIONS-> ACME (Org)`.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                let label = self.edges.get(i - 1).map(|e| e.label.as_str()).unwrap_or("?");
                out.push_str(&format!(" -{}-> ", label));
            }
            match (node.kind, node.entity_type) {
                (NodeKind::Entity, Some(t)) => out.push_str(&format!("{} ({})", node.label, t)),
                (kind, _) => out.push_str(&format!("{}:{}", kind.as_str(), node.label)),
            }
        }
        out
    }
}
