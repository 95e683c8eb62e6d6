//! Extraction
//!
//! Turns free text into candidate facts, episodes, entities and triples.
//! Two independent model calls run concurrently: one for facts/episodes and
//! one for entities/triples. A failed or malformed reply contributes nothing
//! and the other half is kept.
//!
//! Every candidate passes a validation gate before it leaves this module:
//! - confidence or importance must lie in [0, 1] and reach the threshold
//! - keys, names and texts must be non-blank
//! - entity types and predicates must belong to the closed sets

mod payload;

pub use payload::ParseOutcome;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use trimem_core::LanguageModelGateway;
use trimem_core::types::{Entity, EntityRef, EntityType, Fact, Predicate, Triple};

use payload::{
    EntitiesTriplesPayload, FactsEpisodesPayload, RawEntity, RawEpisode, RawFact, RawTriple,
    parse_payload, value_to_text,
};

/// Source tag stamped on extracted facts
pub const EXTRACTION_SOURCE: &str = "extraction";

pub(crate) const FACTS_SYSTEM_PROMPT: &str = "\
You extract durable memory from workplace text. Reply with one JSON object and nothing else:
{\"facts\": [{\"key\": string, \"value\": string, \"confidence\": number}],
 \"episodes\": [{\"text\": string, \"importance\": number, \"tags\": [string]}]}
Facts are stable key/value statements about the owner, with snake_case keys.
Episodes are short self-contained summaries of notable events.
Confidence and importance are numbers between 0 and 1. Use empty arrays when nothing qualifies.";

pub(crate) const GRAPH_SYSTEM_PROMPT: &str = "\
You extract a knowledge graph from workplace text. Reply with one JSON object and nothing else:
{\"entities\": [{\"name\": string, \"type\": string, \"aliases\": [string]}],
 \"triples\": [{\"subject\": string, \"predicate\": string, \"object\": string, \"confidence\": number}]}
Entity types: Person, Place, Org, Event, Task, Product, Policy, Process, Plan, Formula, Rate, Date, DateRange, Preference.
Predicates: PREFERS, PLANS, OCCURS_ON, HAS_SIZE, HAS_ROLE, MENTIONS, RELATED_TO, HAS_FORMULA, HAS_RATE, SCHEDULED_FOR, APPLIES_TO.
Confidence is a number between 0 and 1. Use empty arrays when nothing qualifies.";

/// A validated episode candidate, not yet embedded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEpisode {
    pub text: String,
    pub importance: f64,
    pub tags: BTreeSet<String>,
}

/// Counters describing what extraction discarded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionDiagnostics {
    pub gateway_failures: usize,
    pub malformed_payloads: usize,
    pub dropped_low_confidence: usize,
    pub dropped_invalid: usize,
    pub dropped_unknown_type: usize,
    pub dropped_unknown_predicate: usize,
}

impl ExtractionDiagnostics {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }

    pub fn dropped(&self) -> usize {
        self.dropped_low_confidence
            + self.dropped_invalid
            + self.dropped_unknown_type
            + self.dropped_unknown_predicate
    }
}

/// Validated output of one extraction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub facts: Vec<Fact>,
    pub episodes: Vec<ExtractedEpisode>,
    pub entities: Vec<Entity>,
    pub triples: Vec<Triple>,
    pub diagnostics: ExtractionDiagnostics,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
            && self.episodes.is_empty()
            && self.entities.is_empty()
            && self.triples.is_empty()
    }

    /// Keys of the extracted facts, in extraction order
    pub fn fact_keys(&self) -> Vec<String> {
        self.facts.iter().map(|f| f.key.clone()).collect()
    }
}

/// Runs the two extraction prompts and validates their replies
pub struct Extractor {
    gateway: Arc<dyn LanguageModelGateway>,
    threshold: f64,
    temperature: f32,
}

impl Extractor {
    pub fn new(gateway: Arc<dyn LanguageModelGateway>, threshold: f64, temperature: f32) -> Self {
        Self {
            gateway,
            threshold,
            temperature,
        }
    }

    /// Extract memory candidates from `text`.
    ///
    /// Never fails: gateway and parse problems are counted in
    /// [`ExtractionDiagnostics`].
    pub async fn extract(
        &self,
        owner_id: &str,
        text: &str,
        channel: &str,
        observed_at: DateTime<Utc>,
    ) -> Extraction {
        let user_prompt = format!(
            "Owner: {owner_id}\nChannel: {channel}\nObserved at: {}\n\nText:\n{text}",
            observed_at.to_rfc3339()
        );

        let (facts_reply, graph_reply) = tokio::join!(
            self.gateway
                .complete(FACTS_SYSTEM_PROMPT, &user_prompt, self.temperature),
            self.gateway
                .complete(GRAPH_SYSTEM_PROMPT, &user_prompt, self.temperature),
        );

        let mut gate = Gate {
            threshold: self.threshold,
            diagnostics: ExtractionDiagnostics::default(),
        };
        let mut extraction = Extraction::default();

        match facts_reply {
            Ok(reply) => match parse_payload::<FactsEpisodesPayload>(&reply) {
                ParseOutcome::Parsed(payload) => {
                    extraction.facts = gate.facts(owner_id, observed_at, payload.facts);
                    extraction.episodes = gate.episodes(payload.episodes);
                }
                ParseOutcome::Malformed(reason) => {
                    warn!(owner_id, reason = %reason, "Malformed facts/episodes reply");
                    gate.diagnostics.malformed_payloads += 1;
                }
            },
            Err(err) => {
                warn!(owner_id, error = %err, "Facts/episodes extraction failed");
                gate.diagnostics.gateway_failures += 1;
            }
        }

        match graph_reply {
            Ok(reply) => match parse_payload::<EntitiesTriplesPayload>(&reply) {
                ParseOutcome::Parsed(payload) => {
                    extraction.entities = gate.entities(payload.entities);
                    extraction.triples = gate.triples(payload.triples, &extraction.entities);
                }
                ParseOutcome::Malformed(reason) => {
                    warn!(owner_id, reason = %reason, "Malformed entities/triples reply");
                    gate.diagnostics.malformed_payloads += 1;
                }
            },
            Err(err) => {
                warn!(owner_id, error = %err, "Entities/triples extraction failed");
                gate.diagnostics.gateway_failures += 1;
            }
        }

        extraction.diagnostics = gate.diagnostics;
        debug!(
            owner_id,
            facts = extraction.facts.len(),
            episodes = extraction.episodes.len(),
            entities = extraction.entities.len(),
            triples = extraction.triples.len(),
            dropped = extraction.diagnostics.dropped(),
            "Extraction complete"
        );
        extraction
    }
}

/// Validation gate applied to raw candidates
struct Gate {
    threshold: f64,
    diagnostics: ExtractionDiagnostics,
}

impl Gate {
    /// Check a score, counting the reason when it is rejected.
    fn admit(&mut self, score: f64) -> bool {
        if !(0.0..=1.0).contains(&score) {
            self.diagnostics.dropped_invalid += 1;
            return false;
        }
        if score < self.threshold {
            self.diagnostics.dropped_low_confidence += 1;
            return false;
        }
        true
    }

    fn facts(&mut self, owner_id: &str, observed_at: DateTime<Utc>, raw: Vec<RawFact>) -> Vec<Fact> {
        let mut facts: Vec<Fact> = Vec::new();
        for candidate in raw {
            let key = candidate.key.trim();
            let value = value_to_text(&candidate.value).filter(|v| !v.is_empty());
            let Some(value) = value.filter(|_| !key.is_empty()) else {
                self.diagnostics.dropped_invalid += 1;
                continue;
            };
            if !self.admit(candidate.confidence) {
                continue;
            }

            let fact = Fact::new(owner_id, key, value, candidate.confidence)
                .with_source(EXTRACTION_SOURCE)
                .with_observed_at(observed_at);

            // A repeated key within one reply keeps the later value
            match facts.iter_mut().find(|f| f.key == fact.key) {
                Some(existing) => *existing = fact,
                None => facts.push(fact),
            }
        }
        facts
    }

    fn episodes(&mut self, raw: Vec<RawEpisode>) -> Vec<ExtractedEpisode> {
        let mut episodes = Vec::new();
        for candidate in raw {
            let text = candidate.text.trim();
            if text.is_empty() {
                self.diagnostics.dropped_invalid += 1;
                continue;
            }
            if !self.admit(candidate.importance) {
                continue;
            }
            let tags = candidate
                .tags
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            episodes.push(ExtractedEpisode {
                text: text.to_string(),
                importance: candidate.importance,
                tags,
            });
        }
        episodes
    }

    fn entities(&mut self, raw: Vec<RawEntity>) -> Vec<Entity> {
        let mut entities: Vec<Entity> = Vec::new();
        for candidate in raw {
            let name = candidate.name.trim();
            if name.is_empty() {
                self.diagnostics.dropped_invalid += 1;
                continue;
            }
            let Ok(entity_type) = candidate.entity_type.parse::<EntityType>() else {
                debug!(entity = name, entity_type = %candidate.entity_type, "Dropping entity of unknown type");
                self.diagnostics.dropped_unknown_type += 1;
                continue;
            };
            if let Some(confidence) = candidate.confidence {
                if !self.admit(confidence) {
                    continue;
                }
            }

            let mut entity = Entity::new(name, entity_type);
            for alias in &candidate.aliases {
                let alias = alias.trim();
                if !alias.is_empty() && alias != name {
                    entity = entity.with_alias(alias);
                }
            }

            match entities
                .iter_mut()
                .find(|e| e.name == entity.name && e.entity_type == entity.entity_type)
            {
                Some(existing) => existing.aliases.extend(entity.aliases),
                None => entities.push(entity),
            }
        }
        entities
    }

    fn triples(&mut self, raw: Vec<RawTriple>, entities: &[Entity]) -> Vec<Triple> {
        let mut triples = Vec::new();
        for candidate in raw {
            let subject_name = candidate.subject.trim();
            let object_name = candidate.object.trim();
            if subject_name.is_empty() || object_name.is_empty() {
                self.diagnostics.dropped_invalid += 1;
                continue;
            }
            let Ok(predicate) = candidate.predicate.parse::<Predicate>() else {
                debug!(predicate = %candidate.predicate, "Dropping triple with unknown predicate");
                self.diagnostics.dropped_unknown_predicate += 1;
                continue;
            };
            let (Some(subject), Some(object)) = (
                endpoint(subject_name, candidate.subject_type.as_deref(), entities),
                endpoint(object_name, candidate.object_type.as_deref(), entities),
            ) else {
                self.diagnostics.dropped_unknown_type += 1;
                continue;
            };
            if !self.admit(candidate.confidence) {
                continue;
            }

            triples.push(Triple {
                subject,
                predicate,
                object,
                confidence: candidate.confidence,
                properties: candidate.properties,
            });
        }
        triples
    }
}

/// Resolve a triple endpoint.
///
/// An explicit type must be valid. Without one, the type of a same-named
/// entity from this extraction is used, else the reference stays untyped.
fn endpoint(name: &str, declared: Option<&str>, entities: &[Entity]) -> Option<EntityRef> {
    match declared.map(str::trim).filter(|t| !t.is_empty()) {
        Some(declared) => declared
            .parse::<EntityType>()
            .ok()
            .map(|t| EntityRef::typed(name, t)),
        None => Some(
            entities
                .iter()
                .find(|e| e.name == name)
                .map(|e| EntityRef::typed(name, e.entity_type))
                .unwrap_or_else(|| EntityRef::named(name)),
        ),
    }
}
