//! Context card synthesis
//!
//! Condenses the top facts, episodes and graph paths into a short card for a
//! downstream prompt. The model is asked first; if it fails or returns
//! nothing, a deterministic card is built from the same evidence.

use std::sync::Arc;

use tracing::warn;
use trimem_core::LanguageModelGateway;
use trimem_core::types::{Episode, Fact, GraphPath};

use crate::config::ContextCardConfig;

/// Card returned when there is no evidence at all
pub const NO_MEMORY_CARD: &str = "No prior memory found for this owner.";

/// Reply returned when the summary window holds no episodes
pub const NO_RECENT_MEMORY: &str = "No recent memories found.";

const CARD_SYSTEM_PROMPT: &str = "\
You write a brief context card for an assistant. Using only the evidence given, \
state what is known that bears on the query. Be factual and concise. No preamble.";

const SUMMARY_SYSTEM_PROMPT: &str = "\
Summarize the following memories as 3 to 5 short bullet points, one per line, \
each starting with \"- \". Use only the given memories.";

/// Episodes listed into the recent-memory summary prompt
const SUMMARY_EPISODES: usize = 10;

pub struct ContextSynthesizer {
    gateway: Arc<dyn LanguageModelGateway>,
    config: ContextCardConfig,
}

impl ContextSynthesizer {
    pub fn new(gateway: Arc<dyn LanguageModelGateway>, config: ContextCardConfig) -> Self {
        Self { gateway, config }
    }

    /// Build the context card for `query`.
    pub async fn summarize(
        &self,
        query: &str,
        facts: &[Fact],
        episodes: &[&Episode],
        paths: &[GraphPath],
    ) -> String {
        let facts = &facts[..facts.len().min(self.config.max_facts)];
        let episodes = &episodes[..episodes.len().min(self.config.max_episodes)];
        let paths = &paths[..paths.len().min(self.config.max_paths)];

        if facts.is_empty() && episodes.is_empty() && paths.is_empty() {
            return NO_MEMORY_CARD.to_string();
        }

        let evidence = render_evidence(facts, episodes, paths);
        let user_prompt = format!(
            "Query: {query}\n\nEvidence:\n{evidence}\n\nWrite at most {} words.",
            self.config.max_words
        );

        match self
            .gateway
            .complete(CARD_SYSTEM_PROMPT, &user_prompt, self.config.temperature)
            .await
        {
            Ok(card) if !card.trim().is_empty() => cap_words(card.trim(), self.config.max_words),
            Ok(_) => {
                warn!("Empty context card from model, using fallback");
                cap_words(&fallback_card(facts, episodes, paths), self.config.max_words)
            }
            Err(err) => {
                warn!(error = %err, "Context card synthesis failed, using fallback");
                cap_words(&fallback_card(facts, episodes, paths), self.config.max_words)
            }
        }
    }

    /// Summarize recent episodes as bullet points.
    pub async fn summarize_recent(&self, episodes: &[Episode]) -> String {
        if episodes.is_empty() {
            return NO_RECENT_MEMORY.to_string();
        }

        let listed = &episodes[..episodes.len().min(SUMMARY_EPISODES)];
        let memories = listed
            .iter()
            .map(|e| format!("- [{}] {}", e.observed_at.format("%Y-%m-%d"), e.text))
            .collect::<Vec<_>>()
            .join("\n");

        match self
            .gateway
            .complete(SUMMARY_SYSTEM_PROMPT, &memories, self.config.temperature)
            .await
        {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => fallback_bullets(listed),
            Err(err) => {
                warn!(error = %err, "Recent summary failed, using fallback");
                fallback_bullets(listed)
            }
        }
    }
}

fn render_evidence(facts: &[Fact], episodes: &[&Episode], paths: &[GraphPath]) -> String {
    let mut sections = Vec::new();
    if !facts.is_empty() {
        let lines: Vec<String> = facts
            .iter()
            .map(|f| format!("- {} = {} (confidence {:.2})", f.key, f.value, f.confidence))
            .collect();
        sections.push(format!("Facts:\n{}", lines.join("\n")));
    }
    if !episodes.is_empty() {
        let lines: Vec<String> = episodes
            .iter()
            .map(|e| format!("- [{}] {}", e.observed_at.format("%Y-%m-%d"), e.text))
            .collect();
        sections.push(format!("Episodes:\n{}", lines.join("\n")));
    }
    if !paths.is_empty() {
        let lines: Vec<String> = paths.iter().map(|p| format!("- {}", p.describe())).collect();
        sections.push(format!("Graph:\n{}", lines.join("\n")));
    }
    sections.join("\n\n")
}

/// Deterministic card built from the evidence alone
pub(crate) fn fallback_card(facts: &[Fact], episodes: &[&Episode], paths: &[GraphPath]) -> String {
    let mut parts = Vec::new();
    if !facts.is_empty() {
        let known: Vec<String> = facts.iter().map(|f| format!("{}: {}", f.key, f.value)).collect();
        parts.push(format!("Known facts: {}.", known.join("; ")));
    }
    if !episodes.is_empty() {
        let recent: Vec<&str> = episodes.iter().map(|e| e.text.as_str()).collect();
        parts.push(format!("Relevant episodes: {}.", recent.join(" | ")));
    }
    if !paths.is_empty() {
        let related: Vec<String> = paths.iter().map(GraphPath::describe).collect();
        parts.push(format!("Related: {}.", related.join("; ")));
    }
    parts.join(" ")
}

fn fallback_bullets(episodes: &[Episode]) -> String {
    episodes
        .iter()
        .take(5)
        .map(|e| format!("- {}", e.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to `max_words` whitespace-separated words
pub(crate) fn cap_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    format!("{}…", words[..max_words].join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGateway;
    use chrono::Utc;
    use std::sync::atomic::Ordering;

    fn episode(text: &str) -> Episode {
        Episode {
            id: Episode::new_id(),
            owner_id: "acme".into(),
            text: text.into(),
            embedding: Vec::new(),
            importance: 0.8,
            tags: Default::default(),
            channel: "slack".into(),
            thread_id: None,
            content_hash: String::new(),
            fact_keys: Vec::new(),
            entities: Vec::new(),
            observed_at: Utc::now(),
            redacted: false,
        }
    }

    fn synthesizer(gateway: Arc<ScriptedGateway>) -> ContextSynthesizer {
        ContextSynthesizer::new(gateway, ContextCardConfig::default())
    }

    #[tokio::test]
    async fn test_no_evidence_skips_model() {
        let gateway = Arc::new(ScriptedGateway::new().with_card("should not be used"));
        let card = synthesizer(gateway.clone())
            .summarize("anything", &[], &[], &[])
            .await;

        assert_eq!(card, NO_MEMORY_CARD);
        assert_eq!(gateway.completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_card_is_used() {
        let gateway = Arc::new(ScriptedGateway::new().with_card("  ACME matches 100% of the first 3%.  "));
        let facts = vec![Fact::new("acme", "match_formula", "100% of first 3%", 0.9)];

        let card = synthesizer(gateway).summarize("401k match", &facts, &[], &[]).await;
        assert_eq!(card, "ACME matches 100% of the first 3%.");
    }

    #[tokio::test]
    async fn test_fallback_on_gateway_failure() {
        let gateway = Arc::new(ScriptedGateway::new());
        let facts = vec![Fact::new("acme", "match_formula", "100% of first 3%", 0.9)];
        let kickoff = episode("Benefits kickoff meeting");

        let card = synthesizer(gateway)
            .summarize("401k match", &facts, &[&kickoff], &[])
            .await;

        assert!(card.contains("match_formula: 100% of first 3%"));
        assert!(card.contains("Benefits kickoff meeting"));
    }

    #[tokio::test]
    async fn test_card_respects_limits() {
        let long_reply = "word ".repeat(500);
        let gateway = Arc::new(ScriptedGateway::new().with_card(&long_reply));
        let facts: Vec<Fact> = (0..10)
            .map(|i| Fact::new("acme", format!("key_{i}"), "value", 0.9))
            .collect();

        let card = synthesizer(gateway).summarize("q", &facts, &[], &[]).await;
        assert_eq!(card.split_whitespace().count(), 120);
        assert!(card.ends_with('…'));

        let fallback = synthesizer(Arc::new(ScriptedGateway::new()))
            .summarize("q", &facts, &[], &[])
            .await;
        assert!(fallback.contains("key_4"));
        assert!(!fallback.contains("key_5"));
    }

    #[tokio::test]
    async fn test_summarize_recent() {
        let synth = synthesizer(Arc::new(ScriptedGateway::new()));
        assert_eq!(synth.summarize_recent(&[]).await, NO_RECENT_MEMORY);

        let episodes: Vec<Episode> = (0..7).map(|i| episode(&format!("event {i}"))).collect();
        let bullets = synth.summarize_recent(&episodes).await;
        assert_eq!(bullets.lines().count(), 5);
        assert!(bullets.starts_with("- event 0"));

        let synth = synthesizer(Arc::new(ScriptedGateway::new().with_card("- one\n- two\n- three")));
        assert_eq!(synth.summarize_recent(&episodes).await, "- one\n- two\n- three");
    }

    #[tokio::test]
    async fn test_configured_temperature_reaches_gateway() {
        let gateway = Arc::new(ScriptedGateway::new().with_card("card"));
        let config = ContextCardConfig {
            temperature: 0.7,
            ..Default::default()
        };
        let synth = ContextSynthesizer::new(gateway.clone(), config);
        let facts = vec![Fact::new("acme", "k", "v", 0.9)];

        synth.summarize("q", &facts, &[], &[]).await;
        assert_eq!(gateway.last_temperature(), 0.7);

        let default = synthesizer(gateway.clone());
        default.summarize_recent(&[episode("event")]).await;
        assert_eq!(gateway.last_temperature(), 0.2);
    }

    #[test]
    fn test_cap_words() {
        assert_eq!(cap_words("a b c", 5), "a b c");
        assert_eq!(cap_words("a b c d", 2), "a b…");
    }
}
