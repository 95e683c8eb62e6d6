//! Wire shapes of the two extraction replies.
//!
//! Replies are parsed against fixed shapes. Anything that does not match is
//! reported as [`ParseOutcome::Malformed`] and contributes nothing.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Result of parsing a model reply
#[derive(Debug)]
pub enum ParseOutcome<T> {
    Parsed(T),
    Malformed(String),
}

/// Reply to the facts/episodes prompt
#[derive(Debug, Deserialize)]
pub struct FactsEpisodesPayload {
    pub facts: Vec<RawFact>,
    pub episodes: Vec<RawEpisode>,
}

#[derive(Debug, Deserialize)]
pub struct RawFact {
    pub key: String,
    pub value: Value,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
pub struct RawEpisode {
    #[serde(alias = "summary")]
    pub text: String,
    pub importance: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Reply to the entities/triples prompt
#[derive(Debug, Deserialize)]
pub struct EntitiesTriplesPayload {
    pub entities: Vec<RawEntity>,
    pub triples: Vec<RawTriple>,
}

#[derive(Debug, Deserialize)]
pub struct RawEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RawTriple {
    pub subject: String,
    #[serde(default)]
    pub subject_type: Option<String>,
    pub predicate: String,
    pub object: String,
    #[serde(default)]
    pub object_type: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Parse the outermost JSON object of a reply into `T`.
///
/// Models often wrap JSON in prose or code fences, so everything before the
/// first `{` and after the last `}` is ignored.
pub fn parse_payload<T: DeserializeOwned>(reply: &str) -> ParseOutcome<T> {
    let Some(json) = outermost_object(reply) else {
        return ParseOutcome::Malformed("no JSON object in reply".into());
    };

    match serde_json::from_str(json) {
        Ok(payload) => ParseOutcome::Parsed(payload),
        Err(err) => ParseOutcome::Malformed(err.to_string()),
    }
}

fn outermost_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Render a fact value as text; structured values are rejected.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
