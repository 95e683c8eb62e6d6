//! Episode relevance scoring.
//!
//! ```text
//! score = w_sim · clamp(cos, 0, 1)
//!       + w_rec · exp(-days / half_life)
//!       + w_imp · importance
//!       + w_graph · proximity
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ScoringWeights;

/// Components of one episode's fused score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub similarity: f64,
    pub recency: f64,
    pub importance: f64,
    pub graph_proximity: f64,
    pub total: f64,
}

/// Cosine similarity clamped to [0, 1]; NaN counts as 0
pub fn clamp_similarity(cosine: f64) -> f64 {
    if cosine.is_nan() { 0.0 } else { cosine.clamp(0.0, 1.0) }
}

/// Exponential decay of age in days; negative ages count as fresh
pub fn recency(age_days: f64, half_life_days: f64) -> f64 {
    (-age_days.max(0.0) / half_life_days).exp()
}

/// Proximity from hop count: unreachable 0, the owner itself 1, else 1/(1+n)
pub fn graph_proximity(path_len: Option<u32>) -> f64 {
    match path_len {
        None => 0.0,
        Some(0) => 1.0,
        Some(n) => 1.0 / (1.0 + f64::from(n)),
    }
}

/// Fuse the four components
pub fn fuse(
    weights: &ScoringWeights,
    cosine: f64,
    age_days: f64,
    half_life_days: f64,
    importance: f64,
    proximity: f64,
) -> ScoreBreakdown {
    let similarity = clamp_similarity(cosine);
    let recency = recency(age_days, half_life_days);
    let importance = importance.clamp(0.0, 1.0);
    let graph_proximity = proximity.clamp(0.0, 1.0);

    ScoreBreakdown {
        similarity,
        recency,
        importance,
        graph_proximity,
        total: weights.similarity * similarity
            + weights.recency * recency
            + weights.importance * importance
            + weights.graph * graph_proximity,
    }
}
