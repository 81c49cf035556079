use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::NodeType;
use super::outcome::QueryType;

/// A structural mis-fit detected from retrieval-outcome history. Transient —
/// never persisted on its own, only as the seed of a `Proposal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "pattern_type")]
pub enum Pattern {
    NodeTypeMismatch(NodeTypeMismatch),
    MissingSubtype(MissingSubtype),
    RetrievalMismatch(RetrievalMismatch),
    HighDecayOnUseful(HighDecayOnUseful),
    LowRetrievalHitRate(LowRetrievalHitRate),
}

impl Pattern {
    pub fn confidence(&self) -> f64 {
        match self {
            Pattern::NodeTypeMismatch(p) => p.confidence,
            Pattern::MissingSubtype(p) => p.confidence,
            Pattern::RetrievalMismatch(p) => p.confidence,
            Pattern::HighDecayOnUseful(p) => p.confidence,
            Pattern::LowRetrievalHitRate(p) => p.confidence,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Pattern::NodeTypeMismatch(p) => &p.description,
            Pattern::MissingSubtype(p) => &p.description,
            Pattern::RetrievalMismatch(p) => &p.description,
            Pattern::HighDecayOnUseful(p) => &p.description,
            Pattern::LowRetrievalHitRate(p) => &p.description,
        }
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        match self {
            Pattern::NodeTypeMismatch(p) => p.detected_at,
            Pattern::MissingSubtype(p) => p.detected_at,
            Pattern::RetrievalMismatch(p) => p.detected_at,
            Pattern::HighDecayOnUseful(p) => p.detected_at,
            Pattern::LowRetrievalHitRate(p) => p.detected_at,
        }
    }

    /// Short tag used for duplicate-proposal screening and display.
    pub fn kind(&self) -> &'static str {
        match self {
            Pattern::NodeTypeMismatch(_) => "node_type_mismatch",
            Pattern::MissingSubtype(_) => "missing_subtype",
            Pattern::RetrievalMismatch(_) => "retrieval_mismatch",
            Pattern::HighDecayOnUseful(_) => "high_decay_on_useful",
            Pattern::LowRetrievalHitRate(_) => "low_retrieval_hit_rate",
        }
    }
}

/// A node type is consistently under-used for a given query type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTypeMismatch {
    pub current_type: NodeType,
    pub query_type: QueryType,
    pub sample_node_ids: Vec<String>,
    pub occurrences: u64,
    pub avg_relevance: f64,
    pub suggested_type: String,
    pub confidence: f64,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

/// A query type's overall hit rate, within its own group, is too low.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMismatch {
    pub query_type: QueryType,
    pub hit_rate: f64,
    pub false_positive_rate: f64,
    pub avg_relevance: f64,
    pub avg_latency_ms: f64,
    pub suggested_change: String,
    pub confidence: f64,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

/// A tight, cohesive cluster of same-typed nodes that likely deserves its own subtype.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingSubtype {
    pub node_type: NodeType,
    pub size: u64,
    pub cohesion: f64,
    /// Hard-coded placeholder — no real clustering library is wired in.
    pub separation: f64,
    pub sample_node_ids: Vec<String>,
    pub common_terms: Vec<String>,
    pub suggested_name: String,
    pub confidence: f64,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

/// Reserved for forward compatibility: requires per-node decay history the
/// store does not yet expose, so the detector that would produce this
/// always returns empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighDecayOnUseful {
    pub node_type: NodeType,
    pub sample_node_ids: Vec<String>,
    pub confidence: f64,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

/// Global (not grouped by query type) hit-rate check: catches a system-wide
/// retrieval quality problem that no single query-type group's sample size
/// was large enough to surface on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowRetrievalHitRate {
    pub hit_rate: f64,
    pub sample_size: u64,
    pub confidence: f64,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}
