use serde::{Deserialize, Serialize};

/// Configuration for the pattern detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Trailing window of retrieval outcomes considered, in days.
    pub analysis_window_days: i64,
    /// Minimum outcomes (or unique nodes, for `MissingSubtype`) a group
    /// needs before a detector will consider it.
    pub min_sample_size: u64,
    /// `NodeTypeMismatch` average-relevance ceiling.
    pub mismatch_threshold: f64,
    /// `RetrievalMismatch` / `LowRetrievalHitRate` hit-rate floor.
    pub hit_rate_threshold: f64,
    /// A node type needs `2 * min_cluster_size` unique nodes before
    /// `MissingSubtype` will even estimate cohesion for it.
    pub min_cluster_size: u64,
    /// Minimum mean pairwise cosine similarity for a cluster to be "cohesive".
    pub cluster_cohesion_min: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            analysis_window_days: 7,
            min_sample_size: 10,
            mismatch_threshold: 0.4,
            hit_rate_threshold: 0.6,
            min_cluster_size: 5,
            cluster_cohesion_min: 0.7,
        }
    }
}
