use serde::{Deserialize, Serialize};

/// Configuration for the promoter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub min_confidence: f64,
    /// Informational only; promotion is gated by the per-transition
    /// thresholds below, not this value.
    pub min_access_count: u64,
    pub task_to_session_threshold: u64,
    pub session_to_longterm_threshold: u64,
    /// Minimum node age, in minutes, before task → session is considered.
    /// session → longterm uses `2 * min_age_minutes`.
    pub min_age_minutes: i64,
    pub consolidate_on_promotion: bool,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_access_count: 1,
            task_to_session_threshold: 2,
            session_to_longterm_threshold: 5,
            min_age_minutes: 5,
            consolidate_on_promotion: true,
        }
    }
}
