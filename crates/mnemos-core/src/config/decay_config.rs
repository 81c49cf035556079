use serde::{Deserialize, Serialize};

use crate::types::Tier;

/// Configuration for the forgetting-curve decayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Forgetting-curve half-life, in hours.
    pub half_life_hours: f64,
    /// Access-amplification boost factor applied alongside decay,
    /// and the amount `RecordAccess` raises confidence by.
    pub access_boost: f64,
    /// Tiers excluded from decay processing.
    pub exclude_tiers: Vec<Tier>,
    /// Confidence below which a non-archive node becomes eligible for archive.
    pub archive_threshold: f64,
    /// Minimum age, in hours, before a node is eligible for archive.
    pub min_retention_hours: f64,
    /// Confidence below which an archived node is eligible for deletion.
    pub prune_threshold: f64,
    /// Upper bound on nodes processed per pass.
    pub list_cap: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_hours: 7.0 * 24.0,
            access_boost: 0.1,
            exclude_tiers: vec![Tier::Task],
            archive_threshold: 0.3,
            min_retention_hours: 24.0,
            prune_threshold: 0.1,
            list_cap: 10_000,
        }
    }
}
