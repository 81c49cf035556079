use serde::{Deserialize, Serialize};

/// Per-pattern confidence floors below which a detected pattern is dropped
/// rather than turned into a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceFloors {
    pub node_type_mismatch: f64,
    pub missing_subtype: f64,
    pub retrieval_mismatch: f64,
    pub high_decay_on_useful: f64,
    pub low_retrieval_hit_rate: f64,
}

impl Default for ConfidenceFloors {
    fn default() -> Self {
        Self {
            node_type_mismatch: 0.7,
            missing_subtype: 0.8,
            retrieval_mismatch: 0.6,
            high_decay_on_useful: 0.75,
            low_retrieval_hit_rate: 0.7,
        }
    }
}

/// Configuration for the proposal generator + meta-evolution manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfig {
    pub confidence_floors: ConfidenceFloors,
    /// A new analysis run is skipped once this many proposals are pending.
    pub max_pending_proposals: u64,
    pub auto_apply_low_risk: bool,
    pub auto_apply_confidence_threshold: f64,
    /// A pending proposal older than this (days) is auto-rejected as expired.
    pub proposal_expiry_days: i64,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            confidence_floors: ConfidenceFloors::default(),
            max_pending_proposals: 10,
            auto_apply_low_risk: false,
            auto_apply_confidence_threshold: 0.9,
            proposal_expiry_days: 7,
        }
    }
}
