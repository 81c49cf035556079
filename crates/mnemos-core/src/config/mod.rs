pub mod audit_config;
pub mod consolidation_config;
pub mod decay_config;
pub mod lifecycle_config;
pub mod pattern_config;
pub mod promotion_config;
pub mod proposal_config;

use serde::{Deserialize, Serialize};

pub use audit_config::AuditConfig;
pub use consolidation_config::ConsolidationConfig;
pub use decay_config::DecayConfig;
pub use lifecycle_config::LifecycleConfig;
pub use pattern_config::PatternConfig;
pub use promotion_config::PromotionConfig;
pub use proposal_config::ProposalConfig;

/// Aggregates every subsystem config, mirroring `cortex_core::config::CortexConfig`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EvolutionConfig {
    pub audit: AuditConfig,
    pub decay: DecayConfig,
    pub consolidation: ConsolidationConfig,
    pub promotion: PromotionConfig,
    pub pattern: PatternConfig,
    pub proposal: ProposalConfig,
    pub lifecycle: LifecycleConfig,
}

impl EvolutionConfig {
    /// Load config from a TOML string, falling back to defaults for missing fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}
