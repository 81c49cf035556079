use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tier::Tier;

/// Free-form audit event type. The common vocabulary
/// (`consolidate`, `merge`, `summarize`, `promote`, `demote`, `decay`,
/// `archive`, `restore`, `prune`, `access`) is the common case, but the
/// meta-evolution manager also emits `meta_analysis`, `proposal_applied`,
/// and `proposal_rejected`, so this stays a string rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEventType(pub String);

impl AuditEventType {
    pub const CONSOLIDATE: &'static str = "consolidate";
    pub const MERGE: &'static str = "merge";
    pub const SUMMARIZE: &'static str = "summarize";
    pub const PROMOTE: &'static str = "promote";
    pub const DEMOTE: &'static str = "demote";
    pub const DECAY: &'static str = "decay";
    pub const ARCHIVE: &'static str = "archive";
    pub const RESTORE: &'static str = "restore";
    pub const PRUNE: &'static str = "prune";
    pub const ACCESS: &'static str = "access";
    pub const META_ANALYSIS: &'static str = "meta_analysis";
    pub const PROPOSAL_APPLIED: &'static str = "proposal_applied";
    pub const PROPOSAL_REJECTED: &'static str = "proposal_rejected";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Maps an audit event type to the evolution-log operation it should be
    /// mirrored as. Returns `None` for events that are
    /// in-memory only (`access`, `demote`, `restore`, and anything unknown).
    pub fn evolution_operation(&self) -> Option<EvolutionOperation> {
        match self.0.as_str() {
            Self::CONSOLIDATE | Self::MERGE | Self::SUMMARIZE => {
                Some(EvolutionOperation::Consolidate)
            }
            Self::PROMOTE => Some(EvolutionOperation::Promote),
            Self::DECAY => Some(EvolutionOperation::Decay),
            Self::ARCHIVE => Some(EvolutionOperation::Archive),
            Self::PRUNE => Some(EvolutionOperation::Prune),
            _ => None,
        }
    }
}

impl From<&str> for AuditEventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The five operations persisted to the external store's evolution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionOperation {
    Consolidate,
    Promote,
    Decay,
    Archive,
    Prune,
}

impl EvolutionOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            EvolutionOperation::Consolidate => "consolidate",
            EvolutionOperation::Promote => "promote",
            EvolutionOperation::Decay => "decay",
            EvolutionOperation::Archive => "archive",
            EvolutionOperation::Prune => "prune",
        }
    }
}

/// Outcome of the operation an audit entry describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub success: bool,
    pub nodes_affected: u64,
    pub error: Option<String>,
}

impl AuditResult {
    pub fn ok(nodes_affected: u64) -> Self {
        Self {
            success: true,
            nodes_affected,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            nodes_affected: 0,
            error: Some(error.into()),
        }
    }
}

/// One structured audit record, as appended to the in-memory ring,
/// optionally mirrored to a JSONL file, and optionally mirrored to the
/// store's evolution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub node_id: Option<String>,
    #[serde(default)]
    pub node_ids: Vec<String>,
    pub source_tier: Option<Tier>,
    pub target_tier: Option<Tier>,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
    pub result: Option<AuditResult>,
    /// Duration of the operation, in milliseconds.
    pub duration_ms: Option<u64>,
}

impl AuditEntry {
    pub fn new(event_type: impl Into<AuditEventType>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: event_type.into(),
            node_id: None,
            node_ids: Vec::new(),
            source_tier: None,
            target_tier: None,
            details: serde_json::Map::new(),
            result: None,
            duration_ms: None,
        }
    }

    /// Does this entry reference the given node, either directly or via
    /// membership in `node_ids`?
    pub fn mentions_node(&self, id: &str) -> bool {
        self.node_id.as_deref() == Some(id) || self.node_ids.iter().any(|n| n == id)
    }
}

/// Aggregate statistics over a slice of audit entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub successes: u64,
    pub errors: u64,
    pub average_duration_ms: f64,
}

/// One row of the store's durable evolution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: EvolutionOperation,
    pub node_ids: Vec<String>,
    pub from_tier: Option<Tier>,
    pub to_tier: Option<Tier>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Default)]
pub struct EvolutionLogFilter {
    pub limit: Option<usize>,
}
