use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of structural adaptation a proposal represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    NewSubtype,
    RenameType,
    MergeTypes,
    SplitType,
    RetrievalConfig,
    DecayAdjust,
}

impl ProposalType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalType::NewSubtype => "new_subtype",
            ProposalType::RenameType => "rename_type",
            ProposalType::MergeTypes => "merge_types",
            ProposalType::SplitType => "split_type",
            ProposalType::RetrievalConfig => "retrieval_config",
            ProposalType::DecayAdjust => "decay_adjust",
        }
    }
}

impl std::fmt::Display for ProposalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a durable proposal.
///
/// `Approved` exists for schema completeness (a future two-phase workflow
/// could separate "approved" from "applied") but the current
/// approve-decision path transitions straight from
/// `Pending`/`Deferred` to `Applied` or `Failed` — it never
/// leaves a proposal sitting in `Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
    Deferred,
    Failed,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Applied => "applied",
            ProposalStatus::Deferred => "deferred",
            ProposalStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// 1 (lowest) .. 5 (highest).
pub type Priority = u8;

/// Estimated blast radius and reversibility of applying a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    pub nodes_affected: u64,
    pub edges_affected: u64,
    pub reindex_required: bool,
    /// Human-readable estimate, e.g. "< 1s" or "~5m".
    pub estimated_duration: String,
    pub reversible: bool,
    pub risk_level: RiskLevel,
}

/// A single mutation a proposal carries out when approved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub operation: String,
    pub target: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

impl Change {
    pub const ADD_SUBTYPE: &'static str = "add_subtype";
    pub const UPDATE_CONFIG: &'static str = "update_config";
    pub const TUNE_RETRIEVAL: &'static str = "tune_retrieval";
    pub const ADJUST_DECAY: &'static str = "adjust_decay";

    pub fn string_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }

    pub fn node_ids_param(&self) -> Vec<String> {
        self.parameters
            .get("node_ids")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A durable, user-decidable record proposing a schema or retrieval change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub proposal_type: ProposalType,
    pub title: String,
    pub description: String,
    pub rationale: String,
    pub evidence: Vec<String>,
    pub impact: Impact,
    pub changes: Vec<Change>,
    pub confidence: f64,
    pub priority: Priority,
    pub status: ProposalStatus,
    pub status_note: Option<String>,
    pub source_pattern: String,
    pub defer_until: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    CreatedAt,
    Priority,
    Confidence,
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Filter + sort accepted by `ProposalStore::list`.
#[derive(Debug, Clone)]
pub struct ProposalFilter {
    pub status: Vec<ProposalStatus>,
    pub proposal_type: Vec<ProposalType>,
    pub created_since: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for ProposalFilter {
    fn default() -> Self {
        Self {
            status: Vec::new(),
            proposal_type: Vec::new(),
            created_since: None,
            created_until: None,
            limit: None,
            sort_by: SortBy::CreatedAt,
            sort_order: SortOrder::Desc,
        }
    }
}

impl ProposalFilter {
    pub fn with_status(mut self, status: impl IntoIterator<Item = ProposalStatus>) -> Self {
        self.status = status.into_iter().collect();
        self
    }
}
