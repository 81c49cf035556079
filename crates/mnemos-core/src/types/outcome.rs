use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::NodeType;

/// The kind of query that produced a retrieval outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Computational,
    Retrieval,
    Analytical,
    Transformational,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::Computational => "computational",
            QueryType::Retrieval => "retrieval",
            QueryType::Analytical => "analytical",
            QueryType::Transformational => "transformational",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed (query, retrieved node, used-or-not) event, the raw
/// material the pattern detector mines for structural mis-fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub query_hash: String,
    pub query_type: QueryType,
    pub node_id: String,
    pub node_type: NodeType,
    pub node_subtype: Option<String>,
    pub relevance_score: f64,
    pub was_used: bool,
    pub context_tokens: u64,
    pub latency_ms: u64,
}

/// Filter accepted by `OutcomeStore::list` / `OutcomeStore::aggregate`.
#[derive(Debug, Clone, Default)]
pub struct OutcomeFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Grouped aggregate row (by node type, or by query type).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupedAggregate {
    pub key: String,
    pub total: u64,
    pub mean_relevance: f64,
    pub hit_rate: f64,
    pub mean_latency_ms: f64,
}

/// Aggregate endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeAggregate {
    pub total: u64,
    pub mean_relevance: f64,
    pub hit_rate: f64,
    pub mean_latency_ms: f64,
    pub by_node_type: Vec<GroupedAggregate>,
    pub by_query_type: Vec<GroupedAggregate>,
}
