use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tier::Tier;

/// Node type. Left open (`fact`, `entity`, `decision`, `experience`, ...)
/// rather than a closed enum, since the pattern detector and proposal
/// generator both need to mint and compare arbitrary type names (e.g. a
/// `new_subtype` proposal's `suggested_type`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeType(pub String);

impl NodeType {
    pub const FACT: &'static str = "fact";
    pub const ENTITY: &'static str = "entity";
    pub const DECISION: &'static str = "decision";
    pub const EXPERIENCE: &'static str = "experience";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn fact() -> Self {
        Self::new(Self::FACT)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A knowledge-hypergraph node, as consumed (not owned) by this crate.
/// Every field here is read and written by at least one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub node_type: NodeType,
    /// Free string; empty allowed. "summary" is reserved for consolidator output.
    pub subtype: String,
    pub content: String,
    pub tier: Tier,
    /// Clamped to [0, 1] on every write path by the engines, not by this type.
    pub confidence: f64,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
    /// Little-endian packed float32 vector, or empty if no embedding.
    #[serde(default)]
    pub embedding: Vec<u8>,
}

impl Node {
    /// Interpret `embedding` as a sequence of little-endian f32s.
    /// Returns an empty vec for malformed (non-multiple-of-4) blobs.
    pub fn embedding_as_f32(&self) -> Vec<f32> {
        if self.embedding.is_empty() || self.embedding.len() % 4 != 0 {
            return Vec::new();
        }
        self.embedding
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// Filter accepted by `Store::list_nodes` / `Store::count_nodes`.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub types: Vec<NodeType>,
    pub subtypes: Vec<String>,
    pub tiers: Vec<Tier>,
    pub limit: Option<usize>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tiers(mut self, tiers: impl IntoIterator<Item = Tier>) -> Self {
        self.tiers = tiers.into_iter().collect();
        self
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = NodeType>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
