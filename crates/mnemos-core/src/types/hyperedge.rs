use serde::{Deserialize, Serialize};

/// Role a node plays within a hyperedge membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberRole(pub String);

impl MemberRole {
    pub const SUBJECT: &'static str = "subject";
    pub const OBJECT: &'static str = "object";

    pub fn subject() -> Self {
        Self(Self::SUBJECT.to_string())
    }

    pub fn object() -> Self {
        Self(Self::OBJECT.to_string())
    }
}

/// One (node, role, position) membership within a hyperedge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub node_id: String,
    pub role: MemberRole,
    pub position: u32,
}

/// A typed, weighted hyperedge over an ordered set of node memberships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperedge {
    pub id: String,
    pub edge_type: String,
    pub label: String,
    /// Clamped to [0, 10] by engines after strengthening.
    pub weight: f64,
    pub members: Vec<Membership>,
}

impl Hyperedge {
    pub const SUMMARIZES: &'static str = "summarizes";
    pub const COMPOSITION: &'static str = "composition";

    pub fn member_node_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.node_id.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct HyperedgeFilter {
    pub limit: Option<usize>,
}

impl HyperedgeFilter {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }
}
