use serde::{Deserialize, Serialize};

/// Configuration for the consolidator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// A tier with fewer nodes than this is left untouched.
    pub min_nodes: usize,
    /// Summary content is truncated to this many characters.
    pub max_summary_length: usize,
    /// Emit "summarizes" composition edges linking summary → sources.
    pub preserve_source_links: bool,
    /// Upper bound on hyperedges scanned per strengthening pass.
    pub edge_list_cap: usize,
    /// Multiplier applied to a hyperedge's weight when more than half its
    /// members sit in the source tier.
    pub edge_strengthen_factor: f64,
    /// Upper bound on nodes scanned per source-tier pass.
    pub node_list_cap: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            min_nodes: 3,
            max_summary_length: 1000,
            preserve_source_links: true,
            edge_list_cap: 500,
            edge_strengthen_factor: 1.1,
            node_list_cap: 10_000,
        }
    }
}
