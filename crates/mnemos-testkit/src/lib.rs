//! # mnemos-testkit
//!
//! In-memory reference implementations of the `Store`, `ProposalStore`, and
//! `OutcomeStore` contracts, used by every other crate's tests. The real
//! hypergraph store is an external collaborator this repo never
//! implements; this crate stands in for it in every downstream test.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use mnemos_core::cancellation::CancellationToken;
use mnemos_core::errors::EvolutionResult;
use mnemos_core::store::{OutcomeStore, ProposalStore, Store};
use mnemos_core::types::{
    EvolutionLogEntry, EvolutionLogFilter, GroupedAggregate, Hyperedge, HyperedgeFilter,
    Membership, Node, NodeFilter, OutcomeAggregate, OutcomeFilter, Proposal, ProposalFilter,
    RetrievalOutcome, SortBy, SortOrder,
};

/// An in-memory hypergraph store. Cheaply cloneable; all state lives behind
/// an `Arc<RwLock<_>>` so clones share the same graph.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Graph>>,
}

#[derive(Default)]
struct Graph {
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Hyperedge>,
    evolution_log: Vec<EvolutionLogEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test convenience: seed a node directly, bypassing `create_node`.
    pub async fn seed_node(&self, node: Node) {
        self.inner.write().await.nodes.insert(node.id.clone(), node);
    }

    pub async fn seed_hyperedge(&self, edge: Hyperedge) {
        self.inner.write().await.edges.insert(edge.id.clone(), edge);
    }

    pub async fn node_count(&self) -> usize {
        self.inner.read().await.nodes.len()
    }
}

fn matches_node_filter(node: &Node, filter: &NodeFilter) -> bool {
    if !filter.types.is_empty() && !filter.types.contains(&node.node_type) {
        return false;
    }
    if !filter.subtypes.is_empty() && !filter.subtypes.contains(&node.subtype) {
        return false;
    }
    if !filter.tiers.is_empty() && !filter.tiers.contains(&node.tier) {
        return false;
    }
    true
}

impl Store for MemoryStore {
    async fn create_node(&self, node: &Node, _cancel: &CancellationToken) -> EvolutionResult<()> {
        self.inner.write().await.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn get_node(&self, id: &str, _cancel: &CancellationToken) -> EvolutionResult<Option<Node>> {
        Ok(self.inner.read().await.nodes.get(id).cloned())
    }

    async fn update_node(&self, node: &Node, _cancel: &CancellationToken) -> EvolutionResult<()> {
        self.inner.write().await.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn delete_node(&self, id: &str, _cancel: &CancellationToken) -> EvolutionResult<()> {
        let mut graph = self.inner.write().await;
        graph.nodes.remove(id);
        graph.edges.retain(|_, edge| !edge.members.iter().any(|m| m.node_id == id));
        Ok(())
    }

    async fn list_nodes(
        &self,
        filter: &NodeFilter,
        _cancel: &CancellationToken,
    ) -> EvolutionResult<Vec<Node>> {
        let graph = self.inner.read().await;
        let mut nodes: Vec<Node> = graph
            .nodes
            .values()
            .filter(|n| matches_node_filter(n, filter))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = filter.limit {
            nodes.truncate(limit);
        }
        Ok(nodes)
    }

    async fn count_nodes(&self, filter: &NodeFilter, _cancel: &CancellationToken) -> EvolutionResult<u64> {
        let graph = self.inner.read().await;
        Ok(graph
            .nodes
            .values()
            .filter(|n| matches_node_filter(n, filter))
            .count() as u64)
    }

    async fn increment_access(&self, id: &str, _cancel: &CancellationToken) -> EvolutionResult<()> {
        let mut graph = self.inner.write().await;
        if let Some(node) = graph.nodes.get_mut(id) {
            node.access_count += 1;
            node.last_accessed = Some(Utc::now());
        }
        Ok(())
    }

    async fn create_hyperedge(&self, edge: &Hyperedge, _cancel: &CancellationToken) -> EvolutionResult<()> {
        self.inner.write().await.edges.insert(edge.id.clone(), edge.clone());
        Ok(())
    }

    async fn get_hyperedge(
        &self,
        id: &str,
        _cancel: &CancellationToken,
    ) -> EvolutionResult<Option<Hyperedge>> {
        Ok(self.inner.read().await.edges.get(id).cloned())
    }

    async fn update_hyperedge(&self, edge: &Hyperedge, _cancel: &CancellationToken) -> EvolutionResult<()> {
        self.inner.write().await.edges.insert(edge.id.clone(), edge.clone());
        Ok(())
    }

    async fn list_hyperedges(
        &self,
        filter: &HyperedgeFilter,
        _cancel: &CancellationToken,
    ) -> EvolutionResult<Vec<Hyperedge>> {
        let graph = self.inner.read().await;
        let mut edges: Vec<Hyperedge> = graph.edges.values().cloned().collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = filter.limit {
            edges.truncate(limit);
        }
        Ok(edges)
    }

    async fn add_member(
        &self,
        edge_id: &str,
        member: Membership,
        _cancel: &CancellationToken,
    ) -> EvolutionResult<()> {
        let mut graph = self.inner.write().await;
        if let Some(edge) = graph.edges.get_mut(edge_id) {
            edge.members.push(member);
        }
        Ok(())
    }

    async fn get_member_nodes(
        &self,
        edge_id: &str,
        _cancel: &CancellationToken,
    ) -> EvolutionResult<Vec<Node>> {
        let graph = self.inner.read().await;
        let Some(edge) = graph.edges.get(edge_id) else {
            return Ok(Vec::new());
        };
        Ok(edge
            .members
            .iter()
            .filter_map(|m| graph.nodes.get(&m.node_id).cloned())
            .collect())
    }

    async fn record_evolution(
        &self,
        entry: &EvolutionLogEntry,
        _cancel: &CancellationToken,
    ) -> EvolutionResult<()> {
        self.inner.write().await.evolution_log.push(entry.clone());
        Ok(())
    }

    async fn list_evolution_log(
        &self,
        filter: &EvolutionLogFilter,
        _cancel: &CancellationToken,
    ) -> EvolutionResult<Vec<EvolutionLogEntry>> {
        let graph = self.inner.read().await;
        let mut entries = graph.evolution_log.clone();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

/// An in-memory `ProposalStore`, mirroring the shape of the `rusqlite`-backed
/// one in `mnemos-storage` without the SQL.
#[derive(Clone, Default)]
pub struct MemoryProposalStore {
    inner: Arc<RwLock<HashMap<String, Proposal>>>,
}

impl MemoryProposalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProposalStore for MemoryProposalStore {
    async fn save(&self, proposal: &Proposal) -> EvolutionResult<()> {
        self.inner.write().await.insert(proposal.id.clone(), proposal.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> EvolutionResult<Option<Proposal>> {
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn update(&self, proposal: &Proposal) -> EvolutionResult<()> {
        self.inner.write().await.insert(proposal.id.clone(), proposal.clone());
        Ok(())
    }

    async fn list(&self, filter: &ProposalFilter) -> EvolutionResult<Vec<Proposal>> {
        let store = self.inner.read().await;
        let mut proposals: Vec<Proposal> = store
            .values()
            .filter(|p| filter.status.is_empty() || filter.status.contains(&p.status))
            .filter(|p| {
                filter.proposal_type.is_empty() || filter.proposal_type.contains(&p.proposal_type)
            })
            .filter(|p| filter.created_since.map(|s| p.created_at >= s).unwrap_or(true))
            .filter(|p| filter.created_until.map(|u| p.created_at <= u).unwrap_or(true))
            .cloned()
            .collect();

        proposals.sort_by(|a, b| {
            let ord = match filter.sort_by {
                SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
                SortBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortBy::Priority => a.priority.cmp(&b.priority),
                SortBy::Confidence => a
                    .confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal),
            };
            match filter.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        if let Some(limit) = filter.limit {
            proposals.truncate(limit);
        }
        Ok(proposals)
    }

    async fn count_pending(&self) -> EvolutionResult<u64> {
        use mnemos_core::types::ProposalStatus;
        let store = self.inner.read().await;
        Ok(store.values().filter(|p| p.status == ProposalStatus::Pending).count() as u64)
    }
}

/// An in-memory `OutcomeStore`.
#[derive(Clone, Default)]
pub struct MemoryOutcomeStore {
    inner: Arc<RwLock<Vec<RetrievalOutcome>>>,
}

impl MemoryOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn grouped(outcomes: &[&RetrievalOutcome], key: String) -> GroupedAggregate {
    let total = outcomes.len() as u64;
    if total == 0 {
        return GroupedAggregate { key, ..Default::default() };
    }
    let sum_relevance: f64 = outcomes.iter().map(|o| o.relevance_score).sum();
    let used = outcomes.iter().filter(|o| o.was_used).count() as f64;
    let sum_latency: f64 = outcomes.iter().map(|o| o.latency_ms as f64).sum();
    GroupedAggregate {
        key,
        total,
        mean_relevance: sum_relevance / total as f64,
        hit_rate: used / total as f64,
        mean_latency_ms: sum_latency / total as f64,
    }
}

impl OutcomeStore for MemoryOutcomeStore {
    async fn record(&self, outcome: &RetrievalOutcome) -> EvolutionResult<()> {
        self.inner.write().await.push(outcome.clone());
        Ok(())
    }

    async fn list(&self, filter: &OutcomeFilter) -> EvolutionResult<Vec<RetrievalOutcome>> {
        let store = self.inner.read().await;
        let mut outcomes: Vec<RetrievalOutcome> = store
            .iter()
            .filter(|o| filter.since.map(|s| o.timestamp >= s).unwrap_or(true))
            .filter(|o| filter.until.map(|u| o.timestamp <= u).unwrap_or(true))
            .cloned()
            .collect();
        outcomes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            outcomes.truncate(limit);
        }
        Ok(outcomes)
    }

    async fn aggregate(&self, filter: &OutcomeFilter) -> EvolutionResult<OutcomeAggregate> {
        let outcomes = self.list(filter).await?;
        let refs: Vec<&RetrievalOutcome> = outcomes.iter().collect();
        let total = refs.len() as u64;

        let mut by_type: HashMap<String, Vec<&RetrievalOutcome>> = HashMap::new();
        let mut by_query: HashMap<String, Vec<&RetrievalOutcome>> = HashMap::new();
        for o in &refs {
            by_type.entry(o.node_type.as_str().to_string()).or_default().push(o);
            by_query.entry(o.query_type.to_string()).or_default().push(o);
        }

        let overall = grouped(&refs, String::new());

        let mut by_node_type: Vec<GroupedAggregate> =
            by_type.into_iter().map(|(k, v)| grouped(&v, k)).collect();
        by_node_type.sort_by(|a, b| a.key.cmp(&b.key));

        let mut by_query_type: Vec<GroupedAggregate> =
            by_query.into_iter().map(|(k, v)| grouped(&v, k)).collect();
        by_query_type.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(OutcomeAggregate {
            total,
            mean_relevance: overall.mean_relevance,
            hit_rate: overall.hit_rate,
            mean_latency_ms: overall.mean_latency_ms,
            by_node_type,
            by_query_type,
        })
    }

    async fn prune(&self, before: chrono::DateTime<chrono::Utc>) -> EvolutionResult<u64> {
        let mut store = self.inner.write().await;
        let before_len = store.len();
        store.retain(|o| o.timestamp >= before);
        Ok((before_len - store.len()) as u64)
    }
}

/// Builds a minimal valid `Node` for tests, with sane defaults for every
/// field not relevant to the scenario under test.
pub fn test_node(id: &str, node_type: &str, tier: mnemos_core::types::Tier) -> Node {
    Node {
        id: id.to_string(),
        node_type: mnemos_core::types::NodeType::new(node_type),
        subtype: String::new(),
        content: format!("content for {id}"),
        tier,
        confidence: 0.5,
        access_count: 0,
        created_at: Utc::now(),
        last_accessed: None,
        embedding: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemos_core::types::{NodeFilter, NodeType, Tier};

    #[tokio::test]
    async fn create_get_update_delete_round_trips() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let node = test_node("n1", NodeType::FACT, Tier::Task);

        store.create_node(&node, &cancel).await.unwrap();
        let fetched = store.get_node("n1", &cancel).await.unwrap().unwrap();
        assert_eq!(fetched.id, "n1");

        let mut updated = fetched;
        updated.confidence = 0.9;
        store.update_node(&updated, &cancel).await.unwrap();
        assert_eq!(store.get_node("n1", &cancel).await.unwrap().unwrap().confidence, 0.9);

        store.delete_node("n1", &cancel).await.unwrap();
        assert!(store.get_node("n1", &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_nodes_filters_by_tier() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        store.create_node(&test_node("a", NodeType::FACT, Tier::Task), &cancel).await.unwrap();
        store.create_node(&test_node("b", NodeType::FACT, Tier::Session), &cancel).await.unwrap();

        let filter = NodeFilter::new().with_tiers([Tier::Task]);
        let found = store.list_nodes(&filter, &cancel).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    #[tokio::test]
    async fn delete_node_cascades_memberships() {
        use mnemos_core::types::{Hyperedge, Membership, MemberRole};
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        store.create_node(&test_node("a", NodeType::FACT, Tier::Task), &cancel).await.unwrap();
        store
            .create_hyperedge(
                &Hyperedge {
                    id: "e1".into(),
                    edge_type: "relation".into(),
                    label: "rel".into(),
                    weight: 1.0,
                    members: vec![Membership { node_id: "a".into(), role: MemberRole::subject(), position: 0 }],
                },
                &cancel,
            )
            .await
            .unwrap();

        store.delete_node("a", &cancel).await.unwrap();
        assert!(store.get_hyperedge("e1", &cancel).await.unwrap().is_none());
    }
}
