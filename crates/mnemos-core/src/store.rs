//! The hypergraph store contract.
//!
//! The store itself — node/edge CRUD, filtering, counting, the
//! transactional plumbing underneath it — is an external collaborator;
//! this crate only states the interface every engine programs against.
//! `mnemos-testkit` provides an in-memory reference implementation for
//! tests. A real deployment wires this trait to whatever owns the
//! hypergraph (out of scope here).
//!
//! Native async-fn-in-trait: no `async-trait` crate needed because every
//! consumer is generic over `S: Store`, never a trait object.

use crate::cancellation::CancellationToken;
use crate::errors::EvolutionResult;
use crate::types::{EvolutionLogEntry, EvolutionLogFilter, Hyperedge, HyperedgeFilter, Membership, Node, NodeFilter};

#[allow(async_fn_in_trait)]
pub trait Store: Send + Sync {
    // Nodes
    async fn create_node(&self, node: &Node, cancel: &CancellationToken) -> EvolutionResult<()>;
    async fn get_node(&self, id: &str, cancel: &CancellationToken) -> EvolutionResult<Option<Node>>;
    async fn update_node(&self, node: &Node, cancel: &CancellationToken) -> EvolutionResult<()>;
    /// Cascades edges and memberships referencing the deleted node.
    async fn delete_node(&self, id: &str, cancel: &CancellationToken) -> EvolutionResult<()>;
    async fn list_nodes(
        &self,
        filter: &NodeFilter,
        cancel: &CancellationToken,
    ) -> EvolutionResult<Vec<Node>>;
    async fn count_nodes(&self, filter: &NodeFilter, cancel: &CancellationToken) -> EvolutionResult<u64>;
    async fn increment_access(&self, id: &str, cancel: &CancellationToken) -> EvolutionResult<()>;

    // Hyperedges
    async fn create_hyperedge(&self, edge: &Hyperedge, cancel: &CancellationToken) -> EvolutionResult<()>;
    async fn get_hyperedge(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> EvolutionResult<Option<Hyperedge>>;
    async fn update_hyperedge(&self, edge: &Hyperedge, cancel: &CancellationToken) -> EvolutionResult<()>;
    async fn list_hyperedges(
        &self,
        filter: &HyperedgeFilter,
        cancel: &CancellationToken,
    ) -> EvolutionResult<Vec<Hyperedge>>;
    async fn add_member(
        &self,
        edge_id: &str,
        member: Membership,
        cancel: &CancellationToken,
    ) -> EvolutionResult<()>;
    async fn get_member_nodes(
        &self,
        edge_id: &str,
        cancel: &CancellationToken,
    ) -> EvolutionResult<Vec<Node>>;

    // Evolution log
    async fn record_evolution(
        &self,
        entry: &EvolutionLogEntry,
        cancel: &CancellationToken,
    ) -> EvolutionResult<()>;
    async fn list_evolution_log(
        &self,
        filter: &EvolutionLogFilter,
        cancel: &CancellationToken,
    ) -> EvolutionResult<Vec<EvolutionLogEntry>>;
}

/// Durable, owned storage for proposals.
#[allow(async_fn_in_trait)]
pub trait ProposalStore: Send + Sync {
    async fn save(&self, proposal: &crate::types::Proposal) -> EvolutionResult<()>;
    async fn get(&self, id: &str) -> EvolutionResult<Option<crate::types::Proposal>>;
    async fn update(&self, proposal: &crate::types::Proposal) -> EvolutionResult<()>;
    async fn list(
        &self,
        filter: &crate::types::ProposalFilter,
    ) -> EvolutionResult<Vec<crate::types::Proposal>>;
    async fn count_pending(&self) -> EvolutionResult<u64>;
}

/// Durable, owned storage for retrieval outcomes.
#[allow(async_fn_in_trait)]
pub trait OutcomeStore: Send + Sync {
    async fn record(&self, outcome: &crate::types::RetrievalOutcome) -> EvolutionResult<()>;
    async fn list(
        &self,
        filter: &crate::types::OutcomeFilter,
    ) -> EvolutionResult<Vec<crate::types::RetrievalOutcome>>;
    async fn aggregate(
        &self,
        filter: &crate::types::OutcomeFilter,
    ) -> EvolutionResult<crate::types::OutcomeAggregate>;
    /// Removes rows older than `before`. Returns the number removed.
    async fn prune(&self, before: chrono::DateTime<chrono::Utc>) -> EvolutionResult<u64>;
}
