mod audit;
mod hyperedge;
mod node;
mod outcome;
mod pattern;
mod proposal;
mod tier;

pub use audit::{
    AuditEntry, AuditEventType, AuditResult, AuditStats, EvolutionLogEntry, EvolutionLogFilter,
    EvolutionOperation,
};
pub use hyperedge::{Hyperedge, HyperedgeFilter, Membership, MemberRole};
pub use node::{Node, NodeFilter, NodeType};
pub use outcome::{GroupedAggregate, OutcomeAggregate, OutcomeFilter, QueryType, RetrievalOutcome};
pub use pattern::{
    HighDecayOnUseful, LowRetrievalHitRate, MissingSubtype, NodeTypeMismatch, Pattern, RetrievalMismatch,
};
pub use proposal::{
    Change, Impact, Priority, Proposal, ProposalFilter, ProposalStatus, ProposalType, RiskLevel,
    SortBy, SortOrder,
};
pub use tier::Tier;
