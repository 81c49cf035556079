//! Aggregated error type for the memory-evolution core.
//!
//! Each subsystem gets a narrow error enum, and everything folds into
//! one top-level type via `#[from]` so call sites can use `?` across
//! crate boundaries.

use crate::types::Tier;

/// Errors surfaced by the external hypergraph `Store`. Wrapped with
/// context by the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable")]
    Unavailable,
    #[error("{context}: {message}")]
    Backend { context: String, message: String },
}

impl StoreError {
    pub fn backend(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Errors from the audit sink's file/relational mirrors. These are
/// logged and the run continues rather than propagated — the type exists
/// so the sink's internal retry/log path has something concrete to log.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit file write failed: {0}")]
    FileWrite(String),
    #[error("audit serialization failed: {0}")]
    Serialization(String),
}

/// Top-level error type for the memory-evolution core.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown change operation: {0}")]
    UnknownOperation(String),

    #[error("invalid demote target: {to} is not strictly lower than {from} and is not archive")]
    InvalidDemoteTarget { from: Tier, to: Tier },

    #[error("cannot restore node {id}: not archived")]
    RestoreNotArchived { id: String },

    #[error("proposal {id} is not pending or deferred (status: {status})")]
    ProposalNotPending { id: String, status: String },

    #[error("unknown proposal action: {0}")]
    UnknownProposalAction(String),

    #[error("proposal {id} not found")]
    ProposalNotFound { id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EvolutionResult<T> = Result<T, EvolutionError>;
