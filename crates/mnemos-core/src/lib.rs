//! # mnemos-core
//!
//! Shared types, traits, errors, and config for the memory-evolution
//! core: the subsystem that moves hypergraph nodes through importance
//! tiers, consolidates and decays them, and proposes structural
//! adaptations from observed retrieval outcomes.

pub mod cancellation;
pub mod config;
pub mod errors;
pub mod store;
pub mod types;

pub use cancellation::CancellationToken;
pub use errors::{EvolutionError, EvolutionResult};
