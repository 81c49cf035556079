use serde::{Deserialize, Serialize};

/// Configuration for the audit sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// In-memory ring capacity; oldest entries are dropped on overflow.
    pub ring_capacity: usize,
    /// Append-only JSONL mirror. `None` disables file mirroring.
    pub file_path: Option<String>,
    /// Mirror evolution-typed events into the store's evolution log.
    pub persist_evolution_log: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1000,
            file_path: None,
            persist_evolution_log: true,
        }
    }
}
