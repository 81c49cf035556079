use serde::{Deserialize, Serialize};

/// Configuration for the lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub run_decay_on_session_end: bool,
    pub archive_on_idle: bool,
    pub prune_on_idle: bool,
    /// Idle-loop cadence in seconds. 0 disables the background worker.
    pub idle_interval_secs: u64,
    /// Run a meta-evolution analysis pass as part of idle maintenance,
    /// when a meta-manager is attached.
    pub run_meta_analysis_on_idle: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            run_decay_on_session_end: true,
            archive_on_idle: true,
            prune_on_idle: true,
            idle_interval_secs: 0,
            run_meta_analysis_on_idle: true,
        }
    }
}
