//! # mnemos-audit
//!
//! The audit sink: appends structured event records to a
//! bounded in-memory ring, optionally mirrors each as one JSON object per
//! line to an append-only file, and optionally mirrors "evolution"-typed
//! events into the external hypergraph store's evolution log.
//!
//! The ring's own lock is a plain `std::sync::RwLock` and never awaits
//! while held — file and store I/O happen after the write guard
//! is dropped.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use tracing::warn;

use mnemos_core::cancellation::CancellationToken;
use mnemos_core::config::AuditConfig;
use mnemos_core::errors::EvolutionResult;
use mnemos_core::store::Store;
use mnemos_core::types::{AuditEntry, AuditEventType, AuditResult, AuditStats, EvolutionLogEntry};

/// The audit sink. Generic over the hypergraph store so the evolution-log
/// mirror can call `Store::record_evolution` directly.
pub struct AuditSink<S: Store> {
    config: AuditConfig,
    ring: RwLock<VecDeque<AuditEntry>>,
    file: Option<Mutex<std::fs::File>>,
    store: S,
}

impl<S: Store> AuditSink<S> {
    /// Opens the JSONL mirror file (if configured), creating parent
    /// directories as needed.
    pub fn new(config: AuditConfig, store: S) -> std::io::Result<Self> {
        let file = match &config.file_path {
            Some(path) => Some(Mutex::new(open_append(path)?)),
            None => None,
        };
        Ok(Self {
            config,
            ring: RwLock::new(VecDeque::with_capacity(1)),
            file,
            store,
        })
    }

    /// Appends an entry to the ring, mirrors it to the JSONL file if
    /// configured, and mirrors it to the store's evolution log if the
    /// event type maps to one and mirroring is enabled. File and store
    /// writes are best-effort: failures are logged, never propagated.
    pub async fn record(&self, entry: AuditEntry, cancel: &CancellationToken) {
        self.append_to_ring(entry.clone());

        if let Some(file) = &self.file {
            if let Err(e) = write_jsonl(file, &entry) {
                warn!(error = %e, "audit file mirror write failed");
            }
        }

        if self.config.persist_evolution_log {
            if let Some(operation) = entry.event_type.evolution_operation() {
                let log_entry = EvolutionLogEntry {
                    timestamp: entry.timestamp,
                    operation,
                    node_ids: evolution_node_ids(&entry),
                    from_tier: entry.source_tier,
                    to_tier: entry.target_tier,
                    reasoning: entry
                        .result
                        .as_ref()
                        .and_then(|r| r.error.clone())
                        .unwrap_or_else(|| entry.event_type.as_str().to_string()),
                };
                if let Err(e) = self.store.record_evolution(&log_entry, cancel).await {
                    warn!(error = %e, "evolution log mirror failed");
                }
            }
        }
    }

    fn append_to_ring(&self, entry: AuditEntry) {
        let mut ring = self.ring.write().expect("audit ring lock poisoned");
        if ring.len() >= self.config.ring_capacity {
            ring.pop_front();
        }
        ring.push_back(entry);
    }

    /// Most recent `n` entries, newest first.
    pub fn recent_entries(&self, n: usize) -> Vec<AuditEntry> {
        let ring = self.ring.read().expect("audit ring lock poisoned");
        ring.iter().rev().take(n).cloned().collect()
    }

    /// All ring entries whose `event_type` matches, newest first.
    pub fn by_type(&self, event_type: &AuditEventType) -> Vec<AuditEntry> {
        let ring = self.ring.read().expect("audit ring lock poisoned");
        ring.iter()
            .rev()
            .filter(|e| &e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// All ring entries mentioning the given node, newest first.
    pub fn by_node(&self, node_id: &str) -> Vec<AuditEntry> {
        let ring = self.ring.read().expect("audit ring lock poisoned");
        ring.iter()
            .rev()
            .filter(|e| e.mentions_node(node_id))
            .cloned()
            .collect()
    }

    /// Aggregate statistics over the current ring contents.
    pub fn stats(&self) -> AuditStats {
        let ring = self.ring.read().expect("audit ring lock poisoned");
        let total = ring.len() as u64;
        let mut successes = 0u64;
        let mut errors = 0u64;
        let mut duration_sum = 0u64;
        let mut duration_count = 0u64;

        for entry in ring.iter() {
            if let Some(result) = &entry.result {
                if result.success {
                    successes += 1;
                } else {
                    errors += 1;
                }
            }
            if let Some(duration) = entry.duration_ms {
                if duration > 0 {
                    duration_sum += duration;
                    duration_count += 1;
                }
            }
        }

        AuditStats {
            total,
            successes,
            errors,
            average_duration_ms: if duration_count > 0 {
                duration_sum as f64 / duration_count as f64
            } else {
                0.0
            },
        }
    }

    /// Empties the ring. Does not touch the file mirror.
    pub fn clear(&self) {
        self.ring.write().expect("audit ring lock poisoned").clear();
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }
}

fn evolution_node_ids(entry: &AuditEntry) -> Vec<String> {
    if !entry.node_ids.is_empty() {
        return entry.node_ids.clone();
    }
    entry.node_id.iter().cloned().collect()
}

fn open_append(path: &str) -> std::io::Result<std::fs::File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn write_jsonl(file: &Mutex<std::fs::File>, entry: &AuditEntry) -> EvolutionResult<()> {
    let line = serde_json::to_string(entry)?;
    let mut file = file.lock().expect("audit file lock poisoned");
    writeln!(file, "{line}")?;
    Ok(())
}

/// Convenience constructor for a "successful, N nodes affected" entry, the
/// common case across the four engines.
pub fn success_entry(
    event_type: impl Into<AuditEventType>,
    nodes_affected: u64,
) -> AuditEntry {
    let mut entry = AuditEntry::new(event_type);
    entry.result = Some(AuditResult::ok(nodes_affected));
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemos_core::types::Tier;
    use mnemos_testkit::MemoryStore;

    fn sink(config: AuditConfig) -> AuditSink<MemoryStore> {
        AuditSink::new(config, MemoryStore::new()).unwrap()
    }

    #[tokio::test]
    async fn ring_bounds_to_capacity_and_drops_oldest() {
        let sink = sink(AuditConfig { ring_capacity: 2, ..Default::default() });
        let cancel = CancellationToken::new();
        for i in 0..5 {
            sink.record(AuditEntry::new(format!("evt{i}").as_str()), &cancel).await;
        }
        let recent = sink.recent_entries(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type.as_str(), "evt4");
        assert_eq!(recent[1].event_type.as_str(), "evt3");
    }

    #[tokio::test]
    async fn clear_then_recent_is_empty() {
        let sink = sink(AuditConfig::default());
        let cancel = CancellationToken::new();
        sink.record(AuditEntry::new(AuditEventType::ACCESS), &cancel).await;
        assert_eq!(sink.recent_entries(10).len(), 1);
        sink.clear();
        assert!(sink.recent_entries(10).is_empty());
    }

    #[tokio::test]
    async fn filter_by_type_and_node() {
        let sink = sink(AuditConfig::default());
        let cancel = CancellationToken::new();
        let mut promote = AuditEntry::new(AuditEventType::PROMOTE);
        promote.node_id = Some("n1".into());
        sink.record(promote, &cancel).await;
        let mut decay = AuditEntry::new(AuditEventType::DECAY);
        decay.node_ids = vec!["n2".into(), "n1".into()];
        sink.record(decay, &cancel).await;

        assert_eq!(sink.by_type(&AuditEventType::new(AuditEventType::PROMOTE)).len(), 1);
        assert_eq!(sink.by_node("n1").len(), 2);
        assert_eq!(sink.by_node("n2").len(), 1);
    }

    #[tokio::test]
    async fn access_demote_restore_are_memory_only() {
        let store = MemoryStore::new();
        let sink = AuditSink::new(AuditConfig::default(), store.clone()).unwrap();
        let cancel = CancellationToken::new();
        sink.record(AuditEntry::new(AuditEventType::ACCESS), &cancel).await;
        sink.record(AuditEntry::new(AuditEventType::DEMOTE), &cancel).await;
        sink.record(AuditEntry::new(AuditEventType::RESTORE), &cancel).await;

        let log = store
            .list_evolution_log(&Default::default(), &cancel)
            .await
            .unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn consolidate_mirrors_to_evolution_log() {
        let store = MemoryStore::new();
        let sink = AuditSink::new(AuditConfig::default(), store.clone()).unwrap();
        let cancel = CancellationToken::new();
        let mut entry = AuditEntry::new(AuditEventType::CONSOLIDATE);
        entry.source_tier = Some(Tier::Task);
        entry.target_tier = Some(Tier::Session);
        sink.record(entry, &cancel).await;

        let log = store
            .list_evolution_log(&Default::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].from_tier, Some(Tier::Task));
    }

    #[tokio::test]
    async fn stats_splits_success_and_error() {
        let sink = sink(AuditConfig::default());
        let cancel = CancellationToken::new();
        sink.record(success_entry(AuditEventType::PROMOTE, 3), &cancel).await;
        let mut failed = AuditEntry::new(AuditEventType::PROMOTE);
        failed.result = Some(AuditResult::failed("boom"));
        sink.record(failed, &cancel).await;

        let stats = sink.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.errors, 1);
    }

    #[tokio::test]
    async fn file_mirror_writes_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        let config = AuditConfig {
            file_path: Some(path.to_string_lossy().to_string()),
            ..Default::default()
        };
        let sink = sink(config);
        let cancel = CancellationToken::new();
        sink.record(AuditEntry::new(AuditEventType::ACCESS), &cancel).await;
        sink.record(AuditEntry::new(AuditEventType::DECAY), &cancel).await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("event_type").is_some());
        }
    }
}
