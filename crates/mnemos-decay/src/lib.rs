//! # mnemos-decay
//!
//! The decayer: forgetting-curve confidence decay, access-based
//! reinforcement, and the archive/prune passes that retire low-confidence
//! nodes. Pure with respect to configuration — the engine carries no state
//! of its own beyond `DecayConfig`; every call takes the store it should
//! run against.

use chrono::Utc;
use tracing::{debug, info};

use mnemos_audit::AuditSink;
use mnemos_core::cancellation::CancellationToken;
use mnemos_core::config::DecayConfig;
use mnemos_core::errors::{EvolutionResult, StoreError};
use mnemos_core::store::Store;
use mnemos_core::types::{AuditEntry, AuditEventType, AuditResult, Node, NodeFilter, Tier};

/// Result of one `apply_decay` pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecayOutcome {
    pub nodes_processed: u64,
    pub nodes_decayed: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveOutcome {
    pub nodes_archived: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneOutcome {
    pub nodes_pruned: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullCycleOutcome {
    pub decay: DecayOutcome,
    pub archive: ArchiveOutcome,
    pub prune: PruneOutcome,
}

/// Five-bucket confidence histogram: <30, 30-50, 50-70, 70-90, 90-100.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfidenceHistogram {
    pub below_30: u64,
    pub from_30_to_50: u64,
    pub from_50_to_70: u64,
    pub from_70_to_90: u64,
    pub from_90_to_100: u64,
}

impl ConfidenceHistogram {
    fn record(&mut self, confidence: f64) {
        let pct = confidence * 100.0;
        if pct < 30.0 {
            self.below_30 += 1;
        } else if pct < 50.0 {
            self.from_30_to_50 += 1;
        } else if pct < 70.0 {
            self.from_50_to_70 += 1;
        } else if pct < 90.0 {
            self.from_70_to_90 += 1;
        } else {
            self.from_90_to_100 += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecayStats {
    pub task_count: u64,
    pub session_count: u64,
    pub longterm_count: u64,
    pub archive_count: u64,
    /// Below archive threshold but still non-archive.
    pub at_risk_count: u64,
    pub average_confidence: f64,
    pub histogram: ConfidenceHistogram,
}

/// The forgetting-curve decayer.
#[derive(Debug, Clone)]
pub struct Decayer {
    config: DecayConfig,
}

impl Decayer {
    pub fn new(config: DecayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Multiplicative forgetting-curve factor for `elapsed_hours` since the
    /// node's reference time: `0.5^(elapsed / half_life)`.
    pub fn decay_factor(&self, elapsed_hours: f64) -> f64 {
        decay_factor(elapsed_hours, self.config.half_life_hours)
    }

    /// Access-amplification factor: `1 + log2(access_count + 1) * boost`.
    pub fn amplification(&self, access_count: u64) -> f64 {
        amplification(access_count, self.config.access_boost)
    }

    /// Decay pass: for every node outside `exclude_tiers`, compute the new
    /// confidence and persist only if it strictly decreased.
    pub async fn apply_decay<S: Store>(
        &self,
        store: &S,
        cancel: &CancellationToken,
    ) -> EvolutionResult<DecayOutcome> {
        let tiers: Vec<Tier> = [Tier::Task, Tier::Session, Tier::LongTerm, Tier::Archive]
            .into_iter()
            .filter(|t| !self.config.exclude_tiers.contains(t))
            .collect();

        let filter = NodeFilter::new().with_tiers(tiers).with_limit(self.config.list_cap);
        let nodes = store
            .list_nodes(&filter, cancel)
            .await
            .map_err(|e| wrap(e, "list nodes for decay"))?;

        let mut outcome = DecayOutcome { nodes_processed: nodes.len() as u64, ..Default::default() };
        let now = Utc::now();

        for node in nodes {
            let reference = node.last_accessed.unwrap_or(node.created_at);
            let elapsed_hours = (now - reference).num_milliseconds() as f64 / 3_600_000.0;
            let factor = self.decay_factor(elapsed_hours.max(0.0));
            let amp = self.amplification(node.access_count);
            let new_confidence = (node.confidence * factor * amp).clamp(0.0, 1.0);

            if new_confidence < node.confidence {
                let mut updated = node;
                updated.confidence = new_confidence;
                store
                    .update_node(&updated, cancel)
                    .await
                    .map_err(|e| wrap(e, &format!("update node {}", updated.id)))?;
                outcome.nodes_decayed += 1;
            }
        }

        debug!(processed = outcome.nodes_processed, decayed = outcome.nodes_decayed, "decay pass complete");
        Ok(outcome)
    }

    /// Archive pass: nodes not already archived, old enough, below the
    /// archive threshold, move to the archive tier.
    pub async fn archive<S: Store>(
        &self,
        store: &S,
        cancel: &CancellationToken,
    ) -> EvolutionResult<ArchiveOutcome> {
        let filter = NodeFilter::new()
            .with_tiers([Tier::Task, Tier::Session, Tier::LongTerm])
            .with_limit(self.config.list_cap);
        let nodes = store
            .list_nodes(&filter, cancel)
            .await
            .map_err(|e| wrap(e, "list nodes for archive"))?;

        let mut archived = 0u64;
        let now = Utc::now();
        let min_retention = chrono::Duration::milliseconds(
            (self.config.min_retention_hours * 3_600_000.0) as i64,
        );

        for mut node in nodes {
            let age = now - node.created_at;
            if node.confidence < self.config.archive_threshold && age >= min_retention {
                node.tier = Tier::Archive;
                store
                    .update_node(&node, cancel)
                    .await
                    .map_err(|e| wrap(e, &format!("archive node {}", node.id)))?;
                archived += 1;
            }
        }

        info!(archived, "archive pass complete");
        Ok(ArchiveOutcome { nodes_archived: archived })
    }

    /// Prune pass: archived nodes below the prune threshold are deleted.
    pub async fn prune<S: Store>(
        &self,
        store: &S,
        cancel: &CancellationToken,
    ) -> EvolutionResult<PruneOutcome> {
        let filter = NodeFilter::new()
            .with_tiers([Tier::Archive])
            .with_limit(self.config.list_cap);
        let nodes = store
            .list_nodes(&filter, cancel)
            .await
            .map_err(|e| wrap(e, "list nodes for prune"))?;

        let mut pruned = 0u64;
        for node in nodes {
            if node.confidence < self.config.prune_threshold {
                store
                    .delete_node(&node.id, cancel)
                    .await
                    .map_err(|e| wrap(e, &format!("delete node {}", node.id)))?;
                pruned += 1;
            }
        }

        info!(pruned, "prune pass complete");
        Ok(PruneOutcome { nodes_pruned: pruned })
    }

    /// Decay → archive → prune, in that order.
    pub async fn run_full_cycle<S: Store>(
        &self,
        store: &S,
        cancel: &CancellationToken,
    ) -> EvolutionResult<FullCycleOutcome> {
        let decay = self.apply_decay(store, cancel).await?;
        let archive = self.archive(store, cancel).await?;
        let prune = self.prune(store, cancel).await?;
        Ok(FullCycleOutcome { decay, archive, prune })
    }

    /// The only operation that raises confidence: increments the access
    /// counter and raises confidence by `access_boost`, capped at 1.
    /// Emits an in-memory-only `access` audit event.
    pub async fn record_access<S: Store>(
        &self,
        store: &S,
        audit: &AuditSink<S>,
        id: &str,
        cancel: &CancellationToken,
    ) -> EvolutionResult<()> {
        let mut node = store
            .get_node(id, cancel)
            .await
            .map_err(|e| wrap(e, "get node for record_access"))?
            .ok_or_else(|| StoreError::backend("record_access", format!("node {id} not found")))?;

        node.access_count += 1;
        node.confidence = (node.confidence + self.config.access_boost).min(1.0);
        node.last_accessed = Some(Utc::now());
        store
            .update_node(&node, cancel)
            .await
            .map_err(|e| wrap(e, &format!("update node {id}")))?;

        let mut entry = AuditEntry::new(AuditEventType::ACCESS);
        entry.node_id = Some(id.to_string());
        entry.result = Some(AuditResult::ok(1));
        audit.record(entry, cancel).await;
        Ok(())
    }

    /// Restores an archived node to longterm, flooring confidence *at* the
    /// archive threshold rather than resetting to 1.0. Emits an
    /// in-memory-only `restore` audit event.
    pub async fn restore_from_archive<S: Store>(
        &self,
        store: &S,
        audit: &AuditSink<S>,
        id: &str,
        cancel: &CancellationToken,
    ) -> EvolutionResult<()> {
        let mut node = store
            .get_node(id, cancel)
            .await
            .map_err(|e| wrap(e, "get node for restore"))?
            .ok_or_else(|| StoreError::backend("restore_from_archive", format!("node {id} not found")))?;

        if node.tier != Tier::Archive {
            return Err(mnemos_core::errors::EvolutionError::RestoreNotArchived { id: id.to_string() });
        }

        node.tier = Tier::LongTerm;
        node.confidence = self.config.archive_threshold;
        store
            .update_node(&node, cancel)
            .await
            .map_err(|e| wrap(e, &format!("update node {id}")))?;

        let mut entry = AuditEntry::new(AuditEventType::RESTORE);
        entry.node_id = Some(id.to_string());
        entry.source_tier = Some(Tier::Archive);
        entry.target_tier = Some(Tier::LongTerm);
        entry.result = Some(AuditResult::ok(1));
        audit.record(entry, cancel).await;
        Ok(())
    }

    pub async fn stats<S: Store>(&self, store: &S, cancel: &CancellationToken) -> EvolutionResult<DecayStats> {
        let filter = NodeFilter::new().with_limit(self.config.list_cap);
        let nodes = store
            .list_nodes(&filter, cancel)
            .await
            .map_err(|e| wrap(e, "list nodes for stats"))?;

        let mut stats = DecayStats::default();
        let mut confidence_sum = 0.0;
        for node in &nodes {
            match node.tier {
                Tier::Task => stats.task_count += 1,
                Tier::Session => stats.session_count += 1,
                Tier::LongTerm => stats.longterm_count += 1,
                Tier::Archive => stats.archive_count += 1,
            }
            if node.tier != Tier::Archive && node.confidence < self.config.archive_threshold {
                stats.at_risk_count += 1;
            }
            confidence_sum += node.confidence;
            stats.histogram.record(node.confidence);
        }

        stats.average_confidence = if nodes.is_empty() { 0.0 } else { confidence_sum / nodes.len() as f64 };
        Ok(stats)
    }
}

fn wrap(e: mnemos_core::errors::EvolutionError, context: &str) -> mnemos_core::errors::EvolutionError {
    match e {
        mnemos_core::errors::EvolutionError::Store(StoreError::Backend { message, .. }) => {
            mnemos_core::errors::EvolutionError::Store(StoreError::backend(context, message))
        }
        other => other,
    }
}

fn decay_factor(elapsed_hours: f64, half_life_hours: f64) -> f64 {
    if half_life_hours <= 0.0 {
        return 0.0;
    }
    0.5f64.powf(elapsed_hours / half_life_hours)
}

fn amplification(access_count: u64, boost: f64) -> f64 {
    1.0 + ((access_count + 1) as f64).log2() * boost
}

/// Just the pure node-without-store helper, exposed for callers building
/// the merged confidence outside a `Store` round-trip (e.g. the
/// consolidator's dedup merge step).
pub fn apply_confidence_decay(node: &Node, config: &DecayConfig, now: chrono::DateTime<Utc>) -> f64 {
    let reference = node.last_accessed.unwrap_or(node.created_at);
    let elapsed_hours = (now - reference).num_milliseconds() as f64 / 3_600_000.0;
    let factor = decay_factor(elapsed_hours.max(0.0), config.half_life_hours);
    let amp = amplification(node.access_count, config.access_boost);
    (node.confidence * factor * amp).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemos_core::config::AuditConfig;
    use mnemos_testkit::{test_node, MemoryStore};

    fn audit_sink(store: &MemoryStore) -> AuditSink<MemoryStore> {
        AuditSink::new(AuditConfig::default(), store.clone()).unwrap()
    }

    fn decayer_with_half_life_hours(hours: f64) -> Decayer {
        Decayer::new(DecayConfig { half_life_hours: hours, exclude_tiers: vec![], ..Default::default() })
    }

    #[test]
    fn decay_curve_matches_forgetting_curve_points() {
        let decayer = decayer_with_half_life_hours(1.0);
        assert!((decayer.decay_factor(0.0) - 1.0).abs() < 1e-3);
        assert!((decayer.decay_factor(1.0) - 0.5).abs() < 1e-3);
        assert!((decayer.decay_factor(2.0) - 0.25).abs() < 1e-3);
    }

    #[test]
    fn zero_access_count_amplification_is_one() {
        let decayer = decayer_with_half_life_hours(168.0);
        assert_eq!(decayer.amplification(0), 1.0);
    }

    #[tokio::test]
    async fn apply_decay_lowers_confidence_past_half_life() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let mut node = test_node("n1", "fact", Tier::Task);
        node.confidence = 1.0;
        node.access_count = 0;
        node.last_accessed = Some(Utc::now() - chrono::Duration::hours(1));
        store.create_node(&node, &cancel).await.unwrap();

        let decayer = decayer_with_half_life_hours(1.0);
        decayer.apply_decay(&store, &cancel).await.unwrap();

        let updated = store.get_node("n1", &cancel).await.unwrap().unwrap();
        assert!((updated.confidence - 0.5).abs() < 1e-3);
    }

    #[tokio::test]
    async fn apply_decay_skips_excluded_tiers() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let mut node = test_node("n1", "fact", Tier::Task);
        node.confidence = 1.0;
        node.last_accessed = Some(Utc::now() - chrono::Duration::hours(100));
        store.create_node(&node, &cancel).await.unwrap();

        let decayer = Decayer::new(DecayConfig { half_life_hours: 1.0, exclude_tiers: vec![Tier::Task], ..Default::default() });
        let outcome = decayer.apply_decay(&store, &cancel).await.unwrap();
        assert_eq!(outcome.nodes_processed, 0);
        assert_eq!(store.get_node("n1", &cancel).await.unwrap().unwrap().confidence, 1.0);
    }

    #[tokio::test]
    async fn archive_respects_min_retention() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let mut young = test_node("young", "fact", Tier::Task);
        young.confidence = 0.2;
        young.created_at = Utc::now();
        store.create_node(&young, &cancel).await.unwrap();

        let decayer = Decayer::new(DecayConfig { min_retention_hours: 24.0, archive_threshold: 0.3, ..Default::default() });
        decayer.archive(&store, &cancel).await.unwrap();
        assert_eq!(store.get_node("young", &cancel).await.unwrap().unwrap().tier, Tier::Task);

        let mut old = store.get_node("young", &cancel).await.unwrap().unwrap();
        old.created_at = Utc::now() - chrono::Duration::hours(48);
        store.update_node(&old, &cancel).await.unwrap();
        let outcome = decayer.archive(&store, &cancel).await.unwrap();
        assert_eq!(outcome.nodes_archived, 1);
        assert_eq!(store.get_node("young", &cancel).await.unwrap().unwrap().tier, Tier::Archive);
    }

    #[tokio::test]
    async fn prune_removes_only_archived_below_threshold() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let mut low = test_node("low", "fact", Tier::Archive);
        low.confidence = 0.05;
        store.create_node(&low, &cancel).await.unwrap();
        let mut high = test_node("high", "fact", Tier::Archive);
        high.confidence = 0.5;
        store.create_node(&high, &cancel).await.unwrap();

        let decayer = Decayer::new(DecayConfig { prune_threshold: 0.1, ..Default::default() });
        let outcome = decayer.prune(&store, &cancel).await.unwrap();
        assert_eq!(outcome.nodes_pruned, 1);
        assert!(store.get_node("low", &cancel).await.unwrap().is_none());
        assert!(store.get_node("high", &cancel).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn record_access_raises_confidence_and_caps_at_one() {
        let store = MemoryStore::new();
        let audit = audit_sink(&store);
        let cancel = CancellationToken::new();
        let mut node = test_node("n1", "fact", Tier::Task);
        node.confidence = 0.95;
        store.create_node(&node, &cancel).await.unwrap();

        let decayer = Decayer::new(DecayConfig { access_boost: 0.1, ..Default::default() });
        decayer.record_access(&store, &audit, "n1", &cancel).await.unwrap();
        let updated = store.get_node("n1", &cancel).await.unwrap().unwrap();
        assert_eq!(updated.confidence, 1.0);
        assert_eq!(updated.access_count, 1);

        let events = audit.by_type(&AuditEventType::new(AuditEventType::ACCESS));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].node_id.as_deref(), Some("n1"));
    }

    #[tokio::test]
    async fn restore_from_archive_floors_at_threshold_not_one() {
        let store = MemoryStore::new();
        let audit = audit_sink(&store);
        let cancel = CancellationToken::new();
        let mut node = test_node("n1", "fact", Tier::Archive);
        node.confidence = 0.05;
        store.create_node(&node, &cancel).await.unwrap();

        let decayer = Decayer::new(DecayConfig { archive_threshold: 0.3, ..Default::default() });
        decayer.restore_from_archive(&store, &audit, "n1", &cancel).await.unwrap();
        let updated = store.get_node("n1", &cancel).await.unwrap().unwrap();
        assert_eq!(updated.tier, Tier::LongTerm);
        assert_eq!(updated.confidence, 0.3);

        let events = audit.by_type(&AuditEventType::new(AuditEventType::RESTORE));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_tier, Some(Tier::Archive));
        assert_eq!(events[0].target_tier, Some(Tier::LongTerm));
    }

    #[tokio::test]
    async fn restore_from_archive_fails_if_not_archived() {
        let store = MemoryStore::new();
        let audit = audit_sink(&store);
        let cancel = CancellationToken::new();
        let node = test_node("n1", "fact", Tier::Task);
        store.create_node(&node, &cancel).await.unwrap();

        let decayer = Decayer::new(DecayConfig::default());
        let result = decayer.restore_from_archive(&store, &audit, "n1", &cancel).await;
        assert!(result.is_err());
    }

    proptest::proptest! {
        #[test]
        fn decay_factor_never_negative_or_above_one(elapsed in 0.0f64..10_000.0, half_life in 0.01f64..10_000.0) {
            let factor = decay_factor(elapsed, half_life);
            prop_assert!(factor >= 0.0 && factor <= 1.0001);
        }

        #[test]
        fn confidence_always_clamped(conf in 0.0f64..1.0, factor in 0.0f64..3.0, amp in 0.0f64..3.0) {
            let result = (conf * factor * amp).clamp(0.0, 1.0);
            prop_assert!(result >= 0.0 && result <= 1.0);
        }
    }
}
