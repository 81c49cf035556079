//! # mnemos-promotion
//!
//! The promoter: applies the tier-advancement policy (a
//! threshold on access count, confidence, and age), optionally running the
//! consolidator first, and offers force-promote/demote/candidate-listing
//! entry points. Stateless aside from `PromotionConfig`, same shape as
//! `mnemos-decay::Decayer` and `mnemos-consolidation::Consolidator`.

use chrono::Utc;
use tracing::debug;

use mnemos_audit::AuditSink;
use mnemos_consolidation::{ConsolidationOutcome, Consolidator};
use mnemos_core::cancellation::CancellationToken;
use mnemos_core::config::PromotionConfig;
use mnemos_core::errors::{EvolutionError, EvolutionResult, StoreError};
use mnemos_core::store::Store;
use mnemos_core::types::{AuditEntry, AuditEventType, AuditResult, Node, NodeFilter, Tier};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionOutcome {
    pub nodes_promoted: u64,
    pub consolidation: Option<ConsolidationOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllPromotionOutcome {
    pub task_to_session: PromotionOutcome,
    pub session_to_longterm: PromotionOutcome,
    pub total_promoted: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionStats {
    pub task_count: u64,
    pub session_count: u64,
    pub longterm_count: u64,
    pub archive_count: u64,
    pub task_to_session_candidates: u64,
    pub session_to_longterm_candidates: u64,
}

#[derive(Debug, Clone)]
pub struct Promoter {
    config: PromotionConfig,
    consolidator: Consolidator,
}

impl Promoter {
    pub fn new(config: PromotionConfig, consolidator: Consolidator) -> Self {
        Self { config, consolidator }
    }

    pub fn config(&self) -> &PromotionConfig {
        &self.config
    }

    fn task_to_session_predicate(&self, node: &Node, now: chrono::DateTime<Utc>) -> bool {
        let min_age = chrono::Duration::minutes(self.config.min_age_minutes);
        node.confidence >= self.config.min_confidence
            && node.access_count >= self.config.task_to_session_threshold
            && (now - node.created_at) >= min_age
    }

    fn session_to_longterm_predicate(&self, node: &Node, now: chrono::DateTime<Utc>) -> bool {
        let min_age = chrono::Duration::minutes(self.config.min_age_minutes * 2);
        node.confidence >= self.config.min_confidence
            && node.access_count >= self.config.session_to_longterm_threshold
            && (now - node.created_at) >= min_age
    }

    pub async fn promote_task_to_session<S: Store>(
        &self,
        store: &S,
        audit: &AuditSink<S>,
        cancel: &CancellationToken,
    ) -> EvolutionResult<PromotionOutcome> {
        self.promote_tier(store, audit, Tier::Task, Tier::Session, cancel, |p, n, now| {
            p.task_to_session_predicate(n, now)
        })
        .await
    }

    pub async fn promote_session_to_longterm<S: Store>(
        &self,
        store: &S,
        audit: &AuditSink<S>,
        cancel: &CancellationToken,
    ) -> EvolutionResult<PromotionOutcome> {
        self.promote_tier(store, audit, Tier::Session, Tier::LongTerm, cancel, |p, n, now| {
            p.session_to_longterm_predicate(n, now)
        })
        .await
    }

    async fn promote_tier<S: Store>(
        &self,
        store: &S,
        audit: &AuditSink<S>,
        source: Tier,
        target: Tier,
        cancel: &CancellationToken,
        predicate: impl Fn(&Self, &Node, chrono::DateTime<Utc>) -> bool,
    ) -> EvolutionResult<PromotionOutcome> {
        let consolidation = if self.config.consolidate_on_promotion {
            Some(self.consolidator.consolidate(store, audit, source, target, cancel).await?)
        } else {
            None
        };

        let filter = NodeFilter::new().with_tiers([source]);
        let nodes = store
            .list_nodes(&filter, cancel)
            .await
            .map_err(|e| wrap(e, "list nodes for promotion"))?;

        let now = Utc::now();
        let mut promoted = 0u64;
        for mut node in nodes {
            if predicate(self, &node, now) {
                node.tier = target;
                store
                    .update_node(&node, cancel)
                    .await
                    .map_err(|e| wrap(e, &format!("promote node {}", node.id)))?;
                promoted += 1;
            }
        }

        debug!(promoted, %source, %target, "promotion pass complete");
        Ok(PromotionOutcome { nodes_promoted: promoted, consolidation })
    }

    pub async fn promote_all<S: Store>(
        &self,
        store: &S,
        audit: &AuditSink<S>,
        cancel: &CancellationToken,
    ) -> EvolutionResult<AllPromotionOutcome> {
        let task_to_session = self.promote_task_to_session(store, audit, cancel).await?;
        let session_to_longterm = self.promote_session_to_longterm(store, audit, cancel).await?;
        let total = task_to_session.nodes_promoted + session_to_longterm.nodes_promoted;
        Ok(AllPromotionOutcome { task_to_session, session_to_longterm, total_promoted: total })
    }

    /// Advances a single node by exactly one tier in task → session →
    /// longterm order, bypassing every predicate. An archived node is
    /// restored to longterm; a longterm node is a no-op.
    pub async fn force_promote<S: Store>(
        &self,
        store: &S,
        id: &str,
        cancel: &CancellationToken,
    ) -> EvolutionResult<Tier> {
        let mut node = store
            .get_node(id, cancel)
            .await
            .map_err(|e| wrap(e, "get node for force_promote"))?
            .ok_or_else(|| StoreError::backend("force_promote", format!("node {id} not found")))?;

        let next = match node.tier {
            Tier::Task => Tier::Session,
            Tier::Session => Tier::LongTerm,
            Tier::LongTerm => Tier::LongTerm,
            Tier::Archive => Tier::LongTerm,
        };

        if next != node.tier {
            node.tier = next;
            store
                .update_node(&node, cancel)
                .await
                .map_err(|e| wrap(e, &format!("force promote node {id}")))?;
        }

        Ok(next)
    }

    /// Demotes a node, failing unless the target is strictly lower-order
    /// than the current tier, or the target is archive (always allowed).
    /// Emits an in-memory-only `demote` audit event.
    pub async fn demote<S: Store>(
        &self,
        store: &S,
        audit: &AuditSink<S>,
        id: &str,
        target: Tier,
        cancel: &CancellationToken,
    ) -> EvolutionResult<()> {
        let mut node = store
            .get_node(id, cancel)
            .await
            .map_err(|e| wrap(e, "get node for demote"))?
            .ok_or_else(|| StoreError::backend("demote", format!("node {id} not found")))?;

        if target.order() >= node.tier.order() && target != Tier::Archive {
            return Err(EvolutionError::InvalidDemoteTarget { from: node.tier, to: target });
        }

        let source_tier = node.tier;
        node.tier = target;
        store
            .update_node(&node, cancel)
            .await
            .map_err(|e| wrap(e, &format!("demote node {id}")))?;

        let mut entry = AuditEntry::new(AuditEventType::DEMOTE);
        entry.node_id = Some(id.to_string());
        entry.source_tier = Some(source_tier);
        entry.target_tier = Some(target);
        entry.result = Some(AuditResult::ok(1));
        audit.record(entry, cancel).await;
        Ok(())
    }

    pub async fn get_promotion_candidates<S: Store>(
        &self,
        store: &S,
        source_tier: Tier,
        cancel: &CancellationToken,
    ) -> EvolutionResult<Vec<Node>> {
        let filter = NodeFilter::new().with_tiers([source_tier]);
        let nodes = store
            .list_nodes(&filter, cancel)
            .await
            .map_err(|e| wrap(e, "list nodes for candidates"))?;

        let now = Utc::now();
        let candidates = match source_tier {
            Tier::Task => nodes
                .into_iter()
                .filter(|n| self.task_to_session_predicate(n, now))
                .collect(),
            Tier::Session => nodes
                .into_iter()
                .filter(|n| self.session_to_longterm_predicate(n, now))
                .collect(),
            _ => Vec::new(),
        };
        Ok(candidates)
    }

    pub async fn stats<S: Store>(&self, store: &S, cancel: &CancellationToken) -> EvolutionResult<PromotionStats> {
        let all = store
            .list_nodes(&NodeFilter::new(), cancel)
            .await
            .map_err(|e| wrap(e, "list nodes for stats"))?;

        let mut stats = PromotionStats::default();
        let now = Utc::now();
        for node in &all {
            match node.tier {
                Tier::Task => {
                    stats.task_count += 1;
                    if self.task_to_session_predicate(node, now) {
                        stats.task_to_session_candidates += 1;
                    }
                }
                Tier::Session => {
                    stats.session_count += 1;
                    if self.session_to_longterm_predicate(node, now) {
                        stats.session_to_longterm_candidates += 1;
                    }
                }
                Tier::LongTerm => stats.longterm_count += 1,
                Tier::Archive => stats.archive_count += 1,
            }
        }
        Ok(stats)
    }
}

fn wrap(e: EvolutionError, context: &str) -> EvolutionError {
    match e {
        EvolutionError::Store(StoreError::Backend { message, .. }) => {
            EvolutionError::Store(StoreError::backend(context, message))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemos_core::config::{AuditConfig, ConsolidationConfig};
    use mnemos_testkit::{test_node, MemoryStore};

    fn promoter(config: PromotionConfig) -> Promoter {
        Promoter::new(config, Consolidator::new(ConsolidationConfig::default()))
    }

    fn audit_sink(store: &MemoryStore) -> AuditSink<MemoryStore> {
        AuditSink::new(AuditConfig::default(), store.clone()).unwrap()
    }

    fn aged_node(id: &str, tier: Tier, confidence: f64, access_count: u64, age_minutes: i64) -> Node {
        let mut n = test_node(id, "fact", tier);
        n.confidence = confidence;
        n.access_count = access_count;
        n.created_at = Utc::now() - chrono::Duration::minutes(age_minutes);
        n
    }

    #[tokio::test]
    async fn promotes_task_to_session_when_predicate_met() {
        let store = MemoryStore::new();
        let audit = audit_sink(&store);
        let cancel = CancellationToken::new();
        store
            .create_node(&aged_node("n1", Tier::Task, 0.8, 3, 10), &cancel)
            .await
            .unwrap();
        store
            .create_node(&aged_node("n2", Tier::Task, 0.2, 0, 0), &cancel)
            .await
            .unwrap();

        let config = PromotionConfig { consolidate_on_promotion: false, ..Default::default() };
        let outcome = promoter(config).promote_task_to_session(&store, &audit, &cancel).await.unwrap();
        assert_eq!(outcome.nodes_promoted, 1);
        assert_eq!(store.get_node("n1", &cancel).await.unwrap().unwrap().tier, Tier::Session);
        assert_eq!(store.get_node("n2", &cancel).await.unwrap().unwrap().tier, Tier::Task);
    }

    #[tokio::test]
    async fn force_promote_advances_one_step_and_restores_archive() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        store.create_node(&test_node("a", "fact", Tier::Task), &cancel).await.unwrap();
        store.create_node(&test_node("b", "fact", Tier::Archive), &cancel).await.unwrap();
        store.create_node(&test_node("c", "fact", Tier::LongTerm), &cancel).await.unwrap();

        let p = promoter(PromotionConfig::default());
        assert_eq!(p.force_promote(&store, "a", &cancel).await.unwrap(), Tier::Session);
        assert_eq!(p.force_promote(&store, "b", &cancel).await.unwrap(), Tier::LongTerm);
        assert_eq!(p.force_promote(&store, "c", &cancel).await.unwrap(), Tier::LongTerm);
    }

    #[tokio::test]
    async fn demote_fails_unless_strictly_lower_or_archive() {
        let store = MemoryStore::new();
        let audit = audit_sink(&store);
        let cancel = CancellationToken::new();
        store.create_node(&test_node("a", "fact", Tier::Session), &cancel).await.unwrap();

        let p = promoter(PromotionConfig::default());
        assert!(p.demote(&store, &audit, "a", Tier::Task, &cancel).await.is_ok());

        store.seed_node({
            let mut n = test_node("b", "fact", Tier::Task);
            n.tier = Tier::Task;
            n
        }).await;
        let err = p.demote(&store, &audit, "b", Tier::Session, &cancel).await;
        assert!(err.is_err());

        // Archive is always allowed, even "up" from task's perspective in tier order.
        assert!(p.demote(&store, &audit, "b", Tier::Archive, &cancel).await.is_ok());

        let events = audit.by_type(&AuditEventType::new(AuditEventType::DEMOTE));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn get_promotion_candidates_matches_predicate() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        store.create_node(&aged_node("yes", Tier::Task, 0.9, 5, 10), &cancel).await.unwrap();
        store.create_node(&aged_node("no", Tier::Task, 0.1, 0, 0), &cancel).await.unwrap();

        let p = promoter(PromotionConfig::default());
        let candidates = p.get_promotion_candidates(&store, Tier::Task, &cancel).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "yes");
    }
}
