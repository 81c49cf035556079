//! Integration tests spanning the lifecycle manager end to end: the
//! three orchestrated entry points, the force bypasses, callbacks, and
//! the idle loop's start/stop contract.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mnemos_consolidation::Consolidator;
use mnemos_core::cancellation::CancellationToken;
use mnemos_core::config::{ConsolidationConfig, DecayConfig, LifecycleConfig, PatternConfig, PromotionConfig, ProposalConfig};
use mnemos_core::types::Tier;
use mnemos_decay::Decayer;
use mnemos_lifecycle::LifecycleManager;
use mnemos_patterns::PatternDetector;
use mnemos_promotion::Promoter;
use mnemos_proposals::ProposalManager;
use mnemos_testkit::{test_node, MemoryOutcomeStore, MemoryProposalStore, MemoryStore};

fn manager_without_meta(config: LifecycleConfig, store: MemoryStore) -> LifecycleManager<MemoryStore, MemoryProposalStore, MemoryOutcomeStore> {
    let audit = mnemos_audit::AuditSink::new(Default::default(), store.clone()).unwrap();
    LifecycleManager::new(
        config,
        store,
        Decayer::new(DecayConfig::default()),
        Consolidator::new(ConsolidationConfig { min_nodes: 1, ..Default::default() }),
        Promoter::new(PromotionConfig { consolidate_on_promotion: false, ..Default::default() }, Consolidator::new(ConsolidationConfig::default())),
        audit,
        None,
    )
}

#[tokio::test]
async fn task_complete_consolidates_and_promotes() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let mut node = test_node("n1", "fact", Tier::Task);
    node.confidence = 1.0;
    node.access_count = 100;
    node.created_at = chrono::Utc::now() - chrono::Duration::hours(1);
    store.create_node(&node, &cancel).await.unwrap();

    let mgr = manager_without_meta(LifecycleConfig::default(), store.clone());
    let result = mgr.task_complete(&cancel).await;

    assert!(result.ok());
    assert!(result.consolidation.is_some());
    assert!(result.promotion.is_some());
    assert_eq!(store.get_node("n1", &cancel).await.unwrap().unwrap().tier, Tier::Session);
}

#[tokio::test]
async fn session_end_runs_decay_when_configured() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let mut node = test_node("n1", "fact", Tier::Session);
    node.last_accessed = Some(chrono::Utc::now() - chrono::Duration::hours(1));
    store.create_node(&node, &cancel).await.unwrap();

    let mgr = manager_without_meta(LifecycleConfig { run_decay_on_session_end: true, ..Default::default() }, store.clone());
    let result = mgr.session_end(&cancel).await;
    assert!(result.decay.is_some());
}

#[tokio::test]
async fn idle_maintenance_runs_configured_steps_and_skips_analysis_without_meta() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    store.create_node(&test_node("n1", "fact", Tier::Archive), &cancel).await.unwrap();

    let mgr = manager_without_meta(LifecycleConfig { archive_on_idle: true, prune_on_idle: true, run_meta_analysis_on_idle: true, ..Default::default() }, store);
    let result = mgr.idle_maintenance(&cancel).await;
    assert!(result.decay.is_some());
    assert!(result.archive.is_some());
    assert!(result.prune.is_some());
    assert!(result.analysis.is_none());
}

#[tokio::test]
async fn idle_maintenance_with_meta_manager_runs_analysis() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let proposals = MemoryProposalStore::new();
    let outcomes = MemoryOutcomeStore::new();
    let proposal_manager = ProposalManager::new(ProposalConfig::default(), PatternDetector::new(PatternConfig::default()));

    let audit = mnemos_audit::AuditSink::new(Default::default(), store.clone()).unwrap();
    let mgr = LifecycleManager::new(
        LifecycleConfig { archive_on_idle: false, prune_on_idle: false, run_meta_analysis_on_idle: true, ..Default::default() },
        store,
        Decayer::new(DecayConfig::default()),
        Consolidator::new(ConsolidationConfig::default()),
        Promoter::new(PromotionConfig::default(), Consolidator::new(ConsolidationConfig::default())),
        audit,
        Some((proposal_manager, proposals, outcomes)),
    );

    let result = mgr.idle_maintenance(&cancel).await;
    assert!(result.analysis.is_some());
}

#[tokio::test]
async fn force_decay_emits_audit_and_returns_outcome() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let mgr = manager_without_meta(LifecycleConfig::default(), store);
    let outcome = mgr.force_decay(&cancel).await.unwrap();
    assert_eq!(outcome.nodes_processed, 0);
}

#[tokio::test]
async fn force_record_access_logs_access_event() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let mut node = test_node("n1", "fact", Tier::Task);
    node.confidence = 0.5;
    store.create_node(&node, &cancel).await.unwrap();

    let mgr = manager_without_meta(LifecycleConfig::default(), store.clone());
    mgr.force_record_access("n1", &cancel).await.unwrap();

    let updated = store.get_node("n1", &cancel).await.unwrap().unwrap();
    assert!(updated.confidence > 0.5);
}

#[tokio::test]
async fn force_restore_moves_archived_node_to_longterm() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let mut node = test_node("n1", "fact", Tier::Archive);
    node.confidence = 0.1;
    store.create_node(&node, &cancel).await.unwrap();

    let mgr = manager_without_meta(LifecycleConfig::default(), store.clone());
    mgr.force_restore("n1", &cancel).await.unwrap();

    let updated = store.get_node("n1", &cancel).await.unwrap().unwrap();
    assert_eq!(updated.tier, Tier::LongTerm);
}

#[tokio::test]
async fn force_demote_moves_node_to_lower_tier() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    store.create_node(&test_node("n1", "fact", Tier::LongTerm), &cancel).await.unwrap();

    let mgr = manager_without_meta(LifecycleConfig::default(), store.clone());
    mgr.force_demote("n1", Tier::Session, &cancel).await.unwrap();

    let updated = store.get_node("n1", &cancel).await.unwrap().unwrap();
    assert_eq!(updated.tier, Tier::Session);
}

#[tokio::test]
async fn callbacks_fire_after_lock_released() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let mgr = manager_without_meta(LifecycleConfig::default(), store);

    let fired = Arc::new(AtomicBool::new(false));
    let fired_clone = fired.clone();
    mgr.register_task_complete_callback(Box::new(move |_result| {
        fired_clone.store(true, Ordering::SeqCst);
    }));

    mgr.task_complete(&cancel).await;
    assert!(fired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn stop_idle_loop_is_idempotent_with_no_loop_running() {
    let store = MemoryStore::new();
    let mgr = manager_without_meta(LifecycleConfig::default(), store);
    mgr.stop_idle_loop().await;
    mgr.stop_idle_loop().await;
}

#[tokio::test(start_paused = true)]
async fn start_idle_loop_is_idempotent_while_running() {
    let store = MemoryStore::new();
    let mgr = Arc::new(manager_without_meta(LifecycleConfig { idle_interval_secs: 1, ..Default::default() }, store));

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticks_clone = ticks.clone();
    mgr.register_idle_callback(Box::new(move |_result| {
        ticks_clone.fetch_add(1, Ordering::SeqCst);
    }));

    mgr.clone().start_idle_loop();
    mgr.clone().start_idle_loop();
    tokio::task::yield_now().await;

    tokio::time::advance(Duration::from_millis(1100)).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    mgr.stop_idle_loop().await;

    assert_eq!(ticks.load(Ordering::SeqCst), 1, "second start_idle_loop call must not spawn a duplicate worker");
}
