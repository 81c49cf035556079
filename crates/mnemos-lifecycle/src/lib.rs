//! # mnemos-lifecycle
//!
//! The lifecycle manager: owns the four engines (decayer,
//! consolidator, promoter, and an optional proposal/meta-evolution
//! manager) and exposes three orchestrated entry points plus bypass
//! ("force") entry points, all serialized by a single exclusive lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use mnemos_audit::{success_entry, AuditSink};
use mnemos_consolidation::{ConsolidationOutcome, Consolidator};
use mnemos_core::cancellation::CancellationToken;
use mnemos_core::config::LifecycleConfig;
use mnemos_core::errors::EvolutionResult;
use mnemos_core::store::{OutcomeStore, ProposalStore, Store};
use mnemos_core::types::{AuditEntry, AuditEventType, AuditResult, Tier};
use mnemos_decay::{ArchiveOutcome, DecayOutcome, Decayer, PruneOutcome};
use mnemos_promotion::{PromotionOutcome, Promoter};
use mnemos_proposals::{AnalysisOutcome, ProposalManager};

pub type LifecycleCallback = Box<dyn Fn(&LifecycleResult) + Send + Sync>;

/// Result of one orchestrated entry point (`TaskComplete`, `SessionEnd`,
/// `IdleMaintenance`). Per-step failures are collected rather than
/// aborting the remaining steps; `first_error` surfaces the
/// earliest one for callers that only care whether anything went wrong.
#[derive(Debug, Default)]
pub struct LifecycleResult {
    pub operation: String,
    pub consolidation: Option<ConsolidationOutcome>,
    pub promotion: Option<PromotionOutcome>,
    pub decay: Option<DecayOutcome>,
    pub archive: Option<ArchiveOutcome>,
    pub prune: Option<PruneOutcome>,
    pub analysis: Option<AnalysisOutcome>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl LifecycleResult {
    fn new(operation: &str) -> Self {
        Self { operation: operation.to_string(), ..Default::default() }
    }

    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The optional meta-evolution manager and the durable stores it needs,
/// bundled so `IdleMaintenance` can run an analysis pass without the
/// lifecycle manager itself depending on a concrete `ProposalStore`/
/// `OutcomeStore` pair.
struct MetaEvolution<P: ProposalStore, O: OutcomeStore> {
    manager: ProposalManager,
    proposals: P,
    outcomes: O,
}

/// Orchestrates the four engines across the three lifecycle operations,
/// owns the idle loop, and offers bypass entry points. Generic over the
/// hypergraph store and (if a meta-manager is attached) its proposal and
/// outcome stores.
pub struct LifecycleManager<S: Store, P: ProposalStore, O: OutcomeStore> {
    store: S,
    decayer: Decayer,
    consolidator: Consolidator,
    promoter: Promoter,
    audit: AuditSink<S>,
    meta: Option<MetaEvolution<P, O>>,
    config: LifecycleConfig,
    lock: tokio::sync::Mutex<()>,
    idle_token: tokio::sync::Mutex<Option<CancellationToken>>,
    idle_running: AtomicBool,
    task_complete_callbacks: std::sync::Mutex<Vec<LifecycleCallback>>,
    session_end_callbacks: std::sync::Mutex<Vec<LifecycleCallback>>,
    idle_callbacks: std::sync::Mutex<Vec<LifecycleCallback>>,
}

impl<S: Store, P: ProposalStore, O: OutcomeStore> LifecycleManager<S, P, O> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: LifecycleConfig,
        store: S,
        decayer: Decayer,
        consolidator: Consolidator,
        promoter: Promoter,
        audit: AuditSink<S>,
        meta: Option<(ProposalManager, P, O)>,
    ) -> Self {
        Self {
            store,
            decayer,
            consolidator,
            promoter,
            audit,
            meta: meta.map(|(manager, proposals, outcomes)| MetaEvolution { manager, proposals, outcomes }),
            config,
            lock: tokio::sync::Mutex::new(()),
            idle_token: tokio::sync::Mutex::new(None),
            idle_running: AtomicBool::new(false),
            task_complete_callbacks: std::sync::Mutex::new(Vec::new()),
            session_end_callbacks: std::sync::Mutex::new(Vec::new()),
            idle_callbacks: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn register_task_complete_callback(&self, callback: LifecycleCallback) {
        self.task_complete_callbacks.lock().expect("callback lock poisoned").push(callback);
    }

    pub fn register_session_end_callback(&self, callback: LifecycleCallback) {
        self.session_end_callbacks.lock().expect("callback lock poisoned").push(callback);
    }

    pub fn register_idle_callback(&self, callback: LifecycleCallback) {
        self.idle_callbacks.lock().expect("callback lock poisoned").push(callback);
    }

    fn fire(callbacks: &std::sync::Mutex<Vec<LifecycleCallback>>, result: &LifecycleResult) {
        for callback in callbacks.lock().expect("callback lock poisoned").iter() {
            callback(result);
        }
    }

    /// `TaskComplete`: self-consolidate the task tier, then promote
    /// task → session.
    pub async fn task_complete(&self, cancel: &CancellationToken) -> LifecycleResult {
        let start = Instant::now();
        let mut result = LifecycleResult::new("task_complete");
        {
            let _guard = self.lock.lock().await;

            self.run_consolidation_step(&mut result, Tier::Task, Tier::Task, cancel).await;
            self.run_promotion_step(&mut result, true, cancel).await;

            result.duration_ms = start.elapsed().as_millis() as u64;
        }
        Self::fire(&self.task_complete_callbacks, &result);
        result
    }

    /// `SessionEnd`: self-consolidate the session tier, promote
    /// session → longterm, and (if configured) apply decay.
    pub async fn session_end(&self, cancel: &CancellationToken) -> LifecycleResult {
        let start = Instant::now();
        let mut result = LifecycleResult::new("session_end");
        {
            let _guard = self.lock.lock().await;

            self.run_consolidation_step(&mut result, Tier::Session, Tier::Session, cancel).await;
            self.run_promotion_step(&mut result, false, cancel).await;

            if self.config.run_decay_on_session_end {
                self.run_decay_step(&mut result, cancel).await;
            }

            result.duration_ms = start.elapsed().as_millis() as u64;
        }
        Self::fire(&self.session_end_callbacks, &result);
        result
    }

    /// `IdleMaintenance`: decay, optionally archive, optionally prune,
    /// and (if a meta-manager is attached and configured) run an
    /// analysis pass.
    pub async fn idle_maintenance(&self, cancel: &CancellationToken) -> LifecycleResult {
        let start = Instant::now();
        let mut result = LifecycleResult::new("idle_maintenance");
        {
            let _guard = self.lock.lock().await;

            self.run_decay_step(&mut result, cancel).await;

            if self.config.archive_on_idle {
                self.run_archive_step(&mut result, cancel).await;
            }
            if self.config.prune_on_idle {
                self.run_prune_step(&mut result, cancel).await;
            }
            if self.config.run_meta_analysis_on_idle {
                self.run_analysis_step(&mut result, cancel).await;
            }

            result.duration_ms = start.elapsed().as_millis() as u64;
        }
        Self::fire(&self.idle_callbacks, &result);
        result
    }

    async fn run_consolidation_step(&self, result: &mut LifecycleResult, source: Tier, target: Tier, cancel: &CancellationToken) {
        match self.consolidator.consolidate(&self.store, &self.audit, source, target, cancel).await {
            Ok(outcome) => {
                result.consolidation = Some(outcome);
            }
            Err(e) => self.record_step_failure(result, AuditEventType::CONSOLIDATE, "consolidate", e, cancel).await,
        }
    }

    async fn run_promotion_step(&self, result: &mut LifecycleResult, from_task: bool, cancel: &CancellationToken) {
        let outcome = if from_task {
            self.promoter.promote_task_to_session(&self.store, &self.audit, cancel).await
        } else {
            self.promoter.promote_session_to_longterm(&self.store, &self.audit, cancel).await
        };
        match outcome {
            Ok(outcome) => {
                self.audit.record(success_entry(AuditEventType::PROMOTE, outcome.nodes_promoted), cancel).await;
                result.promotion = Some(outcome);
            }
            Err(e) => self.record_step_failure(result, AuditEventType::PROMOTE, "promote", e, cancel).await,
        }
    }

    async fn run_decay_step(&self, result: &mut LifecycleResult, cancel: &CancellationToken) {
        match self.decayer.apply_decay(&self.store, cancel).await {
            Ok(outcome) => {
                self.audit.record(success_entry(AuditEventType::DECAY, outcome.nodes_decayed), cancel).await;
                result.decay = Some(outcome);
            }
            Err(e) => self.record_step_failure(result, AuditEventType::DECAY, "decay", e, cancel).await,
        }
    }

    async fn run_archive_step(&self, result: &mut LifecycleResult, cancel: &CancellationToken) {
        match self.decayer.archive(&self.store, cancel).await {
            Ok(outcome) => {
                self.audit.record(success_entry(AuditEventType::ARCHIVE, outcome.nodes_archived), cancel).await;
                result.archive = Some(outcome);
            }
            Err(e) => self.record_step_failure(result, AuditEventType::ARCHIVE, "archive", e, cancel).await,
        }
    }

    async fn run_prune_step(&self, result: &mut LifecycleResult, cancel: &CancellationToken) {
        match self.decayer.prune(&self.store, cancel).await {
            Ok(outcome) => {
                self.audit.record(success_entry(AuditEventType::PRUNE, outcome.nodes_pruned), cancel).await;
                result.prune = Some(outcome);
            }
            Err(e) => self.record_step_failure(result, AuditEventType::PRUNE, "prune", e, cancel).await,
        }
    }

    async fn run_analysis_step(&self, result: &mut LifecycleResult, cancel: &CancellationToken) {
        let Some(meta) = &self.meta else { return };
        match meta.manager.run_analysis(&self.store, &meta.proposals, &meta.outcomes, &self.audit, cancel).await {
            Ok(outcome) => {
                self.audit.record(success_entry(AuditEventType::META_ANALYSIS, 0), cancel).await;
                result.analysis = Some(outcome);
            }
            Err(e) => self.record_step_failure(result, AuditEventType::META_ANALYSIS, "meta_analysis", e, cancel).await,
        }
    }

    async fn record_step_failure(
        &self,
        result: &mut LifecycleResult,
        event_type: &str,
        step: &str,
        error: mnemos_core::errors::EvolutionError,
        cancel: &CancellationToken,
    ) {
        result.errors.push(format!("{step}: {error}"));
        let mut entry = AuditEntry::new(event_type);
        entry.result = Some(AuditResult::failed(error.to_string()));
        self.audit.record(entry, cancel).await;
    }

    /// `ForceConsolidate`: bypasses scheduling, runs the consolidator
    /// synchronously, still emits audit.
    pub async fn force_consolidate(&self, source: Tier, target: Tier, cancel: &CancellationToken) -> EvolutionResult<ConsolidationOutcome> {
        let _guard = self.lock.lock().await;
        self.consolidator.consolidate(&self.store, &self.audit, source, target, cancel).await
    }

    /// `ForcePromote`: bypasses scheduling, runs task→session if
    /// `from_task` else session→longterm.
    pub async fn force_promote(&self, from_task: bool, cancel: &CancellationToken) -> EvolutionResult<PromotionOutcome> {
        let _guard = self.lock.lock().await;
        let outcome = if from_task {
            self.promoter.promote_task_to_session(&self.store, &self.audit, cancel).await?
        } else {
            self.promoter.promote_session_to_longterm(&self.store, &self.audit, cancel).await?
        };
        self.audit.record(success_entry(AuditEventType::PROMOTE, outcome.nodes_promoted), cancel).await;
        Ok(outcome)
    }

    /// `ForceDecay`: bypasses scheduling, runs the decayer synchronously.
    pub async fn force_decay(&self, cancel: &CancellationToken) -> EvolutionResult<DecayOutcome> {
        let _guard = self.lock.lock().await;
        let outcome = self.decayer.apply_decay(&self.store, cancel).await?;
        self.audit.record(success_entry(AuditEventType::DECAY, outcome.nodes_decayed), cancel).await;
        Ok(outcome)
    }

    /// `ForceRecordAccess`: bypasses scheduling, raises a node's
    /// confidence and logs the in-memory-only `ACCESS` event.
    pub async fn force_record_access(&self, id: &str, cancel: &CancellationToken) -> EvolutionResult<()> {
        let _guard = self.lock.lock().await;
        self.decayer.record_access(&self.store, &self.audit, id, cancel).await
    }

    /// `ForceRestore`: bypasses scheduling, restores an archived node
    /// to long-term and logs the in-memory-only `RESTORE` event.
    pub async fn force_restore(&self, id: &str, cancel: &CancellationToken) -> EvolutionResult<()> {
        let _guard = self.lock.lock().await;
        self.decayer.restore_from_archive(&self.store, &self.audit, id, cancel).await
    }

    /// `ForceDemote`: bypasses scheduling, moves a node to a lower tier
    /// and logs the in-memory-only `DEMOTE` event.
    pub async fn force_demote(&self, id: &str, target: Tier, cancel: &CancellationToken) -> EvolutionResult<()> {
        let _guard = self.lock.lock().await;
        self.promoter.demote(&self.store, &self.audit, id, target, cancel).await
    }

    /// Starts the idle-tick background worker if `idle_interval_secs >
    /// 0`. Idempotent: calling this while a loop is already running is a
    /// no-op, it does not spawn a second worker. Call `stop_idle_loop`
    /// first to replace the running loop. Requires `Arc<Self>` since the
    /// worker outlives the caller's stack frame.
    pub fn start_idle_loop(self: Arc<Self>)
    where
        S: 'static,
        P: 'static,
        O: 'static,
    {
        if self.config.idle_interval_secs == 0 {
            return;
        }

        if self.idle_running.swap(true, Ordering::SeqCst) {
            return;
        }

        tokio::task::spawn(async move {
            let token = {
                let mut guard = self.idle_token.lock().await;
                let token = guard.get_or_insert_with(CancellationToken::new).clone();
                token.reset();
                token
            };

            let mut interval = tokio::time::interval(Duration::from_secs(self.config.idle_interval_secs));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let cancel = CancellationToken::new();
                        let result = self.idle_maintenance(&cancel).await;
                        if let Some(error) = result.first_error() {
                            warn!(error, "idle maintenance tick reported an error");
                        } else {
                            info!("idle maintenance tick complete");
                        }
                    }
                    _ = token.cancelled() => {
                        info!("idle loop stopped");
                        break;
                    }
                }
            }
            self.idle_running.store(false, Ordering::SeqCst);
        });
    }

    /// Signals the idle loop to stop. Idempotent: safe to call when no
    /// loop is running, or more than once.
    pub async fn stop_idle_loop(&self) {
        let guard = self.idle_token.lock().await;
        if let Some(token) = guard.as_ref() {
            token.cancel();
        }
    }
}
