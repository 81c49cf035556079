//! # mnemos-proposals
//!
//! The proposal generator and meta-evolution manager: maps
//! detected patterns to durable `Proposal`s, screens duplicates, runs the
//! approve/reject/defer decision workflow, and applies the one concrete
//! change type (`add_subtype`) the store itself needs to know about.
//!
//! A single `tokio::sync::Mutex` serializes `run_analysis`,
//! `handle_decision`, `expire_pending_proposals`, and
//! `reactivate_deferred_proposals` — each may transition the
//! same proposal, so they are mutually exclusive rather than merely
//! store-serialized.

use chrono::{DateTime, Utc};
use tracing::info;

use mnemos_audit::{success_entry, AuditSink};
use mnemos_core::cancellation::CancellationToken;
use mnemos_core::config::ProposalConfig;
use mnemos_core::errors::{EvolutionError, EvolutionResult, StoreError};
use mnemos_core::store::{OutcomeStore, ProposalStore, Store};
use mnemos_core::types::{
    AuditEntry, AuditEventType, AuditResult, Change, Impact, Pattern, Proposal, ProposalFilter,
    ProposalStatus, ProposalType, RiskLevel,
};
use mnemos_patterns::PatternDetector;

pub type ProposalCallback = Box<dyn Fn(&Proposal) + Send + Sync>;

/// The action half of `HandleDecision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    Approve,
    Reject,
    Defer,
}

/// Outcome of one `run_analysis` call.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Too many proposals already pending; the detector never ran.
    Skipped { pending_count: u64 },
    Ran {
        patterns_detected: u64,
        proposals_created: u64,
        duplicates_skipped: u64,
        auto_applied: u64,
    },
}

/// The proposal generator + meta-evolution manager.
pub struct ProposalManager {
    config: ProposalConfig,
    detector: PatternDetector,
    lock: tokio::sync::Mutex<()>,
    new_proposal_callbacks: std::sync::Mutex<Vec<ProposalCallback>>,
    decision_callbacks: std::sync::Mutex<Vec<ProposalCallback>>,
}

impl ProposalManager {
    pub fn new(config: ProposalConfig, detector: PatternDetector) -> Self {
        Self {
            config,
            detector,
            lock: tokio::sync::Mutex::new(()),
            new_proposal_callbacks: std::sync::Mutex::new(Vec::new()),
            decision_callbacks: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ProposalConfig {
        &self.config
    }

    pub fn register_new_proposal_callback(&self, callback: ProposalCallback) {
        self.new_proposal_callbacks
            .lock()
            .expect("new-proposal callback lock poisoned")
            .push(callback);
    }

    pub fn register_decision_callback(&self, callback: ProposalCallback) {
        self.decision_callbacks
            .lock()
            .expect("decision callback lock poisoned")
            .push(callback);
    }

    fn fire_new_proposal_callbacks(&self, proposal: &Proposal) {
        let callbacks = self.new_proposal_callbacks.lock().expect("new-proposal callback lock poisoned");
        for callback in callbacks.iter() {
            callback(proposal);
        }
    }

    fn fire_decision_callbacks(&self, proposal: &Proposal) {
        let callbacks = self.decision_callbacks.lock().expect("decision callback lock poisoned");
        for callback in callbacks.iter() {
            callback(proposal);
        }
    }

    fn confidence_floor(&self, pattern: &Pattern) -> f64 {
        let floors = &self.config.confidence_floors;
        match pattern {
            Pattern::NodeTypeMismatch(_) => floors.node_type_mismatch,
            Pattern::MissingSubtype(_) => floors.missing_subtype,
            Pattern::RetrievalMismatch(_) => floors.retrieval_mismatch,
            Pattern::HighDecayOnUseful(_) => floors.high_decay_on_useful,
            Pattern::LowRetrievalHitRate(_) => floors.low_retrieval_hit_rate,
        }
    }

    /// Builds a pending `Proposal` from a pattern, or `None` if the
    /// pattern's confidence is below its per-pattern floor.
    pub fn generate_proposal(&self, pattern: &Pattern) -> Option<Proposal> {
        let confidence = pattern.confidence();
        if confidence < self.confidence_floor(pattern) {
            return None;
        }

        let now = Utc::now();
        let spec = proposal_spec(pattern);

        Some(Proposal {
            id: uuid::Uuid::new_v4().to_string(),
            proposal_type: spec.proposal_type,
            title: spec.title,
            description: pattern.description().to_string(),
            rationale: pattern.description().to_string(),
            evidence: spec.evidence,
            impact: Impact {
                nodes_affected: spec.nodes_affected,
                edges_affected: 0,
                reindex_required: false,
                estimated_duration: "< 1s".to_string(),
                reversible: true,
                risk_level: spec.risk,
            },
            changes: vec![spec.change],
            confidence,
            priority: spec.priority,
            status: ProposalStatus::Pending,
            status_note: None,
            source_pattern: pattern.kind().to_string(),
            defer_until: None,
            applied_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn should_auto_apply(&self, proposal: &Proposal) -> bool {
        self.config.auto_apply_low_risk
            && proposal.impact.risk_level == RiskLevel::Low
            && proposal.impact.reversible
            && proposal.confidence >= self.config.auto_apply_confidence_threshold
    }

    /// Runs the pattern detector and turns surviving patterns into
    /// persisted proposals, skipping the whole run if too many proposals
    /// are already pending.
    pub async fn run_analysis<S: Store, P: ProposalStore, O: OutcomeStore>(
        &self,
        store: &S,
        proposals: &P,
        outcomes: &O,
        audit: &AuditSink<S>,
        cancel: &CancellationToken,
    ) -> EvolutionResult<AnalysisOutcome> {
        let _guard = self.lock.lock().await;

        let pending_count = proposals.count_pending().await.map_err(|e| wrap(e, "count pending proposals"))?;
        if pending_count >= self.config.max_pending_proposals {
            return Ok(AnalysisOutcome::Skipped { pending_count });
        }

        let patterns = self.detector.detect(store, outcomes, cancel).await?;

        let mut active = proposals
            .list(&ProposalFilter::default().with_status([ProposalStatus::Pending, ProposalStatus::Deferred]))
            .await
            .map_err(|e| wrap(e, "list active proposals"))?;

        let mut created = 0u64;
        let mut duplicates = 0u64;
        let mut auto_applied = 0u64;

        for pattern in &patterns {
            let Some(proposal) = self.generate_proposal(pattern) else {
                continue;
            };
            if is_duplicate(&proposal, &active) {
                duplicates += 1;
                continue;
            }

            proposals.save(&proposal).await.map_err(|e| wrap(e, "save proposal"))?;
            active.push(proposal.clone());
            created += 1;
            self.fire_new_proposal_callbacks(&proposal);

            if self.should_auto_apply(&proposal) {
                let outcome = self
                    .apply_decision_locked(
                        store,
                        proposals,
                        audit,
                        &proposal.id,
                        DecisionAction::Approve,
                        "auto-approved",
                        None,
                        "system",
                        cancel,
                    )
                    .await;
                if outcome.is_ok() {
                    auto_applied += 1;
                }
            }
        }

        info!(
            patterns = patterns.len(),
            created,
            duplicates,
            auto_applied,
            "proposal analysis run complete"
        );

        Ok(AnalysisOutcome::Ran {
            patterns_detected: patterns.len() as u64,
            proposals_created: created,
            duplicates_skipped: duplicates,
            auto_applied,
        })
    }

    /// Approve, reject, or defer a pending or
    /// deferred proposal.
    #[allow(clippy::too_many_arguments)]
    pub async fn handle_decision<S: Store, P: ProposalStore>(
        &self,
        store: &S,
        proposals: &P,
        audit: &AuditSink<S>,
        id: &str,
        action: DecisionAction,
        reason: &str,
        defer_until: Option<DateTime<Utc>>,
        decided_by: &str,
        cancel: &CancellationToken,
    ) -> EvolutionResult<Proposal> {
        let _guard = self.lock.lock().await;
        self.apply_decision_locked(store, proposals, audit, id, action, reason, defer_until, decided_by, cancel)
            .await
    }

    /// Same as `handle_decision` but assumes the caller already holds
    /// `self.lock` (used by `run_analysis`'s auto-apply path).
    #[allow(clippy::too_many_arguments)]
    async fn apply_decision_locked<S: Store, P: ProposalStore>(
        &self,
        store: &S,
        proposals: &P,
        audit: &AuditSink<S>,
        id: &str,
        action: DecisionAction,
        reason: &str,
        defer_until: Option<DateTime<Utc>>,
        decided_by: &str,
        cancel: &CancellationToken,
    ) -> EvolutionResult<Proposal> {
        let mut proposal = proposals
            .get(id)
            .await
            .map_err(|e| wrap(e, "get proposal for decision"))?
            .ok_or_else(|| EvolutionError::ProposalNotFound { id: id.to_string() })?;

        if !matches!(proposal.status, ProposalStatus::Pending | ProposalStatus::Deferred) {
            return Err(EvolutionError::ProposalNotPending {
                id: id.to_string(),
                status: proposal.status.as_str().to_string(),
            });
        }

        info!(id, ?action, decided_by, "handling proposal decision");
        let now = Utc::now();

        match action {
            DecisionAction::Approve => {
                let mut apply_err = None;
                for change in &proposal.changes {
                    if let Err(e) = apply_change(change, store, cancel).await {
                        apply_err = Some(e);
                        break;
                    }
                }

                match apply_err {
                    None => {
                        proposal.status = ProposalStatus::Applied;
                        proposal.applied_at = Some(now);
                        proposal.status_note = Some(reason.to_string());
                        proposal.updated_at = now;
                        proposals.update(&proposal).await.map_err(|e| wrap(e, "update proposal"))?;
                        audit.record(success_entry(AuditEventType::PROPOSAL_APPLIED, proposal.changes.len() as u64), cancel).await;
                    }
                    Some(e) => {
                        proposal.status = ProposalStatus::Failed;
                        proposal.status_note = Some(e.to_string());
                        proposal.updated_at = now;
                        proposals.update(&proposal).await.map_err(|_| wrap_err(&e, "update proposal after failed apply"))?;
                        let mut entry = AuditEntry::new(AuditEventType::PROPOSAL_APPLIED);
                        entry.result = Some(AuditResult::failed(e.to_string()));
                        audit.record(entry, cancel).await;
                        self.fire_decision_callbacks(&proposal);
                        return Err(e);
                    }
                }
            }
            DecisionAction::Reject => {
                proposal.status = ProposalStatus::Rejected;
                proposal.status_note = Some(reason.to_string());
                proposal.updated_at = now;
                proposals.update(&proposal).await.map_err(|e| wrap(e, "update proposal"))?;
                audit.record(success_entry(AuditEventType::PROPOSAL_REJECTED, 0), cancel).await;
            }
            DecisionAction::Defer => {
                proposal.status = ProposalStatus::Deferred;
                proposal.defer_until = defer_until;
                proposal.status_note = Some(reason.to_string());
                proposal.updated_at = now;
                proposals.update(&proposal).await.map_err(|e| wrap(e, "update proposal"))?;
            }
        }

        self.fire_decision_callbacks(&proposal);
        Ok(proposal)
    }

    /// Pending proposals older than
    /// `proposal_expiry_days` become rejected with note "expired".
    pub async fn expire_pending_proposals<P: ProposalStore>(&self, proposals: &P) -> EvolutionResult<u64> {
        let _guard = self.lock.lock().await;
        let cutoff = Utc::now() - chrono::Duration::days(self.config.proposal_expiry_days);

        let pending = proposals
            .list(&ProposalFilter::default().with_status([ProposalStatus::Pending]))
            .await
            .map_err(|e| wrap(e, "list pending proposals"))?;

        let mut expired = 0u64;
        for mut proposal in pending {
            if proposal.created_at < cutoff {
                proposal.status = ProposalStatus::Rejected;
                proposal.status_note = Some("expired".to_string());
                proposal.updated_at = Utc::now();
                proposals.update(&proposal).await.map_err(|e| wrap(e, "expire proposal"))?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Deferred proposals whose
    /// `defer_until` has passed return to pending.
    pub async fn reactivate_deferred_proposals<P: ProposalStore>(&self, proposals: &P) -> EvolutionResult<u64> {
        let _guard = self.lock.lock().await;
        let now = Utc::now();

        let deferred = proposals
            .list(&ProposalFilter::default().with_status([ProposalStatus::Deferred]))
            .await
            .map_err(|e| wrap(e, "list deferred proposals"))?;

        let mut reactivated = 0u64;
        for mut proposal in deferred {
            if proposal.defer_until.map(|until| until <= now).unwrap_or(false) {
                proposal.status = ProposalStatus::Pending;
                proposal.defer_until = None;
                proposal.updated_at = now;
                proposals.update(&proposal).await.map_err(|e| wrap(e, "reactivate proposal"))?;
                reactivated += 1;
            }
        }
        Ok(reactivated)
    }
}

/// Duplicate screening: same type, same source pattern, same first-change
/// target as an already pending-or-deferred proposal.
fn is_duplicate(candidate: &Proposal, active: &[Proposal]) -> bool {
    let candidate_target = candidate.changes.first().map(|c| c.target.as_str());
    active.iter().any(|existing| {
        existing.proposal_type == candidate.proposal_type
            && existing.source_pattern == candidate.source_pattern
            && existing.changes.first().map(|c| c.target.as_str()) == candidate_target
    })
}

/// Applies one `Change`. Only `add_subtype` has a concrete store effect;
/// the other operations are documented hooks whose runtime effect lives
/// outside this repo, so they succeed without mutating anything.
async fn apply_change<S: Store>(change: &Change, store: &S, cancel: &CancellationToken) -> EvolutionResult<()> {
    match change.operation.as_str() {
        Change::ADD_SUBTYPE => {
            let name = change.string_param("name").unwrap_or_default().to_string();
            for node_id in change.node_ids_param() {
                let Some(mut node) = store.get_node(&node_id, cancel).await.map_err(|e| wrap(e, "get node for add_subtype"))?
                else {
                    continue;
                };
                if node.node_type.as_str() != change.target {
                    continue;
                }
                node.subtype = name.clone();
                store
                    .update_node(&node, cancel)
                    .await
                    .map_err(|e| wrap(e, &format!("update node {node_id} for add_subtype")))?;
            }
            Ok(())
        }
        Change::UPDATE_CONFIG | Change::TUNE_RETRIEVAL | Change::ADJUST_DECAY => Ok(()),
        other => Err(EvolutionError::UnknownOperation(other.to_string())),
    }
}

struct ProposalSpec {
    proposal_type: ProposalType,
    title: String,
    change: Change,
    priority: u8,
    risk: RiskLevel,
    nodes_affected: u64,
    evidence: Vec<String>,
}

/// The pattern → proposal mapping table.
fn proposal_spec(pattern: &Pattern) -> ProposalSpec {
    match pattern {
        Pattern::NodeTypeMismatch(p) => ProposalSpec {
            proposal_type: ProposalType::NewSubtype,
            title: format!("Add subtype for {} nodes mis-serving {} queries", p.current_type, p.query_type),
            change: Change {
                operation: Change::ADD_SUBTYPE.to_string(),
                target: p.current_type.as_str().to_string(),
                parameters: [
                    ("name".to_string(), serde_json::Value::String(p.suggested_type.clone())),
                    (
                        "node_ids".to_string(),
                        serde_json::Value::Array(p.sample_node_ids.iter().cloned().map(serde_json::Value::String).collect()),
                    ),
                ]
                .into_iter()
                .collect(),
            },
            priority: 3,
            risk: RiskLevel::Low,
            nodes_affected: p.sample_node_ids.len() as u64,
            evidence: vec![
                format!("occurrences={}", p.occurrences),
                format!("avg_relevance={:.3}", p.avg_relevance),
            ],
        },
        Pattern::MissingSubtype(p) => ProposalSpec {
            proposal_type: ProposalType::NewSubtype,
            title: format!("Split cohesive {} cluster into its own subtype", p.node_type),
            change: Change {
                operation: Change::ADD_SUBTYPE.to_string(),
                target: p.node_type.as_str().to_string(),
                parameters: [
                    ("name".to_string(), serde_json::Value::String(p.suggested_name.clone())),
                    (
                        "node_ids".to_string(),
                        serde_json::Value::Array(p.sample_node_ids.iter().cloned().map(serde_json::Value::String).collect()),
                    ),
                ]
                .into_iter()
                .collect(),
            },
            priority: 2,
            risk: RiskLevel::Low,
            nodes_affected: p.sample_node_ids.len() as u64,
            evidence: vec![format!("size={}", p.size), format!("cohesion={:.3}", p.cohesion)],
        },
        Pattern::RetrievalMismatch(p) => ProposalSpec {
            proposal_type: ProposalType::RetrievalConfig,
            title: format!("Tune retrieval for {} queries", p.query_type),
            change: Change {
                operation: Change::UPDATE_CONFIG.to_string(),
                target: "retrieval".to_string(),
                parameters: [
                    ("query_type".to_string(), serde_json::Value::String(p.query_type.to_string())),
                    ("suggested_change".to_string(), serde_json::Value::String(p.suggested_change.clone())),
                ]
                .into_iter()
                .collect(),
            },
            priority: 3,
            risk: RiskLevel::Low,
            nodes_affected: 0,
            evidence: vec![
                format!("hit_rate={:.3}", p.hit_rate),
                format!("false_positive_rate={:.3}", p.false_positive_rate),
            ],
        },
        Pattern::HighDecayOnUseful(p) => ProposalSpec {
            proposal_type: ProposalType::DecayAdjust,
            title: format!("Adjust decay for frequently-used {} nodes", p.node_type),
            change: Change {
                operation: Change::ADJUST_DECAY.to_string(),
                target: p.node_type.as_str().to_string(),
                parameters: std::collections::HashMap::new(),
            },
            priority: 2,
            risk: RiskLevel::Low,
            nodes_affected: p.sample_node_ids.len() as u64,
            evidence: Vec::new(),
        },
        Pattern::LowRetrievalHitRate(p) => ProposalSpec {
            proposal_type: ProposalType::RetrievalConfig,
            title: "Tune global retrieval: hit rate below threshold".to_string(),
            change: Change {
                operation: Change::TUNE_RETRIEVAL.to_string(),
                target: "global".to_string(),
                parameters: [("hit_rate".to_string(), serde_json::json!(p.hit_rate))].into_iter().collect(),
            },
            priority: 4,
            risk: RiskLevel::Medium,
            nodes_affected: 0,
            evidence: vec![format!("hit_rate={:.3}", p.hit_rate), format!("sample_size={}", p.sample_size)],
        },
    }
}

fn wrap(e: EvolutionError, context: &str) -> EvolutionError {
    wrap_err(&e, context)
}

fn wrap_err(e: &EvolutionError, context: &str) -> EvolutionError {
    match e {
        EvolutionError::Store(StoreError::Backend { message, .. }) => {
            EvolutionError::Store(StoreError::backend(context, message.clone()))
        }
        _ => EvolutionError::Configuration(format!("{context}: {e}")),
    }
}
