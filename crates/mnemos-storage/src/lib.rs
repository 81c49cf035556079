//! # mnemos-storage
//!
//! `rusqlite`-backed `ProposalStore` and `OutcomeStore` implementations.
//! The hypergraph `Store` itself is an external collaborator this repo
//! never implements; `mnemos-testkit` plays that role for tests.
//!
//! Single write connection behind a mutex — this crate only ever needs
//! the write side since proposals/outcomes are low-volume relative to
//! the hypergraph itself.

pub mod migrations;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use mnemos_core::errors::{EvolutionError, EvolutionResult, StoreError};
use mnemos_core::types::{
    GroupedAggregate, NodeType, OutcomeAggregate, OutcomeFilter, Proposal, ProposalFilter,
    ProposalStatus, ProposalType, QueryType, RetrievalOutcome, SortBy, SortOrder,
};
use mnemos_core::store::{OutcomeStore, ProposalStore};

/// Convert a backend error into `EvolutionError::Store`.
pub fn to_storage_err(context: impl Into<String>, message: impl Into<String>) -> EvolutionError {
    EvolutionError::Store(StoreError::backend(context, message))
}

/// Shared SQLite-backed store for proposals and outcomes. Opens (and
/// migrates) one connection; cheap to clone since the connection lives
/// behind an `Arc`-free `Mutex` wrapped by the caller if sharing across
/// tasks is needed (mirrors rusqlite's own single-connection guidance —
/// this repo does not need a pool since the two tables here are
/// low-volume relative to the hypergraph store).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> EvolutionResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| to_storage_err("open sqlite connection", e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> EvolutionResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| to_storage_err("open in-memory sqlite connection", e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> EvolutionResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| to_storage_err("set pragmas", e.to_string()))?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn lock_err(_: impl std::fmt::Debug) -> EvolutionError {
    to_storage_err("lock connection", "mutex poisoned")
}

fn proposal_type_str(t: ProposalType) -> &'static str {
    t.as_str()
}

fn parse_proposal_type(s: &str) -> EvolutionResult<ProposalType> {
    match s {
        "new_subtype" => Ok(ProposalType::NewSubtype),
        "rename_type" => Ok(ProposalType::RenameType),
        "merge_types" => Ok(ProposalType::MergeTypes),
        "split_type" => Ok(ProposalType::SplitType),
        "retrieval_config" => Ok(ProposalType::RetrievalConfig),
        "decay_adjust" => Ok(ProposalType::DecayAdjust),
        other => Err(to_storage_err("parse proposal type", format!("unknown proposal type: {other}"))),
    }
}

fn parse_proposal_status(s: &str) -> EvolutionResult<ProposalStatus> {
    match s {
        "pending" => Ok(ProposalStatus::Pending),
        "approved" => Ok(ProposalStatus::Approved),
        "rejected" => Ok(ProposalStatus::Rejected),
        "applied" => Ok(ProposalStatus::Applied),
        "deferred" => Ok(ProposalStatus::Deferred),
        "failed" => Ok(ProposalStatus::Failed),
        other => Err(to_storage_err("parse proposal status", format!("unknown proposal status: {other}"))),
    }
}

fn row_to_proposal(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawProposalRow> {
    Ok(RawProposalRow {
        id: row.get(0)?,
        proposal_type: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        rationale: row.get(4)?,
        evidence: row.get(5)?,
        impact: row.get(6)?,
        changes: row.get(7)?,
        confidence: row.get(8)?,
        priority: row.get(9)?,
        status: row.get(10)?,
        status_note: row.get(11)?,
        source_pattern: row.get(12)?,
        defer_until: row.get(13)?,
        applied_at: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

struct RawProposalRow {
    id: String,
    proposal_type: String,
    title: String,
    description: String,
    rationale: String,
    evidence: String,
    impact: String,
    changes: String,
    confidence: f64,
    priority: i64,
    status: String,
    status_note: Option<String>,
    source_pattern: String,
    defer_until: Option<String>,
    applied_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn parse_rfc3339(s: &str) -> EvolutionResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| to_storage_err("parse timestamp", e.to_string()))
}

impl RawProposalRow {
    fn into_proposal(self) -> EvolutionResult<Proposal> {
        Ok(Proposal {
            id: self.id,
            proposal_type: parse_proposal_type(&self.proposal_type)?,
            title: self.title,
            description: self.description,
            rationale: self.rationale,
            evidence: serde_json::from_str(&self.evidence)?,
            impact: serde_json::from_str(&self.impact)?,
            changes: serde_json::from_str(&self.changes)?,
            confidence: self.confidence,
            priority: self.priority as u8,
            status: parse_proposal_status(&self.status)?,
            status_note: self.status_note,
            source_pattern: self.source_pattern,
            defer_until: self.defer_until.as_deref().map(parse_rfc3339).transpose()?,
            applied_at: self.applied_at.as_deref().map(parse_rfc3339).transpose()?,
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
        })
    }
}

impl ProposalStore for SqliteStore {
    async fn save(&self, proposal: &Proposal) -> EvolutionResult<()> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let evidence = serde_json::to_string(&proposal.evidence)?;
        let impact = serde_json::to_string(&proposal.impact)?;
        let changes = serde_json::to_string(&proposal.changes)?;
        conn.execute(
            "INSERT INTO proposals (
                id, type, title, description, rationale, evidence, impact, changes,
                confidence, priority, status, status_note, source_pattern, defer_until,
                applied_at, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
            params![
                proposal.id,
                proposal_type_str(proposal.proposal_type),
                proposal.title,
                proposal.description,
                proposal.rationale,
                evidence,
                impact,
                changes,
                proposal.confidence,
                proposal.priority as i64,
                proposal.status.as_str(),
                proposal.status_note,
                proposal.source_pattern,
                proposal.defer_until.map(|d| d.to_rfc3339()),
                proposal.applied_at.map(|d| d.to_rfc3339()),
                proposal.created_at.to_rfc3339(),
                proposal.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| to_storage_err("insert proposal", e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> EvolutionResult<Option<Proposal>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let row = conn
            .query_row(
                "SELECT id, type, title, description, rationale, evidence, impact, changes,
                        confidence, priority, status, status_note, source_pattern, defer_until,
                        applied_at, created_at, updated_at
                 FROM proposals WHERE id = ?1",
                params![id],
                row_to_proposal,
            )
            .optional()
            .map_err(|e| to_storage_err("get proposal", e.to_string()))?;
        row.map(RawProposalRow::into_proposal).transpose()
    }

    async fn update(&self, proposal: &Proposal) -> EvolutionResult<()> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let evidence = serde_json::to_string(&proposal.evidence)?;
        let impact = serde_json::to_string(&proposal.impact)?;
        let changes = serde_json::to_string(&proposal.changes)?;
        let affected = conn
            .execute(
                "UPDATE proposals SET
                    type = ?2, title = ?3, description = ?4, rationale = ?5, evidence = ?6,
                    impact = ?7, changes = ?8, confidence = ?9, priority = ?10, status = ?11,
                    status_note = ?12, source_pattern = ?13, defer_until = ?14, applied_at = ?15,
                    updated_at = ?16
                 WHERE id = ?1",
                params![
                    proposal.id,
                    proposal_type_str(proposal.proposal_type),
                    proposal.title,
                    proposal.description,
                    proposal.rationale,
                    evidence,
                    impact,
                    changes,
                    proposal.confidence,
                    proposal.priority as i64,
                    proposal.status.as_str(),
                    proposal.status_note,
                    proposal.source_pattern,
                    proposal.defer_until.map(|d| d.to_rfc3339()),
                    proposal.applied_at.map(|d| d.to_rfc3339()),
                    proposal.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| to_storage_err("update proposal", e.to_string()))?;
        if affected == 0 {
            return Err(EvolutionError::ProposalNotFound { id: proposal.id.clone() });
        }
        Ok(())
    }

    async fn list(&self, filter: &ProposalFilter) -> EvolutionResult<Vec<Proposal>> {
        let conn = self.conn.lock().map_err(lock_err)?;

        let mut sql = String::from(
            "SELECT id, type, title, description, rationale, evidence, impact, changes,
                    confidence, priority, status, status_note, source_pattern, defer_until,
                    applied_at, created_at, updated_at
             FROM proposals WHERE 1=1",
        );
        let mut binds: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filter.status.is_empty() {
            let placeholders: Vec<String> = filter
                .status
                .iter()
                .map(|s| {
                    binds.push(Box::new(s.as_str().to_string()));
                    format!("?{}", binds.len())
                })
                .collect();
            sql.push_str(&format!(" AND status IN ({})", placeholders.join(",")));
        }
        if !filter.proposal_type.is_empty() {
            let placeholders: Vec<String> = filter
                .proposal_type
                .iter()
                .map(|t| {
                    binds.push(Box::new(t.as_str().to_string()));
                    format!("?{}", binds.len())
                })
                .collect();
            sql.push_str(&format!(" AND type IN ({})", placeholders.join(",")));
        }
        if let Some(since) = filter.created_since {
            binds.push(Box::new(since.to_rfc3339()));
            sql.push_str(&format!(" AND created_at >= ?{}", binds.len()));
        }
        if let Some(until) = filter.created_until {
            binds.push(Box::new(until.to_rfc3339()));
            sql.push_str(&format!(" AND created_at <= ?{}", binds.len()));
        }

        let sort_col = match filter.sort_by {
            SortBy::CreatedAt => "created_at",
            SortBy::UpdatedAt => "updated_at",
            SortBy::Priority => "priority",
            SortBy::Confidence => "confidence",
        };
        let sort_dir = match filter.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY {sort_col} {sort_dir}"));

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql).map_err(|e| to_storage_err("prepare list proposals", e.to_string()))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = binds.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), row_to_proposal)
            .map_err(|e| to_storage_err("list proposals", e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| to_storage_err("read proposal row", e.to_string()))?;
            out.push(raw.into_proposal()?);
        }
        Ok(out)
    }

    async fn count_pending(&self) -> EvolutionResult<u64> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM proposals WHERE status = ?1",
                params![ProposalStatus::Pending.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| to_storage_err("count pending proposals", e.to_string()))?;
        Ok(count as u64)
    }
}

fn row_to_outcome(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawOutcomeRow> {
    Ok(RawOutcomeRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        query_hash: row.get(2)?,
        query_type: row.get(3)?,
        node_id: row.get(4)?,
        node_type: row.get(5)?,
        node_subtype: row.get(6)?,
        relevance_score: row.get(7)?,
        was_used: row.get(8)?,
        context_tokens: row.get(9)?,
        latency_ms: row.get(10)?,
    })
}

struct RawOutcomeRow {
    id: i64,
    timestamp: String,
    query_hash: String,
    query_type: String,
    node_id: String,
    node_type: String,
    node_subtype: Option<String>,
    relevance_score: f64,
    was_used: i64,
    context_tokens: i64,
    latency_ms: i64,
}

fn parse_query_type(s: &str) -> EvolutionResult<QueryType> {
    match s {
        "computational" => Ok(QueryType::Computational),
        "retrieval" => Ok(QueryType::Retrieval),
        "analytical" => Ok(QueryType::Analytical),
        "transformational" => Ok(QueryType::Transformational),
        other => Err(to_storage_err("parse query type", format!("unknown query type: {other}"))),
    }
}

impl RawOutcomeRow {
    fn into_outcome(self) -> EvolutionResult<RetrievalOutcome> {
        Ok(RetrievalOutcome {
            id: self.id as u64,
            timestamp: parse_rfc3339(&self.timestamp)?,
            query_hash: self.query_hash,
            query_type: parse_query_type(&self.query_type)?,
            node_id: self.node_id,
            node_type: NodeType::new(self.node_type),
            node_subtype: self.node_subtype,
            relevance_score: self.relevance_score,
            was_used: self.was_used != 0,
            context_tokens: self.context_tokens as u64,
            latency_ms: self.latency_ms as u64,
        })
    }
}

impl OutcomeStore for SqliteStore {
    async fn record(&self, outcome: &RetrievalOutcome) -> EvolutionResult<()> {
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.execute(
            "INSERT INTO retrieval_outcomes (
                timestamp, query_hash, query_type, node_id, node_type, node_subtype,
                relevance_score, was_used, context_tokens, latency_ms
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                outcome.timestamp.to_rfc3339(),
                outcome.query_hash,
                outcome.query_type.as_str(),
                outcome.node_id,
                outcome.node_type.as_str(),
                outcome.node_subtype,
                outcome.relevance_score,
                outcome.was_used as i64,
                outcome.context_tokens as i64,
                outcome.latency_ms as i64,
            ],
        )
        .map_err(|e| to_storage_err("insert outcome", e.to_string()))?;
        Ok(())
    }

    async fn list(&self, filter: &OutcomeFilter) -> EvolutionResult<Vec<RetrievalOutcome>> {
        let conn = self.conn.lock().map_err(lock_err)?;

        let mut sql = String::from(
            "SELECT id, timestamp, query_hash, query_type, node_id, node_type, node_subtype,
                    relevance_score, was_used, context_tokens, latency_ms
             FROM retrieval_outcomes WHERE 1=1",
        );
        let mut binds: Vec<String> = Vec::new();
        if let Some(since) = filter.since {
            binds.push(since.to_rfc3339());
            sql.push_str(&format!(" AND timestamp >= ?{}", binds.len()));
        }
        if let Some(until) = filter.until {
            binds.push(until.to_rfc3339());
            sql.push_str(&format!(" AND timestamp <= ?{}", binds.len()));
        }
        sql.push_str(" ORDER BY timestamp DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql).map_err(|e| to_storage_err("prepare list outcomes", e.to_string()))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = binds.iter().map(|b| b as &dyn rusqlite::ToSql).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), row_to_outcome)
            .map_err(|e| to_storage_err("list outcomes", e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| to_storage_err("read outcome row", e.to_string()))?;
            out.push(raw.into_outcome()?);
        }
        Ok(out)
    }

    async fn aggregate(&self, filter: &OutcomeFilter) -> EvolutionResult<OutcomeAggregate> {
        let outcomes = self.list(filter).await?;
        let total = outcomes.len() as u64;

        let overall = grouped(&outcomes, String::new());

        let mut by_type_map: std::collections::HashMap<String, Vec<&RetrievalOutcome>> =
            std::collections::HashMap::new();
        let mut by_query_map: std::collections::HashMap<String, Vec<&RetrievalOutcome>> =
            std::collections::HashMap::new();
        for o in &outcomes {
            by_type_map.entry(o.node_type.as_str().to_string()).or_default().push(o);
            by_query_map.entry(o.query_type.to_string()).or_default().push(o);
        }

        let mut by_node_type: Vec<GroupedAggregate> = by_type_map
            .into_iter()
            .map(|(k, v)| grouped_refs(&v, k))
            .collect();
        by_node_type.sort_by(|a, b| a.key.cmp(&b.key));

        let mut by_query_type: Vec<GroupedAggregate> = by_query_map
            .into_iter()
            .map(|(k, v)| grouped_refs(&v, k))
            .collect();
        by_query_type.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(OutcomeAggregate {
            total,
            mean_relevance: overall.mean_relevance,
            hit_rate: overall.hit_rate,
            mean_latency_ms: overall.mean_latency_ms,
            by_node_type,
            by_query_type,
        })
    }

    async fn prune(&self, before: DateTime<Utc>) -> EvolutionResult<u64> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let affected = conn
            .execute(
                "DELETE FROM retrieval_outcomes WHERE timestamp < ?1",
                params![before.to_rfc3339()],
            )
            .map_err(|e| to_storage_err("prune outcomes", e.to_string()))?;
        Ok(affected as u64)
    }
}

fn grouped(outcomes: &[RetrievalOutcome], key: String) -> GroupedAggregate {
    let refs: Vec<&RetrievalOutcome> = outcomes.iter().collect();
    grouped_refs(&refs, key)
}

fn grouped_refs(outcomes: &[&RetrievalOutcome], key: String) -> GroupedAggregate {
    let total = outcomes.len() as u64;
    if total == 0 {
        return GroupedAggregate { key, ..Default::default() };
    }
    let sum_relevance: f64 = outcomes.iter().map(|o| o.relevance_score).sum();
    let used = outcomes.iter().filter(|o| o.was_used).count() as f64;
    let sum_latency: f64 = outcomes.iter().map(|o| o.latency_ms as f64).sum();
    GroupedAggregate {
        key,
        total,
        mean_relevance: sum_relevance / total as f64,
        hit_rate: used / total as f64,
        mean_latency_ms: sum_latency / total as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemos_core::types::{Change, Impact, RiskLevel};

    fn sample_proposal(id: &str) -> Proposal {
        let now = Utc::now();
        Proposal {
            id: id.to_string(),
            proposal_type: ProposalType::NewSubtype,
            title: "Add subtype".into(),
            description: "desc".into(),
            rationale: "rationale".into(),
            evidence: vec!["sample=1".into()],
            impact: Impact {
                nodes_affected: 3,
                edges_affected: 0,
                reindex_required: false,
                estimated_duration: "< 1s".into(),
                reversible: true,
                risk_level: RiskLevel::Low,
            },
            changes: vec![Change {
                operation: Change::ADD_SUBTYPE.into(),
                target: "fact".into(),
                parameters: Default::default(),
            }],
            confidence: 0.8,
            priority: 3,
            status: ProposalStatus::Pending,
            status_note: None,
            source_pattern: "node_type_mismatch".into(),
            defer_until: None,
            applied_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn proposal_round_trips_through_save_get_update_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut proposal = sample_proposal("p1");
        store.save(&proposal).await.unwrap();

        let fetched = store.get("p1").await.unwrap().unwrap();
        assert_eq!(fetched, proposal);

        proposal.status = ProposalStatus::Approved;
        proposal.status_note = Some("auto-approved".into());
        proposal.updated_at = Utc::now();
        store.update(&proposal).await.unwrap();

        let fetched = store.get("p1").await.unwrap().unwrap();
        assert_eq!(fetched, proposal);
    }

    #[tokio::test]
    async fn list_filters_by_status_and_sorts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut pending = sample_proposal("p-pending");
        let mut approved = sample_proposal("p-approved");
        approved.status = ProposalStatus::Approved;
        approved.priority = 5;
        pending.priority = 1;
        store.save(&pending).await.unwrap();
        store.save(&approved).await.unwrap();

        let only_pending = store
            .list(&ProposalFilter::default().with_status([ProposalStatus::Pending]))
            .await
            .unwrap();
        assert_eq!(only_pending.len(), 1);
        assert_eq!(only_pending[0].id, "p-pending");

        assert_eq!(store.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn outcome_aggregate_computes_hit_rate_and_groups() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        for (used, relevance) in [(true, 0.9), (false, 0.2), (true, 0.7)] {
            store
                .record(&RetrievalOutcome {
                    id: 0,
                    timestamp: now,
                    query_hash: "h".into(),
                    query_type: QueryType::Retrieval,
                    node_id: "n1".into(),
                    node_type: NodeType::fact(),
                    node_subtype: None,
                    relevance_score: relevance,
                    was_used: used,
                    context_tokens: 10,
                    latency_ms: 5,
                })
                .await
                .unwrap();
        }

        let agg = store.aggregate(&OutcomeFilter::default()).await.unwrap();
        assert_eq!(agg.total, 3);
        assert!((agg.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(agg.by_node_type.len(), 1);
        assert_eq!(agg.by_query_type.len(), 1);
    }

    #[tokio::test]
    async fn prune_removes_rows_older_than_cutoff() {
        let store = SqliteStore::open_in_memory().unwrap();
        let old = Utc::now() - chrono::Duration::days(10);
        store
            .record(&RetrievalOutcome {
                id: 0,
                timestamp: old,
                query_hash: "h".into(),
                query_type: QueryType::Analytical,
                node_id: "n1".into(),
                node_type: NodeType::fact(),
                node_subtype: None,
                relevance_score: 0.5,
                was_used: true,
                context_tokens: 1,
                latency_ms: 1,
            })
            .await
            .unwrap();

        let removed = store.prune(Utc::now() - chrono::Duration::days(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.aggregate(&OutcomeFilter::default()).await.unwrap().total, 0);
    }
}
