//! # mnemos-consolidation
//!
//! The consolidator: deduplicates semantically equal nodes
//! within a tier, summarizes survivors by (type, subtype), strengthens
//! hyperedges whose membership leans on the source tier, then promotes
//! whatever is left to the target tier. Stateless aside from
//! `ConsolidationConfig`, generic over the store it runs against, same
//! shape as `mnemos-decay`'s `Decayer`.

use std::collections::HashMap;

use tracing::{debug, warn};

use mnemos_audit::AuditSink;
use mnemos_core::cancellation::CancellationToken;
use mnemos_core::config::ConsolidationConfig;
use mnemos_core::errors::EvolutionResult;
use mnemos_core::store::Store;
use mnemos_core::types::{
    AuditEntry, AuditEventType, AuditResult, Hyperedge, HyperedgeFilter, Membership, MemberRole,
    Node, NodeFilter, NodeType, Tier,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidationOutcome {
    pub nodes_processed: u64,
    pub nodes_merged: u64,
    pub summaries_created: u64,
    pub edges_strengthened: u64,
    pub nodes_promoted: u64,
}

/// Normalization key for dedup: lowercase, runs of whitespace collapsed.
fn normalize_key(content: &str) -> String {
    content.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone)]
pub struct Consolidator {
    config: ConsolidationConfig,
}

impl Consolidator {
    pub fn new(config: ConsolidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    pub async fn consolidate<S: Store>(
        &self,
        store: &S,
        audit: &AuditSink<S>,
        source_tier: Tier,
        target_tier: Tier,
        cancel: &CancellationToken,
    ) -> EvolutionResult<ConsolidationOutcome> {
        let filter = NodeFilter::new()
            .with_tiers([source_tier])
            .with_limit(self.config.node_list_cap);
        let nodes = store
            .list_nodes(&filter, cancel)
            .await
            .map_err(|e| wrap(e, "list nodes for consolidation"))?;

        let mut outcome = ConsolidationOutcome { nodes_processed: nodes.len() as u64, ..Default::default() };

        if nodes.len() < self.config.min_nodes {
            return Ok(outcome);
        }

        // Stage 1: group by node type, dedup, then summarize each group.
        let mut by_type: HashMap<NodeType, Vec<Node>> = HashMap::new();
        for node in nodes {
            by_type.entry(node.node_type.clone()).or_default().push(node);
        }

        for (_node_type, group) in by_type {
            let (survivors, merged) = self.dedup_group(store, audit, group, cancel).await?;
            outcome.nodes_merged += merged;

            if survivors.len() >= self.config.min_nodes {
                let summaries = self
                    .summarize_group(store, audit, survivors, target_tier, cancel)
                    .await?;
                outcome.summaries_created += summaries;
            }
        }

        // Stage 2: strengthen hyperedges leaning on the source tier.
        outcome.edges_strengthened = self.strengthen_edges(store, source_tier, cancel).await?;

        // Stage 3: promote whatever survives in the source tier.
        let remaining_filter = NodeFilter::new()
            .with_tiers([source_tier])
            .with_limit(self.config.node_list_cap);
        let remaining = store
            .list_nodes(&remaining_filter, cancel)
            .await
            .map_err(|e| wrap(e, "list nodes for promotion"))?;

        for mut node in remaining {
            node.tier = target_tier;
            store
                .update_node(&node, cancel)
                .await
                .map_err(|e| wrap(e, &format!("promote node {}", node.id)))?;
            outcome.nodes_promoted += 1;
        }

        debug!(?outcome, "consolidate complete");
        Ok(outcome)
    }

    /// Deduplicates a single type-group: the first occurrence of each
    /// normalized content key survives, later occurrences are merged in
    /// (accumulated access count, the higher confidence) and deleted.
    async fn dedup_group<S: Store>(
        &self,
        store: &S,
        audit: &AuditSink<S>,
        nodes: Vec<Node>,
        cancel: &CancellationToken,
    ) -> EvolutionResult<(Vec<Node>, u64)> {
        let mut survivors: Vec<Node> = Vec::new();
        let mut dirty: Vec<bool> = Vec::new();
        let mut index_by_key: HashMap<String, usize> = HashMap::new();
        let mut merged = 0u64;

        for node in nodes {
            let key = normalize_key(&node.content);
            if let Some(&idx) = index_by_key.get(&key) {
                let source_tier = node.tier;
                let survivor_id = survivors[idx].id.clone();
                survivors[idx].access_count += node.access_count;
                if node.confidence > survivors[idx].confidence {
                    survivors[idx].confidence = node.confidence;
                }
                dirty[idx] = true;
                store
                    .delete_node(&node.id, cancel)
                    .await
                    .map_err(|e| wrap(e, &format!("delete merged node {}", node.id)))?;
                merged += 1;

                // Per spec, a merge is reported as affecting two nodes: the
                // surviving node and the one deleted into it.
                let mut entry = AuditEntry::new(AuditEventType::MERGE);
                entry.node_id = Some(node.id.clone());
                entry.node_ids = vec![survivor_id, node.id.clone()];
                entry.source_tier = Some(source_tier);
                entry.result = Some(AuditResult::ok(2));
                audit.record(entry, cancel).await;
            } else {
                index_by_key.insert(key, survivors.len());
                survivors.push(node);
                dirty.push(false);
            }
        }

        for (survivor, is_dirty) in survivors.iter().zip(dirty.iter()) {
            if *is_dirty {
                store
                    .update_node(survivor, cancel)
                    .await
                    .map_err(|e| wrap(e, &format!("persist merged node {}", survivor.id)))?;
            }
        }

        Ok((survivors, merged))
    }

    /// Partitions survivors by subtype (empty string treated as its own
    /// "default" group) and produces one summary node per partition of
    /// size >= 2. Returns the number of summaries created.
    async fn summarize_group<S: Store>(
        &self,
        store: &S,
        audit: &AuditSink<S>,
        survivors: Vec<Node>,
        target_tier: Tier,
        cancel: &CancellationToken,
    ) -> EvolutionResult<u64> {
        let mut by_subtype: HashMap<String, Vec<Node>> = HashMap::new();
        for node in survivors {
            by_subtype.entry(node.subtype.clone()).or_default().push(node);
        }

        let mut created = 0u64;
        for (_subtype, partition) in by_subtype {
            if partition.len() < 2 {
                continue;
            }

            let confidence_sum: f64 = partition.iter().map(|n| n.confidence).sum();
            let mean_confidence = confidence_sum / partition.len() as f64;
            let contents: Vec<String> = partition.iter().map(|n| n.content.clone()).collect();
            let content = build_summary_content(&contents, self.config.max_summary_length);

            let summary = Node {
                id: uuid::Uuid::new_v4().to_string(),
                node_type: NodeType::fact(),
                subtype: "summary".to_string(),
                content,
                tier: target_tier,
                confidence: mean_confidence,
                access_count: 0,
                created_at: chrono::Utc::now(),
                last_accessed: None,
                embedding: Vec::new(),
            };

            store
                .create_node(&summary, cancel)
                .await
                .map_err(|e| wrap(e, "create summary node"))?;
            created += 1;

            let mut entry = AuditEntry::new(AuditEventType::SUMMARIZE);
            entry.node_id = Some(summary.id.clone());
            entry.node_ids = partition.iter().map(|n| n.id.clone()).collect();
            entry.source_tier = partition.first().map(|n| n.tier);
            entry.target_tier = Some(target_tier);
            entry.result = Some(AuditResult::ok(partition.len() as u64));
            audit.record(entry, cancel).await;

            if self.config.preserve_source_links {
                let mut edge = Hyperedge {
                    id: uuid::Uuid::new_v4().to_string(),
                    edge_type: Hyperedge::COMPOSITION.to_string(),
                    label: Hyperedge::SUMMARIZES.to_string(),
                    weight: 1.0,
                    members: vec![Membership {
                        node_id: summary.id.clone(),
                        role: MemberRole::subject(),
                        position: 0,
                    }],
                };
                for (i, source) in partition.iter().enumerate() {
                    edge.members.push(Membership {
                        node_id: source.id.clone(),
                        role: MemberRole::object(),
                        position: (i + 1) as u32,
                    });
                }
                if let Err(e) = store.create_hyperedge(&edge, cancel).await {
                    warn!(error = %e, "failed to persist summarizes edge, continuing");
                }
            }
        }

        Ok(created)
    }

    /// Strengthens every listed hyperedge whose majority of members sit in
    /// `source_tier`. Per-edge failures are logged and the pass continues.
    async fn strengthen_edges<S: Store>(
        &self,
        store: &S,
        source_tier: Tier,
        cancel: &CancellationToken,
    ) -> EvolutionResult<u64> {
        let filter = HyperedgeFilter::with_limit(self.config.edge_list_cap);
        let edges = store
            .list_hyperedges(&filter, cancel)
            .await
            .map_err(|e| wrap(e, "list hyperedges for strengthening"))?;

        let mut strengthened = 0u64;
        for mut edge in edges {
            if edge.members.is_empty() {
                continue;
            }
            let member_nodes = match store.get_member_nodes(&edge.id, cancel).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    warn!(error = %e, edge = %edge.id, "failed to load edge members, skipping");
                    continue;
                }
            };
            let in_source = member_nodes.iter().filter(|n| n.tier == source_tier).count();
            if in_source * 2 <= edge.members.len() {
                continue;
            }

            edge.weight = (edge.weight * self.config.edge_strengthen_factor).min(10.0);
            if let Err(e) = store.update_hyperedge(&edge, cancel).await {
                warn!(error = %e, edge = %edge.id, "failed to persist strengthened edge, continuing");
                continue;
            }
            strengthened += 1;
        }

        Ok(strengthened)
    }
}

/// Builds the bounded summary body: up to 10 bullet points (each truncated
/// to 200 chars) from the deduplicated, non-blank contents, a trailing
/// "... and M more" if there were more than 10, the whole thing truncated
/// to `max_len` with a trailing ellipsis if needed.
fn build_summary_content(contents: &[String], max_len: usize) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::new();
    for content in contents {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(normalize_key(trimmed)) {
            deduped.push(trimmed.to_string());
        }
    }

    let k = deduped.len();
    let mut body = format!("Summary of {k} items:\n");
    for item in deduped.iter().take(10) {
        let truncated: String = item.chars().take(200).collect();
        body.push_str("- ");
        body.push_str(&truncated);
        body.push('\n');
    }
    if k > 10 {
        body.push_str(&format!("... and {} more", k - 10));
    }
    let body = body.trim_end().to_string();

    if body.chars().count() > max_len {
        let truncated: String = body.chars().take(max_len.saturating_sub(1)).collect();
        format!("{truncated}…")
    } else {
        body
    }
}

fn wrap(e: mnemos_core::errors::EvolutionError, context: &str) -> mnemos_core::errors::EvolutionError {
    use mnemos_core::errors::{EvolutionError, StoreError};
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
    use mnemos_core::config::AuditConfig;
    use mnemos_testkit::{test_node, MemoryStore};

    fn config(min_nodes: usize) -> ConsolidationConfig {
        ConsolidationConfig { min_nodes, ..Default::default() }
    }

    fn audit_sink(store: &MemoryStore) -> AuditSink<MemoryStore> {
        AuditSink::new(AuditConfig::default(), store.clone()).unwrap()
    }

    #[tokio::test]
    async fn consolidation_with_duplicates_merges_and_accumulates_access_count() {
        let store = MemoryStore::new();
        let audit = audit_sink(&store);
        let cancel = CancellationToken::new();

        let mut a = test_node("a", "fact", Tier::Task);
        a.content = "User prefers dark mode".into();
        a.access_count = 5;
        let mut b = test_node("b", "fact", Tier::Task);
        b.content = "user prefers dark mode".into();
        b.access_count = 3;
        let mut c = test_node("c", "fact", Tier::Task);
        c.content = "Different fact entirely".into();
        c.access_count = 0;

        for n in [&a, &b, &c] {
            store.create_node(n, &cancel).await.unwrap();
        }

        let consolidator = Consolidator::new(config(2));
        let outcome = consolidator.consolidate(&store, &audit, Tier::Task, Tier::Session, &cancel).await.unwrap();

        assert_eq!(outcome.nodes_processed, 3);
        assert_eq!(outcome.nodes_merged, 1);

        let survivor = store.get_node("a", &cancel).await.unwrap().unwrap();
        assert_eq!(survivor.access_count, 8);
        assert!(store.get_node("b", &cancel).await.unwrap().is_none());

        let merges = audit.by_type(&AuditEventType::new(AuditEventType::MERGE));
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].node_id.as_deref(), Some("b"));
        assert_eq!(merges[0].result.as_ref().unwrap().nodes_affected, 2);
    }

    #[tokio::test]
    async fn summary_creation_from_four_nodes() {
        let store = MemoryStore::new();
        let audit = audit_sink(&store);
        let cancel = CancellationToken::new();

        for (id, letter) in [("n1", "A"), ("n2", "B"), ("n3", "C"), ("n4", "D")] {
            let mut n = test_node(id, "fact", Tier::Task);
            n.subtype = "preference".into();
            n.content = format!("Fact {letter}");
            store.create_node(&n, &cancel).await.unwrap();
        }

        let consolidator = Consolidator::new(config(3));
        let outcome = consolidator.consolidate(&store, &audit, Tier::Task, Tier::Session, &cancel).await.unwrap();
        assert_eq!(outcome.summaries_created, 1);

        let session_nodes = store
            .list_nodes(&NodeFilter::new().with_tiers([Tier::Session]), &cancel)
            .await
            .unwrap();
        let summary = session_nodes.iter().find(|n| n.subtype == "summary").unwrap();
        assert!(summary.content.starts_with("Summary of 4 items"));

        let summarizes = audit.by_type(&AuditEventType::new(AuditEventType::SUMMARIZE));
        assert_eq!(summarizes.len(), 1);
        assert_eq!(summarizes[0].node_id.as_deref(), Some(summary.id.as_str()));
        assert_eq!(summarizes[0].node_ids.len(), 4);
    }

    #[tokio::test]
    async fn below_min_nodes_only_sets_processed_count() {
        let store = MemoryStore::new();
        let audit = audit_sink(&store);
        let cancel = CancellationToken::new();
        store.create_node(&test_node("a", "fact", Tier::Task), &cancel).await.unwrap();

        let consolidator = Consolidator::new(config(3));
        let outcome = consolidator.consolidate(&store, &audit, Tier::Task, Tier::Session, &cancel).await.unwrap();
        assert_eq!(outcome.nodes_processed, 1);
        assert_eq!(outcome.nodes_merged, 0);
        assert_eq!(outcome.summaries_created, 0);
    }

    #[tokio::test]
    async fn self_consolidation_promotes_in_place() {
        let store = MemoryStore::new();
        let audit = audit_sink(&store);
        let cancel = CancellationToken::new();
        for id in ["a", "b", "c"] {
            let mut n = test_node(id, "fact", Tier::Task);
            n.content = format!("unique content {id}");
            store.create_node(&n, &cancel).await.unwrap();
        }

        let consolidator = Consolidator::new(config(2));
        let outcome = consolidator.consolidate(&store, &audit, Tier::Task, Tier::Task, &cancel).await.unwrap();
        assert_eq!(outcome.nodes_promoted, 3);
        for id in ["a", "b", "c"] {
            assert_eq!(store.get_node(id, &cancel).await.unwrap().unwrap().tier, Tier::Task);
        }
    }

    #[tokio::test]
    async fn strengthen_edges_clamps_weight_to_ten() {
        let store = MemoryStore::new();
        let audit = audit_sink(&store);
        let cancel = CancellationToken::new();
        let n1 = test_node("n1", "fact", Tier::Task);
        let n2 = test_node("n2", "fact", Tier::Task);
        store.create_node(&n1, &cancel).await.unwrap();
        store.create_node(&n2, &cancel).await.unwrap();

        let edge = Hyperedge {
            id: "e1".into(),
            edge_type: "relation".into(),
            label: "rel".into(),
            weight: 9.8,
            members: vec![
                Membership { node_id: "n1".into(), role: MemberRole::subject(), position: 0 },
                Membership { node_id: "n2".into(), role: MemberRole::object(), position: 1 },
            ],
        };
        store.create_hyperedge(&edge, &cancel).await.unwrap();

        let consolidator = Consolidator::new(ConsolidationConfig { min_nodes: 100, ..Default::default() });
        consolidator.consolidate(&store, &audit, Tier::Task, Tier::Session, &cancel).await.unwrap();

        let updated = store.get_hyperedge("e1", &cancel).await.unwrap().unwrap();
        assert_eq!(updated.weight, 10.0);
    }

    #[test]
    fn build_summary_content_elides_blank_and_duplicate() {
        let contents = vec![
            "Fact A".to_string(),
            "".to_string(),
            "fact a".to_string(),
            "Fact B".to_string(),
        ];
        let content = build_summary_content(&contents, 1000);
        assert!(content.starts_with("Summary of 2 items"));
    }

    #[test]
    fn build_summary_content_truncates_to_max_len() {
        let contents: Vec<String> = (0..20).map(|i| format!("item {i}")).collect();
        let content = build_summary_content(&contents, 50);
        assert!(content.chars().count() <= 50);
        assert!(content.ends_with('…'));
    }
}
