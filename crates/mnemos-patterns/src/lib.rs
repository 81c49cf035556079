//! # mnemos-patterns
//!
//! The pattern detector: mines trailing retrieval-outcome
//! history for structural mis-fit between the current node-type schema
//! and observed retrieval quality. Five detectors run in a fixed order;
//! each is pure given its input slice, table-driven in the same style
//! as the auto-tuning heuristics elsewhere in this workspace.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use mnemos_core::cancellation::CancellationToken;
use mnemos_core::config::PatternConfig;
use mnemos_core::errors::EvolutionResult;
use mnemos_core::store::{OutcomeStore, Store};
use mnemos_core::types::{
    HighDecayOnUseful, LowRetrievalHitRate, MissingSubtype, NodeType, NodeTypeMismatch, OutcomeFilter, Pattern,
    QueryType, RetrievalMismatch, RetrievalOutcome,
};

fn term_regex() -> Regex {
    Regex::new(r"[A-Za-z]+").expect("static regex is valid")
}

const STOPWORDS: &[&str] = &[
    "this", "that", "with", "from", "have", "there", "their", "about", "which", "these",
    "those", "would", "could", "should", "when", "what", "where", "been", "were",
];

#[derive(Debug, Clone)]
pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Runs all five detectors, in a fixed order, over the trailing analysis
    /// window. Returns empty if the window doesn't have enough samples.
    pub async fn detect<S: Store, O: OutcomeStore>(
        &self,
        store: &S,
        outcomes: &O,
        cancel: &CancellationToken,
    ) -> EvolutionResult<Vec<Pattern>> {
        let since = chrono::Utc::now() - chrono::Duration::days(self.config.analysis_window_days);
        let filter = OutcomeFilter { since: Some(since), until: None, limit: None };
        let window = outcomes.list(&filter).await?;

        if (window.len() as u64) < self.config.min_sample_size {
            return Ok(Vec::new());
        }

        let mut patterns = Vec::new();
        patterns.extend(self.detect_node_type_mismatch(&window));
        patterns.extend(self.detect_retrieval_mismatch(&window));
        patterns.extend(self.detect_missing_subtype(store, &window, cancel).await?);
        patterns.extend(self.detect_high_decay_on_useful(&window));
        patterns.extend(self.detect_low_retrieval_hit_rate(&window));
        Ok(patterns)
    }

    fn detect_node_type_mismatch(&self, window: &[RetrievalOutcome]) -> Vec<Pattern> {
        let mut groups: HashMap<(NodeType, QueryType), Vec<&RetrievalOutcome>> = HashMap::new();
        for outcome in window {
            groups
                .entry((outcome.node_type.clone(), outcome.query_type))
                .or_default()
                .push(outcome);
        }

        let mut patterns = Vec::new();
        for ((node_type, query_type), group) in groups {
            if (group.len() as u64) < self.config.min_sample_size {
                continue;
            }
            let avg_relevance = mean(group.iter().map(|o| o.relevance_score));
            let usage_rate = group.iter().filter(|o| o.was_used).count() as f64 / group.len() as f64;

            if avg_relevance < self.config.mismatch_threshold && usage_rate < 0.5 {
                let sample_node_ids = sample_ids(group.iter().map(|o| o.node_id.as_str()));
                patterns.push(Pattern::NodeTypeMismatch(NodeTypeMismatch {
                    suggested_type: suggested_type(node_type.as_str(), query_type),
                    description: format!(
                        "{node_type} nodes under-used for {query_type} queries (avg relevance {avg_relevance:.2}, usage {usage_rate:.2})"
                    ),
                    confidence: 1.0 - avg_relevance,
                    current_type: node_type,
                    query_type,
                    sample_node_ids,
                    occurrences: group.len() as u64,
                    avg_relevance,
                    detected_at: chrono::Utc::now(),
                }));
            }
        }
        patterns
    }

    fn detect_retrieval_mismatch(&self, window: &[RetrievalOutcome]) -> Vec<Pattern> {
        let mut groups: HashMap<QueryType, Vec<&RetrievalOutcome>> = HashMap::new();
        for outcome in window {
            groups.entry(outcome.query_type).or_default().push(outcome);
        }

        let mut patterns = Vec::new();
        for (query_type, group) in groups {
            if (group.len() as u64) < self.config.min_sample_size {
                continue;
            }
            let hit_rate = group.iter().filter(|o| o.was_used).count() as f64 / group.len() as f64;
            let false_positive_rate = 1.0 - hit_rate;
            let avg_relevance = mean(group.iter().map(|o| o.relevance_score));
            let avg_latency = mean(group.iter().map(|o| o.latency_ms as f64));

            if hit_rate < self.config.hit_rate_threshold {
                let suggested_change = suggested_retrieval_change(query_type, false_positive_rate);
                patterns.push(Pattern::RetrievalMismatch(RetrievalMismatch {
                    query_type,
                    hit_rate,
                    false_positive_rate,
                    avg_relevance,
                    avg_latency_ms: avg_latency,
                    suggested_change,
                    confidence: 1.0 - avg_relevance,
                    description: format!(
                        "{query_type} queries have a {hit_rate:.2} hit rate, below the {:.2} threshold",
                        self.config.hit_rate_threshold
                    ),
                    detected_at: chrono::Utc::now(),
                }));
            }
        }
        patterns
    }

    async fn detect_missing_subtype<S: Store>(
        &self,
        store: &S,
        window: &[RetrievalOutcome],
        cancel: &CancellationToken,
    ) -> EvolutionResult<Vec<Pattern>> {
        let mut unique_by_type: HashMap<NodeType, HashSet<String>> = HashMap::new();
        for outcome in window {
            unique_by_type
                .entry(outcome.node_type.clone())
                .or_default()
                .insert(outcome.node_id.clone());
        }

        let min_unique = 2 * self.config.min_cluster_size;
        let mut patterns = Vec::new();

        for (node_type, ids) in unique_by_type {
            if (ids.len() as u64) < min_unique {
                continue;
            }

            let mut embedded_nodes = Vec::new();
            for id in &ids {
                if let Some(node) = store.get_node(id, cancel).await? {
                    if node.has_embedding() {
                        embedded_nodes.push(node);
                    }
                }
            }
            if embedded_nodes.len() < 2 {
                continue;
            }

            let sample_count = embedded_nodes.len().min(20);
            let sampled = &embedded_nodes[..sample_count];
            let cohesion = mean_pairwise_cosine(sampled);

            if cohesion >= self.config.cluster_cohesion_min {
                let separation = 0.6;
                let sample_node_ids = sample_ids(sampled.iter().map(|n| n.id.as_str()));
                let common_terms = common_terms(sampled);
                let suggested_name = common_terms.first().cloned().unwrap_or_else(|| "cluster".to_string());

                patterns.push(Pattern::MissingSubtype(MissingSubtype {
                    node_type,
                    size: ids.len() as u64,
                    cohesion,
                    separation,
                    sample_node_ids,
                    common_terms,
                    suggested_name,
                    confidence: (cohesion + separation) / 2.0,
                    description: format!(
                        "found a cohesive cluster of size {} (cohesion {cohesion:.2}) with no dedicated subtype",
                        ids.len()
                    ),
                    detected_at: chrono::Utc::now(),
                }));
            }
        }

        Ok(patterns)
    }

    /// Reserved for forward compatibility: requires per-node decay history
    /// the store does not yet expose. Always empty.
    fn detect_high_decay_on_useful(&self, _window: &[RetrievalOutcome]) -> Vec<Pattern> {
        let _ = HighDecayOnUseful {
            node_type: NodeType::fact(),
            sample_node_ids: Vec::new(),
            confidence: 0.0,
            description: String::new(),
            detected_at: chrono::Utc::now(),
        };
        Vec::new()
    }

    /// A global (not grouped by query type) hit-rate check, catching a
    /// system-wide problem no single query-type group's sample size was
    /// large enough to surface on its own.
    fn detect_low_retrieval_hit_rate(&self, window: &[RetrievalOutcome]) -> Vec<Pattern> {
        let hit_rate = window.iter().filter(|o| o.was_used).count() as f64 / window.len() as f64;
        if hit_rate >= self.config.hit_rate_threshold {
            return Vec::new();
        }
        vec![Pattern::LowRetrievalHitRate(LowRetrievalHitRate {
            hit_rate,
            sample_size: window.len() as u64,
            confidence: 1.0 - hit_rate,
            description: format!(
                "global retrieval hit rate {hit_rate:.2} is below the {:.2} threshold across {} outcomes",
                self.config.hit_rate_threshold,
                window.len()
            ),
            detected_at: chrono::Utc::now(),
        })]
    }
}

fn mean(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let count = values.clone().count();
    if count == 0 {
        return 0.0;
    }
    values.sum::<f64>() / count as f64
}

fn sample_ids<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        if out.len() >= 5 {
            break;
        }
        if seen.insert(id) {
            out.push(id.to_string());
        }
    }
    out
}

fn suggested_type(current_type: &str, query_type: QueryType) -> String {
    match (current_type, query_type) {
        ("fact", QueryType::Computational) => "computed_value".to_string(),
        _ => format!("{current_type}_{query_type}"),
    }
}

fn suggested_retrieval_change(query_type: QueryType, false_positive_rate: f64) -> String {
    match query_type {
        QueryType::Computational => "keyword".to_string(),
        QueryType::Analytical => "semantic".to_string(),
        QueryType::Retrieval => "hybrid".to_string(),
        QueryType::Transformational => {
            if false_positive_rate > 0.3 {
                "keyword".to_string()
            } else {
                "semantic".to_string()
            }
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn mean_pairwise_cosine(nodes: &[mnemos_core::types::Node]) -> f64 {
    let embeddings: Vec<Vec<f32>> = nodes.iter().map(|n| n.embedding_as_f32()).collect();
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..embeddings.len() {
        for j in (i + 1)..embeddings.len() {
            sum += cosine_similarity(&embeddings[i], &embeddings[j]);
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        sum / pairs as f64
    }
}

/// Lowercase alphabetic tokens of length >= 4 (excluding stopwords) present
/// in at least half the sampled nodes, ranked by frequency, top 5.
fn common_terms(nodes: &[mnemos_core::types::Node]) -> Vec<String> {
    let pattern = term_regex();
    let mut doc_frequency: HashMap<String, usize> = HashMap::new();

    for node in nodes {
        let mut seen_in_doc = HashSet::new();
        for m in pattern.find_iter(&node.content) {
            let token = m.as_str().to_lowercase();
            if token.len() < 4 || STOPWORDS.contains(&token.as_str()) {
                continue;
            }
            seen_in_doc.insert(token);
        }
        for token in seen_in_doc {
            *doc_frequency.entry(token).or_insert(0) += 1;
        }
    }

    let half = (nodes.len() + 1) / 2;
    let mut ranked: Vec<(String, usize)> = doc_frequency
        .into_iter()
        .filter(|(_, count)| *count >= half)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(5).map(|(term, _)| term).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemos_core::types::Tier;
    use mnemos_testkit::{test_node, MemoryOutcomeStore, MemoryStore};

    fn outcome(
        id: u64,
        node_type: &str,
        query_type: QueryType,
        relevance: f64,
        was_used: bool,
    ) -> RetrievalOutcome {
        RetrievalOutcome {
            id,
            timestamp: chrono::Utc::now(),
            query_hash: format!("q{id}"),
            query_type,
            node_id: format!("n{id}"),
            node_type: NodeType::new(node_type),
            node_subtype: None,
            relevance_score: relevance,
            was_used,
            context_tokens: 100,
            latency_ms: 50,
        }
    }

    #[tokio::test]
    async fn below_sample_size_returns_empty() {
        let store = MemoryStore::new();
        let outcomes = MemoryOutcomeStore::new();
        let cancel = CancellationToken::new();
        outcomes.record(&outcome(1, "fact", QueryType::Computational, 0.1, false)).await.unwrap();

        let detector = PatternDetector::new(PatternConfig::default());
        let patterns = detector.detect(&store, &outcomes, &cancel).await.unwrap();
        assert!(patterns.is_empty());
    }

    #[tokio::test]
    async fn detects_node_type_mismatch() {
        let store = MemoryStore::new();
        let outcomes = MemoryOutcomeStore::new();
        let cancel = CancellationToken::new();

        for i in 0..12u64 {
            outcomes
                .record(&outcome(i, "fact", QueryType::Computational, 0.1, false))
                .await
                .unwrap();
        }

        let detector = PatternDetector::new(PatternConfig { min_sample_size: 10, ..Default::default() });
        let patterns = detector.detect(&store, &outcomes, &cancel).await.unwrap();
        assert!(patterns.iter().any(|p| matches!(p, Pattern::NodeTypeMismatch(_))));
    }

    #[tokio::test]
    async fn detects_retrieval_mismatch() {
        let store = MemoryStore::new();
        let outcomes = MemoryOutcomeStore::new();
        let cancel = CancellationToken::new();

        for i in 0..12u64 {
            outcomes
                .record(&outcome(i, "fact", QueryType::Analytical, 0.2, false))
                .await
                .unwrap();
        }

        let detector = PatternDetector::new(PatternConfig { min_sample_size: 10, ..Default::default() });
        let patterns = detector.detect(&store, &outcomes, &cancel).await.unwrap();
        assert!(patterns.iter().any(|p| matches!(p, Pattern::RetrievalMismatch(_))));
    }

    #[tokio::test]
    async fn detects_low_retrieval_hit_rate_globally() {
        let store = MemoryStore::new();
        let outcomes = MemoryOutcomeStore::new();
        let cancel = CancellationToken::new();

        // Spread across enough distinct query types/types that no one group
        // hits min_sample_size, but the overall hit rate is still low.
        let types = [QueryType::Computational, QueryType::Analytical, QueryType::Retrieval, QueryType::Transformational];
        for i in 0..12u64 {
            let qt = types[i as usize % types.len()];
            outcomes.record(&outcome(i, "fact", qt, 0.8, false)).await.unwrap();
        }

        let detector = PatternDetector::new(PatternConfig { min_sample_size: 10, hit_rate_threshold: 0.6, ..Default::default() });
        let patterns = detector.detect(&store, &outcomes, &cancel).await.unwrap();
        assert!(patterns.iter().any(|p| matches!(p, Pattern::LowRetrievalHitRate(_))));
    }

    #[tokio::test]
    async fn detects_missing_subtype_for_cohesive_cluster() {
        let store = MemoryStore::new();
        let outcomes = MemoryOutcomeStore::new();
        let cancel = CancellationToken::new();

        for i in 0..12u64 {
            let id = format!("n{i}");
            let mut node = test_node(&id, "fact", Tier::LongTerm);
            node.embedding = [1.0f32, 2.0, 3.0].iter().flat_map(|f| f.to_le_bytes()).collect();
            store.create_node(&node, &cancel).await.unwrap();
            outcomes.record(&outcome(i, "fact", QueryType::Retrieval, 0.9, true)).await.unwrap();
        }

        let detector = PatternDetector::new(PatternConfig {
            min_sample_size: 10,
            min_cluster_size: 5,
            cluster_cohesion_min: 0.7,
            hit_rate_threshold: 0.1,
            ..Default::default()
        });
        let patterns = detector.detect(&store, &outcomes, &cancel).await.unwrap();
        assert!(patterns.iter().any(|p| matches!(p, Pattern::MissingSubtype(_))));
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = [1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_length_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
