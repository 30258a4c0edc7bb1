//! Multi-factor relevance scoring
//!
//! Each item gets six factor scores in [0, 100] combined with fixed weights.
//! Semantic similarity uses an embedding provider when one is configured and
//! falls back to word overlap otherwise, or for any call the provider fails.

use crate::autopilot::events::{AutopilotEvent, EventBus};
use crate::config::AutopilotConfig;
use crate::context::text::{cosine_similarity, paths_match, word_overlap};
use crate::context::{
    ContextItem, Embedder, EmbeddingCache, HttpEmbedder, RelevanceScore, ScoreFactors,
    ScoringContext,
};
use crate::error::ProviderError;
use crate::metrics::METRICS;
use futures::future::join_all;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Factor weights in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringWeights {
    pub recency: u32,
    pub semantic: u32,
    pub frequency: u32,
    pub structural: u32,
    pub temporal: u32,
    pub causal: u32,
}

impl ScoringWeights {
    pub const DEFAULT: ScoringWeights = ScoringWeights {
        recency: 15,
        semantic: 35,
        frequency: 10,
        structural: 20,
        temporal: 10,
        causal: 10,
    };

    pub const fn total(&self) -> u32 {
        self.recency + self.semantic + self.frequency + self.structural + self.temporal + self.causal
    }

    /// Weighted combination of the factors, in [0, 100]
    pub fn combine(&self, factors: &ScoreFactors) -> f64 {
        let weighted = self.recency as f64 * factors.recency
            + self.semantic as f64 * factors.semantic
            + self.frequency as f64 * factors.frequency
            + self.structural as f64 * factors.structural
            + self.temporal as f64 * factors.temporal
            + self.causal as f64 * factors.causal;
        (weighted / self.total() as f64).clamp(0.0, 100.0)
    }
}

const _: () = assert!(ScoringWeights::DEFAULT.total() == 100);

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Placeholder value for factors with no signal source yet
pub const NEUTRAL_FACTOR: f64 = 50.0;

const FILE_POINTS: f64 = 40.0;
const FUNCTION_POINTS: f64 = 30.0;
const KEYWORD_POINTS: f64 = 30.0;

/// How semantic similarity is computed, fixed at construction
#[derive(Clone)]
pub enum SimilarityStrategy {
    Embedding {
        embedder: Arc<dyn Embedder>,
        cache: EmbeddingCache,
    },
    WordOverlap,
}

impl SimilarityStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SimilarityStrategy::Embedding { .. } => "embedding",
            SimilarityStrategy::WordOverlap => "word_overlap",
        }
    }
}

/// An item together with its score
#[derive(Debug, Clone)]
pub struct RankedItem {
    pub item: ContextItem,
    pub relevance: RelevanceScore,
}

/// Relevance scorer
pub struct RelevanceScorer {
    weights: ScoringWeights,
    similarity: SimilarityStrategy,
    events: Option<EventBus>,
}

impl RelevanceScorer {
    pub fn new(similarity: SimilarityStrategy) -> Self {
        Self {
            weights: ScoringWeights::DEFAULT,
            similarity,
            events: None,
        }
    }

    /// Word-overlap scorer with no provider
    pub fn word_overlap() -> Self {
        Self::new(SimilarityStrategy::WordOverlap)
    }

    /// Select the similarity strategy from configured credentials
    pub fn from_config(config: &AutopilotConfig) -> Self {
        let similarity = match HttpEmbedder::new(config.embedding.clone()) {
            Ok(embedder) => {
                debug!("Semantic scoring via {}", config.embedding.endpoint);
                SimilarityStrategy::Embedding {
                    embedder: Arc::new(embedder),
                    cache: EmbeddingCache::new(config.cache.capacity, config.cache_ttl()),
                }
            }
            Err(ProviderError::NotConfigured) => SimilarityStrategy::WordOverlap,
            Err(e) => {
                warn!("Embedding provider unavailable, using word overlap: {}", e);
                SimilarityStrategy::WordOverlap
            }
        };
        Self::new(similarity)
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn similarity(&self) -> &SimilarityStrategy {
        &self.similarity
    }

    /// Score one item against a query context
    pub async fn score(&self, item: &ContextItem, context: &ScoringContext) -> RelevanceScore {
        let factors = ScoreFactors {
            recency: recency_score(item.age_days(context.reference_time)),
            semantic: self.semantic_score(item, context).await,
            frequency: NEUTRAL_FACTOR,
            structural: structural_score(item, context),
            temporal: NEUTRAL_FACTOR,
            causal: NEUTRAL_FACTOR,
        };
        let score = self.weights.combine(&factors);

        RelevanceScore {
            item_id: item.id.clone(),
            score,
            reasoning: reasoning(score, &factors),
            factors,
        }
    }

    /// Score every item concurrently and sort by descending score.
    ///
    /// Equal scores are ordered by newer timestamp, then id.
    pub async fn score_and_rank(
        &self,
        items: Vec<ContextItem>,
        context: &ScoringContext,
        limit: Option<usize>,
    ) -> Vec<RankedItem> {
        let started = Instant::now();
        let scores = join_all(items.iter().map(|item| self.score(item, context))).await;

        let mut ranked: Vec<RankedItem> = items
            .into_iter()
            .zip(scores)
            .map(|(item, relevance)| RankedItem { item, relevance })
            .collect();

        ranked.sort_by(|a, b| {
            b.relevance
                .score
                .partial_cmp(&a.relevance.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.item.timestamp.cmp(&a.item.timestamp))
                .then_with(|| a.item.id.cmp(&b.item.id))
        });

        if let Some(limit) = limit {
            ranked.truncate(limit);
        }

        METRICS
            .scoring_duration
            .observe(started.elapsed().as_secs_f64());
        debug!(
            "Ranked {} items in {:?} ({})",
            ranked.len(),
            started.elapsed(),
            self.similarity.name()
        );
        ranked
    }

    async fn semantic_score(&self, item: &ContextItem, context: &ScoringContext) -> f64 {
        let query = context.query_text();
        match &self.similarity {
            SimilarityStrategy::WordOverlap => word_overlap(&item.content, &query) * 100.0,
            SimilarityStrategy::Embedding { embedder, cache } => {
                let vectors = futures::try_join!(
                    cached_embedding(embedder.as_ref(), cache, &item.content),
                    cached_embedding(embedder.as_ref(), cache, &query),
                );
                match vectors {
                    Ok((item_vec, query_vec)) => {
                        let cosine = cosine_similarity(&item_vec, &query_vec);
                        ((cosine + 1.0) * 50.0).clamp(0.0, 100.0)
                    }
                    Err(e) => {
                        warn!("Embedding failed for {}, using word overlap: {}", item.id, e);
                        METRICS.record_fallback("embedding");
                        if let Some(events) = &self.events {
                            events.emit(AutopilotEvent::ProviderError {
                                provider: "embedding".to_string(),
                                error: e.to_string(),
                            });
                        }
                        word_overlap(&item.content, &query) * 100.0
                    }
                }
            }
        }
    }
}

async fn cached_embedding(
    embedder: &dyn Embedder,
    cache: &EmbeddingCache,
    text: &str,
) -> Result<Arc<Vec<f32>>, ProviderError> {
    let key = EmbeddingCache::key(&[text]);
    if let Some(vector) = cache.get(&key).await {
        return Ok(vector);
    }
    let vector = Arc::new(embedder.embed(text).await?);
    cache.insert(key, Arc::clone(&vector)).await;
    Ok(vector)
}

/// Recency staircase over item age in days
pub fn recency_score(age_days: f64) -> f64 {
    match age_days {
        d if d <= 1.0 => 100.0,
        d if d <= 7.0 => 90.0,
        d if d <= 30.0 => 70.0,
        d if d <= 90.0 => 40.0,
        _ => 20.0,
    }
}

/// File, function and keyword overlap with the current working context
pub fn structural_score(item: &ContextItem, context: &ScoringContext) -> f64 {
    let mut score = 0.0;

    if !context.current_files.is_empty() {
        let overlap = context
            .current_files
            .iter()
            .filter(|current| item.metadata.files.iter().any(|f| paths_match(f, current)))
            .count();
        let denominator = context.current_files.len().clamp(1, 3) as f64;
        score += (overlap as f64 / denominator).min(1.0) * FILE_POINTS;
    }

    if let Some(function) = context.current_function.as_deref().filter(|f| !f.is_empty()) {
        let referenced = item.metadata.functions.iter().any(|f| f == function)
            || item.content.contains(function);
        if referenced {
            score += FUNCTION_POINTS;
        }
    }

    if !context.active_keywords.is_empty() {
        let content = item.content.to_lowercase();
        let overlap = context
            .active_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .filter(|k| {
                content.contains(k.as_str())
                    || item.metadata.keywords.iter().any(|ik| ik.eq_ignore_ascii_case(k))
            })
            .count();
        let denominator = context.active_keywords.len().clamp(1, 5) as f64;
        score += (overlap as f64 / denominator).min(1.0) * KEYWORD_POINTS;
    }

    score.min(100.0)
}

fn reasoning(score: f64, factors: &ScoreFactors) -> String {
    let mut reasons = Vec::new();
    if factors.recency > 80.0 {
        reasons.push("Recent");
    }
    if factors.semantic > 70.0 {
        reasons.push("Semantically similar to current work");
    }
    if factors.structural > 60.0 {
        reasons.push("Related to current files or functions");
    }

    if reasons.is_empty() {
        if score >= 50.0 {
            "Moderate relevance".to_string()
        } else {
            "Low relevance".to_string()
        }
    } else {
        reasons.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextType;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct FixedEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail {
                Err(ProviderError::Network("connection refused".to_string()))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }

    fn embedding_scorer(fail: bool) -> (RelevanceScorer, Arc<FixedEmbedder>) {
        let embedder = Arc::new(FixedEmbedder {
            calls: AtomicUsize::new(0),
            fail,
        });
        let scorer = RelevanceScorer::new(SimilarityStrategy::Embedding {
            embedder: embedder.clone(),
            cache: EmbeddingCache::new(100, std::time::Duration::from_secs(60)),
        });
        (scorer, embedder)
    }

    #[test]
    fn test_weights_sum_to_one_hundred() {
        assert_eq!(ScoringWeights::default().total(), 100);
        let all_max = ScoreFactors {
            recency: 100.0,
            semantic: 100.0,
            frequency: 100.0,
            structural: 100.0,
            temporal: 100.0,
            causal: 100.0,
        };
        assert_eq!(ScoringWeights::default().combine(&all_max), 100.0);
        assert_eq!(ScoringWeights::default().combine(&ScoreFactors::default()), 0.0);
    }

    #[test]
    fn test_recency_staircase() {
        assert_eq!(recency_score(0.0), 100.0);
        assert_eq!(recency_score(1.0), 100.0);
        assert_eq!(recency_score(2.0), 90.0);
        assert_eq!(recency_score(7.0), 90.0);
        assert_eq!(recency_score(20.0), 70.0);
        assert_eq!(recency_score(60.0), 40.0);
        assert_eq!(recency_score(100.0), 20.0);
    }

    #[tokio::test]
    async fn test_recency_factor_from_timestamps() {
        let scorer = RelevanceScorer::word_overlap();
        let context = ScoringContext::new(vec![]);
        let now = ContextItem::new("a", ContextType::Code, "x").with_timestamp(context.reference_time);
        let old = ContextItem::new("b", ContextType::Code, "x")
            .with_timestamp(context.reference_time - Duration::days(100));

        assert_eq!(scorer.score(&now, &context).await.factors.recency, 100.0);
        assert_eq!(scorer.score(&old, &context).await.factors.recency, 20.0);
    }

    #[tokio::test]
    async fn test_score_bounds_and_stubs() {
        let scorer = RelevanceScorer::word_overlap();
        let mut context = ScoringContext::new(vec!["src/auth.ts".to_string()]);
        context.current_function = Some("login".to_string());
        context.active_keywords = vec!["auth".to_string(), "token".to_string()];

        let items = vec![
            ContextItem::new("1", ContextType::Decision, "auth token login via auth.ts")
                .with_files(["src/auth.ts"])
                .with_functions(["login"]),
            ContextItem::new("2", ContextType::Conversation, "")
                .with_timestamp(Utc::now() - Duration::days(400)),
        ];

        for item in &items {
            let score = scorer.score(item, &context).await;
            assert!((0.0..=100.0).contains(&score.score));
            assert_eq!(score.factors.frequency, NEUTRAL_FACTOR);
            assert_eq!(score.factors.temporal, NEUTRAL_FACTOR);
            assert_eq!(score.factors.causal, NEUTRAL_FACTOR);
        }

        let best = scorer.score(&items[0], &context).await;
        assert_eq!(best.factors.structural, 100.0);
        assert!(best.reasoning.contains("Related to current files"));
    }

    #[test]
    fn test_structural_caps() {
        let context = ScoringContext {
            current_files: vec!["a.rs".into(), "b.rs".into(), "c.rs".into(), "d.rs".into()],
            ..ScoringContext::new(vec![])
        };
        let item = ContextItem::new("x", ContextType::Code, "")
            .with_files(["src/a.rs", "src/b.rs", "src/c.rs"]);
        assert_eq!(structural_score(&item, &context), 40.0);

        let item = ContextItem::new("y", ContextType::Code, "").with_files(["src/a.rs"]);
        assert!((structural_score(&item, &context) - 40.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_score_and_rank_orders_and_limits() {
        let scorer = RelevanceScorer::word_overlap();
        let context = ScoringContext::new(vec!["auth.ts".to_string()]);
        let now = context.reference_time;

        let items = vec![
            ContextItem::new("old", ContextType::Conversation, "lunch plans")
                .with_timestamp(now - Duration::days(60)),
            ContextItem::new("match", ContextType::Decision, "Use JWT for auth")
                .with_timestamp(now - Duration::days(2))
                .with_files(["auth.ts"]),
            ContextItem::new("mid", ContextType::Code, "misc").with_timestamp(now),
        ];

        let ranked = scorer.score_and_rank(items.clone(), &context, None).await;
        let ids: Vec<&str> = ranked.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["match", "mid", "old"]);
        assert!(ranked.windows(2).all(|w| w[0].relevance.score >= w[1].relevance.score));

        let limited = scorer.score_and_rank(items, &context, Some(1)).await;
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].item.id, "match");
    }

    #[test]
    fn test_reasoning_labels() {
        let quiet = ScoreFactors::default();
        assert_eq!(reasoning(55.0, &quiet), "Moderate relevance");
        assert_eq!(reasoning(10.0, &quiet), "Low relevance");

        let hot = ScoreFactors {
            recency: 100.0,
            semantic: 90.0,
            ..ScoreFactors::default()
        };
        assert_eq!(reasoning(60.0, &hot), "Recent; Semantically similar to current work");
    }

    #[tokio::test]
    async fn test_embedding_similarity_is_cached() {
        let (scorer, embedder) = embedding_scorer(false);
        let context = ScoringContext::new(vec!["a.rs".to_string()]);
        let item = ContextItem::new("1", ContextType::Code, "same text");

        let first = scorer.score(&item, &context).await;
        let second = scorer.score(&item, &context).await;
        assert_eq!(first.factors.semantic, 100.0);
        assert_eq!(second.factors.semantic, 100.0);
        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_back() {
        let (scorer, _) = embedding_scorer(true);
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let scorer = scorer.with_events(events);

        let context = ScoringContext::new(vec!["session handling".to_string()]);
        let item = ContextItem::new("1", ContextType::Code, "session handling");
        let score = scorer.score(&item, &context).await;

        assert_eq!(score.factors.semantic, 100.0);
        assert_eq!(rx.recv().await.unwrap().name(), "provider:error");
    }

    #[test]
    fn test_from_config_without_key_uses_word_overlap() {
        let scorer = RelevanceScorer::from_config(&AutopilotConfig::default());
        assert_eq!(scorer.similarity().name(), "word_overlap");
    }
}
