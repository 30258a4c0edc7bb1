//! Budget-constrained context compression
//!
//! Pipeline: relevance filter, summarization of verbose items, merging of
//! similar items, then a final trim of the lowest-scoring items that are not
//! preserved. No stage may grow the token count, so the compressed set never
//! costs more than the input.

use crate::autopilot::events::{AutopilotEvent, EventBus};
use crate::config::AutopilotConfig;
use crate::context::text::{file_overlap, sentences, word_overlap};
use crate::context::{
    estimate_tokens, total_tokens, CompressionResult, CompressionStrategy, ContextItem,
    ExtractiveSummarizer, LlmSummarizer, RelevanceScore, SummaryCache, Summarizer, TokenBudget,
};
use crate::error::ProviderError;
use crate::metrics::METRICS;
use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Items above this estimate are summarized
const SUMMARIZE_ABOVE_TOKENS: usize = 500;
/// Summaries keep about this share of the original tokens
const SUMMARY_RATIO: f64 = 0.3;
/// Merged content longer than this is summarized again
const MERGED_MAX_CHARS: usize = 800;
const FILE_OVERLAP_THRESHOLD: f64 = 0.6;
const WORD_OVERLAP_THRESHOLD: f64 = 0.7;

/// Context compressor
pub struct ContextCompressor {
    summarizer: Option<Arc<dyn Summarizer>>,
    fallback: ExtractiveSummarizer,
    cache: SummaryCache,
    events: Option<EventBus>,
}

impl ContextCompressor {
    pub fn new(summarizer: Option<Arc<dyn Summarizer>>, cache: SummaryCache) -> Self {
        Self {
            summarizer,
            fallback: ExtractiveSummarizer,
            cache,
            events: None,
        }
    }

    /// Use the generative summarizer when credentials are configured
    pub fn from_config(config: &AutopilotConfig) -> Self {
        let summarizer: Option<Arc<dyn Summarizer>> =
            match LlmSummarizer::new(config.summarizer.clone()) {
                Ok(summarizer) => Some(Arc::new(summarizer)),
                Err(ProviderError::NotConfigured) => None,
                Err(e) => {
                    warn!("Summarizer unavailable, using extractive fallback: {}", e);
                    None
                }
            };
        Self::new(
            summarizer,
            SummaryCache::new(config.cache.capacity, config.cache_ttl()),
        )
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Compress `items` to fit `token_budget`.
    ///
    /// Items without an entry in `scores` count as score 0.
    pub async fn compress(
        &self,
        items: &[ContextItem],
        scores: &[RelevanceScore],
        strategy: &CompressionStrategy,
        token_budget: usize,
    ) -> CompressionResult {
        let tokens_before = total_tokens(items);
        let budget = TokenBudget::new(token_budget).ok();
        if budget.as_ref().map_or(false, |b| b.fits(tokens_before)) {
            debug!("{} tokens within budget of {}", tokens_before, token_budget);
            return self.finish(items, items.to_vec(), strategy, token_budget);
        }
        if let Some(budget) = &budget {
            debug!(
                "Compressing {} items: {} tokens over budget",
                items.len(),
                budget.calculate_shrinkage(tokens_before)
            );
        }

        let mut relevance: HashMap<String, f64> = scores
            .iter()
            .map(|s| (s.item_id.clone(), s.score))
            .collect();

        let threshold = strategy.relevance_threshold();
        let filtered: Vec<ContextItem> = items
            .iter()
            .filter(|item| {
                strategy.preserves(item.item_type)
                    || relevance.get(&item.id).copied().unwrap_or(0.0) >= threshold
            })
            .cloned()
            .collect();
        debug!(
            "Relevance filter ({}) kept {}/{} items",
            strategy.name.as_str(),
            filtered.len(),
            items.len()
        );

        let mut summarized = Vec::with_capacity(filtered.len());
        for item in filtered {
            if item.token_estimate > SUMMARIZE_ABOVE_TOKENS {
                summarized.push(self.summarize_item(item).await);
            } else {
                summarized.push(item);
            }
        }

        let mut merged = self.merge_similar(summarized, &mut relevance).await;

        if let Some(budget) = &budget {
            trim_to_budget(&mut merged, &relevance, strategy, budget);
        }

        self.finish(items, merged, strategy, token_budget)
    }

    fn finish(
        &self,
        original: &[ContextItem],
        compressed: Vec<ContextItem>,
        strategy: &CompressionStrategy,
        token_budget: usize,
    ) -> CompressionResult {
        let tokens_before = total_tokens(original);
        let tokens_after = total_tokens(&compressed);
        let tokens_removed = tokens_before.saturating_sub(tokens_after);
        let items_removed = original.len().saturating_sub(compressed.len());
        let compression_ratio = if tokens_before == 0 {
            1.0
        } else {
            tokens_after as f64 / tokens_before as f64
        };

        let summary = if tokens_removed == 0 && items_removed == 0 {
            format!(
                "No compression needed: {} items, {} tokens (budget {})",
                original.len(),
                tokens_before,
                token_budget
            )
        } else {
            format!(
                "Compressed {} items to {} ({} -> {} tokens, {:.0}% reduction, {} strategy)",
                original.len(),
                compressed.len(),
                tokens_before,
                tokens_after,
                (1.0 - compression_ratio) * 100.0,
                strategy.name.as_str()
            )
        };

        if tokens_removed > 0 || items_removed > 0 {
            info!("{}", summary);
            METRICS.record_compression(tokens_removed);
        }
        if let Some(events) = &self.events {
            events.emit(AutopilotEvent::CompressionCompleted {
                items_before: original.len(),
                items_after: compressed.len(),
                tokens_before,
                tokens_after,
                summary: summary.clone(),
            });
        }

        CompressionResult {
            original: original.to_vec(),
            compressed,
            tokens_removed,
            items_removed,
            compression_ratio,
            summary,
        }
    }

    /// Summarize one verbose item; the original is kept if nothing is saved
    async fn summarize_item(&self, item: ContextItem) -> ContextItem {
        let target_tokens = ((item.token_estimate as f64 * SUMMARY_RATIO).round() as usize).max(1);
        let summary = self.summarize_text(&item.content, target_tokens).await;
        let summary_tokens = estimate_tokens(&summary);

        if summary.is_empty() || summary_tokens >= item.token_estimate {
            return item;
        }

        debug!(
            "Summarized {}: {} -> {} tokens",
            item.id, item.token_estimate, summary_tokens
        );
        METRICS.summarizations.inc();

        let mut metadata = item.metadata.clone();
        metadata.summarized = true;
        metadata.original_tokens = Some(metadata.original_tokens.unwrap_or(item.token_estimate));

        ContextItem::new(item.id.clone(), item.item_type, summary)
            .with_timestamp(item.timestamp)
            .with_metadata(metadata)
    }

    /// Cached summary of `text` in about `target_tokens` tokens
    async fn summarize_text(&self, text: &str, target_tokens: usize) -> String {
        let target = target_tokens.to_string();
        let key = SummaryCache::key(&[text, &target]);
        if let Some(cached) = self.cache.get(&key).await {
            return cached;
        }

        let summary = match &self.summarizer {
            Some(summarizer) => match summarizer.summarize(text, target_tokens).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!("Summarization failed, using extractive fallback: {}", e);
                    METRICS.record_fallback("summarizer");
                    if let Some(events) = &self.events {
                        events.emit(AutopilotEvent::ProviderError {
                            provider: "summarizer".to_string(),
                            error: e.to_string(),
                        });
                    }
                    self.fallback.summarize_text(text, target_tokens * 4)
                }
            },
            None => self.fallback.summarize_text(text, target_tokens * 4),
        };

        self.cache.insert(key, summary.clone()).await;
        summary
    }

    /// Greedily merge same-type items with overlapping files or wording
    async fn merge_similar(
        &self,
        items: Vec<ContextItem>,
        relevance: &mut HashMap<String, f64>,
    ) -> Vec<ContextItem> {
        let mut assigned = vec![false; items.len()];
        let mut output = Vec::with_capacity(items.len());

        for i in 0..items.len() {
            if assigned[i] {
                continue;
            }
            assigned[i] = true;

            let mut group = vec![i];
            for j in (i + 1)..items.len() {
                if !assigned[j] && similar(&items[i], &items[j]) {
                    assigned[j] = true;
                    group.push(j);
                }
            }

            if group.len() == 1 {
                output.push(items[i].clone());
                continue;
            }

            let members: Vec<&ContextItem> = group.iter().map(|&k| &items[k]).collect();
            match self.merge_group(&members, relevance).await {
                Some(merged) => output.push(merged),
                None => output.extend(members.into_iter().cloned()),
            }
        }

        output
    }

    async fn merge_group(
        &self,
        members: &[&ContextItem],
        relevance: &mut HashMap<String, f64>,
    ) -> Option<ContextItem> {
        let mut unique: IndexSet<String> = IndexSet::new();
        let mut seen: IndexSet<String> = IndexSet::new();
        for member in members {
            for sentence in sentences(&member.content) {
                if seen.insert(sentence.to_lowercase()) {
                    unique.insert(sentence.to_string());
                }
            }
        }
        let mut content = unique.into_iter().collect::<Vec<_>>().join(" ");
        let mut summarized = members.iter().any(|m| m.metadata.summarized);
        if content.chars().count() > MERGED_MAX_CHARS {
            content = self.summarize_text(&content, MERGED_MAX_CHARS / 4).await;
            summarized = true;
        }

        let member_tokens: usize = members.iter().map(|m| m.token_estimate).sum();
        if content.is_empty() || estimate_tokens(&content) > member_tokens {
            return None;
        }

        let ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
        let score = members
            .iter()
            .map(|m| relevance.get(&m.id).copied().unwrap_or(0.0))
            .fold(0.0, f64::max);

        let mut files = IndexSet::new();
        let mut functions = IndexSet::new();
        let mut keywords = IndexSet::new();
        for member in members {
            files.extend(member.metadata.files.iter().cloned());
            functions.extend(member.metadata.functions.iter().cloned());
            keywords.extend(member.metadata.keywords.iter().cloned());
        }

        let first = members[0];
        let mut metadata = first.metadata.clone();
        metadata.files = files.into_iter().collect();
        metadata.functions = functions.into_iter().collect();
        metadata.keywords = keywords.into_iter().collect();
        metadata.merged = true;
        metadata.summarized = summarized;
        metadata.merged_from = ids.clone();
        metadata.relevance = Some(score);
        metadata.original_tokens = Some(
            members
                .iter()
                .map(|m| m.metadata.original_tokens.unwrap_or(m.token_estimate))
                .sum(),
        );

        let timestamp = members.iter().map(|m| m.timestamp).max().unwrap_or(first.timestamp);
        let id = format!("merged:{}", ids.join("+"));
        relevance.insert(id.clone(), score);
        debug!("Merged {} items into {}", members.len(), id);

        Some(
            ContextItem::new(id, first.item_type, content)
                .with_timestamp(timestamp)
                .with_metadata(metadata),
        )
    }
}

fn similar(a: &ContextItem, b: &ContextItem) -> bool {
    a.item_type == b.item_type
        && (file_overlap(&a.metadata.files, &b.metadata.files) > FILE_OVERLAP_THRESHOLD
            || word_overlap(&a.content, &b.content) > WORD_OVERLAP_THRESHOLD)
}

/// Drop the lowest-scoring non-preserved items until the budget holds
fn trim_to_budget(
    items: &mut Vec<ContextItem>,
    relevance: &HashMap<String, f64>,
    strategy: &CompressionStrategy,
    budget: &TokenBudget,
) {
    while budget.check_budget(total_tokens(items)).is_err() {
        let lowest = items
            .iter()
            .enumerate()
            .filter(|(_, item)| !strategy.preserves(item.item_type))
            .min_by(|(_, a), (_, b)| {
                let sa = relevance.get(&a.id).copied().unwrap_or(0.0);
                let sb = relevance.get(&b.id).copied().unwrap_or(0.0);
                sa.partial_cmp(&sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.timestamp.cmp(&b.timestamp))
            })
            .map(|(index, _)| index);

        match lowest {
            Some(index) => {
                let removed = items.remove(index);
                debug!("Budget trim dropped {} ({} tokens)", removed.id, removed.token_estimate);
            }
            None => break,
        }
    }
}
