//! Shared context model and provider plumbing
//!
//! This module holds the data types that flow between the extractor, scorer,
//! compressor and health monitor, together with token accounting, text
//! similarity helpers, bounded provider caches and the optional embedding and
//! summarization providers.

pub mod cache;
pub mod embedder;
pub mod models;
pub mod summarizer;
pub mod text;
pub mod token_budget;
pub mod token_estimator;

pub use cache::{EmbeddingCache, ProviderCache, SummaryCache};
pub use embedder::{Embedder, HttpEmbedder};
pub use models::{
    total_tokens, CompressionResult, CompressionStrategy, ContextHealth, ContextItem, ContextType,
    ExtractedContext, ExtractedType, HealthIssue, HealthMetrics, IssueCategory, IssueSeverity,
    ItemMetadata, RelevanceScore, ScoreFactors, ScoringContext, StrategyName,
};
pub use summarizer::{ExtractiveSummarizer, LlmSummarizer, Summarizer};
pub use token_budget::{BudgetError, TokenBudget};
pub use token_estimator::{estimate_tokens, CharRatioEstimator, TokenEstimator};
