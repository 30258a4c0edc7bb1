//! Data models for context management

use super::text::content_hash;
use super::token_estimator::estimate_tokens;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of project knowledge an item carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Decision,
    Conversation,
    Code,
    File,
    Documentation,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Decision => "decision",
            ContextType::Conversation => "conversation",
            ContextType::Code => "code",
            ContextType::File => "file",
            ContextType::Documentation => "documentation",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to a context item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Set on items produced by summarization
    #[serde(default)]
    pub summarized: bool,
    /// Set on items produced by merging a similarity group
    #[serde(default)]
    pub merged: bool,
    /// Token estimate of the source before summarization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_tokens: Option<usize>,
    /// Ids of the items a merged item was built from
    #[serde(default)]
    pub merged_from: Vec<String>,
    /// Relevance carried by a derived item (max of a merged group)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

/// A unit of project knowledge eligible for inclusion in a model prompt.
///
/// Items are never edited after creation; compression derives new items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: ContextType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: ItemMetadata,
    pub token_estimate: usize,
}

impl ContextItem {
    /// Create a new item timestamped now
    pub fn new(id: impl Into<String>, item_type: ContextType, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: id.into(),
            item_type,
            token_estimate: estimate_tokens(&content),
            content,
            timestamp: Utc::now(),
            metadata: ItemMetadata::default(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.functions = functions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: ItemMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Age in fractional days relative to `now`; future timestamps count as zero
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let secs = (now - self.timestamp).num_seconds().max(0);
        secs as f64 / 86_400.0
    }
}

/// Kind of signal an extraction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractedType {
    CodeChange,
    Conversation,
    Decision,
    Documentation,
}

impl ExtractedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractedType::CodeChange => "code_change",
            ExtractedType::Conversation => "conversation",
            ExtractedType::Decision => "decision",
            ExtractedType::Documentation => "documentation",
        }
    }

    /// Item type an extraction becomes once stored
    pub fn item_type(&self) -> ContextType {
        match self {
            ExtractedType::CodeChange => ContextType::Code,
            ExtractedType::Conversation => ContextType::Conversation,
            ExtractedType::Decision => ContextType::Decision,
            ExtractedType::Documentation => ContextType::Documentation,
        }
    }
}

/// Extractor output, before it becomes a [`ContextItem`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContext {
    #[serde(rename = "type")]
    pub kind: ExtractedType,
    /// File path, `commit:<message head>` or `conversation`
    pub source: String,
    pub content: String,
    /// Heuristic confidence 0-100, fixed per extraction path
    pub confidence: u8,
    pub metadata: ItemMetadata,
}

impl ExtractedContext {
    pub fn new(
        kind: ExtractedType,
        source: impl Into<String>,
        content: impl Into<String>,
        confidence: u8,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            content: content.into(),
            confidence: confidence.min(100),
            metadata: ItemMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: ItemMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Stable id derived from source, kind and content.
    ///
    /// Re-extracting unchanged content yields the same id, so stores can
    /// replace instead of accumulating copies.
    pub fn stable_id(&self) -> String {
        let digest = content_hash(&[&self.source, self.kind.as_str(), &self.content]);
        format!("{}-{}", self.kind.item_type(), &digest[..16])
    }

    /// Convert into a stored item keyed by [`Self::stable_id`]
    pub fn into_item(self) -> ContextItem {
        let id = self.stable_id();
        ContextItem::new(id, self.kind.item_type(), self.content).with_metadata(self.metadata)
    }
}

/// Query description the scorer ranks items against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringContext {
    pub current_files: Vec<String>,
    pub current_function: Option<String>,
    pub recent_conversation: Vec<String>,
    pub active_keywords: Vec<String>,
    pub reference_time: DateTime<Utc>,
    pub task_description: Option<String>,
}

impl ScoringContext {
    pub fn new(current_files: Vec<String>) -> Self {
        Self {
            current_files,
            current_function: None,
            recent_conversation: Vec::new(),
            active_keywords: Vec::new(),
            reference_time: Utc::now(),
            task_description: None,
        }
    }

    /// Concatenated query text used for semantic similarity
    pub fn query_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(self.current_files.iter().map(String::as_str));
        parts.extend(self.recent_conversation.iter().map(String::as_str));
        parts.extend(self.active_keywords.iter().map(String::as_str));
        if let Some(task) = &self.task_description {
            parts.push(task);
        }
        parts.join(" ")
    }
}

/// The six named scoring factors, each 0-100
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub recency: f64,
    pub semantic: f64,
    pub frequency: f64,
    pub structural: f64,
    pub temporal: f64,
    pub causal: f64,
}

/// Relevance of one item for one query. Recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub item_id: String,
    pub score: f64,
    pub factors: ScoreFactors,
    pub reasoning: String,
}

/// Named compression policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    Aggressive,
    Balanced,
    Conservative,
}

impl StrategyName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyName::Aggressive => "aggressive",
            StrategyName::Balanced => "balanced",
            StrategyName::Conservative => "conservative",
        }
    }
}

/// Compression policy: filter threshold, target reduction and preserved types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionStrategy {
    pub name: StrategyName,
    /// Fraction of tokens the strategy aims to remove
    pub target_reduction: f64,
    pub preserve_types: Vec<ContextType>,
}

impl CompressionStrategy {
    pub fn aggressive(preserve_types: Vec<ContextType>) -> Self {
        Self {
            name: StrategyName::Aggressive,
            target_reduction: 0.7,
            preserve_types,
        }
    }

    pub fn balanced(preserve_types: Vec<ContextType>) -> Self {
        Self {
            name: StrategyName::Balanced,
            target_reduction: 0.5,
            preserve_types,
        }
    }

    pub fn conservative(preserve_types: Vec<ContextType>) -> Self {
        Self {
            name: StrategyName::Conservative,
            target_reduction: 0.3,
            preserve_types,
        }
    }

    /// Minimum relevance score an item needs to survive the filter stage
    pub fn relevance_threshold(&self) -> f64 {
        match self.name {
            StrategyName::Aggressive => 60.0,
            StrategyName::Balanced => 40.0,
            StrategyName::Conservative => 20.0,
        }
    }

    pub fn preserves(&self, item_type: ContextType) -> bool {
        self.preserve_types.contains(&item_type)
    }
}

/// Outcome of a compression run. Recomputed on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionResult {
    pub original: Vec<ContextItem>,
    pub compressed: Vec<ContextItem>,
    pub tokens_removed: usize,
    pub items_removed: usize,
    /// Compressed tokens over original tokens; 1.0 when nothing changed
    pub compression_ratio: f64,
    pub summary: String,
}

impl CompressionResult {
    pub fn original_tokens(&self) -> usize {
        total_tokens(&self.original)
    }

    pub fn compressed_tokens(&self) -> usize {
        total_tokens(&self.compressed)
    }
}

/// Sum of token estimates
pub fn total_tokens(items: &[ContextItem]) -> usize {
    items.iter().map(|item| item.token_estimate).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Staleness,
    Conflict,
    Gap,
    Redundancy,
}

/// One finding of a health assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthIssue {
    pub severity: IssueSeverity,
    pub category: IssueCategory,
    pub description: String,
    pub affected_ids: Vec<String>,
    pub suggestion: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub total_items: usize,
    pub fresh_items: usize,
    pub stale_items: usize,
    pub conflict_count: usize,
    /// Percentage of discovered project files referenced by some item
    pub coverage_percent: f64,
    pub average_relevance: f64,
}

/// Aggregate quality report for a corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextHealth {
    pub score: f64,
    pub issues: Vec<HealthIssue>,
    pub metrics: HealthMetrics,
    pub recommendations: Vec<String>,
}

impl ContextHealth {
    pub fn issues_in(&self, category: IssueCategory) -> impl Iterator<Item = &HealthIssue> {
        self.issues.iter().filter(move |issue| issue.category == category)
    }
}
