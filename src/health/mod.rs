//! Corpus health assessment
//!
//! Checks a set of context items for staleness, conflicting decisions,
//! coverage gaps against the project tree and redundancy, and folds the
//! findings into a single 0-100 score with recommendations.

pub mod gaps;

use crate::config::AutopilotConfig;
use crate::context::text::{file_overlap, paths_match, set_overlap, word_overlap};
use crate::context::{
    ContextHealth, ContextItem, ContextType, HealthIssue, HealthMetrics, IssueCategory,
    IssueSeverity,
};
use crate::metrics::METRICS;
use crate::scorer::recency_score;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Items at most this old count as fresh
const FRESH_DAYS: f64 = 7.0;
/// Share of stale items above which staleness is reported
const STALE_RATIO_WARNING: f64 = 0.2;

const CRITICAL_PENALTY: f64 = 15.0;
const WARNING_PENALTY: f64 = 5.0;
const STALENESS_PENALTY: f64 = 20.0;

const REDUNDANT_TEXT: f64 = 0.8;
const REDUNDANT_FILES: f64 = 0.7;
const REDUNDANT_KEYWORDS: f64 = 0.6;
const REDUNDANT_WARNING_SIZE: usize = 4;

/// A positive/negative wording pair; the negative form is removed before the
/// positive one is searched so "should not" never reads as "should".
struct Polarity {
    positive: Regex,
    negative: Regex,
}

static POLARITIES: Lazy<Vec<Polarity>> = Lazy::new(|| {
    [
        (r"(?i)\buse[sd]?\b|\busing\b", r"(?i)\bavoid(?:s|ed|ing)?\b"),
        (r"(?i)\bshould\b", r"(?i)\bshould\s+not\b|\bshouldn'?t\b"),
        (r"(?i)\benabl(?:e|es|ed|ing)\b", r"(?i)\bdisabl(?:e|es|ed|ing)\b"),
        (r"(?i)\badd(?:s|ed|ing)?\b", r"(?i)\bremov(?:e|es|ed|ing)\b"),
    ]
    .iter()
    .filter_map(|(positive, negative)| {
        Some(Polarity {
            positive: Regex::new(positive).ok()?,
            negative: Regex::new(negative).ok()?,
        })
    })
    .collect()
});

impl Polarity {
    fn signs(&self, text: &str) -> (bool, bool) {
        let negative = self.negative.is_match(text);
        let stripped = self.negative.replace_all(text, " ");
        (self.positive.is_match(&stripped), negative)
    }
}

/// Health monitor
pub struct HealthMonitor {
    stale_after_days: i64,
    root: Option<PathBuf>,
}

impl HealthMonitor {
    pub fn new(stale_after_days: i64) -> Self {
        Self {
            stale_after_days,
            root: None,
        }
    }

    /// Check coverage against the files under `root`
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn from_config(config: &AutopilotConfig) -> Self {
        Self::new(config.health.stale_after_days).with_root(config.workspace_root.clone())
    }

    /// Assess a corpus. An empty corpus is perfectly healthy.
    pub async fn assess(&self, items: &[ContextItem]) -> ContextHealth {
        if items.is_empty() {
            METRICS.record_health(100.0);
            return ContextHealth {
                score: 100.0,
                issues: vec![],
                metrics: HealthMetrics::default(),
                recommendations: vec![],
            };
        }

        let now = Utc::now();
        let ages: Vec<f64> = items.iter().map(|item| item.age_days(now)).collect();
        let stale_ids: Vec<String> = items
            .iter()
            .zip(&ages)
            .filter(|(_, age)| **age > self.stale_after_days as f64)
            .map(|(item, _)| item.id.clone())
            .collect();
        let fresh_items = ages.iter().filter(|age| **age <= FRESH_DAYS).count();
        let stale_ratio = stale_ids.len() as f64 / items.len() as f64;

        let mut issues = Vec::new();
        if stale_ratio > STALE_RATIO_WARNING {
            issues.push(HealthIssue {
                severity: IssueSeverity::Warning,
                category: IssueCategory::Staleness,
                description: format!(
                    "{} of {} items are older than {} days",
                    stale_ids.len(),
                    items.len(),
                    self.stale_after_days
                ),
                affected_ids: stale_ids.clone(),
                suggestion: "Review stale items and refresh or archive them".to_string(),
            });
        }

        let conflicts = find_conflicts(items);
        let conflict_count = conflicts.len();
        issues.extend(conflicts);

        let coverage_percent = match &self.root {
            Some(root) => match gaps::discover_files(root).await {
                Ok(files) => {
                    let report = gaps::find_gaps(&files, items);
                    issues.extend(report.issues);
                    report.coverage_percent
                }
                Err(e) => {
                    warn!("Gap analysis skipped for {}: {}", root.display(), e);
                    100.0
                }
            },
            None => 100.0,
        };

        issues.extend(find_redundancy(items));

        let critical = issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Critical)
            .count();
        let warnings = issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .count();
        let score = (100.0
            - CRITICAL_PENALTY * critical as f64
            - WARNING_PENALTY * warnings as f64
            - stale_ratio * STALENESS_PENALTY)
            .clamp(0.0, 100.0);

        let average_relevance = ages.iter().map(|age| recency_score(*age)).sum::<f64>() / ages.len() as f64;
        let recommendations = recommendations(&issues);

        debug!(
            "Health {:.1}: {} issues ({} critical, {} warnings)",
            score,
            issues.len(),
            critical,
            warnings
        );
        METRICS.record_health(score);

        ContextHealth {
            score,
            issues,
            metrics: HealthMetrics {
                total_items: items.len(),
                fresh_items,
                stale_items: stale_ids.len(),
                conflict_count,
                coverage_percent,
                average_relevance,
            },
            recommendations,
        }
    }
}

/// Decision pairs that share a file and use opposite wording
pub fn find_conflicts(items: &[ContextItem]) -> Vec<HealthIssue> {
    let decisions: Vec<&ContextItem> = items
        .iter()
        .filter(|item| item.item_type == ContextType::Decision)
        .collect();

    let mut issues = Vec::new();
    for (i, a) in decisions.iter().enumerate() {
        for b in &decisions[i + 1..] {
            let shared: Vec<&String> = a
                .metadata
                .files
                .iter()
                .filter(|fa| b.metadata.files.iter().any(|fb| paths_match(fa, fb)))
                .collect();
            if shared.is_empty() || !opposite_polarity(&a.content, &b.content) {
                continue;
            }
            issues.push(HealthIssue {
                severity: IssueSeverity::Critical,
                category: IssueCategory::Conflict,
                description: format!(
                    "Decisions {} and {} contradict each other on {}",
                    a.id, b.id, shared[0]
                ),
                affected_ids: vec![a.id.clone(), b.id.clone()],
                suggestion: "Keep the current decision and mark the other superseded".to_string(),
            });
        }
    }
    issues
}

fn opposite_polarity(a: &str, b: &str) -> bool {
    POLARITIES.iter().any(|polarity| {
        let (a_pos, a_neg) = polarity.signs(a);
        let (b_pos, b_neg) = polarity.signs(b);
        (a_pos && !a_neg && b_neg && !b_pos) || (a_neg && !a_pos && b_pos && !b_neg)
    })
}

fn redundant(a: &ContextItem, b: &ContextItem) -> bool {
    a.item_type == b.item_type
        && (word_overlap(&a.content, &b.content) > REDUNDANT_TEXT
            || file_overlap(&a.metadata.files, &b.metadata.files) > REDUNDANT_FILES
            || set_overlap(&a.metadata.keywords, &b.metadata.keywords) > REDUNDANT_KEYWORDS)
}

/// Groups of same-type items that say the same thing
pub fn find_redundancy(items: &[ContextItem]) -> Vec<HealthIssue> {
    let mut grouped = vec![false; items.len()];
    let mut issues = Vec::new();

    for i in 0..items.len() {
        if grouped[i] {
            continue;
        }
        let mut group = vec![i];
        for j in (i + 1)..items.len() {
            if !grouped[j] && redundant(&items[i], &items[j]) {
                group.push(j);
            }
        }
        if group.len() < 2 {
            continue;
        }
        for &k in &group {
            grouped[k] = true;
        }

        let severity = if group.len() >= REDUNDANT_WARNING_SIZE {
            IssueSeverity::Warning
        } else {
            IssueSeverity::Info
        };
        issues.push(HealthIssue {
            severity,
            category: IssueCategory::Redundancy,
            description: format!(
                "{} {} items overlap heavily",
                group.len(),
                items[i].item_type
            ),
            affected_ids: group.iter().map(|&k| items[k].id.clone()).collect(),
            suggestion: "Merge the overlapping items into one".to_string(),
        });
    }
    issues
}

fn recommendations(issues: &[HealthIssue]) -> Vec<String> {
    let has = |category: IssueCategory| issues.iter().any(|i| i.category == category);
    let mut out = Vec::new();
    if has(IssueCategory::Conflict) {
        out.push("Resolve conflicting decisions before relying on them".to_string());
    }
    if has(IssueCategory::Staleness) {
        out.push("Refresh or archive context older than the staleness window".to_string());
    }
    if has(IssueCategory::Gap) {
        out.push("Add documentation or decisions for uncovered files".to_string());
    }
    if has(IssueCategory::Redundancy) {
        out.push("Consolidate redundant context to save tokens".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn decision(id: &str, content: &str, file: &str) -> ContextItem {
        ContextItem::new(id, ContextType::Decision, content).with_files([file])
    }

    #[tokio::test]
    async fn test_empty_corpus_is_healthy() {
        let health = HealthMonitor::new(30).assess(&[]).await;
        assert_eq!(health.score, 100.0);
        assert!(health.issues.is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_decisions_are_critical() {
        let items = vec![
            decision("d1", "Enable caching for config lookups", "src/config.ts"),
            decision("d2", "Disable caching, config must be read fresh", "config.ts"),
        ];
        let health = HealthMonitor::new(30).assess(&items).await;

        let conflicts: Vec<_> = health.issues_in(IssueCategory::Conflict).collect();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, IssueSeverity::Critical);
        assert_eq!(conflicts[0].affected_ids, vec!["d1", "d2"]);
        assert_eq!(health.metrics.conflict_count, 1);
        assert!(health.score <= 85.0);
        assert!(health.recommendations[0].contains("conflicting"));
    }

    #[test]
    fn test_should_not_is_negative() {
        assert!(opposite_polarity("We should cache tokens", "We should not cache tokens"));
        assert!(!opposite_polarity("We should not cache", "They shouldn't cache either"));
        assert!(!opposite_polarity("Use JWT for auth", "Use refresh tokens with JWT"));
    }

    #[test]
    fn test_unrelated_files_never_conflict() {
        let items = vec![
            decision("d1", "Enable caching", "a.ts"),
            decision("d2", "Disable caching", "b.ts"),
        ];
        assert!(find_conflicts(&items).is_empty());
    }

    #[tokio::test]
    async fn test_redundant_decisions_grouped() {
        let items = vec![
            decision("d1", "Use JWT for auth", "auth.ts"),
            decision("d2", "Use refresh tokens with JWT", "src/auth.ts"),
            ContextItem::new("c1", ContextType::Conversation, "lunch plans"),
        ];
        let health = HealthMonitor::new(30).assess(&items).await;

        let groups: Vec<_> = health.issues_in(IssueCategory::Redundancy).collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].affected_ids, vec!["d1", "d2"]);
        assert_eq!(groups[0].severity, IssueSeverity::Info);
        assert_eq!(health.issues_in(IssueCategory::Conflict).count(), 0);
    }

    #[test]
    fn test_large_redundant_group_warns() {
        let items: Vec<ContextItem> = (0..4)
            .map(|i| decision(&format!("d{}", i), "Use JWT", "auth.ts"))
            .collect();
        let issues = find_redundancy(&items);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, IssueSeverity::Warning);
    }

    #[tokio::test]
    async fn test_staleness_and_bounds() {
        let old = Utc::now() - Duration::days(120);
        let items: Vec<ContextItem> = (0..10)
            .map(|i| {
                ContextItem::new(format!("i{}", i), ContextType::Code, format!("module{}", i))
                    .with_timestamp(old)
                    .with_files([format!("f{}.rs", i)])
            })
            .collect();
        let health = HealthMonitor::new(30).assess(&items).await;

        assert!((0.0..=100.0).contains(&health.score));
        assert_eq!(health.metrics.stale_items, 10);
        assert_eq!(health.metrics.fresh_items, 0);
        assert_eq!(health.metrics.average_relevance, 20.0);
        // one staleness warning plus full stale penalty
        assert_eq!(health.score, 75.0);
    }

    #[tokio::test]
    async fn test_gap_flags_uncovered_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/index.ts"), "export {}").unwrap();
        std::fs::write(dir.path().join("src/utils.ts"), "export {}").unwrap();

        let items = vec![ContextItem::new("u", ContextType::Documentation, "helpers")
            .with_files(["src/utils.ts"])];
        let health = HealthMonitor::new(30).with_root(dir.path()).assess(&items).await;

        let gaps: Vec<_> = health.issues_in(IssueCategory::Gap).collect();
        assert_eq!(gaps.len(), 1);
        assert!(gaps[0].description.contains("src/index.ts"));
        assert_eq!(health.metrics.coverage_percent, 50.0);
        assert_eq!(health.score, 95.0);
    }
}
