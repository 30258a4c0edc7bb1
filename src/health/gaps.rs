//! Coverage gap discovery
//!
//! Compares the project's source files against the files referenced by the
//! corpus, either through item metadata or by name in item content.

use crate::context::text::paths_match;
use crate::context::{ContextItem, HealthIssue, IssueCategory, IssueSeverity};
use crate::error::{ContextError, Result};
use crate::extractor::patterns::{in_ignored_dir, is_relevant_file, IGNORED_DIRS};
use glob::Pattern;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::path::Path;
use walkdir::WalkDir;

/// Entry points, configuration and route/controller/model files
static IMPORTANT_FILES: Lazy<Vec<Pattern>> = Lazy::new(|| {
    [
        "index.*", "main.*", "app.*", "server.*", "*config*", "*route*", "*controller*", "*model*",
    ]
    .iter()
    .filter_map(|p| Pattern::new(p).ok())
    .collect()
});

/// Directories with at least this many files are checked for coverage
const MIN_DIR_FILES: usize = 3;
const MIN_DIR_COVERAGE: f64 = 0.5;

/// Result of comparing project files with the corpus
#[derive(Debug, Clone, PartialEq)]
pub struct GapReport {
    pub total_files: usize,
    pub covered_files: usize,
    pub coverage_percent: f64,
    pub issues: Vec<HealthIssue>,
}

/// Relevant source files under `root` as `/`-separated relative paths
pub async fn discover_files(root: &Path) -> Result<Vec<String>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !entry
                        .file_name()
                        .to_str()
                        .map(|name| IGNORED_DIRS.contains(&name))
                        .unwrap_or(false)
            });

        walker
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file() && is_relevant_file(entry.path()))
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&root).ok()?;
                if in_ignored_dir(relative) {
                    return None;
                }
                Some(relative.to_string_lossy().replace('\\', "/"))
            })
            .collect()
    })
    .await
    .map_err(|e| ContextError::Io(std::io::Error::other(e)))
}

/// Whether any item references `file`
pub fn is_covered(file: &str, items: &[ContextItem]) -> bool {
    let name = file.rsplit('/').next().unwrap_or(file);
    items.iter().any(|item| {
        item.metadata.files.iter().any(|f| paths_match(f, file)) || item.content.contains(name)
    })
}

pub fn is_important(file: &str) -> bool {
    let lower = file.to_lowercase();
    let name = lower.rsplit('/').next().unwrap_or(&lower);
    IMPORTANT_FILES
        .iter()
        .any(|pattern| pattern.matches(name) || pattern.matches(&lower))
}

/// Uncovered important files and poorly covered directories
pub fn find_gaps(files: &[String], items: &[ContextItem]) -> GapReport {
    let mut issues = Vec::new();
    let mut directories: IndexMap<String, (usize, usize)> = IndexMap::new();
    let mut covered_files = 0;

    for file in files {
        let covered = is_covered(file, items);
        if covered {
            covered_files += 1;
        } else if is_important(file) {
            issues.push(HealthIssue {
                severity: IssueSeverity::Warning,
                category: IssueCategory::Gap,
                description: format!("Important file {} has no context", file),
                affected_ids: vec![],
                suggestion: format!("Document the role of {} or record decisions about it", file),
            });
        }

        let dir = file.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(".");
        let entry = directories.entry(dir.to_string()).or_insert((0, 0));
        entry.0 += 1;
        if covered {
            entry.1 += 1;
        }
    }

    for (dir, (total, covered)) in &directories {
        if *total >= MIN_DIR_FILES && (*covered as f64 / *total as f64) < MIN_DIR_COVERAGE {
            issues.push(HealthIssue {
                severity: IssueSeverity::Info,
                category: IssueCategory::Gap,
                description: format!(
                    "Directory {} has low coverage ({}/{} files)",
                    dir, covered, total
                ),
                affected_ids: vec![],
                suggestion: format!("Add context for the files in {}", dir),
            });
        }
    }

    let coverage_percent = if files.is_empty() {
        100.0
    } else {
        covered_files as f64 / files.len() as f64 * 100.0
    };

    GapReport {
        total_files: files.len(),
        covered_files,
        coverage_percent,
        issues,
    }
}
