//! Automatic context extraction
//!
//! Turns file contents, version-control commits and conversation transcripts
//! into [`ExtractedContext`] records, and keeps them current through a
//! debounced project watcher. Every per-file and per-commit failure is
//! published on the [`EventBus`] and never aborts a scan or the watcher.

pub mod patterns;
pub mod watcher;

pub use watcher::ProjectWatcher;

use crate::autopilot::events::{AutopilotEvent, EventBus};
use crate::config::AutopilotConfig;
use crate::context::{ExtractedContext, ExtractedType, ItemMetadata};
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;
use notify::RecursiveMode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Confidence assigned per extraction path
const COMMIT_DECISION_CONFIDENCE: u8 = 80;
const COMMIT_FUNCTIONS_CONFIDENCE: u8 = 70;
const COMMIT_FILES_CONFIDENCE: u8 = 50;
const COMMIT_PATTERNS_CONFIDENCE: u8 = 60;
const CONVERSATION_DECISION_CONFIDENCE: u8 = 75;
const CONVERSATION_REFERENCE_CONFIDENCE: u8 = 60;
const FILE_DOC_CONFIDENCE: u8 = 70;
const FILE_PATTERN_CONFIDENCE: u8 = 50;

/// Extractor settings
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Files larger than this are skipped before extraction
    pub max_file_bytes: u64,
    /// Quiet period before a changed path is re-extracted
    pub debounce: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            debounce: Duration::from_millis(300),
        }
    }
}

impl From<&AutopilotConfig> for ExtractorConfig {
    fn from(config: &AutopilotConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
            debounce: config.debounce(),
        }
    }
}

/// Heuristic extractor for files, commits and conversations
pub struct AutoExtractor {
    config: ExtractorConfig,
    events: EventBus,
}

impl AutoExtractor {
    pub fn new(config: ExtractorConfig, events: EventBus) -> Self {
        Self { config, events }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Extract decisions, changed functions and code idioms from a commit
    pub fn extract_from_commit(
        &self,
        message: &str,
        changed_files: &[String],
        diff: &str,
    ) -> Vec<ExtractedContext> {
        let headline = message.lines().next().unwrap_or_default().trim();
        let source = format!("commit:{}", headline.chars().take(72).collect::<String>());
        let mut contexts = Vec::new();

        if patterns::is_decision_commit(message) {
            let metadata = ItemMetadata {
                files: changed_files.to_vec(),
                keywords: patterns::decision_keywords(message),
                ..ItemMetadata::default()
            };
            contexts.push(
                ExtractedContext::new(
                    ExtractedType::Decision,
                    &source,
                    message.trim(),
                    COMMIT_DECISION_CONFIDENCE,
                )
                .with_metadata(metadata),
            );
        }

        let functions = patterns::changed_functions(diff);
        if !functions.is_empty() {
            let content = format!(
                "Changed functions: {} (files: {})",
                functions.join(", "),
                changed_files.join(", ")
            );
            let metadata = ItemMetadata {
                files: changed_files.to_vec(),
                functions,
                ..ItemMetadata::default()
            };
            contexts.push(
                ExtractedContext::new(
                    ExtractedType::CodeChange,
                    &source,
                    content,
                    COMMIT_FUNCTIONS_CONFIDENCE,
                )
                .with_metadata(metadata),
            );
        } else if !changed_files.is_empty() {
            let content = format!("Changed files: {} ({})", changed_files.join(", "), headline);
            let metadata = ItemMetadata {
                files: changed_files.to_vec(),
                ..ItemMetadata::default()
            };
            contexts.push(
                ExtractedContext::new(
                    ExtractedType::CodeChange,
                    &source,
                    content,
                    COMMIT_FILES_CONFIDENCE,
                )
                .with_metadata(metadata),
            );
        }

        let detected = patterns::code_patterns(&patterns::added_lines(diff));
        if !detected.is_empty() {
            let content = format!("Code patterns introduced: {}", detected.join(", "));
            let metadata = ItemMetadata {
                files: changed_files.to_vec(),
                keywords: detected,
                ..ItemMetadata::default()
            };
            contexts.push(
                ExtractedContext::new(
                    ExtractedType::CodeChange,
                    &source,
                    content,
                    COMMIT_PATTERNS_CONFIDENCE,
                )
                .with_metadata(metadata),
            );
        }

        contexts
    }

    /// Extract decision sentences and code references from conversation messages
    pub fn extract_from_conversation(&self, messages: &[String]) -> Vec<ExtractedContext> {
        let mut contexts = Vec::new();
        let mut files = Vec::new();
        let mut identifiers = Vec::new();

        for message in messages {
            let message_files = patterns::file_references(message);

            for sentence in patterns::decision_sentences(message) {
                let duplicate = contexts
                    .iter()
                    .any(|c: &ExtractedContext| c.content.eq_ignore_ascii_case(&sentence));
                if duplicate {
                    continue;
                }
                let metadata = ItemMetadata {
                    files: message_files.clone(),
                    ..ItemMetadata::default()
                };
                contexts.push(
                    ExtractedContext::new(
                        ExtractedType::Decision,
                        "conversation",
                        sentence,
                        CONVERSATION_DECISION_CONFIDENCE,
                    )
                    .with_metadata(metadata),
                );
            }

            for file in message_files {
                if !files.contains(&file) {
                    files.push(file);
                }
            }
            for ident in patterns::identifier_references(message) {
                let part_of_file = files.iter().any(|f| f.contains(&ident));
                if !part_of_file && !identifiers.contains(&ident) {
                    identifiers.push(ident);
                }
            }
        }

        if !files.is_empty() || !identifiers.is_empty() {
            let mut parts = Vec::new();
            if !files.is_empty() {
                parts.push(format!("files: {}", files.join(", ")));
            }
            if !identifiers.is_empty() {
                parts.push(format!("identifiers: {}", identifiers.join(", ")));
            }
            let content = format!("Conversation references {}", parts.join("; "));
            let metadata = ItemMetadata {
                files,
                functions: identifiers,
                ..ItemMetadata::default()
            };
            contexts.push(
                ExtractedContext::new(
                    ExtractedType::Conversation,
                    "conversation",
                    content,
                    CONVERSATION_REFERENCE_CONFIDENCE,
                )
                .with_metadata(metadata),
            );
        }

        contexts
    }

    /// Read a file and extract documentation blocks and architectural patterns.
    ///
    /// No size guard is applied here; callers go through [`Self::process_file`]
    /// or check sizes themselves.
    pub async fn extract_from_file(&self, path: &Path) -> Result<Vec<ExtractedContext>> {
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ContextError::extraction(path, e))?;

        let path_str = path.display().to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_str.clone());
        let mut contexts = Vec::new();

        for block in patterns::doc_blocks(&source) {
            let metadata = ItemMetadata {
                files: vec![path_str.clone()],
                functions: patterns::function_names(&block),
                ..ItemMetadata::default()
            };
            contexts.push(
                ExtractedContext::new(
                    ExtractedType::Documentation,
                    &path_str,
                    block,
                    FILE_DOC_CONFIDENCE,
                )
                .with_metadata(metadata),
            );
        }

        let detected = patterns::architecture_patterns(&source);
        if !detected.is_empty() {
            let content = format!("Patterns in {}: {}", file_name, detected.join(", "));
            let metadata = ItemMetadata {
                files: vec![path_str.clone()],
                functions: patterns::function_names(&source),
                keywords: detected,
                ..ItemMetadata::default()
            };
            contexts.push(
                ExtractedContext::new(
                    ExtractedType::CodeChange,
                    &path_str,
                    content,
                    FILE_PATTERN_CONFIDENCE,
                )
                .with_metadata(metadata),
            );
        }

        debug!("Extracted {} contexts from {}", contexts.len(), path_str);
        Ok(contexts)
    }

    /// Guarded extraction used by scans, the watcher and commit polling.
    ///
    /// Missing files are a no-op, oversized files are skipped, and failures
    /// are published as events. Returns `None` when nothing was extracted.
    pub async fn process_file(&self, path: &Path) -> Option<Vec<ExtractedContext>> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Skipping {}: file no longer exists", path.display());
                return None;
            }
            Err(e) => {
                self.report_failure(path, &ContextError::extraction(path, e));
                return None;
            }
        };

        if !metadata.is_file() {
            return None;
        }
        if metadata.len() > self.config.max_file_bytes {
            debug!(
                "Skipping {}: {} bytes exceeds limit of {}",
                path.display(),
                metadata.len(),
                self.config.max_file_bytes
            );
            return None;
        }

        match self.extract_from_file(path).await {
            Ok(contexts) => {
                METRICS.record_extraction("file", true);
                if !contexts.is_empty() {
                    self.events.emit(AutopilotEvent::ExtractionCompleted {
                        source: path.display().to_string(),
                        contexts: contexts.clone(),
                    });
                }
                Some(contexts)
            }
            Err(_) if !path.exists() => {
                debug!("Skipping {}: deleted during extraction", path.display());
                None
            }
            Err(e) => {
                self.report_failure(path, &e);
                None
            }
        }
    }

    /// Extract from a commit and publish the result
    pub fn process_commit(
        &self,
        message: &str,
        changed_files: &[String],
        diff: &str,
    ) -> Vec<ExtractedContext> {
        let contexts = self.extract_from_commit(message, changed_files, diff);
        METRICS.record_extraction("commit", true);
        if !contexts.is_empty() {
            let headline = message.lines().next().unwrap_or_default();
            self.events.emit(AutopilotEvent::ExtractionCompleted {
                source: format!("commit:{}", headline),
                contexts: contexts.clone(),
            });
        }
        contexts
    }

    fn report_failure(&self, path: &Path, error: &ContextError) {
        warn!("Extraction failed for {}: {}", path.display(), error);
        METRICS.record_extraction("file", false);
        self.events.emit(AutopilotEvent::ExtractionFailed {
            source: path.display().to_string(),
            error: error.to_string(),
        });
    }

    /// Discover conventional source directories and config files, run one
    /// extraction pass over them, then start watching.
    pub async fn auto_watch_project(self: &Arc<Self>, root: &Path) -> Result<ProjectWatcher> {
        let layout = ProjectLayout::discover(root);
        info!(
            "Auto-watching {} ({} directories, {} config files)",
            root.display(),
            layout.directories.len(),
            layout.config_files.len()
        );

        let files = layout.files().await?;
        let mut extracted = 0;
        for file in &files {
            if let Some(contexts) = self.process_file(file).await {
                extracted += contexts.len();
            }
        }

        info!(
            "Initial scan of {} extracted {} contexts from {} files",
            root.display(),
            extracted,
            files.len()
        );
        self.events.emit(AutopilotEvent::InitialScanCompleted {
            root: root.to_path_buf(),
            files: files.len(),
            contexts: extracted,
        });

        ProjectWatcher::start(Arc::clone(self), layout.watch_targets())
    }
}

/// Directories and config files discovered under a project root
#[derive(Debug, Clone, Default)]
pub struct ProjectLayout {
    pub directories: Vec<PathBuf>,
    pub config_files: Vec<PathBuf>,
}

impl ProjectLayout {
    /// Conventional layout under `root`; the root itself when none is found
    pub fn discover(root: &Path) -> Self {
        let mut directories: Vec<PathBuf> = patterns::CONVENTIONAL_DIRS
            .iter()
            .map(|dir| root.join(dir))
            .filter(|path| path.is_dir())
            .collect();
        let config_files: Vec<PathBuf> = patterns::CONFIG_FILES
            .iter()
            .map(|file| root.join(file))
            .filter(|path| path.is_file())
            .collect();

        if directories.is_empty() {
            directories.push(root.to_path_buf());
        }

        Self {
            directories,
            config_files,
        }
    }

    /// Relevant files under the layout, skipping ignored directories
    pub async fn files(&self) -> Result<Vec<PathBuf>> {
        let layout = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut files = layout.config_files.clone();
            for dir in &layout.directories {
                let walker = WalkDir::new(dir)
                    .follow_links(false)
                    .into_iter()
                    .filter_entry(|entry| {
                        entry.depth() == 0
                            || !entry.file_type().is_dir()
                            || !patterns::in_ignored_dir(Path::new(entry.file_name()))
                    });
                for entry in walker.filter_map(|e| e.ok()) {
                    let path = entry.path();
                    if entry.file_type().is_file()
                        && patterns::is_relevant_file(path)
                        && !files.iter().any(|f| f == path)
                    {
                        files.push(path.to_path_buf());
                    }
                }
            }
            files
        })
        .await
        .map_err(|e| ContextError::Io(std::io::Error::other(e)))
    }

    fn watch_targets(&self) -> Vec<(PathBuf, RecursiveMode)> {
        self.directories
            .iter()
            .map(|dir| (dir.clone(), RecursiveMode::Recursive))
            .chain(
                self.config_files
                    .iter()
                    .map(|file| (file.clone(), RecursiveMode::NonRecursive)),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> AutoExtractor {
        AutoExtractor::new(ExtractorConfig::default(), EventBus::new())
    }

    #[test]
    fn test_extract_from_decision_commit() {
        let diff = "+++ b/src/db.rs\n+async fn connect_pool() -> Result<Pool, Error> {\n+    let pool = Pool::new().await?;\n";
        let contexts = extractor().extract_from_commit(
            "Migrated storage layer to sqlx\n\nDecided against diesel.",
            &["src/db.rs".to_string()],
            diff,
        );

        assert_eq!(contexts.len(), 3);
        assert_eq!(contexts[0].kind, ExtractedType::Decision);
        assert_eq!(contexts[0].confidence, 80);
        assert_eq!(contexts[0].source, "commit:Migrated storage layer to sqlx");
        assert_eq!(contexts[1].metadata.functions, vec!["connect_pool"]);
        assert!(contexts[2].content.contains("async/await concurrency"));
        assert!(contexts[2].content.contains("explicit error handling"));
    }

    #[test]
    fn test_plain_commit_yields_file_record() {
        let contexts = extractor().extract_from_commit(
            "Fix typo",
            &["README.md".to_string()],
            "+Hello world\n",
        );
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].kind, ExtractedType::CodeChange);
        assert_eq!(contexts[0].content, "Changed files: README.md (Fix typo)");
    }

    #[test]
    fn test_extract_from_conversation() {
        let messages = vec![
            "We decided to use JWT for the auth service.".to_string(),
            "OK, update src/auth.ts and the validateToken helper".to_string(),
        ];
        let contexts = extractor().extract_from_conversation(&messages);

        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].kind, ExtractedType::Decision);
        assert_eq!(contexts[0].content, "We decided to use JWT for the auth service");
        assert_eq!(contexts[1].kind, ExtractedType::Conversation);
        assert_eq!(contexts[1].metadata.files, vec!["src/auth.ts"]);
        assert_eq!(contexts[1].metadata.functions, vec!["validateToken"]);
    }

    #[test]
    fn test_conversation_without_signals() {
        let contexts = extractor().extract_from_conversation(&["hello there".to_string()]);
        assert!(contexts.is_empty());
    }

    #[tokio::test]
    async fn test_extract_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.ts");
        std::fs::write(
            &path,
            "/**\n * Refresh a token.\n * @param token current token\n */\nexport async function refresh(token) {\n  try { return await api.refresh(token); } catch (e) { throw e; }\n}\n",
        )
        .unwrap();

        let contexts = extractor().extract_from_file(&path).await.unwrap();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].kind, ExtractedType::Documentation);
        assert!(contexts[0].content.contains("@param token"));
        assert_eq!(contexts[1].kind, ExtractedType::CodeChange);
        assert!(contexts[1].metadata.keywords.contains(&"explicit error handling".to_string()));
        assert_eq!(contexts[1].metadata.functions, vec!["refresh"]);
    }

    #[tokio::test]
    async fn test_extract_from_missing_file_errors() {
        let result = extractor().extract_from_file(Path::new("/definitely/not/here.rs")).await;
        assert!(matches!(result, Err(ContextError::Extraction { .. })));
    }

    #[tokio::test]
    async fn test_process_file_guards() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.rs");
        std::fs::write(&big, "/// TODO: big\n".repeat(100)).unwrap();

        let events = EventBus::new();
        let mut rx = events.subscribe();
        let extractor = AutoExtractor::new(
            ExtractorConfig {
                max_file_bytes: 64,
                ..ExtractorConfig::default()
            },
            events,
        );

        assert!(extractor.process_file(&big).await.is_none());
        assert!(extractor.process_file(&dir.path().join("gone.rs")).await.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_process_file_emits_completion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.rs");
        std::fs::write(&path, "/// Returns: the answer\n/// TODO: cache\nfn answer() -> u32 { 42 }\n").unwrap();

        let ex = extractor();
        let mut rx = ex.events().subscribe();
        let contexts = ex.process_file(&path).await.unwrap();
        assert_eq!(contexts.len(), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "extraction:completed");
    }

    #[tokio::test]
    async fn test_project_layout_discovery() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::create_dir_all(dir.path().join("src/node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("src/nested/util.rs"), "fn util() {}").unwrap();
        std::fs::write(dir.path().join("src/node_modules/pkg/index.js"), "x").unwrap();
        std::fs::write(dir.path().join("src/logo.png"), "png").unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();

        let layout = ProjectLayout::discover(dir.path());
        assert_eq!(layout.directories, vec![dir.path().join("src")]);
        assert_eq!(layout.config_files, vec![dir.path().join("Cargo.toml")]);

        let mut files = layout.files().await.unwrap();
        files.sort();
        assert_eq!(
            files,
            vec![
                dir.path().join("Cargo.toml"),
                dir.path().join("src/main.rs"),
                dir.path().join("src/nested/util.rs"),
            ]
        );
    }

    #[tokio::test]
    async fn test_auto_watch_scans_then_debounces_changes() {
        let dir = tempfile::tempdir().unwrap();
        // Workspace below a directory whose name is otherwise ignored
        let root = dir.path().join("build/shop");
        std::fs::create_dir_all(root.join("src")).unwrap();
        let file = root.join("src/lib.rs");
        std::fs::write(&file, "/// TODO: document\nfn lib() {}\n").unwrap();

        let extractor = Arc::new(AutoExtractor::new(
            ExtractorConfig {
                debounce: Duration::from_millis(200),
                ..ExtractorConfig::default()
            },
            EventBus::new(),
        ));
        let mut rx = extractor.events().subscribe();

        let mut watcher = extractor.auto_watch_project(&root).await.unwrap();
        assert_eq!(watcher.watched_paths(), &[root.join("src")]);

        assert_eq!(rx.recv().await.unwrap().name(), "extraction:completed");
        match rx.recv().await.unwrap() {
            AutopilotEvent::InitialScanCompleted { files, contexts, .. } => {
                assert_eq!(files, 1);
                assert!(contexts >= 1);
            }
            other => panic!("unexpected event {}", other.name()),
        }

        std::fs::write(&file, "/// TODO: document v2\nfn lib() {}\n").unwrap();
        std::fs::write(&file, "/// TODO: document v3\nfn lib() {}\n").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            AutopilotEvent::ExtractionCompleted { contexts, .. } => {
                assert!(contexts[0].content.contains("v3"));
            }
            other => panic!("unexpected event {}", other.name()),
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        let mut extra = 0;
        while let Ok(event) = rx.try_recv() {
            if event.name() == "extraction:completed" {
                extra += 1;
            }
        }
        assert_eq!(extra, 0);
        watcher.close();
    }
}
