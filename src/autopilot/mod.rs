//! Autopilot orchestrator
//!
//! Owns the extractor, scorer, compressor and health monitor, runs revision
//! polling and periodic health checks while started, and answers
//! [`Autopilot::get_optimal_context`] on demand.

pub mod events;
pub mod storage;
pub mod vcs;

pub use events::{AutopilotEvent, EventBus};
pub use storage::{
    load_context_items, ContextStore, ConversationRecord, DecisionRecord, InMemoryStore,
};
pub use vcs::{GitCli, VcsStatus, VersionControl};

use crate::compressor::ContextCompressor;
use crate::config::AutopilotConfig;
use crate::context::{
    CompressionStrategy, ContextHealth, ContextItem, ContextType, RelevanceScore, ScoringContext,
};
use crate::error::Result;
use crate::extractor::{AutoExtractor, ExtractorConfig, ProjectWatcher};
use crate::health::HealthMonitor;
use crate::scorer::RelevanceScorer;
use indexmap::IndexSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Conversations loaded per query
const CONVERSATION_LIMIT: usize = 50;
/// Keywords kept from conversation text
const MAX_KEYWORDS: usize = 20;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "has", "have",
    "was", "were", "one", "our", "out", "this", "that", "with", "from", "they", "them", "then",
    "than", "there", "their", "these", "those", "will", "would", "should", "could", "what",
    "when", "where", "which", "who", "why", "how", "about", "into", "some", "just", "like",
    "need", "needs", "want", "make", "also", "been", "being", "does", "did", "its", "it's",
    "let", "lets", "let's", "please", "here", "more", "most", "other", "such", "only", "very",
];

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutopilotState {
    Stopped,
    Running,
}

enum RunState {
    Stopped,
    Running {
        tasks: Vec<JoinHandle<()>>,
        watcher: Option<ProjectWatcher>,
    },
}

/// Context engineering autopilot
pub struct Autopilot {
    config: AutopilotConfig,
    extractor: Arc<AutoExtractor>,
    scorer: Arc<RelevanceScorer>,
    compressor: Arc<ContextCompressor>,
    monitor: Arc<HealthMonitor>,
    store: Arc<dyn ContextStore>,
    vcs: Arc<dyn VersionControl>,
    events: EventBus,
    running: Arc<AtomicBool>,
    state: Mutex<RunState>,
}

impl Autopilot {
    /// Build an autopilot from configuration.
    ///
    /// Providers without credentials silently select their local fallbacks.
    pub fn new(
        config: AutopilotConfig,
        store: Arc<dyn ContextStore>,
        vcs: Arc<dyn VersionControl>,
    ) -> Result<Self> {
        config.validate()?;
        let events = EventBus::new();

        let extractor = AutoExtractor::new(ExtractorConfig::from(&config), events.clone());
        let scorer = RelevanceScorer::from_config(&config).with_events(events.clone());
        let compressor = ContextCompressor::from_config(&config).with_events(events.clone());
        let monitor = HealthMonitor::from_config(&config);

        info!(
            "Autopilot configured for {} (similarity: {})",
            config.workspace_root.display(),
            scorer.similarity().name()
        );

        Ok(Self {
            config,
            extractor: Arc::new(extractor),
            scorer: Arc::new(scorer),
            compressor: Arc::new(compressor),
            monitor: Arc::new(monitor),
            store,
            vcs,
            events,
            running: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(RunState::Stopped),
        })
    }

    /// Autopilot using the `git` command line in the workspace root
    pub fn with_git(config: AutopilotConfig, store: Arc<dyn ContextStore>) -> Result<Self> {
        let vcs = Arc::new(GitCli::new(config.workspace_root.clone()));
        Self::new(config, store, vcs)
    }

    pub fn config(&self) -> &AutopilotConfig {
        &self.config
    }

    pub fn extractor(&self) -> &Arc<AutoExtractor> {
        &self.extractor
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AutopilotEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> AutopilotState {
        if self.running.load(Ordering::SeqCst) {
            AutopilotState::Running
        } else {
            AutopilotState::Stopped
        }
    }

    /// Start persistence, revision polling, health checks and watching.
    ///
    /// Starting a running autopilot is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Autopilot already running");
            return Ok(());
        }

        let root = self.config.workspace_root.clone();
        let mut tasks = vec![self.spawn_persistence(root.clone())];

        if self.config.vcs.polling_enabled && self.vcs.is_repository().await {
            match self.vcs.current_revision().await {
                Ok(revision) => tasks.push(self.spawn_polling(root.clone(), revision)),
                Err(e) => {
                    warn!("Revision polling disabled: {}", e);
                    self.events.emit(AutopilotEvent::PollingError {
                        error: e.to_string(),
                    });
                }
            }
        }

        tasks.push(self.spawn_health_checks(root.clone()));

        let watcher = if self.config.watch_enabled {
            match self.extractor.auto_watch_project(&root).await {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!("Watching {} failed: {}", root.display(), e);
                    self.events.emit(AutopilotEvent::WatcherError {
                        path: Some(root.clone()),
                        error: e.to_string(),
                    });
                    None
                }
            }
        } else {
            None
        };

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = RunState::Running { tasks, watcher };
        drop(state);

        if !self.running.load(Ordering::SeqCst) {
            // stop() ran while we were starting
            self.teardown();
            return Ok(());
        }

        info!("Autopilot started for {}", root.display());
        self.events.emit(AutopilotEvent::Started);
        Ok(())
    }

    /// Stop all timers and watchers. In-flight results are discarded.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.teardown();
        info!("Autopilot stopped");
        self.events.emit(AutopilotEvent::Stopped);
    }

    fn teardown(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let RunState::Running { tasks, watcher } = std::mem::replace(&mut *state, RunState::Stopped)
        {
            for task in tasks {
                task.abort();
            }
            if let Some(mut watcher) = watcher {
                watcher.close();
            }
        }
    }

    /// Select the context worth sending for the current work.
    ///
    /// The whole corpus is scored, filtered by the relevance threshold and,
    /// with auto-compression on, compressed to the token budget while always
    /// keeping decisions.
    pub async fn get_optimal_context(
        &self,
        current_files: &[String],
        conversation: &[String],
        task_description: Option<&str>,
    ) -> Result<Vec<ContextItem>> {
        let items =
            load_context_items(self.store.as_ref(), &self.config.workspace_root, CONVERSATION_LIMIT)
                .await?;

        let mut keyword_sources: Vec<&str> = conversation.iter().map(String::as_str).collect();
        keyword_sources.extend(task_description);

        let context = ScoringContext {
            recent_conversation: conversation.to_vec(),
            active_keywords: extract_keywords(&keyword_sources),
            task_description: task_description.map(str::to_string),
            ..ScoringContext::new(current_files.to_vec())
        };

        let ranked = self.scorer.score_and_rank(items, &context, None).await;
        let total = ranked.len();
        let (selected, scores): (Vec<ContextItem>, Vec<RelevanceScore>) = ranked
            .into_iter()
            .filter(|r| r.relevance.score >= self.config.relevance_threshold)
            .map(|r| (r.item, r.relevance))
            .unzip();
        debug!(
            "{} of {} items above relevance threshold {}",
            selected.len(),
            total,
            self.config.relevance_threshold
        );

        if !self.config.auto_compress {
            return Ok(selected);
        }

        let strategy = CompressionStrategy::balanced(vec![ContextType::Decision]);
        let result = self
            .compressor
            .compress(&selected, &scores, &strategy, self.config.token_budget)
            .await;
        Ok(result.compressed)
    }

    /// Assess corpus health now and publish the result
    pub async fn check_health(&self) -> Result<ContextHealth> {
        run_health_check(
            self.store.as_ref(),
            &self.monitor,
            &self.events,
            &self.config.workspace_root,
            self.config.health.warning_threshold,
        )
        .await
    }

    fn spawn_persistence(&self, root: PathBuf) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        let store = Arc::clone(&self.store);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(AutopilotEvent::ExtractionCompleted { source, contexts }) => {
                        if !running.load(Ordering::SeqCst) {
                            continue;
                        }
                        if let Err(e) = persist(store.as_ref(), &root, contexts).await {
                            warn!("Failed to store extractions from {}: {}", source, e);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Persistence lagged, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_polling(&self, root: PathBuf, revision: String) -> JoinHandle<()> {
        let vcs = Arc::clone(&self.vcs);
        let extractor = Arc::clone(&self.extractor);
        let running = Arc::clone(&self.running);
        let period = self.config.poll_interval();

        tokio::spawn(async move {
            let mut last = revision;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                match poll_revision(vcs.as_ref(), &extractor, &root, &last).await {
                    Ok(Some(current)) => last = current,
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Revision polling failed: {}", e);
                        extractor.events().emit(AutopilotEvent::PollingError {
                            error: e.to_string(),
                        });
                    }
                }
            }
        })
    }

    fn spawn_health_checks(&self, root: PathBuf) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let monitor = Arc::clone(&self.monitor);
        let events = self.events.clone();
        let running = Arc::clone(&self.running);
        let period = self.config.health_interval();
        let warning_threshold = self.config.health.warning_threshold;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) =
                    run_health_check(store.as_ref(), &monitor, &events, &root, warning_threshold).await
                {
                    warn!("Health check failed: {}", e);
                }
            }
        })
    }
}

impl Drop for Autopilot {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn persist(
    store: &dyn ContextStore,
    root: &Path,
    contexts: Vec<crate::context::ExtractedContext>,
) -> Result<()> {
    let Some(project) = store.resolve_project(root).await? else {
        return Ok(());
    };
    let saved = store.save_extracted(&project, contexts).await?;
    debug!("Stored {} extracted contexts for {}", saved, project);
    Ok(())
}

/// Re-extract after a revision change. Returns the new revision if it moved.
async fn poll_revision(
    vcs: &dyn VersionControl,
    extractor: &AutoExtractor,
    root: &Path,
    last: &str,
) -> Result<Option<String>> {
    let current = vcs.current_revision().await?;
    if current == last {
        return Ok(None);
    }
    info!("Revision changed {} -> {}", short(last), short(&current));

    let changed = vcs.changed_files(last, &current).await?;
    for file in &changed {
        let path = root.join(file);
        if path.exists() {
            extractor.process_file(&path).await;
        }
    }

    let message = vcs.commit_message(&current).await?;
    let diff = vcs.diff(last, &current).await?;
    extractor.process_commit(&message, &changed, &diff);

    let status = vcs.status().await?;
    for file in status.uncommitted() {
        if changed.contains(&file) {
            continue;
        }
        extractor.process_file(&root.join(file)).await;
    }

    Ok(Some(current))
}

async fn run_health_check(
    store: &dyn ContextStore,
    monitor: &HealthMonitor,
    events: &EventBus,
    root: &Path,
    warning_threshold: f64,
) -> Result<ContextHealth> {
    let items = load_context_items(store, root, CONVERSATION_LIMIT).await?;
    let health = monitor.assess(&items).await;

    info!(
        "Context health {:.1} ({} items, {} issues)",
        health.score,
        health.metrics.total_items,
        health.issues.len()
    );
    events.emit(AutopilotEvent::HealthCheck(health.clone()));
    if health.score < warning_threshold {
        warn!("Context health below {}: {:.1}", warning_threshold, health.score);
        events.emit(AutopilotEvent::HealthWarning(health.clone()));
    }
    Ok(health)
}

fn short(revision: &str) -> &str {
    revision.get(..8).unwrap_or(revision)
}

/// Stop-word filtered keywords from free text, in order of first use
pub fn extract_keywords(texts: &[&str]) -> Vec<String> {
    let mut keywords = IndexSet::new();
    for text in texts {
        for word in text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '\'') {
            let word = word.trim_matches('\'').to_lowercase();
            if word.chars().count() < 3 || STOP_WORDS.contains(&word.as_str()) {
                continue;
            }
            if word.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            keywords.insert(word);
            if keywords.len() >= MAX_KEYWORDS {
                return keywords.into_iter().collect();
            }
        }
    }
    keywords.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    struct StaticVcs {
        repository: bool,
    }

    #[async_trait]
    impl VersionControl for StaticVcs {
        async fn is_repository(&self) -> bool {
            self.repository
        }
        async fn status(&self) -> Result<VcsStatus> {
            Ok(VcsStatus {
                clean: true,
                ..VcsStatus::default()
            })
        }
        async fn current_revision(&self) -> Result<String> {
            Ok("abc".to_string())
        }
        async fn changed_files(&self, _from: &str, _to: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn commit_message(&self, _revision: &str) -> Result<String> {
            Ok(String::new())
        }
        async fn diff(&self, _from: &str, _to: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    struct MovingVcs {
        head: String,
    }

    #[async_trait]
    impl VersionControl for MovingVcs {
        async fn is_repository(&self) -> bool {
            true
        }
        async fn status(&self) -> Result<VcsStatus> {
            Ok(VcsStatus::default())
        }
        async fn current_revision(&self) -> Result<String> {
            Ok(self.head.clone())
        }
        async fn changed_files(&self, _from: &str, _to: &str) -> Result<Vec<String>> {
            Ok(vec!["src/db.rs".to_string()])
        }
        async fn commit_message(&self, _revision: &str) -> Result<String> {
            Ok("Migrated storage to sqlite".to_string())
        }
        async fn diff(&self, _from: &str, _to: &str) -> Result<String> {
            Ok("+fn open_pool() {}\n".to_string())
        }
    }

    fn quiet_config(root: &Path) -> AutopilotConfig {
        let mut config = AutopilotConfig {
            workspace_root: root.to_path_buf(),
            watch_enabled: false,
            ..AutopilotConfig::default()
        };
        config.vcs.polling_enabled = false;
        config
    }

    #[test]
    fn test_extract_keywords() {
        let keywords = extract_keywords(&["We need refresh tokens for the auth flow", "auth 2024"]);
        assert_eq!(keywords, vec!["refresh", "tokens", "auth", "flow"]);
    }

    #[test]
    fn test_keywords_are_capped() {
        let text: Vec<String> = (0..40).map(|i| format!("word{}", i)).collect();
        let joined = text.join(" ");
        assert_eq!(extract_keywords(&[joined.as_str()]).len(), MAX_KEYWORDS);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AutopilotConfig {
            token_budget: 0,
            ..AutopilotConfig::default()
        };
        let result = Autopilot::new(
            config,
            Arc::new(InMemoryStore::new("demo")),
            Arc::new(StaticVcs { repository: false }),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let autopilot = Autopilot::new(
            quiet_config(dir.path()),
            Arc::new(InMemoryStore::new("demo")),
            Arc::new(StaticVcs { repository: false }),
        )
        .unwrap();
        let mut rx = autopilot.subscribe();

        assert_eq!(autopilot.state(), AutopilotState::Stopped);
        autopilot.start().await.unwrap();
        autopilot.start().await.unwrap();
        assert_eq!(autopilot.state(), AutopilotState::Running);

        autopilot.stop();
        autopilot.stop();
        assert_eq!(autopilot.state(), AutopilotState::Stopped);

        assert_eq!(rx.recv().await.unwrap().name(), "autopilot:started");
        assert_eq!(rx.recv().await.unwrap().name(), "autopilot:stopped");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_check_health_emits_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new("demo"));
        for (id, text) in [("d1", "Enable caching"), ("d2", "Disable caching")] {
            store
                .add_decision(DecisionRecord {
                    id: id.to_string(),
                    description: text.to_string(),
                    reasoning: None,
                    timestamp: Utc::now(),
                    files: vec!["config.ts".to_string()],
                })
                .await;
        }

        let mut config = quiet_config(dir.path());
        config.health.warning_threshold = 90.0;
        let autopilot =
            Autopilot::new(config, store, Arc::new(StaticVcs { repository: false })).unwrap();
        let mut rx = autopilot.subscribe();

        let health = autopilot.check_health().await.unwrap();
        assert!(health.score < 90.0);
        assert_eq!(rx.recv().await.unwrap().name(), "health:check");
        assert_eq!(rx.recv().await.unwrap().name(), "health:warning");
    }

    #[tokio::test]
    async fn test_poll_revision_extracts_commit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/db.rs"), "/// TODO: pool sizing\nfn open_pool() {}\n")
            .unwrap();

        let vcs = MovingVcs {
            head: "def".to_string(),
        };
        let extractor = AutoExtractor::new(ExtractorConfig::default(), EventBus::new());
        let mut rx = extractor.events().subscribe();

        let moved = poll_revision(&vcs, &extractor, dir.path(), "abc").await.unwrap();
        assert_eq!(moved.as_deref(), Some("def"));

        let mut commit = None;
        while let Ok(event) = rx.try_recv() {
            if let AutopilotEvent::ExtractionCompleted { source, contexts } = event {
                if source.starts_with("commit:") {
                    commit = Some((source, contexts));
                }
            }
        }
        let (source, contexts) = commit.expect("commit extraction event");
        assert_eq!(source, "commit:Migrated storage to sqlite");
        assert_eq!(contexts[0].confidence, 80);
        assert_eq!(contexts[1].metadata.functions, vec!["open_pool"]);

        let unchanged = poll_revision(&vcs, &extractor, dir.path(), "def").await.unwrap();
        assert!(unchanged.is_none());
    }

    #[tokio::test]
    async fn test_extractions_are_persisted_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new("demo"));
        let autopilot = Autopilot::new(
            quiet_config(dir.path()),
            store.clone(),
            Arc::new(StaticVcs { repository: false }),
        )
        .unwrap();

        autopilot.start().await.unwrap();
        autopilot
            .extractor()
            .process_commit("Refactor auth into services", &["auth.ts".to_string()], "");

        let mut stored = Vec::new();
        for _ in 0..50 {
            stored = store.items().await;
            if !stored.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|i| i.item_type == ContextType::Decision));

        autopilot.stop();
        autopilot
            .extractor()
            .process_commit("Refactor again", &["auth.ts".to_string()], "");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.items().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_file_is_stored_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib.rs");
        std::fs::write(&file, "/// TODO: document\nfn lib() {}\n").unwrap();

        let store = Arc::new(InMemoryStore::new("demo"));
        let autopilot = Autopilot::new(
            quiet_config(dir.path()),
            store.clone(),
            Arc::new(StaticVcs { repository: false }),
        )
        .unwrap();
        autopilot.start().await.unwrap();

        for _ in 0..5 {
            assert!(autopilot.extractor().process_file(&file).await.is_some());
        }

        for _ in 0..50 {
            if !store.items().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.items().await.len(), 1);
        autopilot.stop();
    }
}
