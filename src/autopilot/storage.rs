//! Storage collaborator
//!
//! The autopilot never owns persistence. It resolves the project for the
//! workspace, reads decisions, conversations and previously extracted items
//! through [`ContextStore`], and hands new extractions back to it.

use crate::context::{ContextItem, ContextType, ExtractedContext, ItemMetadata};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// A recorded decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub description: String,
    pub reasoning: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub files: Vec<String>,
}

impl DecisionRecord {
    pub fn into_item(self, project: &str) -> ContextItem {
        let content = match &self.reasoning {
            Some(reasoning) if !reasoning.trim().is_empty() => {
                format!("{}\n\nReasoning: {}", self.description, reasoning)
            }
            _ => self.description.clone(),
        };
        ContextItem::new(self.id, ContextType::Decision, content)
            .with_timestamp(self.timestamp)
            .with_metadata(ItemMetadata {
                project: Some(project.to_string()),
                files: self.files,
                ..ItemMetadata::default()
            })
    }
}

/// A stored conversation snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn into_item(self, project: &str) -> ContextItem {
        ContextItem::new(self.id, ContextType::Conversation, self.content)
            .with_timestamp(self.timestamp)
            .with_metadata(ItemMetadata {
                project: Some(project.to_string()),
                ..ItemMetadata::default()
            })
    }
}

/// Persistence used by the autopilot
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Project identifier for a workspace path, if the path belongs to one
    async fn resolve_project(&self, path: &Path) -> Result<Option<String>>;

    async fn decisions(&self, project: &str) -> Result<Vec<DecisionRecord>>;

    /// Most recent conversations first
    async fn conversations(&self, project: &str, limit: usize) -> Result<Vec<ConversationRecord>>;

    /// Items stored from earlier extractions
    async fn extracted_items(&self, _project: &str) -> Result<Vec<ContextItem>> {
        Ok(Vec::new())
    }

    /// Persist new extractions, returning how many were stored
    async fn save_extracted(&self, project: &str, contexts: Vec<ExtractedContext>) -> Result<usize>;
}

/// Load every known item for the project owning `root`.
///
/// A path outside any project yields an empty corpus.
pub async fn load_context_items(
    store: &dyn ContextStore,
    root: &Path,
    conversation_limit: usize,
) -> Result<Vec<ContextItem>> {
    let Some(project) = store.resolve_project(root).await? else {
        debug!("No project for {}", root.display());
        return Ok(Vec::new());
    };

    let (decisions, conversations, extracted) = tokio::try_join!(
        store.decisions(&project),
        store.conversations(&project, conversation_limit),
        store.extracted_items(&project),
    )?;

    let mut items: Vec<ContextItem> = decisions
        .into_iter()
        .map(|d| d.into_item(&project))
        .collect();
    items.extend(conversations.into_iter().map(|c| c.into_item(&project)));
    items.extend(extracted);

    debug!("Loaded {} items for project {}", items.len(), project);
    Ok(items)
}

/// In-process store, scoped to one project root
pub struct InMemoryStore {
    project: String,
    root: Option<PathBuf>,
    decisions: RwLock<Vec<DecisionRecord>>,
    conversations: RwLock<Vec<ConversationRecord>>,
    items: RwLock<Vec<ContextItem>>,
}

impl InMemoryStore {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            root: None,
            decisions: RwLock::new(Vec::new()),
            conversations: RwLock::new(Vec::new()),
            items: RwLock::new(Vec::new()),
        }
    }

    /// Only paths under `root` resolve to this project
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub async fn add_decision(&self, decision: DecisionRecord) {
        self.decisions.write().await.push(decision);
    }

    pub async fn add_conversation(&self, conversation: ConversationRecord) {
        self.conversations.write().await.push(conversation);
    }

    pub async fn add_item(&self, item: ContextItem) {
        self.items.write().await.push(item);
    }

    /// Snapshot of stored extracted items
    pub async fn items(&self) -> Vec<ContextItem> {
        self.items.read().await.clone()
    }
}

#[async_trait]
impl ContextStore for InMemoryStore {
    async fn resolve_project(&self, path: &Path) -> Result<Option<String>> {
        let belongs = self.root.as_ref().map_or(true, |root| path.starts_with(root));
        Ok(belongs.then(|| self.project.clone()))
    }

    async fn decisions(&self, project: &str) -> Result<Vec<DecisionRecord>> {
        if project != self.project {
            return Ok(Vec::new());
        }
        Ok(self.decisions.read().await.clone())
    }

    async fn conversations(&self, project: &str, limit: usize) -> Result<Vec<ConversationRecord>> {
        if project != self.project {
            return Ok(Vec::new());
        }
        let mut conversations = self.conversations.read().await.clone();
        conversations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        conversations.truncate(limit);
        Ok(conversations)
    }

    async fn extracted_items(&self, project: &str) -> Result<Vec<ContextItem>> {
        if project != self.project {
            return Ok(Vec::new());
        }
        Ok(self.items().await)
    }

    /// Items are keyed by their stable id; re-saving replaces in place
    async fn save_extracted(&self, project: &str, contexts: Vec<ExtractedContext>) -> Result<usize> {
        let count = contexts.len();
        let mut items = self.items.write().await;
        for context in contexts {
            let mut item = context.into_item();
            item.metadata.project = Some(project.to_string());
            match items.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => *existing = item,
                None => items.push(item),
            }
        }
        Ok(count)
    }
}
