//! Context autopilot
//!
//! Autonomous context engineering for LLM-assisted development: extracts
//! context from commits, conversations and source files, scores it for
//! relevance to the current work, compresses it to a token budget and keeps
//! an eye on the health of the stored corpus.
//!
//! ```no_run
//! use context_autopilot::{init_autopilot, AutopilotConfig, InMemoryStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = AutopilotConfig::load(None)?;
//! let autopilot = init_autopilot(config, Arc::new(InMemoryStore::new("demo")))?;
//! autopilot.start().await?;
//! let context = autopilot
//!     .get_optimal_context(&["src/auth.ts".to_string()], &[], Some("add refresh tokens"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod autopilot;
pub mod compressor;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod scorer;

pub use autopilot::{
    Autopilot, AutopilotEvent, AutopilotState, ContextStore, EventBus, GitCli, InMemoryStore,
    VersionControl,
};
pub use compressor::ContextCompressor;
pub use config::AutopilotConfig;
pub use context::{
    CompressionResult, CompressionStrategy, ContextHealth, ContextItem, ContextType,
    ExtractedContext, RelevanceScore, ScoringContext,
};
pub use error::{ContextError, ProviderError, Result};
pub use extractor::AutoExtractor;
pub use health::HealthMonitor;
pub use scorer::RelevanceScorer;

use anyhow::Context as _;
use std::sync::Arc;

/// Install logging and build an autopilot that polls the workspace with `git`
pub fn init_autopilot(
    config: AutopilotConfig,
    store: Arc<dyn ContextStore>,
) -> anyhow::Result<Autopilot> {
    logging::init_logging(&config.logging);
    let root = config.workspace_root.clone();
    Autopilot::with_git(config, store)
        .with_context(|| format!("failed to initialize autopilot for {}", root.display()))
}
