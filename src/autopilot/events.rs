//! Broadcast event bus for autopilot notifications
//!
//! Every failure inside the subsystem surfaces here instead of crossing a
//! component boundary as an error. Event names are a stable contract.

use crate::context::{ContextHealth, ExtractedContext};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default broadcast channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Notifications published by the autopilot and its components
#[derive(Debug, Clone)]
pub enum AutopilotEvent {
    Started,
    Stopped,
    ExtractionCompleted {
        source: String,
        contexts: Vec<ExtractedContext>,
    },
    ExtractionFailed {
        source: String,
        error: String,
    },
    InitialScanCompleted {
        root: PathBuf,
        files: usize,
        contexts: usize,
    },
    CompressionCompleted {
        items_before: usize,
        items_after: usize,
        tokens_before: usize,
        tokens_after: usize,
        summary: String,
    },
    HealthCheck(ContextHealth),
    HealthWarning(ContextHealth),
    WatcherError {
        path: Option<PathBuf>,
        error: String,
    },
    ProviderError {
        provider: String,
        error: String,
    },
    PollingError {
        error: String,
    },
}

impl AutopilotEvent {
    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            AutopilotEvent::Started => "autopilot:started",
            AutopilotEvent::Stopped => "autopilot:stopped",
            AutopilotEvent::ExtractionCompleted { .. } => "extraction:completed",
            AutopilotEvent::ExtractionFailed { .. } => "extraction:failed",
            AutopilotEvent::InitialScanCompleted { .. } => "extraction:initial_scan",
            AutopilotEvent::CompressionCompleted { .. } => "compression:completed",
            AutopilotEvent::HealthCheck(_) => "health:check",
            AutopilotEvent::HealthWarning(_) => "health:warning",
            AutopilotEvent::WatcherError { .. } => "watcher:error",
            AutopilotEvent::ProviderError { .. } => "provider:error",
            AutopilotEvent::PollingError { .. } => "polling:error",
        }
    }
}

/// Broadcast-based event bus.
///
/// Cloning shares the channel. `emit` never awaits; slow receivers lag
/// rather than block the sender.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AutopilotEvent>,
    emit_count: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers, returning how many received it
    pub fn emit(&self, event: AutopilotEvent) -> usize {
        self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutopilotEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
