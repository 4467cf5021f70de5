//! Event Bus - pub/sub for pipeline progress
//!
//! The EventBus uses a tokio broadcast channel so any number of consumers
//! (the CLI progress printer, tests) can watch runs without slowing them.

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::PipelineEvent;
use crate::pipeline::NodeId;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Central event bus for pipeline activity
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped, and a slow
    /// subscriber loses the oldest events.
    pub fn emit(&self, event: PipelineEvent) {
        debug!(event_type = event.event_type(), run_id = event.run_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter bound to one run
    pub fn emitter_for(&self, run_id: impl Into<String>) -> EventEmitter {
        let run_id = run_id.into();
        debug!(%run_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: Some(self.tx.clone()),
            run_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for emitting a single run's events
///
/// A detached emitter (no bus configured) silently drops everything.
#[derive(Clone)]
pub struct EventEmitter {
    tx: Option<broadcast::Sender<PipelineEvent>>,
    run_id: String,
}

impl EventEmitter {
    /// An emitter that goes nowhere
    pub fn detached(run_id: impl Into<String>) -> Self {
        Self {
            tx: None,
            run_id: run_id.into(),
        }
    }

    /// Get the run ID this emitter is bound to
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Emit a raw event
    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            debug!(event_type = event.event_type(), "EventEmitter::emit");
            let _ = tx.send(event);
        }
    }

    // === Convenience methods ===

    pub fn run_started(&self, prompt_preview: &str, history_len: usize) {
        self.emit(PipelineEvent::RunStarted {
            run_id: self.run_id.clone(),
            prompt_preview: prompt_preview.to_string(),
            history_len,
            timestamp: Utc::now(),
        });
    }

    pub fn run_halted(&self, outcome: &str, success: bool, steps: u32, total_tokens: u64) {
        self.emit(PipelineEvent::RunHalted {
            run_id: self.run_id.clone(),
            outcome: outcome.to_string(),
            success,
            steps,
            total_tokens,
            timestamp: Utc::now(),
        });
    }

    pub fn node_started(&self, node: NodeId, step: u32) {
        self.emit(PipelineEvent::NodeStarted {
            run_id: self.run_id.clone(),
            node,
            step,
            timestamp: Utc::now(),
        });
    }

    pub fn node_completed(&self, node: NodeId, step: u32, tokens_used: u64, failed: bool) {
        self.emit(PipelineEvent::NodeCompleted {
            run_id: self.run_id.clone(),
            node,
            step,
            tokens_used,
            failed,
            timestamp: Utc::now(),
        });
    }

    pub fn section_generated(&self, title: &str, order: u32, total: usize) {
        self.emit(PipelineEvent::SectionGenerated {
            run_id: self.run_id.clone(),
            title: title.to_string(),
            order,
            total,
            timestamp: Utc::now(),
        });
    }

    pub fn retry_scheduled(&self, target: NodeId, attempt: u32, delay_ms: u64, reason: &str) {
        self.emit(PipelineEvent::RetryScheduled {
            run_id: self.run_id.clone(),
            target,
            attempt,
            delay_ms,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }
}
