//! Domain event system: decoupled observation of the agent loop.
//!
//! Events are published when the loop plans, grounds, acts or perceives.
//! Subscribers (CLI progress output, tests) react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A task started after the environment reset
    TaskStarted {
        task_id: String,
        goal_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The planner produced a plan for one loop iteration
    PlanGenerated {
        task_id: String,
        loop_index: u32,
        steps: usize,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// An abstract target was resolved to a live element
    TargetGrounded {
        role: String,
        label: String,
        bid: String,
        timestamp: DateTime<Utc>,
    },

    /// An action was sent to the browser
    ActionExecuted {
        action_code: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A value was read off the page
    ValueExtracted {
        instruction: String,
        value: String,
        timestamp: DateTime<Utc>,
    },

    /// The task finished (successfully or not)
    TaskFinished {
        task_id: String,
        reward: f64,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
