//! Event types for the repost engine
//!
//! Provides the `RepostEvent` enum and an `EventBus` built on a tokio
//! broadcast channel. Events are informational: a bus with no subscribers
//! drops them silently.

use crate::db::models::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleSource {
    /// Hourly gated trigger evaluation
    Scheduled,
    /// Once-daily allocation pass
    DailyPass,
    /// Operator request
    Manual,
}

/// Repost engine events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RepostEvent {
    /// A cycle acquired the orchestrator guard
    CycleStarted {
        platform: Platform,
        source: CycleSource,
        timestamp: DateTime<Utc>,
    },

    /// A cycle was requested while another one held the guard
    CycleSkipped {
        platform: Platform,
        source: CycleSource,
        timestamp: DateTime<Utc>,
    },

    /// A cycle finished (including gate-idle and no-candidate outcomes)
    CycleCompleted {
        platform: Platform,
        source: CycleSource,
        /// Qualifying publications counted since the last trigger
        new_qualifying: i64,
        /// Queue entries created by this cycle
        queued: usize,
        timestamp: DateTime<Utc>,
    },

    /// A cycle stopped on an error; trigger state was not advanced
    CycleFailed {
        platform: Platform,
        source: CycleSource,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A publication worker claimed a queue entry
    EntryClaimed {
        entry_id: Uuid,
        platform: Platform,
        timestamp: DateTime<Utc>,
    },

    /// A queue entry was published and its source item marked reposted
    EntryCompleted {
        entry_id: Uuid,
        content_item_id: Uuid,
        platform: Platform,
        timestamp: DateTime<Utc>,
    },

    /// A queue entry failed to publish
    EntryFailed {
        entry_id: Uuid,
        platform: Platform,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Operator cleared the queue
    QueueCleared {
        removed: u64,
        timestamp: DateTime<Utc>,
    },
}

impl RepostEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            RepostEvent::CycleStarted { .. } => "CycleStarted",
            RepostEvent::CycleSkipped { .. } => "CycleSkipped",
            RepostEvent::CycleCompleted { .. } => "CycleCompleted",
            RepostEvent::CycleFailed { .. } => "CycleFailed",
            RepostEvent::EntryClaimed { .. } => "EntryClaimed",
            RepostEvent::EntryCompleted { .. } => "EntryCompleted",
            RepostEvent::EntryFailed { .. } => "EntryFailed",
            RepostEvent::QueueCleared { .. } => "QueueCleared",
        }
    }
}

/// Broadcast bus for `RepostEvent`s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RepostEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RepostEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: RepostEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
