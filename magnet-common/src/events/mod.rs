//! Event types for the magnet tracker notification system
//!
//! Provides the shared event definitions and the EventBus through which the
//! presentation layer observes tracker changes. The tracker never assumes a
//! particular UI binding: consumers subscribe and poll or await events.

mod tracking_types;

pub use tracking_types::{ProviderState, TrackingMetrics, TrackingState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Tracker event types
///
/// Events are broadcast via EventBus and can be serialized for transport to
/// out-of-process observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackerEvent {
    /// Session lifecycle state changed
    ///
    /// Triggers:
    /// - Status label refresh
    /// - Failure banner when `new_state` is `Failed`
    StateChanged {
        /// State before the transition
        old_state: TrackingState,
        /// State after the transition
        new_state: TrackingState,
        /// When the transition happened
        timestamp: DateTime<Utc>,
    },

    /// Overlay created or replaced from an `added`/`updated` anchor event
    OverlayUpserted {
        /// Anchor identifier assigned by the tracking subsystem
        overlay_id: Uuid,
        /// Reference pattern name the anchor matched
        reference_name: String,
        /// Whether the anchor is currently tracked
        is_tracked: bool,
        /// When the update was applied
        timestamp: DateTime<Utc>,
    },

    /// Overlay removed from a `removed` anchor event
    OverlayRemoved {
        /// Anchor identifier of the removed overlay
        overlay_id: Uuid,
        /// When the overlay was removed
        timestamp: DateTime<Utc>,
    },

    /// All overlays dropped by `stop()`
    OverlaysCleared {
        /// Number of overlays that were present
        removed: usize,
        /// When the store was cleared
        timestamp: DateTime<Utc>,
    },

    /// Metrics recomputed
    ///
    /// Carries the complete replacement value, never a partial update.
    MetricsUpdated {
        /// New metrics value
        metrics: TrackingMetrics,
        /// When the metrics were published
        timestamp: DateTime<Utc>,
    },

    /// Reference catalog entry inserted or replaced
    CatalogUpdated {
        /// Reference pattern name
        name: String,
        /// Catalog size after the upsert
        total_configured: usize,
        /// When the catalog changed
        timestamp: DateTime<Utc>,
    },
}

impl TrackerEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &str {
        match self {
            TrackerEvent::StateChanged { .. } => "StateChanged",
            TrackerEvent::OverlayUpserted { .. } => "OverlayUpserted",
            TrackerEvent::OverlayRemoved { .. } => "OverlayRemoved",
            TrackerEvent::OverlaysCleared { .. } => "OverlaysCleared",
            TrackerEvent::MetricsUpdated { .. } => "MetricsUpdated",
            TrackerEvent::CatalogUpdated { .. } => "CatalogUpdated",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for tracker notifications
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the tracker)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use magnet_common::events::{EventBus, TrackerEvent, TrackingState};
/// use std::sync::Arc;
///
/// let event_bus = Arc::new(EventBus::new(100));
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit(TrackerEvent::StateChanged {
///     old_state: TrackingState::Idle,
///     new_state: TrackingState::Loading,
///     timestamp: chrono::Utc::now(),
/// }).ok();
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "StateChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TrackerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: TrackerEvent,
    ) -> Result<usize, broadcast::error::SendError<TrackerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TrackerEvent) {
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
