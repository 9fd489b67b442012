//! Metrics aggregation
//!
//! `TrackingMetrics` is a pure function of the overlay store, the catalog
//! size and what the subsystem reported alongside the event. The tracker
//! calls [`aggregate`] after every state-affecting event and replaces its
//! published metrics with the result.

use crate::overlay::OverlayStore;
use chrono::{DateTime, Utc};
use magnet_common::events::{ProviderState, TrackingMetrics};

/// Subsystem-side inputs polled alongside each refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderReading {
    pub provider_state: ProviderState,
    /// Live anchors according to the subsystem; may exceed the store size
    pub reported_anchors: usize,
}

impl ProviderReading {
    /// Reading used while no subsystem session exists
    pub fn stopped() -> Self {
        Self {
            provider_state: ProviderState::Stopped,
            reported_anchors: 0,
        }
    }
}

/// Recompute metrics from scratch
///
/// Idempotent: identical inputs give an identical value.
pub fn aggregate(
    overlays: &OverlayStore,
    total_configured: usize,
    reading: ProviderReading,
    event_description: impl Into<String>,
    event_date: DateTime<Utc>,
) -> TrackingMetrics {
    TrackingMetrics {
        total_configured,
        provider_state: reading.provider_state,
        reported_anchors: reading.reported_anchors,
        actively_tracked_anchors: overlays.tracked_count(),
        tracked_reference_names: overlays.tracked_reference_names(),
        last_event_description: event_description.into(),
        last_event_date: Some(event_date),
    }
}
