//! Tracking-related type definitions
//!
//! Session lifecycle state, data provider state and the derived metrics value
//! published after every anchor event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracking session lifecycle state
///
/// Exactly one value at a time, owned by the session controller. Replaced
/// wholesale on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum TrackingState {
    /// No session requested
    Idle,
    /// Hardware or platform cannot run image tracking
    Unsupported,
    /// Reference patterns loading, subsystem session starting
    Loading,
    /// Subsystem session running, anchor events being consumed
    Running,
    /// Start attempt failed; `start()` must be called again
    Failed(String),
}

impl TrackingState {
    /// True while a session attempt is in flight or established
    pub fn is_active(&self) -> bool {
        matches!(self, TrackingState::Loading | TrackingState::Running)
    }

    /// User-facing status line for the current state
    pub fn status_description(&self) -> String {
        match self {
            TrackingState::Idle => "Idle".to_string(),
            TrackingState::Unsupported => {
                "Image tracking is not available on this device.".to_string()
            }
            TrackingState::Loading => "Loading magnet references…".to_string(),
            TrackingState::Running => "Tracking magnets.".to_string(),
            TrackingState::Failed(message) => format!("Tracking failed: {}", message),
        }
    }

    /// Failure message, present only in the `Failed` state
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            TrackingState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingState::Idle => write!(f, "idle"),
            TrackingState::Unsupported => write!(f, "unsupported"),
            TrackingState::Loading => write!(f, "loading"),
            TrackingState::Running => write!(f, "running"),
            TrackingState::Failed(message) => write!(f, "failed ({})", message),
        }
    }
}

/// State of the tracking subsystem's data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderState {
    Initialized,
    Running,
    Paused,
    Stopped,
}

impl std::fmt::Display for ProviderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderState::Initialized => write!(f, "initialized"),
            ProviderState::Running => write!(f, "running"),
            ProviderState::Paused => write!(f, "paused"),
            ProviderState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Summary counters derived from the overlay store and session state
///
/// Never mutated field-by-field by observers: the tracker recomputes and
/// replaces the whole value after each state-affecting event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingMetrics {
    /// Number of entries in the reference catalog
    pub total_configured: usize,
    /// Data provider state at the time of the last refresh
    pub provider_state: ProviderState,
    /// Live anchor count reported by the subsystem (authoritative ceiling)
    pub reported_anchors: usize,
    /// Overlays currently flagged as tracked
    pub actively_tracked_anchors: usize,
    /// Sorted, distinct reference names among tracked overlays
    pub tracked_reference_names: Vec<String>,
    /// Human-readable description of the last event
    pub last_event_description: String,
    /// When the last event was processed
    pub last_event_date: Option<DateTime<Utc>>,
}

impl TrackingMetrics {
    /// Baseline metrics for a tracker with no session
    pub fn idle(total_configured: usize) -> Self {
        Self {
            total_configured,
            provider_state: ProviderState::Stopped,
            reported_anchors: 0,
            actively_tracked_anchors: 0,
            tracked_reference_names: Vec::new(),
            last_event_description: "Idle".to_string(),
            last_event_date: None,
        }
    }

    /// True when more than one distinct reference is tracked at once
    pub fn multiple_tracked(&self) -> bool {
        self.tracked_reference_names.len() > 1
    }
}
