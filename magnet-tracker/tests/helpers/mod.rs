//! Test harness for MagnetTracker integration tests
//!
//! Provides TestTracker wrapper with:
//! - Scripted subsystem and static pattern loader wired to a tracker
//! - Anchor update builders
//! - Helpers that wait for the tracker to reflect a pushed update

#![allow(dead_code)]

use magnet_tracker::overlay::{Pose, ReferenceSize};
use magnet_tracker::scripted::{ScriptedSubsystem, StaticPatternLoader, DEFAULT_MAGNET_SIZE};
use magnet_tracker::{
    AnchorEvent, AnchorUpdate, ImageAnchor, MagnetTracker, ReferenceCatalog, ReferenceInfo,
    TrackerEvent, TrackingState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(2);

/// The three-magnet catalog used across scenarios
pub fn catalog() -> ReferenceCatalog {
    ReferenceCatalog::from_entries([
        ("espresso", ReferenceInfo::new("Espresso Magnet", "Morning notes.")),
        ("matcha", ReferenceInfo::new("Matcha Magnet", "Tea time.")),
        ("market", ReferenceInfo::new("Market Magnet", "Shopping list.")),
    ])
}

/// Tracker plus handles on its collaborators
pub struct TestTracker {
    pub tracker: MagnetTracker,
    pub subsystem: Arc<ScriptedSubsystem>,
    pub loader: Arc<StaticPatternLoader>,
}

impl TestTracker {
    /// Supported device, loader serving the catalog's three patterns
    pub fn new() -> Self {
        Self::with(
            ScriptedSubsystem::new(),
            StaticPatternLoader::with_names(["espresso", "matcha", "market"]),
        )
    }

    pub fn with(subsystem: ScriptedSubsystem, loader: StaticPatternLoader) -> Self {
        let subsystem = Arc::new(subsystem);
        let loader = Arc::new(loader);
        let tracker = MagnetTracker::new(catalog(), subsystem.clone(), loader.clone());
        Self {
            tracker,
            subsystem,
            loader,
        }
    }

    /// Start and wait for `Running`
    pub async fn start_running(&self) {
        self.tracker.start().await;
        let state = self.wait_for(|s| *s == TrackingState::Running).await;
        assert_eq!(state, Some(TrackingState::Running), "session did not reach Running");
    }

    pub async fn wait_for<F>(&self, predicate: F) -> Option<TrackingState>
    where
        F: FnMut(&TrackingState) -> bool,
    {
        self.tracker.wait_for_state(WAIT, predicate).await
    }

    /// Wait until the session attempt settles in `Failed`
    pub async fn wait_for_failure(&self) -> String {
        match self.wait_for(|s| matches!(s, TrackingState::Failed(_))).await {
            Some(TrackingState::Failed(message)) => message,
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    /// Push an update and wait until the tracker has processed it
    pub async fn push(&self, update: AnchorUpdate) {
        let expected = update.event.describe();
        let mut events = self.tracker.subscribe();
        self.subsystem.push(update).expect("push update");

        tokio::time::timeout(WAIT, async {
            loop {
                match events.recv().await {
                    Ok(TrackerEvent::MetricsUpdated { metrics, .. })
                        if metrics.last_event_description == expected =>
                    {
                        break
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("event bus closed"),
                }
            }
        })
        .await
        .expect("metrics refresh after update");
    }
}

pub fn anchor(name: &str, is_tracked: bool, scale: f32) -> ImageAnchor {
    ImageAnchor {
        pose: Pose::from_translation(0.0, 1.2, -0.6),
        is_tracked,
        estimated_scale_factor: scale,
        reference_name: Some(name.to_string()),
        reference_size: DEFAULT_MAGNET_SIZE,
    }
}

pub fn added(id: Uuid, name: &str, is_tracked: bool) -> AnchorUpdate {
    AnchorUpdate {
        anchor_id: id,
        event: AnchorEvent::Added(anchor(name, is_tracked, 1.0)),
    }
}

pub fn updated(id: Uuid, name: &str, is_tracked: bool) -> AnchorUpdate {
    AnchorUpdate {
        anchor_id: id,
        event: AnchorEvent::Updated(anchor(name, is_tracked, 1.0)),
    }
}

pub fn moved(id: Uuid, name: &str, x: f32) -> AnchorUpdate {
    let mut payload = anchor(name, true, 1.0);
    payload.pose = Pose::from_translation(x, 1.2, -0.6);
    payload.reference_size = ReferenceSize::new(0.08, 0.05);
    AnchorUpdate {
        anchor_id: id,
        event: AnchorEvent::Updated(payload),
    }
}

pub fn removed(id: Uuid) -> AnchorUpdate {
    AnchorUpdate {
        anchor_id: id,
        event: AnchorEvent::Removed,
    }
}

pub fn unknown(id: Uuid, kind: &str) -> AnchorUpdate {
    AnchorUpdate {
        anchor_id: id,
        event: AnchorEvent::Unknown(kind.to_string()),
    }
}
