//! Shared tracker state
//!
//! Single owner of all mutable tracking state: catalog, overlay store,
//! published metrics, lifecycle state and the active session handle. Every
//! mutation happens under one write guard, so readers taking a
//! [`TrackerSnapshot`] never observe a half-applied event.
//!
//! Owner contract: only the session controller and the anchor event
//! processor take the write guard. Presentation code goes through the
//! read-only accessors.

use crate::catalog::{ReferenceCatalog, ReferenceInfo};
use crate::metrics::{aggregate, ProviderReading};
use crate::overlay::{OverlayState, OverlayStore};
use crate::subsystem::SessionHandle;
use chrono::{DateTime, Utc};
use magnet_common::events::{EventBus, TrackerEvent, TrackingMetrics, TrackingState};
use magnet_common::time;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock, RwLockWriteGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Consistent read of everything the render layer consumes
#[derive(Debug, Clone)]
pub struct TrackerSnapshot {
    pub state: TrackingState,
    pub metrics: TrackingMetrics,
    pub overlays: HashMap<Uuid, OverlayState>,
}

/// Mutable tracker state guarded by [`SharedState`]
#[derive(Debug)]
pub struct TrackerCore {
    pub(crate) catalog: ReferenceCatalog,
    pub(crate) overlays: OverlayStore,
    pub(crate) metrics: TrackingMetrics,
    pub(crate) state: TrackingState,
    pub(crate) session: Option<SessionHandle>,
    last_logged_metrics_stamp: Option<DateTime<Utc>>,
}

impl TrackerCore {
    fn new(catalog: ReferenceCatalog) -> Self {
        let metrics = TrackingMetrics::idle(catalog.len());
        Self {
            catalog,
            overlays: OverlayStore::new(),
            metrics,
            state: TrackingState::Idle,
            session: None,
            last_logged_metrics_stamp: None,
        }
    }

    /// Replace the lifecycle state, returning the previous one
    fn replace_state(&mut self, new_state: TrackingState) -> TrackingState {
        std::mem::replace(&mut self.state, new_state)
    }

    /// Recompute and replace the published metrics
    pub(crate) fn refresh_metrics(
        &mut self,
        reading: ProviderReading,
        event_description: impl Into<String>,
        event_date: DateTime<Utc>,
    ) -> TrackingMetrics {
        self.metrics = aggregate(
            &self.overlays,
            self.catalog.len(),
            reading,
            event_description,
            event_date,
        );
        self.log_metrics();
        self.metrics.clone()
    }

    fn log_metrics(&mut self) {
        if self.metrics.last_event_date == self.last_logged_metrics_stamp {
            return;
        }
        self.last_logged_metrics_stamp = self.metrics.last_event_date;
        debug!(
            provider = %self.metrics.provider_state,
            configured = self.metrics.total_configured,
            reported = self.metrics.reported_anchors,
            active = self.metrics.actively_tracked_anchors,
            tracked = %self.metrics.tracked_reference_names.join(", "),
            last_event = %self.metrics.last_event_description,
            "Metrics updated"
        );
    }
}

/// Shared state accessible by the controller, the event task and readers
pub struct SharedState {
    core: RwLock<TrackerCore>,
    events: EventBus,
}

impl SharedState {
    /// Create shared state seeded with `catalog`, in the idle state
    pub fn new(catalog: ReferenceCatalog, event_bus_capacity: usize) -> Self {
        Self {
            core: RwLock::new(TrackerCore::new(catalog)),
            events: EventBus::new(event_bus_capacity),
        }
    }

    /// Exclusive access for the owner context
    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, TrackerCore> {
        self.core.write().await
    }

    /// Broadcast an event (no subscriber required)
    pub(crate) fn broadcast(&self, event: TrackerEvent) {
        self.events.emit_lossy(event);
    }

    /// Subscribe to tracker notifications
    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Transition the lifecycle state and notify subscribers
    pub(crate) async fn transition(&self, new_state: TrackingState) {
        let mut core = self.core.write().await;
        self.transition_locked(&mut core, new_state);
    }

    /// Transition while the caller already holds the write guard
    pub(crate) fn transition_locked(&self, core: &mut TrackerCore, new_state: TrackingState) {
        if core.state == new_state {
            return;
        }
        let old_state = core.replace_state(new_state.clone());
        info!("Tracking state: {} -> {}", old_state, new_state);
        self.broadcast(TrackerEvent::StateChanged {
            old_state,
            new_state,
            timestamp: time::now(),
        });
    }

    /// Publish freshly computed metrics
    pub(crate) fn publish_metrics(&self, metrics: TrackingMetrics) {
        self.broadcast(TrackerEvent::MetricsUpdated {
            metrics,
            timestamp: time::now(),
        });
    }

    /// Take the active session handle, leaving none
    pub(crate) async fn take_session(&self) -> Option<SessionHandle> {
        self.core.write().await.session.take()
    }

    /// Whether a session handle is held, without waiting for the lock
    ///
    /// A contended lock counts as live.
    pub(crate) fn has_live_session(&self) -> bool {
        self.core
            .try_read()
            .map(|core| core.session.is_some())
            .unwrap_or(true)
    }

    /// Clear overlays, return to `Idle` and reset metrics to the idle baseline
    pub(crate) async fn reset_to_idle(&self) {
        let mut core = self.core.write().await;
        let removed = core.overlays.clear();
        core.session = None;
        core.metrics = TrackingMetrics::idle(core.catalog.len());
        let metrics = core.metrics.clone();
        self.transition_locked(&mut core, TrackingState::Idle);

        let timestamp = time::now();
        self.broadcast(TrackerEvent::OverlaysCleared { removed, timestamp });
        self.publish_metrics(metrics);
    }

    /// Insert or replace a catalog entry
    pub(crate) async fn set_reference_info(&self, name: &str, info: ReferenceInfo) {
        let mut core = self.core.write().await;
        core.catalog.upsert(name, info);

        let total_configured = core.catalog.len();
        let mut metrics = core.metrics.clone();
        metrics.total_configured = total_configured;
        core.metrics = metrics.clone();

        debug!(name, total_configured, "Reference info updated");
        self.broadcast(TrackerEvent::CatalogUpdated {
            name: name.to_string(),
            total_configured,
            timestamp: time::now(),
        });
        self.publish_metrics(metrics);
    }

    /// Catalog lookup with placeholder fallback
    pub async fn info(&self, name: &str) -> ReferenceInfo {
        self.core.read().await.catalog.info(name)
    }

    pub async fn catalog_len(&self) -> usize {
        self.core.read().await.catalog.len()
    }

    pub async fn state(&self) -> TrackingState {
        self.core.read().await.state.clone()
    }

    pub async fn metrics(&self) -> TrackingMetrics {
        self.core.read().await.metrics.clone()
    }

    pub async fn overlays(&self) -> HashMap<Uuid, OverlayState> {
        self.core.read().await.overlays.snapshot()
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        let core = self.core.read().await;
        TrackerSnapshot {
            state: core.state.clone(),
            metrics: core.metrics.clone(),
            overlays: core.overlays.snapshot(),
        }
    }
}
