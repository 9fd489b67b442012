//! Tracking session controller
//!
//! [`MagnetTracker`] owns the session lifecycle:
//!
//! ```text
//! Idle ──start──▶ Loading ──▶ Running
//!   │                 │
//!   │                 └──▶ Failed(message)
//!   └──start (no hardware)──▶ Unsupported
//!
//! stop(): any state ──▶ Idle (overlays cleared, idle metrics)
//! ```
//!
//! `start()` launches exactly one background task that loads reference
//! patterns, starts the subsystem session and then drains its anchor updates.
//! `stop()` cancels that task and awaits it before clearing state, so a fresh
//! `start()` can never race a task that is still mutating.

use crate::catalog::{ReferenceCatalog, ReferenceInfo};
use crate::config::{TrackerConfig, DEFAULT_EVENT_BUS_CAPACITY, DEFAULT_RESOURCE_GROUP};
use crate::error::Error;
use crate::metrics::ProviderReading;
use crate::overlay::OverlayState;
use crate::processor::AnchorEventProcessor;
use crate::state::{SharedState, TrackerSnapshot};
use crate::subsystem::{PatternLoader, ReferencePattern, TrackingSubsystem};
use magnet_common::events::{TrackerEvent, TrackingMetrics, TrackingState};
use magnet_common::{time, uuid_utils};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Background task of the current start attempt
struct SessionTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Magnet tracker: session controller and read-only views for presentation
pub struct MagnetTracker {
    shared: Arc<SharedState>,
    subsystem: Arc<dyn TrackingSubsystem>,
    loader: Arc<dyn PatternLoader>,
    resource_group: String,
    task: Mutex<Option<SessionTask>>,
}

impl MagnetTracker {
    /// Tracker with the default resource group and event bus capacity
    pub fn new(
        catalog: ReferenceCatalog,
        subsystem: Arc<dyn TrackingSubsystem>,
        loader: Arc<dyn PatternLoader>,
    ) -> Self {
        Self::build(
            catalog,
            subsystem,
            loader,
            DEFAULT_RESOURCE_GROUP.to_string(),
            DEFAULT_EVENT_BUS_CAPACITY,
        )
    }

    /// Tracker seeded from a loaded configuration
    pub fn from_config(
        config: &TrackerConfig,
        subsystem: Arc<dyn TrackingSubsystem>,
        loader: Arc<dyn PatternLoader>,
    ) -> Self {
        Self::build(
            config.catalog(),
            subsystem,
            loader,
            config.resource_group.clone(),
            config.event_bus_capacity,
        )
    }

    fn build(
        catalog: ReferenceCatalog,
        subsystem: Arc<dyn TrackingSubsystem>,
        loader: Arc<dyn PatternLoader>,
        resource_group: String,
        event_bus_capacity: usize,
    ) -> Self {
        Self {
            shared: Arc::new(SharedState::new(catalog, event_bus_capacity)),
            subsystem,
            loader,
            resource_group,
            task: Mutex::new(None),
        }
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// Start tracking
    ///
    /// No-op while `Loading` or `Running`. From any other state this begins a
    /// new attempt; a previous `Failed` attempt is retried from scratch.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;

        let current = self.shared.state().await;
        if current.is_active() {
            debug!(state = %current, "start() ignored, session already active");
            return;
        }

        // Finished attempts (Failed) still hold their join handle
        if let Some(previous) = task.take() {
            previous.cancel.cancel();
            if let Err(e) = previous.handle.await {
                error!(error = %e, "Previous session task ended abnormally");
            }
        }

        if !self.subsystem.is_supported() {
            warn!("Image tracking is not supported on this device");
            self.shared.transition(TrackingState::Unsupported).await;
            return;
        }

        self.shared.transition(TrackingState::Loading).await;

        let cancel = CancellationToken::new();
        let run = SessionRun {
            shared: Arc::clone(&self.shared),
            subsystem: Arc::clone(&self.subsystem),
            loader: Arc::clone(&self.loader),
            resource_group: self.resource_group.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(run.execute());

        *task = Some(SessionTask { cancel, handle });
    }

    /// Stop tracking and reset to `Idle`
    ///
    /// Cancels the consumption task and waits for it, tears the subsystem
    /// session down, clears all overlays and resets metrics to the idle
    /// baseline. Safe to call in any state.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;

        if let Some(running) = task.take() {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                error!(error = %e, "Session task ended abnormally");
            }
        }

        if let Some(session) = self.shared.take_session().await {
            self.subsystem.stop_session(&session).await;
            info!(session = %uuid_utils::short(&session.id), "Subsystem session stopped");
        }

        self.shared.reset_to_idle().await;
        info!("Tracking stopped");
    }

    pub async fn state(&self) -> TrackingState {
        self.shared.state().await
    }

    pub async fn metrics(&self) -> TrackingMetrics {
        self.shared.metrics().await
    }

    /// Read-only copy of the overlay store
    pub async fn overlays(&self) -> HashMap<Uuid, OverlayState> {
        self.shared.overlays().await
    }

    /// State, metrics and overlays read together
    pub async fn snapshot(&self) -> TrackerSnapshot {
        self.shared.snapshot().await
    }

    /// Human-readable status line for the current state
    pub async fn status_description(&self) -> String {
        self.shared.state().await.status_description()
    }

    /// Failure message while `Failed`
    pub async fn failure_reason(&self) -> Option<String> {
        self.shared
            .state()
            .await
            .failure_reason()
            .map(str::to_string)
    }

    /// Insert or replace the display info for a reference name
    ///
    /// Overlays already on screen keep the info they were built with until
    /// their anchor's next update.
    pub async fn set_reference_info(&self, name: &str, info: ReferenceInfo) {
        self.shared.set_reference_info(name, info).await;
    }

    /// Display info for a reference name (placeholder when unknown)
    pub async fn info(&self, name: &str) -> ReferenceInfo {
        self.shared.info(name).await
    }

    /// Subscribe to tracker notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.shared.subscribe_events()
    }

    /// Wait until the lifecycle state satisfies `predicate`
    ///
    /// Returns the matching state, or `None` after `timeout`.
    pub async fn wait_for_state<F>(&self, timeout: Duration, mut predicate: F) -> Option<TrackingState>
    where
        F: FnMut(&TrackingState) -> bool,
    {
        // Subscribe before reading so no transition slips between the two
        let mut events = self.shared.subscribe_events();
        let current = self.shared.state().await;
        if predicate(&current) {
            return Some(current);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(TrackerEvent::StateChanged { new_state, .. })) => {
                    if predicate(&new_state) {
                        return Some(new_state);
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(skipped))) => {
                    debug!(skipped, "State watcher lagged, re-reading state");
                    let current = self.shared.state().await;
                    if predicate(&current) {
                        return Some(current);
                    }
                }
                Ok(Err(RecvError::Closed)) | Err(_) => return None,
            }
        }
    }
}

impl Drop for MagnetTracker {
    /// Cancels the session task and stops any live subsystem session
    ///
    /// Teardown is spawned on the current runtime; `stop()` remains the way
    /// to wait for it and to reset state.
    fn drop(&mut self) {
        let task = self.task.get_mut().take();
        if let Some(task) = &task {
            task.cancel.cancel();
        }

        let shared = Arc::clone(&self.shared);
        let subsystem = Arc::clone(&self.subsystem);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Some(task) = task {
                        if let Err(e) = task.handle.await {
                            error!(error = %e, "Session task ended abnormally");
                        }
                    }
                    if let Some(session) = shared.take_session().await {
                        subsystem.stop_session(&session).await;
                        info!(
                            session = %uuid_utils::short(&session.id),
                            "Subsystem session stopped on drop"
                        );
                    }
                });
            }
            Err(_) => {
                if task.is_some() || shared.has_live_session() {
                    warn!("MagnetTracker dropped outside a runtime, subsystem session left open");
                }
            }
        }
    }
}

/// One start attempt, run on its own task
struct SessionRun {
    shared: Arc<SharedState>,
    subsystem: Arc<dyn TrackingSubsystem>,
    loader: Arc<dyn PatternLoader>,
    resource_group: String,
    cancel: CancellationToken,
}

impl SessionRun {
    async fn execute(self) {
        let patterns = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Start cancelled while loading reference patterns");
                return;
            }
            loaded = self.load_patterns() => loaded,
        };

        let patterns = match patterns {
            Ok(patterns) if !patterns.is_empty() => patterns,
            Ok(_) => {
                warn!(group = %self.resource_group, "Reference resource group is missing or empty");
                self.fail(Error::ResourceMissing(self.resource_group.clone())).await;
                return;
            }
            Err(e) => {
                self.fail(e).await;
                return;
            }
        };

        info!(
            group = %self.resource_group,
            patterns = patterns.len(),
            "Starting tracking session"
        );

        let started = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Start cancelled while the session was starting");
                return;
            }
            started = self.subsystem.start_session(patterns) => started,
        };

        let session = match started {
            Ok(session) => session,
            Err(e) => {
                self.fail(e).await;
                return;
            }
        };

        {
            let mut core = self.shared.write().await;
            // stop() cancels before it takes the guard: a session that
            // started after that point is torn down without being published
            if self.cancel.is_cancelled() {
                drop(core);
                debug!(
                    session = %uuid_utils::short(&session.id),
                    "Session started after cancellation, stopping it"
                );
                self.subsystem.stop_session(&session).await;
                return;
            }
            core.session = Some(session.clone());
            self.shared.transition_locked(&mut core, TrackingState::Running);
        }

        let reading = ProviderReading {
            provider_state: self.subsystem.provider_state(&session).await,
            reported_anchors: self.subsystem.reported_anchor_count(&session).await,
        };
        let metrics = self
            .shared
            .write()
            .await
            .refresh_metrics(reading, "Session started", time::now());
        self.shared.publish_metrics(metrics);

        let updates = self.subsystem.anchor_updates(&session).await;
        let processor = AnchorEventProcessor::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.subsystem),
            session,
        );
        let exit = processor.run(updates, self.cancel.clone()).await;
        debug!(?exit, "Session task finished");
    }

    /// Run the synchronous loader off the async worker threads
    async fn load_patterns(&self) -> crate::Result<Vec<ReferencePattern>> {
        let loader = Arc::clone(&self.loader);
        let group = self.resource_group.clone();

        tokio::task::spawn_blocking(move || loader.load_reference_patterns(&group))
            .await
            .map_err(|e| {
                Error::ResourceMissing(format!("{} (loader failed: {})", self.resource_group, e))
            })
    }

    async fn fail(&self, error: Error) {
        error!(error = %error, "Tracking session failed");
        self.shared
            .transition(TrackingState::Failed(error.to_string()))
            .await;
    }
}
