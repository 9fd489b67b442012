//! Anchor event processor
//!
//! Drains the subsystem's anchor update stream and turns each update into
//! overlay store mutations followed by a metrics refresh. Updates are applied
//! strictly one at a time under the shared state's write guard.
//!
//! No update is ever treated as an error: unknown discriminants and anchors
//! without a reference name still refresh metrics and processing continues.

use crate::metrics::ProviderReading;
use crate::overlay::OverlayState;
use crate::state::{SharedState, TrackerCore};
use crate::subsystem::{AnchorEvent, AnchorUpdate, ImageAnchor, SessionHandle, TrackingSubsystem};
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use magnet_common::events::TrackerEvent;
use magnet_common::{time, uuid_utils};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Why the consumption loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorExit {
    /// Cancellation was requested (by `stop()`)
    Cancelled,
    /// The subsystem closed the anchor update stream
    StreamClosed,
}

/// Consumes anchor updates for one subsystem session
pub struct AnchorEventProcessor {
    shared: Arc<SharedState>,
    subsystem: Arc<dyn TrackingSubsystem>,
    session: SessionHandle,
}

impl AnchorEventProcessor {
    pub fn new(
        shared: Arc<SharedState>,
        subsystem: Arc<dyn TrackingSubsystem>,
        session: SessionHandle,
    ) -> Self {
        Self {
            shared,
            subsystem,
            session,
        }
    }

    /// Consume `updates` until the stream closes or `cancel` fires
    ///
    /// Neither exit path is an error.
    pub async fn run(
        &self,
        mut updates: BoxStream<'static, AnchorUpdate>,
        cancel: CancellationToken,
    ) -> ProcessorExit {
        let mut processed = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = updates.next() => Some(next),
            };

            match next {
                None => {
                    info!(processed, "Anchor event processing cancelled");
                    return ProcessorExit::Cancelled;
                }
                Some(None) => {
                    info!(processed, "Anchor update stream ended");
                    self.record("Anchor stream ended").await;
                    return ProcessorExit::StreamClosed;
                }
                Some(Some(update)) => {
                    if cancel.is_cancelled() {
                        return ProcessorExit::Cancelled;
                    }
                    self.process(update).await;
                    processed += 1;
                }
            }
        }
    }

    /// Apply one update and refresh metrics
    pub async fn process(&self, update: AnchorUpdate) {
        let reading = self.poll_provider().await;
        let timestamp = time::now();
        let description = update.event.describe();
        let anchor_id = update.anchor_id;

        let mut core = self.shared.write().await;

        match update.event {
            AnchorEvent::Added(anchor) | AnchorEvent::Updated(anchor) => {
                if let Some(overlay) = apply_anchor(&mut core, anchor_id, anchor, timestamp) {
                    self.shared.broadcast(TrackerEvent::OverlayUpserted {
                        overlay_id: overlay.id,
                        reference_name: overlay.reference_name,
                        is_tracked: overlay.is_tracked,
                        timestamp,
                    });
                }
            }
            AnchorEvent::Removed => {
                if core.overlays.remove(&anchor_id).is_some() {
                    debug!(anchor = %uuid_utils::short(&anchor_id), "Overlay removed");
                    self.shared.broadcast(TrackerEvent::OverlayRemoved {
                        overlay_id: anchor_id,
                        timestamp,
                    });
                } else {
                    debug!(anchor = %uuid_utils::short(&anchor_id), "Removal for unknown anchor");
                }
            }
            AnchorEvent::Unknown(ref kind) => {
                warn!(
                    anchor = %uuid_utils::short(&anchor_id),
                    kind = %kind,
                    "Unrecognized anchor event, overlays unchanged"
                );
            }
        }

        let metrics = core.refresh_metrics(reading, description, timestamp);
        drop(core);
        self.shared.publish_metrics(metrics);
    }

    /// Refresh metrics without touching overlays
    async fn record(&self, description: &str) {
        let reading = self.poll_provider().await;
        let metrics = self
            .shared
            .write()
            .await
            .refresh_metrics(reading, description, time::now());
        self.shared.publish_metrics(metrics);
    }

    /// Provider state and reported anchor count, polled with every refresh
    async fn poll_provider(&self) -> ProviderReading {
        ProviderReading {
            provider_state: self.subsystem.provider_state(&self.session).await,
            reported_anchors: self.subsystem.reported_anchor_count(&self.session).await,
        }
    }
}

/// Build or replace the overlay for `anchor_id`
///
/// Returns the stored overlay, or `None` when the anchor's reference pattern
/// has no name.
fn apply_anchor(
    core: &mut TrackerCore,
    anchor_id: Uuid,
    anchor: ImageAnchor,
    timestamp: DateTime<Utc>,
) -> Option<OverlayState> {
    let Some(reference_name) = anchor.reference_name else {
        warn!(anchor = %uuid_utils::short(&anchor_id), "Anchor without reference name ignored");
        return None;
    };

    let info = core.catalog.info(&reference_name);
    let overlay = OverlayState {
        id: anchor_id,
        reference_name,
        info,
        pose: anchor.pose,
        is_tracked: anchor.is_tracked,
        estimated_scale_factor: anchor.estimated_scale_factor,
        last_observation_date: timestamp,
        reference_size: anchor.reference_size,
    };

    debug!(
        anchor = %uuid_utils::short(&anchor_id),
        reference = %overlay.reference_name,
        tracked = overlay.is_tracked,
        scale = overlay.estimated_scale_factor,
        "Overlay updated"
    );

    core.overlays.upsert(overlay.clone());
    Some(overlay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ReferenceCatalog, ReferenceInfo};
    use crate::overlay::{Pose, ReferenceSize};
    use crate::scripted::ScriptedSubsystem;
    use futures::stream;
    use magnet_common::events::{ProviderState, TrackingState};

    async fn setup() -> (Arc<SharedState>, Arc<ScriptedSubsystem>, AnchorEventProcessor) {
        let catalog = ReferenceCatalog::from_entries([
            ("espresso", ReferenceInfo::new("Espresso", "Coffee notes.")),
            ("matcha", ReferenceInfo::new("Matcha", "Tea notes.")),
            ("market", ReferenceInfo::new("Market", "Shopping list.")),
        ]);
        let shared = Arc::new(SharedState::new(catalog, 32));
        let subsystem = Arc::new(ScriptedSubsystem::new());
        let session = subsystem.start_session(Vec::new()).await.unwrap();
        let processor = AnchorEventProcessor::new(shared.clone(), subsystem.clone(), session);
        (shared, subsystem, processor)
    }

    fn anchor(name: Option<&str>, is_tracked: bool) -> ImageAnchor {
        ImageAnchor {
            pose: Pose::from_translation(0.0, 1.0, -0.5),
            is_tracked,
            estimated_scale_factor: 1.0,
            reference_name: name.map(str::to_string),
            reference_size: ReferenceSize::new(0.08, 0.05),
        }
    }

    #[tokio::test]
    async fn test_added_then_updated_replaces_overlay() {
        let (shared, _subsystem, processor) = setup().await;
        let id = Uuid::new_v4();

        processor
            .process(AnchorUpdate { anchor_id: id, event: AnchorEvent::Added(anchor(Some("espresso"), true)) })
            .await;
        let metrics = shared.metrics().await;
        assert_eq!(metrics.actively_tracked_anchors, 1);
        assert_eq!(metrics.tracked_reference_names, vec!["espresso"]);
        assert_eq!(metrics.provider_state, ProviderState::Running);
        let overlays = shared.overlays().await;
        assert_eq!(overlays[&id].info.title, "Espresso");

        processor
            .process(AnchorUpdate { anchor_id: id, event: AnchorEvent::Updated(anchor(Some("espresso"), false)) })
            .await;
        let overlays = shared.overlays().await;
        assert_eq!(overlays.len(), 1);
        assert!(!overlays[&id].is_tracked);
        assert_eq!(shared.metrics().await.actively_tracked_anchors, 0);
        assert_eq!(shared.metrics().await.last_event_description, "Anchor updated");
    }

    #[tokio::test]
    async fn test_unknown_name_gets_placeholder() {
        let (shared, _subsystem, processor) = setup().await;
        let id = Uuid::new_v4();

        processor
            .process(AnchorUpdate { anchor_id: id, event: AnchorEvent::Added(anchor(Some("zzz"), true)) })
            .await;

        let overlays = shared.overlays().await;
        let overlay = &overlays[&id];
        assert_eq!(overlay.info.title, "Magnet zzz");
        assert_eq!(overlay.reference_name, "zzz");
    }

    #[tokio::test]
    async fn test_nameless_anchor_still_refreshes_metrics() {
        let (shared, _subsystem, processor) = setup().await;

        processor
            .process(AnchorUpdate { anchor_id: Uuid::new_v4(), event: AnchorEvent::Added(anchor(None, true)) })
            .await;

        assert!(shared.overlays().await.is_empty());
        let metrics = shared.metrics().await;
        assert_eq!(metrics.last_event_description, "Anchor added");
        assert!(metrics.last_event_date.is_some());
    }

    #[tokio::test]
    async fn test_unknown_event_leaves_overlays() {
        let (shared, _subsystem, processor) = setup().await;
        let id = Uuid::new_v4();
        processor
            .process(AnchorUpdate { anchor_id: id, event: AnchorEvent::Added(anchor(Some("matcha"), true)) })
            .await;

        processor
            .process(AnchorUpdate { anchor_id: id, event: AnchorEvent::Unknown("merged".to_string()) })
            .await;

        assert_eq!(shared.overlays().await.len(), 1);
        assert_eq!(
            shared.metrics().await.last_event_description,
            "Unknown anchor event (merged)"
        );
    }

    #[tokio::test]
    async fn test_reported_count_comes_from_subsystem() {
        let (shared, subsystem, processor) = setup().await;
        let id = Uuid::new_v4();
        let added = AnchorUpdate { anchor_id: id, event: AnchorEvent::Added(anchor(Some("market"), true)) };

        // The subsystem already counts the anchor; the tracker has not seen it yet
        subsystem.push(added.clone()).unwrap();
        subsystem.push(AnchorUpdate { anchor_id: Uuid::new_v4(), event: AnchorEvent::Added(anchor(None, true)) }).unwrap();
        processor.process(added).await;

        let metrics = shared.metrics().await;
        assert_eq!(shared.overlays().await.len(), 1);
        assert_eq!(metrics.reported_anchors, 2);
    }

    #[tokio::test]
    async fn test_run_ends_when_stream_closes() {
        let (shared, _subsystem, processor) = setup().await;
        let updates = stream::iter(vec![AnchorUpdate {
            anchor_id: Uuid::new_v4(),
            event: AnchorEvent::Added(anchor(Some("espresso"), true)),
        }])
        .boxed();

        let exit = processor.run(updates, CancellationToken::new()).await;

        assert_eq!(exit, ProcessorExit::StreamClosed);
        assert_eq!(shared.overlays().await.len(), 1);
        assert_eq!(shared.metrics().await.last_event_description, "Anchor stream ended");
        assert_eq!(shared.state().await, TrackingState::Idle, "processor never transitions");
    }

    #[tokio::test]
    async fn test_run_observes_cancellation() {
        let (shared, _subsystem, processor) = setup().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let exit = processor.run(stream::pending().boxed(), cancel).await;

        assert_eq!(exit, ProcessorExit::Cancelled);
        assert!(shared.metrics().await.last_event_date.is_none());
    }
}
