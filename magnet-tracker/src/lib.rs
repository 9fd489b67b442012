//! # Magnet Tracker Library (magnet-tracker)
//!
//! Tracks fridge magnets recognized by an image-tracking subsystem and keeps
//! a render layer's entity set in sync with them.
//!
//! **Flow:** [`MagnetTracker::start`] launches a session task that loads
//! reference patterns, starts the subsystem session and drains its anchor
//! updates into the overlay store, refreshing [`TrackingMetrics`] after each
//! one. The render layer takes a [`TrackerSnapshot`] once per pass and hands
//! its overlays to [`EntityReconciler`].
//!
//! **Collaborators:** the device side is abstracted by [`TrackingSubsystem`]
//! and [`PatternLoader`]; [`scripted`] provides in-process implementations.

pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod metrics;
pub mod overlay;
pub mod processor;
pub mod reconcile;
pub mod scripted;
pub mod session;
pub mod state;
pub mod subsystem;

pub use catalog::{ReferenceCatalog, ReferenceInfo};
pub use config::TrackerConfig;
pub use diagnostics::DiagnosticsSummary;
pub use error::{Error, Result};
pub use magnet_common::events::{ProviderState, TrackerEvent, TrackingMetrics, TrackingState};
pub use overlay::{OverlayState, OverlayStore, Pose, ReferenceSize};
pub use reconcile::{reconcile, EntityMap, EntityReconciler, ReconcileReport, RenderTarget};
pub use session::MagnetTracker;
pub use state::{SharedState, TrackerSnapshot};
pub use subsystem::{
    AnchorEvent, AnchorUpdate, ImageAnchor, PatternLoader, ReferencePattern, SessionHandle,
    TrackingSubsystem,
};
