//! Tracking subsystem and resource loader interfaces
//!
//! The tracker drives an external image-tracking subsystem through
//! [`TrackingSubsystem`] and obtains its reference patterns through
//! [`PatternLoader`]. Both are supplied by the embedding application.

use crate::error::Result;
use crate::overlay::{Pose, ReferenceSize};
use async_trait::async_trait;
use futures::stream::BoxStream;
use magnet_common::events::ProviderState;
use uuid::Uuid;

/// One decodable reference pattern from the resource bundle
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePattern {
    pub name: String,
    pub physical_size: ReferenceSize,
    /// Decoded image bytes, opaque to the tracker
    pub image_data: Vec<u8>,
}

impl ReferencePattern {
    pub fn new(name: impl Into<String>, physical_size: ReferenceSize) -> Self {
        Self {
            name: name.into(),
            physical_size,
            image_data: Vec::new(),
        }
    }
}

/// Handle to a running subsystem session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub id: Uuid,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Anchor payload carried by `added`/`updated` events
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAnchor {
    pub pose: Pose,
    pub is_tracked: bool,
    pub estimated_scale_factor: f32,
    /// Name of the matched reference pattern; nameless patterns are ignored
    pub reference_name: Option<String>,
    pub reference_size: ReferenceSize,
}

/// Anchor update discriminant
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorEvent {
    Added(ImageAnchor),
    Updated(ImageAnchor),
    Removed,
    /// Discriminant this version does not recognize, with the raw kind label
    Unknown(String),
}

impl AnchorEvent {
    /// Description recorded as the metrics' last event
    pub fn describe(&self) -> String {
        match self {
            AnchorEvent::Added(_) => "Anchor added".to_string(),
            AnchorEvent::Updated(_) => "Anchor updated".to_string(),
            AnchorEvent::Removed => "Anchor removed".to_string(),
            AnchorEvent::Unknown(kind) => format!("Unknown anchor event ({})", kind),
        }
    }
}

/// One element of the subsystem's anchor update stream
///
/// Arrival is unordered across anchors and ordered per anchor id.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorUpdate {
    pub anchor_id: Uuid,
    pub event: AnchorEvent,
}

/// External image-tracking subsystem
#[async_trait]
pub trait TrackingSubsystem: Send + Sync {
    /// Whether this device can run image tracking at all
    fn is_supported(&self) -> bool;

    /// Start a session detecting the given reference patterns
    async fn start_session(&self, patterns: Vec<ReferencePattern>) -> Result<SessionHandle>;

    /// Anchor update stream for a running session
    ///
    /// The stream ends when the session stops.
    async fn anchor_updates(&self, session: &SessionHandle) -> BoxStream<'static, AnchorUpdate>;

    /// Current data provider state
    async fn provider_state(&self, session: &SessionHandle) -> ProviderState;

    /// Number of anchors the subsystem currently considers live
    async fn reported_anchor_count(&self, session: &SessionHandle) -> usize;

    /// Tear the session down
    async fn stop_session(&self, session: &SessionHandle);
}

/// Reference resource loader
pub trait PatternLoader: Send + Sync {
    /// Load the patterns of a resource group; an empty result is valid
    fn load_reference_patterns(&self, group_name: &str) -> Vec<ReferencePattern>;
}
